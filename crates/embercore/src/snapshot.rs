//! Snapshot sanitizer: the only way room state leaves the gate.
//!
//! `build` deep-copies the room into a plain value that is safe to hand to
//! any subscriber. Vote values survive only for tickets already revealed;
//! the admin secret never appears. Pending events are drained here, under
//! the same gate that mutated the room, so each event rides exactly one
//! snapshot.

use serde::{Deserialize, Serialize};

use crate::model::{Room, RoomEvent, RoomState, ThemeState, TicketStatus, User};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub id: String,
    pub name: String,
    pub scale: String,
    pub state: RoomState,
    pub countdown: u32,
    pub users: Vec<UserInfo>,
    pub tickets: Vec<TicketInfo>,
    pub current_ticket_id: String,
    pub tickets_enabled: bool,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub events: Vec<RoomEvent>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub theme_state: Option<ThemeState>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub id: String,
    pub name: String,
    pub avatar_id: String,
    pub is_admin: bool,
    pub connected: bool,
    pub thinking: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketInfo {
    pub id: String,
    pub content: String,
    pub status: TicketStatus,
    pub votes: Vec<VoteInfo>,
}

/// `value` is present iff the ticket is revealed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteInfo {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub value: Option<String>,
}

/// Builds the sanitized view and drains pending events. Must be called
/// under the room gate.
pub fn build(room: &mut Room) -> RoomSnapshot {
    let mut users: Vec<&User> = room.users.values().collect();
    users.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then_with(|| a.id.cmp(&b.id)));
    let users = users
        .into_iter()
        .map(|u| UserInfo {
            id: u.id.clone(),
            name: u.name.clone(),
            avatar_id: u.avatar_id.clone(),
            is_admin: u.is_admin,
            connected: u.connected,
            thinking: u.thinking,
        })
        .collect();

    let tickets = room
        .tickets
        .iter()
        .map(|t| {
            let revealed = t.status == TicketStatus::Revealed;
            let mut votes: Vec<VoteInfo> = t
                .votes
                .iter()
                .map(|(user_id, value)| VoteInfo {
                    user_id: user_id.clone(),
                    value: revealed.then(|| value.clone()),
                })
                .collect();
            votes.sort_by(|a, b| a.user_id.cmp(&b.user_id));
            TicketInfo {
                id: t.id.clone(),
                content: t.content.clone(),
                status: t.status,
                votes,
            }
        })
        .collect();

    RoomSnapshot {
        id: room.id.clone(),
        name: room.name.clone(),
        scale: room.scale_id.clone(),
        state: room.state,
        countdown: room.countdown,
        users,
        tickets,
        current_ticket_id: room.current_ticket_id.clone().unwrap_or_default(),
        tickets_enabled: room.tickets_enabled,
        events: std::mem::take(&mut room.pending_events),
        theme_state: room.theme_state.clone(),
    }
}
