//! Typed RPC payloads and replies, camelCase on the wire.

use embercore::model::RoomState;
use embercore::snapshot::RoomSnapshot;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    pub scale_id: String,
    pub user_name: String,
    pub avatar_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomResponse {
    pub room_id: String,
    pub admin_secret: String,
    pub user_id: String,
    pub state: RoomState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomRequest {
    pub room_id: String,
    pub user_name: String,
    pub avatar_id: String,
    /// A previously issued id; rejoining with it keeps admin status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomResponse {
    pub user_id: String,
    pub state: RoomSnapshot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitVoteRequest {
    pub room_id: String,
    pub user_id: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveVoteRequest {
    pub room_id: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddTicketRequest {
    pub room_id: String,
    pub admin_secret: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddTicketResponse {
    pub ticket_id: String,
}

/// Shared shape of the parameterless admin methods (`reveal_votes`,
/// `reset_votes`, `start_reveal`, `next_ticket`, `prev_ticket`,
/// `start_free_vote`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminActionRequest {
    pub room_id: String,
    pub admin_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRoomNameRequest {
    pub room_id: String,
    pub admin_secret: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetTicketRequest {
    pub room_id: String,
    pub admin_secret: String,
    pub ticket_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetThinkingRequest {
    pub room_id: String,
    pub user_id: String,
    pub thinking: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractPlayerRequest {
    pub room_id: String,
    pub user_id: String,
    pub target_user_id: String,
    pub action: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedFireRequest {
    pub room_id: String,
    pub user_id: String,
    pub tree_id: u32,
    pub from_x: f64,
    pub from_y: f64,
}
