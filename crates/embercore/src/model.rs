//! Room data model.
//!
//! Serde derives here define the wire names (camelCase) used by snapshots
//! and events. Internal-only fields (`admin_secret`, `joined_at`, vote
//! values before reveal) never pass through serde directly; the snapshot
//! sanitizer is the only exit.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const EVENT_PLAYER_INTERACTION: &str = "player_interaction";
pub const EVENT_THEME_INTERACTION: &str = "theme_interaction";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomState {
    Idle,
    Voting,
    CountingDown,
    Revealed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Pending,
    Voting,
    Revealed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: String,
    pub name: String,
    pub avatar_id: String,
    pub is_admin: bool,
    pub connected: bool,
    pub thinking: bool,
    /// First time this user id was seen in the room. Snapshot sort key.
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ticket {
    pub id: String,
    /// Free-form description. Empty content marks a free-vote ticket.
    pub content: String,
    pub status: TicketStatus,
    /// user id -> value from the room's scale.
    pub votes: HashMap<String, String>,
}

/// One-shot animation event, queued on the room and drained into exactly
/// one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub action: String,
    pub from_id: String,
    pub to_id: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub payload: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "theme", content = "data", rename_all = "snake_case")]
pub enum ThemeState {
    Campfire(CampfireState),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampfireState {
    pub fire_level: u32,
    pub last_fed_at: Option<DateTime<Utc>>,
    pub trees: Vec<Tree>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tree {
    pub id: u32,
    pub x: f64,
    pub y: f64,
    pub size: f64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub burned_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub respawn_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedFirePayload {
    pub tree_id: u32,
    pub from_x: f64,
    pub from_y: f64,
}

#[derive(Debug, Clone)]
pub struct Room {
    pub id: String,
    pub name: String,
    /// Capability token minted at creation. Never serialized.
    pub admin_secret: String,
    pub scale_id: String,
    pub countdown: u32,
    pub tickets_enabled: bool,
    pub state: RoomState,
    pub users: HashMap<String, User>,
    /// Insertion order, stable for the room's lifetime.
    pub tickets: Vec<Ticket>,
    pub current_ticket_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub pending_events: Vec<RoomEvent>,
    pub theme_state: Option<ThemeState>,
}
