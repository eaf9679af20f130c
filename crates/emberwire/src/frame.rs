//! WebSocket frame envelope, tagged by `op` on both directions.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const ROOM_CHANNEL_PREFIX: &str = "room:";

/// The one channel per active room.
pub fn room_channel(room_id: &str) -> String {
    format!("{ROOM_CHANNEL_PREFIX}{room_id}")
}

/// Extracts the room id from a `room:<id>` channel name.
pub fn parse_room_channel(channel: &str) -> Option<&str> {
    channel.strip_prefix(ROOM_CHANNEL_PREFIX)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ClientFrame {
    Rpc {
        id: u64,
        method: String,
        #[serde(default)]
        params: Value,
    },
    Subscribe {
        id: u64,
        channel: String,
    },
    Unsubscribe {
        id: u64,
        channel: String,
    },
    Ping {},
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ServerFrame {
    Reply {
        id: u64,
        result: Value,
    },
    Error {
        id: u64,
        code: u16,
        message: String,
    },
    Subscribed {
        id: u64,
        channel: String,
    },
    Unsubscribed {
        id: u64,
        channel: String,
    },
    Publication {
        channel: String,
        data: Value,
    },
    Pong {},
}
