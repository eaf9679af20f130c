//! Room manager: owns every live room and the gate that serializes its
//! mutations.
//!
//! The top-level map lock is held only for lookup/insert/remove; each room
//! sits behind its own `Arc<Mutex<_>>`, so a slow operation on one room
//! never stalls another beyond the map access. Lock order is always
//! map -> room, never the reverse.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use embercore::campfire;
use embercore::model::Room;
use embercore::scale;

const DEFAULT_TTL_HOURS: i64 = 24;

/// Server-wide settings stamped onto every new room.
#[derive(Debug, Clone, Copy)]
pub struct RoomDefaults {
    /// Reveal countdown in seconds, fixed at creation. 1..=30.
    pub countdown: u32,
    pub tickets_enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomNotFound;

impl std::fmt::Display for RoomNotFound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "room not found")
    }
}

impl std::error::Error for RoomNotFound {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownScale;

impl std::fmt::Display for UnknownScale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown scale")
    }
}

impl std::error::Error for UnknownScale {}

/// Handle returned from `create`; everything else goes through `with_room`.
#[derive(Debug, Clone)]
pub struct CreatedRoom {
    pub id: String,
    pub admin_secret: String,
}

pub struct Manager {
    rooms: Mutex<HashMap<String, Arc<Mutex<Room>>>>,
    defaults: RoomDefaults,
    ttl: Duration,
}

impl Manager {
    pub fn new(defaults: RoomDefaults) -> Self {
        Manager {
            rooms: Mutex::new(HashMap::new()),
            defaults,
            ttl: Duration::hours(DEFAULT_TTL_HOURS),
        }
    }

    /// Mints a room with fresh opaque id and admin secret and a campfire
    /// seeded from the id.
    pub async fn create(&self, scale_id: &str) -> Result<CreatedRoom, UnknownScale> {
        if scale::get(scale_id).is_none() {
            return Err(UnknownScale);
        }
        let id = Uuid::new_v4().to_string();
        let admin_secret = Uuid::new_v4().to_string();

        let mut room = Room::new(
            id.clone(),
            admin_secret.clone(),
            scale_id,
            self.defaults.countdown,
            self.defaults.tickets_enabled,
        );
        campfire::init(&mut room);

        self.rooms
            .lock()
            .await
            .insert(id.clone(), Arc::new(Mutex::new(room)));
        info!(room_id = %id, scale = %scale_id, "room created");
        Ok(CreatedRoom { id, admin_secret })
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.rooms.lock().await.contains_key(id)
    }

    pub async fn count(&self) -> usize {
        self.rooms.lock().await.len()
    }

    /// Runs `f` under the room's exclusive gate. The single entry point for
    /// every mutation and every snapshot build.
    pub async fn with_room<T>(
        &self,
        id: &str,
        f: impl FnOnce(&mut Room) -> T,
    ) -> Result<T, RoomNotFound> {
        let room = {
            let rooms = self.rooms.lock().await;
            rooms.get(id).cloned()
        }
        .ok_or(RoomNotFound)?;
        let mut guard = room.lock().await;
        Ok(f(&mut guard))
    }

    /// Campfire upkeep across all rooms; returns the ids whose state
    /// changed so the caller can broadcast them.
    pub async fn normalize_campfire_rooms(&self) -> Vec<String> {
        let rooms: Vec<(String, Arc<Mutex<Room>>)> = {
            let map = self.rooms.lock().await;
            map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        };

        let mut changed = Vec::new();
        for (id, room) in rooms {
            let mut guard = room.lock().await;
            if campfire::normalize(&mut guard) {
                changed.push(id);
            }
        }
        changed
    }

    /// Drops rooms idle past the TTL. A room whose gate is currently held
    /// is in use and skipped outright.
    pub async fn cleanup(&self) -> usize {
        let cutoff = Utc::now() - self.ttl;
        let mut rooms = self.rooms.lock().await;
        let before = rooms.len();
        rooms.retain(|_, room| match room.try_lock() {
            Ok(guard) => guard.last_activity_at >= cutoff,
            Err(_) => true,
        });
        before - rooms.len()
    }
}
