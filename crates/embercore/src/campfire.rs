//! Campfire theme: the ornamental per-room state.
//!
//! Tree layout is deterministic from the room id so every client renders the
//! same forest without shipping coordinates out-of-band at join time. The
//! hash and generator constants are a shared contract with the renderer:
//! FNV-1a (32-bit) seeding an LCG with Knuth's constants, all arithmetic
//! wrapping on u32.

use chrono::{Duration, Utc};

use crate::RoomError;
use crate::model::{
    CampfireState, EVENT_THEME_INTERACTION, FeedFirePayload, Room, RoomEvent, ThemeState, Tree,
};

pub const TREE_COUNT: u32 = 9;
const TREE_MIN_RADIUS: f64 = 160.0;
const TREE_MAX_RADIUS: f64 = 190.0;
// Canvas is 400x400; trees ring its center.
const CX: f64 = 200.0;
const CY: f64 = 200.0;

const MAX_FIRE_LEVEL: u32 = 5;
const FIRE_DECAY_EVERY_SECS: i64 = 30;
const TREE_RESPAWN_AFTER_SECS: i64 = 60;

/// FNV-1a over the UTF-8 bytes of `s`.
fn fnv1a(s: &str) -> u32 {
    let mut h: u32 = 0x811c_9dc5;
    for b in s.bytes() {
        h = (h ^ u32::from(b)).wrapping_mul(0x0100_0193);
    }
    h
}

/// s = s*1664525 + 1013904223 (mod 2^32), output in [0, 1).
struct Lcg(u32);

impl Lcg {
    fn next(&mut self) -> f64 {
        self.0 = self.0.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        f64::from(self.0) / 4_294_967_296.0
    }
}

/// Three draws per tree: angle jitter, radius, size. Call order matters for
/// determinism against the client.
fn place_tree(id: u32, rng: &mut Lcg) -> Tree {
    let base_angle = f64::from(id) / f64::from(TREE_COUNT) * std::f64::consts::TAU;
    let jitter = (rng.next() - 0.5) * (std::f64::consts::TAU / f64::from(TREE_COUNT)) * 0.8;
    let angle = base_angle + jitter;
    let radius = TREE_MIN_RADIUS + rng.next() * (TREE_MAX_RADIUS - TREE_MIN_RADIUS);
    let size = 1.2 + rng.next() * 0.6;
    Tree {
        id,
        x: CX + radius * angle.cos(),
        y: CY + radius * angle.sin(),
        size,
        burned_at: None,
        respawn_at: None,
    }
}

/// Seeds the campfire on a fresh room from its id.
pub fn init(room: &mut Room) {
    let mut rng = Lcg(fnv1a(&room.id));
    let trees = (0..TREE_COUNT).map(|i| place_tree(i, &mut rng)).collect();
    room.theme_state = Some(ThemeState::Campfire(CampfireState {
        fire_level: 0,
        last_fed_at: None,
        trees,
    }));
}

/// Burns a tree into the fire: the tree goes down for 60 s, the fire level
/// rises (cap 5), and a `feed_fire` event is queued for the next snapshot.
pub fn feed_fire(
    room: &mut Room,
    user_id: &str,
    tree_id: u32,
    from_x: f64,
    from_y: f64,
) -> Result<(), RoomError> {
    let Some(ThemeState::Campfire(state)) = room.theme_state.as_mut() else {
        return Err(RoomError::NoCampfire);
    };
    let tree = state
        .trees
        .iter_mut()
        .find(|t| t.id == tree_id)
        .ok_or(RoomError::TreeNotFound)?;
    if tree.burned_at.is_some() {
        return Err(RoomError::TreeBurned);
    }

    let now = Utc::now();
    tree.burned_at = Some(now);
    tree.respawn_at = Some(now + Duration::seconds(TREE_RESPAWN_AFTER_SECS));
    if state.fire_level < MAX_FIRE_LEVEL {
        state.fire_level += 1;
    }
    state.last_fed_at = Some(now);

    room.pending_events.push(RoomEvent {
        kind: EVENT_THEME_INTERACTION.to_string(),
        action: "feed_fire".to_string(),
        from_id: user_id.to_string(),
        to_id: String::new(),
        payload: serde_json::to_value(FeedFirePayload {
            tree_id,
            from_x,
            from_y,
        })
        .ok(),
    });
    room.touch();
    Ok(())
}

/// Clock-driven upkeep, run from the manager's ticker under the room gate.
///
/// Fire decays one level per elapsed 30 s interval since the last feed, with
/// `last_fed_at` advanced by the consumed intervals so partial intervals
/// carry over. Burned trees whose respawn time has passed regrow at a fresh
/// position. Returns true iff anything changed; idempotent otherwise.
pub fn normalize(room: &mut Room) -> bool {
    let Some(ThemeState::Campfire(state)) = room.theme_state.as_mut() else {
        return false;
    };
    let now = Utc::now();
    let mut changed = false;

    if state.fire_level > 0 {
        if let Some(fed) = state.last_fed_at {
            let steps = (now - fed).num_seconds() / FIRE_DECAY_EVERY_SECS;
            if steps > 0 {
                let decay = steps.min(i64::from(state.fire_level)) as u32;
                state.fire_level -= decay;
                state.last_fed_at =
                    Some(fed + Duration::seconds(steps * FIRE_DECAY_EVERY_SECS));
                changed = true;
            }
        }
    }

    for tree in &mut state.trees {
        let due = matches!(tree.respawn_at, Some(at) if at <= now);
        if tree.burned_at.is_some() && due {
            let seed = now
                .timestamp_nanos_opt()
                .unwrap_or(0)
                .wrapping_add(i64::from(tree.id) * 1_000_003) as u32;
            let mut rng = Lcg(seed);
            let fresh = place_tree(tree.id, &mut rng);
            tree.x = fresh.x;
            tree.y = fresh.y;
            tree.size = fresh.size;
            tree.burned_at = None;
            tree.respawn_at = None;
            changed = true;
        }
    }

    changed
}
