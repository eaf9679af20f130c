//! Hub: binds transport sessions to rooms and users, dispatches RPCs, and
//! fans sanitized snapshots out to channel subscribers.
//!
//! Every handler follows one outline: parse the typed payload, validate,
//! authenticate (admin secret for admin methods, session binding for
//! per-user methods), run one pure room transition under the gate, then
//! broadcast a fresh snapshot and return the typed reply. The hub is the
//! sole authorization gate; room code trusts its caller.
//!
//! Lock order is sessions -> subscribers -> rooms map -> room gate, and no
//! hub lock is ever held across a room-gate acquisition.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use embercore::model::Room;
use embercore::{RoomError, avatar, campfire, scale, snapshot};
use emberwire::RpcError;
use emberwire::frame::{ServerFrame, parse_room_channel, room_channel};
use emberwire::rpc::{
    AddTicketRequest, AddTicketResponse, AdminActionRequest, CreateRoomRequest,
    CreateRoomResponse, FeedFireRequest, InteractPlayerRequest, JoinRoomRequest,
    JoinRoomResponse, RemoveVoteRequest, SetThinkingRequest, SetTicketRequest,
    SubmitVoteRequest, UpdateRoomNameRequest,
};

use crate::manager::Manager;

pub type SessionId = u64;

/// Outbound frames queued per socket. A full queue means a reader that
/// stopped draining; we drop the frame rather than stall the room.
pub const SESSION_BUFFER: usize = 64;

const MAX_NAME_CHARS: usize = 200;
const MAX_CONTENT_CHARS: usize = 10_000;

#[derive(Debug, Clone)]
struct Binding {
    user_id: String,
    room_id: String,
}

pub struct Hub {
    rooms: Manager,
    next_session: AtomicU64,
    /// session -> (user, room), written on create/join, read on per-user
    /// RPCs and on disconnect for multi-tab presence.
    sessions: Mutex<HashMap<SessionId, Binding>>,
    /// channel -> session -> outbound queue.
    subscribers: Mutex<HashMap<String, HashMap<SessionId, mpsc::Sender<ServerFrame>>>>,
}

impl Hub {
    pub fn new(rooms: Manager) -> Self {
        Hub {
            rooms,
            next_session: AtomicU64::new(1),
            sessions: Mutex::new(HashMap::new()),
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    pub fn rooms(&self) -> &Manager {
        &self.rooms
    }

    pub fn next_session_id(&self) -> SessionId {
        self.next_session.fetch_add(1, Ordering::Relaxed)
    }

    /// Gate: sessions may only subscribe to `room:<id>` of a live room.
    pub async fn subscribe(
        &self,
        session: SessionId,
        channel: &str,
        tx: mpsc::Sender<ServerFrame>,
    ) -> Result<(), RpcError> {
        let Some(room_id) = parse_room_channel(channel) else {
            return Err(RpcError::permission_denied());
        };
        if !self.rooms.contains(room_id).await {
            return Err(RpcError::permission_denied());
        }
        self.subscribers
            .lock()
            .await
            .entry(channel.to_string())
            .or_default()
            .insert(session, tx);
        Ok(())
    }

    pub async fn unsubscribe(&self, session: SessionId, channel: &str) {
        let mut subs = self.subscribers.lock().await;
        if let Some(m) = subs.get_mut(channel) {
            m.remove(&session);
            if m.is_empty() {
                subs.remove(channel);
            }
        }
    }

    /// Transport-level session end. Presence only flips off when the last
    /// session bound to this (user, room) goes away, so closing one of two
    /// tabs keeps the user connected.
    pub async fn disconnect(&self, session: SessionId) {
        {
            let mut subs = self.subscribers.lock().await;
            subs.retain(|_, m| {
                m.remove(&session);
                !m.is_empty()
            });
        }

        let binding = {
            let mut sessions = self.sessions.lock().await;
            sessions.remove(&session)
        };
        let Some(binding) = binding else {
            return;
        };

        let user_still_present = {
            let sessions = self.sessions.lock().await;
            sessions
                .values()
                .any(|b| b.user_id == binding.user_id && b.room_id == binding.room_id)
        };
        if user_still_present {
            return;
        }

        let res = self
            .rooms
            .with_room(&binding.room_id, |r| {
                r.mark_disconnected(&binding.user_id);
            })
            .await;
        if res.is_ok() {
            info!(room_id = %binding.room_id, user_id = %binding.user_id, "user disconnected");
            self.broadcast(&binding.room_id, "disconnect").await;
        }
    }

    pub async fn handle_rpc(
        &self,
        session: SessionId,
        method: &str,
        params: Value,
    ) -> Result<Value, RpcError> {
        match method {
            "create_room" => self.rpc_create_room(session, params).await,
            "join_room" => self.rpc_join_room(session, params).await,
            "submit_vote" => self.rpc_submit_vote(session, params).await,
            "remove_vote" => self.rpc_remove_vote(session, params).await,
            "add_ticket" => self.rpc_add_ticket(params).await,
            "start_reveal" => self.rpc_start_reveal(params).await,
            "reveal_votes" => self.rpc_reveal_votes(params).await,
            "reset_votes" => self.rpc_reset_votes(params).await,
            "next_ticket" => self.rpc_next_ticket(params).await,
            "prev_ticket" => self.rpc_prev_ticket(params).await,
            "set_ticket" => self.rpc_set_ticket(params).await,
            "update_room_name" => self.rpc_update_room_name(params).await,
            "start_free_vote" => self.rpc_start_free_vote(params).await,
            "set_thinking" => self.rpc_set_thinking(session, params).await,
            "interact_player" => self.rpc_interact_player(session, params).await,
            "feed_fire" => self.rpc_feed_fire(session, params).await,
            _ => Err(RpcError::method_not_found()),
        }
    }

    /// Publishes the current sanitized snapshot on the room channel.
    ///
    /// Fire-and-forget per subscriber. Failures are logged, never surfaced:
    /// the state change already committed, and the next broadcast (or a
    /// rejoin) resynchronizes any client that missed one.
    pub async fn broadcast(&self, room_id: &str, method: &str) {
        let snap = match self.rooms.with_room(room_id, snapshot::build).await {
            Ok(snap) => snap,
            Err(_) => return,
        };
        let data = match serde_json::to_value(&snap) {
            Ok(v) => v,
            Err(err) => {
                warn!(room_id = %room_id, method = %method, err = %err, "snapshot marshal failed");
                return;
            }
        };

        let channel = room_channel(room_id);
        let txs: Vec<mpsc::Sender<ServerFrame>> = {
            let subs = self.subscribers.lock().await;
            subs.get(&channel)
                .map(|m| m.values().cloned().collect())
                .unwrap_or_default()
        };
        for tx in txs {
            let frame = ServerFrame::Publication {
                channel: channel.clone(),
                data: data.clone(),
            };
            if tx.try_send(frame).is_err() {
                debug!(room_id = %room_id, "subscriber queue full, snapshot dropped");
            }
        }
    }

    async fn bind(&self, session: SessionId, user_id: &str, room_id: &str) {
        self.sessions.lock().await.insert(
            session,
            Binding {
                user_id: user_id.to_string(),
                room_id: room_id.to_string(),
            },
        );
    }

    /// Per-user actions must come from the session that owns the user id.
    async fn authorize_user(
        &self,
        session: SessionId,
        room_id: &str,
        user_id: &str,
    ) -> Result<(), RpcError> {
        let sessions = self.sessions.lock().await;
        match sessions.get(&session) {
            Some(b) if b.user_id == user_id && b.room_id == room_id => Ok(()),
            _ => Err(RpcError::permission_denied()),
        }
    }

    /// Common path for admin methods: existence first (unknown rooms are
    /// `not_found` even with a bad secret), then the secret, then the
    /// transition, then the broadcast.
    async fn admin_action(
        &self,
        room_id: &str,
        admin_secret: &str,
        method: &str,
        f: impl FnOnce(&mut Room) -> Result<(), RpcError>,
    ) -> Result<(), RpcError> {
        if room_id.is_empty() || admin_secret.is_empty() {
            return Err(RpcError::bad_request("missing required field"));
        }
        let res = self
            .rooms
            .with_room(room_id, |r| {
                if r.admin_secret != admin_secret {
                    return Err(RpcError::permission_denied());
                }
                f(r)
            })
            .await
            .map_err(|_| RpcError::not_found())?;
        res?;
        self.broadcast(room_id, method).await;
        Ok(())
    }

    async fn rpc_create_room(
        &self,
        session: SessionId,
        params: Value,
    ) -> Result<Value, RpcError> {
        let req: CreateRoomRequest = parse(params)?;
        if req.scale_id.is_empty() || req.user_name.is_empty() || req.avatar_id.is_empty() {
            return Err(RpcError::bad_request("missing required field"));
        }
        check_len(&req.user_name, MAX_NAME_CHARS, "name")?;
        if scale::get(&req.scale_id).is_none() {
            return Err(RpcError::bad_request("unknown scale"));
        }
        if !avatar::valid(&req.avatar_id) {
            return Err(RpcError::bad_request("unknown avatar"));
        }

        let created = self
            .rooms
            .create(&req.scale_id)
            .await
            .map_err(|_| RpcError::internal())?;
        let user_id = Uuid::new_v4().to_string();
        let state = self
            .rooms
            .with_room(&created.id, |r| {
                r.add_user(&user_id, &req.user_name, &req.avatar_id, true);
                r.state
            })
            .await
            .map_err(|_| RpcError::internal())?;

        self.bind(session, &user_id, &created.id).await;
        reply(&CreateRoomResponse {
            room_id: created.id,
            admin_secret: created.admin_secret,
            user_id,
            state,
        })
    }

    async fn rpc_join_room(&self, session: SessionId, params: Value) -> Result<Value, RpcError> {
        let req: JoinRoomRequest = parse(params)?;
        if req.room_id.is_empty() || req.user_name.is_empty() || req.avatar_id.is_empty() {
            return Err(RpcError::bad_request("missing required field"));
        }
        check_len(&req.user_name, MAX_NAME_CHARS, "name")?;
        if !avatar::valid(&req.avatar_id) {
            return Err(RpcError::bad_request("unknown avatar"));
        }

        let user_id = req
            .user_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let snap = self
            .rooms
            .with_room(&req.room_id, |r| {
                r.add_user(&user_id, &req.user_name, &req.avatar_id, false);
                snapshot::build(r)
            })
            .await
            .map_err(|_| RpcError::not_found())?;

        self.bind(session, &user_id, &req.room_id).await;
        self.broadcast(&req.room_id, "join_room").await;
        reply(&JoinRoomResponse {
            user_id,
            state: snap,
        })
    }

    async fn rpc_submit_vote(
        &self,
        session: SessionId,
        params: Value,
    ) -> Result<Value, RpcError> {
        let req: SubmitVoteRequest = parse(params)?;
        if req.room_id.is_empty() || req.user_id.is_empty() || req.value.is_empty() {
            return Err(RpcError::bad_request("missing required field"));
        }
        self.authorize_user(session, &req.room_id, &req.user_id)
            .await?;

        self.rooms
            .with_room(&req.room_id, |r| r.submit_vote(&req.user_id, &req.value))
            .await
            .map_err(|_| RpcError::not_found())?
            .map_err(room_err)?;

        self.broadcast(&req.room_id, "submit_vote").await;
        Ok(empty())
    }

    async fn rpc_remove_vote(
        &self,
        session: SessionId,
        params: Value,
    ) -> Result<Value, RpcError> {
        let req: RemoveVoteRequest = parse(params)?;
        if req.room_id.is_empty() || req.user_id.is_empty() {
            return Err(RpcError::bad_request("missing required field"));
        }
        self.authorize_user(session, &req.room_id, &req.user_id)
            .await?;

        self.rooms
            .with_room(&req.room_id, |r| r.remove_vote(&req.user_id))
            .await
            .map_err(|_| RpcError::not_found())?
            .map_err(room_err)?;

        self.broadcast(&req.room_id, "remove_vote").await;
        Ok(empty())
    }

    async fn rpc_add_ticket(&self, params: Value) -> Result<Value, RpcError> {
        let req: AddTicketRequest = parse(params)?;
        if req.content.is_empty() {
            return Err(RpcError::bad_request("missing required field"));
        }
        check_len(&req.content, MAX_CONTENT_CHARS, "content")?;

        let ticket_id = Uuid::new_v4().to_string();
        self.admin_action(&req.room_id, &req.admin_secret, "add_ticket", |r| {
            if !r.tickets_enabled {
                return Err(RpcError::bad_request("tickets are disabled"));
            }
            r.add_ticket(&ticket_id, &req.content);
            Ok(())
        })
        .await?;
        reply(&AddTicketResponse { ticket_id })
    }

    async fn rpc_start_reveal(&self, params: Value) -> Result<Value, RpcError> {
        let req: AdminActionRequest = parse(params)?;
        self.admin_action(&req.room_id, &req.admin_secret, "start_reveal", |r| {
            r.start_countdown().map_err(room_err)
        })
        .await?;
        Ok(empty())
    }

    async fn rpc_reveal_votes(&self, params: Value) -> Result<Value, RpcError> {
        let req: AdminActionRequest = parse(params)?;
        self.admin_action(&req.room_id, &req.admin_secret, "reveal_votes", |r| {
            r.reveal_votes().map_err(room_err)
        })
        .await?;
        Ok(empty())
    }

    async fn rpc_reset_votes(&self, params: Value) -> Result<Value, RpcError> {
        let req: AdminActionRequest = parse(params)?;
        self.admin_action(&req.room_id, &req.admin_secret, "reset_votes", |r| {
            r.reset_votes().map_err(room_err)
        })
        .await?;
        Ok(empty())
    }

    async fn rpc_next_ticket(&self, params: Value) -> Result<Value, RpcError> {
        let req: AdminActionRequest = parse(params)?;
        self.admin_action(&req.room_id, &req.admin_secret, "next_ticket", |r| {
            r.next_ticket_by_index().map_err(room_err)
        })
        .await?;
        Ok(empty())
    }

    async fn rpc_prev_ticket(&self, params: Value) -> Result<Value, RpcError> {
        let req: AdminActionRequest = parse(params)?;
        self.admin_action(&req.room_id, &req.admin_secret, "prev_ticket", |r| {
            r.prev_ticket().map_err(room_err)
        })
        .await?;
        Ok(empty())
    }

    async fn rpc_set_ticket(&self, params: Value) -> Result<Value, RpcError> {
        let req: SetTicketRequest = parse(params)?;
        if req.ticket_id.is_empty() {
            return Err(RpcError::bad_request("missing required field"));
        }
        self.admin_action(&req.room_id, &req.admin_secret, "set_ticket", |r| {
            r.navigate_to(&req.ticket_id).map_err(room_err)
        })
        .await?;
        Ok(empty())
    }

    async fn rpc_update_room_name(&self, params: Value) -> Result<Value, RpcError> {
        let req: UpdateRoomNameRequest = parse(params)?;
        check_len(&req.name, MAX_NAME_CHARS, "name")?;
        self.admin_action(&req.room_id, &req.admin_secret, "update_room_name", |r| {
            r.set_name(&req.name);
            Ok(())
        })
        .await?;
        Ok(empty())
    }

    async fn rpc_start_free_vote(&self, params: Value) -> Result<Value, RpcError> {
        let req: AdminActionRequest = parse(params)?;
        let ticket_id = Uuid::new_v4().to_string();
        self.admin_action(&req.room_id, &req.admin_secret, "start_free_vote", |r| {
            r.start_free_vote(&ticket_id).map_err(room_err)
        })
        .await?;
        Ok(empty())
    }

    async fn rpc_set_thinking(
        &self,
        session: SessionId,
        params: Value,
    ) -> Result<Value, RpcError> {
        let req: SetThinkingRequest = parse(params)?;
        if req.room_id.is_empty() || req.user_id.is_empty() {
            return Err(RpcError::bad_request("missing required field"));
        }
        self.authorize_user(session, &req.room_id, &req.user_id)
            .await?;

        self.rooms
            .with_room(&req.room_id, |r| r.set_thinking(&req.user_id, req.thinking))
            .await
            .map_err(|_| RpcError::not_found())?
            .map_err(room_err)?;

        self.broadcast(&req.room_id, "set_thinking").await;
        Ok(empty())
    }

    async fn rpc_interact_player(
        &self,
        session: SessionId,
        params: Value,
    ) -> Result<Value, RpcError> {
        let req: InteractPlayerRequest = parse(params)?;
        if req.room_id.is_empty()
            || req.user_id.is_empty()
            || req.target_user_id.is_empty()
            || req.action.is_empty()
        {
            return Err(RpcError::bad_request("missing required field"));
        }
        self.authorize_user(session, &req.room_id, &req.user_id)
            .await?;

        self.rooms
            .with_room(&req.room_id, |r| {
                r.interact_player(&req.user_id, &req.target_user_id, &req.action)
            })
            .await
            .map_err(|_| RpcError::not_found())?
            .map_err(room_err)?;

        self.broadcast(&req.room_id, "interact_player").await;
        Ok(empty())
    }

    async fn rpc_feed_fire(&self, session: SessionId, params: Value) -> Result<Value, RpcError> {
        let req: FeedFireRequest = parse(params)?;
        if req.room_id.is_empty() || req.user_id.is_empty() {
            return Err(RpcError::bad_request("missing required field"));
        }
        self.authorize_user(session, &req.room_id, &req.user_id)
            .await?;

        self.rooms
            .with_room(&req.room_id, |r| {
                campfire::feed_fire(r, &req.user_id, req.tree_id, req.from_x, req.from_y)
            })
            .await
            .map_err(|_| RpcError::not_found())?
            .map_err(room_err)?;

        self.broadcast(&req.room_id, "feed_fire").await;
        Ok(empty())
    }
}

fn parse<T: DeserializeOwned>(params: Value) -> Result<T, RpcError> {
    serde_json::from_value(params).map_err(|_| RpcError::bad_request("malformed request"))
}

fn reply<T: Serialize>(body: &T) -> Result<Value, RpcError> {
    serde_json::to_value(body).map_err(|_| RpcError::internal())
}

fn empty() -> Value {
    Value::Object(serde_json::Map::new())
}

/// State and validation failures inside the room surface as bad_request
/// with the room's own message.
fn room_err(err: RoomError) -> RpcError {
    RpcError::bad_request(err.to_string())
}

/// Limits are in code points, matching the web client's counter.
fn check_len(s: &str, max: usize, what: &str) -> Result<(), RpcError> {
    if s.chars().count() > max {
        return Err(RpcError::bad_request(format!("{what} too long")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::RoomDefaults;
    use emberwire::{CODE_BAD_REQUEST, CODE_METHOD_NOT_FOUND, CODE_NOT_FOUND, CODE_PERMISSION_DENIED};
    use serde_json::json;

    fn test_hub() -> Hub {
        Hub::new(Manager::new(RoomDefaults {
            countdown: 3,
            tickets_enabled: true,
        }))
    }

    async fn create_room(hub: &Hub, session: SessionId) -> CreateRoomResponse {
        let v = hub
            .handle_rpc(
                session,
                "create_room",
                json!({"scaleId": "fibonacci", "userName": "Alice", "avatarId": "cat"}),
            )
            .await
            .unwrap();
        serde_json::from_value(v).unwrap()
    }

    async fn join_room(
        hub: &Hub,
        session: SessionId,
        room_id: &str,
        name: &str,
        user_id: Option<&str>,
    ) -> JoinRoomResponse {
        let mut params = json!({"roomId": room_id, "userName": name, "avatarId": "dog"});
        if let Some(id) = user_id {
            params["userId"] = json!(id);
        }
        let v = hub.handle_rpc(session, "join_room", params).await.unwrap();
        serde_json::from_value(v).unwrap()
    }

    async fn add_ticket(hub: &Hub, created: &CreateRoomResponse, content: &str) -> String {
        let v = hub
            .handle_rpc(
                1,
                "add_ticket",
                json!({
                    "roomId": created.room_id,
                    "adminSecret": created.admin_secret,
                    "content": content,
                }),
            )
            .await
            .unwrap();
        let resp: AddTicketResponse = serde_json::from_value(v).unwrap();
        resp.ticket_id
    }

    async fn admin(hub: &Hub, created: &CreateRoomResponse, method: &str) {
        hub.handle_rpc(
            1,
            method,
            json!({"roomId": created.room_id, "adminSecret": created.admin_secret}),
        )
        .await
        .unwrap();
    }

    async fn subscribe(
        hub: &Hub,
        session: SessionId,
        room_id: &str,
    ) -> mpsc::Receiver<ServerFrame> {
        let (tx, rx) = mpsc::channel(SESSION_BUFFER);
        hub.subscribe(session, &room_channel(room_id), tx)
            .await
            .unwrap();
        rx
    }

    fn last_snapshot(rx: &mut mpsc::Receiver<ServerFrame>) -> embercore::snapshot::RoomSnapshot {
        let mut last = None;
        while let Ok(frame) = rx.try_recv() {
            if let ServerFrame::Publication { data, .. } = frame {
                last = Some(data);
            }
        }
        serde_json::from_value(last.expect("no publication received")).unwrap()
    }

    #[tokio::test]
    async fn votes_hidden_until_reveal() {
        let hub = test_hub();
        let created = create_room(&hub, 1).await;
        add_ticket(&hub, &created, "Do X").await;
        admin(&hub, &created, "next_ticket").await;

        let joined = join_room(&hub, 2, &created.room_id, "Bob", None).await;
        let mut rx = subscribe(&hub, 3, &created.room_id).await;

        hub.handle_rpc(
            1,
            "submit_vote",
            json!({"roomId": created.room_id, "userId": created.user_id, "value": "5"}),
        )
        .await
        .unwrap();
        hub.handle_rpc(
            2,
            "submit_vote",
            json!({"roomId": created.room_id, "userId": joined.user_id, "value": "8"}),
        )
        .await
        .unwrap();

        let snap = last_snapshot(&mut rx);
        assert_eq!(snap.tickets[0].votes.len(), 2);
        assert!(snap.tickets[0].votes.iter().all(|v| v.value.is_none()));

        admin(&hub, &created, "reveal_votes").await;
        let snap = last_snapshot(&mut rx);
        let values: Vec<_> = snap.tickets[0]
            .votes
            .iter()
            .map(|v| v.value.as_deref().unwrap().to_string())
            .collect();
        assert_eq!(values.len(), 2);
        assert!(values.contains(&"5".to_string()));
        assert!(values.contains(&"8".to_string()));
    }

    #[tokio::test]
    async fn broadcast_bytes_never_carry_admin_secret() {
        let hub = test_hub();
        let created = create_room(&hub, 1).await;
        let mut rx = subscribe(&hub, 2, &created.room_id).await;
        join_room(&hub, 3, &created.room_id, "Bob", None).await;

        let frame = rx.try_recv().unwrap();
        let bytes = serde_json::to_string(&frame).unwrap();
        assert!(!bytes.contains(&created.admin_secret));
    }

    #[tokio::test]
    async fn rejoin_preserves_admin() {
        let hub = test_hub();
        let created = create_room(&hub, 1).await;

        hub.disconnect(1).await;
        let connected = hub
            .rooms()
            .with_room(&created.room_id, |r| r.users[&created.user_id].connected)
            .await
            .unwrap();
        assert!(!connected);

        let rejoined =
            join_room(&hub, 2, &created.room_id, "Alice", Some(&created.user_id)).await;
        assert_eq!(rejoined.user_id, created.user_id);
        let me = rejoined
            .state
            .users
            .iter()
            .find(|u| u.id == created.user_id)
            .unwrap();
        assert!(me.is_admin);
        assert!(me.connected);
    }

    #[tokio::test]
    async fn multi_tab_presence() {
        let hub = test_hub();
        let created = create_room(&hub, 1).await;

        // Same user opens a second tab.
        join_room(&hub, 2, &created.room_id, "Alice", Some(&created.user_id)).await;
        let mut rx = subscribe(&hub, 3, &created.room_id).await;

        hub.disconnect(1).await;
        let connected = hub
            .rooms()
            .with_room(&created.room_id, |r| r.users[&created.user_id].connected)
            .await
            .unwrap();
        assert!(connected, "closing one of two tabs must not flip presence");
        assert!(rx.try_recv().is_err(), "no broadcast for a surviving user");

        hub.disconnect(2).await;
        let connected = hub
            .rooms()
            .with_room(&created.room_id, |r| r.users[&created.user_id].connected)
            .await
            .unwrap();
        assert!(!connected);
        let snap = last_snapshot(&mut rx);
        assert!(!snap.users[0].connected);
    }

    #[tokio::test]
    async fn admin_secret_gate_leaves_room_unchanged() {
        let hub = test_hub();
        let created = create_room(&hub, 1).await;
        add_ticket(&hub, &created, "Do X").await;
        admin(&hub, &created, "next_ticket").await;

        let before = hub
            .rooms()
            .with_room(&created.room_id, |r| {
                (r.state, r.last_activity_at, r.tickets.clone())
            })
            .await
            .unwrap();

        let err = hub
            .handle_rpc(
                1,
                "reveal_votes",
                json!({"roomId": created.room_id, "adminSecret": "wrong"}),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, CODE_PERMISSION_DENIED);

        let after = hub
            .rooms()
            .with_room(&created.room_id, |r| {
                (r.state, r.last_activity_at, r.tickets.clone())
            })
            .await
            .unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn unknown_room_is_not_found_even_for_admin_methods() {
        let hub = test_hub();
        let err = hub
            .handle_rpc(
                1,
                "reveal_votes",
                json!({"roomId": "ghost", "adminSecret": "whatever"}),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, CODE_NOT_FOUND);
    }

    #[tokio::test]
    async fn vote_requires_matching_session_binding() {
        let hub = test_hub();
        let created = create_room(&hub, 1).await;
        add_ticket(&hub, &created, "Do X").await;
        admin(&hub, &created, "next_ticket").await;

        // Session 9 never joined; session 2 joined as someone else.
        let err = hub
            .handle_rpc(
                9,
                "submit_vote",
                json!({"roomId": created.room_id, "userId": created.user_id, "value": "5"}),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, CODE_PERMISSION_DENIED);

        join_room(&hub, 2, &created.room_id, "Bob", None).await;
        let err = hub
            .handle_rpc(
                2,
                "submit_vote",
                json!({"roomId": created.room_id, "userId": created.user_id, "value": "5"}),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, CODE_PERMISSION_DENIED);
    }

    #[tokio::test]
    async fn state_errors_surface_as_bad_request() {
        let hub = test_hub();
        let created = create_room(&hub, 1).await;

        // Reveal with no ticket in flight.
        let err = hub
            .handle_rpc(
                1,
                "reveal_votes",
                json!({"roomId": created.room_id, "adminSecret": created.admin_secret}),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, CODE_BAD_REQUEST);
        assert_eq!(err.message, "room is not in voting state");
    }

    #[tokio::test]
    async fn invalid_vote_value_rejected() {
        let hub = test_hub();
        let created = create_room(&hub, 1).await;
        add_ticket(&hub, &created, "Do X").await;
        admin(&hub, &created, "next_ticket").await;

        let err = hub
            .handle_rpc(
                1,
                "submit_vote",
                json!({"roomId": created.room_id, "userId": created.user_id, "value": "7"}),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, CODE_BAD_REQUEST);
        assert_eq!(err.message, "invalid vote value");
    }

    #[tokio::test]
    async fn create_room_validation() {
        let hub = test_hub();
        for params in [
            json!({"scaleId": "", "userName": "Alice", "avatarId": "cat"}),
            json!({"scaleId": "nope", "userName": "Alice", "avatarId": "cat"}),
            json!({"scaleId": "fibonacci", "userName": "Alice", "avatarId": "dragon"}),
            json!({"scaleId": "fibonacci", "userName": "", "avatarId": "cat"}),
            json!(42),
        ] {
            let err = hub.handle_rpc(1, "create_room", params).await.unwrap_err();
            assert_eq!(err.code, CODE_BAD_REQUEST);
        }
        assert_eq!(hub.rooms().count().await, 0);
    }

    #[tokio::test]
    async fn oversized_name_and_content_rejected() {
        let hub = test_hub();
        let created = create_room(&hub, 1).await;

        let long_name: String = "x".repeat(201);
        let err = hub
            .handle_rpc(
                1,
                "update_room_name",
                json!({
                    "roomId": created.room_id,
                    "adminSecret": created.admin_secret,
                    "name": long_name,
                }),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, CODE_BAD_REQUEST);

        let long_content: String = "y".repeat(10_001);
        let err = hub
            .handle_rpc(
                1,
                "add_ticket",
                json!({
                    "roomId": created.room_id,
                    "adminSecret": created.admin_secret,
                    "content": long_content,
                }),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, CODE_BAD_REQUEST);
    }

    #[tokio::test]
    async fn update_room_name_roundtrip() {
        let hub = test_hub();
        let created = create_room(&hub, 1).await;
        let mut rx = subscribe(&hub, 2, &created.room_id).await;

        hub.handle_rpc(
            1,
            "update_room_name",
            json!({
                "roomId": created.room_id,
                "adminSecret": created.admin_secret,
                "name": "Sprint 42",
            }),
        )
        .await
        .unwrap();

        let snap = last_snapshot(&mut rx);
        assert_eq!(snap.name, "Sprint 42");
    }

    #[tokio::test]
    async fn method_not_found() {
        let hub = test_hub();
        let err = hub
            .handle_rpc(1, "drop_tables", json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.code, CODE_METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn subscribe_gate() {
        let hub = test_hub();
        let created = create_room(&hub, 1).await;
        let (tx, _rx) = mpsc::channel(4);

        let err = hub
            .subscribe(2, "admin:everything", tx.clone())
            .await
            .unwrap_err();
        assert_eq!(err.code, CODE_PERMISSION_DENIED);

        let err = hub.subscribe(2, "room:ghost", tx.clone()).await.unwrap_err();
        assert_eq!(err.code, CODE_PERMISSION_DENIED);

        hub.subscribe(2, &room_channel(&created.room_id), tx)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn tickets_toggle_rejects_add_ticket() {
        let hub = Hub::new(Manager::new(RoomDefaults {
            countdown: 3,
            tickets_enabled: false,
        }));
        let created = create_room(&hub, 1).await;

        let err = hub
            .handle_rpc(
                1,
                "add_ticket",
                json!({
                    "roomId": created.room_id,
                    "adminSecret": created.admin_secret,
                    "content": "Do X",
                }),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, CODE_BAD_REQUEST);

        // The flag also reaches clients through the snapshot.
        let joined = join_room(&hub, 2, &created.room_id, "Bob", None).await;
        assert!(!joined.state.tickets_enabled);
    }

    #[tokio::test]
    async fn free_vote_flow_over_rpc() {
        let hub = test_hub();
        let created = create_room(&hub, 1).await;
        let mut rx = subscribe(&hub, 2, &created.room_id).await;

        admin(&hub, &created, "start_free_vote").await;
        let snap = last_snapshot(&mut rx);
        assert_eq!(snap.state, embercore::model::RoomState::Voting);
        assert_eq!(snap.tickets.len(), 1);
        assert!(snap.tickets[0].content.is_empty());
        assert_eq!(snap.current_ticket_id, snap.tickets[0].id);

        // Calling it again changes nothing observable.
        admin(&hub, &created, "start_free_vote").await;
        let again = last_snapshot(&mut rx);
        assert_eq!(again.tickets, snap.tickets);
        assert_eq!(again.current_ticket_id, snap.current_ticket_id);
    }

    #[tokio::test]
    async fn countdown_then_reveal() {
        let hub = test_hub();
        let created = create_room(&hub, 1).await;
        add_ticket(&hub, &created, "Do X").await;
        admin(&hub, &created, "next_ticket").await;
        let mut rx = subscribe(&hub, 2, &created.room_id).await;

        admin(&hub, &created, "start_reveal").await;
        let snap = last_snapshot(&mut rx);
        assert_eq!(snap.state, embercore::model::RoomState::CountingDown);

        // Last-second vote still lands during the countdown.
        hub.handle_rpc(
            1,
            "submit_vote",
            json!({"roomId": created.room_id, "userId": created.user_id, "value": "13"}),
        )
        .await
        .unwrap();

        admin(&hub, &created, "reveal_votes").await;
        let snap = last_snapshot(&mut rx);
        assert_eq!(snap.state, embercore::model::RoomState::Revealed);
        assert_eq!(snap.tickets[0].votes[0].value.as_deref(), Some("13"));
    }

    #[tokio::test]
    async fn feed_fire_event_rides_one_snapshot() {
        let hub = test_hub();
        let created = create_room(&hub, 1).await;
        let mut rx = subscribe(&hub, 2, &created.room_id).await;

        hub.handle_rpc(
            1,
            "feed_fire",
            json!({
                "roomId": created.room_id,
                "userId": created.user_id,
                "treeId": 0,
                "fromX": 12.0,
                "fromY": 34.0,
            }),
        )
        .await
        .unwrap();

        let snap = last_snapshot(&mut rx);
        assert_eq!(snap.events.len(), 1);
        assert_eq!(snap.events[0].action, "feed_fire");

        // A later broadcast must not replay the event.
        hub.handle_rpc(
            1,
            "set_thinking",
            json!({"roomId": created.room_id, "userId": created.user_id, "thinking": true}),
        )
        .await
        .unwrap();
        let snap = last_snapshot(&mut rx);
        assert!(snap.events.is_empty());
        assert!(snap.users[0].thinking);
    }

    #[tokio::test]
    async fn interact_player_broadcasts_event() {
        let hub = test_hub();
        let created = create_room(&hub, 1).await;
        let joined = join_room(&hub, 2, &created.room_id, "Bob", None).await;
        let mut rx = subscribe(&hub, 3, &created.room_id).await;

        hub.handle_rpc(
            2,
            "interact_player",
            json!({
                "roomId": created.room_id,
                "userId": joined.user_id,
                "targetUserId": created.user_id,
                "action": "paper_throw",
            }),
        )
        .await
        .unwrap();

        let snap = last_snapshot(&mut rx);
        assert_eq!(snap.events.len(), 1);
        assert_eq!(snap.events[0].action, "paper_throw");
        assert_eq!(snap.events[0].to_id, created.user_id);
    }

    #[tokio::test]
    async fn unsubscribed_session_stops_receiving() {
        let hub = test_hub();
        let created = create_room(&hub, 1).await;
        let mut rx = subscribe(&hub, 2, &created.room_id).await;

        hub.unsubscribe(2, &room_channel(&created.room_id)).await;
        join_room(&hub, 3, &created.room_id, "Bob", None).await;
        assert!(rx.try_recv().is_err());
    }
}
