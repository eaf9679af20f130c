//! Room state machine.
//!
//! Every operation takes `&mut Room`, returns a typed failure, and stamps
//! `last_activity_at` on success. Nothing here blocks; the caller holds the
//! per-room gate.

use std::collections::HashMap;

use chrono::Utc;

use crate::RoomError;
use crate::model::{Room, RoomState, Ticket, TicketStatus, User};
use crate::model::{EVENT_PLAYER_INTERACTION, RoomEvent};
use crate::scale;

impl Room {
    pub fn new(
        id: impl Into<String>,
        admin_secret: impl Into<String>,
        scale_id: impl Into<String>,
        countdown: u32,
        tickets_enabled: bool,
    ) -> Self {
        let now = Utc::now();
        Room {
            id: id.into(),
            name: String::new(),
            admin_secret: admin_secret.into(),
            scale_id: scale_id.into(),
            countdown,
            tickets_enabled,
            state: RoomState::Idle,
            users: HashMap::new(),
            tickets: Vec::new(),
            current_ticket_id: None,
            created_at: now,
            last_activity_at: now,
            pending_events: Vec::new(),
            theme_state: None,
        }
    }

    pub(crate) fn touch(&mut self) {
        self.last_activity_at = Utc::now();
    }

    fn ticket_mut(&mut self, id: &str) -> Option<&mut Ticket> {
        self.tickets.iter_mut().find(|t| t.id == id)
    }

    pub fn current_ticket(&self) -> Option<&Ticket> {
        let id = self.current_ticket_id.as_deref()?;
        self.tickets.iter().find(|t| t.id == id)
    }

    fn current_index(&self) -> Option<usize> {
        let id = self.current_ticket_id.as_deref()?;
        self.tickets.iter().position(|t| t.id == id)
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
        self.touch();
    }

    /// Adds a user, or rebinds an existing id. A rebinding takes the latest
    /// name and avatar but keeps `is_admin` and `joined_at`, so an admin who
    /// rejoins with their stored id stays admin.
    pub fn add_user(&mut self, id: &str, name: &str, avatar_id: &str, is_admin: bool) {
        match self.users.get_mut(id) {
            Some(u) => {
                u.name = name.to_string();
                u.avatar_id = avatar_id.to_string();
                u.connected = true;
            }
            None => {
                self.users.insert(
                    id.to_string(),
                    User {
                        id: id.to_string(),
                        name: name.to_string(),
                        avatar_id: avatar_id.to_string(),
                        is_admin,
                        connected: true,
                        thinking: false,
                        joined_at: Utc::now(),
                    },
                );
            }
        }
        self.touch();
    }

    /// Flips the user's presence off. The user stays in the map so votes and
    /// admin status survive a reconnect.
    pub fn mark_disconnected(&mut self, user_id: &str) {
        if let Some(u) = self.users.get_mut(user_id) {
            u.connected = false;
            u.thinking = false;
            self.touch();
        }
    }

    pub fn set_thinking(&mut self, user_id: &str, thinking: bool) -> Result<(), RoomError> {
        let u = self.users.get_mut(user_id).ok_or(RoomError::UserNotFound)?;
        u.thinking = thinking;
        self.touch();
        Ok(())
    }

    /// Records a vote on the current ticket. Re-voting overwrites. Allowed
    /// during the countdown for last-second changes.
    pub fn submit_vote(&mut self, user_id: &str, value: &str) -> Result<(), RoomError> {
        if !matches!(self.state, RoomState::Voting | RoomState::CountingDown) {
            return Err(RoomError::NotVoting);
        }
        let Some(current_id) = self.current_ticket_id.clone() else {
            return Err(RoomError::NoCurrentTicket);
        };
        if !self.users.contains_key(user_id) {
            return Err(RoomError::UserNotFound);
        }
        if !scale::valid_value(&self.scale_id, value) {
            return Err(RoomError::InvalidVote);
        }
        let ticket = self
            .ticket_mut(&current_id)
            .ok_or(RoomError::TicketNotFound)?;
        ticket.votes.insert(user_id.to_string(), value.to_string());
        self.touch();
        Ok(())
    }

    pub fn remove_vote(&mut self, user_id: &str) -> Result<(), RoomError> {
        if !matches!(self.state, RoomState::Voting | RoomState::CountingDown) {
            return Err(RoomError::NotVoting);
        }
        let Some(current_id) = self.current_ticket_id.clone() else {
            return Err(RoomError::NoCurrentTicket);
        };
        if !self.users.contains_key(user_id) {
            return Err(RoomError::UserNotFound);
        }
        let ticket = self
            .ticket_mut(&current_id)
            .ok_or(RoomError::TicketNotFound)?;
        ticket.votes.remove(user_id);
        self.touch();
        Ok(())
    }

    /// voting -> counting_down. The countdown is a sub-phase of voting; the
    /// current ticket keeps status `voting`.
    pub fn start_countdown(&mut self) -> Result<(), RoomError> {
        if self.state != RoomState::Voting {
            return Err(RoomError::NotVoting);
        }
        self.state = RoomState::CountingDown;
        self.touch();
        Ok(())
    }

    /// Atomically flips the room and the current ticket to revealed. The
    /// sanitizer runs under the same gate, so it sees either all-hidden or
    /// all-visible, never a mix.
    pub fn reveal_votes(&mut self) -> Result<(), RoomError> {
        if !matches!(self.state, RoomState::Voting | RoomState::CountingDown) {
            return Err(RoomError::NotVoting);
        }
        let current_id = self
            .current_ticket_id
            .clone()
            .ok_or(RoomError::NoCurrentTicket)?;
        self.state = RoomState::Revealed;
        if let Some(t) = self.ticket_mut(&current_id) {
            t.status = TicketStatus::Revealed;
        }
        self.touch();
        Ok(())
    }

    /// Clears votes on the current ticket and returns to voting. Also clears
    /// everyone's thinking flag so stale hints don't survive the restart.
    pub fn reset_votes(&mut self) -> Result<(), RoomError> {
        let current_id = self
            .current_ticket_id
            .clone()
            .ok_or(RoomError::NoCurrentTicket)?;
        let ticket = self
            .ticket_mut(&current_id)
            .ok_or(RoomError::TicketNotFound)?;
        ticket.votes.clear();
        ticket.status = TicketStatus::Voting;
        self.state = RoomState::Voting;
        for u in self.users.values_mut() {
            u.thinking = false;
        }
        self.touch();
        Ok(())
    }

    pub fn add_ticket(&mut self, id: &str, content: &str) {
        self.tickets.push(Ticket {
            id: id.to_string(),
            content: content.to_string(),
            status: TicketStatus::Pending,
            votes: HashMap::new(),
        });
        self.touch();
    }

    /// Moves the room to an arbitrary ticket on the timeline.
    ///
    /// Leaving a ticket that is still `voting` abandons it as `skipped`.
    /// The target decides the room phase: a pending ticket opens for voting,
    /// a revealed ticket is shown with its votes intact, a skipped ticket is
    /// reopened with votes cleared, and a voting ticket is resumed as-is.
    pub fn navigate_to(&mut self, ticket_id: &str) -> Result<(), RoomError> {
        let target = self
            .tickets
            .iter()
            .position(|t| t.id == ticket_id)
            .ok_or(RoomError::TicketNotFound)?;

        if let Some(outgoing) = self.current_ticket_id.clone() {
            if outgoing != ticket_id {
                if let Some(t) = self.ticket_mut(&outgoing) {
                    if t.status == TicketStatus::Voting {
                        t.status = TicketStatus::Skipped;
                    }
                }
            }
        }

        let t = &mut self.tickets[target];
        self.state = match t.status {
            TicketStatus::Pending => {
                t.status = TicketStatus::Voting;
                RoomState::Voting
            }
            TicketStatus::Revealed => RoomState::Revealed,
            TicketStatus::Skipped => {
                t.status = TicketStatus::Voting;
                t.votes.clear();
                RoomState::Voting
            }
            TicketStatus::Voting => RoomState::Voting,
        };
        self.current_ticket_id = Some(ticket_id.to_string());
        self.touch();
        Ok(())
    }

    /// Advances to the next ticket in insertion order. No wrap; at the end
    /// this is `TicketNotFound` and the room is left untouched. From idle it
    /// enters the first ticket.
    pub fn next_ticket_by_index(&mut self) -> Result<(), RoomError> {
        let next = match self.current_index() {
            Some(i) => i + 1,
            None => 0,
        };
        let id = self
            .tickets
            .get(next)
            .ok_or(RoomError::TicketNotFound)?
            .id
            .clone();
        self.navigate_to(&id)
    }

    /// Retreats to the previous ticket. No wrap; at the start this is
    /// `TicketNotFound` and the room is left untouched.
    pub fn prev_ticket(&mut self) -> Result<(), RoomError> {
        let i = self.current_index().ok_or(RoomError::TicketNotFound)?;
        if i == 0 {
            return Err(RoomError::TicketNotFound);
        }
        let id = self.tickets[i - 1].id.clone();
        self.navigate_to(&id)
    }

    /// Opens an ad-hoc estimation round on an empty-content ticket.
    ///
    /// No-op when such a round is already open. Rejected while a real
    /// (content-bearing) ticket is mid-vote, so an admin fat-finger can't
    /// clobber it. Reuses a spent free-vote ticket where possible so
    /// revealed free-vote results stay on the timeline.
    pub fn start_free_vote(&mut self, new_id: &str) -> Result<(), RoomError> {
        let (free_vote_open, real_ticket) = match self.current_ticket() {
            Some(cur) => (
                cur.content.is_empty() && cur.status == TicketStatus::Voting,
                !cur.content.is_empty(),
            ),
            None => (false, false),
        };
        if free_vote_open {
            self.touch();
            return Ok(());
        }
        if real_ticket && matches!(self.state, RoomState::Voting | RoomState::CountingDown) {
            return Err(RoomError::NotVoting);
        }

        if let Some(outgoing) = self.current_ticket_id.clone() {
            if let Some(t) = self.ticket_mut(&outgoing) {
                if t.status == TicketStatus::Voting {
                    t.status = TicketStatus::Skipped;
                }
            }
        }
        for u in self.users.values_mut() {
            u.thinking = false;
        }

        let reusable = self.tickets.iter().position(|t| {
            t.content.is_empty()
                && matches!(t.status, TicketStatus::Skipped | TicketStatus::Pending)
        });
        let id = match reusable {
            Some(i) => {
                let t = &mut self.tickets[i];
                t.votes.clear();
                t.status = TicketStatus::Voting;
                t.id.clone()
            }
            None => {
                self.tickets.push(Ticket {
                    id: new_id.to_string(),
                    content: String::new(),
                    status: TicketStatus::Voting,
                    votes: HashMap::new(),
                });
                new_id.to_string()
            }
        };
        self.current_ticket_id = Some(id);
        self.state = RoomState::Voting;
        self.touch();
        Ok(())
    }

    /// Queues a player-to-player animation event (e.g. `paper_throw`).
    pub fn interact_player(
        &mut self,
        from_id: &str,
        to_id: &str,
        action: &str,
    ) -> Result<(), RoomError> {
        if !self.users.contains_key(from_id) || !self.users.contains_key(to_id) {
            return Err(RoomError::UserNotFound);
        }
        self.pending_events.push(RoomEvent {
            kind: EVENT_PLAYER_INTERACTION.to_string(),
            action: action.to_string(),
            from_id: from_id.to_string(),
            to_id: to_id.to_string(),
            payload: None,
        });
        self.touch();
        Ok(())
    }
}
