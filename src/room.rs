//! The chat room: membership plus a bounded window of recent messages.
//!
//! `ChatRoom` is a plain struct mutated through `&mut self`. The server
//! keeps exactly one instance inside its event loop, so `join`, `leave` and
//! `deliver` are serialized by that loop's event queue and every member
//! observes the same message order.

use std::collections::{HashMap, VecDeque};

use crate::constants::DEFAULT_HISTORY_LIMIT;
use crate::message::Message;
use crate::participant::{Participant, ParticipantId};

/// Shared room state.
#[derive(Debug)]
pub struct ChatRoom {
    /// Joined participants keyed by identity.
    members: HashMap<ParticipantId, Box<dyn Participant>>,
    /// Recent messages, oldest first.
    history: VecDeque<Message>,
    /// Maximum number of messages kept in `history`.
    history_limit: usize,
}

impl Default for ChatRoom {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatRoom {
    /// Create an empty room keeping [`DEFAULT_HISTORY_LIMIT`] messages.
    pub fn new() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }

    /// Create an empty room keeping up to `limit` messages (at least one).
    pub fn with_history_limit(limit: usize) -> Self {
        let history_limit = limit.max(1);
        Self {
            members: HashMap::new(),
            history: VecDeque::with_capacity(history_limit),
            history_limit,
        }
    }

    /// Add a participant and replay the current history to it alone.
    ///
    /// Replay goes through the participant's normal delivery queue, so it
    /// lands ahead of any message delivered after this call. Joining twice
    /// is a no-op and returns `false`.
    pub fn join(&mut self, participant: Box<dyn Participant>) -> bool {
        let id = participant.id();
        if self.members.contains_key(&id) {
            log::debug!("[Room] {id} already joined");
            return false;
        }

        for message in &self.history {
            if !participant.deliver(message.clone()) {
                log::debug!("[Room] {id} closed during history replay");
                break;
            }
        }

        log::info!(
            "[Room] {id} joined ({} replayed, {} members)",
            self.history.len(),
            self.members.len() + 1
        );
        self.members.insert(id, participant);
        true
    }

    /// Remove a participant. Removing an absent identity is a no-op.
    pub fn leave(&mut self, id: ParticipantId) -> bool {
        let removed = self.members.remove(&id).is_some();
        if removed {
            log::info!("[Room] {id} left ({} members)", self.members.len());
        }
        removed
    }

    /// Record `message` in history and broadcast it to every member.
    ///
    /// The originating connection receives its own message like everyone
    /// else. Returns the number of members the message was queued for.
    pub fn deliver(&mut self, message: Message) -> usize {
        self.history.push_back(message.clone());
        while self.history.len() > self.history_limit {
            self.history.pop_front();
        }

        let mut delivered = 0;
        for (id, member) in &self.members {
            if member.deliver(message.clone()) {
                delivered += 1;
            } else {
                // The member's own close notification will remove it.
                log::debug!("[Room] dropped message for closed member {id}");
            }
        }
        delivered
    }

    /// Recent messages, oldest first.
    pub fn history(&self) -> impl ExactSizeIterator<Item = &Message> + '_ {
        self.history.iter()
    }

    /// Maximum number of retained messages.
    pub fn history_limit(&self) -> usize {
        self.history_limit
    }

    /// Number of joined participants.
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Whether `id` is currently joined.
    pub fn contains(&self, id: ParticipantId) -> bool {
        self.members.contains_key(&id)
    }
}
