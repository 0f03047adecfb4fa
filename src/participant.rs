//! Participant identity and the delivery capability a room broadcasts to.

use std::fmt;

use uuid::Uuid;

use crate::message::Message;

/// Opaque identity of one connection, unique per connection instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParticipantId(Uuid);

impl ParticipantId {
    /// Allocate a fresh random identity.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ParticipantId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is plenty to tell connections apart in logs.
        let simple = self.0.simple().to_string();
        write!(f, "conn:{}", &simple[..8])
    }
}

/// Something a room can hand messages to.
///
/// Implementations must not block: `deliver` only enqueues.
pub trait Participant: Send + Sync + fmt::Debug {
    /// Identity the room keys membership by.
    fn id(&self) -> ParticipantId;

    /// Queue `message` for this participant.
    ///
    /// Returns `false` if the participant can no longer receive messages.
    fn deliver(&self, message: Message) -> bool;
}
