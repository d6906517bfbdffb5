//! Message types used by the relay.
//!
//! These are **transport-agnostic** logical messages:
//! - [`Message`]: an accepted chat message, immutable once logged.
//! - [`RecipientSelector`]: who a message is addressed to.
//! - [`PushEvent`]: what gets pushed down a connection's outbound channel.
//!
//! Note: JSON / line encoders live in the `relay-protocol` crate;
//! this module is purely logical.

use std::fmt;
use std::sync::Arc;

use crate::error::IdError;
use crate::groups::GroupDirectory;
use crate::participant::{GroupName, ParticipantId, BROADCAST_TOKEN, GROUP_PREFIX};

/// Addressee of a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecipientSelector {
    /// Exactly one participant (all of their connections).
    Participant(ParticipantId),

    /// Every member of a configured group.
    Group(GroupName),

    /// Every participant.
    Everyone,
}

impl RecipientSelector {
    /// Parse the wire form: `None` / `"*"` => everyone, `"#name"` => group,
    /// anything else => a participant id.
    pub fn parse(raw: Option<&str>) -> Result<Self, IdError> {
        match raw {
            None | Some(BROADCAST_TOKEN) => Ok(RecipientSelector::Everyone),
            Some(s) if s.starts_with(GROUP_PREFIX) => Ok(RecipientSelector::Group(GroupName::parse(s)?)),
            Some(s) => Ok(RecipientSelector::Participant(ParticipantId::parse(s)?)),
        }
    }

    /// True when a message with this selector is addressed to `participant`.
    pub fn includes(&self, participant: &ParticipantId, groups: &GroupDirectory) -> bool {
        match self {
            RecipientSelector::Participant(id) => id == participant,
            RecipientSelector::Group(name) => groups.is_member(name, participant),
            RecipientSelector::Everyone => true,
        }
    }
}

impl fmt::Display for RecipientSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecipientSelector::Participant(id) => write!(f, "{}", id),
            RecipientSelector::Group(name) => write!(f, "{}", name),
            RecipientSelector::Everyone => f.write_str(BROADCAST_TOKEN),
        }
    }
}

/// Total-order key of a logged message.
///
/// `time` is wall-clock milliseconds clamped to never go backwards;
/// `seq` breaks ties between messages stamped in the same millisecond.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageKey {
    pub time: u64,
    pub seq: u64,
}

/// An accepted chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub sender: ParticipantId,
    pub recipient: RecipientSelector,
    pub text: String,

    /// Milliseconds since the Unix epoch, non-decreasing across the log.
    pub time: u64,

    /// Strictly increasing across the log.
    pub seq: u64,
}

impl Message {
    pub fn key(&self) -> MessageKey {
        MessageKey {
            time: self.time,
            seq: self.seq,
        }
    }

    /// True when `participant` sent this message or is one of its recipients.
    pub fn involves(&self, participant: &ParticipantId, groups: &GroupDirectory) -> bool {
        &self.sender == participant || self.recipient.includes(participant, groups)
    }
}

/// Event pushed to a single connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    /// A chat message, either live fan-out or replay.
    NewMessage(Arc<Message>),
}

impl PushEvent {
    /// Event name as seen by clients.
    pub fn name(&self) -> &'static str {
        match self {
            PushEvent::NewMessage(_) => "newMessage",
        }
    }

    /// Log sequence number of the message carried by this event.
    pub fn seq(&self) -> u64 {
        match self {
            PushEvent::NewMessage(msg) => msg.seq,
        }
    }
}
