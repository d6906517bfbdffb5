//! Identifiers used throughout the relay.
//!
//! - [`ParticipantId`]: the logical identity a connection claims
//!   (e.g. `"me"`, `"friend"`, a user id).
//! - [`GroupName`]: a named broadcast group, written `#name` on the wire.
//! - [`ConnectionId`]: one transport-level connection.
//!
//! Participant ids are opaque to the relay; the only thing checked is that
//! they are well-formed so they can travel through every transport
//! (query strings, comma-separated line frames, JSON) unchanged.

use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use crate::error::IdError;

/// Longest accepted participant id / group name, in bytes.
pub const MAX_ID_LEN: usize = 64;

/// Wire token addressing every online participant.
pub const BROADCAST_TOKEN: &str = "*";

/// Prefix marking a group name on the wire.
pub const GROUP_PREFIX: char = '#';

/// Logical identity of a chat participant.
///
/// Unique per participant, **not** per connection: one participant may
/// hold several connections at once.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParticipantId(String);

impl ParticipantId {
    /// Validate and wrap a raw participant id.
    pub fn parse(raw: &str) -> Result<Self, IdError> {
        check_token(raw)?;
        if raw == BROADCAST_TOKEN || raw.starts_with(GROUP_PREFIX) {
            return Err(IdError::Reserved(raw.to_string()));
        }
        Ok(ParticipantId(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ParticipantId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ParticipantId::parse(s)
    }
}

impl Borrow<str> for ParticipantId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name of a broadcast group (stored without the leading `#`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupName(String);

impl GroupName {
    /// Parse a group name, with or without the leading `#`.
    pub fn parse(raw: &str) -> Result<Self, IdError> {
        let name = raw.strip_prefix(GROUP_PREFIX).unwrap_or(raw);
        check_token(name)?;
        if name.starts_with(GROUP_PREFIX) || name == BROADCAST_TOKEN {
            return Err(IdError::Reserved(raw.to_string()));
        }
        Ok(GroupName(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", GROUP_PREFIX, self.0)
    }
}

/// Identifier for one transport connection.
///
/// Allocated by the transport layer; guaranteed unique over the lifetime
/// of the process and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

fn check_token(raw: &str) -> Result<(), IdError> {
    if raw.is_empty() {
        return Err(IdError::Empty);
    }
    if raw.len() > MAX_ID_LEN {
        return Err(IdError::TooLong {
            len: raw.len(),
            max: MAX_ID_LEN,
        });
    }
    if let Some(c) = raw.chars().find(|c| c.is_whitespace() || c.is_control() || *c == ',') {
        return Err(IdError::InvalidChar(c));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_ids() {
        assert_eq!(ParticipantId::parse("me").unwrap().as_str(), "me");
        assert_eq!(ParticipantId::parse("user-42").unwrap().to_string(), "user-42");
    }

    #[test]
    fn rejects_malformed_ids() {
        assert_eq!(ParticipantId::parse(""), Err(IdError::Empty));
        assert_eq!(ParticipantId::parse("a b"), Err(IdError::InvalidChar(' ')));
        assert_eq!(ParticipantId::parse("a,b"), Err(IdError::InvalidChar(',')));
        assert!(matches!(
            ParticipantId::parse(&"x".repeat(MAX_ID_LEN + 1)),
            Err(IdError::TooLong { .. })
        ));
        assert!(matches!(ParticipantId::parse("*"), Err(IdError::Reserved(_))));
        assert!(matches!(ParticipantId::parse("#team"), Err(IdError::Reserved(_))));
    }

    #[test]
    fn group_names_strip_prefix() {
        let g = GroupName::parse("#team").unwrap();
        assert_eq!(g.as_str(), "team");
        assert_eq!(g.to_string(), "#team");
        assert_eq!(GroupName::parse("team").unwrap(), g);
        assert!(GroupName::parse("#").is_err());
    }
}
