//! Error types for the relay core.
//!
//! None of these are fatal to the process. Recipient-offline is not an
//! error at all (it shows up as `recipient_online: false` in a
//! [`DeliveryReport`](crate::relay::DeliveryReport)), and per-connection
//! delivery failures are collected in the report rather than returned.

use thiserror::Error;

use crate::participant::{ConnectionId, ParticipantId};

/// A participant id or group name failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("identifier is empty")]
    Empty,

    #[error("identifier is {len} bytes, limit is {max}")]
    TooLong { len: usize, max: usize },

    #[error("identifier contains invalid character {0:?}")]
    InvalidChar(char),

    #[error("identifier {0:?} is reserved")]
    Reserved(String),
}

/// Rejection of a submission. Nothing has been logged or delivered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

impl RelayError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        RelayError::InvalidMessage(reason.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A connection can represent only one participant at a time.
    #[error("{connection} is already registered to {owner}")]
    HandleClaimed {
        connection: ConnectionId,
        owner: ParticipantId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    /// The identity claim of a connection is read once; it cannot change.
    #[error("{0} is already open")]
    AlreadyOpen(ConnectionId),

    /// The transport already dropped the connection.
    #[error("{0} is closed")]
    Closed(ConnectionId),

    #[error("invalid identity claim: {0}")]
    InvalidIdentity(#[from] IdError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}
