//! Non-owning handles to transport connections.
//!
//! The transport owns each connection's outbound channel: it holds the
//! strong [`OutboundTx`] for as long as the connection lives and drains the
//! matching [`OutboundRx`] into the socket. The core only ever keeps a
//! [`ConnectionHandle`], which wraps a *weak* sender; once the transport
//! drops its side the handle stops being live and pushes fail with
//! [`DeliveryError::Closed`].

use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc::{self, error::SendTimeoutError};

use crate::messages::PushEvent;
use crate::participant::ConnectionId;

/// Outbound events from the relay to one connection.
pub type OutboundTx = mpsc::Sender<PushEvent>;
pub type OutboundRx = mpsc::Receiver<PushEvent>;

/// Create a bounded outbound channel for a new connection.
pub fn outbound_channel(capacity: usize) -> (OutboundTx, OutboundRx) {
    mpsc::channel(capacity.max(1))
}

/// Why a push to one connection did not happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("connection closed")]
    Closed,

    #[error("delivery timed out")]
    Timeout,
}

#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    outbound: mpsc::WeakSender<PushEvent>,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, outbound: &OutboundTx) -> Self {
        ConnectionHandle {
            id,
            outbound: outbound.downgrade(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Validity check: the transport still holds the connection open.
    pub fn is_live(&self) -> bool {
        self.outbound
            .upgrade()
            .map_or(false, |tx| !tx.is_closed())
    }

    /// Push one event, waiting at most `timeout` for buffer space.
    pub async fn push(&self, event: PushEvent, timeout: Duration) -> Result<(), DeliveryError> {
        let tx = self.outbound.upgrade().ok_or(DeliveryError::Closed)?;
        match tx.send_timeout(event, timeout).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => Err(DeliveryError::Timeout),
            Err(SendTimeoutError::Closed(_)) => Err(DeliveryError::Closed),
        }
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConnectionHandle {}
