//! Shared types for the relay server.
//!
//! This module defines:
//! - `ConnectionTracker` / `ConnectionSlot`: id allocation and the
//!   connection cap, shared by every transport
//! - `LifecycleEvent`: messages flowing from transports to the lifecycle task
//! - `AppState`: what the HTTP handlers and transports share

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use relay_core::{ConnectionHandle, ConnectionId, LifecycleError, Opened, Relay};
use tokio::sync::{mpsc, oneshot};

use crate::config::Config;

/// Allocates connection ids and enforces `max_connections`.
///
/// One per server instance; ids are unique for its lifetime.
#[derive(Debug)]
pub struct ConnectionTracker {
    next_id: AtomicU64,
    active: AtomicUsize,
    max: usize,
}

impl ConnectionTracker {
    pub fn new(max: usize) -> Self {
        ConnectionTracker {
            next_id: AtomicU64::new(1),
            active: AtomicUsize::new(0),
            max,
        }
    }

    /// Reserve a slot for a new connection, or `None` at capacity.
    pub fn try_acquire(self: &Arc<Self>) -> Option<ConnectionSlot> {
        let mut current = self.active.load(Ordering::Relaxed);
        loop {
            if current >= self.max {
                return None;
            }
            match self
                .active
                .compare_exchange_weak(current, current + 1, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        Some(ConnectionSlot {
            id,
            tracker: self.clone(),
        })
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }
}

/// A reserved connection; releases its slot when dropped.
#[derive(Debug)]
pub struct ConnectionSlot {
    id: ConnectionId,
    tracker: Arc<ConnectionTracker>,
}

impl ConnectionSlot {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.tracker.active.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Message flowing from a transport task into the lifecycle task.
#[derive(Debug)]
pub enum LifecycleEvent {
    Connect {
        connection: ConnectionId,
    },
    Open {
        handle: ConnectionHandle,
        claim: String,
        since: u64,
        reply: oneshot::Sender<Result<Opened, LifecycleError>>,
    },
    Close {
        connection: ConnectionId,
    },
}

/// Channel from transports → lifecycle task.
pub type LifecycleTx = mpsc::UnboundedSender<LifecycleEvent>;
pub type LifecycleRx = mpsc::UnboundedReceiver<LifecycleEvent>;

/// State shared by HTTP handlers and transport tasks.
#[derive(Debug, Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
    pub lifecycle: crate::lifecycle_task::LifecycleClient,
    pub connections: Arc<ConnectionTracker>,
    pub config: Arc<Config>,
}
