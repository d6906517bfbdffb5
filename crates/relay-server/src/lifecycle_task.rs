//! Central lifecycle loop.
//!
//! This task owns the `LifecycleManager` and processes every
//! `LifecycleEvent` coming from transport tasks, one at a time. Opens and
//! closes are therefore applied in the order they were sent, regardless of
//! which transport (WebSocket or TCP) they came from.
//!
//! Submissions do not go through here: they call the shared `Relay`
//! directly so fan-out latency does not queue behind connection churn.

use std::sync::Arc;

use relay_core::{ConnectionHandle, ConnectionId, LifecycleError, LifecycleManager, Opened, Relay};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::types::{LifecycleEvent, LifecycleRx, LifecycleTx};

/// Spawn the lifecycle loop, returning a client for transports to use.
pub fn spawn(relay: Arc<Relay>) -> LifecycleClient {
    let (tx, rx): (LifecycleTx, LifecycleRx) = mpsc::unbounded_channel();
    let manager = LifecycleManager::new(relay);
    tokio::spawn(async move {
        run_lifecycle_loop(rx, manager).await;
    });
    LifecycleClient { tx }
}

/// Run the central lifecycle processing loop.
pub async fn run_lifecycle_loop(mut rx: LifecycleRx, manager: LifecycleManager) {
    while let Some(event) = rx.recv().await {
        match event {
            LifecycleEvent::Connect { connection } => {
                if let Err(e) = manager.connect(connection) {
                    warn!(%connection, error = %e, "connect rejected");
                }
            }
            LifecycleEvent::Open {
                handle,
                claim,
                since,
                reply,
            } => {
                let id = handle.id();
                let result = manager.open(handle, &claim, since);
                if let Err(e) = &result {
                    warn!(connection = %id, claim = %claim, error = %e, "open rejected");
                }
                if let Err(Ok(opened)) = reply.send(result) {
                    // The transport went away while we were opening it.
                    debug!(connection = %id, participant = %opened.participant, "opener gone, closing");
                    manager.close(id);
                }
            }
            LifecycleEvent::Close { connection } => {
                manager.close(connection);
            }
        }
    }

    debug!("lifecycle loop shutting down (channel closed)");
}

/// Cloneable sender side of the lifecycle loop.
#[derive(Debug, Clone)]
pub struct LifecycleClient {
    tx: LifecycleTx,
}

impl LifecycleClient {
    pub fn connect(&self, connection: ConnectionId) {
        let _ = self.tx.send(LifecycleEvent::Connect { connection });
    }

    /// Ask the loop to open `handle` as `claim`. If the loop is gone the
    /// server is shutting down and the connection is treated as closed.
    pub async fn open(&self, handle: ConnectionHandle, claim: &str, since: u64) -> Result<Opened, LifecycleError> {
        let id = handle.id();
        let (reply, rx) = oneshot::channel();
        let event = LifecycleEvent::Open {
            handle,
            claim: claim.to_string(),
            since,
            reply,
        };
        if self.tx.send(event).is_err() {
            return Err(LifecycleError::Closed(id));
        }
        rx.await.unwrap_or(Err(LifecycleError::Closed(id)))
    }

    /// Report a close. Safe to call more than once.
    pub fn close(&self, connection: ConnectionId) {
        let _ = self.tx.send(LifecycleEvent::Close { connection });
    }

    /// Guard that reports the close when dropped, so a connection task that
    /// exits early (error, panic) still gets reaped.
    pub fn close_on_drop(&self, connection: ConnectionId) -> CloseGuard {
        CloseGuard {
            client: self.clone(),
            connection,
        }
    }
}

#[derive(Debug)]
pub struct CloseGuard {
    client: LifecycleClient,
    connection: ConnectionId,
}

impl Drop for CloseGuard {
    fn drop(&mut self) {
        self.client.close(self.connection);
    }
}
