//! Connection lifecycle: `Connecting -> Open -> Closed`.
//!
//! - `connect` notes a transport connection that has not yet presented an
//!   identity.
//! - `open` reads the identity claim once, registers the connection with
//!   the [`Registry`](crate::registry::Registry) and hands back the replay
//!   for that participant. The identity cannot change afterwards; a client
//!   that wants another identity opens another connection.
//! - `close` deregisters exactly once. Transports may report a close more
//!   than once (error path and disconnect path); repeats are no-ops.
//!
//! `Closed` is terminal: a closed connection id is remembered and any
//! later `connect` or `open` for it fails with [`LifecycleError::Closed`].
//!
//! Reconnect race: when a participant reconnects before the old
//! connection's close has been processed, both connections stay registered
//! and both receive fan-out until the stale one is reaped.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::connection::ConnectionHandle;
use crate::error::LifecycleError;
use crate::log::Replay;
use crate::participant::{ConnectionId, ParticipantId};
use crate::relay::Relay;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open(ParticipantId),
    Closed,
}

/// Result of a successful [`LifecycleManager::open`].
#[derive(Debug)]
pub struct Opened {
    pub participant: ParticipantId,

    /// History to push to the new connection before live traffic.
    pub replay: Replay,
}

#[derive(Debug, Default)]
struct Connections {
    /// Connecting or open.
    active: HashMap<ConnectionId, ConnectionState>,

    /// Tombstones. Connection ids are never reused, so one id per closed
    /// connection is all that is kept.
    closed: HashSet<ConnectionId>,
}

impl Connections {
    fn tombstone(&mut self, connection: ConnectionId) -> Option<ConnectionState> {
        self.closed.insert(connection);
        self.active.remove(&connection)
    }
}

#[derive(Debug)]
pub struct LifecycleManager {
    relay: Arc<Relay>,
    connections: Mutex<Connections>,
}

impl LifecycleManager {
    pub fn new(relay: Arc<Relay>) -> Self {
        LifecycleManager {
            relay,
            connections: Mutex::new(Connections::default()),
        }
    }

    pub fn relay(&self) -> &Arc<Relay> {
        &self.relay
    }

    /// Record a transport connection awaiting its identity claim.
    pub fn connect(&self, connection: ConnectionId) -> Result<(), LifecycleError> {
        let mut connections = self.connections.lock();
        if connections.closed.contains(&connection) {
            return Err(LifecycleError::Closed(connection));
        }
        connections
            .active
            .entry(connection)
            .or_insert(ConnectionState::Connecting);
        debug!(%connection, "connecting");
        Ok(())
    }

    /// Bind a connection to the participant it claims to be.
    ///
    /// `since_ms` selects the replay window (`0` replays everything the
    /// participant sent or received).
    pub fn open(
        &self,
        handle: ConnectionHandle,
        claim: &str,
        since_ms: u64,
    ) -> Result<Opened, LifecycleError> {
        let id = handle.id();
        let mut connections = self.connections.lock();

        if connections.closed.contains(&id) {
            return Err(LifecycleError::Closed(id));
        }
        if let Some(ConnectionState::Open(_)) = connections.active.get(&id) {
            return Err(LifecycleError::AlreadyOpen(id));
        }
        if !handle.is_live() {
            connections.tombstone(id);
            return Err(LifecycleError::Closed(id));
        }

        let participant = ParticipantId::parse(claim)?;
        self.relay.registry().register(participant.clone(), handle)?;
        connections
            .active
            .insert(id, ConnectionState::Open(participant.clone()));
        drop(connections);

        info!(connection = %id, %participant, "connection open");
        let replay = self.relay.replay_since(&participant, since_ms);
        Ok(Opened {
            participant,
            replay,
        })
    }

    /// Tear a connection down. Returns the participant it was registered
    /// under, or `None` when there was nothing to do (never opened, or a
    /// repeated close).
    pub fn close(&self, connection: ConnectionId) -> Option<ParticipantId> {
        let mut connections = self.connections.lock();
        if connections.closed.contains(&connection) {
            debug!(%connection, "duplicate close ignored");
            return None;
        }
        let previous = connections.tombstone(connection);
        let owner = self.relay.registry().deregister(connection);
        drop(connections);

        match (&previous, &owner) {
            (_, Some(participant)) => info!(%connection, %participant, "connection closed"),
            (Some(_), None) => debug!(%connection, "closed before identity claim"),
            (None, None) => debug!(%connection, "closed unknown connection"),
        }
        owner
    }

    /// Current state of a connection, `None` if it was never seen.
    pub fn state(&self, connection: ConnectionId) -> Option<ConnectionState> {
        let connections = self.connections.lock();
        if connections.closed.contains(&connection) {
            return Some(ConnectionState::Closed);
        }
        connections.active.get(&connection).cloned()
    }

    /// Number of connections not yet closed (connecting or open).
    pub fn active_connections(&self) -> usize {
        self.connections.lock().active.len()
    }
}
