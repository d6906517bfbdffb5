//! Identity registry: which live connections belong to which participant.
//!
//! Two indexes are kept:
//! - forward: `ParticipantId -> {ConnectionId -> ConnectionHandle}`
//! - reverse: `ConnectionId -> ParticipantId`
//!
//! Disconnect events arrive keyed by connection, so the reverse index makes
//! teardown O(1). Both maps sit behind one lock and are always mutated
//! together; a reader never sees one without the other.

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;

use crate::connection::ConnectionHandle;
use crate::error::RegistryError;
use crate::participant::{ConnectionId, ParticipantId};

/// Result of a successful [`Registry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Added,
    /// The exact pair was already present; nothing changed.
    AlreadyRegistered,
}

#[derive(Debug, Default)]
pub struct Registry {
    inner: RwLock<RegistryInner>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    /// No entry here is ever empty.
    by_participant: HashMap<ParticipantId, BTreeMap<ConnectionId, ConnectionHandle>>,
    by_connection: HashMap<ConnectionId, ParticipantId>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    /// Add `handle` under `participant`. Additive: existing handles for the
    /// participant are kept.
    pub fn register(
        &self,
        participant: ParticipantId,
        handle: ConnectionHandle,
    ) -> Result<RegisterOutcome, RegistryError> {
        let mut inner = self.inner.write();
        let id = handle.id();

        if let Some(owner) = inner.by_connection.get(&id) {
            if *owner == participant {
                return Ok(RegisterOutcome::AlreadyRegistered);
            }
            return Err(RegistryError::HandleClaimed {
                connection: id,
                owner: owner.clone(),
            });
        }

        inner.by_connection.insert(id, participant.clone());
        inner
            .by_participant
            .entry(participant)
            .or_default()
            .insert(id, handle);
        Ok(RegisterOutcome::Added)
    }

    /// Remove a connection from whichever participant owns it.
    ///
    /// Returns the former owner, or `None` if the connection was unknown
    /// (already removed; double close events land here).
    pub fn deregister(&self, connection: ConnectionId) -> Option<ParticipantId> {
        let mut inner = self.inner.write();
        let owner = inner.by_connection.remove(&connection)?;

        let now_empty = match inner.by_participant.get_mut(&owner) {
            Some(handles) => {
                handles.remove(&connection);
                handles.is_empty()
            }
            None => false,
        };
        if now_empty {
            inner.by_participant.remove(&owner);
        }

        Some(owner)
    }

    /// Live handles for `participant`, ordered by connection id. Never fails;
    /// empty when the participant is offline.
    pub fn resolve(&self, participant: &ParticipantId) -> Vec<ConnectionHandle> {
        let inner = self.inner.read();
        inner
            .by_participant
            .get(participant)
            .map(|handles| live(handles.values()))
            .unwrap_or_default()
    }

    /// Union of live handles over several participants.
    pub fn resolve_all<'a>(&self, participants: impl IntoIterator<Item = &'a ParticipantId>) -> Vec<ConnectionHandle> {
        let inner = self.inner.read();
        let mut out = Vec::new();
        for p in participants {
            if let Some(handles) = inner.by_participant.get(p) {
                out.extend(live(handles.values()));
            }
        }
        out
    }

    /// Every live handle in the registry.
    pub fn all_handles(&self) -> Vec<ConnectionHandle> {
        let inner = self.inner.read();
        inner
            .by_participant
            .values()
            .flat_map(|handles| live(handles.values()))
            .collect()
    }

    pub fn is_online(&self, participant: &ParticipantId) -> bool {
        let inner = self.inner.read();
        inner
            .by_participant
            .get(participant)
            .map_or(false, |handles| handles.values().any(ConnectionHandle::is_live))
    }

    /// Owner of a connection, if registered.
    pub fn owner_of(&self, connection: ConnectionId) -> Option<ParticipantId> {
        self.inner.read().by_connection.get(&connection).cloned()
    }

    /// Participants with at least one live connection, sorted.
    pub fn participants(&self) -> Vec<ParticipantId> {
        let inner = self.inner.read();
        let mut out: Vec<ParticipantId> = inner
            .by_participant
            .iter()
            .filter(|(_, handles)| handles.values().any(ConnectionHandle::is_live))
            .map(|(p, _)| p.clone())
            .collect();
        out.sort();
        out
    }

    /// Number of registered connections (live or not yet reaped).
    pub fn connection_count(&self) -> usize {
        self.inner.read().by_connection.len()
    }

    /// Drop every registration.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.by_participant.clear();
        inner.by_connection.clear();
    }

    /// Cross-check forward and reverse indexes. Returns a description of the
    /// first inconsistency found.
    pub fn check_consistency(&self) -> Result<(), String> {
        let inner = self.inner.read();

        let mut forward_count = 0;
        for (participant, handles) in &inner.by_participant {
            if handles.is_empty() {
                return Err(format!("empty entry for {}", participant));
            }
            for id in handles.keys() {
                forward_count += 1;
                match inner.by_connection.get(id) {
                    Some(owner) if owner == participant => {}
                    Some(owner) => {
                        return Err(format!("{} listed under {} but owned by {}", id, participant, owner))
                    }
                    None => return Err(format!("{} listed under {} has no reverse entry", id, participant)),
                }
            }
        }

        if forward_count != inner.by_connection.len() {
            return Err(format!(
                "forward index holds {} handles, reverse holds {}",
                forward_count,
                inner.by_connection.len()
            ));
        }
        Ok(())
    }
}

fn live<'a>(handles: impl Iterator<Item = &'a ConnectionHandle>) -> Vec<ConnectionHandle> {
    handles.filter(|h| h.is_live()).cloned().collect()
}
