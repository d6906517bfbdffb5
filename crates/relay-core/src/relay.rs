//! Message relay: validate, log, resolve, fan out.
//!
//! Submission order of operations:
//! 1. Validate sender, recipient selector and text. Rejections mutate
//!    nothing.
//! 2. Stamp and append to the [`MessageLog`]. This always happens, even
//!    when nobody is online to receive the message.
//! 3. Resolve the selector through the [`Registry`] to a set of live
//!    connections (plus the sender's other connections when
//!    `echo_to_self` is on).
//! 4. Push to every resolved connection concurrently, each bounded by
//!    `delivery_timeout`. Per-connection failures are collected into the
//!    [`DeliveryReport`]; they never fail the submission.
//!
//! No lock is held while awaiting deliveries.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::connection::{ConnectionHandle, DeliveryError};
use crate::error::RelayError;
use crate::groups::GroupDirectory;
use crate::log::{MessageLog, Replay};
use crate::messages::{Message, PushEvent, RecipientSelector};
use crate::participant::{ConnectionId, ParticipantId};
use crate::registry::Registry;

/// Default upper bound on message text, in bytes.
pub const DEFAULT_MAX_TEXT_LEN: usize = 4096;

/// Behavior switches for the relay.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Deliver a sender's message to their own other connections.
    pub echo_to_self: bool,

    /// Per-connection bound on how long a push may wait for buffer space.
    pub delivery_timeout: Duration,

    /// Longest accepted text, in bytes.
    pub max_text_len: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        RelayConfig {
            echo_to_self: true,
            delivery_timeout: Duration::from_secs(2),
            max_text_len: DEFAULT_MAX_TEXT_LEN,
        }
    }
}

/// One connection that did not receive a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryFailure {
    pub connection: ConnectionId,
    pub error: DeliveryError,
}

/// Outcome of an accepted submission.
#[derive(Debug, Clone)]
pub struct DeliveryReport {
    pub message: Arc<Message>,

    /// Connections the message was pushed to, ordered by id.
    pub delivered_to: Vec<ConnectionId>,

    pub failures: Vec<DeliveryFailure>,

    /// Whether any addressed participant (other than the sender, for group
    /// and broadcast messages) had a live connection.
    pub recipient_online: bool,
}

#[derive(Debug)]
pub struct Relay {
    config: RelayConfig,
    registry: Registry,
    log: MessageLog,
    groups: Arc<GroupDirectory>,
    clock: Arc<dyn Clock>,
}

impl Relay {
    pub fn new(config: RelayConfig) -> Self {
        Relay::with_parts(config, GroupDirectory::new(), Arc::new(SystemClock))
    }

    pub fn with_parts(config: RelayConfig, groups: GroupDirectory, clock: Arc<dyn Clock>) -> Self {
        Relay {
            config,
            registry: Registry::new(),
            log: MessageLog::new(),
            groups: Arc::new(groups),
            clock,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    pub fn groups(&self) -> &GroupDirectory {
        &self.groups
    }

    /// Submit a message on behalf of `sender`. `recipient` uses the wire
    /// form (`None` / `"*"` for everyone, `"#name"` for a group).
    pub async fn submit(
        &self,
        sender: &str,
        recipient: Option<&str>,
        text: &str,
    ) -> Result<DeliveryReport, RelayError> {
        self.submit_from(None, sender, recipient, text).await
    }

    /// Like [`submit`](Self::submit), from a known connection. The origin
    /// connection is never echoed to; its transport acks it directly.
    pub async fn submit_from(
        &self,
        origin: Option<ConnectionId>,
        sender: &str,
        recipient: Option<&str>,
        text: &str,
    ) -> Result<DeliveryReport, RelayError> {
        let (sender, recipient) = self.validate(sender, recipient, text)?;

        let message = self
            .log
            .append(sender, recipient, text.to_string(), self.clock.now_ms());
        info!(
            seq = message.seq,
            sender = %message.sender,
            recipient = %message.recipient,
            "message accepted"
        );

        let (targets, recipient_online) = self.resolve_targets(&message, origin);
        let (delivered_to, failures) = self.deliver(&message, targets).await;

        debug!(
            seq = message.seq,
            delivered = delivered_to.len(),
            failed = failures.len(),
            recipient_online,
            "fan-out complete"
        );

        Ok(DeliveryReport {
            message,
            delivered_to,
            failures,
            recipient_online,
        })
    }

    /// Logged messages involving `participant` newer than `since_ms`.
    pub fn replay_since(&self, participant: &ParticipantId, since_ms: u64) -> Replay {
        self.log
            .replay_since(participant, since_ms, self.groups.clone())
    }

    /// Forget every registration and logged message.
    pub fn reset(&self) {
        self.registry.clear();
        self.log.clear();
    }

    // -------------------------------------------------------------------------
    // Internal helpers
    // -------------------------------------------------------------------------

    fn validate(
        &self,
        sender: &str,
        recipient: Option<&str>,
        text: &str,
    ) -> Result<(ParticipantId, RecipientSelector), RelayError> {
        let sender = ParticipantId::parse(sender)
            .map_err(|e| RelayError::invalid(format!("sender: {}", e)))?;
        let recipient = RecipientSelector::parse(recipient)
            .map_err(|e| RelayError::invalid(format!("recipient: {}", e)))?;

        if let RecipientSelector::Group(name) = &recipient {
            if !self.groups.contains(name) {
                return Err(RelayError::invalid(format!("unknown group {}", name)));
            }
        }

        if text.trim().is_empty() {
            return Err(RelayError::invalid("text is empty"));
        }
        if text.len() > self.config.max_text_len {
            return Err(RelayError::invalid(format!(
                "text is {} bytes, limit is {}",
                text.len(),
                self.config.max_text_len
            )));
        }

        Ok((sender, recipient))
    }

    /// Connections a message goes to, and whether any addressed participant
    /// is online.
    fn resolve_targets(
        &self,
        message: &Message,
        origin: Option<ConnectionId>,
    ) -> (BTreeMap<ConnectionId, ConnectionHandle>, bool) {
        let sender = &message.sender;

        let (handles, recipient_online) = match &message.recipient {
            RecipientSelector::Participant(id) => {
                let handles = self.registry.resolve(id);
                let online = !handles.is_empty();
                (handles, online)
            }
            RecipientSelector::Group(name) => {
                let members = self.groups.members(name).cloned().unwrap_or_default();
                let online = members
                    .iter()
                    .any(|m| m != sender && self.registry.is_online(m));
                (self.registry.resolve_all(members.iter()), online)
            }
            RecipientSelector::Everyone => {
                let online = self
                    .registry
                    .participants()
                    .iter()
                    .any(|p| p != sender);
                (self.registry.all_handles(), online)
            }
        };

        let mut targets: BTreeMap<ConnectionId, ConnectionHandle> =
            handles.into_iter().map(|h| (h.id(), h)).collect();

        let addressed_to_self = matches!(&message.recipient, RecipientSelector::Participant(id) if id == sender);
        if !addressed_to_self {
            let own = self.registry.resolve(sender);
            for h in &own {
                targets.remove(&h.id());
            }
            if self.config.echo_to_self {
                targets.extend(own.into_iter().map(|h| (h.id(), h)));
            }
        }

        if let Some(origin) = origin {
            targets.remove(&origin);
        }

        (targets, recipient_online)
    }

    async fn deliver(
        &self,
        message: &Arc<Message>,
        targets: BTreeMap<ConnectionId, ConnectionHandle>,
    ) -> (Vec<ConnectionId>, Vec<DeliveryFailure>) {
        let timeout = self.config.delivery_timeout;

        let pushes = targets.into_values().map(|handle| {
            let event = PushEvent::NewMessage(message.clone());
            async move { (handle.id(), handle.push(event, timeout).await) }
        });

        let mut delivered_to = Vec::new();
        let mut failures = Vec::new();
        for (connection, result) in join_all(pushes).await {
            match result {
                Ok(()) => delivered_to.push(connection),
                Err(error) => {
                    debug!(seq = message.seq, %connection, %error, "delivery failed");
                    failures.push(DeliveryFailure { connection, error });
                }
            }
        }
        (delivered_to, failures)
    }
}
