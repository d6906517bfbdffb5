//! relay-core
//!
//! Pure relay logic:
//! - participant / connection identifiers
//! - identity registry (participant -> live connections)
//! - connection lifecycle state machine
//! - message relay with fan-out
//! - append-only message log with replay

pub mod participant;
pub mod messages;
pub mod clock;
pub mod connection;
pub mod groups;
pub mod registry;
pub mod log;
pub mod relay;
pub mod lifecycle;
pub mod error;

pub use participant::{ConnectionId, GroupName, ParticipantId};

pub use messages::{Message, MessageKey, PushEvent, RecipientSelector};

pub use clock::{Clock, ManualClock, SystemClock};
pub use connection::{outbound_channel, ConnectionHandle, DeliveryError, OutboundRx, OutboundTx};
pub use groups::GroupDirectory;
pub use registry::{RegisterOutcome, Registry};
pub use log::{MessageLog, Replay, ReplayMark};
pub use relay::{DeliveryFailure, DeliveryReport, Relay, RelayConfig};
pub use lifecycle::{ConnectionState, LifecycleManager, Opened};
pub use error::{IdError, LifecycleError, RegistryError, RelayError};
