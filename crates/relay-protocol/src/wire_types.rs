//! JSON wire types.
//!
//! This module defines:
//! - request / response bodies for the HTTP endpoints,
//! - the push frame written to WebSocket clients,
//! - the handshake query a connection presents when it opens.
//!
//! Field names follow what browser clients already expect
//! (`recipientOnline`, `time` in epoch milliseconds).

use relay_core::Message;
use serde::{Deserialize, Serialize};

/// Event name used for chat pushes.
pub const NEW_MESSAGE_EVENT: &str = "newMessage";

/// `POST /api/messages` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitRequest {
    #[serde(default)]
    pub sender: String,

    /// Participant id, `#group`, `*`, or absent for everyone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,

    #[serde(default)]
    pub text: String,
}

/// A logged message as returned to the submitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    pub sender: String,
    pub recipient: String,
    pub text: String,
    pub time: u64,
    pub seq: u64,
}

impl From<&Message> for WireMessage {
    fn from(msg: &Message) -> Self {
        WireMessage {
            sender: msg.sender.to_string(),
            recipient: msg.recipient.to_string(),
            text: msg.text.clone(),
            time: msg.time,
            seq: msg.seq,
        }
    }
}

/// `201` response to an accepted submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub success: bool,
    pub message: WireMessage,

    /// Number of connections the message was pushed to.
    pub delivered: usize,

    pub recipient_online: bool,
}

/// Body of every `4xx` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        ErrorBody {
            error: error.into(),
        }
    }
}

/// Payload of a `newMessage` push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessagePayload {
    pub sender: String,
    pub text: String,
    pub time: u64,
}

impl From<&Message> for NewMessagePayload {
    fn from(msg: &Message) -> Self {
        NewMessagePayload {
            sender: msg.sender.to_string(),
            text: msg.text.clone(),
            time: msg.time,
        }
    }
}

/// One server-to-client frame: `{"event": "...", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushFrame {
    pub event: String,
    pub data: NewMessagePayload,
}

/// Query string presented when a real-time connection opens:
/// `?user=<participant>[&since=<ms>]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
    pub user: Option<String>,
    pub since: Option<u64>,
}

/// `GET /api/presence/{participant}` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceResponse {
    pub participant: String,
    pub online: bool,
    pub connections: usize,
}

/// `GET /health` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub connections: usize,
    pub participants: usize,
    pub messages: usize,
}

