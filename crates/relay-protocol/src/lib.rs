//! relay-protocol
//!
//! Wire-level encoding/decoding for the chat relay.
//!
//! This crate is responsible for turning logical relay messages
//! (`relay_core::Message` / `PushEvent`) into text and back again.
//!
//! - [`wire_types`] : JSON bodies for HTTP and WebSocket clients
//! - [`json_codec`] : push frames for WebSocket clients
//! - [`line_codec`] : newline-delimited text for raw TCP clients

pub mod error;
pub mod wire_types;
pub mod json_codec;
pub mod line_codec;

pub use error::ProtocolError;
pub use json_codec::{decode_push, encode_push, push_frame};
pub use line_codec::{
    format_client_line,
    format_server_line,
    max_line_len,
    parse_client_line,
    parse_server_line,
    push_line,
    ClientLine,
    ServerLine,
};
