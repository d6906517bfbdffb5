//! relay-server
//!
//! Thin I/O front-ends for the chat relay: HTTP submit endpoint,
//! WebSocket and raw TCP transports.

pub mod config;
pub mod types;
pub mod server;
pub mod http;
pub mod lifecycle_task;
pub mod telemetry;

// these are internal modules, not re-exported
mod client;
mod ws;
