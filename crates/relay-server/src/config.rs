//! Configuration for the relay server.
//!
//! Resolution order, later wins:
//!
//! 1. Built-in defaults.
//! 2. A TOML file, if `RELAY_CONFIG` names one.
//! 3. Environment variables:
//!
//! - `RELAY_BIND_ADDR`           (default: "0.0.0.0")
//! - `RELAY_HTTP_PORT`           (default: "8747")
//! - `RELAY_TCP_PORT`            (default: "8748", "0" disables the line transport)
//! - `RELAY_MAX_CONNECTIONS`     (default: "1024")
//! - `RELAY_ECHO_TO_SELF`        (default: "true")
//! - `RELAY_DELIVERY_TIMEOUT_MS` (default: "2000")
//! - `RELAY_MAX_TEXT_LEN`        (default: "4096")
//! - `RELAY_OUTBOUND_BUFFER`     (default: "256")
//! - `RELAY_LOG`                 (default: "info,relay_server=debug")
//!
//! Groups can only be declared in the file:
//!
//! ```toml
//! [groups]
//! team = ["me", "friend"]
//! ```

use std::collections::BTreeMap;
use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use relay_core::{GroupDirectory, GroupName, ParticipantId, RelayConfig};
use serde::Deserialize;

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// IP address / interface to bind to (e.g. "0.0.0.0" or "127.0.0.1").
    pub bind_addr: String,

    /// Port for the HTTP API and WebSocket transport.
    pub http_port: u16,

    /// Port for the raw TCP line transport; `0` disables it.
    pub tcp_port: u16,

    /// Maximum number of simultaneously connected real-time clients.
    pub max_connections: usize,

    pub echo_to_self: bool,
    pub delivery_timeout_ms: u64,
    pub max_text_len: usize,

    /// Capacity of each connection's outbound channel.
    pub outbound_buffer: usize,

    /// `tracing` filter directive, overridden by `RUST_LOG`.
    pub log_filter: String,

    /// Group name (without `#`) -> member participant ids.
    pub groups: BTreeMap<String, Vec<String>>,
}

impl Default for Config {
    fn default() -> Self {
        let relay = RelayConfig::default();
        Config {
            bind_addr: "0.0.0.0".to_string(),
            http_port: 8747,
            tcp_port: 8748,
            max_connections: 1024,
            echo_to_self: relay.echo_to_self,
            delivery_timeout_ms: relay.delivery_timeout.as_millis() as u64,
            max_text_len: relay.max_text_len,
            outbound_buffer: 256,
            log_filter: "info,relay_server=debug".to_string(),
            groups: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Construct a `Config` from the optional file and environment
    /// variables, falling back to reasonable defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = match env::var("RELAY_CONFIG") {
            Ok(path) => Config::from_file(&path)?,
            Err(_) => Config::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Config::from_toml_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(addr) = env::var("RELAY_BIND_ADDR") {
            self.bind_addr = addr;
        }
        self.http_port = read_env_or_default("RELAY_HTTP_PORT", self.http_port)?;
        self.tcp_port = read_env_or_default("RELAY_TCP_PORT", self.tcp_port)?;
        self.max_connections = read_env_or_default("RELAY_MAX_CONNECTIONS", self.max_connections)?;
        self.echo_to_self = read_env_or_default("RELAY_ECHO_TO_SELF", self.echo_to_self)?;
        self.delivery_timeout_ms = read_env_or_default("RELAY_DELIVERY_TIMEOUT_MS", self.delivery_timeout_ms)?;
        self.max_text_len = read_env_or_default("RELAY_MAX_TEXT_LEN", self.max_text_len)?;
        self.outbound_buffer = read_env_or_default("RELAY_OUTBOUND_BUFFER", self.outbound_buffer)?;
        if let Ok(filter) = env::var("RELAY_LOG") {
            self.log_filter = filter;
        }
        Ok(())
    }

    /// Convenience: `addr:port` for the HTTP listener.
    pub fn http_addr_string(&self) -> String {
        format!("{}:{}", self.bind_addr, self.http_port)
    }

    /// `addr:port` for the TCP line listener, if enabled.
    pub fn tcp_addr_string(&self) -> Option<String> {
        (self.tcp_port != 0).then(|| format!("{}:{}", self.bind_addr, self.tcp_port))
    }

    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            echo_to_self: self.echo_to_self,
            delivery_timeout: Duration::from_millis(self.delivery_timeout_ms),
            max_text_len: self.max_text_len,
        }
    }

    /// Validate and build the group directory.
    pub fn group_directory(&self) -> Result<GroupDirectory> {
        let mut groups = GroupDirectory::new();
        for (name, members) in &self.groups {
            let group = GroupName::parse(name).with_context(|| format!("group name {:?}", name))?;
            let members = members
                .iter()
                .map(|m| ParticipantId::parse(m).with_context(|| format!("member {:?} of group {}", m, group)))
                .collect::<Result<Vec<_>>>()?;
            groups.insert(group, members);
        }
        Ok(groups)
    }
}

fn read_env_or_default<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(val) => val
            .parse::<T>()
            .with_context(|| format!("{}={:?}", key, val)),
        Err(_) => Ok(default),
    }
}
