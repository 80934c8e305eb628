//! Configuration for mcpipe
//!
//! Centralized configuration with sensible defaults.

use std::fmt;
use std::str::FromStr;

use crate::error::McError;

/// Wire protocol spoken by a client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolKind {
    /// Line-oriented text protocol
    #[default]
    Text,

    /// 24-byte header binary protocol with pipelined bulk operations
    Binary,
}

impl ProtocolKind {
    pub fn name(&self) -> &'static str {
        match self {
            ProtocolKind::Text => "text",
            ProtocolKind::Binary => "binary",
        }
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProtocolKind {
    type Err = McError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "ascii" => Ok(ProtocolKind::Text),
            "binary" => Ok(ProtocolKind::Binary),
            other => Err(McError::Config(format!("unknown protocol '{}'", other))),
        }
    }
}

/// Main configuration for a client instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Pool Configuration
    // -------------------------------------------------------------------------
    /// Server addresses (host:port), one shard each
    pub servers: Vec<String>,

    /// Max idle connections kept per server
    pub max_idle_per_server: usize,

    /// How long a server that refused a connection is skipped (milliseconds)
    pub dead_server_retry_ms: u64,

    // -------------------------------------------------------------------------
    // Protocol Configuration
    // -------------------------------------------------------------------------
    /// Text or binary wire protocol, fixed for the lifetime of the client
    pub protocol: ProtocolKind,

    /// Prepended to every key on the wire, never to keys handed back to callers
    pub key_prefix: String,

    /// Values larger than this (bytes) may be compressed by the value codec
    pub compression_threshold: usize,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// Connect timeout (milliseconds, 0 = none)
    pub connect_timeout_ms: u64,

    /// Socket read timeout (milliseconds, 0 = none)
    pub read_timeout_ms: u64,

    /// Socket write timeout (milliseconds, 0 = none)
    pub write_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            servers: vec!["127.0.0.1:11211".to_string()],
            max_idle_per_server: 16,
            dead_server_retry_ms: 5000,
            protocol: ProtocolKind::Text,
            key_prefix: String::new(),
            compression_threshold: 128 * 1024, // 128 KB
            connect_timeout_ms: 1000,
            read_timeout_ms: 5000,
            write_timeout_ms: 5000,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check the config can back a client
    pub fn validate(&self) -> crate::Result<()> {
        if self.servers.is_empty() {
            return Err(McError::Config("at least one server is required".to_string()));
        }
        for server in &self.servers {
            if server.trim().is_empty() || !server.contains(':') {
                return Err(McError::Config(format!(
                    "server address '{}' must be host:port",
                    server
                )));
            }
        }
        if let Some(c) = self
            .key_prefix
            .chars()
            .find(|c| c.is_whitespace() || c.is_control())
        {
            return Err(McError::Config(format!(
                "key prefix '{}' contains illegal character {:?}",
                self.key_prefix.escape_debug(),
                c
            )));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Replace the server list
    pub fn servers<I, S>(mut self, servers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.servers = servers.into_iter().map(Into::into).collect();
        self
    }

    /// Set the wire protocol
    pub fn protocol(mut self, protocol: ProtocolKind) -> Self {
        self.config.protocol = protocol;
        self
    }

    /// Set the key prefix
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.key_prefix = prefix.into();
        self
    }

    /// Set the compression threshold (in bytes)
    pub fn compression_threshold(mut self, bytes: usize) -> Self {
        self.config.compression_threshold = bytes;
        self
    }

    /// Set the maximum number of idle connections per server
    pub fn max_idle_per_server(mut self, count: usize) -> Self {
        self.config.max_idle_per_server = count;
        self
    }

    /// Set the dead server retry delay (in milliseconds)
    pub fn dead_server_retry_ms(mut self, ms: u64) -> Self {
        self.config.dead_server_retry_ms = ms;
        self
    }

    /// Set the connect timeout (in milliseconds)
    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.connect_timeout_ms = ms;
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
