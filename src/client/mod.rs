//! Client Module
//!
//! The user-facing [`Client`] and the two protocol implementations behind it.
//!
//! ## Control Flow
//! ```text
//!   Client (validate + prefix key, hash)
//!      │
//!      ▼
//!   ProtocolClient::{Text, Binary}
//!      │  single key: one exchange
//!      │  many keys:  partition by server → one exchange per server
//!      ▼
//!   ServerPool::execute ──► PooledSocket (frames / lines)
//! ```

mod batch;
mod binary;
mod text;
mod memcached;
mod registry;

use std::collections::HashMap;

use crate::config::ProtocolKind;
use crate::error::Result;
use crate::network::{ServerId, ServerPool};
use crate::protocol::Command;
use crate::value::{Value, ValueCodec};

pub use memcached::Client;
pub use registry::ClientRegistry;

use binary::BinaryProtocol;
use text::TextProtocol;

/// Outcome of a store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasResult {
    Stored,
    NotStored,
    /// The item changed since the supplied CAS unique was read
    Exists,
    NotFound,
}

/// A value together with its CAS unique
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub value: Value,
    pub cas: u64,
}

/// A validated key as sent on the wire, with the hash that routes it
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct WireKey {
    pub wire: String,
    pub hash: u32,
}

/// State shared by every operation of one client
pub(crate) struct Context {
    pub pool: ServerPool,
    pub codec: Box<dyn ValueCodec>,
    pub compression_threshold: usize,
}

impl Context {
    /// Deserialize a payload, reporting codec failures as a miss
    pub fn decode(&self, key: &str, bytes: bytes::Bytes, type_tag: u16) -> Option<Value> {
        match self.codec.deserialize(bytes, type_tag) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Error deserializing value for key '{}': {}", key, e);
                None
            }
        }
    }

    /// Serialize a value, reporting codec failures as `None`
    pub fn encode(&self, key: &str, value: &Value) -> Option<(bytes::Bytes, u16)> {
        match self.codec.serialize(value, self.compression_threshold) {
            Ok(encoded) => Some(encoded),
            Err(e) => {
                tracing::warn!("Error serializing value for key '{}': {}", key, e);
                None
            }
        }
    }
}

/// Everything a wire protocol must provide
pub(crate) trait Operations: Send + Sync {
    fn get(&self, ctx: &Context, key: &WireKey, with_cas: bool) -> Result<Option<Item>>;

    /// Results are aligned with `keys`; duplicates get the same result
    fn get_multi(&self, ctx: &Context, keys: &[WireKey], with_cas: bool)
        -> Result<Vec<Option<Item>>>;

    /// `cas` is only sent for [`Command::Cas`]
    fn store(
        &self,
        ctx: &Context,
        command: Command,
        key: &WireKey,
        value: &Value,
        expiry: u32,
        cas: u64,
    ) -> Result<CasResult>;

    /// True only if every item was stored
    fn store_multi(
        &self,
        ctx: &Context,
        command: Command,
        keys: &[WireKey],
        values: &[Value],
        expiry: u32,
    ) -> Result<bool>;

    fn delete(&self, ctx: &Context, key: &WireKey, time: u32) -> Result<bool>;

    /// `command` is Increment or Decrement; `None` when the key is missing
    fn incr_decr(
        &self,
        ctx: &Context,
        command: Command,
        key: &WireKey,
        delta: u64,
    ) -> Result<Option<u64>>;

    fn flush_all(&self, ctx: &Context, delay: u32, staggered: bool) -> Result<bool>;

    fn stats(&self, ctx: &Context, server: ServerId) -> Result<HashMap<String, String>>;
}

/// The closed set of protocol implementations, chosen once per client
pub(crate) enum ProtocolClient {
    Text(TextProtocol),
    Binary(BinaryProtocol),
}

impl ProtocolClient {
    pub fn new(kind: ProtocolKind) -> Self {
        match kind {
            ProtocolKind::Text => ProtocolClient::Text(TextProtocol),
            ProtocolKind::Binary => ProtocolClient::Binary(BinaryProtocol),
        }
    }

    pub fn kind(&self) -> ProtocolKind {
        match self {
            ProtocolClient::Text(_) => ProtocolKind::Text,
            ProtocolClient::Binary(_) => ProtocolKind::Binary,
        }
    }

    pub fn ops(&self) -> &dyn Operations {
        match self {
            ProtocolClient::Text(p) => p,
            ProtocolClient::Binary(p) => p,
        }
    }
}
