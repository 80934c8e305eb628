//! Client Façade
//!
//! The one type applications use. Owns key prefixing and validation, picks
//! the wire protocol once at construction, and turns user keys and values
//! into [`WireKey`]s and wire expiries before delegating.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use crate::config::{Config, ProtocolKind};
use crate::error::{McError, Result};
use crate::key::{check_key, key_hash, Expiry};
use crate::network::{Connector, ServerPool};
use crate::protocol::Command;
use crate::value::{TypedCodec, Value, ValueCodec};

use super::{CasResult, Context, Item, ProtocolClient, WireKey};

/// A memcached client over a sharded pool of servers
///
/// ## Concurrency
/// - All operations take `&self`; share the client across threads with `Arc`
/// - Each operation borrows one pooled connection per server it touches
/// - Multi-key operations spread over several servers run one thread per server
///
/// ## Results
/// - Misses, conflicts and unreachable servers are values (`None`, `false`,
///   [`CasResult`]), never errors
/// - `Err` means a broken invariant: an invalid key, a framing error, or an
///   operation the protocol cannot express
pub struct Client {
    /// Prepended to every key on the wire
    key_prefix: String,

    /// Wire protocol, fixed at construction
    protocol: ProtocolClient,

    /// Pool and codec shared by every operation
    ctx: Context,
}

impl Client {
    /// Create a client connecting over TCP
    pub fn new(config: Config) -> Result<Self> {
        let pool = ServerPool::new(&config)?;
        Ok(Self::from_pool(config, pool))
    }

    /// Create a client whose connections come from `connector`
    pub fn with_connector(config: Config, connector: impl Connector + 'static) -> Result<Self> {
        let pool = ServerPool::with_connector(&config, connector)?;
        Ok(Self::from_pool(config, pool))
    }

    fn from_pool(config: Config, pool: ServerPool) -> Self {
        tracing::debug!(
            "Created {} client for {} server(s)",
            config.protocol,
            pool.len()
        );
        Self {
            key_prefix: config.key_prefix,
            protocol: ProtocolClient::new(config.protocol),
            ctx: Context {
                pool,
                codec: Box::new(TypedCodec),
                compression_threshold: config.compression_threshold,
            },
        }
    }

    /// Replace the value codec
    pub fn with_codec(mut self, codec: impl ValueCodec + 'static) -> Self {
        self.ctx.codec = Box::new(codec);
        self
    }

    pub fn protocol(&self) -> ProtocolKind {
        self.protocol.kind()
    }

    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    pub fn pool(&self) -> &ServerPool {
        &self.ctx.pool
    }

    // =========================================================================
    // Keys
    // =========================================================================

    fn wire_key(&self, key: &str) -> Result<WireKey> {
        self.wire_key_with_hash(key, key_hash(key))
    }

    fn wire_key_with_hash(&self, key: &str, hash: u32) -> Result<WireKey> {
        check_key(&self.key_prefix, key)?;
        Ok(WireKey {
            wire: format!("{}{}", self.key_prefix, key),
            hash,
        })
    }

    fn wire_keys<K: AsRef<str>>(&self, keys: &[K]) -> Result<Vec<WireKey>> {
        keys.iter().map(|key| self.wire_key(key.as_ref())).collect()
    }

    // =========================================================================
    // Retrieval
    // =========================================================================

    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        let key = self.wire_key(key)?;
        Ok(self.protocol.ops().get(&self.ctx, &key, false)?.map(|item| item.value))
    }

    /// Get a value together with its CAS unique
    pub fn gets(&self, key: &str) -> Result<Option<Item>> {
        let key = self.wire_key(key)?;
        self.protocol.ops().get(&self.ctx, &key, true)
    }

    /// Get a key routed by a caller-supplied hash
    pub fn get_with_hash(&self, key: &str, hash: u32) -> Result<Option<Value>> {
        let key = self.wire_key_with_hash(key, hash)?;
        Ok(self.protocol.ops().get(&self.ctx, &key, false)?.map(|item| item.value))
    }

    /// Results are aligned with `keys`; a key may appear more than once
    pub fn get_multi<K: AsRef<str>>(&self, keys: &[K]) -> Result<Vec<Option<Value>>> {
        let keys = self.wire_keys(keys)?;
        self.fetch_values(&keys)
    }

    pub fn gets_multi<K: AsRef<str>>(&self, keys: &[K]) -> Result<Vec<Option<Item>>> {
        let keys = self.wire_keys(keys)?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        self.protocol.ops().get_multi(&self.ctx, &keys, true)
    }

    /// Like [`Client::get_multi`], routing each key by the hash at the same index
    pub fn get_multi_with_hashes<K: AsRef<str>>(
        &self,
        keys: &[K],
        hashes: &[u32],
    ) -> Result<Vec<Option<Value>>> {
        if keys.len() != hashes.len() {
            return Err(McError::Contract(format!(
                "{} keys but {} hashes",
                keys.len(),
                hashes.len()
            )));
        }
        let keys = keys
            .iter()
            .zip(hashes)
            .map(|(key, &hash)| self.wire_key_with_hash(key.as_ref(), hash))
            .collect::<Result<Vec<_>>>()?;
        self.fetch_values(&keys)
    }

    fn fetch_values(&self, keys: &[WireKey]) -> Result<Vec<Option<Value>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let items = self.protocol.ops().get_multi(&self.ctx, keys, false)?;
        Ok(items
            .into_iter()
            .map(|item| item.map(|item| item.value))
            .collect())
    }

    // =========================================================================
    // Storage
    // =========================================================================

    fn store(
        &self,
        command: Command,
        key: &str,
        value: &Value,
        expiry: Expiry,
        cas: u64,
    ) -> Result<CasResult> {
        let key = self.wire_key(key)?;
        self.protocol
            .ops()
            .store(&self.ctx, command, &key, value, expiry.as_wire_seconds(), cas)
    }

    fn stored(&self, command: Command, key: &str, value: Value, expiry: Expiry) -> Result<bool> {
        Ok(self.store(command, key, &value, expiry, 0)? == CasResult::Stored)
    }

    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<bool> {
        self.stored(Command::Set, key, value.into(), Expiry::Never)
    }

    pub fn set_with_expiry(
        &self,
        key: &str,
        value: impl Into<Value>,
        expiry: impl Into<Expiry>,
    ) -> Result<bool> {
        self.stored(Command::Set, key, value.into(), expiry.into())
    }

    /// Store only if the key is absent
    pub fn add(&self, key: &str, value: impl Into<Value>) -> Result<bool> {
        self.stored(Command::Add, key, value.into(), Expiry::Never)
    }

    pub fn add_with_expiry(
        &self,
        key: &str,
        value: impl Into<Value>,
        expiry: impl Into<Expiry>,
    ) -> Result<bool> {
        self.stored(Command::Add, key, value.into(), expiry.into())
    }

    /// Store only if the key is present
    pub fn replace(&self, key: &str, value: impl Into<Value>) -> Result<bool> {
        self.stored(Command::Replace, key, value.into(), Expiry::Never)
    }

    pub fn replace_with_expiry(
        &self,
        key: &str,
        value: impl Into<Value>,
        expiry: impl Into<Expiry>,
    ) -> Result<bool> {
        self.stored(Command::Replace, key, value.into(), expiry.into())
    }

    /// Set many items; true only if every one was stored
    pub fn set_multi<K: AsRef<str>>(
        &self,
        items: &[(K, Value)],
        expiry: impl Into<Expiry>,
    ) -> Result<bool> {
        if items.is_empty() {
            return Ok(true);
        }
        let keys = items
            .iter()
            .map(|(key, _)| self.wire_key(key.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        let values: Vec<Value> = items.iter().map(|(_, value)| value.clone()).collect();
        self.protocol.ops().store_multi(
            &self.ctx,
            Command::Set,
            &keys,
            &values,
            expiry.into().as_wire_seconds(),
        )
    }

    /// Append raw data to an existing item
    pub fn append(&self, key: &str, value: impl Into<Value>) -> Result<bool> {
        self.stored(Command::Append, key, value.into(), Expiry::Never)
    }

    /// Prepend raw data to an existing item
    pub fn prepend(&self, key: &str, value: impl Into<Value>) -> Result<bool> {
        self.stored(Command::Prepend, key, value.into(), Expiry::Never)
    }

    /// Store only if the item's CAS unique still equals `unique`
    pub fn cas(&self, key: &str, value: impl Into<Value>, unique: u64) -> Result<CasResult> {
        self.store(Command::Cas, key, &value.into(), Expiry::Never, unique)
    }

    pub fn cas_with_expiry(
        &self,
        key: &str,
        value: impl Into<Value>,
        unique: u64,
        expiry: impl Into<Expiry>,
    ) -> Result<CasResult> {
        self.store(Command::Cas, key, &value.into(), expiry.into(), unique)
    }

    // =========================================================================
    // Deletion
    // =========================================================================

    pub fn delete(&self, key: &str) -> Result<bool> {
        let key = self.wire_key(key)?;
        self.protocol.ops().delete(&self.ctx, &key, 0)
    }

    /// Delete and block re-adds for `hold`; text protocol only
    pub fn delete_with_time(&self, key: &str, hold: Duration) -> Result<bool> {
        let key = self.wire_key(key)?;
        let seconds = u32::try_from(hold.as_secs()).unwrap_or(u32::MAX);
        self.protocol.ops().delete(&self.ctx, &key, seconds)
    }

    // =========================================================================
    // Counters
    // =========================================================================

    /// Store a counter as its decimal string, as incr/decr expect
    pub fn set_counter(&self, key: &str, counter: u64) -> Result<bool> {
        self.set(key, Value::Str(counter.to_string()))
    }

    pub fn get_counter(&self, key: &str) -> Result<Option<u64>> {
        Ok(self.get(key)?.as_ref().and_then(parse_counter))
    }

    pub fn get_counters<K: AsRef<str>>(&self, keys: &[K]) -> Result<Vec<Option<u64>>> {
        Ok(self
            .get_multi(keys)?
            .iter()
            .map(|value| value.as_ref().and_then(parse_counter))
            .collect())
    }

    /// New counter value, or `None` if the key does not exist
    pub fn increment(&self, key: &str, delta: u64) -> Result<Option<u64>> {
        let key = self.wire_key(key)?;
        self.protocol
            .ops()
            .incr_decr(&self.ctx, Command::Increment, &key, delta)
    }

    /// Decrement, stopping at 0
    pub fn decrement(&self, key: &str, delta: u64) -> Result<Option<u64>> {
        let key = self.wire_key(key)?;
        self.protocol
            .ops()
            .incr_decr(&self.ctx, Command::Decrement, &key, delta)
    }

    // =========================================================================
    // Server-wide
    // =========================================================================

    /// Invalidate every item on every server; false if any server failed
    pub fn flush_all(&self) -> Result<bool> {
        self.protocol.ops().flush_all(&self.ctx, 0, false)
    }

    /// Flush after `delay`; when `staggered`, server `n` waits `n * delay`
    pub fn flush_all_with_delay(&self, delay: Duration, staggered: bool) -> Result<bool> {
        let seconds = u32::try_from(delay.as_secs()).unwrap_or(u32::MAX);
        self.protocol.ops().flush_all(&self.ctx, seconds, staggered)
    }

    /// Statistics from every server, keyed by address
    pub fn stats(&self) -> Result<BTreeMap<String, HashMap<String, String>>> {
        let mut all = BTreeMap::new();
        for server in self.ctx.pool.servers() {
            let stats = self.protocol.ops().stats(&self.ctx, server)?;
            all.insert(self.ctx.pool.address(server).to_string(), stats);
        }
        Ok(all)
    }

    /// Statistics from the server owning `key`
    pub fn stats_for_key(&self, key: &str) -> Result<HashMap<String, String>> {
        let key = self.wire_key(key)?;
        let server = self.ctx.pool.server_for(key.hash);
        self.protocol.ops().stats(&self.ctx, server)
    }
}

fn parse_counter(value: &Value) -> Option<u64> {
    match value {
        Value::ULong(n) => Some(*n),
        other => std::str::from_utf8(other.as_bytes()?)
            .ok()?
            .trim()
            .parse()
            .ok(),
    }
}
