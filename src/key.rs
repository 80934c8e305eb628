//! Keys and expiry
//!
//! Validation, hashing for server selection, and expiry encoding.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{McError, Result};

/// Longest key (prefix included) memcached accepts
pub const MAX_KEY_LENGTH: usize = 250;

/// Relative expiries longer than this are sent as absolute unix timestamps
pub const MAX_RELATIVE_EXPIRY_SECS: u64 = 60 * 60 * 24 * 30;

/// Reject keys the server would refuse or the text protocol would split.
///
/// `prefix` counts toward the length limit since it is sent with every key.
pub fn check_key(prefix: &str, key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(McError::InvalidKey("key must not be empty".to_string()));
    }
    if prefix.len() + key.len() > MAX_KEY_LENGTH {
        return Err(McError::InvalidKey(format!(
            "key '{}' is {} bytes with prefix (max {})",
            key,
            prefix.len() + key.len(),
            MAX_KEY_LENGTH
        )));
    }
    if let Some(c) = key.chars().find(|c| c.is_whitespace() || c.is_control()) {
        return Err(McError::InvalidKey(format!(
            "key '{}' contains illegal character {:?}",
            key.escape_debug(),
            c
        )));
    }
    Ok(())
}

/// Hash used to pick the server for a key
#[inline]
pub fn key_hash(key: &str) -> u32 {
    crc32fast::hash(key.as_bytes())
}

/// When a stored item expires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expiry {
    #[default]
    Never,
    After(Duration),
    At(SystemTime),
}

impl Expiry {
    /// Seconds as sent on the wire: 0 = never, small values relative, large values unix time
    pub fn as_wire_seconds(&self) -> u32 {
        match self {
            Expiry::Never => 0,
            Expiry::After(ttl) => {
                let secs = ttl.as_secs();
                if secs == 0 && !ttl.is_zero() {
                    // a non-zero TTL never encodes as 0
                    1
                } else if secs <= MAX_RELATIVE_EXPIRY_SECS {
                    secs as u32
                } else {
                    unix_seconds(SystemTime::now() + *ttl)
                }
            }
            Expiry::At(when) => unix_seconds(*when),
        }
    }
}

impl From<Duration> for Expiry {
    fn from(ttl: Duration) -> Self {
        Expiry::After(ttl)
    }
}

fn unix_seconds(when: SystemTime) -> u32 {
    let secs = when
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    // 0 would mean never; instants before the epoch expire at once
    secs.clamp(1, u32::MAX as u64) as u32
}
