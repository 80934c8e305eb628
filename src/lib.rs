//! # mcpipe
//!
//! A memcached client speaking both wire protocols against a sharded pool:
//! - Binary protocol with quiet-opcode pipelining for multi-key operations
//! - Text protocol with one multi-key `get` line per server
//! - Consistent hashing of keys onto servers
//! - Typed values with a pluggable codec
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Client                               │
//! │          (key prefix + validation, expiry, results)         │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │    Text     │          │   Binary    │
//!   │  (lines)    │          │  (frames)   │
//!   └──────┬──────┘          └──────┬──────┘
//!          │                        │  protocol::codec
//!          └────────────┬───────────┘
//!                       ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ServerPool                             │
//! │     (hash ring → server, idle sockets, dead servers)        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use mcpipe::{Client, Config, ProtocolKind};
//!
//! let config = Config::builder()
//!     .servers(["10.0.0.1:11211", "10.0.0.2:11211"])
//!     .protocol(ProtocolKind::Binary)
//!     .build();
//! let client = Client::new(config)?;
//!
//! client.set("greeting", "hello")?;
//! let values = client.get_multi(&["greeting", "missing"])?;
//! assert_eq!(values[1], None);
//! # Ok::<(), mcpipe::McError>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod protocol;
pub mod value;
pub mod key;
pub mod network;
pub mod client;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{McError, Result};
pub use config::{Config, ProtocolKind};
pub use client::{CasResult, Client, ClientRegistry, Item};
pub use key::Expiry;
pub use value::Value;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of mcpipe
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
