//! Server Pool
//!
//! Routes operations to servers and lends out connections.
//!
//! ## Borrowing
//! - A socket is popped from the server's idle stack (or freshly connected)
//!   and owned by exactly one operation until it finishes
//! - It goes back on the stack only if the operation succeeded
//! - I/O failures drop the socket and yield the caller's failure default
//! - Framing and contract errors drop the socket and propagate

use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::Config;
use crate::error::{McError, Result};

use super::{HashRing, PooledSocket};

/// Index of a server within its pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServerId(pub usize);

/// How an operation picks its server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
    /// Route through the hash ring
    Hash(u32),
    /// A specific server
    Server(ServerId),
}

/// Opens new connections
pub trait Connector: Send + Sync {
    fn connect(&self, server: &str) -> Result<PooledSocket>;
}

// =============================================================================
// TCP Connector
// =============================================================================

/// Plain TCP connector with per-socket timeouts
#[derive(Debug, Clone, Default)]
pub struct TcpConnector {
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
}

impl TcpConnector {
    pub fn from_config(config: &Config) -> Self {
        let millis = |ms: u64| (ms > 0).then(|| Duration::from_millis(ms));
        Self {
            connect_timeout: millis(config.connect_timeout_ms),
            read_timeout: millis(config.read_timeout_ms),
            write_timeout: millis(config.write_timeout_ms),
        }
    }

    fn open(&self, addr: &SocketAddr) -> std::io::Result<TcpStream> {
        match self.connect_timeout {
            Some(timeout) => TcpStream::connect_timeout(addr, timeout),
            None => TcpStream::connect(addr),
        }
    }
}

impl Connector for TcpConnector {
    fn connect(&self, server: &str) -> Result<PooledSocket> {
        let mut last_error = None;
        for addr in server.to_socket_addrs()? {
            match self.open(&addr) {
                Ok(stream) => {
                    stream.set_read_timeout(self.read_timeout)?;
                    stream.set_write_timeout(self.write_timeout)?;
                    tracing::debug!("Connected to {} ({})", server, addr);
                    return PooledSocket::from_tcp(stream, server);
                }
                Err(e) => last_error = Some(e),
            }
        }
        Err(McError::Io(last_error.unwrap_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no addresses resolved for {}", server),
            )
        })))
    }
}

// =============================================================================
// Server Pool
// =============================================================================

/// Per-server state
struct ServerSlot {
    address: String,

    /// Idle connections, most recently used last
    idle: Mutex<Vec<PooledSocket>>,

    /// Set after a failed connect; the server is skipped until then
    dead_until: Mutex<Option<Instant>>,
}

/// Sharded pool of servers
///
/// ## Concurrency:
/// - `idle` and `dead_until`: one Mutex each per server
/// - A borrowed socket is held outside any lock for the whole exchange
/// - All methods use `&self`; exchanges on different servers never contend
pub struct ServerPool {
    servers: Vec<ServerSlot>,
    ring: HashRing,
    connector: Box<dyn Connector>,
    max_idle_per_server: usize,
    dead_server_retry: Duration,
}

impl ServerPool {
    /// Create a pool connecting over TCP
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_connector(config, TcpConnector::from_config(config))
    }

    /// Create a pool with a custom connector
    pub fn with_connector(config: &Config, connector: impl Connector + 'static) -> Result<Self> {
        config.validate()?;

        let servers = config
            .servers
            .iter()
            .map(|address| ServerSlot {
                address: address.clone(),
                idle: Mutex::new(Vec::new()),
                dead_until: Mutex::new(None),
            })
            .collect();

        Ok(Self {
            servers,
            ring: HashRing::build(&config.servers),
            connector: Box::new(connector),
            max_idle_per_server: config.max_idle_per_server,
            dead_server_retry: Duration::from_millis(config.dead_server_retry_ms),
        })
    }

    /// Server owning `hash`
    pub fn server_for(&self, hash: u32) -> ServerId {
        ServerId(self.ring.route(hash))
    }

    /// All servers, in configuration order
    pub fn servers(&self) -> impl Iterator<Item = ServerId> {
        (0..self.servers.len()).map(ServerId)
    }

    pub fn address(&self, id: ServerId) -> &str {
        &self.servers[id.0].address
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// Number of idle connections held for `id`
    pub fn idle_count(&self, id: ServerId) -> usize {
        self.servers[id.0].idle.lock().len()
    }

    /// Whether `id` is currently being skipped after a failed connect
    pub fn is_dead(&self, id: ServerId) -> bool {
        match *self.servers[id.0].dead_until.lock() {
            Some(until) => Instant::now() < until,
            None => false,
        }
    }

    /// Run `action` on a connection to the selected server.
    ///
    /// Returns `default` when the server is unreachable or the connection
    /// fails mid-exchange.
    pub fn execute<T, F>(&self, selector: Selector, default: T, action: F) -> Result<T>
    where
        F: FnOnce(&mut PooledSocket) -> Result<T>,
    {
        let id = match selector {
            Selector::Hash(hash) => self.server_for(hash),
            Selector::Server(id) => id,
        };
        let slot = &self.servers[id.0];

        let mut socket = match self.acquire(slot)? {
            Some(socket) => socket,
            None => return Ok(default),
        };

        match action(&mut socket) {
            Ok(value) => {
                self.release(slot, socket);
                Ok(value)
            }
            Err(McError::Io(e)) => {
                tracing::error!(
                    "I/O error on connection to {}, discarding it: {}",
                    slot.address,
                    e
                );
                Ok(default)
            }
            Err(e) => {
                if e.is_fatal_for_connection() {
                    tracing::error!("Discarding connection to {}: {}", slot.address, e);
                }
                Err(e)
            }
        }
    }

    fn acquire(&self, slot: &ServerSlot) -> Result<Option<PooledSocket>> {
        if let Some(socket) = slot.idle.lock().pop() {
            return Ok(Some(socket));
        }

        {
            let mut dead_until = slot.dead_until.lock();
            match *dead_until {
                Some(until) if Instant::now() < until => {
                    tracing::debug!("Skipping dead server {}", slot.address);
                    return Ok(None);
                }
                Some(_) => *dead_until = None,
                None => {}
            }
        }

        match self.connector.connect(&slot.address) {
            Ok(socket) => Ok(Some(socket)),
            Err(McError::Io(e)) => {
                tracing::warn!(
                    "Could not connect to {}, retrying in {:?}: {}",
                    slot.address,
                    self.dead_server_retry,
                    e
                );
                *slot.dead_until.lock() = Some(Instant::now() + self.dead_server_retry);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn release(&self, slot: &ServerSlot, socket: PooledSocket) {
        let mut idle = slot.idle.lock();
        if idle.len() < self.max_idle_per_server {
            idle.push(socket);
        } else {
            tracing::debug!("Idle limit reached for {}, closing connection", slot.address);
        }
    }
}
