//! Network Module
//!
//! Server selection and connection handling.
//!
//! ## Architecture
//! - Consistent hash ring maps key hashes to servers
//! - One idle-connection stack per server
//! - Each operation borrows one connection exclusively

mod connection;
mod ring;
mod pool;

pub use connection::PooledSocket;
pub use ring::{HashRing, POINTS_PER_SERVER};
pub use pool::{Connector, Selector, ServerId, ServerPool, TcpConnector};
