//! Named clients
//!
//! An owned map from name to shared [`Client`]. Create one where the
//! application is wired together and pass it down; nothing here is global.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::{Config, ProtocolKind};
use crate::error::{McError, Result};

use super::Client;

#[derive(Default)]
pub struct ClientRegistry {
    clients: RwLock<HashMap<String, Arc<Client>>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a text protocol client for `servers`
    pub fn setup<I, S>(&self, name: &str, servers: I) -> Result<Arc<Client>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let config = Config::builder()
            .servers(servers)
            .protocol(ProtocolKind::Text)
            .build();
        self.setup_with_config(name, config)
    }

    /// Register a binary protocol client for `servers`
    pub fn setup_binary<I, S>(&self, name: &str, servers: I) -> Result<Arc<Client>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let config = Config::builder()
            .servers(servers)
            .protocol(ProtocolKind::Binary)
            .build();
        self.setup_with_config(name, config)
    }

    /// Register a client built from `config`; names must be unique
    pub fn setup_with_config(&self, name: &str, config: Config) -> Result<Arc<Client>> {
        self.register(name, Client::new(config)?)
    }

    /// Register an already built client; names must be unique
    pub fn register(&self, name: &str, client: Client) -> Result<Arc<Client>> {
        let mut clients = self.clients.write();
        if clients.contains_key(name) {
            return Err(McError::Config(format!(
                "a client named '{}' is already registered",
                name
            )));
        }
        let client = Arc::new(client);
        clients.insert(name.to_string(), Arc::clone(&client));
        tracing::info!("Registered {} client '{}'", client.protocol(), name);
        Ok(client)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Client>> {
        self.clients.read().get(name).cloned()
    }

    pub fn remove(&self, name: &str) -> Option<Arc<Client>> {
        self.clients.write().remove(name)
    }

    /// Drop every registered client
    pub fn reset(&self) {
        self.clients.write().clear();
    }

    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.read().is_empty()
    }
}
