//! Client Registry
//!
//! Authoritative mapping from username to the callback handle of that
//! client's endpoint.

use chrono::{DateTime, Utc};
use log::info;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::callback::{CallbackAddress, ClientHandle, Connector};
use crate::error::ChatError;

/// A registered client
#[derive(Clone)]
pub struct ClientEntry {
    pub id: Uuid,
    pub username: String,
    pub address: CallbackAddress,
    pub handle: Arc<dyn ClientHandle>,
    pub registered_at: DateTime<Utc>,
}

impl std::fmt::Debug for ClientEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientEntry")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("address", &self.address)
            .field("registered_at", &self.registered_at)
            .finish()
    }
}

pub struct ClientRegistry {
    connector: Arc<dyn Connector>,
    clients: RwLock<HashMap<String, ClientEntry>>,
}

impl ClientRegistry {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Register a client, opening the connection used for all later
    /// callbacks to it.
    ///
    /// Two concurrent registrations of the same name both may connect, but
    /// only the first to insert wins; the other gets `DuplicateRegistration`
    /// and its connection is dropped.
    pub async fn register(
        &self,
        username: &str,
        address: CallbackAddress,
    ) -> Result<ClientEntry, ChatError> {
        if username.trim().is_empty() {
            return Err(ChatError::InvalidUsername);
        }
        if self.contains(username) {
            return Err(ChatError::DuplicateRegistration(username.to_string()));
        }

        let handle = self
            .connector
            .connect(&address)
            .await
            .map_err(|e| ChatError::unreachable(username, e))?;

        let entry = ClientEntry {
            id: Uuid::new_v4(),
            username: username.to_string(),
            address,
            handle,
            registered_at: Utc::now(),
        };

        let mut clients = self.clients.write();
        if clients.contains_key(username) {
            return Err(ChatError::DuplicateRegistration(username.to_string()));
        }
        clients.insert(username.to_string(), entry.clone());
        info!(
            "Registered client {} at {} ({} online)",
            username,
            entry.address,
            clients.len()
        );
        Ok(entry)
    }

    /// Remove a client. Idempotent.
    pub fn unregister(&self, username: &str) -> Option<ClientEntry> {
        let removed = self.clients.write().remove(username);
        if let Some(entry) = &removed {
            info!("Unregistered client {} ({})", entry.username, entry.id);
        }
        removed
    }

    /// Remove a client only if it is still the registration identified by
    /// `id`.
    pub fn unregister_entry(&self, username: &str, id: Uuid) -> Option<ClientEntry> {
        let mut clients = self.clients.write();
        match clients.get(username) {
            Some(entry) if entry.id == id => clients.remove(username),
            _ => None,
        }
    }

    pub fn lookup(&self, username: &str) -> Option<ClientEntry> {
        self.clients.read().get(username).cloned()
    }

    pub fn contains(&self, username: &str) -> bool {
        self.clients.read().contains_key(username)
    }

    /// Sorted snapshot of all registered usernames
    pub fn list_usernames(&self) -> Vec<String> {
        let mut names: Vec<String> = self.clients.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Snapshot of every entry
    pub fn entries(&self) -> Vec<ClientEntry> {
        self.clients.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.read().is_empty()
    }
}
