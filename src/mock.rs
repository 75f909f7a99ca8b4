//! Recording in-memory clients for unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::callback::{CallError, CallbackAddress, ClientHandle, Connector};

#[derive(Debug)]
pub struct MockClient {
    address: CallbackAddress,
    pub inbox: Mutex<Vec<String>>,
    pub peer: Mutex<Option<String>>,
    pub leave_calls: AtomicUsize,
    pub probes: AtomicUsize,
    alive: AtomicBool,
    refuse_setup: AtomicBool,
    lose_setup_reply: AtomicBool,
    fail_leave: AtomicBool,
    drop_messages: AtomicBool,
}

impl MockClient {
    pub fn new(address: CallbackAddress) -> Self {
        Self {
            address,
            inbox: Mutex::new(Vec::new()),
            peer: Mutex::new(None),
            leave_calls: AtomicUsize::new(0),
            probes: AtomicUsize::new(0),
            alive: AtomicBool::new(true),
            refuse_setup: AtomicBool::new(false),
            lose_setup_reply: AtomicBool::new(false),
            fail_leave: AtomicBool::new(false),
            drop_messages: AtomicBool::new(false),
        }
    }

    /// Every call fails with `Closed` once the client is killed.
    pub fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    pub fn refuse_setup(&self) {
        self.refuse_setup.store(true, Ordering::SeqCst);
    }

    /// `setup_connection` takes effect but the caller sees a timeout.
    pub fn lose_setup_reply(&self) {
        self.lose_setup_reply.store(true, Ordering::SeqCst);
    }

    /// Only `leave_private` fails.
    pub fn fail_leave(&self) {
        self.fail_leave.store(true, Ordering::SeqCst);
    }

    /// Pair with `peer` without going through a handshake.
    pub fn pair_with(&self, peer: &str) {
        *self.peer.lock() = Some(peer.to_string());
    }

    /// Only `incoming_message` fails.
    pub fn drop_messages(&self) {
        self.drop_messages.store(true, Ordering::SeqCst);
    }

    pub fn received(&self) -> Vec<String> {
        self.inbox.lock().clone()
    }

    pub fn private_peer(&self) -> Option<String> {
        self.peer.lock().clone()
    }

    fn check(&self) -> Result<(), CallError> {
        if self.alive.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CallError::Closed)
        }
    }
}

#[async_trait]
impl ClientHandle for MockClient {
    fn address(&self) -> &CallbackAddress {
        &self.address
    }

    async fn is_alive(&self) -> Result<(), CallError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.check()
    }

    async fn incoming_message(&self, text: &str) -> Result<(), CallError> {
        self.check()?;
        if self.drop_messages.load(Ordering::SeqCst) {
            return Err(CallError::Timeout);
        }
        self.inbox.lock().push(text.to_string());
        Ok(())
    }

    async fn setup_connection(
        &self,
        peer: &str,
        _address: &CallbackAddress,
    ) -> Result<bool, CallError> {
        self.check()?;
        if self.refuse_setup.load(Ordering::SeqCst) {
            return Ok(false);
        }
        {
            let mut current = self.peer.lock();
            if current.is_some() {
                return Ok(false);
            }
            *current = Some(peer.to_string());
        }
        if self.lose_setup_reply.load(Ordering::SeqCst) {
            return Err(CallError::Timeout);
        }
        Ok(true)
    }

    async fn leave_private(
        &self,
        _close_peer: bool,
        only_with: Option<&str>,
    ) -> Result<(), CallError> {
        self.check()?;
        if self.fail_leave.load(Ordering::SeqCst) {
            return Err(CallError::Timeout);
        }
        self.leave_calls.fetch_add(1, Ordering::SeqCst);
        let mut current = self.peer.lock();
        if only_with.is_none() || current.as_deref() == only_with {
            *current = None;
        }
        Ok(())
    }

    async fn in_private_room(&self) -> Result<bool, CallError> {
        self.check()?;
        Ok(self.peer.lock().is_some())
    }
}

/// Hands out pre-registered [`MockClient`]s by address.
#[derive(Debug, Default)]
pub struct MockConnector {
    clients: Mutex<HashMap<CallbackAddress, Arc<MockClient>>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, port: u16) -> (CallbackAddress, Arc<MockClient>) {
        let address = CallbackAddress::new("127.0.0.1", port);
        let client = Arc::new(MockClient::new(address.clone()));
        self.clients.lock().insert(address.clone(), client.clone());
        (address, client)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(
        &self,
        address: &CallbackAddress,
    ) -> Result<Arc<dyn ClientHandle>, CallError> {
        let client = self.clients.lock().get(address).cloned();
        match client {
            Some(client) => {
                client.check()?;
                Ok(client as Arc<dyn ClientHandle>)
            }
            None => Err(CallError::Connect(address.to_string())),
        }
    }
}
