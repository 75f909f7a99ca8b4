//! Callback Capability
//!
//! The coordinator never holds a raw reference to a client. It holds a
//! [`ClientHandle`]: a capability to invoke operations on the client's own
//! endpoint, where every call can fail with a typed [`CallError`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Reachable address of a client's local endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallbackAddress {
    pub host: String,
    pub port: u16,
}

impl CallbackAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for CallbackAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Failure of a single outbound call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    #[error("could not connect to {0}")]
    Connect(String),
    #[error("i/o error: {0}")]
    Io(String),
    #[error("call timed out")]
    Timeout,
    #[error("connection closed by peer")]
    Closed,
    #[error("codec error: {0}")]
    Codec(String),
    #[error("remote error: {0}")]
    Remote(String),
    #[error("unexpected response")]
    UnexpectedResponse,
}

impl From<std::io::Error> for CallError {
    fn from(e: std::io::Error) -> Self {
        CallError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for CallError {
    fn from(e: serde_json::Error) -> Self {
        CallError::Codec(e.to_string())
    }
}

/// Operations the coordinator (or a private peer) may invoke on a client
#[async_trait]
pub trait ClientHandle: Send + Sync + 'static {
    /// Address this handle calls into.
    fn address(&self) -> &CallbackAddress;

    /// No-op liveness probe.
    async fn is_alive(&self) -> Result<(), CallError>;

    /// Deliver a formatted line to the client.
    async fn incoming_message(&self, text: &str) -> Result<(), CallError>;

    /// Ask the client to register `peer` at `address` as its private peer.
    ///
    /// Returns `Ok(false)` when the client was reached but refused, for
    /// instance because it could not open its own channel to the peer.
    async fn setup_connection(
        &self,
        peer: &str,
        address: &CallbackAddress,
    ) -> Result<bool, CallError>;

    /// Drop the private peer. With `close_peer` the client also tells the
    /// peer to drop it.
    ///
    /// With `only_with` set, a session with any other peer is left alone.
    async fn leave_private(
        &self,
        close_peer: bool,
        only_with: Option<&str>,
    ) -> Result<(), CallError>;

    /// Whether the client currently has a private peer.
    async fn in_private_room(&self) -> Result<bool, CallError>;
}

/// Opens [`ClientHandle`]s from addresses
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, address: &CallbackAddress) -> Result<Arc<dyn ClientHandle>, CallError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_display() {
        let addr = CallbackAddress::new("127.0.0.1", 11000);
        assert_eq!(addr.to_string(), "127.0.0.1:11000");
    }

    #[test]
    fn test_io_error_conversion() {
        let err: CallError =
            std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset").into();
        assert!(matches!(err, CallError::Io(_)));
    }
}
