//! Callback Chat - Chat Coordinator Library
//!
//! A server that tracks connected clients, runs one shared public room,
//! brokers one-to-one private sessions, and delivers every message by
//! calling back into each recipient's own endpoint.

pub mod callback;
pub mod commands;
pub mod config;
pub mod coordinator;
pub mod endpoint;
pub mod error;
pub mod handshake;
pub mod liveness;
pub mod protocol;
pub mod proxy;
pub mod registry;
pub mod room;
pub mod service;
pub mod transport;

#[cfg(test)]
mod mock;

pub use callback::{CallError, CallbackAddress, ClientHandle, Connector};
pub use config::{ClientConfig, ServerConfig};
pub use coordinator::ChatCoordinator;
pub use error::ChatError;
pub use liveness::{LivenessMonitor, MonitorHandle};
pub use room::PUBLIC_ROOM;
pub use service::ChatServer;
pub use transport::TcpConnector;
