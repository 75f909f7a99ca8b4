//! Server Proxy
//!
//! Client-side view of the chat server: one method per server operation,
//! each returning either the server's answer or why it refused.

use std::time::Duration;
use thiserror::Error;

use crate::callback::{CallError, CallbackAddress};
use crate::protocol::{ServerRequest, ServerResponse};
use crate::transport::RpcChannel;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProxyError {
    #[error(transparent)]
    Call(#[from] CallError),
    #[error("{0}")]
    Refused(String),
}

pub struct ServerProxy {
    channel: RpcChannel,
    username: String,
}

impl ServerProxy {
    pub async fn connect(
        address: CallbackAddress,
        username: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, CallError> {
        Ok(Self {
            channel: RpcChannel::connect(address, timeout).await?,
            username: username.into(),
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Register this client's endpoint address with the server.
    pub async fn register(&self, endpoint: CallbackAddress) -> Result<(), ProxyError> {
        let request = ServerRequest::Register {
            username: self.username.clone(),
            address: endpoint,
        };
        match self.call(&request).await? {
            ServerResponse::Registered { success: true, .. } => Ok(()),
            ServerResponse::Registered { error, .. } => Err(refused(error)),
            _ => Err(CallError::UnexpectedResponse.into()),
        }
    }

    pub async fn client_list(&self) -> Result<Vec<String>, ProxyError> {
        match self.call(&ServerRequest::GetClientList).await? {
            ServerResponse::ClientList { usernames } => Ok(usernames),
            _ => Err(CallError::UnexpectedResponse.into()),
        }
    }

    /// Join `"Public"` or ask another client for a private chat.
    pub async fn join(&self, room: &str) -> Result<String, ProxyError> {
        let request = ServerRequest::Join {
            username: self.username.clone(),
            room: room.to_string(),
        };
        match self.call(&request).await? {
            ServerResponse::Joined {
                success: true,
                status,
            } => Ok(status),
            ServerResponse::Joined { status, .. } => Err(ProxyError::Refused(status)),
            _ => Err(CallError::UnexpectedResponse.into()),
        }
    }

    pub async fn leave(&self) -> Result<(), ProxyError> {
        let request = ServerRequest::Leave {
            username: self.username.clone(),
        };
        match self.call(&request).await? {
            ServerResponse::Left { success: true, .. } => Ok(()),
            ServerResponse::Left { error, .. } => Err(refused(error)),
            _ => Err(CallError::UnexpectedResponse.into()),
        }
    }

    pub async fn send_message(&self, message: &str) -> Result<String, ProxyError> {
        let request = ServerRequest::SendMessage {
            username: self.username.clone(),
            message: message.to_string(),
        };
        match self.call(&request).await? {
            ServerResponse::MessageSent {
                success: true,
                text,
            } => Ok(text),
            ServerResponse::MessageSent { text, .. } => Err(ProxyError::Refused(text)),
            _ => Err(CallError::UnexpectedResponse.into()),
        }
    }

    pub async fn accept_private(&self, initiator: &str) -> Result<(), ProxyError> {
        let request = ServerRequest::AcceptPrivate {
            username: self.username.clone(),
            initiator: initiator.to_string(),
        };
        match self.call(&request).await? {
            ServerResponse::PrivateAccepted { success: true, .. } => Ok(()),
            ServerResponse::PrivateAccepted { error, .. } => Err(refused(error)),
            _ => Err(CallError::UnexpectedResponse.into()),
        }
    }

    pub async fn exit(&self) -> Result<(), ProxyError> {
        let request = ServerRequest::Exit {
            username: self.username.clone(),
        };
        match self.call(&request).await? {
            ServerResponse::Exited => Ok(()),
            _ => Err(CallError::UnexpectedResponse.into()),
        }
    }

    pub async fn is_alive(&self) -> Result<(), ProxyError> {
        match self.call(&ServerRequest::IsAlive).await? {
            ServerResponse::Alive => Ok(()),
            _ => Err(CallError::UnexpectedResponse.into()),
        }
    }

    pub async fn close(&self) {
        self.channel.close().await;
    }

    async fn call(&self, request: &ServerRequest) -> Result<ServerResponse, ProxyError> {
        let response: ServerResponse = self.channel.call(request).await?;
        match response {
            ServerResponse::Error { message } => Err(ProxyError::Refused(message)),
            response => Ok(response),
        }
    }
}

fn refused(error: Option<String>) -> ProxyError {
    ProxyError::Refused(error.unwrap_or_else(|| "request refused".to_string()))
}
