//! Chat Service
//!
//! Accepts client connections and turns each framed [`ServerRequest`] into a
//! call on the [`ChatCoordinator`]. Errors become status strings in the
//! response; nothing a client sends can take the server down.

use log::{debug, error, info, warn};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};

use crate::callback::CallError;
use crate::coordinator::ChatCoordinator;
use crate::protocol::{ServerRequest, ServerResponse};
use crate::transport::{read_frame, write_frame};

pub struct ChatServer {
    listener: TcpListener,
    coordinator: Arc<ChatCoordinator>,
}

impl ChatServer {
    pub async fn bind(addr: SocketAddr, coordinator: Arc<ChatCoordinator>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            coordinator,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn coordinator(&self) -> Arc<ChatCoordinator> {
        self.coordinator.clone()
    }

    /// Accept connections until `shutdown` resolves.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        let ChatServer {
            listener,
            coordinator,
        } = self;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Chat server shutting down");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer_addr)) => {
                        debug!("New connection from {}", peer_addr);
                        let coordinator = coordinator.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, &coordinator).await {
                                warn!("Connection from {} closed with error: {}", peer_addr, e);
                            }
                        });
                    }
                    Err(e) => error!("Failed to accept connection: {}", e),
                },
            }
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    coordinator: &ChatCoordinator,
) -> Result<(), CallError> {
    while let Some(request) = read_frame::<_, ServerRequest>(&mut stream).await? {
        let response = dispatch(coordinator, request).await;
        write_frame(&mut stream, &response).await?;
    }
    Ok(())
}

/// Run one request against the coordinator.
pub async fn dispatch(coordinator: &ChatCoordinator, request: ServerRequest) -> ServerResponse {
    match request {
        ServerRequest::Register { username, address } => {
            match coordinator.register(&username, address).await {
                Ok(()) => ServerResponse::Registered {
                    success: true,
                    error: None,
                },
                Err(e) => {
                    warn!("Registration of {} refused: {}", username, e);
                    ServerResponse::Registered {
                        success: false,
                        error: Some(e.to_string()),
                    }
                }
            }
        }

        ServerRequest::GetClientList => ServerResponse::ClientList {
            usernames: coordinator.get_client_list(),
        },

        ServerRequest::Join { username, room } => match coordinator.join(&username, &room).await {
            Ok(status) => ServerResponse::Joined {
                success: true,
                status,
            },
            Err(e) => ServerResponse::Joined {
                success: false,
                status: e.to_string(),
            },
        },

        ServerRequest::Leave { username } => match coordinator.leave(&username) {
            Ok(()) => ServerResponse::Left {
                success: true,
                error: None,
            },
            Err(e) => ServerResponse::Left {
                success: false,
                error: Some(e.to_string()),
            },
        },

        ServerRequest::SendMessage { username, message } => {
            match coordinator.send_message(&username, &message).await {
                Ok(text) => ServerResponse::MessageSent {
                    success: true,
                    text,
                },
                Err(e) => ServerResponse::MessageSent {
                    success: false,
                    text: e.to_string(),
                },
            }
        }

        ServerRequest::Exit { username } => {
            coordinator.exit(&username);
            ServerResponse::Exited
        }

        ServerRequest::AcceptPrivate {
            username,
            initiator,
        } => match coordinator.accept_private(&username, &initiator).await {
            Ok(_) => ServerResponse::PrivateAccepted {
                success: true,
                error: None,
            },
            Err(e) => ServerResponse::PrivateAccepted {
                success: false,
                error: Some(e.to_string()),
            },
        },

        ServerRequest::IsAlive => {
            coordinator.is_alive();
            ServerResponse::Alive
        }
    }
}
