//! Client Endpoint
//!
//! The server on each client that the coordinator and private peers call
//! into. Incoming lines are pushed to an inbox channel for display. A
//! private peer, once set up, is called directly without the server.

use log::{debug, info, warn};
use parking_lot::Mutex;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::callback::{CallError, CallbackAddress, ClientHandle};
use crate::protocol::{ClientRequest, ClientResponse};
use crate::transport::{read_frame, write_frame, TcpClientHandle};

#[derive(Clone)]
struct PrivatePeer {
    username: String,
    handle: Arc<TcpClientHandle>,
}

/// State shared by the endpoint's connections and the local shell
pub struct EndpointState {
    username: String,
    timeout: Duration,
    inbox: mpsc::UnboundedSender<String>,
    peer: Mutex<Option<PrivatePeer>>,
}

impl EndpointState {
    pub fn new(
        username: impl Into<String>,
        timeout: Duration,
        inbox: mpsc::UnboundedSender<String>,
    ) -> Self {
        Self {
            username: username.into(),
            timeout,
            inbox,
            peer: Mutex::new(None),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn private_peer(&self) -> Option<String> {
        self.peer.lock().as_ref().map(|p| p.username.clone())
    }

    /// Answer one call from the server or a peer.
    pub async fn handle(&self, request: ClientRequest) -> ClientResponse {
        match request {
            ClientRequest::IsAlive => ClientResponse::Alive,
            ClientRequest::IncomingMessage { text } => {
                self.show(text);
                ClientResponse::Ack
            }
            ClientRequest::SetupConnection { peer, address } => {
                let success = self.setup_connection(peer, address).await;
                ClientResponse::ConnectionSetup { success }
            }
            ClientRequest::LeavePrivate {
                close_peer,
                only_with,
            } => {
                self.end_private(close_peer, only_with.as_deref()).await;
                ClientResponse::Ack
            }
            ClientRequest::InPrivateRoom => {
                let active = self.peer.lock().is_some();
                ClientResponse::InPrivateRoom { active }
            }
        }
    }

    /// Send a line straight to the private peer. Returns the line as sent.
    pub async fn send_private(&self, text: &str) -> Result<String, CallError> {
        let peer = self.peer.lock().clone().ok_or(CallError::Closed)?;
        let line = format!("[private] {}: {}", self.username, text);
        peer.handle.incoming_message(&line).await?;
        Ok(line)
    }

    /// End the private session. With `close_peer` the peer is told as well.
    /// Returns the former peer.
    pub async fn leave_private(&self, close_peer: bool) -> Option<String> {
        self.end_private(close_peer, None).await
    }

    /// Like [`leave_private`](Self::leave_private), but with `only_with` set
    /// a session with a different peer is kept.
    async fn end_private(&self, close_peer: bool, only_with: Option<&str>) -> Option<String> {
        let peer = {
            let mut slot = self.peer.lock();
            if let (Some(current), Some(expected)) = (slot.as_ref(), only_with) {
                if current.username != expected {
                    debug!(
                        "Keeping private chat with {}: leave was meant for {}",
                        current.username, expected
                    );
                    return None;
                }
            }
            slot.take()
        }?;
        if close_peer {
            if let Err(e) = peer
                .handle
                .leave_private(false, Some(&self.username))
                .await
            {
                warn!("Could not notify {} about leaving: {}", peer.username, e);
            }
        }
        peer.handle.close().await;
        self.show(format!("Private chat with {} ended", peer.username));
        Some(peer.username)
    }

    async fn setup_connection(&self, peer: String, address: CallbackAddress) -> bool {
        if self.peer.lock().is_some() {
            warn!("Refusing private chat with {}: already in one", peer);
            return false;
        }

        let handle = match TcpClientHandle::connect(address.clone(), self.timeout).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Could not reach {} at {}: {}", peer, address, e);
                return false;
            }
        };

        let accepted = {
            let mut slot = self.peer.lock();
            if slot.is_none() {
                *slot = Some(PrivatePeer {
                    username: peer.clone(),
                    handle: Arc::new(handle),
                });
                true
            } else {
                false
            }
        };

        if accepted {
            info!("Private chat with {} at {} set up", peer, address);
            self.show(format!(
                "Private chat with {} started. Messages now go directly to them; type `leave` to end it",
                peer
            ));
        }
        accepted
    }

    fn show(&self, line: String) {
        if self.inbox.send(line).is_err() {
            debug!("Inbox closed, dropping line");
        }
    }
}

/// Listener for calls on a client's endpoint
pub struct LocalEndpoint {
    listener: TcpListener,
    state: Arc<EndpointState>,
}

impl LocalEndpoint {
    /// Bind the endpoint. Lines for display arrive on the returned receiver.
    pub async fn bind(
        addr: SocketAddr,
        username: &str,
        timeout: Duration,
    ) -> std::io::Result<(Self, mpsc::UnboundedReceiver<String>)> {
        let listener = TcpListener::bind(addr).await?;
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let state = Arc::new(EndpointState::new(username, timeout, inbox_tx));
        Ok((Self { listener, state }, inbox_rx))
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn state(&self) -> Arc<EndpointState> {
        self.state.clone()
    }

    /// Serve calls until `shutdown` resolves. Open connections are dropped
    /// on shutdown, so callers see the endpoint as gone.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        let LocalEndpoint { listener, state } = self;
        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer_addr)) => {
                        let state = state.clone();
                        connections.spawn(async move {
                            if let Err(e) = serve_connection(stream, state).await {
                                debug!("Endpoint connection from {} closed: {}", peer_addr, e);
                            }
                        });
                    }
                    Err(e) => warn!("Endpoint failed to accept: {}", e),
                },
            }
        }
        connections.shutdown().await;
    }
}

async fn serve_connection(mut stream: TcpStream, state: Arc<EndpointState>) -> Result<(), CallError> {
    while let Some(request) = read_frame::<_, ClientRequest>(&mut stream).await? {
        let response = state.handle(request).await;
        write_frame(&mut stream, &response).await?;
    }
    Ok(())
}
