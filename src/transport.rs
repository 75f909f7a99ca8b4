//! TCP Transport
//!
//! Length-prefixed JSON frames over TCP, and a request/response channel
//! built on them. A channel carries one call at a time; every call is
//! bounded by the channel's timeout.

use async_trait::async_trait;
use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::callback::{CallError, CallbackAddress, ClientHandle, Connector};
use crate::protocol::{self, ClientRequest, ClientResponse, MAX_FRAME_LEN};

/// Write one framed message. Messages over [`MAX_FRAME_LEN`] are rejected
/// before anything is written.
pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> Result<(), CallError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let data = protocol::to_framed(message)?;
    if data.len() - 4 > MAX_FRAME_LEN {
        return Err(CallError::Codec(format!(
            "message too large ({} bytes, limit {})",
            data.len() - 4,
            MAX_FRAME_LEN
        )));
    }
    writer.write_all(&data).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one framed message. `Ok(None)` means the peer closed the
/// connection between frames.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>, CallError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let msg_len = u32::from_be_bytes(len_buf) as usize;
    if msg_len > MAX_FRAME_LEN {
        return Err(CallError::Codec(format!("frame too large ({} bytes)", msg_len)));
    }

    let mut msg_buf = vec![0u8; msg_len];
    reader.read_exact(&mut msg_buf).await?;
    Ok(Some(protocol::from_bytes(&msg_buf)?))
}

/// A reusable request/response connection to one endpoint
#[derive(Debug)]
pub struct RpcChannel {
    address: CallbackAddress,
    timeout: Duration,
    stream: Mutex<Option<TcpStream>>,
}

impl RpcChannel {
    /// Connect eagerly so an unreachable endpoint is reported right away.
    pub async fn connect(address: CallbackAddress, timeout: Duration) -> Result<Self, CallError> {
        let stream = open(&address, timeout).await?;
        Ok(Self {
            address,
            timeout,
            stream: Mutex::new(Some(stream)),
        })
    }

    pub fn address(&self) -> &CallbackAddress {
        &self.address
    }

    /// Send `request` and wait for the reply.
    ///
    /// A failed call drops the connection; the next call reconnects.
    pub async fn call<Req, Resp>(&self, request: &Req) -> Result<Resp, CallError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned + Send,
    {
        let mut slot = self.stream.lock().await;
        if slot.is_none() {
            debug!("Reconnecting to {}", self.address);
            *slot = Some(open(&self.address, self.timeout).await?);
        }
        let Some(stream) = slot.as_mut() else {
            return Err(CallError::Closed);
        };

        let result = match tokio::time::timeout(self.timeout, exchange(stream, request)).await {
            Ok(result) => result,
            Err(_) => Err(CallError::Timeout),
        };
        if result.is_err() {
            *slot = None;
        }
        result
    }

    /// Drop the connection.
    pub async fn close(&self) {
        if let Some(mut stream) = self.stream.lock().await.take() {
            let _ = stream.shutdown().await;
        }
    }
}

async fn exchange<Req, Resp>(stream: &mut TcpStream, request: &Req) -> Result<Resp, CallError>
where
    Req: Serialize + Sync,
    Resp: DeserializeOwned,
{
    write_frame(stream, request).await?;
    read_frame(stream).await?.ok_or(CallError::Closed)
}

async fn open(address: &CallbackAddress, timeout: Duration) -> Result<TcpStream, CallError> {
    let target = (address.host.as_str(), address.port);
    match tokio::time::timeout(timeout, TcpStream::connect(target)).await {
        Ok(Ok(stream)) => {
            let _ = stream.set_nodelay(true);
            Ok(stream)
        }
        Ok(Err(e)) => Err(CallError::Connect(format!("{}: {}", address, e))),
        Err(_) => Err(CallError::Timeout),
    }
}

/// [`ClientHandle`] over an [`RpcChannel`] to a client endpoint
#[derive(Debug)]
pub struct TcpClientHandle {
    channel: RpcChannel,
}

impl TcpClientHandle {
    pub async fn connect(address: CallbackAddress, timeout: Duration) -> Result<Self, CallError> {
        Ok(Self {
            channel: RpcChannel::connect(address, timeout).await?,
        })
    }

    pub async fn close(&self) {
        self.channel.close().await;
    }

    async fn request(&self, request: &ClientRequest) -> Result<ClientResponse, CallError> {
        let response: ClientResponse = self.channel.call(request).await?;
        match response {
            ClientResponse::Error { message } => Err(CallError::Remote(message)),
            response => Ok(response),
        }
    }
}

#[async_trait]
impl ClientHandle for TcpClientHandle {
    fn address(&self) -> &CallbackAddress {
        self.channel.address()
    }

    async fn is_alive(&self) -> Result<(), CallError> {
        match self.request(&ClientRequest::IsAlive).await? {
            ClientResponse::Alive => Ok(()),
            _ => Err(CallError::UnexpectedResponse),
        }
    }

    async fn incoming_message(&self, text: &str) -> Result<(), CallError> {
        let request = ClientRequest::IncomingMessage {
            text: text.to_string(),
        };
        match self.request(&request).await? {
            ClientResponse::Ack => Ok(()),
            _ => Err(CallError::UnexpectedResponse),
        }
    }

    async fn setup_connection(
        &self,
        peer: &str,
        address: &CallbackAddress,
    ) -> Result<bool, CallError> {
        let request = ClientRequest::SetupConnection {
            peer: peer.to_string(),
            address: address.clone(),
        };
        match self.request(&request).await? {
            ClientResponse::ConnectionSetup { success } => Ok(success),
            _ => Err(CallError::UnexpectedResponse),
        }
    }

    async fn leave_private(
        &self,
        close_peer: bool,
        only_with: Option<&str>,
    ) -> Result<(), CallError> {
        let request = ClientRequest::LeavePrivate {
            close_peer,
            only_with: only_with.map(str::to_string),
        };
        match self.request(&request).await? {
            ClientResponse::Ack => Ok(()),
            _ => Err(CallError::UnexpectedResponse),
        }
    }

    async fn in_private_room(&self) -> Result<bool, CallError> {
        match self.request(&ClientRequest::InPrivateRoom).await? {
            ClientResponse::InPrivateRoom { active } => Ok(active),
            _ => Err(CallError::UnexpectedResponse),
        }
    }
}

/// Connects to client endpoints over TCP and validates them with a probe
#[derive(Debug, Clone)]
pub struct TcpConnector {
    timeout: Duration,
}

impl TcpConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(
        &self,
        address: &CallbackAddress,
    ) -> Result<Arc<dyn ClientHandle>, CallError> {
        let handle = TcpClientHandle::connect(address.clone(), self.timeout).await?;
        handle.is_alive().await?;
        Ok(Arc::new(handle))
    }
}
