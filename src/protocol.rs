//! Wire Protocol
//!
//! Messages exchanged between clients, the server and private peers. Each
//! frame is a 4-byte big-endian length followed by a JSON document.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::callback::CallbackAddress;

/// Largest accepted frame body
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Calls a client makes on the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerRequest {
    Register {
        username: String,
        address: CallbackAddress,
    },
    GetClientList,
    Join {
        username: String,
        room: String,
    },
    Leave {
        username: String,
    },
    SendMessage {
        username: String,
        message: String,
    },
    Exit {
        username: String,
    },
    AcceptPrivate {
        username: String,
        initiator: String,
    },
    IsAlive,
}

/// Server replies. Failures always carry a readable status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerResponse {
    Registered {
        success: bool,
        error: Option<String>,
    },
    ClientList {
        usernames: Vec<String>,
    },
    Joined {
        success: bool,
        status: String,
    },
    Left {
        success: bool,
        error: Option<String>,
    },
    /// `text` is the delivered line on success, the reason otherwise
    MessageSent {
        success: bool,
        text: String,
    },
    Exited,
    PrivateAccepted {
        success: bool,
        error: Option<String>,
    },
    Alive,
    Error {
        message: String,
    },
}

/// Calls made on a client's own endpoint, by the server or a private peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientRequest {
    IsAlive,
    IncomingMessage {
        text: String,
    },
    SetupConnection {
        peer: String,
        address: CallbackAddress,
    },
    LeavePrivate {
        close_peer: bool,
        #[serde(default)]
        only_with: Option<String>,
    },
    InPrivateRoom,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientResponse {
    Alive,
    Ack,
    ConnectionSetup { success: bool },
    InPrivateRoom { active: bool },
    Error { message: String },
}

/// Serialize a message to JSON bytes
pub fn to_bytes<T: Serialize>(message: &T) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(message)
}

/// Deserialize a message from JSON bytes
pub fn from_bytes<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, serde_json::Error> {
    serde_json::from_slice(bytes)
}

/// Create a framed message with length prefix (4 bytes, big-endian)
pub fn to_framed<T: Serialize>(message: &T) -> Result<Vec<u8>, serde_json::Error> {
    let data = to_bytes(message)?;
    let len = (data.len() as u32).to_be_bytes();
    let mut framed = Vec::with_capacity(4 + data.len());
    framed.extend_from_slice(&len);
    framed.extend_from_slice(&data);
    Ok(framed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_tagging() {
        let msg = ServerRequest::Join {
            username: "alice".to_string(),
            room: "Public".to_string(),
        };
        let json: serde_json::Value = serde_json::from_slice(&to_bytes(&msg).unwrap()).unwrap();
        assert_eq!(json["type"], "join");
        assert_eq!(json["room"], "Public");
    }

    #[test]
    fn test_parse_register() {
        let raw = br#"{"type":"register","username":"bob","address":{"host":"10.0.0.2","port":11000}}"#;
        let parsed: ServerRequest = from_bytes(raw).unwrap();
        assert_eq!(
            parsed,
            ServerRequest::Register {
                username: "bob".to_string(),
                address: CallbackAddress::new("10.0.0.2", 11000),
            }
        );
    }

    #[test]
    fn test_leave_private_target_is_optional() {
        let parsed: ClientRequest =
            from_bytes(br#"{"type":"leave_private","close_peer":true}"#).unwrap();
        assert_eq!(
            parsed,
            ClientRequest::LeavePrivate {
                close_peer: true,
                only_with: None,
            }
        );
    }

    #[test]
    fn test_framed_message() {
        let framed = to_framed(&ClientRequest::IsAlive).unwrap();

        // Check length prefix
        let len = u32::from_be_bytes([framed[0], framed[1], framed[2], framed[3]]);
        assert_eq!(len as usize, framed.len() - 4);
    }
}
