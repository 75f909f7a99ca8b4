//! Coordinator Errors
//!
//! Every failure a transport-level caller can observe. These are returned as
//! values and rendered into status strings at the wire boundary.

use crate::callback::CallError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    #[error("Username must not be empty")]
    InvalidUsername,
    #[error("{0} is already registered with the server")]
    DuplicateRegistration(String),
    #[error("Could not reach {username}: {source}")]
    UnreachablePeer {
        username: String,
        #[source]
        source: CallError,
    },
    #[error("{0} is not registered with the server")]
    NotRegistered(String),
    #[error("You have not joined the public chat room yet. To join type: `join 'Public'`")]
    NotAMember,
    #[error("{0} is already in the public chat room")]
    AlreadyMember(String),
    #[error("{0} is not online")]
    TargetOffline(String),
    #[error("You cannot start a private chat with yourself")]
    SelfTarget,
    #[error("{0} has not sent you a private chat request")]
    NoSuchRequest(String),
    #[error("The private chat request of {initiator} is addressed to {expected}")]
    Mismatch { initiator: String, expected: String },
    #[error("Private chat between {initiator} and {accepter} could not be set up")]
    HandshakeFailed { initiator: String, accepter: String },
    #[error("Private chat setup failed and {username} could not be rolled back")]
    HandshakeRollbackFailed { username: String },
}

impl ChatError {
    pub(crate) fn unreachable(username: &str, source: CallError) -> Self {
        ChatError::UnreachablePeer {
            username: username.to_string(),
            source,
        }
    }
}
