//! Private Session Handshake
//!
//! A private chat is brokered, not relayed: the coordinator records an
//! initiator's request, invites the target, and once the target accepts it
//! introduces the two endpoints to each other. From then on the server is
//! out of the message path.
//!
//! Per initiator the request moves `NoRequest -> RequestSent` and then to
//! one of:
//! - accepted: both endpoints hold each other as private peer and both have
//!   left the public room,
//! - superseded: a newer request from the same initiator replaced it,
//! - abandoned: initiator or target left the server.
//!
//! Pairing is all-or-nothing. The initiator is set up first and the accepter
//! second; if the accepter cannot be set up the initiator is torn down again.

use log::{error, info, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::SystemTime;
use uuid::Uuid;

use crate::error::ChatError;
use crate::registry::{ClientEntry, ClientRegistry};
use crate::room::ChatRoom;

/// An unresolved private chat request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingHandshake {
    pub id: Uuid,
    pub initiator: String,
    pub target: String,
    pub requested_at: SystemTime,
}

impl PendingHandshake {
    pub fn new(initiator: &str, target: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            initiator: initiator.to_string(),
            target: target.to_string(),
            requested_at: SystemTime::now(),
        }
    }
}

/// Two clients that now talk directly
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivatePair {
    pub initiator: String,
    pub accepter: String,
}

#[derive(Debug, Default)]
pub struct HandshakeCoordinator {
    /// Keyed by initiator
    pending: Mutex<HashMap<String, PendingHandshake>>,
}

impl HandshakeCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request from `initiator` to `target` and invite the target.
    ///
    /// A newer request from the same initiator replaces any unresolved one.
    pub async fn request_private(
        &self,
        registry: &ClientRegistry,
        initiator: &str,
        target: &str,
    ) -> Result<String, ChatError> {
        if initiator == target {
            return Err(ChatError::SelfTarget);
        }
        if !registry.contains(initiator) {
            return Err(ChatError::NotRegistered(initiator.to_string()));
        }
        let target_entry = registry
            .lookup(target)
            .ok_or_else(|| ChatError::TargetOffline(target.to_string()))?;

        let request = PendingHandshake::new(initiator, target);
        let previous = self
            .pending
            .lock()
            .insert(initiator.to_string(), request.clone());
        if let Some(previous) = previous {
            info!(
                "Private request {} -> {} superseded by request to {}",
                initiator,
                previous.target,
                target
            );
        }

        let invitation = format!(
            "{} wants to start a private chat with you. To accept type: `accept '{}'`",
            initiator, initiator
        );
        if let Err(e) = target_entry.handle.incoming_message(&invitation).await {
            self.withdraw(&request);
            return Err(ChatError::unreachable(target, e));
        }

        info!("Private request {} -> {} sent", initiator, target);
        Ok(format!("Private chat request sent to {}", target))
    }

    /// Resolve the request `initiator` sent to `accepter` and pair the two.
    ///
    /// Any failure after the request is consumed is also reported to the
    /// initiator.
    pub async fn accept_private(
        &self,
        registry: &ClientRegistry,
        room: &ChatRoom,
        accepter: &str,
        initiator: &str,
    ) -> Result<PrivatePair, ChatError> {
        let request = self.take(accepter, initiator)?;

        let result = self.pair(registry, room, &request).await;
        match &result {
            Ok(_) => {
                info!("Private chat established: {} <-> {}", initiator, accepter);
                notify(
                    registry,
                    initiator,
                    &format!("{} accepted your private chat request", accepter),
                )
                .await;
            }
            Err(e) => {
                warn!("Private chat {} <-> {} failed: {}", initiator, accepter, e);
                notify(registry, initiator, &e.to_string()).await;
            }
        }
        result
    }

    /// Remove and return the request `initiator` sent to `accepter`.
    pub fn take(&self, accepter: &str, initiator: &str) -> Result<PendingHandshake, ChatError> {
        let mut pending = self.pending.lock();
        match pending.remove(initiator) {
            Some(request) if request.target == accepter => Ok(request),
            Some(request) => {
                let expected = request.target.clone();
                pending.insert(initiator.to_string(), request);
                Err(ChatError::Mismatch {
                    initiator: initiator.to_string(),
                    expected,
                })
            }
            None => Err(ChatError::NoSuchRequest(initiator.to_string())),
        }
    }

    /// Drop every request `username` sent or received.
    pub fn discard_involving(&self, username: &str) -> usize {
        let mut pending = self.pending.lock();
        let before = pending.len();
        pending.retain(|_, r| r.initiator != username && r.target != username);
        let discarded = before - pending.len();
        if discarded > 0 {
            info!("Discarded {} private request(s) involving {}", discarded, username);
        }
        discarded
    }

    pub fn pending_for(&self, initiator: &str) -> Option<PendingHandshake> {
        self.pending.lock().get(initiator).cloned()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    fn withdraw(&self, request: &PendingHandshake) {
        let mut pending = self.pending.lock();
        if pending.get(&request.initiator).map(|r| r.id) == Some(request.id) {
            pending.remove(&request.initiator);
        }
    }

    async fn pair(
        &self,
        registry: &ClientRegistry,
        room: &ChatRoom,
        request: &PendingHandshake,
    ) -> Result<PrivatePair, ChatError> {
        let initiator = registry
            .lookup(&request.initiator)
            .ok_or_else(|| ChatError::TargetOffline(request.initiator.clone()))?;
        let accepter = registry
            .lookup(&request.target)
            .ok_or_else(|| ChatError::NotRegistered(request.target.clone()))?;

        // Busy accepter: fail before the initiator is touched
        match accepter.handle.in_private_room().await {
            Ok(false) => {}
            Ok(true) => return Err(failed(request)),
            Err(e) => return Err(ChatError::unreachable(&accepter.username, e)),
        }

        match initiator
            .handle
            .setup_connection(&accepter.username, &accepter.address)
            .await
        {
            Ok(true) => {}
            Ok(false) => return Err(failed(request)),
            Err(e) => {
                // The setup may have been applied before the reply was lost
                rollback(&initiator, &accepter.username).await?;
                return Err(ChatError::unreachable(&initiator.username, e));
            }
        }

        let second = accepter
            .handle
            .setup_connection(&initiator.username, &initiator.address)
            .await;
        let (error, accepter_rollback) = match second {
            Ok(true) => {
                room.leave(&initiator.username);
                room.leave(&accepter.username);
                return Ok(PrivatePair {
                    initiator: initiator.username,
                    accepter: accepter.username,
                });
            }
            Ok(false) => (failed(request), Ok(())),
            Err(e) => (
                ChatError::unreachable(&accepter.username, e),
                rollback(&accepter, &initiator.username).await,
            ),
        };

        let initiator_rollback = rollback(&initiator, &accepter.username).await;
        accepter_rollback.and(initiator_rollback)?;
        Err(error)
    }
}

fn failed(request: &PendingHandshake) -> ChatError {
    ChatError::HandshakeFailed {
        initiator: request.initiator.clone(),
        accepter: request.target.clone(),
    }
}

/// Undo a setup on `entry`, but only if it is paired with `peer`.
async fn rollback(entry: &ClientEntry, peer: &str) -> Result<(), ChatError> {
    entry
        .handle
        .leave_private(false, Some(peer))
        .await
        .map_err(|e| {
            error!("Rollback of private session on {} failed: {}", entry.username, e);
            ChatError::HandshakeRollbackFailed {
                username: entry.username.clone(),
            }
        })
}

async fn notify(registry: &ClientRegistry, username: &str, text: &str) {
    if let Some(entry) = registry.lookup(username) {
        if let Err(e) = entry.handle.incoming_message(text).await {
            warn!("Could not notify {}: {}", username, e);
        }
    }
}
