//! Public Room
//!
//! Membership of the single shared room and fan-out of messages to members.

use log::{debug, error, info, warn};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinSet;

use crate::callback::{CallError, ClientHandle};
use crate::error::ChatError;
use crate::registry::ClientRegistry;

/// Name clients use to address the shared room
pub const PUBLIC_ROOM: &str = "Public";

/// Outcome of a broadcast, per recipient
#[derive(Debug, Default)]
pub struct DeliveryReport {
    pub delivered: Vec<String>,
    pub failed: Vec<(String, CallError)>,
}

impl DeliveryReport {
    pub fn recipients(&self) -> usize {
        self.delivered.len() + self.failed.len()
    }
}

/// Format of a line as seen by recipients
pub fn format_line(sender: &str, message: &str) -> String {
    format!("{}: {}", sender, message)
}

#[derive(Debug)]
pub struct ChatRoom {
    pub name: String,
    members: RwLock<HashSet<String>>,
}

impl ChatRoom {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: RwLock::new(HashSet::new()),
        }
    }

    pub fn public() -> Self {
        Self::new(PUBLIC_ROOM)
    }

    pub fn join(&self, username: &str) -> Result<(), ChatError> {
        if !self.members.write().insert(username.to_string()) {
            return Err(ChatError::AlreadyMember(username.to_string()));
        }
        info!("{} joined the {} room", username, self.name);
        Ok(())
    }

    /// Returns `false` if the user was not a member.
    pub fn leave(&self, username: &str) -> bool {
        let removed = self.members.write().remove(username);
        if removed {
            info!("{} left the {} room", username, self.name);
        }
        removed
    }

    pub fn contains(&self, username: &str) -> bool {
        self.members.read().contains(username)
    }

    /// Sorted snapshot of members
    pub fn members(&self) -> Vec<String> {
        let mut members: Vec<String> = self.members.read().iter().cloned().collect();
        members.sort();
        members
    }

    pub fn member_count(&self) -> usize {
        self.members.read().len()
    }

    /// Deliver `"<sender>: <message>"` to every other member.
    ///
    /// Recipients are resolved under the locks, calls are made after they
    /// are released. A failed delivery is recorded and skipped.
    pub async fn broadcast(
        &self,
        registry: &ClientRegistry,
        sender: &str,
        message: &str,
    ) -> Result<DeliveryReport, ChatError> {
        let recipients: Vec<(String, Arc<dyn ClientHandle>)> = {
            let members = self.members.read();
            if !members.contains(sender) {
                return Err(ChatError::NotAMember);
            }
            members
                .iter()
                .filter(|name| name.as_str() != sender)
                .filter_map(|name| registry.lookup(name).map(|e| (e.username, e.handle)))
                .collect()
        };

        let line = Arc::new(format_line(sender, message));
        let mut deliveries = JoinSet::new();
        for (username, handle) in recipients {
            let line = line.clone();
            deliveries.spawn(async move {
                let result = handle.incoming_message(&line).await;
                (username, result)
            });
        }

        let mut report = DeliveryReport::default();
        while let Some(joined) = deliveries.join_next().await {
            match joined {
                Ok((username, Ok(()))) => report.delivered.push(username),
                Ok((username, Err(e))) => {
                    warn!("Failed to deliver message to {}: {}", username, e);
                    report.failed.push((username, e));
                }
                Err(e) => error!("Delivery task failed: {}", e),
            }
        }

        debug!(
            "Broadcast from {} in {} reached {}/{} members",
            sender,
            self.name,
            report.delivered.len(),
            report.recipients()
        );
        Ok(report)
    }
}

impl Default for ChatRoom {
    fn default() -> Self {
        Self::public()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockConnector;

    #[test]
    fn test_join_twice_is_rejected() {
        let room = ChatRoom::public();
        room.join("alice").unwrap();

        let result = room.join("alice");
        assert_eq!(
            result.unwrap_err(),
            ChatError::AlreadyMember("alice".to_string())
        );
        assert_eq!(room.member_count(), 1);
    }

    #[test]
    fn test_leave() {
        let room = ChatRoom::public();
        room.join("alice").unwrap();

        assert!(room.leave("alice"));
        assert!(!room.leave("alice"));
        assert!(!room.contains("alice"));
    }

    #[tokio::test]
    async fn test_broadcast_skips_sender() {
        let connector = Arc::new(MockConnector::new());
        let registry = ClientRegistry::new(connector.clone());
        let (a, alice) = connector.add(11000);
        let (b, bob) = connector.add(11001);
        registry.register("alice", a).await.unwrap();
        registry.register("bob", b).await.unwrap();

        let room = ChatRoom::public();
        room.join("alice").unwrap();
        room.join("bob").unwrap();

        let report = room.broadcast(&registry, "alice", "hi").await.unwrap();
        assert_eq!(report.delivered, vec!["bob".to_string()]);
        assert_eq!(bob.received(), vec!["alice: hi".to_string()]);
        assert!(alice.received().is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_from_non_member_fails() {
        let connector = Arc::new(MockConnector::new());
        let registry = ClientRegistry::new(connector.clone());
        let (b, bob) = connector.add(11001);
        registry.register("bob", b).await.unwrap();

        let room = ChatRoom::public();
        room.join("bob").unwrap();

        let result = room.broadcast(&registry, "alice", "hi").await;
        assert_eq!(result.unwrap_err(), ChatError::NotAMember);
        assert!(bob.received().is_empty());
        assert_eq!(room.members(), vec!["bob".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_recipient_does_not_block_others() {
        let connector = Arc::new(MockConnector::new());
        let registry = ClientRegistry::new(connector.clone());
        let (a, _) = connector.add(11000);
        let (b, bob) = connector.add(11001);
        let (c, carol) = connector.add(11002);
        registry.register("alice", a).await.unwrap();
        registry.register("bob", b).await.unwrap();
        registry.register("carol", c).await.unwrap();
        bob.kill();

        let room = ChatRoom::public();
        for name in ["alice", "bob", "carol"] {
            room.join(name).unwrap();
        }

        let report = room.broadcast(&registry, "alice", "hello").await.unwrap();
        assert_eq!(report.delivered, vec!["carol".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "bob");
        assert_eq!(carol.received(), vec!["alice: hello".to_string()]);
    }

    #[tokio::test]
    async fn test_timed_out_recipient_is_reported() {
        let connector = Arc::new(MockConnector::new());
        let registry = ClientRegistry::new(connector.clone());
        let (a, _) = connector.add(11000);
        let (b, bob) = connector.add(11001);
        let (c, carol) = connector.add(11002);
        registry.register("alice", a).await.unwrap();
        registry.register("bob", b).await.unwrap();
        registry.register("carol", c).await.unwrap();
        bob.drop_messages();

        let room = ChatRoom::public();
        for name in ["alice", "bob", "carol"] {
            room.join(name).unwrap();
        }

        let report = room.broadcast(&registry, "alice", "still there?").await.unwrap();
        assert_eq!(
            report.failed,
            vec![("bob".to_string(), CallError::Timeout)]
        );
        assert_eq!(carol.received(), vec!["alice: still there?".to_string()]);
        assert!(bob.received().is_empty());
        // A slow recipient stays a member
        assert!(room.contains("bob"));
    }
}
