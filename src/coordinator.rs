//! Chat Coordinator
//!
//! Facade over the registry, the public room and the handshake protocol.
//! Each inbound call is an independent invocation; state is guarded per
//! structure and no lock is held while calling out to a client.

use log::{debug, info, warn};
use std::sync::Arc;

use crate::callback::{CallbackAddress, Connector};
use crate::error::ChatError;
use crate::handshake::{HandshakeCoordinator, PrivatePair};
use crate::registry::{ClientEntry, ClientRegistry};
use crate::room::{format_line, ChatRoom, PUBLIC_ROOM};

pub struct ChatCoordinator {
    registry: ClientRegistry,
    room: ChatRoom,
    handshakes: HandshakeCoordinator,
}

impl ChatCoordinator {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            registry: ClientRegistry::new(connector),
            room: ChatRoom::public(),
            handshakes: HandshakeCoordinator::new(),
        }
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    pub fn room(&self) -> &ChatRoom {
        &self.room
    }

    pub fn handshakes(&self) -> &HandshakeCoordinator {
        &self.handshakes
    }

    pub async fn register(
        &self,
        username: &str,
        address: CallbackAddress,
    ) -> Result<(), ChatError> {
        self.registry.register(username, address).await.map(|_| ())
    }

    pub fn get_client_list(&self) -> Vec<String> {
        self.registry.list_usernames()
    }

    /// Join the public room, or request a private chat when `room_name`
    /// names another client.
    pub async fn join(&self, username: &str, room_name: &str) -> Result<String, ChatError> {
        if !self.registry.contains(username) {
            return Err(ChatError::NotRegistered(username.to_string()));
        }

        if room_name != PUBLIC_ROOM {
            return self
                .handshakes
                .request_private(&self.registry, username, room_name)
                .await;
        }

        self.room.join(username)?;
        // Lost a race with eviction
        if !self.registry.contains(username) {
            self.room.leave(username);
            return Err(ChatError::NotRegistered(username.to_string()));
        }
        Ok(format!("{} has joined the {} chat room", username, PUBLIC_ROOM))
    }

    pub fn leave(&self, username: &str) -> Result<(), ChatError> {
        if self.room.leave(username) {
            Ok(())
        } else {
            Err(ChatError::NotAMember)
        }
    }

    /// Broadcast to the public room. Returns the line as recipients see it.
    pub async fn send_message(&self, username: &str, message: &str) -> Result<String, ChatError> {
        let report = self.room.broadcast(&self.registry, username, message).await?;
        if !report.failed.is_empty() {
            info!(
                "Message from {} missed {} recipient(s)",
                username,
                report.failed.len()
            );
        }
        debug!("{}: {}", username, message);
        Ok(format_line(username, message))
    }

    pub async fn accept_private(
        &self,
        accepter: &str,
        initiator: &str,
    ) -> Result<PrivatePair, ChatError> {
        self.handshakes
            .accept_private(&self.registry, &self.room, accepter, initiator)
            .await
    }

    /// Leave the room and unregister. Returns whether the user was registered.
    pub fn exit(&self, username: &str) -> bool {
        self.room.leave(username);
        self.handshakes.discard_involving(username);
        let removed = self.registry.unregister(username).is_some();
        if removed {
            info!("{} has exited the server", username);
        }
        removed
    }

    /// Exit on behalf of a client that stopped answering.
    ///
    /// Only removes the exact registration that was probed.
    pub fn evict(&self, entry: &ClientEntry) -> bool {
        let current = self.registry.lookup(&entry.username).map(|e| e.id);
        if current != Some(entry.id) {
            return false;
        }
        // The entry still holds the name, so no newer session exists yet
        self.room.leave(&entry.username);
        self.handshakes.discard_involving(&entry.username);
        if self
            .registry
            .unregister_entry(&entry.username, entry.id)
            .is_none()
        {
            return false;
        }
        warn!("Evicted unreachable client {} ({})", entry.username, entry.address);
        true
    }

    pub fn is_alive(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockClient, MockConnector};

    async fn coordinator_with(
        names: &[&str],
    ) -> (Arc<MockConnector>, ChatCoordinator, Vec<Arc<MockClient>>) {
        let connector = Arc::new(MockConnector::new());
        let coordinator = ChatCoordinator::new(connector.clone());
        let mut clients = Vec::new();
        for (i, name) in names.iter().enumerate() {
            let (addr, client) = connector.add(11000 + i as u16);
            coordinator.register(name, addr).await.unwrap();
            clients.push(client);
        }
        (connector, coordinator, clients)
    }

    #[tokio::test]
    async fn test_public_chat_scenario() {
        let (_, chat, clients) = coordinator_with(&["alice", "bob"]).await;
        chat.join("alice", "Public").await.unwrap();
        chat.join("bob", "Public").await.unwrap();

        let echo = chat.send_message("alice", "hi").await.unwrap();

        assert_eq!(echo, "alice: hi");
        assert_eq!(clients[1].received(), vec!["alice: hi".to_string()]);
        assert!(clients[0].received().is_empty());
        assert_eq!(chat.room().member_count(), 2);
    }

    #[tokio::test]
    async fn test_second_public_join_reports_already_member() {
        let (_, chat, _) = coordinator_with(&["alice"]).await;
        chat.join("alice", "Public").await.unwrap();

        let again = chat.join("alice", "Public").await;
        assert_eq!(
            again.unwrap_err(),
            ChatError::AlreadyMember("alice".to_string())
        );
        assert_eq!(chat.room().member_count(), 1);
    }

    #[tokio::test]
    async fn test_member_required_to_send() {
        let (_, chat, clients) = coordinator_with(&["alice", "bob"]).await;
        chat.join("bob", "Public").await.unwrap();

        let result = chat.send_message("alice", "hi").await;

        assert_eq!(result.unwrap_err(), ChatError::NotAMember);
        assert!(clients[1].received().is_empty());
        assert_eq!(chat.room().members(), vec!["bob".to_string()]);
    }

    #[tokio::test]
    async fn test_member_can_send_when_alone() {
        let (_, chat, _) = coordinator_with(&["alice"]).await;
        chat.join("alice", "Public").await.unwrap();
        assert_eq!(chat.send_message("alice", "echo").await.unwrap(), "alice: echo");
    }

    #[tokio::test]
    async fn test_join_unknown_name_is_offline_target() {
        let (_, chat, _) = coordinator_with(&["alice"]).await;
        let result = chat.join("alice", "Lobby").await;
        assert_eq!(
            result.unwrap_err(),
            ChatError::TargetOffline("Lobby".to_string())
        );
    }

    #[tokio::test]
    async fn test_join_requires_registration() {
        let (_, chat, _) = coordinator_with(&[]).await;
        let result = chat.join("alice", "Public").await;
        assert_eq!(
            result.unwrap_err(),
            ChatError::NotRegistered("alice".to_string())
        );
        assert_eq!(chat.room().member_count(), 0);
    }

    #[tokio::test]
    async fn test_private_pair_cannot_send_publicly() {
        let (_, chat, _) = coordinator_with(&["alice", "bob"]).await;
        chat.join("alice", "Public").await.unwrap();
        chat.join("bob", "Public").await.unwrap();

        chat.join("alice", "bob").await.unwrap();
        chat.accept_private("bob", "alice").await.unwrap();

        for name in ["alice", "bob"] {
            assert_eq!(
                chat.send_message(name, "hi").await.unwrap_err(),
                ChatError::NotAMember
            );
        }
    }

    #[tokio::test]
    async fn test_leave_requires_membership() {
        let (_, chat, _) = coordinator_with(&["alice"]).await;
        assert_eq!(chat.leave("alice").unwrap_err(), ChatError::NotAMember);
        chat.join("alice", "Public").await.unwrap();
        assert!(chat.leave("alice").is_ok());
    }

    #[tokio::test]
    async fn test_exit_removes_everywhere() {
        let (_, chat, _) = coordinator_with(&["alice", "bob"]).await;
        chat.join("alice", "Public").await.unwrap();
        chat.join("alice", "bob").await.unwrap();

        assert!(chat.exit("alice"));
        assert!(!chat.exit("alice"));
        assert_eq!(chat.get_client_list(), vec!["bob".to_string()]);
        assert!(!chat.room().contains("alice"));
        assert_eq!(chat.handshakes().pending_count(), 0);
    }

    #[tokio::test]
    async fn test_evict_skips_newer_registration() {
        let (connector, chat, _) = coordinator_with(&["alice", "bob"]).await;
        let stale = chat.registry().lookup("alice").unwrap();
        chat.exit("alice");
        let (addr, _) = connector.add(13000);
        chat.register("alice", addr).await.unwrap();
        chat.join("alice", "Public").await.unwrap();
        chat.join("alice", "bob").await.unwrap();

        assert!(!chat.evict(&stale));
        assert_eq!(
            chat.get_client_list(),
            vec!["alice".to_string(), "bob".to_string()]
        );
        assert!(chat.room().contains("alice"));
        assert_eq!(chat.handshakes().pending_count(), 1);
    }

    #[tokio::test]
    async fn test_evict_removes_probed_session() {
        let (_, chat, _) = coordinator_with(&["alice", "bob"]).await;
        chat.join("alice", "Public").await.unwrap();
        chat.join("bob", "alice").await.unwrap();
        let entry = chat.registry().lookup("alice").unwrap();

        assert!(chat.evict(&entry));
        assert!(!chat.evict(&entry));
        assert_eq!(chat.get_client_list(), vec!["bob".to_string()]);
        assert!(!chat.room().contains("alice"));
        assert_eq!(chat.handshakes().pending_count(), 0);
    }
}
