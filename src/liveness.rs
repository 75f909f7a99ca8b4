//! Liveness Monitor
//!
//! Periodically probes every registered client and evicts the ones that do
//! not answer, exactly as if they had called `exit`.

use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

use crate::coordinator::ChatCoordinator;

const MIN_INTERVAL: Duration = Duration::from_millis(10);

pub struct LivenessMonitor {
    coordinator: Arc<ChatCoordinator>,
    interval: Duration,
}

impl LivenessMonitor {
    pub fn new(coordinator: Arc<ChatCoordinator>, interval: Duration) -> Self {
        Self {
            coordinator,
            interval: interval.max(MIN_INTERVAL),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Probe a snapshot of the registry and evict every client whose probe
    /// failed. Returns the evicted usernames.
    ///
    /// Probes run concurrently; each is bounded by the transport's own call
    /// timeout, so one slow client delays only its own result.
    pub async fn tick(&self) -> Vec<String> {
        let mut probes = JoinSet::new();
        for entry in self.coordinator.registry().entries() {
            probes.spawn(async move {
                let result = entry.handle.is_alive().await;
                (entry, result)
            });
        }

        let mut evicted = Vec::new();
        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((entry, Err(e))) => {
                    warn!("Liveness probe to {} failed: {}", entry.username, e);
                    if self.coordinator.evict(&entry) {
                        evicted.push(entry.username);
                    }
                }
                Err(e) => error!("Liveness probe task failed: {}", e),
            }
        }
        evicted.sort();
        evicted
    }

    /// Run [`tick`](Self::tick) every interval until the returned handle is
    /// shut down.
    pub fn spawn(self) -> MonitorHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;
            info!("Liveness monitor started ({:?} interval)", self.interval);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = self.tick().await;
                        if !evicted.is_empty() {
                            info!("Evicted {} client(s): {:?}", evicted.len(), evicted);
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("Liveness monitor stopped");
        });

        MonitorHandle {
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// Stops a spawned [`LivenessMonitor`]
pub struct MonitorHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!("Liveness monitor task failed: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockConnector;
    use std::sync::atomic::Ordering;

    async fn setup() -> (Arc<MockConnector>, Arc<ChatCoordinator>) {
        let connector = Arc::new(MockConnector::new());
        let chat = Arc::new(ChatCoordinator::new(connector.clone()));
        (connector, chat)
    }

    #[tokio::test]
    async fn test_tick_evicts_dead_client() {
        let (connector, chat) = setup().await;
        let (a, _) = connector.add(11000);
        let (b, bob) = connector.add(11001);
        chat.register("alice", a).await.unwrap();
        chat.register("bob", b).await.unwrap();
        chat.join("alice", "Public").await.unwrap();
        chat.join("bob", "Public").await.unwrap();
        bob.kill();

        let monitor = LivenessMonitor::new(chat.clone(), Duration::from_secs(1));
        let evicted = monitor.tick().await;

        assert_eq!(evicted, vec!["bob".to_string()]);
        assert_eq!(chat.get_client_list(), vec!["alice".to_string()]);
        assert!(!chat.room().contains("bob"));
        assert!(chat.room().contains("alice"));
    }

    #[tokio::test]
    async fn test_tick_probes_every_client_despite_failures() {
        let (connector, chat) = setup().await;
        let mut clients = Vec::new();
        for (i, name) in ["a", "b", "c", "d"].into_iter().enumerate() {
            let (addr, client) = connector.add(11000 + i as u16);
            chat.register(name, addr).await.unwrap();
            clients.push(client);
        }
        clients[0].kill();
        clients[2].kill();

        let monitor = LivenessMonitor::new(chat.clone(), Duration::from_secs(1));
        let evicted = monitor.tick().await;

        assert_eq!(evicted, vec!["a".to_string(), "c".to_string()]);
        for client in &clients {
            assert_eq!(client.probes.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn test_spawned_monitor_evicts_within_interval() {
        let (connector, chat) = setup().await;
        let (a, alice) = connector.add(11000);
        chat.register("alice", a).await.unwrap();

        let handle = LivenessMonitor::new(chat.clone(), Duration::from_millis(20)).spawn();
        alice.kill();

        let gone = tokio::time::timeout(Duration::from_secs(2), async {
            while !chat.registry().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(gone.is_ok());

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_task() {
        let (_, chat) = setup().await;
        let handle = LivenessMonitor::new(chat, Duration::from_millis(20)).spawn();
        assert!(!handle.is_finished());
        handle.shutdown().await;
    }
}
