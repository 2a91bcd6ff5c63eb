//! Room broadcaster
//!
//! One room per game. A room is the set of live connections subscribed to that game, each
//! represented by the sending half of the connection's outbound queue. Emitting never awaits
//! a slow client: a full queue drops the message for that connection only.

use crate::protocol::ServerMessage;
use crate::types::{ConnectionId, GameId};
use std::collections::HashMap;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, RwLock};

/// Outbound queue of a single connection
pub type ClientSender = mpsc::Sender<ServerMessage>;

pub struct RoomBroadcaster {
    rooms: RwLock<HashMap<GameId, HashMap<ConnectionId, ClientSender>>>,
    shutdown: watch::Sender<bool>,
}

impl Default for RoomBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomBroadcaster {
    pub fn new() -> Self {
        let (shutdown, _rx) = watch::channel(false);
        Self {
            rooms: RwLock::new(HashMap::new()),
            shutdown,
        }
    }

    /// Add a connection to a game's room. Returns false if it was already subscribed.
    pub async fn subscribe(
        &self,
        game_id: &str,
        connection_id: &str,
        sender: ClientSender,
    ) -> bool {
        let mut rooms = self.rooms.write().await;
        let room = rooms.entry(game_id.to_string()).or_default();
        let added = room.insert(connection_id.to_string(), sender).is_none();
        tracing::debug!(
            game_id,
            connection_id,
            subscribers = room.len(),
            "Connection subscribed to room"
        );
        added
    }

    pub async fn unsubscribe(&self, game_id: &str, connection_id: &str) {
        let mut rooms = self.rooms.write().await;
        if let Some(room) = rooms.get_mut(game_id) {
            room.remove(connection_id);
            if room.is_empty() {
                rooms.remove(game_id);
            }
        }
    }

    /// Drop a connection from every room it joined. Returns how many rooms it left.
    pub async fn leave_all(&self, connection_id: &str) -> usize {
        let mut rooms = self.rooms.write().await;
        let mut left = 0;
        rooms.retain(|_, room| {
            if room.remove(connection_id).is_some() {
                left += 1;
            }
            !room.is_empty()
        });
        left
    }

    pub async fn subscriber_count(&self, game_id: &str) -> usize {
        self.rooms
            .read()
            .await
            .get(game_id)
            .map(HashMap::len)
            .unwrap_or(0)
    }

    /// Deliver one message to every subscriber of the room.
    /// Returns the number of connections the message was queued for.
    pub async fn emit(&self, game_id: &str, msg: ServerMessage) -> usize {
        let mut delivered = 0;
        let mut closed = Vec::new();

        {
            let rooms = self.rooms.read().await;
            let Some(room) = rooms.get(game_id) else {
                return 0;
            };

            for (connection_id, sender) in room {
                match sender.try_send(msg.clone()) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        tracing::warn!(
                            game_id,
                            connection_id = %connection_id,
                            "Outbound queue full, dropping message"
                        );
                    }
                    Err(TrySendError::Closed(_)) => closed.push(connection_id.clone()),
                }
            }
        }

        if !closed.is_empty() {
            tracing::debug!(game_id, count = closed.len(), "Pruning closed connections");
            for connection_id in closed {
                self.unsubscribe(game_id, &connection_id).await;
            }
        }

        delivered
    }

    /// Watch that flips to true once the server starts shutting down
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Tell every connection to close and forget all rooms
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        let mut rooms = self.rooms.write().await;
        let connections: usize = rooms.values().map(HashMap::len).sum();
        rooms.clear();
        tracing::info!(connections, "Room broadcaster shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(game_id: &str) -> ServerMessage {
        ServerMessage::GameCompleted {
            game_id: game_id.to_string(),
            timestamp: "now".to_string(),
        }
    }

    #[tokio::test]
    async fn test_emit_reaches_every_subscriber() {
        let rooms = RoomBroadcaster::new();
        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        rooms.subscribe("g1", "c1", tx1).await;
        rooms.subscribe("g1", "c2", tx2).await;

        assert_eq!(rooms.emit("g1", completed("g1")).await, 2);
        assert_eq!(rx1.recv().await, Some(completed("g1")));
        assert_eq!(rx2.recv().await, Some(completed("g1")));
    }

    #[tokio::test]
    async fn test_emit_is_scoped_to_room() {
        let rooms = RoomBroadcaster::new();
        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        rooms.subscribe("g1", "c1", tx1).await;
        rooms.subscribe("g2", "c2", tx2).await;

        rooms.emit("g1", completed("g1")).await;
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_subscribe_twice_keeps_one_entry() {
        let rooms = RoomBroadcaster::new();
        let (tx, _rx) = mpsc::channel(8);
        assert!(rooms.subscribe("g1", "c1", tx.clone()).await);
        assert!(!rooms.subscribe("g1", "c1", tx).await);
        assert_eq!(rooms.subscriber_count("g1").await, 1);
    }

    #[tokio::test]
    async fn test_closed_connections_are_pruned() {
        let rooms = RoomBroadcaster::new();
        let (tx1, rx1) = mpsc::channel(8);
        let (tx2, _rx2) = mpsc::channel(8);
        rooms.subscribe("g1", "c1", tx1).await;
        rooms.subscribe("g1", "c2", tx2).await;
        drop(rx1);

        assert_eq!(rooms.emit("g1", completed("g1")).await, 1);
        assert_eq!(rooms.subscriber_count("g1").await, 1);
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let rooms = RoomBroadcaster::new();
        let (tx, mut rx) = mpsc::channel(1);
        rooms.subscribe("g1", "c1", tx).await;

        assert_eq!(rooms.emit("g1", completed("g1")).await, 1);
        assert_eq!(rooms.emit("g1", completed("g1")).await, 0);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
        // Still subscribed; only the message was lost
        assert_eq!(rooms.subscriber_count("g1").await, 1);
    }

    #[tokio::test]
    async fn test_leave_all() {
        let rooms = RoomBroadcaster::new();
        let (tx, _rx) = mpsc::channel(8);
        rooms.subscribe("g1", "c1", tx.clone()).await;
        rooms.subscribe("g2", "c1", tx).await;

        assert_eq!(rooms.leave_all("c1").await, 2);
        assert_eq!(rooms.subscriber_count("g1").await, 0);
        assert_eq!(rooms.emit("g2", completed("g2")).await, 0);
    }

    #[tokio::test]
    async fn test_shutdown_signals_connections() {
        let rooms = RoomBroadcaster::new();
        let mut signal = rooms.shutdown_signal();
        let (tx, _rx) = mpsc::channel(8);
        rooms.subscribe("g1", "c1", tx).await;

        rooms.shutdown().await;
        signal.changed().await.unwrap();
        assert!(*signal.borrow());
        assert_eq!(rooms.subscriber_count("g1").await, 0);
    }
}
