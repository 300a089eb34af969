//! In-process registry of live channel connections and their room
//! memberships.
//!
//! Rooms are logical fan-out groups (`user:{id}`, `folder:{id}`,
//! `app:{identifier}`, `task:{identifier}:{task}`). A connection registers a
//! sender handle at admission, joins its rooms, and is removed from all of
//! them in one call when the socket drops.

use std::collections::{HashMap, HashSet};

use axum::extract::ws::Message;
use tokio::sync::{mpsc, RwLock};

#[derive(Default)]
struct Registrations {
    senders: HashMap<String, mpsc::UnboundedSender<Message>>,
    /// room -> connection ids
    rooms: HashMap<String, HashSet<String>>,
    /// connection id -> rooms joined
    joined: HashMap<String, HashSet<String>>,
}

#[derive(Default)]
pub struct RoomRegistry {
    inner: RwLock<Registrations>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, conn_id: &str, sender: mpsc::UnboundedSender<Message>) {
        let mut inner = self.inner.write().await;
        inner.senders.insert(conn_id.to_string(), sender);
        inner.joined.entry(conn_id.to_string()).or_default();
    }

    pub async fn join(&self, conn_id: &str, room: &str) {
        let mut inner = self.inner.write().await;
        inner
            .rooms
            .entry(room.to_string())
            .or_default()
            .insert(conn_id.to_string());
        inner
            .joined
            .entry(conn_id.to_string())
            .or_default()
            .insert(room.to_string());
    }

    /// Drops the connection's sender and leaves every room it joined.
    pub async fn remove(&self, conn_id: &str) {
        let mut inner = self.inner.write().await;
        inner.senders.remove(conn_id);
        if let Some(rooms) = inner.joined.remove(conn_id) {
            for room in rooms {
                if let Some(members) = inner.rooms.get_mut(&room) {
                    members.remove(conn_id);
                    if members.is_empty() {
                        inner.rooms.remove(&room);
                    }
                }
            }
        }
    }

    /// Sends a message to every connection in the room, returning how many
    /// sends were attempted. Connections whose channel has closed are
    /// skipped; their cleanup happens on their own disconnect path.
    pub async fn send_to_room(&self, room: &str, message: Message) -> usize {
        let inner = self.inner.read().await;
        let Some(members) = inner.rooms.get(room) else {
            return 0;
        };
        let mut delivered = 0;
        for conn_id in members {
            if let Some(sender) = inner.senders.get(conn_id) {
                if sender.send(message.clone()).is_ok() {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    pub async fn room_size(&self, room: &str) -> usize {
        self.inner
            .read()
            .await
            .rooms
            .get(room)
            .map_or(0, HashSet::len)
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.senders.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn remove_leaves_every_joined_room() {
        let registry = RoomRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        registry.register("conn-1", tx).await;
        registry.join("conn-1", "user:abc").await;
        registry.join("conn-1", "folder:f1").await;

        assert_eq!(registry.room_size("user:abc").await, 1);
        assert_eq!(registry.room_size("folder:f1").await, 1);

        registry.remove("conn-1").await;
        assert_eq!(registry.room_size("user:abc").await, 0);
        assert_eq!(registry.room_size("folder:f1").await, 0);
        assert_eq!(registry.connection_count().await, 0);
    }

    #[tokio::test]
    async fn send_to_room_reaches_all_members() {
        let registry = RoomRegistry::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        registry.register("a", tx1).await;
        registry.register("b", tx2).await;
        registry.join("a", "app:worker-pool").await;
        registry.join("b", "app:worker-pool").await;

        let delivered = registry
            .send_to_room("app:worker-pool", Message::Text("ping".into()))
            .await;
        assert_eq!(delivered, 2);
        assert!(rx1.recv().await.is_some());
        assert!(rx2.recv().await.is_some());
    }

    #[tokio::test]
    async fn send_skips_closed_connections() {
        let registry = RoomRegistry::new();
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        registry.register("gone", tx).await;
        registry.join("gone", "user:x").await;

        let delivered = registry
            .send_to_room("user:x", Message::Text("hello".into()))
            .await;
        assert_eq!(delivered, 0);
    }
}
