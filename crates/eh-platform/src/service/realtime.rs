//! Live connection fan-out
//!
//! Rooms are opaque string keys. A connection may join any number of
//! rooms and several connections may share one. Delivery is at-most-once:
//! frames for a room nobody has joined are dropped, and a connection whose
//! receiver is gone is pruned on the next publish.
//!
//! Room keys in use:
//! - `{userId}`: personal notifications
//! - `event-{eventId}`: chat and typing indicators

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::Result;

pub type ConnectionId = u64;

pub const NEW_NOTIFICATION: &str = "newNotification";
pub const NEW_MESSAGE: &str = "newMessage";
pub const USER_TYPING: &str = "userTyping";
pub const USER_STOPPED_TYPING: &str = "userStoppedTyping";

pub fn user_room(user_id: &str) -> String {
    user_id.to_string()
}

pub fn event_room(event_id: &str) -> String {
    format!("event-{}", event_id)
}

/// Frame delivered to a connection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerFrame {
    pub event: String,
    pub payload: Value,
}

/// Publishing side of the fan-out, as seen by the services
pub trait RoomPublisher: Send + Sync {
    /// Deliver to every connection in `room`; returns how many received it
    fn publish(&self, room: &str, event: &str, payload: Value) -> Result<usize>;
}

#[derive(Default)]
pub struct RealtimeHub {
    next_id: AtomicU64,
    connections: DashMap<ConnectionId, mpsc::UnboundedSender<ServerFrame>>,
    rooms: DashMap<String, HashSet<ConnectionId>>,
}

impl RealtimeHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and return its outbound frame receiver
    pub fn connect(&self) -> (ConnectionId, mpsc::UnboundedReceiver<ServerFrame>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.insert(id, tx);
        debug!(connection = id, "Realtime connection opened");
        (id, rx)
    }

    /// Drop a connection and its room memberships
    pub fn disconnect(&self, conn: ConnectionId) {
        self.connections.remove(&conn);
        self.rooms.retain(|_, members| {
            members.remove(&conn);
            !members.is_empty()
        });
        debug!(connection = conn, "Realtime connection closed");
    }

    pub fn join(&self, conn: ConnectionId, room: &str) {
        self.rooms.entry(room.to_string()).or_default().insert(conn);
    }

    pub fn leave(&self, conn: ConnectionId, room: &str) {
        let now_empty = match self.rooms.get_mut(room) {
            Some(mut members) => {
                members.remove(&conn);
                members.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.rooms.remove_if(room, |_, members| members.is_empty());
        }
    }

    pub fn room_size(&self, room: &str) -> usize {
        self.rooms.get(room).map_or(0, |m| m.len())
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Publish to a room, skipping one connection (typing indicators)
    pub fn publish_except(
        &self,
        room: &str,
        except: Option<ConnectionId>,
        event: &str,
        payload: Value,
    ) -> usize {
        let members: Vec<ConnectionId> = match self.rooms.get(room) {
            Some(members) => members.iter().copied().filter(|c| Some(*c) != except).collect(),
            None => return 0,
        };

        let frame = ServerFrame {
            event: event.to_string(),
            payload,
        };

        let mut delivered = 0;
        let mut dead = Vec::new();
        for conn in members {
            match self.connections.get(&conn) {
                Some(tx) => {
                    if tx.send(frame.clone()).is_ok() {
                        delivered += 1;
                    } else {
                        dead.push(conn);
                    }
                }
                None => dead.push(conn),
            }
        }

        for conn in dead {
            self.disconnect(conn);
        }
        delivered
    }
}

impl RoomPublisher for RealtimeHub {
    fn publish(&self, room: &str, event: &str, payload: Value) -> Result<usize> {
        Ok(self.publish_except(room, None, event, payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_room_names() {
        assert_eq!(user_room("U1"), "U1");
        assert_eq!(event_room("E1"), "event-E1");
    }

    #[tokio::test]
    async fn test_publish_reaches_all_members() {
        let hub = RealtimeHub::new();
        let (a, mut rx_a) = hub.connect();
        let (b, mut rx_b) = hub.connect();
        hub.join(a, "u1");
        hub.join(b, "u1");

        let delivered = hub.publish("u1", NEW_NOTIFICATION, json!({"id": "n1"})).unwrap();
        assert_eq!(delivered, 2);
        assert_eq!(rx_a.recv().await.unwrap().event, NEW_NOTIFICATION);
        assert_eq!(rx_b.recv().await.unwrap().payload["id"], "n1");
    }

    #[test]
    fn test_publish_to_empty_room_is_noop() {
        let hub = RealtimeHub::new();
        assert_eq!(hub.publish("nobody", NEW_MESSAGE, json!({})).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_publish_except_skips_sender() {
        let hub = RealtimeHub::new();
        let (a, mut rx_a) = hub.connect();
        let (b, mut rx_b) = hub.connect();
        let room = event_room("e1");
        hub.join(a, &room);
        hub.join(b, &room);

        assert_eq!(hub.publish_except(&room, Some(a), USER_TYPING, json!({})), 1);
        assert!(rx_b.recv().await.is_some());
        assert!(rx_a.try_recv().is_err());
    }

    #[test]
    fn test_leave_and_disconnect() {
        let hub = RealtimeHub::new();
        let (a, _rx_a) = hub.connect();
        hub.join(a, "r1");
        hub.join(a, "r2");
        hub.leave(a, "r1");
        assert_eq!(hub.room_size("r1"), 0);
        assert_eq!(hub.room_size("r2"), 1);

        hub.disconnect(a);
        assert_eq!(hub.room_size("r2"), 0);
        assert_eq!(hub.connection_count(), 0);
    }

    #[test]
    fn test_dropped_receiver_is_pruned() {
        let hub = RealtimeHub::new();
        let (a, rx_a) = hub.connect();
        hub.join(a, "r");
        drop(rx_a);

        assert_eq!(hub.publish("r", NEW_MESSAGE, json!({})).unwrap(), 0);
        assert_eq!(hub.connection_count(), 0);
    }
}
