//! In-process room registry.
//!
//! The hub tracks which connections are in which rooms and holds an outbound
//! queue per connection. Connection tasks register on accept, drain their
//! queue into the socket, and unregister on close.

use crate::traits::{ConnectionId, Delivery, RoomAdapter, TransportError};
use dashmap::{DashMap, DashSet};
use relay_protocol::Address;
use serde_json::Value;
use std::collections::HashSet;
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

/// Receiving end of a connection's outbound queue.
pub type DeliveryReceiver = mpsc::UnboundedReceiver<Delivery>;

/// Per-connection state held by the hub.
struct ConnectionEntry {
    sender: mpsc::UnboundedSender<Delivery>,
    rooms: HashSet<String>,
}

/// Room registry backed by concurrent maps.
#[derive(Default)]
pub struct Hub {
    /// Room name -> members. Rooms exist only while they have members.
    rooms: DashMap<String, DashSet<ConnectionId>>,
    /// Connection -> outbound queue and joined rooms.
    connections: DashMap<ConnectionId, ConnectionEntry>,
}

impl Hub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        info!("Creating room hub");
        Self::default()
    }

    /// Register a connection and return the receiver for its outbound queue.
    ///
    /// Registering an ID that is already known replaces its queue and keeps
    /// its memberships.
    pub fn register(&self, conn: &ConnectionId) -> DeliveryReceiver {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.connections
            .entry(conn.clone())
            .and_modify(|entry| entry.sender = sender.clone())
            .or_insert_with(|| ConnectionEntry {
                sender,
                rooms: HashSet::new(),
            });
        debug!(connection = %conn, "Connection registered");
        receiver
    }

    /// Drop a connection, removing it from every room.
    pub fn unregister(&self, conn: &ConnectionId) {
        if let Some((_, entry)) = self.connections.remove(conn) {
            for room in &entry.rooms {
                self.remove_member(room, conn);
            }
            debug!(connection = %conn, "Connection unregistered");
        }
    }

    /// Whether the connection is registered.
    #[must_use]
    pub fn is_connected(&self, conn: &ConnectionId) -> bool {
        self.connections.contains_key(conn)
    }

    /// Whether a room currently has members.
    #[must_use]
    pub fn room_exists(&self, room: &str) -> bool {
        self.rooms.contains_key(room)
    }

    /// Number of registered connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Number of non-empty rooms.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Get hub statistics.
    #[must_use]
    pub fn stats(&self) -> HubStats {
        HubStats {
            connection_count: self.connections.len(),
            room_count: self.rooms.len(),
            total_memberships: self.rooms.iter().map(|r| r.len()).sum(),
        }
    }

    fn remove_member(&self, room: &str, conn: &ConnectionId) {
        if let Some(members) = self.rooms.get(room) {
            members.remove(conn);
        }
        if self.rooms.remove_if(room, |_, members| members.is_empty()).is_some() {
            debug!(room = %room, "Deleted empty room");
        }
    }

    fn send(&self, conn: &ConnectionId, delivery: Delivery) -> Result<(), TransportError> {
        let entry = self
            .connections
            .get(conn)
            .ok_or_else(|| TransportError::UnknownConnection(conn.clone()))?;
        entry
            .sender
            .send(delivery)
            .map_err(|_| TransportError::ConnectionClosed(conn.clone()))
    }
}

impl RoomAdapter for Hub {
    fn join(&self, conn: &ConnectionId, room: &str) -> Result<(), TransportError> {
        let added = self
            .connections
            .get_mut(conn)
            .ok_or_else(|| TransportError::UnknownConnection(conn.clone()))?
            .rooms
            .insert(room.to_string());

        if added {
            self.rooms
                .entry(room.to_string())
                .or_default()
                .insert(conn.clone());
            debug!(connection = %conn, room = %room, "Joined room");
        }
        Ok(())
    }

    fn leave(&self, conn: &ConnectionId, room: &str) -> Result<(), TransportError> {
        let removed = self
            .connections
            .get_mut(conn)
            .ok_or_else(|| TransportError::UnknownConnection(conn.clone()))?
            .rooms
            .remove(room);

        if removed {
            self.remove_member(room, conn);
            debug!(connection = %conn, room = %room, "Left room");
        }
        Ok(())
    }

    fn leave_all(&self, conn: &ConnectionId) -> Result<(), TransportError> {
        let rooms = self
            .connections
            .get_mut(conn)
            .map(|mut entry| std::mem::take(&mut entry.rooms))
            .ok_or_else(|| TransportError::UnknownConnection(conn.clone()))?;

        for room in &rooms {
            self.remove_member(room, conn);
        }
        debug!(connection = %conn, rooms = rooms.len(), "Left all rooms");
        Ok(())
    }

    fn emit(
        &self,
        conn: &ConnectionId,
        address: &Address,
        payload: Value,
    ) -> Result<(), TransportError> {
        trace!(connection = %conn, address = %address, "Emit");
        self.send(conn, Delivery::new(address, payload))
    }

    fn broadcast_to_room(
        &self,
        room: &str,
        address: &Address,
        payload: Value,
    ) -> Result<usize, TransportError> {
        let members = self.members(room);
        let delivery = Delivery::new(address, payload);

        let count = members
            .iter()
            .filter(|conn| self.send(conn, delivery.clone()).is_ok())
            .count();

        trace!(room = %room, address = %address, recipients = count, "Broadcast to room");
        Ok(count)
    }

    fn broadcast_all(&self, address: &Address, payload: Value) -> Result<usize, TransportError> {
        let delivery = Delivery::new(address, payload);

        let count = self
            .connections
            .iter()
            .filter(|entry| entry.sender.send(delivery.clone()).is_ok())
            .count();

        trace!(address = %address, recipients = count, "Broadcast to all");
        Ok(count)
    }

    fn rooms_of(&self, conn: &ConnectionId) -> Vec<String> {
        self.connections
            .get(conn)
            .map(|entry| entry.rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn members(&self, room: &str) -> Vec<ConnectionId> {
        self.rooms
            .get(room)
            .map(|members| members.iter().map(|m| m.clone()).collect())
            .unwrap_or_default()
    }
}

/// Hub statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubStats {
    /// Number of registered connections.
    pub connection_count: usize,
    /// Number of non-empty rooms.
    pub room_count: usize,
    /// Total number of room memberships.
    pub total_memberships: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn conn(id: &str) -> ConnectionId {
        ConnectionId::new(id)
    }

    #[test]
    fn test_join_is_idempotent() {
        let hub = Hub::new();
        let _rx = hub.register(&conn("a"));

        hub.join(&conn("a"), "room1").unwrap();
        hub.join(&conn("a"), "room1").unwrap();

        assert_eq!(hub.members("room1"), vec![conn("a")]);
        assert_eq!(hub.rooms_of(&conn("a")), vec!["room1".to_string()]);

        hub.leave(&conn("a"), "room1").unwrap();
        assert!(!hub.room_exists("room1"));
        // Leaving again is a no-op
        hub.leave(&conn("a"), "room1").unwrap();
    }

    #[test]
    fn test_unknown_connection() {
        let hub = Hub::new();
        assert!(matches!(
            hub.join(&conn("ghost"), "room1"),
            Err(TransportError::UnknownConnection(_))
        ));
        assert!(matches!(
            hub.leave_all(&conn("ghost")),
            Err(TransportError::UnknownConnection(_))
        ));
    }

    #[test]
    fn test_broadcast_to_room_only_reaches_members() {
        let hub = Hub::new();
        let mut rx_a = hub.register(&conn("a"));
        let mut rx_b = hub.register(&conn("b"));
        hub.join(&conn("a"), "room1").unwrap();

        let address = Address::new("room1", "ping");
        let count = hub
            .broadcast_to_room("room1", &address, json!({"n": 1}))
            .unwrap();
        assert_eq!(count, 1);

        let delivery = rx_a.try_recv().unwrap();
        assert_eq!(&*delivery.address, "room1::ping");
        assert_eq!(*delivery.payload, json!({"n": 1}));
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn test_broadcast_all_reaches_everyone() {
        let hub = Hub::new();
        let mut rx_a = hub.register(&conn("a"));
        let mut rx_b = hub.register(&conn("b"));

        let count = hub
            .broadcast_all(&Address::wildcard("announce"), json!("hi"))
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(&*rx_a.try_recv().unwrap().address, "*::announce");
        assert_eq!(&*rx_b.try_recv().unwrap().address, "*::announce");
    }

    #[test]
    fn test_emit_to_closed_connection() {
        let hub = Hub::new();
        let rx = hub.register(&conn("a"));
        drop(rx);

        assert!(matches!(
            hub.emit(&conn("a"), &Address::error(), json!("boom")),
            Err(TransportError::ConnectionClosed(_))
        ));
    }

    #[test]
    fn test_unregister_cleans_rooms() {
        let hub = Hub::new();
        let _rx_a = hub.register(&conn("a"));
        let _rx_b = hub.register(&conn("b"));
        hub.join(&conn("a"), "room1").unwrap();
        hub.join(&conn("a"), "room2").unwrap();
        hub.join(&conn("b"), "room1").unwrap();

        assert_eq!(
            hub.stats(),
            HubStats {
                connection_count: 2,
                room_count: 2,
                total_memberships: 3
            }
        );

        hub.unregister(&conn("a"));
        assert!(!hub.is_connected(&conn("a")));
        assert!(!hub.room_exists("room2"));
        assert_eq!(hub.members("room1"), vec![conn("b")]);
    }

    #[test]
    fn test_leave_all() {
        let hub = Hub::new();
        let _rx = hub.register(&conn("a"));
        hub.join(&conn("a"), "room1").unwrap();
        hub.join(&conn("a"), "room2").unwrap();

        hub.leave_all(&conn("a")).unwrap();

        assert!(hub.rooms_of(&conn("a")).is_empty());
        assert!(hub.is_connected(&conn("a")));
        assert_eq!(hub.stats().room_count, 0);
    }
}
