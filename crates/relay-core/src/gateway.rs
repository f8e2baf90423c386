//! Command dispatch.
//!
//! The gateway maps inbound event names onto the subscription and broadcast
//! handlers, wraps each in the acknowledgment envelope, and exposes the
//! lifecycle hooks and a server-side broadcast API. It keeps no state of its
//! own; everything lives behind the [`RoomAdapter`].

use crate::broadcast::{self, publish};
use crate::envelope::{acknowledge, Reply};
use crate::error::GatewayError;
use crate::lifecycle;
use crate::subscription::{subscribe, unsubscribe};
use relay_protocol::command::{decode_broadcast, decode_channels};
use relay_transport::{ConnectionId, RoomAdapter};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::trace;

/// Commands a client can send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Subscribe,
    Unsubscribe,
    Broadcast,
}

impl Command {
    /// Look up a command by its event name.
    #[must_use]
    pub fn from_event(event: &str) -> Option<Self> {
        match event {
            "subscribe" => Some(Command::Subscribe),
            "unsubscribe" => Some(Command::Unsubscribe),
            "broadcast" => Some(Command::Broadcast),
            _ => None,
        }
    }

    /// The event name clients use for this command.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Subscribe => "subscribe",
            Command::Unsubscribe => "unsubscribe",
            Command::Broadcast => "broadcast",
        }
    }
}

/// Routes client commands onto room primitives.
#[derive(Clone)]
pub struct Gateway {
    adapter: Arc<dyn RoomAdapter>,
}

impl Gateway {
    /// Create a gateway over a room adapter.
    #[must_use]
    pub fn new(adapter: Arc<dyn RoomAdapter>) -> Self {
        Self { adapter }
    }

    /// The underlying room adapter.
    #[must_use]
    pub fn adapter(&self) -> &dyn RoomAdapter {
        self.adapter.as_ref()
    }

    /// Run the connect hook.
    ///
    /// # Errors
    ///
    /// See [`lifecycle::on_connect`].
    pub fn connect(&self, conn: &ConnectionId) -> Result<(), GatewayError> {
        lifecycle::on_connect(self.adapter(), conn)
    }

    /// Run the disconnect hook. The logout announcement is always sent.
    ///
    /// # Errors
    ///
    /// See [`lifecycle::on_disconnect`].
    pub fn disconnect(&self, conn: &ConnectionId, reason: &str) -> Result<(), GatewayError> {
        lifecycle::on_disconnect(self.adapter(), conn, reason)
    }

    /// Handle one inbound command and produce its reply.
    pub fn handle(&self, conn: &ConnectionId, event: &str, payload: Value) -> Reply {
        trace!(connection = %conn, event = %event, "Command");
        acknowledge(self.adapter(), conn, || self.dispatch(conn, event, payload))
    }

    /// Broadcast a server-originated event to the given channels, or to
    /// everyone when the list is empty or contains `*`.
    ///
    /// # Errors
    ///
    /// Returns the first adapter error.
    pub fn broadcast<T>(
        &self,
        event: &str,
        payload: &T,
        channels: &[&str],
    ) -> Result<usize, GatewayError>
    where
        T: Serialize + ?Sized,
    {
        broadcast::broadcast(self.adapter(), event, payload, channels)
    }

    fn dispatch(
        &self,
        conn: &ConnectionId,
        event: &str,
        payload: Value,
    ) -> Result<(), GatewayError> {
        let command = Command::from_event(event)
            .ok_or_else(|| GatewayError::UnknownCommand(event.to_string()))?;

        match command {
            Command::Subscribe => subscribe(self.adapter(), conn, &decode_channels(&payload)?),
            Command::Unsubscribe => unsubscribe(self.adapter(), conn, &decode_channels(&payload)?),
            Command::Broadcast => {
                publish(self.adapter(), conn, decode_broadcast(&payload)?).map(|_| ())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_protocol::Address;
    use relay_transport::{DeliveryReceiver, Hub, TransportError};
    use serde_json::json;

    struct Harness {
        hub: Arc<Hub>,
        gateway: Gateway,
    }

    impl Harness {
        fn new() -> Self {
            let hub = Arc::new(Hub::new());
            let gateway = Gateway::new(hub.clone());
            Self { hub, gateway }
        }

        fn connect(&self, id: &str) -> (ConnectionId, DeliveryReceiver) {
            let conn = ConnectionId::new(id);
            let rx = self.hub.register(&conn);
            self.gateway.connect(&conn).unwrap();
            (conn, rx)
        }
    }

    #[test]
    fn test_command_names() {
        for command in [Command::Subscribe, Command::Unsubscribe, Command::Broadcast] {
            assert_eq!(Command::from_event(command.as_str()), Some(command));
        }
        assert_eq!(Command::from_event("publish"), None);
    }

    #[test]
    fn test_subscribe_then_broadcast_scenario() {
        let h = Harness::new();
        let (a, mut a_rx) = h.connect("client-a");
        let (b, mut b_rx) = h.connect("client-b");
        let (_c, mut c_rx) = h.connect("client-c");

        let reply = h
            .gateway
            .handle(&a, "subscribe", json!({"channels": ["room1", "room2"]}));
        assert_eq!(reply.as_str(), "ok");

        let reply = h.gateway.handle(
            &b,
            "broadcast",
            json!({"channels": "room1::ping", "payload": {"n": 1}}),
        );
        assert_eq!(reply.as_str(), "ok");

        let delivery = a_rx.try_recv().unwrap();
        assert_eq!(&*delivery.address, "room1::ping");
        assert_eq!(*delivery.payload, json!({"n": 1}));

        assert!(b_rx.try_recv().is_err());
        assert!(c_rx.try_recv().is_err());
    }

    #[test]
    fn test_invalid_subscribe_scenario() {
        let h = Harness::new();
        let (a, mut a_rx) = h.connect("client-a");
        let (_b, mut b_rx) = h.connect("client-b");

        let reply = h.gateway.handle(&a, "subscribe", json!({"channels": 123}));
        assert!(!reply.is_ok());
        assert_eq!(reply.as_str(), "invalid payload");

        let event = a_rx.try_recv().unwrap();
        assert_eq!(&*event.address, "default::_error");
        assert_eq!(*event.payload, json!("invalid payload"));
        assert!(b_rx.try_recv().is_err());
        assert!(h.hub.rooms_of(&a).is_empty());
    }

    #[test]
    fn test_malformed_list_joins_nothing() {
        let h = Harness::new();
        let (a, _a_rx) = h.connect("client-a");

        let reply = h
            .gateway
            .handle(&a, "subscribe", json!({"channels": ["room1", 7]}));
        assert_eq!(reply.as_str(), "invalid payload");
        assert!(h.hub.rooms_of(&a).is_empty());
    }

    #[test]
    fn test_wildcard_broadcast_scenario() {
        let h = Harness::new();
        let (a, mut a_rx) = h.connect("client-a");
        let (_b, mut b_rx) = h.connect("client-b");
        h.gateway
            .handle(&a, "subscribe", json!({"channels": "room1"}));

        let reply = h.gateway.handle(
            &a,
            "broadcast",
            json!({"channels": "*::announce", "payload": "hi"}),
        );
        assert!(reply.is_ok());

        for rx in [&mut a_rx, &mut b_rx] {
            let delivery = rx.try_recv().unwrap();
            assert_eq!(&*delivery.address, "*::announce");
            assert_eq!(*delivery.payload, json!("hi"));
        }
    }

    #[test]
    fn test_broadcast_without_delimiter_fails() {
        let h = Harness::new();
        let (a, mut a_rx) = h.connect("client-a");

        let reply = h
            .gateway
            .handle(&a, "broadcast", json!({"channels": "room1", "payload": 1}));
        assert_eq!(reply.as_str(), "invalid payload");
        assert_eq!(&*a_rx.try_recv().unwrap().address, "default::_error");
    }

    #[test]
    fn test_unknown_command_goes_through_envelope() {
        let h = Harness::new();
        let (a, mut a_rx) = h.connect("client-a");

        let reply = h.gateway.handle(&a, "teleport", json!({}));
        assert_eq!(reply.as_str(), "unknown command: teleport");
        assert_eq!(*a_rx.try_recv().unwrap().payload, json!("unknown command: teleport"));
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let h = Harness::new();
        let (a, mut a_rx) = h.connect("client-a");

        h.gateway.handle(&a, "subscribe", json!({"channels": "room1"}));
        let reply = h
            .gateway
            .handle(&a, "unsubscribe", json!({"channels": ["room1"]}));
        assert!(reply.is_ok());

        h.gateway.handle(
            &a,
            "broadcast",
            json!({"channels": "room1::ping", "payload": null}),
        );
        assert!(a_rx.try_recv().is_err());
    }

    #[test]
    fn test_disconnect_announces_to_master_subscribers() {
        let h = Harness::new();
        let (a, _a_rx) = h.connect("client-a");
        let (b, mut b_rx) = h.connect("client-b");

        h.gateway
            .handle(&a, "subscribe", json!({"channels": ["a", "b"]}));
        h.gateway
            .handle(&b, "subscribe", json!({"channels": "master"}));

        h.gateway.disconnect(&a, "client namespace disconnect").unwrap();
        h.hub.unregister(&a);

        assert!(h.hub.members("a").is_empty());
        assert!(h.hub.members("b").is_empty());

        let event = b_rx.try_recv().unwrap();
        assert_eq!(&*event.address, "master::logout");
        assert_eq!(*event.payload, json!("client-a"));
        assert!(b_rx.try_recv().is_err());
    }

    #[test]
    fn test_server_side_broadcast() {
        let h = Harness::new();
        let (a, mut a_rx) = h.connect("client-a");
        h.gateway.handle(&a, "subscribe", json!({"channels": "news"}));

        #[derive(Serialize)]
        struct Headline<'a> {
            title: &'a str,
        }

        let count = h
            .gateway
            .broadcast("headline", &Headline { title: "hello" }, &["news"])
            .unwrap();
        assert_eq!(count, 1);

        let delivery = a_rx.try_recv().unwrap();
        assert_eq!(&*delivery.address, "news::headline");
        assert_eq!(*delivery.payload, json!({"title": "hello"}));
    }

    /// Delegates to a hub but refuses every join.
    struct RejectingJoins {
        hub: Hub,
    }

    impl RoomAdapter for RejectingJoins {
        fn join(&self, _conn: &ConnectionId, _room: &str) -> Result<(), TransportError> {
            Err(TransportError::Other("room registry unavailable".into()))
        }

        fn leave(&self, conn: &ConnectionId, room: &str) -> Result<(), TransportError> {
            self.hub.leave(conn, room)
        }

        fn leave_all(&self, conn: &ConnectionId) -> Result<(), TransportError> {
            self.hub.leave_all(conn)
        }

        fn emit(
            &self,
            conn: &ConnectionId,
            address: &Address,
            payload: Value,
        ) -> Result<(), TransportError> {
            self.hub.emit(conn, address, payload)
        }

        fn broadcast_to_room(
            &self,
            room: &str,
            address: &Address,
            payload: Value,
        ) -> Result<usize, TransportError> {
            self.hub.broadcast_to_room(room, address, payload)
        }

        fn broadcast_all(
            &self,
            address: &Address,
            payload: Value,
        ) -> Result<usize, TransportError> {
            self.hub.broadcast_all(address, payload)
        }

        fn rooms_of(&self, conn: &ConnectionId) -> Vec<String> {
            self.hub.rooms_of(conn)
        }

        fn members(&self, room: &str) -> Vec<ConnectionId> {
            self.hub.members(room)
        }
    }

    #[test]
    fn test_adapter_failure_goes_through_envelope() {
        let adapter = Arc::new(RejectingJoins { hub: Hub::new() });
        let gateway = Gateway::new(adapter.clone());

        let a = ConnectionId::new("client-a");
        let b = ConnectionId::new("client-b");
        let mut a_rx = adapter.hub.register(&a);
        let mut b_rx = adapter.hub.register(&b);

        let expected = TransportError::Other("room registry unavailable".into()).to_string();

        let reply = gateway.handle(&a, "subscribe", json!({"channels": "room1"}));
        assert_eq!(
            reply,
            Reply::Error {
                message: expected.clone(),
                kind: "transport",
            }
        );
        assert_eq!(reply.as_str(), expected);

        let event = a_rx.try_recv().unwrap();
        assert_eq!(&*event.address, "default::_error");
        assert_eq!(*event.payload, Value::String(expected));
        assert!(a_rx.try_recv().is_err());
        assert!(b_rx.try_recv().is_err());
    }
}
