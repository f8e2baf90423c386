//! # relay-transport
//!
//! Transport-side collaborators for the Relay gateway.
//!
//! - **ConnectionId** - opaque identity issued for each accepted connection
//! - **RoomAdapter** - join/leave/emit/broadcast primitives the core is
//!   written against
//! - **Hub** - in-process room registry with one outbound queue per
//!   connection
//!
//! ```rust
//! use relay_protocol::Address;
//! use relay_transport::{ConnectionId, Hub, RoomAdapter};
//! use serde_json::json;
//!
//! let hub = Hub::new();
//! let conn = ConnectionId::generate();
//! let mut outbound = hub.register(&conn);
//!
//! hub.join(&conn, "room1").unwrap();
//! hub.broadcast_to_room("room1", &Address::new("room1", "ping"), json!(1)).unwrap();
//!
//! assert_eq!(&*outbound.try_recv().unwrap().address, "room1::ping");
//! ```

pub mod hub;
pub mod traits;

pub use hub::{DeliveryReceiver, Hub, HubStats};
pub use traits::{ConnectionId, Delivery, RoomAdapter, TransportError};
