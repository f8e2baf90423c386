//! # relay-protocol
//!
//! Wire protocol definitions for the Relay pub/sub gateway.
//!
//! - **Address** - `"<channel>::<event>"` addressing and reserved names
//! - **Command** - structural decoding of `subscribe` / `unsubscribe` /
//!   `broadcast` payloads
//! - **Frames** - `emit`, `ack`, keepalive and handshake frames
//! - **Codec** - length-prefixed MessagePack and JSON text encodings
//!
//! ## Example
//!
//! ```rust
//! use relay_protocol::{codec, command, Frame};
//! use serde_json::json;
//!
//! let frame = Frame::emit_with_ack(1, "subscribe", json!({"channels": ["a", "b"]}));
//! let encoded = codec::encode(&frame).unwrap();
//!
//! if let Frame::Emit { data, .. } = codec::decode(&encoded).unwrap() {
//!     let channels = command::decode_channels(&data).unwrap();
//!     assert_eq!(channels.len(), 2);
//! }
//! ```

pub mod address;
pub mod codec;
pub mod command;
pub mod frames;

pub use address::Address;
pub use codec::{decode, encode, ProtocolError, WireFormat};
pub use command::{BroadcastRequest, ChannelSet, CommandError};
pub use frames::{Frame, FrameType, PROTOCOL_VERSION};
