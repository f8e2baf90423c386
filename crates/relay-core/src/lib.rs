//! # relay-core
//!
//! Channel subscription and broadcast routing for the Relay gateway.
//!
//! - **Subscription** - apply `subscribe` / `unsubscribe` to room membership
//! - **Broadcast** - fan payloads out under `"<channel>::<event>"` or to
//!   everyone under `"*::<event>"`
//! - **Envelope** - uniform `"ok"` / error-text replies plus the
//!   `default::_error` event
//! - **Lifecycle** - connect setup and the disconnect `master::logout`
//!   announcement
//! - **Gateway** - dispatches command names onto the handlers
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌──────────────┐     ┌─────────────┐
//! │  Connection │────▶│   Gateway   │────▶│ Subscription │────▶│ RoomAdapter │
//! └─────────────┘     └─────────────┘     │  Broadcast   │     └─────────────┘
//!                            │            └──────────────┘
//!                            ▼
//!                     ┌─────────────┐
//!                     │  Envelope   │
//!                     └─────────────┘
//! ```

pub mod broadcast;
pub mod envelope;
pub mod error;
pub mod gateway;
pub mod lifecycle;
pub mod subscription;

pub use envelope::{Reply, OK_REPLY};
pub use error::GatewayError;
pub use gateway::{Command, Gateway};
pub use lifecycle::LogoutGuard;
