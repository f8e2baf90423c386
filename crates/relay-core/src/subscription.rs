//! Channel subscription management.
//!
//! Applies decoded `subscribe` / `unsubscribe` commands to a connection's
//! room memberships. Membership is a set: joining twice or leaving a room
//! that was never joined changes nothing.

use crate::error::GatewayError;
use relay_protocol::ChannelSet;
use relay_transport::{ConnectionId, RoomAdapter};
use tracing::debug;

/// Join the connection to every listed channel.
///
/// # Errors
///
/// Returns the first adapter error; channels before it stay joined.
pub fn subscribe(
    adapter: &dyn RoomAdapter,
    conn: &ConnectionId,
    channels: &ChannelSet,
) -> Result<(), GatewayError> {
    for channel in channels.iter() {
        adapter.join(conn, channel)?;
    }

    debug!(connection = %conn, channels = ?channels, "Subscribed");
    Ok(())
}

/// Remove the connection from every listed channel.
///
/// # Errors
///
/// Returns the first adapter error; channels before it stay left.
pub fn unsubscribe(
    adapter: &dyn RoomAdapter,
    conn: &ConnectionId,
    channels: &ChannelSet,
) -> Result<(), GatewayError> {
    for channel in channels.iter() {
        adapter.leave(conn, channel)?;
    }

    debug!(connection = %conn, channels = ?channels, "Unsubscribed");
    Ok(())
}
