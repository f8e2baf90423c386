//! Broadcast routing.
//!
//! A broadcast names a channel and an event. Members of the channel receive
//! the payload under `"<channel>::<event>"`; the wildcard channel `*`
//! reaches every connection under `"*::<event>"`.

use crate::error::GatewayError;
use relay_protocol::address::WILDCARD;
use relay_protocol::{Address, BroadcastRequest};
use relay_transport::{ConnectionId, RoomAdapter};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

/// Publish a client `broadcast` command.
///
/// Returns the number of connections the payload was queued for.
///
/// # Errors
///
/// Returns an error if the adapter fails to fan out.
pub fn publish(
    adapter: &dyn RoomAdapter,
    origin: &ConnectionId,
    request: BroadcastRequest,
) -> Result<usize, GatewayError> {
    let BroadcastRequest { address, payload } = request;

    let recipients = deliver(adapter, address.prefix(), address.event(), payload)?;

    debug!(
        connection = %origin,
        address = %address,
        recipients,
        "Published"
    );
    Ok(recipients)
}

/// Broadcast a server-originated event.
///
/// An empty channel list, or one containing `*`, reaches every connection
/// once under `*::<event>`. Otherwise each channel is delivered separately.
///
/// # Errors
///
/// Returns the first adapter error.
pub fn broadcast<T>(
    adapter: &dyn RoomAdapter,
    event: &str,
    payload: &T,
    channels: &[&str],
) -> Result<usize, GatewayError>
where
    T: Serialize + ?Sized,
{
    let payload = serde_json::to_value(payload).unwrap_or_else(|e| {
        warn!(
            event = %event,
            channels = ?channels,
            error = %e,
            "Payload is not representable on the wire, sending null"
        );
        Value::Null
    });

    if channels.is_empty() || has_wildcard(channels) {
        return deliver(adapter, WILDCARD, event, payload);
    }

    let mut recipients = 0;
    for channel in channels {
        recipients += deliver(adapter, channel, event, payload.clone())?;
    }
    Ok(recipients)
}

/// Convert a payload into its plain wire form.
///
/// Structs and maps become field maps, primitives stay primitives. A value
/// that cannot be represented is sent as `null`.
pub fn normalize_payload<T>(payload: &T) -> Value
where
    T: Serialize + ?Sized,
{
    serde_json::to_value(payload).unwrap_or_else(|e| {
        warn!(error = %e, "Payload is not representable on the wire, sending null");
        Value::Null
    })
}

/// Whether any of the channels is the wildcard token.
#[must_use]
pub fn has_wildcard(channels: &[&str]) -> bool {
    channels.iter().any(|ch| *ch == WILDCARD)
}

fn deliver(
    adapter: &dyn RoomAdapter,
    channel: &str,
    event: &str,
    payload: Value,
) -> Result<usize, GatewayError> {
    let recipients = if channel == WILDCARD {
        adapter.broadcast_all(&Address::wildcard(event), payload)?
    } else {
        adapter.broadcast_to_room(channel, &Address::new(channel, event), payload)?
    };
    Ok(recipients)
}
