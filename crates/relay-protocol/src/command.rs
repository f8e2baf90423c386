//! Command payload decoding.
//!
//! Validates the shape of inbound `subscribe`, `unsubscribe` and `broadcast`
//! payloads and extracts the fields the handlers need. Nothing here has side
//! effects.

use crate::address::Address;
use serde_json::Value;
use thiserror::Error;

/// Payload field naming the target channel(s).
pub const CHANNELS_FIELD: &str = "channels";

/// Payload field carrying the broadcast body.
pub const PAYLOAD_FIELD: &str = "payload";

/// Command decoding errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// The payload shape does not match what the command expects.
    #[error("invalid payload")]
    InvalidPayload,
}

/// One channel name or an ordered list of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelSet {
    /// `channels: "name"`
    Single(String),
    /// `channels: ["a", "b"]`
    Many(Vec<String>),
}

impl ChannelSet {
    /// Iterate the channel names in the order they were given.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let names: &[String] = match self {
            ChannelSet::Single(name) => std::slice::from_ref(name),
            ChannelSet::Many(names) => names,
        };
        names.iter().map(String::as_str)
    }

    /// Number of channel names.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            ChannelSet::Single(_) => 1,
            ChannelSet::Many(names) => names.len(),
        }
    }

    /// Whether no channel was named.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<&str> for ChannelSet {
    fn from(name: &str) -> Self {
        ChannelSet::Single(name.to_string())
    }
}

impl From<Vec<String>> for ChannelSet {
    fn from(names: Vec<String>) -> Self {
        ChannelSet::Many(names)
    }
}

/// A decoded `broadcast` command.
#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastRequest {
    /// Target channel (or `*`) and event name.
    pub address: Address,
    /// Application payload, forwarded as-is.
    pub payload: Value,
}

impl BroadcastRequest {
    /// Target channel, or `*` for a wildcard broadcast.
    #[must_use]
    pub fn channel(&self) -> &str {
        self.address.prefix()
    }

    /// Event name within the channel.
    #[must_use]
    pub fn event(&self) -> &str {
        self.address.event()
    }
}

/// Decode the `channels` field of a `subscribe` / `unsubscribe` payload.
///
/// # Errors
///
/// Returns [`CommandError::InvalidPayload`] if the payload is not a map, if
/// `channels` is neither a string nor an array, or if any array element is
/// not a string.
pub fn decode_channels(payload: &Value) -> Result<ChannelSet, CommandError> {
    let fields = payload.as_object().ok_or(CommandError::InvalidPayload)?;

    match fields.get(CHANNELS_FIELD) {
        Some(Value::String(name)) => Ok(ChannelSet::Single(name.clone())),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or(CommandError::InvalidPayload)
            })
            .collect::<Result<Vec<_>, _>>()
            .map(ChannelSet::Many),
        _ => Err(CommandError::InvalidPayload),
    }
}

/// Decode a `broadcast` payload.
///
/// # Errors
///
/// Returns [`CommandError::InvalidPayload`] if the payload is not a map, if
/// `channels` is not a string, or if it is not a single `channel::event` pair.
pub fn decode_broadcast(payload: &Value) -> Result<BroadcastRequest, CommandError> {
    let fields = payload.as_object().ok_or(CommandError::InvalidPayload)?;

    let token = fields
        .get(CHANNELS_FIELD)
        .and_then(Value::as_str)
        .ok_or(CommandError::InvalidPayload)?;
    let address = Address::parse(token).ok_or(CommandError::InvalidPayload)?;

    Ok(BroadcastRequest {
        address,
        payload: fields.get(PAYLOAD_FIELD).cloned().unwrap_or(Value::Null),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_single_channel() {
        let set = decode_channels(&json!({"channels": "room1"})).unwrap();
        assert_eq!(set, ChannelSet::Single("room1".into()));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec!["room1"]);
    }

    #[test]
    fn test_decode_channel_list_keeps_order() {
        let set = decode_channels(&json!({"channels": ["b", "a", "b"]})).unwrap();
        assert_eq!(set.len(), 3);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec!["b", "a", "b"]);
    }

    #[test]
    fn test_decode_channels_rejects_bad_shapes() {
        for payload in [
            json!("room1"),
            json!(["room1"]),
            json!(null),
            json!({}),
            json!({"channels": 123}),
            json!({"channels": {"name": "room1"}}),
            json!({"channels": ["room1", 2]}),
        ] {
            assert_eq!(
                decode_channels(&payload),
                Err(CommandError::InvalidPayload),
                "payload {payload} should be rejected"
            );
        }
    }

    #[test]
    fn test_decode_broadcast() {
        let req = decode_broadcast(&json!({
            "channels": "room1::ping",
            "payload": {"n": 1}
        }))
        .unwrap();

        assert_eq!(req.channel(), "room1");
        assert_eq!(req.event(), "ping");
        assert_eq!(req.payload, json!({"n": 1}));
    }

    #[test]
    fn test_decode_broadcast_without_payload() {
        let req = decode_broadcast(&json!({"channels": "*::announce"})).unwrap();
        assert!(req.address.is_wildcard());
        assert_eq!(req.payload, Value::Null);
    }

    #[test]
    fn test_decode_broadcast_rejects_bad_shapes() {
        for payload in [
            json!(42),
            json!({"channels": "room1"}),
            json!({"channels": "a::b::c"}),
            json!({"channels": ["room1::ping"]}),
            json!({"payload": "hi"}),
        ] {
            assert_eq!(
                decode_broadcast(&payload),
                Err(CommandError::InvalidPayload),
                "payload {payload} should be rejected"
            );
        }
    }

    #[test]
    fn test_invalid_payload_message() {
        assert_eq!(CommandError::InvalidPayload.to_string(), "invalid payload");
    }

    #[test]
    fn test_channel_set_len() {
        assert_eq!(ChannelSet::Many(vec!["a".into(), "*".into()]).len(), 2);
        assert_eq!(ChannelSet::from("a").len(), 1);
        assert!(ChannelSet::Many(vec![]).is_empty());
    }
}
