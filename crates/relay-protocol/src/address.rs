//! Wire addressing for Relay.
//!
//! Every event delivered to a client is addressed as `"<prefix>::<event>"`.
//! The prefix is either a channel name or the wildcard `*`, which means
//! "every connection, regardless of membership".

use std::fmt;

/// Separator between the addressing prefix and the event name.
pub const DELIMITER: &str = "::";

/// Prefix that targets every connected client.
pub const WILDCARD: &str = "*";

/// Reserved channel for system lifecycle announcements.
pub const MASTER_CHANNEL: &str = "master";

/// Prefix used for events the server sends to a single connection.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Event carrying a command failure back to its originator.
pub const ERROR_EVENT: &str = "_error";

/// Event announced on the master channel when a connection goes away.
pub const LOGOUT_EVENT: &str = "logout";

/// A delimiter-joined `prefix::event` address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    prefix: String,
    event: String,
}

impl Address {
    /// Create an address from its two halves.
    #[must_use]
    pub fn new(prefix: impl Into<String>, event: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            event: event.into(),
        }
    }

    /// Address an event to every connection (`*::<event>`).
    #[must_use]
    pub fn wildcard(event: impl Into<String>) -> Self {
        Self::new(WILDCARD, event)
    }

    /// The out-of-band error address, `default::_error`.
    #[must_use]
    pub fn error() -> Self {
        Self::new(DEFAULT_NAMESPACE, ERROR_EVENT)
    }

    /// The logout announcement address, `master::logout`.
    #[must_use]
    pub fn logout() -> Self {
        Self::new(MASTER_CHANNEL, LOGOUT_EVENT)
    }

    /// Parse a `"<prefix>::<event>"` token.
    ///
    /// Exactly one delimiter must be present and neither half may be empty.
    #[must_use]
    pub fn parse(token: &str) -> Option<Self> {
        let (prefix, event) = token.split_once(DELIMITER)?;
        if prefix.is_empty() || event.is_empty() || event.contains(DELIMITER) {
            return None;
        }
        Some(Self::new(prefix, event))
    }

    /// The channel (or wildcard) half.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The event name half.
    #[must_use]
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Whether this address targets every connection.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.prefix == WILDCARD
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.prefix, DELIMITER, self.event)
    }
}
