//! Gateway errors.

use relay_protocol::CommandError;
use relay_transport::TransportError;
use thiserror::Error;

/// Errors a command handler can fail with.
///
/// The `Display` text is what the client receives as the command reply and
/// as the `default::_error` payload.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The payload shape does not match what the command expects.
    #[error("invalid payload")]
    InvalidPayload,

    /// The event name is not a known command.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// The room adapter failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl GatewayError {
    /// Short label for logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::InvalidPayload => "invalid_payload",
            GatewayError::UnknownCommand(_) => "unknown_command",
            GatewayError::Transport(_) => "transport",
        }
    }
}

impl From<CommandError> for GatewayError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::InvalidPayload => GatewayError::InvalidPayload,
        }
    }
}
