//! Connection lifecycle hooks.
//!
//! On disconnect the connection leaves every room and a `logout` event
//! carrying its identity goes out on the `master` channel. The announcement
//! is owned by [`LogoutGuard`], so it fires on every exit path of
//! [`on_disconnect`], including a failed or panicking leave-all.

use crate::broadcast::broadcast;
use crate::error::GatewayError;
use relay_protocol::address::{LOGOUT_EVENT, MASTER_CHANNEL};
use relay_transport::{ConnectionId, RoomAdapter};
use tracing::{debug, warn};

/// Prepare a freshly accepted connection.
///
/// A new connection starts with no memberships. If the transport reused an
/// identity that still has rooms, they are dropped.
///
/// # Errors
///
/// Returns an error if stale memberships cannot be cleared.
pub fn on_connect(adapter: &dyn RoomAdapter, conn: &ConnectionId) -> Result<(), GatewayError> {
    let stale = adapter.rooms_of(conn);
    if !stale.is_empty() {
        warn!(connection = %conn, rooms = ?stale, "Clearing stale memberships");
        adapter.leave_all(conn)?;
    }

    debug!(connection = %conn, "Connection opened");
    Ok(())
}

/// Tear down a connection's memberships and announce its departure.
///
/// # Errors
///
/// Returns the leave-all error. The logout announcement is sent regardless.
pub fn on_disconnect(
    adapter: &dyn RoomAdapter,
    conn: &ConnectionId,
    reason: &str,
) -> Result<(), GatewayError> {
    let _logout = LogoutGuard::new(adapter, conn);

    adapter.leave_all(conn)?;

    debug!(connection = %conn, reason = %reason, "Connection closed");
    Ok(())
}

/// Broadcasts `master::logout` for a connection when dropped.
pub struct LogoutGuard<'a> {
    adapter: &'a dyn RoomAdapter,
    conn: &'a ConnectionId,
}

impl<'a> LogoutGuard<'a> {
    /// Arm the announcement for `conn`.
    #[must_use]
    pub fn new(adapter: &'a dyn RoomAdapter, conn: &'a ConnectionId) -> Self {
        Self { adapter, conn }
    }
}

impl Drop for LogoutGuard<'_> {
    fn drop(&mut self) {
        match broadcast(
            self.adapter,
            LOGOUT_EVENT,
            self.conn.as_str(),
            &[MASTER_CHANNEL],
        ) {
            Ok(recipients) => {
                debug!(connection = %self.conn, recipients, "Announced logout");
            }
            Err(e) => {
                warn!(connection = %self.conn, error = %e, "Logout announcement failed");
            }
        }
    }
}
