//! Driver error types.
//!
//! Errors returned by [`ServerDriver::process_event`](crate::ServerDriver).
//! Routing outcomes such as unknown recipients are not errors; these cover
//! events that reference connections the driver doesn't know about.

use thiserror::Error;

use crate::registry::ConnectionId;

/// Errors that can occur while processing a driver event.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// Event references a connection that isn't registered.
    ///
    /// May be transient if the connection was just closed; the runtime drops
    /// the event.
    #[error("connection not found: {0}")]
    ConnectionNotFound(ConnectionId),

    /// Connection id was accepted twice.
    ///
    /// Connection ids are unique per runtime, so this is a logic bug.
    #[error("connection already exists: {0}")]
    ConnectionAlreadyExists(ConnectionId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_error_display() {
        assert_eq!(DriverError::ConnectionNotFound(42).to_string(), "connection not found: 42");
        assert_eq!(
            DriverError::ConnectionAlreadyExists(7).to_string(),
            "connection already exists: 7"
        );
    }
}
