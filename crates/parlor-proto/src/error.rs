//! Protocol error types.
//!
//! - `CommandError`: a line looked like a command but its arguments are
//!   unusable. Reported back to the sender, never fatal for the connection.
//! - `CodecError`: the byte stream cannot be framed. Fatal for that
//!   connection only.

use thiserror::Error;

/// A command line whose arguments could not be interpreted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Command requires an argument that was not supplied
    #[error("{command} requires an argument")]
    MissingArgument {
        /// The command token, e.g. `/join`
        command: String,
    },

    /// `/to` target is not a non-negative integer
    #[error("invalid recipient index: {0:?}")]
    InvalidIndex(String),

    /// `/get_history` room id is not a non-negative integer
    #[error("invalid room id: {0:?}")]
    InvalidRoomId(String),
}

/// Errors raised while framing a byte stream into lines.
#[derive(Error, Debug)]
pub enum CodecError {
    /// Peer sent more than `max` bytes without a line terminator
    #[error("line exceeds maximum length ({max} bytes)")]
    LineTooLong {
        /// Configured limit
        max: usize,
    },

    /// Underlying transport failure
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
