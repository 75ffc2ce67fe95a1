//! Parlor wire protocol.
//!
//! Parlor clients speak a plain text line protocol: every line a client sends
//! is either a slash command or free text, and the server relays text lines
//! back out. This crate holds the pieces both ends agree on:
//!
//! - [`Intent`] and [`parse_command`]: classify one received line into a
//!   routing intent.
//! - [`LineCodec`]: tokio codec that turns a byte stream into lines (or, in
//!   [`Framing::Chunk`] mode, into read-sized chunks for legacy clients).
//!
//! Nothing here performs I/O.

#![forbid(unsafe_code)]

mod codec;
mod command;
mod error;

pub use codec::{DEFAULT_MAX_LINE_LENGTH, Framing, LineCodec};
pub use command::{
    CREATE_ROOM, DIRECT_MARKER, GET_HISTORY, Intent, JOIN, LINE_TERMINATOR, ROOM_MARKER,
    parse_command,
};
pub use error::{CodecError, CommandError};
