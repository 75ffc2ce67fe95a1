//! Command classification.
//!
//! A received line is split on single spaces and classified by token
//! position only:
//!
//! - first token `/create_room` or `/join` joins (or lazily creates) a room
//! - first token `/get_history` requests a room's persisted history
//! - second-to-last token `/to` sends the first token to one connection
//! - second-to-last token `/room` sends the first token to a room
//! - anything else is broadcast verbatim
//!
//! Keywords anywhere else in the line are ordinary text, so `"go /to bed"`
//! is a plain broadcast.

use crate::error::CommandError;

/// Create-or-join a room. Identical to [`JOIN`].
pub const CREATE_ROOM: &str = "/create_room";
/// Create-or-join a room. Identical to [`CREATE_ROOM`].
pub const JOIN: &str = "/join";
/// Fetch the persisted history of a room.
pub const GET_HISTORY: &str = "/get_history";
/// Trailing marker addressing a connection by registry index.
pub const DIRECT_MARKER: &str = "/to";
/// Trailing marker addressing a room by key.
pub const ROOM_MARKER: &str = "/room";

/// Terminator appended to the first token of directed and room messages.
///
/// Existing clients expect this exact byte order.
pub const LINE_TERMINATOR: &str = "\n\r";

/// What a received line asks the server to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Relay the payload to every other connection
    Broadcast(String),

    /// Relay the payload to the connection at `index` in the client registry
    DirectTo {
        /// Registry position of the recipient
        index: usize,
        /// Text to deliver, terminator included
        payload: String,
    },

    /// Relay the payload to every member of a room
    RoomBroadcast {
        /// Case-sensitive room key
        room_key: String,
        /// Text to deliver, terminator included
        payload: String,
    },

    /// Join the room, creating it on first use
    JoinOrCreateRoom(String),

    /// Send the requester the persisted history of a room
    FetchHistory(u64),
}

impl Intent {
    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Broadcast(_) => "broadcast",
            Self::DirectTo { .. } => "direct",
            Self::RoomBroadcast { .. } => "room_broadcast",
            Self::JoinOrCreateRoom(_) => "join",
            Self::FetchHistory(_) => "history",
        }
    }
}

/// Classify one decoded line.
///
/// First-token commands take precedence over the trailing `/to` and `/room`
/// forms. Parse failures of numeric arguments are [`CommandError`]s.
pub fn parse_command(line: &str) -> Result<Intent, CommandError> {
    let tokens: Vec<&str> = line.split(' ').collect();
    let first = tokens.first().copied().unwrap_or_default();

    match first {
        CREATE_ROOM | JOIN => {
            let key = required_argument(first, tokens.get(1).copied())?;
            return Ok(Intent::JoinOrCreateRoom(key.to_string()));
        },
        GET_HISTORY => {
            let raw = required_argument(first, tokens.get(1).copied())?;
            let room_id =
                raw.parse::<u64>().map_err(|_| CommandError::InvalidRoomId(raw.to_string()))?;
            return Ok(Intent::FetchHistory(room_id));
        },
        _ => {},
    }

    if let [.., marker, target] = tokens.as_slice() {
        match *marker {
            DIRECT_MARKER => {
                let index = target
                    .parse::<usize>()
                    .map_err(|_| CommandError::InvalidIndex((*target).to_string()))?;
                return Ok(Intent::DirectTo { index, payload: terminated(first) });
            },
            ROOM_MARKER => {
                return Ok(Intent::RoomBroadcast {
                    room_key: (*target).to_string(),
                    payload: terminated(first),
                });
            },
            _ => {},
        }
    }

    Ok(Intent::Broadcast(line.to_string()))
}

fn required_argument<'a>(command: &str, arg: Option<&'a str>) -> Result<&'a str, CommandError> {
    match arg {
        Some(arg) if !arg.is_empty() => Ok(arg),
        _ => Err(CommandError::MissingArgument { command: command.to_string() }),
    }
}

fn terminated(text: &str) -> String {
    format!("{text}{LINE_TERMINATOR}")
}
