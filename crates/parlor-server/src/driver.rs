//! Server driver.
//!
//! Ties together command parsing, the message router (client and room
//! registries) and storage. The driver performs no I/O; the runtime feeds it
//! [`ServerEvent`]s and executes the returned [`ServerAction`]s.

use std::time::Instant;

use parlor_proto::{Intent, LINE_TERMINATOR, parse_command};

use crate::{
    env::Environment,
    history::ChatMessage,
    registry::{ClientInfo, ClientRegistry, ConnectionId},
    room_registry::RoomRegistry,
    router::{Delivery, MessageRouter},
    server_error::DriverError,
    storage::Storage,
};

/// Driver configuration
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Maximum concurrent connections
    pub max_connections: usize,
    /// Persist `/room` messages to the `messages` table
    pub record_history: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self { max_connections: 10_000, record_history: true }
    }
}

/// Inputs the runtime feeds to the driver.
///
/// These are produced by the runtime (production or test harness).
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// The runtime accepted a socket
    ConnectionAccepted {
        /// Id the runtime picked for this socket
        connection_id: ConnectionId,
        /// Peer address as reported by the transport
        peer_addr: String,
    },

    /// A line was received from a connection
    LineReceived {
        /// Connection that sent the line
        connection_id: ConnectionId,
        /// Decoded line, terminator stripped
        line: String,
    },

    /// The socket is gone: EOF, read error, or writer failure
    ConnectionClosed {
        /// Connection that ended
        connection_id: ConnectionId,
        /// Reason for closure
        reason: String,
    },
}

/// Effects the runtime must carry out.
///
/// These are executed by runtime-specific code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerAction {
    /// Write a payload to a specific connection
    SendToConnection {
        /// Target connection
        connection_id: ConnectionId,
        /// Text to write, verbatim
        payload: String,
    },

    /// Close a connection
    CloseConnection {
        /// Connection to close
        connection_id: ConnectionId,
        /// Reason for closure
        reason: String,
    },

    /// Emit a log line through the runtime
    Log {
        /// Log level
        level: LogLevel,
        /// Message to log
        message: String,
        /// Driver clock reading when the line was produced
        timestamp: Instant,
    },
}

impl From<Delivery> for ServerAction {
    fn from(delivery: Delivery) -> Self {
        Self::SendToConnection { connection_id: delivery.to, payload: delivery.payload }
    }
}

/// Severity of a [`ServerAction::Log`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug information
    Debug,
    /// Informational message
    Info,
    /// Warning
    Warn,
    /// Error
    Error,
}

/// Sans-IO chat relay core.
///
/// Orchestrates connection registration, command parsing, and routing.
pub struct ServerDriver<E, S>
where
    E: Environment,
    S: Storage,
{
    /// Registries, room ids, and storage
    router: MessageRouter<S>,
    /// Environment (time)
    env: E,
    /// Driver configuration
    config: DriverConfig,
}

impl<E, S> ServerDriver<E, S>
where
    E: Environment,
    S: Storage,
{
    /// Build a driver with no connections.
    pub fn new(env: E, storage: S, config: DriverConfig) -> Self {
        Self { router: MessageRouter::new(storage), env, config }
    }

    /// Apply one event and return the actions it produces, in order.
    ///
    /// Errors mean the runtime and driver disagree about which connections
    /// exist.
    pub fn process_event(&mut self, event: ServerEvent) -> Result<Vec<ServerAction>, DriverError> {
        match event {
            ServerEvent::ConnectionAccepted { connection_id, peer_addr } => {
                self.handle_connection_accepted(connection_id, peer_addr)
            },
            ServerEvent::LineReceived { connection_id, line } => {
                self.handle_line_received(connection_id, &line)
            },
            ServerEvent::ConnectionClosed { connection_id, reason } => {
                Ok(self.handle_connection_closed(connection_id, &reason))
            },
        }
    }

    /// Register an accepted socket, or refuse it at capacity.
    fn handle_connection_accepted(
        &mut self,
        connection_id: ConnectionId,
        peer_addr: String,
    ) -> Result<Vec<ServerAction>, DriverError> {
        let now = self.env.now();

        if self.router.clients().contains(connection_id) {
            return Err(DriverError::ConnectionAlreadyExists(connection_id));
        }

        if self.router.clients().len() >= self.config.max_connections {
            return Ok(vec![
                ServerAction::CloseConnection {
                    connection_id,
                    reason: "server full".to_string(),
                },
                ServerAction::Log {
                    level: LogLevel::Warn,
                    message: format!("connection {connection_id} from {peer_addr} rejected: at capacity"),
                    timestamp: now,
                },
            ]);
        }

        let mut actions = Vec::new();
        self.router.register(connection_id, ClientInfo::new(peer_addr.clone()));

        if let Err(e) = self.router.persist_identity(connection_id) {
            actions.push(ServerAction::Log {
                level: LogLevel::Warn,
                message: format!("failed to persist identity for connection {connection_id}: {e}"),
                timestamp: now,
            });
        }

        actions.push(ServerAction::Log {
            level: LogLevel::Debug,
            message: format!("connection {connection_id} accepted from {peer_addr}"),
            timestamp: now,
        });

        Ok(actions)
    }

    /// Handle a line received from a connection.
    fn handle_line_received(
        &mut self,
        connection_id: ConnectionId,
        line: &str,
    ) -> Result<Vec<ServerAction>, DriverError> {
        let now = self.env.now();

        if !self.router.clients().contains(connection_id) {
            return Err(DriverError::ConnectionNotFound(connection_id));
        }

        if line.is_empty() {
            return Ok(Vec::new());
        }

        let intent = match parse_command(line) {
            Ok(intent) => intent,
            Err(e) => {
                return Ok(vec![
                    ServerAction::SendToConnection { connection_id, payload: format!("error: {e}") },
                    ServerAction::Log {
                        level: LogLevel::Debug,
                        message: format!("malformed command from connection {connection_id}: {e}"),
                        timestamp: now,
                    },
                ]);
            },
        };

        let kind = intent.kind();
        let mut actions = Vec::new();

        let deliveries = match intent {
            Intent::Broadcast(payload) => self.router.broadcast(connection_id, &payload),
            Intent::DirectTo { index, payload } => self.router.direct(index, &payload),
            Intent::RoomBroadcast { room_key, payload } => {
                // Nobody hears a memberless room, so it gets no id and no history
                if self.config.record_history && self.router.rooms().has_room(&room_key) {
                    actions.extend(self.record_room_message(connection_id, &room_key, &payload));
                }
                self.router.room_broadcast(&room_key, &payload)
            },
            Intent::JoinOrCreateRoom(room_key) => self.handle_join(connection_id, &room_key, &mut actions),
            Intent::FetchHistory(room_id) => {
                match self.router.fetch_history(connection_id, room_id) {
                    Ok(deliveries) => deliveries,
                    Err(e) => {
                        actions.push(ServerAction::Log {
                            level: LogLevel::Warn,
                            message: format!("history fetch for room {room_id} failed: {e}"),
                            timestamp: now,
                        });
                        vec![Delivery::new(connection_id, format!("error: history unavailable: {e}"))]
                    },
                }
            },
        };

        actions.push(ServerAction::Log {
            level: LogLevel::Debug,
            message: format!(
                "{kind} from connection {connection_id} routed to {} recipients",
                deliveries.len()
            ),
            timestamp: now,
        });
        actions.extend(deliveries.into_iter().map(ServerAction::from));

        Ok(actions)
    }

    /// Join (or create) a room and confirm to the joiner.
    fn handle_join(
        &mut self,
        connection_id: ConnectionId,
        room_key: &str,
        actions: &mut Vec<ServerAction>,
    ) -> Vec<Delivery> {
        self.router.join_or_create(room_key, connection_id);

        let confirmation = match self.router.room_id(room_key) {
            Ok(room_id) => format!("joined room {room_key} (history id {room_id})"),
            Err(e) => {
                actions.push(ServerAction::Log {
                    level: LogLevel::Warn,
                    message: format!("failed to resolve durable id for room {room_key:?}: {e}"),
                    timestamp: self.env.now(),
                });
                format!("joined room {room_key}")
            },
        };

        vec![Delivery::new(connection_id, confirmation)]
    }

    /// Persist a room message. Failures are returned as log actions only.
    fn record_room_message(
        &mut self,
        connection_id: ConnectionId,
        room_key: &str,
        payload: &str,
    ) -> Option<ServerAction> {
        let now = self.env.now();

        let Some(sender_id) = self.router.clients().info(connection_id).and_then(|i| i.identity_id)
        else {
            return Some(ServerAction::Log {
                level: LogLevel::Debug,
                message: format!("connection {connection_id} has no identity, message not recorded"),
                timestamp: now,
            });
        };

        let result = self.router.room_id(room_key).and_then(|room_id| {
            self.router.append_history(&ChatMessage {
                room_id,
                sender_id,
                recipient_id: None,
                timestamp: self.env.wall_clock_secs(),
                content: payload.strip_suffix(LINE_TERMINATOR).unwrap_or(payload).to_string(),
            })
        });

        result.err().map(|e| ServerAction::Log {
            level: LogLevel::Warn,
            message: format!("failed to record message for room {room_key:?}: {e}"),
            timestamp: now,
        })
    }

    /// Drop a connection and its room memberships.
    fn handle_connection_closed(
        &mut self,
        connection_id: ConnectionId,
        reason: &str,
    ) -> Vec<ServerAction> {
        let now = self.env.now();

        match self.router.unregister(connection_id) {
            Some((info, room_count)) => vec![ServerAction::Log {
                level: LogLevel::Info,
                message: format!(
                    "connection {connection_id} ({}) closed: {reason}, was in {room_count} rooms",
                    info.peer_addr
                ),
                timestamp: now,
            }],
            None => Vec::new(),
        }
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.router.clients().len()
    }

    /// Client registry.
    pub fn clients(&self) -> &ClientRegistry {
        self.router.clients()
    }

    /// Room registry.
    pub fn rooms(&self) -> &RoomRegistry {
        self.router.rooms()
    }

    /// Storage backend for history persistence.
    pub fn storage(&self) -> &S {
        self.router.storage()
    }

    /// Driver configuration.
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }
}

impl<E, S> std::fmt::Debug for ServerDriver<E, S>
where
    E: Environment,
    S: Storage,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerDriver")
            .field("router", &self.router)
            .field("config", &self.config)
            .finish()
    }
}
