//! Parlor chat relay server.
//!
//! Accepts line-oriented TCP connections and relays text between them:
//! broadcast to everyone else, direct to one connection by registry index,
//! or scoped to a named room. Room messages can be persisted and replayed
//! with `/get_history`.
//!
//! # Architecture
//!
//! The [`ServerDriver`] follows the Sans-IO pattern: it consumes
//! [`ServerEvent`]s and returns [`ServerAction`]s without touching a socket.
//! The [`ConnectionSupervisor`] executes those actions against live
//! connections, and [`Server`] runs the accept loop on Tokio.
//!
//! # Components
//!
//! - [`ServerDriver`]: Action-based orchestrator (pure logic, no I/O)
//! - [`MessageRouter`]: Resolves intents into per-recipient deliveries
//! - [`ClientRegistry`] / [`RoomRegistry`]: Connection and room membership
//! - [`ConnectionSupervisor`]: Per-connection reader loop and writer task
//! - [`Server`]: Production runtime over [`TcpTransport`]
//! - [`storage`]: Memory, redb, and fault-injecting storage backends

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod driver;
mod env;
mod error;
pub mod history;
mod registry;
mod room_registry;
mod router;
mod server_error;
pub mod storage;
mod supervisor;
mod transport;

use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};

pub use driver::{DriverConfig, LogLevel, ServerAction, ServerDriver, ServerEvent};
pub use env::{Environment, SystemEnv};
pub use error::ServerError;
pub use history::{ChatMessage, format_history};
use parlor_proto::Framing;
pub use registry::{ClientInfo, ClientRegistry, ConnectionId};
pub use room_registry::RoomRegistry;
pub use router::{Delivery, MessageRouter};
pub use server_error::DriverError;
pub use storage::{ChaoticStorage, MemoryStorage, RedbStorage, Storage, StorageError};
pub use supervisor::{ConnectionConfig, ConnectionSupervisor};
pub use transport::{TcpTransport, is_transient_accept_error};

/// Pause before accepting again after a transient accept error.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g., "127.0.0.1:8000")
    pub bind_address: String,
    /// Inbound framing mode
    pub framing: Framing,
    /// Longest accepted inbound line in bytes
    pub max_line_length: usize,
    /// Limit for one outbound write. `None` disables the timeout.
    pub send_timeout: Option<Duration>,
    /// Driver configuration (limits, history)
    pub driver: DriverConfig,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        let connection = ConnectionConfig::default();
        Self {
            bind_address: "127.0.0.1:8000".to_string(),
            framing: connection.framing,
            max_line_length: connection.max_line_length,
            send_timeout: connection.send_timeout,
            driver: DriverConfig::default(),
        }
    }
}

impl ServerRuntimeConfig {
    fn connection(&self) -> ConnectionConfig {
        ConnectionConfig {
            framing: self.framing,
            max_line_length: self.max_line_length,
            send_timeout: self.send_timeout,
        }
    }
}

/// Production Parlor server.
///
/// Wraps a [`ConnectionSupervisor`] with a TCP accept loop.
pub struct Server<S: Storage = MemoryStorage> {
    /// Listening socket
    transport: TcpTransport,
    /// Driver and live connections
    supervisor: Arc<ConnectionSupervisor<S>>,
}

impl<S: Storage> Server<S> {
    /// Create and bind a new server.
    pub async fn bind(config: ServerRuntimeConfig, storage: S) -> Result<Self, ServerError> {
        if config.max_line_length == 0 {
            return Err(ServerError::Config("max line length must be positive".to_string()));
        }

        let transport = TcpTransport::bind(&config.bind_address).await?;
        let supervisor = Arc::new(ConnectionSupervisor::new(
            storage,
            config.driver.clone(),
            config.connection(),
        ));

        Ok(Self { transport, supervisor })
    }

    /// Run the server until a fatal accept error.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server until `shutdown` completes or a fatal accept error.
    ///
    /// Transient accept errors are logged and retried after a short pause.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        tracing::info!("Server starting on {}", self.transport.local_addr()?);

        tokio::pin!(shutdown);

        loop {
            let accepted = tokio::select! {
                accepted = self.transport.accept() => accepted,
                () = &mut shutdown => {
                    tracing::info!("Server shutting down");
                    return Ok(());
                },
            };

            match accepted {
                Ok((stream, peer_addr)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        tracing::debug!("set_nodelay failed for {}: {}", peer_addr, e);
                    }

                    let supervisor = Arc::clone(&self.supervisor);
                    tokio::spawn(supervisor.serve_connection(stream, peer_addr.to_string()));
                },
                Err(e) if is_transient_accept_error(&e) => {
                    tracing::warn!("Accept error (retrying): {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                },
                Err(e) => {
                    tracing::error!("Accept error: {}", e);
                    return Err(ServerError::Transport(format!("accept failed: {e}")));
                },
            }
        }
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.transport.local_addr()
    }

    /// Shared handle to the supervisor, for inspection while running.
    pub fn supervisor(&self) -> Arc<ConnectionSupervisor<S>> {
        Arc::clone(&self.supervisor)
    }
}

impl<S: Storage> std::fmt::Debug for Server<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("transport", &self.transport)
            .field("supervisor", &self.supervisor)
            .finish()
    }
}
