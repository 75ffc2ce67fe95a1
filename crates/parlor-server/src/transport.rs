//! TCP transport.
//!
//! Binds the listening socket and classifies accept failures. Transient
//! failures (a peer vanished mid-handshake, descriptor exhaustion) leave the
//! listener usable; anything else means the socket cannot be re-armed.

use std::{io, net::SocketAddr};

use tokio::net::{TcpListener, TcpStream};

use crate::error::ServerError;

/// `EMFILE`: per-process descriptor limit reached.
const EMFILE: i32 = 24;
/// `ENFILE`: system-wide descriptor limit reached.
const ENFILE: i32 = 23;

/// Listening TCP socket.
#[derive(Debug)]
pub struct TcpTransport {
    listener: TcpListener,
}

impl TcpTransport {
    /// Bind to `address` (`host:port`). Host names are resolved.
    pub async fn bind(address: &str) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(address).await.map_err(|e| match e.kind() {
            io::ErrorKind::InvalidInput => {
                ServerError::Config(format!("invalid bind address '{address}': {e}"))
            },
            _ => ServerError::Transport(format!("failed to bind {address}: {e}")),
        })?;

        tracing::info!("TCP transport bound to {}", address);

        Ok(Self { listener })
    }

    /// Accept the next connection.
    pub async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        self.listener.accept().await
    }

    /// Local address the transport is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener
            .local_addr()
            .map_err(|e| ServerError::Transport(format!("failed to get local address: {e}")))
    }
}

/// `true` if the listener survives this accept error and accepting should be
/// retried.
pub fn is_transient_accept_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    ) || matches!(err.raw_os_error(), Some(EMFILE | ENFILE))
}
