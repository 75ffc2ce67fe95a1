//! Connection supervisor.
//!
//! Executes [`ServerDriver`] actions against live connections. Each
//! connection gets a reader loop that feeds decoded lines to the driver and a
//! writer task that drains an unbounded outbound queue, so routing never
//! waits on a slow peer.
//!
//! Lifecycle per connection: `Accepted → Registered → Receiving → Closed`.
//! The reader ends on EOF, a framing error, or when the writer stops (write
//! failure, send timeout, or a `CloseConnection` action). Either way the
//! driver sees exactly one `ConnectionClosed`. When the reader ends first,
//! replies already queued are still written before the socket is shut down.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use futures::{SinkExt, StreamExt, stream::SplitSink};
use parlor_proto::{Framing, LineCodec};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::{Mutex, RwLock, mpsc},
    task::JoinHandle,
};
use tokio_util::codec::Framed;

use crate::{
    driver::{DriverConfig, LogLevel, ServerAction, ServerDriver, ServerEvent},
    env::SystemEnv,
    registry::ConnectionId,
    storage::Storage,
};

/// Per-connection settings applied by the supervisor.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Inbound framing mode
    pub framing: Framing,
    /// Longest accepted inbound line in bytes
    pub max_line_length: usize,
    /// Limit for one outbound write. `None` waits indefinitely.
    pub send_timeout: Option<Duration>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            framing: Framing::Lines,
            max_line_length: parlor_proto::DEFAULT_MAX_LINE_LENGTH,
            send_timeout: Some(Duration::from_secs(10)),
        }
    }
}

/// Message queued for a connection's writer task.
#[derive(Debug)]
enum Outbound {
    Line(String),
    Close(String),
}

/// Owns the driver and the outbound queue of every live connection.
pub struct ConnectionSupervisor<S: Storage> {
    driver: Mutex<ServerDriver<SystemEnv, S>>,
    /// Connection id → outbound queue
    peers: RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<Outbound>>>,
    next_connection_id: AtomicU64,
    config: ConnectionConfig,
}

impl<S: Storage> ConnectionSupervisor<S> {
    /// Create a supervisor with a fresh driver over `storage`.
    pub fn new(storage: S, driver: DriverConfig, config: ConnectionConfig) -> Self {
        Self {
            driver: Mutex::new(ServerDriver::new(SystemEnv::new(), storage, driver)),
            peers: RwLock::new(HashMap::new()),
            next_connection_id: AtomicU64::new(1),
            config,
        }
    }

    /// Serve one connection until it closes.
    ///
    /// Generic over the stream so anything with read/write/close semantics
    /// can be supervised. Connection errors end only this connection.
    pub async fn serve_connection<T>(self: Arc<Self>, stream: T, peer_addr: String)
    where
        T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let codec = LineCodec::new(self.config.framing, self.config.max_line_length);
        let (sink, mut lines) = Framed::new(stream, codec).split::<String>();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut writer =
            tokio::spawn(write_loop(connection_id, sink, rx, self.config.send_timeout));
        let mut writer_done = false;

        self.peers.write().await.insert(connection_id, tx);
        self.dispatch(ServerEvent::ConnectionAccepted { connection_id, peer_addr }).await;

        let reason = loop {
            tokio::select! {
                frame = lines.next() => match frame {
                    Some(Ok(line)) => {
                        self.dispatch(ServerEvent::LineReceived { connection_id, line }).await;
                    },
                    Some(Err(e)) => {
                        tracing::warn!("connection {} read failed: {}", connection_id, e);
                        break e.to_string();
                    },
                    None => break "peer closed".to_string(),
                },
                _ = &mut writer => {
                    writer_done = true;
                    break "writer stopped".to_string();
                },
            }
        };

        // Dropping the sender lets the writer drain what is queued, then stop
        self.peers.write().await.remove(&connection_id);
        self.dispatch(ServerEvent::ConnectionClosed { connection_id, reason }).await;

        if !writer_done {
            self.drain_writer(connection_id, writer).await;
        }
    }

    /// Wait for a writer whose queue is closed, bounded by the send timeout.
    async fn drain_writer(&self, connection_id: ConnectionId, mut writer: JoinHandle<()>) {
        match self.config.send_timeout {
            Some(limit) => {
                if tokio::time::timeout(limit, &mut writer).await.is_err() {
                    tracing::warn!("connection {} drain timed out after {:?}", connection_id, limit);
                    writer.abort();
                }
            },
            None => {
                let _ = writer.await;
            },
        }
    }

    /// Feed one event to the driver and execute the resulting actions.
    ///
    /// The driver lock is held while actions are queued, so deliveries from
    /// one event are enqueued before those of the next.
    async fn dispatch(&self, event: ServerEvent) {
        let mut driver = self.driver.lock().await;

        match driver.process_event(event) {
            Ok(actions) => self.execute_actions(actions).await,
            Err(e) => tracing::warn!("event processing error: {}", e),
        }
    }

    /// Execute server actions.
    async fn execute_actions(&self, actions: Vec<ServerAction>) {
        let peers = self.peers.read().await;

        for action in actions {
            match action {
                ServerAction::SendToConnection { connection_id, payload } => {
                    match peers.get(&connection_id) {
                        Some(tx) => {
                            if tx.send(Outbound::Line(payload)).is_err() {
                                tracing::debug!("connection {} gone, message dropped", connection_id);
                            }
                        },
                        None => {
                            tracing::debug!("SendToConnection: connection {} not found", connection_id);
                        },
                    }
                },

                ServerAction::CloseConnection { connection_id, reason } => {
                    tracing::info!("Closing connection {}: {}", connection_id, reason);
                    if let Some(tx) = peers.get(&connection_id) {
                        let _ = tx.send(Outbound::Close(reason));
                    }
                },

                ServerAction::Log { level, message, .. } => match level {
                    LogLevel::Debug => tracing::debug!("{}", message),
                    LogLevel::Info => tracing::info!("{}", message),
                    LogLevel::Warn => tracing::warn!("{}", message),
                    LogLevel::Error => tracing::error!("{}", message),
                },
            }
        }
    }

    /// Number of connections registered with the driver.
    pub async fn connection_count(&self) -> usize {
        self.driver.lock().await.connection_count()
    }

    /// Handle to the storage backend.
    pub async fn storage(&self) -> S {
        self.driver.lock().await.storage().clone()
    }
}

impl<S: Storage> std::fmt::Debug for ConnectionSupervisor<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSupervisor")
            .field("next_connection_id", &self.next_connection_id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Drain a connection's outbound queue into its sink.
async fn write_loop<T>(
    connection_id: ConnectionId,
    mut sink: SplitSink<Framed<T, LineCodec>, String>,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    send_timeout: Option<Duration>,
) where
    T: AsyncRead + AsyncWrite + Send + Unpin,
{
    while let Some(outbound) = rx.recv().await {
        let line = match outbound {
            Outbound::Line(line) => line,
            Outbound::Close(reason) => {
                tracing::debug!("connection {} closing: {}", connection_id, reason);
                let _ = sink.close().await;
                return;
            },
        };

        let result = match send_timeout {
            Some(limit) => match tokio::time::timeout(limit, sink.send(line)).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!("connection {} send timed out after {:?}", connection_id, limit);
                    return;
                },
            },
            None => sink.send(line).await,
        };

        if let Err(e) = result {
            tracing::debug!("connection {} write failed: {}", connection_id, e);
            return;
        }
    }

    if let Err(e) = sink.close().await {
        tracing::debug!("connection {} shutdown failed: {}", connection_id, e);
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};

    use super::*;
    use crate::storage::MemoryStorage;

    fn supervisor() -> Arc<ConnectionSupervisor<MemoryStorage>> {
        Arc::new(ConnectionSupervisor::new(
            MemoryStorage::new(),
            DriverConfig::default(),
            ConnectionConfig::default(),
        ))
    }

    async fn wait_for_connections(supervisor: &ConnectionSupervisor<MemoryStorage>, n: usize) {
        for _ in 0..200 {
            if supervisor.connection_count().await == n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(supervisor.connection_count().await, n);
    }

    #[tokio::test]
    async fn duplex_connections_exchange_broadcasts() {
        let supervisor = supervisor();
        let (a_client, a_server) = tokio::io::duplex(1024);
        let (b_client, b_server) = tokio::io::duplex(1024);

        tokio::spawn(Arc::clone(&supervisor).serve_connection(a_server, "a".to_string()));
        wait_for_connections(&supervisor, 1).await;
        tokio::spawn(Arc::clone(&supervisor).serve_connection(b_server, "b".to_string()));
        wait_for_connections(&supervisor, 2).await;

        let (_a_read, mut a_write) = tokio::io::split(a_client);
        let mut b_lines = BufReader::new(b_client).lines();

        a_write.write_all(b"hello there\n").await.unwrap();

        assert_eq!(b_lines.next_line().await.unwrap().as_deref(), Some("hello there"));
    }

    #[tokio::test]
    async fn closing_stream_unregisters_connection() {
        let supervisor = supervisor();
        let (client, server) = tokio::io::duplex(1024);

        let task = tokio::spawn(Arc::clone(&supervisor).serve_connection(server, "a".to_string()));
        wait_for_connections(&supervisor, 1).await;

        drop(client);
        task.await.unwrap();

        assert_eq!(supervisor.connection_count().await, 0);
    }

    #[tokio::test]
    async fn reply_is_delivered_after_half_close() {
        let supervisor = supervisor();
        let (client, server) = tokio::io::duplex(1024);

        let task = tokio::spawn(Arc::clone(&supervisor).serve_connection(server, "a".to_string()));
        wait_for_connections(&supervisor, 1).await;

        // Unterminated, so the command only arrives via the EOF flush
        let (mut read, mut write) = tokio::io::split(client);
        write.write_all(b"/join lobby").await.unwrap();
        write.shutdown().await.unwrap();

        let mut received = String::new();
        read.read_to_string(&mut received).await.unwrap();
        task.await.unwrap();

        assert_eq!(received, "joined room lobby (history id 1)\n");
        assert_eq!(supervisor.connection_count().await, 0);
    }

    #[tokio::test]
    async fn stuck_peer_is_dropped_after_send_timeout() {
        let config =
            ConnectionConfig { send_timeout: Some(Duration::from_millis(50)), ..Default::default() };
        let supervisor =
            Arc::new(ConnectionSupervisor::new(MemoryStorage::new(), DriverConfig::default(), config));
        let (sender_client, sender_server) = tokio::io::duplex(1024);
        // Never read, and too small for a single line
        let (_stuck_client, stuck_server) = tokio::io::duplex(2);
        let (listener_client, listener_server) = tokio::io::duplex(1024);

        tokio::spawn(Arc::clone(&supervisor).serve_connection(sender_server, "s".to_string()));
        wait_for_connections(&supervisor, 1).await;
        let stuck =
            tokio::spawn(Arc::clone(&supervisor).serve_connection(stuck_server, "x".to_string()));
        wait_for_connections(&supervisor, 2).await;
        tokio::spawn(Arc::clone(&supervisor).serve_connection(listener_server, "l".to_string()));
        wait_for_connections(&supervisor, 3).await;

        let (_sender_read, mut sender_write) = tokio::io::split(sender_client);
        let mut listener_lines = BufReader::new(listener_client).lines();

        sender_write.write_all(b"one\ntwo\n").await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), stuck).await.unwrap().unwrap();
        assert_eq!(supervisor.connection_count().await, 2);

        sender_write.write_all(b"three\n").await.unwrap();
        for expected in ["one", "two", "three"] {
            assert_eq!(listener_lines.next_line().await.unwrap().as_deref(), Some(expected));
        }
    }

    #[tokio::test]
    async fn over_long_line_ends_only_that_connection() {
        let config = ConnectionConfig { max_line_length: 16, ..Default::default() };
        let supervisor =
            Arc::new(ConnectionSupervisor::new(MemoryStorage::new(), DriverConfig::default(), config));
        let (noisy_client, noisy_server) = tokio::io::duplex(1024);
        let (_quiet_client, quiet_server) = tokio::io::duplex(1024);

        let noisy =
            tokio::spawn(Arc::clone(&supervisor).serve_connection(noisy_server, "n".to_string()));
        tokio::spawn(Arc::clone(&supervisor).serve_connection(quiet_server, "q".to_string()));
        wait_for_connections(&supervisor, 2).await;

        let (_read, mut write) = tokio::io::split(noisy_client);
        write.write_all(&[b'x'; 64]).await.unwrap();
        noisy.await.unwrap();

        assert_eq!(supervisor.connection_count().await, 1);
    }

    #[tokio::test]
    async fn capacity_rejection_closes_stream() {
        let driver = DriverConfig { max_connections: 1, ..Default::default() };
        let supervisor =
            Arc::new(ConnectionSupervisor::new(MemoryStorage::new(), driver, ConnectionConfig::default()));
        let (_first_client, first_server) = tokio::io::duplex(1024);
        let (second_client, second_server) = tokio::io::duplex(1024);

        tokio::spawn(Arc::clone(&supervisor).serve_connection(first_server, "1".to_string()));
        wait_for_connections(&supervisor, 1).await;

        let rejected =
            tokio::spawn(Arc::clone(&supervisor).serve_connection(second_server, "2".to_string()));
        rejected.await.unwrap();

        let mut lines = BufReader::new(second_client).lines();
        assert_eq!(lines.next_line().await.unwrap(), None);
        assert_eq!(supervisor.connection_count().await, 1);
    }
}
