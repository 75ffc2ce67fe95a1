//! Parlor server binary.
//!
//! # Usage
//!
//! ```bash
//! # In-memory history on the default address (127.0.0.1:8000)
//! parlor-server
//!
//! # Durable history, all interfaces
//! parlor-server --host 0.0.0.0 --port 8000 --db parlor.redb
//! ```

use std::{path::PathBuf, time::Duration};

use clap::{Parser, ValueEnum};
use parlor_proto::{DEFAULT_MAX_LINE_LENGTH, Framing};
use parlor_server::{
    DriverConfig, MemoryStorage, RedbStorage, Server, ServerError, ServerRuntimeConfig, Storage,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Inbound framing mode
#[derive(Debug, Clone, Copy, ValueEnum)]
enum FramingArg {
    /// One line per `\n`
    Lines,
    /// One line per read (legacy clients)
    Chunk,
}

impl From<FramingArg> for Framing {
    fn from(arg: FramingArg) -> Self {
        match arg {
            FramingArg::Lines => Self::Lines,
            FramingArg::Chunk => Self::Chunk,
        }
    }
}

/// Parlor chat relay server
#[derive(Parser, Debug)]
#[command(name = "parlor-server")]
#[command(about = "Parlor line-oriented chat relay server")]
#[command(version)]
struct Args {
    /// Host address to bind to
    #[arg(long, env = "PARLOR_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, env = "PARLOR_PORT", default_value = "8000")]
    port: u16,

    /// Path to a redb database for durable history (in-memory if omitted)
    #[arg(long, env = "PARLOR_DB")]
    db: Option<PathBuf>,

    /// Inbound framing mode
    #[arg(long, value_enum, default_value = "lines")]
    framing: FramingArg,

    /// Maximum concurrent connections
    #[arg(long, default_value = "10000")]
    max_connections: usize,

    /// Longest accepted inbound line in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_LINE_LENGTH)]
    max_line_length: usize,

    /// Outbound write timeout in milliseconds (0 disables)
    #[arg(long, default_value = "10000")]
    send_timeout_ms: u64,

    /// Don't persist room messages
    #[arg(long)]
    no_history: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Parlor server starting");

    let config = ServerRuntimeConfig {
        bind_address: format!("{}:{}", args.host, args.port),
        framing: args.framing.into(),
        max_line_length: args.max_line_length,
        send_timeout: (args.send_timeout_ms > 0)
            .then(|| Duration::from_millis(args.send_timeout_ms)),
        driver: DriverConfig { max_connections: args.max_connections, record_history: !args.no_history },
    };

    tracing::info!("Binding to {}", config.bind_address);

    match args.db {
        Some(path) => {
            tracing::info!("Using redb history at {}", path.display());
            let storage = RedbStorage::open(&path)
                .map_err(|e| ServerError::Config(format!("cannot open {}: {e}", path.display())))?;
            serve(config, storage).await?;
        },
        None => {
            tracing::warn!("No --db given - history is kept in memory only");
            serve(config, MemoryStorage::new()).await?;
        },
    }

    Ok(())
}

async fn serve<S: Storage>(config: ServerRuntimeConfig, storage: S) -> Result<(), ServerError> {
    let server = Server::bind(config, storage).await?;

    tracing::info!("Server listening on {}", server.local_addr()?);

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
}
