//! Parlor client binary.
//!
//! # Usage
//!
//! ```bash
//! parlor-client --host 127.0.0.1 --port 8000
//! ```

use clap::Parser;
use parlor_client::ClientError;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Parlor terminal client
#[derive(Parser, Debug)]
#[command(name = "parlor-client")]
#[command(about = "Interactive terminal client for the Parlor chat relay")]
#[command(version)]
struct Args {
    /// Server host
    #[arg(long, env = "PARLOR_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(short, long, env = "PARLOR_PORT", default_value = "8000")]
    port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    // stdout carries chat lines only
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let addr = format!("{}:{}", args.host, args.port);
    let stream = match parlor_client::connect(&addr).await {
        Ok(stream) => stream,
        Err(ClientError::Unavailable(_)) => {
            report_unavailable();
            return Ok(());
        },
        Err(e) => return Err(e.into()),
    };

    tracing::info!("Connected to {}", addr);

    parlor_client::run(stream, tokio::io::stdin(), tokio::io::stdout()).await?;

    Ok(())
}

#[allow(clippy::print_stdout)]
fn report_unavailable() {
    println!("The server is unavailable");
}
