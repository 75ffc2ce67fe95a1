//! Parlor terminal client.
//!
//! Relays typed lines to the server unchanged and prints every received line
//! prefixed with the local receive time. The client has no protocol logic of
//! its own; commands such as `/join` are interpreted by the server.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::io;

use chrono::{DateTime, Local, TimeZone};
use futures::{SinkExt, StreamExt};
use parlor_proto::{CodecError, LineCodec};
use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt},
    net::TcpStream,
};
use tokio_util::codec::{Framed, FramedRead};

/// `strftime` format of the receive timestamp.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H.%M.%S";

/// Errors that end a client session.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Nothing is listening at the server address
    #[error("server at {0} is unavailable")]
    Unavailable(String),

    /// Connection or terminal I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Server stream could not be framed
    #[error("protocol error: {0}")]
    Codec(#[from] CodecError),
}

/// Connect to the server at `addr` (`host:port`).
///
/// A refused connection maps to [`ClientError::Unavailable`].
pub async fn connect(addr: &str) -> Result<TcpStream, ClientError> {
    match TcpStream::connect(addr).await {
        Ok(stream) => Ok(stream),
        Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
            Err(ClientError::Unavailable(addr.to_string()))
        },
        Err(e) => Err(e.into()),
    }
}

/// Render a received line as `<timestamp>: <line>`.
pub fn format_received<Tz>(at: &DateTime<Tz>, line: &str) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!("{}: {}", at.format(TIMESTAMP_FORMAT), line)
}

/// Run a session until the server closes the connection.
///
/// Lines read from `input` are sent as-is. Lines received from the server
/// are written to `output` with a timestamp. When `input` ends the write half
/// is shut down and replies keep printing until the server hangs up.
pub async fn run<T, R, W>(stream: T, input: R, mut output: W) -> Result<(), ClientError>
where
    T: AsyncRead + AsyncWrite + Unpin,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (mut outgoing, mut incoming) = Framed::new(stream, LineCodec::default()).split::<String>();
    let mut typed = FramedRead::new(input, LineCodec::default());
    let mut typing = true;

    loop {
        tokio::select! {
            line = typed.next(), if typing => match line {
                Some(Ok(line)) => outgoing.send(line).await?,
                Some(Err(e)) => return Err(e.into()),
                None => {
                    tracing::debug!("input closed, waiting for the server to finish");
                    outgoing.close().await?;
                    typing = false;
                },
            },
            received = incoming.next() => match received {
                Some(Ok(line)) => {
                    let rendered = format_received(&Local::now(), &line);
                    output.write_all(rendered.as_bytes()).await?;
                    output.write_all(b"\n").await?;
                    output.flush().await?;
                },
                Some(Err(e)) => return Err(e.into()),
                None => {
                    tracing::info!("server closed the connection");
                    return Ok(());
                },
            },
        }
    }
}
