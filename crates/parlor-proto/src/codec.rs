//! Line codec: frames a TCP byte stream into text lines.
//!
//! Inbound bytes are split on `\n` and carriage returns are stripped from both
//! ends of each line, so `\r\n` and the legacy `\n\r` terminator decode to the
//! same text. Invalid UTF-8 is replaced, never rejected.
//!
//! Outbound payloads are written verbatim, with a `\n` appended unless the
//! payload already ends in `\n` or `\r`.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::CodecError;

/// Default upper bound on a single inbound line (excluding terminator).
pub const DEFAULT_MAX_LINE_LENGTH: usize = 8192;

/// How inbound bytes are split into logical lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    /// Split on `\n`
    #[default]
    Lines,
    /// Treat whatever is buffered after a read as one line.
    ///
    /// Compatibility mode for clients that send unterminated messages and
    /// rely on each write arriving as one read.
    Chunk,
}

/// A tokio codec that frames text lines.
#[derive(Debug, Clone)]
pub struct LineCodec {
    framing: Framing,
    max_length: usize,
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new(Framing::Lines, DEFAULT_MAX_LINE_LENGTH)
    }
}

impl LineCodec {
    /// Create a codec with explicit framing and line limit.
    pub fn new(framing: Framing, max_length: usize) -> Self {
        Self { framing, max_length }
    }

    /// Framing mode in use.
    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Maximum accepted line length in bytes.
    pub fn max_length(&self) -> usize {
        self.max_length
    }

    fn decode_line(&self, src: &mut BytesMut) -> Result<Option<String>, CodecError> {
        match src.iter().position(|b| *b == b'\n') {
            Some(pos) => {
                if self.exceeds(&src[..pos]) {
                    return Err(CodecError::LineTooLong { max: self.max_length });
                }
                let line = src.split_to(pos);
                src.advance(1);
                Ok(Some(to_text(&line)))
            },
            None => {
                if self.exceeds(&src[..]) {
                    return Err(CodecError::LineTooLong { max: self.max_length });
                }
                Ok(None)
            },
        }
    }

    fn decode_chunk(&self, src: &mut BytesMut) -> Result<Option<String>, CodecError> {
        if src.is_empty() {
            return Ok(None);
        }
        if self.exceeds(&src[..]) {
            return Err(CodecError::LineTooLong { max: self.max_length });
        }
        let chunk = src.split();
        Ok(Some(to_text(&chunk)))
    }

    /// Whether a raw line is over the limit once its terminators are ignored.
    ///
    /// At most two terminator bytes are free, so a run of bare `\r` still
    /// hits the limit.
    fn exceeds(&self, bytes: &[u8]) -> bool {
        bytes.len() > self.max_length.saturating_add(2) || content_len(bytes) > self.max_length
    }
}

fn is_terminator(b: &u8) -> bool {
    *b == b'\r' || *b == b'\n'
}

/// Length left after stripping `\r`/`\n` from both ends.
fn content_len(bytes: &[u8]) -> usize {
    let start = bytes.iter().position(|b| !is_terminator(b)).unwrap_or(bytes.len());
    let end = bytes.iter().rposition(|b| !is_terminator(b)).map_or(start, |i| i + 1);
    end - start
}

fn to_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim_matches(|c| c == '\r' || c == '\n').to_string()
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.framing {
            Framing::Lines => self.decode_line(src),
            Framing::Chunk => self.decode_chunk(src),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        if src.is_empty() {
            return Ok(None);
        }
        // Unterminated trailing fragment
        let rest = src.split();
        Ok(Some(to_text(&rest)))
    }
}

impl<T> Encoder<T> for LineCodec
where
    T: AsRef<str>,
{
    type Error = CodecError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let text = item.as_ref();
        dst.reserve(text.len() + 1);
        dst.put_slice(text.as_bytes());
        if !text.ends_with(['\n', '\r']) {
            dst.put_u8(b'\n');
        }
        Ok(())
    }
}
