//! Protocol codec
//!
//! Framing for the JSON wire protocol.
//!
//! ## Wire Format
//!
//! There is no length prefix and no delimiter. The server accumulates bytes
//! until the *whole* buffer parses as one JSON value:
//!
//! ```text
//! recv  →  {"ACTION": "se        (parse fails, keep reading)
//! recv  →  t", "ID": "E1"}      (parse succeeds, message complete)
//! ```
//!
//! Responses and notifications are written back as bare JSON objects. A
//! subscribed client may receive several objects back to back, so the client
//! side splits the stream value by value instead.

use std::io::{ErrorKind, Read, Write};

use bytes::{Buf, BytesMut};
use serde_json::Value;

use crate::error::{RelayError, Result};

/// Default size of each socket read
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

/// Accumulates request bytes until they form one complete JSON value
#[derive(Debug)]
pub struct MessageBuffer {
    buf: BytesMut,
    max_size: usize,
}

impl MessageBuffer {
    /// Create a buffer that rejects messages larger than `max_size` bytes
    pub fn new(max_size: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(DEFAULT_CHUNK_SIZE),
            max_size,
        }
    }

    /// Append a chunk and try to parse the accumulated bytes
    ///
    /// Returns the message (and empties the buffer) once the whole buffer is
    /// valid JSON; `None` while it is still incomplete.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Option<Value>> {
        if self.buf.len() + chunk.len() > self.max_size {
            return Err(RelayError::Protocol(format!(
                "Message too large: more than {} bytes without a complete JSON value",
                self.max_size
            )));
        }

        self.buf.extend_from_slice(chunk);
        match try_parse(&self.buf) {
            Some(value) => {
                self.buf.clear();
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Drop any partial message
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Bytes accumulated so far
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// Parse `bytes` as exactly one JSON value (surrounding whitespace allowed)
pub fn try_parse(bytes: &[u8]) -> Option<Value> {
    serde_json::from_slice(bytes).ok()
}

/// Read until `buffer` holds a complete message
///
/// Returns `Ok(None)` when the peer closes before the message completes.
/// Read timeouts surface as `Io` errors with the partial message kept in
/// `buffer`, so the caller can retry.
pub fn read_message<R: Read>(
    reader: &mut R,
    buffer: &mut MessageBuffer,
    chunk_size: usize,
) -> Result<Option<Value>> {
    let mut chunk = vec![0u8; chunk_size.max(1)];

    loop {
        let n = match reader.read(&mut chunk) {
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };

        if n == 0 {
            return Ok(None);
        }

        if let Some(value) = buffer.push(&chunk[..n])? {
            return Ok(Some(value));
        }
    }
}

/// Serialize `value` and write it as one message
pub fn write_message<W: Write>(writer: &mut W, value: &Value) -> Result<()> {
    let bytes = serde_json::to_vec(value)?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

/// Splits a stream of back-to-back JSON values (client side)
pub struct JsonStreamReader<R> {
    reader: R,
    buf: BytesMut,
    chunk_size: usize,
}

impl<R: Read> JsonStreamReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: BytesMut::with_capacity(DEFAULT_CHUNK_SIZE),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Next complete value, or `None` once the stream ends cleanly
    ///
    /// A stream that ends in the middle of a value is a protocol error.
    pub fn next_message(&mut self) -> Result<Option<Value>> {
        let mut chunk = vec![0u8; self.chunk_size];

        loop {
            if let Some(value) = self.take_value()? {
                return Ok(Some(value));
            }

            let n = match self.reader.read(&mut chunk) {
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };

            if n == 0 {
                if self.buf.iter().all(u8::is_ascii_whitespace) {
                    return Ok(None);
                }
                return Err(RelayError::Protocol(format!(
                    "Connection closed with {} bytes of an incomplete message",
                    self.buf.len()
                )));
            }

            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Pop the first complete value off the buffer, if there is one
    fn take_value(&mut self) -> Result<Option<Value>> {
        let (parsed, consumed) = {
            let mut values = serde_json::Deserializer::from_slice(&self.buf).into_iter::<Value>();
            match values.next() {
                Some(Ok(value)) => (Some(value), values.byte_offset()),
                Some(Err(e)) if e.is_eof() => (None, 0),
                Some(Err(e)) => return Err(e.into()),
                None => (None, 0),
            }
        };

        if parsed.is_some() {
            self.buf.advance(consumed);
        }
        Ok(parsed)
    }

    pub fn get_ref(&self) -> &R {
        &self.reader
    }
}
