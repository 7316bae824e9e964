//! Event-stream codec for device telemetry
//!
//! Telemetry is pushed as server-sent events:
//! ```text
//! data: {"device_id":"d1","battery":80}\n
//! \n
//! ```
//!
//! An event ends at a blank line. Multiple `data:` lines in one event are
//! joined with `\n`. Lines starting with `:` are comments (keep-alives).
//! Other fields (`event:`, `id:`, `retry:`) are accepted and ignored.

use bytes::{Buf, BytesMut};
use thiserror::Error;

use crate::TelemetryPayload;

/// Maximum size of a single buffered event (1 MB)
pub const MAX_EVENT_SIZE: usize = 1024 * 1024;

/// Errors that can occur while decoding the event stream
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Event too large: {0} bytes (max: {MAX_EVENT_SIZE})")]
    EventTooLarge(usize),

    #[error("Event is not valid UTF-8")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("Event payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Streaming decoder that turns raw bytes into event data strings
#[derive(Debug, Default)]
pub struct EventDecoder {
    /// Bytes not yet terminated by a newline
    buffer: BytesMut,
    /// `data:` lines of the event being assembled
    data_lines: Vec<String>,
    data_len: usize,
}

impl EventDecoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            data_lines: Vec::new(),
            data_len: 0,
        }
    }

    /// Add data to the decoder buffer
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to decode the next complete event's data
    ///
    /// Call repeatedly until it returns `Ok(None)` to drain all complete events.
    pub fn decode_next(&mut self) -> Result<Option<String>, CodecError> {
        loop {
            let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') else {
                let pending = self.buffer.len() + self.data_len;
                if pending > MAX_EVENT_SIZE {
                    self.reset();
                    return Err(CodecError::EventTooLarge(pending));
                }
                return Ok(None);
            };

            let mut line = self.buffer.split_to(newline);
            self.buffer.advance(1);
            if line.last() == Some(&b'\r') {
                line.truncate(line.len() - 1);
            }

            if line.is_empty() {
                if self.data_lines.is_empty() {
                    continue;
                }
                let data = self.data_lines.join("\n");
                self.data_lines.clear();
                self.data_len = 0;
                return Ok(Some(data));
            }

            let line = std::str::from_utf8(&line)?;
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            if field == "data" {
                self.data_len += value.len();
                if self.data_len > MAX_EVENT_SIZE {
                    let size = self.data_len;
                    self.reset();
                    return Err(CodecError::EventTooLarge(size));
                }
                self.data_lines.push(value.to_string());
            }
        }
    }

    /// Decode the next event and parse it as a telemetry payload
    pub fn decode_telemetry(&mut self) -> Result<Option<TelemetryPayload>, CodecError> {
        match self.decode_next()? {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.data_lines.clear();
        self.data_len = 0;
    }
}
