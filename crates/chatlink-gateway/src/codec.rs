//! Gateway frame codec
//!
//! Text messages carry one JSON frame each. With `zlib-stream` transport
//! compression the server sends binary chunks of a single zlib stream; a
//! chunk ending in the sync-flush marker completes a frame. The inflate
//! context spans the whole connection and must be reset on reconnect.

use flate2::{Decompress, FlushDecompress};
use thiserror::Error;

use crate::protocol::GatewayFrame;
use crate::transport::TransportMessage;

/// Suffix marking the end of a compressed frame
pub const ZLIB_SUFFIX: [u8; 4] = [0x00, 0x00, 0xFF, 0xFF];

const INFLATE_CHUNK: usize = 32 * 1024;

/// Frame decoding failure; the frame is dropped and the connection kept
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown op code {0}")]
    UnknownOpcode(u64),

    #[error("frame is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("inflate failed: {0}")]
    Decompress(#[from] flate2::DecompressError),
}

/// Per-connection frame decoder/encoder
pub struct FrameCodec {
    inflater: Decompress,
    buffer: Vec<u8>,
}

impl std::fmt::Debug for FrameCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameCodec")
            .field("buffered", &self.buffer.len())
            .field("total_in", &self.inflater.total_in())
            .finish()
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCodec {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inflater: Decompress::new(true),
            buffer: Vec::new(),
        }
    }

    /// Discard the inflate context and any partial frame
    pub fn reset(&mut self) {
        self.inflater.reset(true);
        self.buffer.clear();
    }

    /// Decode one transport message
    ///
    /// Returns `Ok(None)` while a compressed frame is still incomplete.
    pub fn decode(&mut self, message: TransportMessage) -> Result<Option<GatewayFrame>, DecodeError> {
        match message {
            TransportMessage::Text(text) => parse(&text).map(Some),
            TransportMessage::Binary(chunk) => {
                self.buffer.extend_from_slice(&chunk);
                if !self.buffer.ends_with(&ZLIB_SUFFIX) {
                    return Ok(None);
                }
                let compressed = std::mem::take(&mut self.buffer);
                let inflated = self.inflate(&compressed)?;
                let text = String::from_utf8(inflated)?;
                parse(&text).map(Some)
            }
        }
    }

    /// Serialize a frame for sending
    pub fn encode(frame: &GatewayFrame) -> Result<String, DecodeError> {
        Ok(serde_json::to_string(frame)?)
    }

    fn inflate(&mut self, input: &[u8]) -> Result<Vec<u8>, DecodeError> {
        let mut output = Vec::with_capacity(input.len().saturating_mul(4).max(INFLATE_CHUNK));
        let mut offset = 0;

        loop {
            let before_in = self.inflater.total_in();
            let before_out = self.inflater.total_out();
            self.inflater
                .decompress_vec(&input[offset..], &mut output, FlushDecompress::Sync)?;
            let consumed = (self.inflater.total_in() - before_in) as usize;
            let produced = self.inflater.total_out() - before_out;
            offset += consumed;

            // Output full: there may be more pending
            if output.len() == output.capacity() {
                output.reserve(INFLATE_CHUNK);
                continue;
            }
            if offset >= input.len() || (consumed == 0 && produced == 0) {
                break;
            }
        }
        Ok(output)
    }
}

fn parse(text: &str) -> Result<GatewayFrame, DecodeError> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    if let Some(op) = value.get("op").and_then(serde_json::Value::as_u64) {
        let known = u8::try_from(op).ok().and_then(crate::protocol::OpCode::from_u8);
        if known.is_none() {
            return Err(DecodeError::UnknownOpcode(op));
        }
    }
    Ok(serde_json::from_value(value)?)
}
