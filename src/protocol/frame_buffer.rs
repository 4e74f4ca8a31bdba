//! Frame buffer for accumulating partial reads.
//!
//! The network delivers chunks of arbitrary size; a frame is only usable
//! once every declared byte has arrived. Uses `bytes::BytesMut` and a two
//! state machine:
//! - `AwaitingLength`: need the 4-byte little-endian total-length prefix
//! - `AwaitingBody`: prefix consumed, need the remaining body bytes
//!
//! The declared length covers the whole frame including the prefix itself.
//! Extracted frames are the body only, with the prefix stripped.

use bytes::{Bytes, BytesMut};

use super::wire_format::{DEFAULT_MAX_FRAME_SIZE, LENGTH_PREFIX_SIZE};
use crate::error::{Result, SegwireError};

/// State machine for frame accumulation.
#[derive(Debug, Clone, Copy)]
enum State {
    /// Waiting for the complete length prefix (4 bytes).
    AwaitingLength,
    /// Prefix consumed, waiting for the frame body.
    AwaitingBody { body_len: usize },
}

/// Accumulates incoming bytes and extracts complete frame bodies.
///
/// No chunk is ever discarded: bytes beyond the current frame stay
/// buffered for the next extraction.
pub struct FrameBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    /// Maximum allowed total frame size.
    max_frame_size: u32,
}

impl FrameBuffer {
    /// Create a frame buffer with the default maximum frame size.
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Create a frame buffer with a custom maximum frame size.
    pub fn with_max_frame_size(max_frame_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            state: State::AwaitingLength,
            max_frame_size,
        }
    }

    /// Push data into the buffer and extract all complete frame bodies.
    ///
    /// Returns an empty vector while a frame is still partial. In the
    /// expected half-duplex traffic pattern at most one frame completes
    /// per request cycle, but pipelined bytes are still handed out in
    /// arrival order rather than dropped.
    ///
    /// # Errors
    ///
    /// Returns a protocol error if a declared frame length is smaller than
    /// the prefix itself or exceeds the configured maximum.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Bytes>> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(body) = self.try_extract_one()? {
            frames.push(body);
        }
        Ok(frames)
    }

    /// Try to extract a single frame body from the buffer.
    fn try_extract_one(&mut self) -> Result<Option<Bytes>> {
        match self.state {
            State::AwaitingLength => {
                if self.buffer.len() < LENGTH_PREFIX_SIZE {
                    return Ok(None);
                }

                let total = u32::from_le_bytes([
                    self.buffer[0],
                    self.buffer[1],
                    self.buffer[2],
                    self.buffer[3],
                ]);

                if (total as usize) < LENGTH_PREFIX_SIZE {
                    return Err(SegwireError::Protocol(format!(
                        "declared frame size {} smaller than length prefix",
                        total
                    )));
                }
                if total > self.max_frame_size {
                    return Err(SegwireError::Protocol(format!(
                        "declared frame size {} exceeds maximum {}",
                        total, self.max_frame_size
                    )));
                }

                let _ = self.buffer.split_to(LENGTH_PREFIX_SIZE);
                self.state = State::AwaitingBody {
                    body_len: total as usize - LENGTH_PREFIX_SIZE,
                };

                // The body may already be buffered.
                self.try_extract_one()
            }

            State::AwaitingBody { body_len } => {
                if self.buffer.len() < body_len {
                    return Ok(None);
                }

                let body = self.buffer.split_to(body_len).freeze();
                self.state = State::AwaitingLength;
                Ok(Some(body))
            }
        }
    }

    /// Number of buffered bytes not yet part of an extracted frame.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Whether a frame is partially accumulated (prefix or body pending
    /// with bytes already received).
    pub fn mid_frame(&self) -> bool {
        !self.buffer.is_empty() || matches!(self.state, State::AwaitingBody { .. })
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match self.state {
            State::AwaitingLength => "AwaitingLength",
            State::AwaitingBody { .. } => "AwaitingBody",
        }
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
