//! Protocol module - wire format, framing, and response writing.
//!
//! This module implements the binary protocol spoken on each connection:
//! - length-prefixed frame accumulation over arbitrary read chunks
//! - fixed-layout request decoding with magic-tag validation
//! - framed response writing with the `-1` error sentinel

mod frame_buffer;
mod response;
mod wire_format;

pub use frame_buffer::FrameBuffer;
pub use response::{parse_response_prelude, ResponseWriter, RESPONSE_PRELUDE_SIZE};
pub use wire_format::{
    SegmentationRequest, DEFAULT_MAX_FRAME_SIZE, ERROR_SENTINEL, LENGTH_PREFIX_SIZE,
    REQUEST_HEADER_SIZE, REQUEST_MAGIC, RESPONSE_MAGIC,
};
