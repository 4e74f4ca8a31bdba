//! Response framing and writing.
//!
//! A response is the magic tag, an i32 LE payload length, then the payload.
//! The error sentinel is a `-1` length with no payload. Each write call
//! runs to completion (flush included) before returning, so callers get
//! strict on-the-wire ordering for free.

use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::wire_format::{ERROR_SENTINEL, RESPONSE_MAGIC};
use crate::error::Result;

/// Size of the response prelude: magic tag plus length field.
pub const RESPONSE_PRELUDE_SIZE: usize = RESPONSE_MAGIC.len() + 4;

/// Writes framed responses onto a connection's stream.
///
/// Holds a small reusable prelude buffer so the steady-state path encodes
/// without allocating.
pub struct ResponseWriter {
    prelude: [u8; RESPONSE_PRELUDE_SIZE],
}

impl ResponseWriter {
    /// Create a response writer with the magic tag pre-filled.
    pub fn new() -> Self {
        let mut prelude = [0u8; RESPONSE_PRELUDE_SIZE];
        prelude[..RESPONSE_MAGIC.len()].copy_from_slice(&RESPONSE_MAGIC);
        Self { prelude }
    }

    /// Write a successful response carrying `mask` as the payload.
    pub async fn write_ok<W>(&mut self, stream: &mut W, mask: &[u8]) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        self.encode_length(mask.len() as i32);
        stream.write_all(&self.prelude).await?;
        stream.write_all(mask).await?;
        stream.flush().await?;
        Ok(())
    }

    /// Write the error-sentinel response: magic tag and `-1`, no payload.
    pub async fn write_error<W>(&mut self, stream: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        self.encode_length(ERROR_SENTINEL);
        stream.write_all(&self.prelude).await?;
        stream.flush().await?;
        Ok(())
    }

    fn encode_length(&mut self, length: i32) {
        self.prelude[RESPONSE_MAGIC.len()..].copy_from_slice(&length.to_le_bytes());
    }
}

impl Default for ResponseWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a response prelude, returning the declared payload length.
///
/// Client-side helper, also used by the tests. Returns the i32 length
/// (which may be the `-1` sentinel) or `None` if the magic tag does not
/// match.
pub fn parse_response_prelude(prelude: &[u8; RESPONSE_PRELUDE_SIZE]) -> Option<i32> {
    if prelude[..RESPONSE_MAGIC.len()] != RESPONSE_MAGIC {
        return None;
    }
    let len = &prelude[RESPONSE_MAGIC.len()..];
    Some(i32::from_le_bytes([len[0], len[1], len[2], len[3]]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn ok_response_layout() {
        let mut writer = ResponseWriter::new();
        let mut stream = Cursor::new(Vec::new());

        writer.write_ok(&mut stream, &[1, 2, 3, 4]).await.unwrap();

        let written = stream.into_inner();
        assert_eq!(&written[..8], &RESPONSE_MAGIC);
        assert_eq!(&written[8..12], &4i32.to_le_bytes());
        assert_eq!(&written[12..], &[1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn error_response_is_sentinel_only() {
        let mut writer = ResponseWriter::new();
        let mut stream = Cursor::new(Vec::new());

        writer.write_error(&mut stream).await.unwrap();

        let written = stream.into_inner();
        assert_eq!(written.len(), RESPONSE_PRELUDE_SIZE);
        assert_eq!(&written[..8], &RESPONSE_MAGIC);
        assert_eq!(&written[8..12], &(-1i32).to_le_bytes());
    }

    #[tokio::test]
    async fn prelude_buffer_reused_across_writes() {
        let mut writer = ResponseWriter::new();
        let mut stream = Cursor::new(Vec::new());

        writer.write_error(&mut stream).await.unwrap();
        writer.write_ok(&mut stream, &[9; 10]).await.unwrap();

        let written = stream.into_inner();
        // Second prelude carries the new length, not the stale sentinel.
        assert_eq!(&written[12..20], &RESPONSE_MAGIC);
        assert_eq!(&written[20..24], &10i32.to_le_bytes());
    }

    #[test]
    fn parse_prelude_roundtrip() {
        let mut prelude = [0u8; RESPONSE_PRELUDE_SIZE];
        prelude[..8].copy_from_slice(&RESPONSE_MAGIC);
        prelude[8..].copy_from_slice(&300i32.to_le_bytes());
        assert_eq!(parse_response_prelude(&prelude), Some(300));

        prelude[0] ^= 0xff;
        assert_eq!(parse_response_prelude(&prelude), None);
    }
}
