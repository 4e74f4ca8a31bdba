//! Wire format encoding and decoding.
//!
//! Every request frame starts with a 4-byte little-endian length covering
//! the whole frame, prefix included. The frame body is:
//!
//! ```text
//! ┌───────────┬───────────┬────────┬────────┬────────┬────────────┬─────────┐
//! │ Magic tag │ Threshold │ Height │ Width  │ Blur   │ Growshrink │ Pixels  │
//! │ 8 bytes   │ 4 bytes   │ 2 bytes│ 2 bytes│ 2 bytes│ 2 bytes    │ h*w*3   │
//! │ fixed     │ f32 LE    │ i16 LE │ i16 LE │ i16 LE │ i16 LE     │ u8      │
//! └───────────┴───────────┴────────┴────────┴────────┴────────────┴─────────┘
//! ```
//!
//! All multi-byte integers are Little Endian. Responses carry no outer
//! length prefix: magic tag (8 bytes), then an i32 LE payload length
//! (`-1` = error sentinel, no payload), then the mask bytes.

use bytes::Bytes;

use crate::error::{Result, SegwireError};

/// Magic tag opening every request body.
pub const REQUEST_MAGIC: [u8; 8] = [0xee, 0x61, 0xbe, 0xc4, 0x38, 0xd2, 0x56, 0xa9];

/// Magic tag opening every response.
pub const RESPONSE_MAGIC: [u8; 8] = [0x50, 0x77, 0x3d, 0xda, 0xc8, 0x7d, 0x5d, 0x97];

/// Size of the leading frame-length field.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Size of the fixed request header inside the frame body (magic through
/// growshrink, pixels excluded).
pub const REQUEST_HEADER_SIZE: usize = 20;

/// Length value signalling that the image could not be decoded upstream.
pub const ERROR_SENTINEL: i32 = -1;

/// Default maximum frame size (64 MB). Covers 8K RGB frames with room to
/// spare while still rejecting garbage length prefixes early.
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 64 * 1024 * 1024;

/// A decoded segmentation request.
///
/// The pixel payload is held as [`Bytes`], sliced zero-copy out of the
/// frame body.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationRequest {
    /// Per-request confidence threshold override.
    pub threshold: f32,
    /// Image height in pixels.
    pub height: i16,
    /// Image width in pixels.
    pub width: i16,
    /// Gaussian blur radius, 0 = disabled. Kernel size is `2 * blur + 1`.
    pub blur: i16,
    /// Positive = dilate radius, negative = erode radius, 0 = none.
    pub growshrink: i16,
    /// Interleaved 3-channel pixel data, expected `height * width * 3` bytes.
    pub pixels: Bytes,
}

impl SegmentationRequest {
    /// Decode a complete frame body into a request.
    ///
    /// Validates the magic tag first; a mismatch means the stream is
    /// desynchronized and the caller must close the connection. Field
    /// values are read at fixed little-endian offsets.
    ///
    /// The pixel payload length is NOT checked here; callers must compare
    /// `pixels.len()` against [`expected_pixel_len`](Self::expected_pixel_len)
    /// before handing the payload to the scratch buffers.
    pub fn decode(body: &Bytes) -> Result<Self> {
        if body.len() < 8 || body[..8] != REQUEST_MAGIC {
            return Err(SegwireError::InvalidMagic);
        }
        if body.len() < REQUEST_HEADER_SIZE {
            return Err(SegwireError::Protocol(format!(
                "frame body too short for request header: {} < {}",
                body.len(),
                REQUEST_HEADER_SIZE
            )));
        }

        let threshold = f32::from_le_bytes([body[8], body[9], body[10], body[11]]);
        let height = i16::from_le_bytes([body[12], body[13]]);
        let width = i16::from_le_bytes([body[14], body[15]]);
        let blur = i16::from_le_bytes([body[16], body[17]]);
        let growshrink = i16::from_le_bytes([body[18], body[19]]);

        if height < 0 || width < 0 {
            return Err(SegwireError::Protocol(format!(
                "negative image dimensions: {}x{}",
                height, width
            )));
        }

        Ok(Self {
            threshold,
            height,
            width,
            blur,
            growshrink,
            pixels: body.slice(REQUEST_HEADER_SIZE..),
        })
    }

    /// Expected pixel payload length, `height * width * 3`.
    #[inline]
    pub fn expected_pixel_len(&self) -> usize {
        self.height as usize * self.width as usize * 3
    }

    /// Mask length for this request's resolution, `height * width`.
    #[inline]
    pub fn mask_len(&self) -> usize {
        self.height as usize * self.width as usize
    }

    /// Encode this request as a complete frame, length prefix included.
    ///
    /// This is the client-side counterpart of [`decode`](Self::decode) and
    /// is also what the tests use to drive the server.
    pub fn encode(&self) -> Vec<u8> {
        let total = LENGTH_PREFIX_SIZE + REQUEST_HEADER_SIZE + self.pixels.len();
        let mut buf = Vec::with_capacity(total);
        buf.extend_from_slice(&(total as u32).to_le_bytes());
        buf.extend_from_slice(&REQUEST_MAGIC);
        buf.extend_from_slice(&self.threshold.to_le_bytes());
        buf.extend_from_slice(&self.height.to_le_bytes());
        buf.extend_from_slice(&self.width.to_le_bytes());
        buf.extend_from_slice(&self.blur.to_le_bytes());
        buf.extend_from_slice(&self.growshrink.to_le_bytes());
        buf.extend_from_slice(&self.pixels);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request(height: i16, width: i16) -> SegmentationRequest {
        let pixels: Vec<u8> = (0..height as usize * width as usize * 3)
            .map(|i| (i % 251) as u8)
            .collect();
        SegmentationRequest {
            threshold: 0.7,
            height,
            width,
            blur: 2,
            growshrink: -1,
            pixels: Bytes::from(pixels),
        }
    }

    #[test]
    fn magic_constants_match_client_contract() {
        assert_eq!(
            REQUEST_MAGIC,
            [0xee, 0x61, 0xbe, 0xc4, 0x38, 0xd2, 0x56, 0xa9]
        );
        assert_eq!(
            RESPONSE_MAGIC,
            [0x50, 0x77, 0x3d, 0xda, 0xc8, 0x7d, 0x5d, 0x97]
        );
    }

    #[test]
    fn encode_decode_roundtrip() {
        let original = sample_request(480, 640);
        let frame = original.encode();

        // Strip the length prefix, decode the body.
        let body = Bytes::copy_from_slice(&frame[LENGTH_PREFIX_SIZE..]);
        let decoded = SegmentationRequest::decode(&body).unwrap();

        assert_eq!(decoded, original);
        assert_eq!(decoded.threshold, 0.7);
        assert_eq!(decoded.height, 480);
        assert_eq!(decoded.width, 640);
        assert_eq!(decoded.blur, 2);
        assert_eq!(decoded.growshrink, -1);
        assert_eq!(decoded.pixels.len(), decoded.expected_pixel_len());
    }

    #[test]
    fn length_prefix_covers_whole_frame() {
        let frame = sample_request(2, 2).encode();
        let declared = u32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]);
        assert_eq!(declared as usize, frame.len());
        assert_eq!(
            frame.len(),
            LENGTH_PREFIX_SIZE + REQUEST_HEADER_SIZE + 2 * 2 * 3
        );
    }

    #[test]
    fn field_byte_order_is_little_endian() {
        let request = SegmentationRequest {
            threshold: 1.0,
            height: 0x0102,
            width: 0x0304,
            blur: 0x0506,
            growshrink: 0x0708,
            pixels: Bytes::new(),
        };
        let frame = request.encode();
        let body = &frame[LENGTH_PREFIX_SIZE..];

        assert_eq!(&body[..8], &REQUEST_MAGIC);
        // f32 1.0 = 0x3f800000 LE
        assert_eq!(&body[8..12], &[0x00, 0x00, 0x80, 0x3f]);
        assert_eq!(&body[12..14], &[0x02, 0x01]);
        assert_eq!(&body[14..16], &[0x04, 0x03]);
        assert_eq!(&body[16..18], &[0x06, 0x05]);
        assert_eq!(&body[18..20], &[0x08, 0x07]);
    }

    #[test]
    fn bad_magic_rejected() {
        let mut frame = sample_request(2, 2).encode();
        frame[LENGTH_PREFIX_SIZE] ^= 0xff;
        let body = Bytes::copy_from_slice(&frame[LENGTH_PREFIX_SIZE..]);
        let err = SegmentationRequest::decode(&body).unwrap_err();
        assert!(matches!(err, SegwireError::InvalidMagic));
        assert!(err.is_protocol_violation());
    }

    #[test]
    fn every_flipped_magic_byte_rejected() {
        let frame = sample_request(1, 1).encode();
        for i in 0..8 {
            let mut corrupted = frame[LENGTH_PREFIX_SIZE..].to_vec();
            corrupted[i] = corrupted[i].wrapping_add(1);
            let err = SegmentationRequest::decode(&Bytes::from(corrupted)).unwrap_err();
            assert!(matches!(err, SegwireError::InvalidMagic), "byte {}", i);
        }
    }

    #[test]
    fn truncated_header_rejected() {
        let frame = sample_request(1, 1).encode();
        // Magic intact but header cut short.
        let body = Bytes::copy_from_slice(&frame[LENGTH_PREFIX_SIZE..LENGTH_PREFIX_SIZE + 12]);
        let err = SegmentationRequest::decode(&body).unwrap_err();
        assert!(matches!(err, SegwireError::Protocol(_)));
    }

    #[test]
    fn negative_dimensions_rejected() {
        let request = SegmentationRequest {
            threshold: 0.5,
            height: -480,
            width: 640,
            blur: 0,
            growshrink: 0,
            pixels: Bytes::new(),
        };
        let frame = request.encode();
        let body = Bytes::copy_from_slice(&frame[LENGTH_PREFIX_SIZE..]);
        let err = SegmentationRequest::decode(&body).unwrap_err();
        assert!(matches!(err, SegwireError::Protocol(_)));
    }

    #[test]
    fn pixel_slice_is_zero_copy_view() {
        let original = sample_request(4, 4);
        let frame = original.encode();
        let body = Bytes::copy_from_slice(&frame[LENGTH_PREFIX_SIZE..]);
        let decoded = SegmentationRequest::decode(&body).unwrap();
        assert_eq!(decoded.pixels, original.pixels);
        assert_eq!(decoded.mask_len(), 16);
    }
}
