//! Per-connection scratch buffers.
//!
//! A connection processes a stream of frames that almost always share one
//! resolution (a fixed camera), so the source-image and mask buffers are
//! retained across requests and only reallocated when `(height, width)`
//! changes. Both buffers always resize together.

/// Reusable source-image and mask buffers owned by one connection.
pub struct ScratchBuffers {
    height: i16,
    width: i16,
    image: Vec<u8>,
    mask: Vec<u8>,
}

impl ScratchBuffers {
    /// Create an empty pool. The first `acquire` allocates.
    pub fn new() -> Self {
        Self {
            height: 0,
            width: 0,
            image: Vec::new(),
            mask: Vec::new(),
        }
    }

    /// Borrow the image buffer (`height * width * 3`) and the mask buffer
    /// (`height * width`) for the given resolution.
    ///
    /// Returns the existing allocations untouched when the resolution
    /// matches the previous request; callers overwrite the contents.
    /// On a resolution change both buffers are dropped and reallocated to
    /// the exact new sizes.
    pub fn acquire(&mut self, height: i16, width: i16) -> (&mut [u8], &mut [u8]) {
        if height != self.height || width != self.width || self.image.is_empty() {
            let pixels = height as usize * width as usize;
            self.image = vec![0u8; pixels * 3];
            self.mask = vec![0u8; pixels];
            self.height = height;
            self.width = width;
        }
        (&mut self.image[..], &mut self.mask[..])
    }

    /// Resolution the buffers are currently sized for.
    pub fn dimensions(&self) -> (i16, i16) {
        (self.height, self.width)
    }
}

impl Default for ScratchBuffers {
    fn default() -> Self {
        Self::new()
    }
}
