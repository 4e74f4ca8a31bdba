//! Segmentation engine seam.
//!
//! The model and the mask post-processing live behind traits so backends
//! can be swapped without touching the protocol loop. The crate itself
//! ships only [`NoopBackend`]; real inference is an external integration.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::SegmentationOptions;
use crate::error::Result;

/// Borrowed view of an interleaved 3-channel source image.
#[derive(Debug, Clone, Copy)]
pub struct ImageView<'a> {
    /// Pixel data, `height * width * 3` bytes.
    pub data: &'a [u8],
    /// Image height in pixels.
    pub height: usize,
    /// Image width in pixels.
    pub width: usize,
}

/// Outcome of a segmentation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentStatus {
    /// A mask was written into the output buffer.
    Produced,
    /// The source bytes could not be decoded into an image. Recoverable:
    /// the connection answers with the error sentinel and moves on.
    Undecodable,
}

/// Person-segmentation model contract.
///
/// Implementations write one mask byte per pixel into `mask`
/// (`height * width` bytes) and report whether the image was usable.
pub trait Segmenter: Send + Sync {
    fn segment(
        &self,
        image: ImageView<'_>,
        options: &SegmentationOptions,
        mask: &mut [u8],
    ) -> Result<SegmentStatus>;
}

/// In-place mask post-processing contract.
///
/// All operations mutate a 1-channel `height * width` buffer.
pub trait MaskFilter: Send + Sync {
    /// Binarize the raw model output.
    fn threshold(&self, mask: &mut [u8], height: usize, width: usize) -> Result<()>;

    /// Morphological dilation with the given radius.
    fn dilate(&self, mask: &mut [u8], height: usize, width: usize, radius: u16) -> Result<()>;

    /// Morphological erosion with the given radius.
    fn erode(&self, mask: &mut [u8], height: usize, width: usize, radius: u16) -> Result<()>;

    /// Gaussian blur with the given (odd) kernel size.
    fn gaussian_blur(&self, mask: &mut [u8], height: usize, width: usize, kernel: u16)
        -> Result<()>;
}

/// Shared handle bundling the model, the mask filters and the inference
/// gate.
///
/// The underlying native inference library is not assumed safe for
/// concurrent invocation, so [`segment`](Engine::segment) serializes all
/// calls process-wide behind a single-slot async mutex. Mask filtering
/// operates on connection-owned buffers and needs no such gate.
#[derive(Clone)]
pub struct Engine {
    segmenter: Arc<dyn Segmenter>,
    filter: Arc<dyn MaskFilter>,
    gate: Arc<Mutex<()>>,
}

impl Engine {
    /// Create an engine around the given backend implementations.
    pub fn new(segmenter: Arc<dyn Segmenter>, filter: Arc<dyn MaskFilter>) -> Self {
        Self {
            segmenter,
            filter,
            gate: Arc::new(Mutex::new(())),
        }
    }

    /// Run the model on `image`, writing the mask into `mask`.
    pub async fn segment(
        &self,
        image: ImageView<'_>,
        options: &SegmentationOptions,
        mask: &mut [u8],
    ) -> Result<SegmentStatus> {
        let _slot = self.gate.lock().await;
        self.segmenter.segment(image, options, mask)
    }

    /// The mask post-processing backend.
    pub fn filter(&self) -> &dyn MaskFilter {
        &*self.filter
    }
}

/// Development backend: marks every pixel foreground and leaves masks
/// untouched by filtering.
///
/// Exists so the binary runs standalone and the protocol tests have a
/// deterministic double; it implements the contracts, not the algorithms.
#[derive(Debug, Default)]
pub struct NoopBackend;

impl NoopBackend {
    /// Engine wired entirely to this backend.
    pub fn engine() -> Engine {
        let backend = Arc::new(NoopBackend);
        Engine::new(backend.clone(), backend)
    }
}

impl Segmenter for NoopBackend {
    fn segment(
        &self,
        _image: ImageView<'_>,
        _options: &SegmentationOptions,
        mask: &mut [u8],
    ) -> Result<SegmentStatus> {
        mask.fill(255);
        Ok(SegmentStatus::Produced)
    }
}

impl MaskFilter for NoopBackend {
    fn threshold(&self, _mask: &mut [u8], _height: usize, _width: usize) -> Result<()> {
        Ok(())
    }

    fn dilate(&self, _mask: &mut [u8], _height: usize, _width: usize, _radius: u16) -> Result<()> {
        Ok(())
    }

    fn erode(&self, _mask: &mut [u8], _height: usize, _width: usize, _radius: u16) -> Result<()> {
        Ok(())
    }

    fn gaussian_blur(
        &self,
        _mask: &mut [u8],
        _height: usize,
        _width: usize,
        _kernel: u16,
    ) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_backend_fills_mask() {
        let engine = NoopBackend::engine();
        let image = vec![0u8; 4 * 4 * 3];
        let mut mask = vec![0u8; 4 * 4];

        let status = engine
            .segment(
                ImageView {
                    data: &image,
                    height: 4,
                    width: 4,
                },
                &SegmentationOptions::default(),
                &mut mask,
            )
            .await
            .unwrap();

        assert_eq!(status, SegmentStatus::Produced);
        assert!(mask.iter().all(|&b| b == 255));
    }

    #[tokio::test]
    async fn gate_serializes_inference() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        /// Backend that trips if two calls overlap.
        struct Overlapping {
            in_flight: AtomicUsize,
        }

        impl Segmenter for Overlapping {
            fn segment(
                &self,
                _image: ImageView<'_>,
                _options: &SegmentationOptions,
                mask: &mut [u8],
            ) -> Result<SegmentStatus> {
                let active = self.in_flight.fetch_add(1, Ordering::SeqCst);
                assert_eq!(active, 0, "concurrent inference invocation");
                std::thread::sleep(std::time::Duration::from_millis(2));
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                mask.fill(1);
                Ok(SegmentStatus::Produced)
            }
        }

        let engine = Engine::new(
            Arc::new(Overlapping {
                in_flight: AtomicUsize::new(0),
            }),
            Arc::new(NoopBackend),
        );

        let mut tasks = Vec::new();
        for _ in 0..4 {
            let engine = engine.clone();
            tasks.push(tokio::spawn(async move {
                let image = vec![0u8; 3];
                let mut mask = vec![0u8; 1];
                engine
                    .segment(
                        ImageView {
                            data: &image,
                            height: 1,
                            width: 1,
                        },
                        &SegmentationOptions::default(),
                        &mut mask,
                    )
                    .await
                    .unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
    }
}
