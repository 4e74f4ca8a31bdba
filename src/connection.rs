//! Per-connection request/response loop.
//!
//! Each accepted socket runs one `Connection`, strictly sequential:
//! read a complete frame, decode it, segment, post-process, respond,
//! repeat. The next frame is not read until the current response has been
//! fully written. Protocol violations tear the connection down; an
//! undecodable image answers with the error sentinel and the loop
//! continues.

use std::collections::VecDeque;
use std::time::Instant;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tracing::debug;

use crate::config::{Config, SegmentationOptions};
use crate::engine::{Engine, ImageView, SegmentStatus};
use crate::error::{Result, SegwireError};
use crate::protocol::{FrameBuffer, ResponseWriter, SegmentationRequest};
use crate::scratch::ScratchBuffers;
use crate::server::Supervisor;

/// Socket read chunk size.
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// One connection's protocol state machine.
///
/// Generic over the stream so tests can drive it with
/// `tokio::io::duplex` instead of a real socket.
pub struct Connection<S> {
    stream: S,
    frames: FrameBuffer,
    pending: VecDeque<Bytes>,
    read_buf: Vec<u8>,
    scratch: ScratchBuffers,
    writer: ResponseWriter,
    engine: Engine,
    options: SegmentationOptions,
    supervisor: Supervisor,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Build the per-socket state for a freshly accepted connection.
    pub fn new(stream: S, engine: Engine, config: &Config, supervisor: Supervisor) -> Self {
        Self {
            stream,
            frames: FrameBuffer::with_max_frame_size(config.max_frame_size),
            pending: VecDeque::new(),
            read_buf: vec![0u8; READ_CHUNK_SIZE],
            scratch: ScratchBuffers::new(),
            writer: ResponseWriter::new(),
            engine,
            options: config.segmentation.clone(),
            supervisor,
        }
    }

    /// Run the request/response loop until peer close, shutdown, or error.
    ///
    /// Returns `Ok(())` on graceful exit. Any error means the socket is no
    /// longer usable; dropping `self` force-closes it. Scratch buffers are
    /// released on every exit path, since they live in `self`.
    pub async fn run(mut self) -> Result<()> {
        let mut shutdown = self.supervisor.subscribe();
        loop {
            if self.supervisor.is_shutting_down() {
                debug!("shutdown signalled, closing connection");
                return Ok(());
            }

            // An idle connection must not hold up draining, so the wait
            // for the next request races against the shutdown signal. An
            // in-flight request is never abandoned: once a frame is
            // handed out, processing and the response run to completion.
            let body = tokio::select! {
                next = self.next_frame() => match next? {
                    Some(body) => body,
                    None => {
                        debug!("peer closed connection");
                        return Ok(());
                    }
                },
                _ = shutdown.changed() => {
                    debug!("shutdown signalled, closing idle connection");
                    return Ok(());
                }
            };

            self.handle_request(body).await?;
        }
    }

    /// Read chunks until one complete frame body is available.
    ///
    /// Returns `None` when the peer closes the stream. A close with a
    /// partially accumulated frame still counts as a graceful exit.
    async fn next_frame(&mut self) -> Result<Option<Bytes>> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Ok(Some(frame));
            }

            let n = self.stream.read(&mut self.read_buf).await?;
            if n == 0 {
                if self.frames.mid_frame() {
                    debug!("peer closed mid-frame, discarding partial data");
                }
                return Ok(None);
            }

            let frames = self.frames.push(&self.read_buf[..n])?;
            self.pending.extend(frames);
        }
    }

    /// Decode, process and answer a single request.
    async fn handle_request(&mut self, body: Bytes) -> Result<()> {
        let started = Instant::now();

        let request = SegmentationRequest::decode(&body)?;
        if request.pixels.len() != request.expected_pixel_len() {
            return Err(SegwireError::Protocol(format!(
                "pixel payload length {} does not match {}x{}x3",
                request.pixels.len(),
                request.height,
                request.width
            )));
        }

        let height = request.height as usize;
        let width = request.width as usize;
        let options = self.options.with_threshold(request.threshold);

        let (image, mask) = self.scratch.acquire(request.height, request.width);
        image.copy_from_slice(&request.pixels);

        let inference_start = Instant::now();
        let status = self
            .engine
            .segment(
                ImageView {
                    data: image,
                    height,
                    width,
                },
                &options,
                mask,
            )
            .await?;
        debug!(elapsed = ?inference_start.elapsed(), "segmentation finished");

        if status == SegmentStatus::Undecodable {
            self.writer.write_error(&mut self.stream).await?;
            let frame_no = self.supervisor.record_frame();
            debug!(frame_no, "image undecodable, sent error sentinel");
            return Ok(());
        }

        let post_start = Instant::now();
        let filter = self.engine.filter();
        filter.threshold(mask, height, width)?;
        if request.growshrink > 0 {
            filter.dilate(mask, height, width, request.growshrink.unsigned_abs())?;
        } else if request.growshrink < 0 {
            filter.erode(mask, height, width, request.growshrink.unsigned_abs())?;
        }
        if request.blur > 0 {
            let kernel = request.blur.unsigned_abs() * 2 + 1;
            filter.gaussian_blur(mask, height, width, kernel)?;
        }
        debug!(elapsed = ?post_start.elapsed(), "post-processing finished");

        self.writer.write_ok(&mut self.stream, mask).await?;

        let frame_no = self.supervisor.record_frame();
        debug!(frame_no, elapsed = ?started.elapsed(), "response written");
        Ok(())
    }
}
