//! # segwire
//!
//! A long-lived local TCP server that accepts streaming image-segmentation
//! requests and answers each with a binary mask.
//!
//! ## Architecture
//!
//! - **Protocol** (`protocol`): length-prefixed binary frames over a byte
//!   stream that delivers arbitrary chunk sizes; fixed-layout request
//!   header guarded by a magic tag; framed responses with a `-1` error
//!   sentinel.
//! - **Connection** (`connection`): strict half-duplex request→respond
//!   loop per socket, reusing two scratch buffers sized to the last-seen
//!   resolution.
//! - **Engine** (`engine`): trait seam for the segmentation model and the
//!   mask post-processing; inference is serialized process-wide.
//! - **Bootstrap** (`listener`, `server`): loopback bind with
//!   retry-on-conflict onto a random port, port discovery via a temp-dir
//!   file, graceful drain on shutdown.
//!
//! ## Example
//!
//! ```ignore
//! use segwire::{Config, NoopBackend, Server};
//!
//! #[tokio::main]
//! async fn main() -> segwire::Result<()> {
//!     let server = Server::bind(Config::default(), NoopBackend::engine()).await?;
//!     server.run().await
//! }
//! ```

pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod listener;
pub mod protocol;
pub mod scratch;
pub mod server;

pub use config::{Config, InternalResolution, SegmentationOptions};
pub use engine::{Engine, ImageView, MaskFilter, NoopBackend, SegmentStatus, Segmenter};
pub use error::{Result, SegwireError};
pub use server::{Server, Supervisor};
