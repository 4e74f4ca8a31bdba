//! Listener bootstrap and port discovery.
//!
//! Binds a preferred port on loopback. On a bind conflict it backs off
//! briefly, draws a pseudo-random alternate port and retries, with no
//! retry cap (under persistent conflicts this loops forever; a cap or
//! exponential backoff is deliberately not added here). The bound port is
//! then published to a well-known temp-directory file so the companion
//! client process can discover it.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;

use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::error::Result;

/// Name of the discovery file inside the temp directory.
pub const PORT_FILE_NAME: &str = ".segmentation.port";

/// Delay before retrying after a bind conflict.
pub const BIND_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Range alternate ports are drawn from.
pub const PORT_RANGE: std::ops::Range<u16> = 1024..32767;

/// Draw a pseudo-random alternate port.
fn random_port() -> u16 {
    StdRng::from_os_rng().random_range(PORT_RANGE)
}

/// Bind a loopback listener, retrying on conflicts.
///
/// The preferred port is tried first; every `AddrInUse` failure waits out
/// the backoff and retries on a fresh random port. Other bind errors
/// propagate immediately.
pub async fn bind_with_retry(preferred_port: u16) -> Result<TcpListener> {
    let mut port = preferred_port;
    loop {
        match TcpListener::bind(("127.0.0.1", port)).await {
            Ok(listener) => {
                info!(port = listener.local_addr()?.port(), "listening on loopback");
                return Ok(listener);
            }
            Err(e) if e.kind() == ErrorKind::AddrInUse => {
                warn!(port, "port in use, retrying on a random port");
                tokio::time::sleep(BIND_RETRY_DELAY).await;
                port = random_port();
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Path of the discovery file: `${TMPDIR:-/tmp}/.segmentation.port`.
pub fn port_file_path() -> PathBuf {
    std::env::temp_dir().join(PORT_FILE_NAME)
}

/// Publish the bound port as a 4-byte little-endian integer.
///
/// Best-effort: the port is already usable even if persistence fails, so
/// errors are logged and swallowed. Overwrites any previous value, which
/// also covers bootstrap retries landing on a different port.
pub fn publish_port(path: &std::path::Path, port: u16) {
    let bytes = (port as i32).to_le_bytes();
    if let Err(e) = std::fs::write(path, bytes) {
        warn!(path = %path.display(), "failed to publish port: {}", e);
    } else {
        info!(path = %path.display(), port, "published port");
    }
}
