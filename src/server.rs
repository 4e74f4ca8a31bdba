//! Server lifecycle: accept loop, supervision, graceful shutdown.
//!
//! One task per accepted connection. A process-wide frame counter feeds
//! the optional `max_frames` safety valve: once the cap is reached the
//! listener closes and in-flight connections drain instead of the process
//! being killed mid-write.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::connection::Connection;
use crate::engine::Engine;
use crate::error::Result;
use crate::listener::{bind_with_retry, port_file_path, publish_port};

/// Process-wide frame accounting and shutdown signalling.
///
/// Cloned into every connection; all clones share the counter and the
/// shutdown channel.
#[derive(Clone)]
pub struct Supervisor {
    frames: Arc<AtomicU64>,
    max_frames: Option<u64>,
    shutdown: watch::Sender<bool>,
}

impl Supervisor {
    /// Create a supervisor with an optional frame cap.
    pub fn new(max_frames: Option<u64>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            frames: Arc::new(AtomicU64::new(0)),
            max_frames,
            shutdown,
        }
    }

    /// Count one completed request. Reaching the configured cap triggers
    /// shutdown. Returns the frame's ordinal.
    pub fn record_frame(&self) -> u64 {
        let frame_no = self.frames.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(cap) = self.max_frames {
            if frame_no >= cap {
                info!(frame_no, cap, "frame cap reached, shutting down");
                self.trigger_shutdown();
            }
        }
        frame_no
    }

    /// Total frames processed across all connections.
    pub fn frames_processed(&self) -> u64 {
        self.frames.load(Ordering::SeqCst)
    }

    /// Request a graceful shutdown: stop accepting, drain connections.
    pub fn trigger_shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Whether shutdown has been requested.
    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Receiver resolving when shutdown is requested.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }
}

/// The segmentation server.
pub struct Server {
    listener: TcpListener,
    engine: Engine,
    config: Config,
    supervisor: Supervisor,
}

impl Server {
    /// Bind the listener (with conflict retry) and publish the bound port
    /// to the discovery file.
    pub async fn bind(config: Config, engine: Engine) -> Result<Self> {
        let listener = bind_with_retry(config.port).await?;
        let port = listener.local_addr()?.port();
        publish_port(&port_file_path(), port);

        let supervisor = Supervisor::new(config.max_frames);
        Ok(Self {
            listener,
            engine,
            config,
            supervisor,
        })
    }

    /// Port the server actually bound.
    pub fn port(&self) -> Result<u16> {
        Ok(self.listener.local_addr()?.port())
    }

    /// Handle for external shutdown (signal handlers, tests).
    pub fn supervisor(&self) -> Supervisor {
        self.supervisor.clone()
    }

    /// Accept connections until shutdown, then drain in-flight ones.
    pub async fn run(self) -> Result<()> {
        let mut shutdown = self.supervisor.subscribe();
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, addr) = accepted?;
                    info!(%addr, "accepted connection");

                    let connection = Connection::new(
                        stream,
                        self.engine.clone(),
                        &self.config,
                        self.supervisor.clone(),
                    );
                    connections.spawn(async move {
                        if let Err(e) = connection.run().await {
                            error!(%addr, "connection error: {}", e);
                        } else {
                            debug!(%addr, "connection closed");
                        }
                    });
                }
                _ = shutdown.changed() => {
                    info!("shutdown requested, draining connections");
                    break;
                }
            }
        }

        // Listener closes on drop; connections observe the shutdown signal
        // between iterations and finish their in-flight request first.
        drop(self.listener);
        while connections.join_next().await.is_some() {}
        info!(
            frames = self.supervisor.frames_processed(),
            "server stopped"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supervisor_counts_frames() {
        let supervisor = Supervisor::new(None);
        assert_eq!(supervisor.record_frame(), 1);
        assert_eq!(supervisor.record_frame(), 2);
        assert_eq!(supervisor.frames_processed(), 2);
        assert!(!supervisor.is_shutting_down());
    }

    #[test]
    fn supervisor_cap_triggers_shutdown() {
        let supervisor = Supervisor::new(Some(3));
        supervisor.record_frame();
        supervisor.record_frame();
        assert!(!supervisor.is_shutting_down());
        supervisor.record_frame();
        assert!(supervisor.is_shutting_down());
    }

    #[test]
    fn supervisor_clones_share_state() {
        let supervisor = Supervisor::new(None);
        let clone = supervisor.clone();
        supervisor.record_frame();
        assert_eq!(clone.frames_processed(), 1);

        clone.trigger_shutdown();
        assert!(supervisor.is_shutting_down());
    }

    #[tokio::test]
    async fn subscribe_observes_trigger() {
        let supervisor = Supervisor::new(None);
        let mut rx = supervisor.subscribe();
        supervisor.trigger_shutdown();
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }
}
