use clap::Parser;
use segwire::{Config, NoopBackend, Result, Server};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Preferred listen port (falls back to a random port on conflict)
    #[arg(short, long)]
    port: Option<u16>,

    /// Shut down gracefully after this many frames
    #[arg(long)]
    max_frames: Option<u64>,

    /// Path to a JSON config file
    #[arg(short, long)]
    config: Option<String>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(max_frames) = args.max_frames {
        config.max_frames = Some(max_frames);
    }

    tracing::info!("segwire starting");
    tracing::info!("preferred port: {}", config.port);
    if let Some(cap) = config.max_frames {
        tracing::info!("frame cap: {}", cap);
    }

    let server = Server::bind(config, NoopBackend::engine()).await?;
    let supervisor = server.supervisor();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, shutting down");
            supervisor.trigger_shutdown();
        }
    });

    server.run().await
}
