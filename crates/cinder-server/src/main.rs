use std::path::PathBuf;

use clap::Parser;
use tracing::error;

use cinder_server::Config;

/// An in-memory key/value server speaking the RESP protocol.
#[derive(Parser, Debug)]
#[command(name = "cinder-server", version, about)]
struct Args {
    /// Path to a redis.conf-style configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Interface to bind (overrides the config file).
    #[arg(long)]
    bind: Option<String>,

    /// TCP port (overrides the config file).
    #[arg(long)]
    port: Option<u16>,

    /// Data directory for the snapshot and append-only log.
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Enable the append-only log.
    #[arg(long)]
    appendonly: bool,

    /// Memory ceiling, e.g. "100mb". 0 means unlimited.
    #[arg(long)]
    maxmemory: Option<String>,

    /// Maximum simultaneous client connections.
    #[arg(long)]
    maxclients: Option<usize>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cinder=info".into()),
        )
        .init();

    let args = Args::parse();

    let mut config = match args.config {
        Some(ref path) => match Config::load(path) {
            Ok(config) => config,
            Err(e) => {
                error!("bad config file: {e}");
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };

    // CLI flags win over the file
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(dir) = args.dir {
        config.dir = dir;
    }
    if args.appendonly {
        config.appendonly = true;
    }
    if let Some(ref maxmemory) = args.maxmemory {
        if let Err(e) = config.apply("maxmemory", maxmemory) {
            error!("bad --maxmemory: {e}");
            std::process::exit(1);
        }
    }
    if let Some(maxclients) = args.maxclients {
        config.maxclients = maxclients;
    }

    if let Err(e) = cinder_server::run(config).await {
        error!("server failed: {e}");
        std::process::exit(1);
    }
}
