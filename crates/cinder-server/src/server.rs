//! TCP server: accept loop, connection limits, shared context.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use cinder_persistence::FormatError;
use cinder_protocol::Frame;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::config::Config;
use crate::connection;
use crate::pubsub::PubSubManager;
use crate::registry::Registry;
use crate::store::{self, StoreHandle};

/// Everything a connection handler needs, created once at startup and
/// shared by reference — there are no global singletons.
pub struct ServerContext {
    pub config: Config,
    pub registry: Arc<Registry>,
    pub store: StoreHandle,
    pub pubsub: Arc<PubSubManager>,
    next_conn_id: AtomicU64,
    active_connections: AtomicUsize,
}

impl ServerContext {
    fn next_conn_id(&self) -> u64 {
        self.next_conn_id.fetch_add(1, Ordering::Relaxed)
    }
}

/// Builds the context (recovering persisted state) and runs the accept
/// loop until ctrl-c.
pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let context = build_context(config)?;
    let addr = format!("{}:{}", context.config.bind, context.config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, databases = context.config.databases, "listening");

    serve(listener, Arc::new(context)).await;
    Ok(())
}

/// Recovers state and wires the store, registry, and broker together.
pub fn build_context(config: Config) -> Result<ServerContext, FormatError> {
    let registry = Arc::new(Registry::new());
    let pubsub = Arc::new(PubSubManager::new());
    let store = store::start(&config, registry.clone(), pubsub.clone())?;
    Ok(ServerContext {
        config,
        registry,
        store,
        pubsub,
        next_conn_id: AtomicU64::new(1),
        active_connections: AtomicUsize::new(0),
    })
}

/// The accept loop. Exposed separately so tests can drive it on an
/// ephemeral listener.
pub async fn serve(listener: TcpListener, ctx: Arc<ServerContext>) {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        error!("accept failed: {e}");
                        continue;
                    }
                };

                // over the client limit: reply with the canonical error
                // and close without spawning a session
                let active = ctx.active_connections.fetch_add(1, Ordering::AcqRel) + 1;
                if active > ctx.config.maxclients {
                    ctx.active_connections.fetch_sub(1, Ordering::AcqRel);
                    tokio::spawn(reject_over_limit(stream));
                    continue;
                }

                let ctx = ctx.clone();
                let conn_id = ctx.next_conn_id();
                tokio::spawn(async move {
                    if let Err(e) = connection::handle(stream, ctx.clone(), conn_id).await {
                        error!(%peer, "connection error: {e}");
                    }
                    ctx.active_connections.fetch_sub(1, Ordering::AcqRel);
                });
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
    }
}

async fn reject_over_limit(mut stream: tokio::net::TcpStream) {
    let mut buf = BytesMut::new();
    Frame::Error("ERR max number of clients reached".into()).serialize(&mut buf);
    let _ = stream.write_all(&buf).await;
    let _ = stream.shutdown().await;
}
