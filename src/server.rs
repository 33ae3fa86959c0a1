//! Accept loop and admission control
//!
//! One task per accepted connection, bounded by a semaphore of
//! `max_connections` permits. When the gateway is saturated new accepts
//! are closed immediately instead of queueing, so the accept loop never
//! stalls. Each session captures the user-table snapshot current at accept
//! time and keeps it for its whole lifetime.

use crate::chain::ChainTable;
use crate::config::GeneralConfig;
use crate::socks::handle_conn;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Semaphore};
use tracing::{info, warn};

/// Run the accept loop until shutdown, then drain in-flight sessions
pub async fn run_server(
    listener: TcpListener,
    config: GeneralConfig,
    table: Arc<ChainTable>,
    shutdown: broadcast::Sender<()>,
) {
    let limiter = Arc::new(Semaphore::new(config.max_connections));
    let mut shutdown_rx = shutdown.subscribe();

    loop {
        let accepted = tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => accepted,
        };

        let (conn, peer) = match accepted {
            Ok(pair) => pair,
            Err(e) => {
                warn!("accept failed: {}", e);
                continue;
            }
        };

        let permit = match limiter.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!("connection limit reached, closing connection from {}", peer);
                continue;
            }
        };

        info!("connection from {}", peer);
        let snapshot = table.load();
        let session_config = config.clone();
        let session_shutdown = shutdown.clone();
        tokio::spawn(async move {
            handle_conn(conn, peer, snapshot, session_config, session_shutdown).await;
            drop(permit);
        });
    }

    info!("listener stopped, draining sessions");
    let _ = limiter.acquire_many(config.max_connections as u32).await;
}
