//! Upstream health probing
//!
//! A background task that periodically opens a TCP connection to every
//! proxy in the published table and flips liveness flags on the outcome.
//! Probes run under a bounded concurrency cap so a large table does not
//! burst thousands of dials at once.

use crate::chain::{ChainTable, Proxy};
use crate::config::GeneralConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, Semaphore};
use tracing::{info, warn};

/// Spawn the periodic health prober
pub fn spawn_health_checks(
    table: Arc<ChainTable>,
    config: GeneralConfig,
    shutdown: broadcast::Sender<()>,
) {
    tokio::spawn(async move {
        let mut shutdown_rx = shutdown.subscribe();
        let mut ticker =
            tokio::time::interval(Duration::from_secs(config.health_check_interval));
        // The first tick fires immediately; skip it so probing starts one
        // interval after startup.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => return,
                _ = ticker.tick() => {}
            }
            run_probe_round(&table, &config).await;
        }
    });
}

/// Probe every proxy reachable from the current snapshot once
pub async fn run_probe_round(table: &ChainTable, config: &GeneralConfig) {
    let snapshot = table.load();
    let mut proxies: Vec<Arc<Proxy>> = Vec::new();
    for state in snapshot.values() {
        for hop in &state.chain {
            proxies.extend(hop.proxies.iter().cloned());
        }
    }

    let limit = Duration::from_secs(config.health_check_timeout);
    let semaphore = Arc::new(Semaphore::new(config.health_check_concurrency));
    let mut handles = Vec::with_capacity(proxies.len());
    for proxy in proxies {
        let semaphore = semaphore.clone();
        handles.push(tokio::spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return;
            };
            probe(&proxy, limit).await;
        }));
    }
    for handle in handles {
        let _ = handle.await;
    }
}

/// Probe one proxy and record the transition, if any
///
/// Transitions are logged exactly once: repeating the same outcome keeps
/// the flag and stays quiet.
pub async fn probe(proxy: &Proxy, limit: Duration) {
    let alive = match tokio::time::timeout(limit, TcpStream::connect(proxy.addr())).await {
        Ok(Ok(_conn)) => true,
        Ok(Err(e)) => {
            warn!("proxy {} health check error: {}", proxy.label(), e);
            false
        }
        Err(_) => {
            warn!(
                "proxy {} health check error: timed out after {:?}",
                proxy.label(),
                limit
            );
            false
        }
    };

    if alive != proxy.is_alive() {
        if alive {
            info!("proxy {} recovered", proxy.label());
        } else {
            warn!("proxy {} marked dead", proxy.label());
        }
        proxy.set_alive(alive);
    }
}
