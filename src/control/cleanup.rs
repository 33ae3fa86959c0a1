//! Combo-cache expiry
//!
//! A background task that walks every published chain state on an interval
//! and drops combo caches that have not carried a session within the TTL.
//! The sweep interval doubles as the TTL; an interval of zero disables the
//! task entirely.

use crate::chain::ChainTable;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::debug;

/// Spawn the periodic cache expirer, unless disabled
pub fn spawn_cache_cleanup(
    table: Arc<ChainTable>,
    ttl_secs: u64,
    shutdown: broadcast::Sender<()>,
) {
    if ttl_secs == 0 {
        return;
    }
    let ttl = Duration::from_secs(ttl_secs);

    tokio::spawn(async move {
        let mut shutdown_rx = shutdown.subscribe();
        let mut ticker = tokio::time::interval(ttl);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => return,
                _ = ticker.tick() => {}
            }
            expire_stale_caches(&table, ttl);
        }
    });
}

/// One sweep over the current snapshot
pub fn expire_stale_caches(table: &ChainTable, ttl: Duration) {
    let snapshot = table.load();
    for state in snapshot.values() {
        if state.expire_cache(ttl) {
            debug!("expired combo cache for user {}", state.username());
        }
    }
}
