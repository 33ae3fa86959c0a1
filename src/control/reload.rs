//! Configuration hot reload
//!
//! A background task that re-reads the configuration file on an interval
//! and swaps the user table. Users whose chain layout and password are
//! unchanged keep their existing `ChainState` so combo caches and live
//! session counts survive the reload; displaced or removed states are
//! retired once their last session ends. A reload that fails to parse or
//! validate is dropped and the previous snapshot stays in effect.

use crate::chain::{ChainState, ChainTable};
use crate::config::{self, UserChainConfig};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Spawn the periodic reloader, unless disabled
pub fn spawn_config_reload(
    path: PathBuf,
    table: Arc<ChainTable>,
    interval_secs: u64,
    shutdown: broadcast::Sender<()>,
) {
    if interval_secs == 0 {
        return;
    }

    tokio::spawn(async move {
        let mut shutdown_rx = shutdown.subscribe();
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => return,
                _ = ticker.tick() => {}
            }

            match config::load_config(&path) {
                Ok(config) => {
                    let count = apply_chains(&table, &config.chains, &shutdown);
                    info!("reloaded {} chains", count);
                }
                Err(e) => warn!("config reload failed: {:#}", e),
            }
        }
    });
}

/// Swap the user table to match `chains`, preserving unchanged states
///
/// Returns the number of published users.
pub fn apply_chains(
    table: &ChainTable,
    chains: &[UserChainConfig],
    shutdown: &broadcast::Sender<()>,
) -> usize {
    let old = table.load();
    let mut updated: HashMap<String, Arc<ChainState>> = HashMap::with_capacity(chains.len());

    for spec in chains {
        match old.get(&spec.username) {
            Some(existing) if existing.matches(spec) => {
                updated.insert(spec.username.clone(), existing.clone());
            }
            Some(displaced) => {
                debug!("chain for user {} changed, replacing", spec.username);
                updated.insert(
                    spec.username.clone(),
                    Arc::new(ChainState::from_config(spec)),
                );
                retire(displaced.clone(), shutdown.clone());
            }
            None => {
                updated.insert(
                    spec.username.clone(),
                    Arc::new(ChainState::from_config(spec)),
                );
            }
        }
    }

    for (username, state) in old.iter() {
        if !updated.contains_key(username) {
            debug!("user {} removed, retiring", username);
            retire(state.clone(), shutdown.clone());
        }
    }

    let count = updated.len();
    table.store(Arc::new(updated));
    count
}

/// Wait for the last session on a displaced state to end, then drop its
/// cache. In-flight sessions keep the state itself alive through their
/// `Arc` references.
fn retire(state: Arc<ChainState>, shutdown: broadcast::Sender<()>) {
    tokio::spawn(async move {
        let mut shutdown_rx = shutdown.subscribe();
        let mut ticker = tokio::time::interval(Duration::from_millis(100));
        loop {
            if state.refs() <= 0 {
                state.invalidate_cache();
                return;
            }
            tokio::select! {
                _ = shutdown_rx.recv() => return,
                _ = ticker.tick() => {}
            }
        }
    });
}
