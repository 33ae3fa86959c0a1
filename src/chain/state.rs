//! Per-user chain state and the published user table
//!
//! A `ChainState` is the runtime record behind one username: the built hop
//! chain, the login password, the last-known-good combo cache, and a
//! live-session refcount that keeps the state valid after it has been
//! displaced by a reload. The `ChainTable` publishes username → state
//! snapshots; readers grab an `Arc` and keep it for the session lifetime.

use crate::chain::proxy::{Hop, Proxy};
use crate::config::UserChainConfig;
use crate::socks::auth::constant_time_compare;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The last proxy combination that produced a working tunnel
#[derive(Debug, Clone)]
pub struct CachedCombo {
    /// One proxy per hop, in chain order
    pub combo: Vec<Arc<Proxy>>,
    /// When the combo last carried a session
    pub last_used: Instant,
}

/// Runtime record for one gateway user
#[derive(Debug)]
pub struct ChainState {
    username: String,
    password: String,
    /// Ordered hops; empty means direct connect
    pub chain: Vec<Arc<Hop>>,
    spec: UserChainConfig,
    cache: RwLock<Option<CachedCombo>>,
    refs: AtomicI32,
}

impl ChainState {
    /// Build the runtime state for one validated user entry
    pub fn from_config(spec: &UserChainConfig) -> Self {
        let chain = spec
            .chain
            .iter()
            .map(|hop| Arc::new(Hop::from_config(hop)))
            .collect();

        ChainState {
            username: spec.username.clone(),
            password: spec.password.clone(),
            chain,
            spec: spec.clone(),
            cache: RwLock::new(None),
            refs: AtomicI32::new(0),
        }
    }

    /// The username this state belongs to
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Compare a password attempt in constant time
    pub fn verify_password(&self, attempt: &[u8]) -> bool {
        constant_time_compare(attempt, self.password.as_bytes())
    }

    /// Whether a reloaded entry is equivalent: same chain layout and
    /// password. Equivalent entries keep their existing state across a
    /// reload so caches and refcounts survive.
    pub fn matches(&self, spec: &UserChainConfig) -> bool {
        self.spec.chain == spec.chain && self.spec.password == spec.password
    }

    /// Register a live session; the returned guard releases on drop
    pub fn acquire(self: &Arc<Self>) -> SessionGuard {
        self.refs.fetch_add(1, Ordering::SeqCst);
        SessionGuard {
            state: self.clone(),
        }
    }

    /// Number of sessions currently holding this state
    pub fn refs(&self) -> i32 {
        self.refs.load(Ordering::SeqCst)
    }

    /// The cached combo, if any
    pub fn cached_combo(&self) -> Option<Vec<Arc<Proxy>>> {
        self.cache.read().as_ref().map(|c| c.combo.clone())
    }

    /// Refresh the cache timestamp after a successful reuse
    pub fn touch_cache(&self) {
        if let Some(cached) = self.cache.write().as_mut() {
            cached.last_used = Instant::now();
        }
    }

    /// Install a fresh combo as the last-known-good selection
    pub fn store_combo(&self, combo: Vec<Arc<Proxy>>) {
        *self.cache.write() = Some(CachedCombo {
            combo,
            last_used: Instant::now(),
        });
    }

    /// Drop the cached combo
    pub fn invalidate_cache(&self) {
        *self.cache.write() = None;
    }

    /// Drop the cached combo when it has been unused longer than `ttl`.
    /// Returns whether an entry was cleared.
    pub fn expire_cache(&self, ttl: Duration) -> bool {
        let mut cache = self.cache.write();
        match cache.as_ref() {
            Some(cached) if cached.last_used.elapsed() > ttl => {
                *cache = None;
                true
            }
            _ => false,
        }
    }
}

/// RAII registration of a live session against a `ChainState`
#[derive(Debug)]
pub struct SessionGuard {
    state: Arc<ChainState>,
}

impl SessionGuard {
    /// The chain state this session is bound to
    pub fn state(&self) -> &Arc<ChainState> {
        &self.state
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.state.refs.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A published username → state snapshot
pub type TableSnapshot = Arc<HashMap<String, Arc<ChainState>>>;

/// The swappable user table
///
/// Readers `load()` the current snapshot under a brief read lock and hold
/// the `Arc` for as long as they need; writers build a complete replacement
/// map and `store()` it in one step. Sessions therefore never observe a
/// half-updated table.
#[derive(Debug)]
pub struct ChainTable {
    inner: RwLock<TableSnapshot>,
}

impl ChainTable {
    /// Build the initial table from validated user entries
    pub fn from_chains(chains: &[UserChainConfig]) -> Self {
        ChainTable {
            inner: RwLock::new(build_snapshot(chains)),
        }
    }

    /// The current snapshot
    pub fn load(&self) -> TableSnapshot {
        self.inner.read().clone()
    }

    /// Publish a new snapshot
    pub fn store(&self, snapshot: TableSnapshot) {
        *self.inner.write() = snapshot;
    }
}

/// Build a fresh snapshot map from validated user entries
pub fn build_snapshot(chains: &[UserChainConfig]) -> TableSnapshot {
    let mut map = HashMap::with_capacity(chains.len());
    for spec in chains {
        map.insert(
            spec.username.clone(),
            Arc::new(ChainState::from_config(spec)),
        );
    }
    Arc::new(map)
}
