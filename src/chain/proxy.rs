//! Upstream proxy endpoints and hop pools
//!
//! A `Proxy` is one upstream SOCKS5 endpoint with an atomically toggled
//! liveness flag; a `Hop` is a pool of interchangeable proxies plus the
//! rotation counters backing its selection strategy.

use crate::config::{HopConfig, ProxyConfig, Strategy};
use rand::seq::SliceRandom;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// One upstream SOCKS5 endpoint
///
/// Everything except the liveness flag is immutable after construction.
/// The flag is flipped by the health prober and by the chain dialer when a
/// hop fails mid-handshake.
#[derive(Debug)]
pub struct Proxy {
    /// Display label, may be empty
    pub name: String,
    /// Hostname or literal IP address
    pub host: String,
    /// TCP port
    pub port: u16,
    /// Optional username for the hop handshake
    pub username: Option<String>,
    /// Optional password for the hop handshake
    pub password: Option<String>,
    /// Priority class for the priority strategy
    pub priority: i32,
    alive: AtomicBool,
}

impl Proxy {
    /// Build a proxy from its validated configuration; starts alive
    pub fn from_config(config: &ProxyConfig) -> Self {
        Proxy {
            name: config.name.clone(),
            host: config.host.clone(),
            port: config.port,
            username: config.username.clone(),
            password: config.password.clone(),
            priority: config.priority,
            alive: AtomicBool::new(true),
        }
    }

    /// Current liveness flag
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    /// Flip the liveness flag
    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::Relaxed);
    }

    /// The `host:port` dial string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The label used in logs: the configured name, or the address when
    /// no name was given
    pub fn label(&self) -> String {
        if self.name.is_empty() {
            self.addr()
        } else {
            self.name.clone()
        }
    }

    /// Whether the hop handshake must offer username/password
    pub fn has_credentials(&self) -> bool {
        self.username.is_some() || self.password.is_some()
    }
}

/// One position in a chain: a pool of interchangeable proxies
#[derive(Debug)]
pub struct Hop {
    /// Selection strategy
    pub strategy: Strategy,
    /// Proxy pool, non-empty after normalization
    pub proxies: Vec<Arc<Proxy>>,
    rr_counter: AtomicU32,
    priority_counters: HashMap<i32, AtomicU32>,
}

impl Hop {
    /// Build a hop from its validated configuration
    pub fn from_config(config: &HopConfig) -> Self {
        let proxies: Vec<Arc<Proxy>> = config
            .normalized_proxies()
            .iter()
            .map(|p| Arc::new(Proxy::from_config(p)))
            .collect();

        let mut priority_counters = HashMap::new();
        for proxy in &proxies {
            priority_counters
                .entry(proxy.priority)
                .or_insert_with(|| AtomicU32::new(0));
        }

        Hop {
            strategy: config.strategy,
            proxies,
            rr_counter: AtomicU32::new(0),
            priority_counters,
        }
    }

    /// The live proxies of this hop in attempt order
    ///
    /// Dead proxies are filtered out first; an empty result means the hop
    /// is currently undialable. Only the rotation counters are mutated, so
    /// concurrent sessions can select freely.
    pub fn ordered_proxies(&self) -> Vec<Arc<Proxy>> {
        let mut live: Vec<Arc<Proxy>> = self
            .proxies
            .iter()
            .filter(|p| p.is_alive())
            .cloned()
            .collect();
        if live.is_empty() {
            return live;
        }

        match self.strategy {
            Strategy::Random => {
                live.shuffle(&mut rand::thread_rng());
                live
            }
            Strategy::Priority => {
                let mut groups: BTreeMap<i32, Vec<Arc<Proxy>>> = BTreeMap::new();
                for proxy in live {
                    groups.entry(proxy.priority).or_default().push(proxy);
                }

                let mut ordered = Vec::with_capacity(self.proxies.len());
                for (priority, mut group) in groups.into_iter().rev() {
                    if group.len() > 1 {
                        if let Some(counter) = self.priority_counters.get(&priority) {
                            let offset = counter.fetch_add(1, Ordering::Relaxed) as usize;
                            let len = group.len();
                            group.rotate_left(offset % len);
                        }
                    }
                    ordered.extend(group);
                }
                ordered
            }
            Strategy::Rr => {
                let offset = self.rr_counter.fetch_add(1, Ordering::Relaxed) as usize;
                let len = live.len();
                live.rotate_left(offset % len);
                live
            }
        }
    }
}
