//! Operational control plane
//!
//! Long-lived background tasks that keep the runtime state honest: the
//! health prober flipping per-proxy liveness flags, the combo-cache
//! expirer, and the configuration hot reloader. All of them tick on their
//! configured intervals and stop on shutdown.

mod cleanup;
mod health;
mod reload;

pub use cleanup::{expire_stale_caches, spawn_cache_cleanup};
pub use health::{probe, run_probe_round, spawn_health_checks};
pub use reload::{apply_chains, spawn_config_reload};
