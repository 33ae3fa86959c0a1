//! Proxy chain machinery
//!
//! Everything between an authenticated session and its upstream tunnel:
//! proxy endpoints with liveness flags, hop pools with selection
//! strategies, per-user chain state with the combo cache, the published
//! user table, the upstream SOCKS5 client, and the backtracking dialer
//! that ties them together.

mod dialer;
mod proxy;
mod state;
mod upstream;

pub use dialer::{connect_through, dial_chain};
pub use proxy::{Hop, Proxy};
pub use state::{build_snapshot, CachedCombo, ChainState, ChainTable, SessionGuard, TableSnapshot};
pub use upstream::connect_proxy;
