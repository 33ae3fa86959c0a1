//! # chainsocks - Multi-User SOCKS5 Chaining Gateway
//!
//! chainsocks is a SOCKS5 server that forwards each authenticated user's
//! TCP CONNECT traffic through that user's own ordered chain of upstream
//! SOCKS5 proxies. Every chain position (hop) can be a pool of
//! interchangeable proxies picked by a round-robin, random or priority
//! strategy, with dead proxies skipped and the last working combination
//! cached per user.
//!
//! ## Features
//!
//! - **Per-User Chains**: each username maps to its own upstream route;
//!   users with an empty chain get plain direct connects
//! - **Failover**: a backtracking dialer walks the per-hop candidate
//!   orders and settles on the first combination that fully connects
//! - **Health Probing**: a background prober flips per-proxy liveness
//!   flags that the selection strategies honor
//! - **Hot Reload**: the user table is rebuilt from disk on an interval
//!   and swapped atomically; unchanged users keep their live state
//!
//! ## Usage
//!
//! ```rust,ignore
//! use chainsocks::chain::ChainTable;
//! use chainsocks::config::load_config;
//! use chainsocks::server::run_server;
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use tokio::sync::broadcast;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config("config.toml")?;
//!     let table = Arc::new(ChainTable::from_chains(&config.chains));
//!     let listener = TcpListener::bind(config.general.listen_addr()).await?;
//!     let (shutdown, _) = broadcast::channel(1);
//!
//!     run_server(listener, config.general, table, shutdown).await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! A session flows through the SOCKS5 handler into the chain dialer, which
//! nests one upstream client handshake per hop inside a single TCP
//! conduit:
//!
//! ```text
//! Client -> chainsocks -> hop 1 -> hop 2 -> ... -> Target
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod chain;
pub mod config;
pub mod control;
pub mod error;
pub(crate) mod helper;
pub mod server;
pub mod socks;

// Re-export commonly used items
pub use config::{load_config, Config};
pub use error::{SessionError, Socks5Error, UpstreamError};

/// Version of the chainsocks library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");
