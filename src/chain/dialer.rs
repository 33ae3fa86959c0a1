//! Chain dialer
//!
//! Composes upstream handshakes across every hop of a user's chain. A
//! cached last-known-good combo is tried first; otherwise a depth-first
//! backtracking search walks the per-hop candidate orders and stops at the
//! first full tunnel. Dialing is lazy: a combo is only dialed once every
//! earlier hop in it has already succeeded.

use crate::chain::proxy::{Hop, Proxy};
use crate::chain::state::ChainState;
use crate::chain::upstream::connect_proxy;
use crate::error::UpstreamError;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

/// Dial a full tunnel through the user's chain to `final_host:final_port`
///
/// On success the winning proxy selection is stored as the user's combo
/// cache; a failed cached combo is discarded before the search runs.
pub async fn dial_chain(
    state: &ChainState,
    final_host: &str,
    final_port: u16,
    limit: Duration,
) -> Result<TcpStream, UpstreamError> {
    if let Some(combo) = state.cached_combo() {
        match connect_through(&combo, final_host, final_port, limit).await {
            Ok(conn) => {
                state.touch_cache();
                return Ok(conn);
            }
            Err(e) => {
                debug!("cached combo for {} failed: {}", state.username(), e);
                state.invalidate_cache();
            }
        }
    }

    let mut current = Vec::with_capacity(state.chain.len());
    let conn = dial_recursive(
        &state.chain,
        0,
        &mut current,
        final_host,
        final_port,
        limit,
    )
    .await?;
    state.store_combo(current);
    Ok(conn)
}

/// Walk an explicit proxy selection hop by hop
///
/// Each hop's handshake targets the next hop's endpoint, or the final
/// target at the last index, and rides inside the tunnel produced so far.
/// A failure at hop *i* marks that proxy dead: the failure was observed
/// inside the conduit to that node, so the node is implicated rather than
/// the path. The health prober revisits the verdict on its next round.
pub async fn connect_through(
    combo: &[Arc<Proxy>],
    final_host: &str,
    final_port: u16,
    limit: Duration,
) -> Result<TcpStream, UpstreamError> {
    let mut conn: Option<TcpStream> = None;
    for (i, proxy) in combo.iter().enumerate() {
        let (next_host, next_port) = match combo.get(i + 1) {
            Some(next) => (next.host.as_str(), next.port),
            None => (final_host, final_port),
        };
        match connect_proxy(conn.take(), proxy, next_host, next_port, limit).await {
            Ok(tunnel) => {
                // A completed handshake is proof of life, even if an earlier
                // branch of the search had implicated this node.
                proxy.set_alive(true);
                debug!(
                    "connected to hop {} targeting {}:{}",
                    proxy.label(),
                    next_host,
                    next_port
                );
                conn = Some(tunnel);
            }
            Err(e) => {
                proxy.set_alive(false);
                return Err(e);
            }
        }
    }
    conn.ok_or(UpstreamError::NoChain)
}

/// Depth-first search over the per-hop candidate orders
///
/// `current` holds the selection for hops `0..depth`; at full depth the
/// selection is dialed. The recursion returns on the first success and
/// otherwise propagates the most recent failure.
fn dial_recursive<'a>(
    chain: &'a [Arc<Hop>],
    depth: usize,
    current: &'a mut Vec<Arc<Proxy>>,
    final_host: &'a str,
    final_port: u16,
    limit: Duration,
) -> Pin<Box<dyn Future<Output = Result<TcpStream, UpstreamError>> + Send + 'a>> {
    Box::pin(async move {
        if depth == chain.len() {
            return connect_through(current, final_host, final_port, limit).await;
        }

        let mut last_err = None;
        for proxy in chain[depth].ordered_proxies() {
            current.truncate(depth);
            current.push(proxy);
            match dial_recursive(chain, depth + 1, current, final_host, final_port, limit).await {
                Ok(conn) => return Ok(conn),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or(UpstreamError::NoChain))
    })
}
