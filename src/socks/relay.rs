//! Bidirectional relay
//!
//! Shovels bytes between the inbound client and the established upstream
//! conduit, one task per direction. Each direction refreshes its idle
//! deadline on every transfer; when either direction finishes, the other is
//! woken so both sides tear down together.

use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Per-direction copy buffer size
const RELAY_BUFFER_SIZE: usize = 32 * 1024;

/// Relay data bidirectionally until both directions finish
///
/// A direction finishes on EOF, error, idle timeout, shutdown, or when the
/// opposite direction finishes first. Both write halves are shut down on
/// the way out, so the peers always observe the close.
pub async fn relay<A, B>(client: A, upstream: B, idle_timeout: Duration, shutdown: broadcast::Sender<()>)
where
    A: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let (client_read, client_write) = tokio::io::split(client);
    let (upstream_read, upstream_write) = tokio::io::split(upstream);

    let (done_tx, _) = broadcast::channel::<()>(1);
    let done_up = done_tx.subscribe();
    let done_down = done_tx.subscribe();

    let up = pipe(
        client_read,
        upstream_write,
        idle_timeout,
        "client->upstream",
        done_tx.clone(),
        done_up,
        shutdown.subscribe(),
    );
    let down = pipe(
        upstream_read,
        client_write,
        idle_timeout,
        "upstream->client",
        done_tx,
        done_down,
        shutdown.subscribe(),
    );

    tokio::join!(up, down);
}

/// Copy one direction until it ends, then wake the opposite direction
async fn pipe<R, W>(
    mut src: R,
    mut dst: W,
    idle_timeout: Duration,
    direction: &str,
    done: broadcast::Sender<()>,
    mut peer_done: broadcast::Receiver<()>,
    mut shutdown: broadcast::Receiver<()>,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; RELAY_BUFFER_SIZE];
    loop {
        let read = tokio::select! {
            _ = peer_done.recv() => break,
            _ = shutdown.recv() => {
                debug!("relay {}: shutting down", direction);
                break;
            }
            result = tokio::time::timeout(idle_timeout, src.read(&mut buf)) => result,
        };

        let n = match read {
            Err(_) => {
                warn!("relay {}: idle timeout", direction);
                break;
            }
            Ok(Ok(0)) => {
                debug!("relay {}: connection closed", direction);
                break;
            }
            Ok(Ok(n)) => n,
            Ok(Err(e)) if is_disconnect(&e) => {
                debug!("relay {}: {}", direction, e);
                break;
            }
            Ok(Err(e)) => {
                warn!("relay {}: {}", direction, e);
                break;
            }
        };

        match tokio::time::timeout(idle_timeout, dst.write_all(&buf[..n])).await {
            Err(_) => {
                warn!("relay {}: idle timeout", direction);
                break;
            }
            Ok(Ok(())) => {}
            Ok(Err(e)) if is_disconnect(&e) => {
                debug!("relay {}: {}", direction, e);
                break;
            }
            Ok(Err(e)) => {
                warn!("relay {}: {}", direction, e);
                break;
            }
        }
    }

    let _ = done.send(());
    // Half-close so the peer sees FIN even if it is still sending.
    let _ = dst.shutdown().await;
}

fn is_disconnect(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}
