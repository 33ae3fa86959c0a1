//! Username/password authentication for inbound sessions
//!
//! Implements the server side of RFC 1929 and verifies credentials against
//! the published user table.

use crate::chain::{ChainState, TableSnapshot};
use crate::error::{SessionError, Socks5Error};
use crate::helper::with_deadline;
use crate::socks::consts::*;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Perform username/password authentication against the table snapshot
///
/// # Protocol
///
/// Client sends:
/// ```text
/// +----+------+----------+------+----------+
/// |VER | ULEN |  UNAME   | PLEN |  PASSWD  |
/// +----+------+----------+------+----------+
/// | 1  |  1   | 1 to 255 |  1   | 1 to 255 |
/// +----+------+----------+------+----------+
/// ```
///
/// Server responds `VER | STATUS`. Every failure, framing or credential,
/// is answered with status 0x01 before the error is returned; the caller
/// closes the connection.
pub async fn authenticate<S>(
    stream: &mut S,
    snapshot: &TableSnapshot,
    limit: Duration,
) -> Result<Arc<ChainState>, SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut head = [0u8; 2];
    if let Err(e) = with_deadline(limit, stream.read_exact(&mut head)).await {
        let _ = send_status(stream, SOCKS5_AUTH_FAILURE, limit).await;
        return Err(e.into());
    }

    if head[0] != SOCKS5_AUTH_VERSION {
        let _ = send_status(stream, SOCKS5_AUTH_FAILURE, limit).await;
        return Err(Socks5Error::UnsupportedAuthVersion(head[0]).into());
    }

    let username_len = head[1] as usize;
    if username_len == 0 {
        let _ = send_status(stream, SOCKS5_AUTH_FAILURE, limit).await;
        return Err(Socks5Error::InvalidUsernameLength(username_len).into());
    }

    let mut username = vec![0u8; username_len];
    if let Err(e) = with_deadline(limit, stream.read_exact(&mut username)).await {
        let _ = send_status(stream, SOCKS5_AUTH_FAILURE, limit).await;
        return Err(e.into());
    }
    let username = String::from_utf8_lossy(&username).into_owned();

    let mut len_buf = [0u8; 1];
    if let Err(e) = with_deadline(limit, stream.read_exact(&mut len_buf)).await {
        let _ = send_status(stream, SOCKS5_AUTH_FAILURE, limit).await;
        return Err(e.into());
    }

    let password_len = len_buf[0] as usize;
    if password_len == 0 {
        let _ = send_status(stream, SOCKS5_AUTH_FAILURE, limit).await;
        return Err(Socks5Error::InvalidPasswordLength(password_len).into());
    }

    let mut password = vec![0u8; password_len];
    if let Err(e) = with_deadline(limit, stream.read_exact(&mut password)).await {
        let _ = send_status(stream, SOCKS5_AUTH_FAILURE, limit).await;
        return Err(e.into());
    }

    match snapshot.get(&username) {
        Some(state) if state.verify_password(&password) => {
            send_status(stream, SOCKS5_AUTH_SUCCESS, limit).await?;
            debug!("authentication successful for user {}", username);
            Ok(state.clone())
        }
        _ => {
            let _ = send_status(stream, SOCKS5_AUTH_FAILURE, limit).await;
            Err(SessionError::AuthFailed(username))
        }
    }
}

/// Send the sub-negotiation status byte
async fn send_status<S>(stream: &mut S, status: u8, limit: Duration) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    with_deadline(limit, async {
        stream.write_all(&[SOCKS5_AUTH_VERSION, status]).await?;
        stream.flush().await
    })
    .await
}

/// Constant-time comparison of two byte slices
///
/// The comparison takes the same amount of time regardless of where the
/// first mismatch occurs.
pub(crate) fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
