//! Inbound session handler
//!
//! Drives the SOCKS5 server side of one accepted connection: greeting and
//! method selection, username/password authentication against the table
//! snapshot, CONNECT parsing, upstream establishment (direct or through
//! the user's chain), the reply, and the hand-off to the relay.
//!
//! Every protocol step runs under the configured I/O deadline. Exactly one
//! CONNECT reply is sent per session: a success frame carrying the local
//! address of the first upstream leg, or one specific error frame. Framing
//! errors before a parseable request simply close the connection.

use crate::chain::{dial_chain, SessionGuard, TableSnapshot};
use crate::config::GeneralConfig;
use crate::error::{SessionError, Socks5Error};
use crate::helper::with_deadline;
use crate::socks::addr::read_addr;
use crate::socks::auth::authenticate;
use crate::socks::consts::*;
use crate::socks::relay::relay;
use crate::socks::reply::send_reply;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Serve one accepted connection to completion
///
/// Errors are consumed here: they are logged and answered on the wire
/// where the protocol calls for it, never returned.
pub async fn handle_conn(
    mut conn: TcpStream,
    peer: SocketAddr,
    snapshot: TableSnapshot,
    config: GeneralConfig,
    shutdown: broadcast::Sender<()>,
) {
    if let Err(e) = conn.set_nodelay(true) {
        debug!("failed to set nodelay for {}: {}", peer, e);
    }

    let established = match establish(&mut conn, &snapshot, &config).await {
        Ok(established) => established,
        Err(e) => {
            warn!("session from {}: {}", peer, e);
            return;
        }
    };

    let Established {
        remote,
        host,
        port,
        guard,
    } = established;
    debug!("relaying {} <-> {}:{}", peer, host, port);

    // Hold the chain-state registration for the whole relay.
    let _guard = guard;
    relay(conn, remote, Duration::from_secs(config.idle_timeout), shutdown).await;
    debug!("session from {} finished", peer);
}

/// A fully negotiated session, ready for relaying
#[derive(Debug)]
struct Established {
    remote: TcpStream,
    host: String,
    port: u16,
    guard: Option<SessionGuard>,
}

/// Run the protocol phases up to and including the CONNECT reply
async fn establish<S>(
    conn: &mut S,
    snapshot: &TableSnapshot,
    config: &GeneralConfig,
) -> Result<Established, SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let limit = Duration::from_secs(config.io_timeout);

    // Greeting: VER NMETHODS METHODS...
    let mut head = [0u8; 2];
    if let Err(e) = with_deadline(limit, conn.read_exact(&mut head)).await {
        reject_methods(conn, limit).await;
        return Err(e.into());
    }
    if head[0] != SOCKS5_VERSION {
        reject_methods(conn, limit).await;
        return Err(Socks5Error::UnsupportedVersion(head[0]).into());
    }
    let method_count = head[1] as usize;
    if method_count == 0 {
        reject_methods(conn, limit).await;
        return Err(Socks5Error::NoMethodsOffered.into());
    }

    let mut methods = vec![0u8; method_count];
    if let Err(e) = with_deadline(limit, conn.read_exact(&mut methods)).await {
        reject_methods(conn, limit).await;
        return Err(e.into());
    }
    debug!("client methods: {:02x?}", methods);

    // Username/password is mandatory as soon as any user is configured.
    let required = if snapshot.is_empty() {
        SOCKS5_AUTH_METHOD_NONE
    } else {
        SOCKS5_AUTH_METHOD_PASSWORD
    };
    if !methods.contains(&required) {
        reject_methods(conn, limit).await;
        return Err(Socks5Error::NoAcceptableMethod.into());
    }
    with_deadline(limit, async {
        conn.write_all(&[SOCKS5_VERSION, required]).await?;
        conn.flush().await
    })
    .await?;
    debug!("selected method 0x{:02x}", required);

    let guard = if required == SOCKS5_AUTH_METHOD_PASSWORD {
        let state = authenticate(conn, snapshot, limit).await?;
        Some(state.acquire())
    } else {
        None
    };

    // Request: VER CMD RSV ATYP. Read failures past this point close the
    // connection without a reply; specific error frames are reserved for
    // parseable requests.
    let mut request = [0u8; 4];
    with_deadline(limit, conn.read_exact(&mut request)).await?;
    if request[0] != SOCKS5_VERSION {
        return Err(Socks5Error::UnsupportedVersion(request[0]).into());
    }
    if request[1] != SOCKS5_CMD_TCP_CONNECT {
        send_error_reply(conn, SOCKS5_REPLY_COMMAND_NOT_SUPPORTED, limit).await;
        return Err(Socks5Error::CommandNotSupported(request[1]).into());
    }
    let addr_type = request[3];
    if !matches!(
        addr_type,
        SOCKS5_ADDR_TYPE_IPV4 | SOCKS5_ADDR_TYPE_DOMAIN | SOCKS5_ADDR_TYPE_IPV6
    ) {
        send_error_reply(conn, SOCKS5_REPLY_ADDRESS_TYPE_NOT_SUPPORTED, limit).await;
        return Err(Socks5Error::AddressTypeNotSupported(addr_type).into());
    }

    let host = with_deadline(limit, read_addr(conn, addr_type)).await?;
    let mut port_buf = [0u8; 2];
    with_deadline(limit, conn.read_exact(&mut port_buf)).await?;
    let port = u16::from_be_bytes(port_buf);
    debug!("connect request to {}:{}", host, port);

    // Establish upstream: direct dial without a chain, chain dialer with.
    let dial_result = match &guard {
        Some(guard) if !guard.state().chain.is_empty() => {
            dial_chain(guard.state(), &host, port, limit)
                .await
                .map_err(SessionError::from)
        }
        _ => direct_connect(&host, port, limit).await,
    };

    let remote = match dial_result {
        Ok(remote) => remote,
        Err(e) => {
            // One opaque code for every upstream failure; the reply must
            // not disclose which hop of whose chain gave out.
            send_error_reply(conn, SOCKS5_REPLY_HOST_UNREACHABLE, limit).await;
            return Err(e);
        }
    };
    if let Err(e) = remote.set_nodelay(true) {
        debug!("failed to set nodelay upstream: {}", e);
    }

    let local_addr = remote.local_addr()?;
    with_deadline(limit, send_reply(conn, SOCKS5_REPLY_SUCCEEDED, Some(local_addr))).await?;

    Ok(Established {
        remote,
        host,
        port,
        guard,
    })
}

/// Direct TCP dial for users without a chain (and for no-auth mode)
async fn direct_connect(host: &str, port: u16, limit: Duration) -> Result<TcpStream, SessionError> {
    match tokio::time::timeout(limit, TcpStream::connect((host, port))).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(SessionError::Io(e)),
        Err(_) => Err(SessionError::Io(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("connect to {}:{} timed out", host, port),
        ))),
    }
}

/// Reply `05 FF`: no acceptable method
async fn reject_methods<S>(conn: &mut S, limit: Duration)
where
    S: AsyncWrite + Unpin,
{
    let frame = [SOCKS5_VERSION, SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE];
    if let Err(e) = with_deadline(limit, async {
        conn.write_all(&frame).await?;
        conn.flush().await
    })
    .await
    {
        debug!("method rejection write failed: {}", e);
    }
}

/// Send a specific CONNECT error frame, logging write failures only
async fn send_error_reply<S>(conn: &mut S, code: u8, limit: Duration)
where
    S: AsyncWrite + Unpin,
{
    if let Err(e) = with_deadline(limit, send_reply(conn, code, None)).await {
        debug!("error reply write failed: {}", e);
    }
}
