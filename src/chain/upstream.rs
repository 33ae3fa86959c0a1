//! Upstream SOCKS5 client handshake
//!
//! Performs one SOCKS5 client transaction against a hop, either over a
//! freshly dialed TCP connection or nested inside the tunnel produced by
//! the previous hop. Every step runs under its own deadline.

use crate::chain::proxy::Proxy;
use crate::error::UpstreamError;
use crate::helper::with_deadline;
use crate::socks::addr::{encode_host, read_addr};
use crate::socks::consts::*;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// Establish a tunnel through one hop towards `next_host:next_port`
///
/// When `prev` is `None` a fresh TCP connection to the hop is dialed with
/// `limit` as the dial deadline and nodelay enabled; otherwise the previous
/// hop's tunnel is reused and the handshake rides inside it. On any failure
/// the connection is dropped and the error names the hop.
pub async fn connect_proxy(
    prev: Option<TcpStream>,
    proxy: &Proxy,
    next_host: &str,
    next_port: u16,
    limit: Duration,
) -> Result<TcpStream, UpstreamError> {
    let mut conn = match prev {
        Some(conn) => conn,
        None => {
            let addr = proxy.addr();
            debug!("dialing hop {} at {}", proxy.label(), addr);
            let stream = match tokio::time::timeout(limit, TcpStream::connect(&addr)).await {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    return Err(UpstreamError::Dial {
                        hop: proxy.label(),
                        source: e,
                    })
                }
                Err(_) => {
                    return Err(UpstreamError::DialTimeout {
                        hop: proxy.label(),
                        addr,
                        limit,
                    })
                }
            };
            if let Err(e) = stream.set_nodelay(true) {
                debug!("failed to set nodelay for hop {}: {}", proxy.label(), e);
            }
            stream
        }
    };

    // The connection is dropped, and therefore closed, on every error path.
    handshake(&mut conn, proxy, next_host, next_port, limit).await?;
    Ok(conn)
}

async fn handshake(
    conn: &mut TcpStream,
    proxy: &Proxy,
    next_host: &str,
    next_port: u16,
    limit: Duration,
) -> Result<(), UpstreamError> {
    let hop = proxy.label();
    let io_err = |source| UpstreamError::Io {
        hop: hop.clone(),
        source,
    };

    // Method negotiation: always offer NOAUTH, add USERNAME/PASSWORD when
    // the hop carries credentials.
    let mut methods = vec![SOCKS5_AUTH_METHOD_NONE];
    if proxy.has_credentials() {
        methods.push(SOCKS5_AUTH_METHOD_PASSWORD);
    }
    let mut greeting = vec![SOCKS5_VERSION, methods.len() as u8];
    greeting.extend_from_slice(&methods);
    with_deadline(limit, conn.write_all(&greeting))
        .await
        .map_err(&io_err)?;

    let mut head = [0u8; 2];
    with_deadline(limit, conn.read_exact(&mut head))
        .await
        .map_err(&io_err)?;
    if head[0] != SOCKS5_VERSION {
        return Err(UpstreamError::Handshake {
            hop: hop.clone(),
            reason: format!("bad greeting version {}", head[0]),
        });
    }

    match head[1] {
        SOCKS5_AUTH_METHOD_NONE => {}
        SOCKS5_AUTH_METHOD_PASSWORD if proxy.has_credentials() => {
            sub_negotiate(conn, proxy, &hop, limit).await?;
        }
        other => {
            return Err(UpstreamError::Handshake {
                hop: hop.clone(),
                reason: format!("proxy selected unsupported method 0x{:02x}", other),
            })
        }
    }

    // CONNECT towards the next hop (or the final target).
    let (addr_type, addr_record) = encode_host(next_host).map_err(|e| UpstreamError::Handshake {
        hop: hop.clone(),
        reason: e.to_string(),
    })?;
    let mut request = vec![
        SOCKS5_VERSION,
        SOCKS5_CMD_TCP_CONNECT,
        SOCKS5_RESERVED,
        addr_type,
    ];
    request.extend_from_slice(&addr_record);
    request.extend_from_slice(&next_port.to_be_bytes());
    with_deadline(limit, conn.write_all(&request))
        .await
        .map_err(&io_err)?;

    let mut reply_head = [0u8; 4];
    with_deadline(limit, conn.read_exact(&mut reply_head))
        .await
        .map_err(&io_err)?;
    if reply_head[1] != SOCKS5_REPLY_SUCCEEDED {
        return Err(UpstreamError::ConnectRejected {
            hop: hop.clone(),
            code: reply_head[1],
        });
    }

    // Consume BND.ADDR and BND.PORT; the bound address itself is unused.
    with_deadline(limit, read_addr(conn, reply_head[3]))
        .await
        .map_err(|e| UpstreamError::Handshake {
            hop: hop.clone(),
            reason: format!("bad bound address: {}", e),
        })?;
    let mut port_buf = [0u8; 2];
    with_deadline(limit, conn.read_exact(&mut port_buf))
        .await
        .map_err(&io_err)?;

    debug!("hop {} connection established", hop);
    Ok(())
}

/// RFC 1929 client side for hops carrying credentials
async fn sub_negotiate(
    conn: &mut TcpStream,
    proxy: &Proxy,
    hop: &str,
    limit: Duration,
) -> Result<(), UpstreamError> {
    let username = proxy.username.as_deref().unwrap_or("");
    let password = proxy.password.as_deref().unwrap_or("");
    if username.len() > 255 || password.len() > 255 {
        return Err(UpstreamError::Handshake {
            hop: hop.to_string(),
            reason: "username/password too long".to_string(),
        });
    }

    let mut request = vec![SOCKS5_AUTH_VERSION, username.len() as u8];
    request.extend_from_slice(username.as_bytes());
    request.push(password.len() as u8);
    request.extend_from_slice(password.as_bytes());

    let io_err = |source| UpstreamError::Io {
        hop: hop.to_string(),
        source,
    };
    with_deadline(limit, conn.write_all(&request))
        .await
        .map_err(io_err)?;

    let mut status = [0u8; 2];
    with_deadline(limit, conn.read_exact(&mut status))
        .await
        .map_err(|source| UpstreamError::Io {
            hop: hop.to_string(),
            source,
        })?;
    if status[1] != SOCKS5_AUTH_SUCCESS {
        return Err(UpstreamError::AuthRejected {
            hop: hop.to_string(),
        });
    }
    Ok(())
}
