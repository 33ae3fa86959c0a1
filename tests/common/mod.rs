//! Test utilities for chainsocks integration tests
//!
//! Spawns real loopback listeners: the gateway under test, plain echo
//! servers standing in for CONNECT targets, and a small SOCKS5 upstream
//! proxy used as a chain hop.

#![allow(dead_code)]

use chainsocks::chain::ChainTable;
use chainsocks::config::{parse_config, Config};
use chainsocks::server::run_server;
use chainsocks::socks::addr::read_addr;
use chainsocks::socks::consts::*;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

/// Parse a config whose `[general]` section is filled in for tests
pub fn test_config(chains_toml: &str) -> Config {
    let config_str = format!(
        r#"
[general]
bind = "127.0.0.1"
port = 1080
max_connections = 16
io_timeout = 2
idle_timeout = 1

{}
"#,
        chains_toml
    );
    parse_config(&config_str).unwrap()
}

/// Start a gateway on an ephemeral port; returns its address and the
/// shutdown handle keeping it alive
pub async fn start_gateway(config: Config) -> (SocketAddr, broadcast::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let table = Arc::new(ChainTable::from_chains(&config.chains));
    let (shutdown, _) = broadcast::channel(1);
    tokio::spawn(run_server(listener, config.general, table, shutdown.clone()));
    (addr, shutdown)
}

/// Start a TCP echo server on an ephemeral port
pub async fn start_echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut conn, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                loop {
                    match conn.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if conn.write_all(&buf[..n]).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
    });
    addr
}

/// Start a working upstream SOCKS5 proxy on an ephemeral port
///
/// Handles NOAUTH or username/password CONNECT requests and actually dials
/// the requested target, so chains built from these hops carry real bytes.
pub async fn start_upstream_proxy(auth: Option<(&str, &str)>) -> SocketAddr {
    let auth = auth.map(|(u, p)| (u.to_string(), p.to_string()));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((conn, _)) = listener.accept().await {
            let auth = auth.clone();
            tokio::spawn(async move {
                let _ = serve_upstream(conn, auth).await;
            });
        }
    });
    addr
}

async fn serve_upstream(mut conn: TcpStream, auth: Option<(String, String)>) -> std::io::Result<()> {
    let mut head = [0u8; 2];
    conn.read_exact(&mut head).await?;
    let mut methods = vec![0u8; head[1] as usize];
    conn.read_exact(&mut methods).await?;

    match &auth {
        Some((username, password)) => {
            conn.write_all(&[SOCKS5_VERSION, SOCKS5_AUTH_METHOD_PASSWORD])
                .await?;

            let mut auth_head = [0u8; 2];
            conn.read_exact(&mut auth_head).await?;
            let mut uname = vec![0u8; auth_head[1] as usize];
            conn.read_exact(&mut uname).await?;
            let mut len = [0u8; 1];
            conn.read_exact(&mut len).await?;
            let mut passwd = vec![0u8; len[0] as usize];
            conn.read_exact(&mut passwd).await?;

            if uname != username.as_bytes() || passwd != password.as_bytes() {
                conn.write_all(&[SOCKS5_AUTH_VERSION, SOCKS5_AUTH_FAILURE])
                    .await?;
                return Ok(());
            }
            conn.write_all(&[SOCKS5_AUTH_VERSION, SOCKS5_AUTH_SUCCESS])
                .await?;
        }
        None => {
            conn.write_all(&[SOCKS5_VERSION, SOCKS5_AUTH_METHOD_NONE])
                .await?;
        }
    }

    let mut request = [0u8; 4];
    conn.read_exact(&mut request).await?;
    let host = read_addr(&mut conn, request[3]).await?;
    let mut port_buf = [0u8; 2];
    conn.read_exact(&mut port_buf).await?;
    let port = u16::from_be_bytes(port_buf);

    match TcpStream::connect((host.as_str(), port)).await {
        Ok(mut target) => {
            conn.write_all(&[
                SOCKS5_VERSION,
                SOCKS5_REPLY_SUCCEEDED,
                SOCKS5_RESERVED,
                SOCKS5_ADDR_TYPE_IPV4,
                0,
                0,
                0,
                0,
                0,
                0,
            ])
            .await?;
            let _ = tokio::io::copy_bidirectional(&mut conn, &mut target).await;
        }
        Err(_) => {
            conn.write_all(&[
                SOCKS5_VERSION,
                0x05, // connection refused
                SOCKS5_RESERVED,
                SOCKS5_ADDR_TYPE_IPV4,
                0,
                0,
                0,
                0,
                0,
                0,
            ])
            .await?;
        }
    }
    Ok(())
}

/// A loopback port with nothing listening on it
pub fn dead_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

/// Build the greeting frame offering the given methods
pub fn greeting(methods: &[u8]) -> Vec<u8> {
    let mut frame = vec![SOCKS5_VERSION, methods.len() as u8];
    frame.extend_from_slice(methods);
    frame
}

/// Build an RFC 1929 credentials frame
pub fn auth_frame(username: &str, password: &str) -> Vec<u8> {
    let mut frame = vec![SOCKS5_AUTH_VERSION, username.len() as u8];
    frame.extend_from_slice(username.as_bytes());
    frame.push(password.len() as u8);
    frame.extend_from_slice(password.as_bytes());
    frame
}

/// Build an IPv4 CONNECT request frame
pub fn connect_frame(addr: SocketAddr) -> Vec<u8> {
    let mut frame = vec![
        SOCKS5_VERSION,
        SOCKS5_CMD_TCP_CONNECT,
        SOCKS5_RESERVED,
        SOCKS5_ADDR_TYPE_IPV4,
    ];
    match addr {
        SocketAddr::V4(v4) => frame.extend_from_slice(&v4.ip().octets()),
        SocketAddr::V6(_) => panic!("expected an IPv4 test listener"),
    }
    frame.extend_from_slice(&addr.port().to_be_bytes());
    frame
}

/// Read the fixed 10-byte IPv4-form CONNECT reply
pub async fn read_connect_reply(conn: &mut TcpStream) -> [u8; 10] {
    let mut reply = [0u8; 10];
    conn.read_exact(&mut reply).await.unwrap();
    reply
}
