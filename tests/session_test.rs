//! End-to-end session tests against a live gateway
//!
//! Each test drives a real TCP client through the full protocol exchange
//! and checks the exact bytes the gateway answers with.

mod common;

use chainsocks::socks::consts::*;
use common::*;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[tokio::test]
async fn bad_version_is_rejected() {
    let (gateway, _shutdown) = start_gateway(test_config("")).await;

    let mut conn = TcpStream::connect(gateway).await.unwrap();
    conn.write_all(&[0x04, 0x01]).await.unwrap();

    let mut reply = [0u8; 2];
    conn.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, [0x05, 0xFF]);

    // The gateway closes after the rejection.
    let mut buf = [0u8; 1];
    let n = conn.read(&mut buf).await.unwrap_or(0);
    assert_eq!(n, 0);
}

#[tokio::test]
async fn direct_connect_without_auth() {
    let echo = start_echo_server().await;
    let (gateway, _shutdown) = start_gateway(test_config("")).await;

    let mut conn = TcpStream::connect(gateway).await.unwrap();
    conn.write_all(&greeting(&[SOCKS5_AUTH_METHOD_NONE]))
        .await
        .unwrap();

    let mut method = [0u8; 2];
    conn.read_exact(&mut method).await.unwrap();
    assert_eq!(method, [0x05, 0x00]);

    conn.write_all(&connect_frame(echo)).await.unwrap();
    let reply = read_connect_reply(&mut conn).await;
    assert_eq!(reply[0], SOCKS5_VERSION);
    assert_eq!(reply[1], SOCKS5_REPLY_SUCCEEDED);
    assert_eq!(reply[3], SOCKS5_ADDR_TYPE_IPV4);
    // The bound address is the gateway's local leg, never all zeros.
    assert_ne!(&reply[4..10], &[0, 0, 0, 0, 0, 0]);

    // Bytes traverse in both directions.
    conn.write_all(b"ping").await.unwrap();
    let mut buf = [0u8; 4];
    conn.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"ping");

    conn.write_all(b"pong").await.unwrap();
    conn.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"pong");

    // Closing the client tears the tunnel down.
    conn.shutdown().await.unwrap();
    let mut rest = Vec::new();
    let n = tokio::time::timeout(Duration::from_secs(2), conn.read_to_end(&mut rest))
        .await
        .expect("tunnel did not close")
        .unwrap();
    assert_eq!(n, 0);
}

#[tokio::test]
async fn userpass_happy_path() {
    let echo = start_echo_server().await;
    let config = test_config(
        r#"
[[chains]]
username = "u"
password = "p"
"#,
    );
    let (gateway, _shutdown) = start_gateway(config).await;

    let mut conn = TcpStream::connect(gateway).await.unwrap();
    conn.write_all(&greeting(&[SOCKS5_AUTH_METHOD_NONE, SOCKS5_AUTH_METHOD_PASSWORD]))
        .await
        .unwrap();

    let mut method = [0u8; 2];
    conn.read_exact(&mut method).await.unwrap();
    assert_eq!(method, [0x05, 0x02]);

    conn.write_all(&auth_frame("u", "p")).await.unwrap();
    let mut status = [0u8; 2];
    conn.read_exact(&mut status).await.unwrap();
    assert_eq!(status, [0x01, 0x00]);

    conn.write_all(&connect_frame(echo)).await.unwrap();
    let reply = read_connect_reply(&mut conn).await;
    assert_eq!(reply[1], SOCKS5_REPLY_SUCCEEDED);

    conn.write_all(b"hello").await.unwrap();
    let mut buf = [0u8; 5];
    conn.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"hello");
}

#[tokio::test]
async fn auth_failure_is_rejected() {
    let config = test_config(
        r#"
[[chains]]
username = "u"
password = "p"
"#,
    );
    let (gateway, _shutdown) = start_gateway(config).await;

    let mut conn = TcpStream::connect(gateway).await.unwrap();
    conn.write_all(&greeting(&[SOCKS5_AUTH_METHOD_PASSWORD]))
        .await
        .unwrap();

    let mut method = [0u8; 2];
    conn.read_exact(&mut method).await.unwrap();
    assert_eq!(method, [0x05, 0x02]);

    conn.write_all(&auth_frame("u", "q")).await.unwrap();
    let mut status = [0u8; 2];
    conn.read_exact(&mut status).await.unwrap();
    assert_eq!(status, [0x01, 0x01]);

    let mut buf = [0u8; 1];
    let n = conn.read(&mut buf).await.unwrap_or(0);
    assert_eq!(n, 0);
}

#[tokio::test]
async fn noauth_client_is_rejected_when_users_exist() {
    let config = test_config(
        r#"
[[chains]]
username = "u"
password = "p"
"#,
    );
    let (gateway, _shutdown) = start_gateway(config).await;

    let mut conn = TcpStream::connect(gateway).await.unwrap();
    conn.write_all(&greeting(&[SOCKS5_AUTH_METHOD_NONE]))
        .await
        .unwrap();

    let mut reply = [0u8; 2];
    conn.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, [0x05, 0xFF]);
}

#[tokio::test]
async fn unreachable_chain_replies_host_unreachable() {
    let config = test_config(&format!(
        r#"
[[chains]]
username = "u"
password = "p"

[[chains.chain]]
name = "dead-hop"
host = "127.0.0.1"
port = {}
"#,
        dead_port()
    ));
    let (gateway, _shutdown) = start_gateway(config).await;

    let mut conn = TcpStream::connect(gateway).await.unwrap();
    conn.write_all(&greeting(&[SOCKS5_AUTH_METHOD_PASSWORD]))
        .await
        .unwrap();
    let mut method = [0u8; 2];
    conn.read_exact(&mut method).await.unwrap();

    conn.write_all(&auth_frame("u", "p")).await.unwrap();
    let mut status = [0u8; 2];
    conn.read_exact(&mut status).await.unwrap();
    assert_eq!(status, [0x01, 0x00]);

    // Target is irrelevant; the chain itself cannot be established.
    conn.write_all(&connect_frame("127.0.0.1:9".parse().unwrap()))
        .await
        .unwrap();
    let reply = read_connect_reply(&mut conn).await;
    assert_eq!(
        reply,
        [0x05, 0x04, 0x00, 0x01, 0, 0, 0, 0, 0, 0]
    );

    let mut buf = [0u8; 1];
    let n = conn.read(&mut buf).await.unwrap_or(0);
    assert_eq!(n, 0);
}

#[tokio::test]
async fn non_connect_command_replies_not_supported() {
    let (gateway, _shutdown) = start_gateway(test_config("")).await;

    let mut conn = TcpStream::connect(gateway).await.unwrap();
    conn.write_all(&greeting(&[SOCKS5_AUTH_METHOD_NONE]))
        .await
        .unwrap();
    let mut method = [0u8; 2];
    conn.read_exact(&mut method).await.unwrap();

    // UDP ASSOCIATE
    conn.write_all(&[0x05, 0x03, 0x00, 0x01, 0, 0, 0, 0, 0, 0])
        .await
        .unwrap();
    let reply = read_connect_reply(&mut conn).await;
    assert_eq!(reply[1], SOCKS5_REPLY_COMMAND_NOT_SUPPORTED);
}

#[tokio::test]
async fn unknown_addr_type_replies_not_supported() {
    let (gateway, _shutdown) = start_gateway(test_config("")).await;

    let mut conn = TcpStream::connect(gateway).await.unwrap();
    conn.write_all(&greeting(&[SOCKS5_AUTH_METHOD_NONE]))
        .await
        .unwrap();
    let mut method = [0u8; 2];
    conn.read_exact(&mut method).await.unwrap();

    conn.write_all(&[0x05, 0x01, 0x00, 0x7F]).await.unwrap();
    let reply = read_connect_reply(&mut conn).await;
    assert_eq!(reply[1], SOCKS5_REPLY_ADDRESS_TYPE_NOT_SUPPORTED);
}

#[tokio::test]
async fn idle_relay_times_out() {
    // The test config uses a one-second idle timeout.
    let echo = start_echo_server().await;
    let (gateway, _shutdown) = start_gateway(test_config("")).await;

    let mut conn = TcpStream::connect(gateway).await.unwrap();
    conn.write_all(&greeting(&[SOCKS5_AUTH_METHOD_NONE]))
        .await
        .unwrap();
    let mut method = [0u8; 2];
    conn.read_exact(&mut method).await.unwrap();

    conn.write_all(&connect_frame(echo)).await.unwrap();
    let reply = read_connect_reply(&mut conn).await;
    assert_eq!(reply[1], SOCKS5_REPLY_SUCCEEDED);

    // Send nothing; the relay must give up on its own.
    let mut buf = [0u8; 1];
    let n = tokio::time::timeout(Duration::from_secs(5), conn.read(&mut buf))
        .await
        .expect("relay did not enforce the idle timeout")
        .unwrap_or(0);
    assert_eq!(n, 0);
}

#[tokio::test]
async fn connect_through_two_hop_chain() {
    let echo = start_echo_server().await;
    let exit = start_upstream_proxy(None).await;
    let entry = start_upstream_proxy(Some(("hopuser", "hoppass"))).await;

    let config = test_config(&format!(
        r#"
[[chains]]
username = "u"
password = "p"

[[chains.chain]]
name = "entry"
host = "127.0.0.1"
port = {}
username = "hopuser"
password = "hoppass"

[[chains.chain]]
name = "exit"
host = "127.0.0.1"
port = {}
"#,
        entry.port(),
        exit.port()
    ));
    let (gateway, _shutdown) = start_gateway(config).await;

    let mut conn = TcpStream::connect(gateway).await.unwrap();
    conn.write_all(&greeting(&[SOCKS5_AUTH_METHOD_PASSWORD]))
        .await
        .unwrap();
    let mut method = [0u8; 2];
    conn.read_exact(&mut method).await.unwrap();
    assert_eq!(method, [0x05, 0x02]);

    conn.write_all(&auth_frame("u", "p")).await.unwrap();
    let mut status = [0u8; 2];
    conn.read_exact(&mut status).await.unwrap();
    assert_eq!(status, [0x01, 0x00]);

    conn.write_all(&connect_frame(echo)).await.unwrap();
    let reply = read_connect_reply(&mut conn).await;
    assert_eq!(reply[1], SOCKS5_REPLY_SUCCEEDED);

    conn.write_all(b"through the chain").await.unwrap();
    let mut buf = [0u8; 17];
    conn.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"through the chain");
}
