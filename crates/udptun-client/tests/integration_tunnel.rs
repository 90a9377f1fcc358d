//! Full-loop tests: local UDP peer -> client engine -> server engine ->
//! upstream echo and back.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpListener, UdpSocket};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use udptun_client::{EngineConfig, run_client_with_socket};
use udptun_core::rate::RateLimitConfig;
use udptun_server::{ServerConfig, run_server};

const TOKEN: &str = "secret";
const MAX_PAYLOAD: usize = 1200;

async fn spawn_upstream_echo() -> u16 {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = socket.local_addr().unwrap().port();
    tokio::spawn(async move {
        let mut buf = [0u8; 2048];
        loop {
            let Ok((n, peer)) = socket.recv_from(&mut buf).await else {
                return;
            };
            if &buf[..n] == b"hello" {
                let _ = socket.send_to(b"world", peer).await;
            }
        }
    });
    port
}

fn server_config() -> ServerConfig {
    ServerConfig {
        token: TOKEN.to_string(),
        max_payload: MAX_PAYLOAD,
        udp_timeout: Duration::from_secs(1),
        upstream_ip: "127.0.0.1".parse().unwrap(),
        rate: RateLimitConfig::default(),
    }
}

fn engine_config(server_addr: SocketAddr, dst_port: u16) -> EngineConfig {
    EngineConfig {
        server_addr: server_addr.to_string(),
        token: TOKEN.to_string(),
        dst_port,
        max_payload: MAX_PAYLOAD,
        keepalive: Duration::from_secs(15),
        reconnect_delay: Duration::from_millis(100),
        rate: RateLimitConfig::default(),
    }
}

#[tokio::test]
async fn datagram_round_trip_through_tunnel() {
    let upstream_port = spawn_upstream_echo().await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server_addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = run_server(listener, server_config()).await;
    });

    let local = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let local_addr = local.local_addr().unwrap();
    let cancel = CancellationToken::new();
    let client = tokio::spawn(run_client_with_socket(
        local,
        engine_config(server_addr, upstream_port),
        cancel.clone(),
    ));

    // Two independent local peers; each reply must come back to the peer
    // that sent the request, via its own session id.
    let app_a = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let app_b = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    app_a.send_to(b"hello", local_addr).await.unwrap();
    app_b.send_to(b"hello", local_addr).await.unwrap();

    for app in [&app_a, &app_b] {
        let mut buf = [0u8; 64];
        let (n, from) = timeout(Duration::from_secs(5), app.recv_from(&mut buf))
            .await
            .expect("timed out waiting for tunnel reply")
            .unwrap();
        assert_eq!(&buf[..n], b"world");
        assert_eq!(from, local_addr);
    }

    // Cancellation terminates the whole engine promptly.
    cancel.cancel();
    timeout(Duration::from_secs(2), client)
        .await
        .expect("engine did not stop after cancellation")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn client_retries_until_the_server_appears() {
    let upstream_port = spawn_upstream_echo().await;

    // Reserve an address, then release it so the first dial attempts fail.
    let placeholder = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server_addr = placeholder.local_addr().unwrap();
    drop(placeholder);

    let local = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let local_addr = local.local_addr().unwrap();
    let cancel = CancellationToken::new();
    let client = tokio::spawn(run_client_with_socket(
        local,
        engine_config(server_addr, upstream_port),
        cancel.clone(),
    ));

    // Let the client accumulate a few failed connect attempts.
    tokio::time::sleep(Duration::from_millis(300)).await;

    let listener = TcpListener::bind(server_addr).await.unwrap();
    tokio::spawn(async move {
        let _ = run_server(listener, server_config()).await;
    });

    // Datagrams sent before the reconnect succeeds may be dropped on the
    // tunnel floor; retry until one makes it through.
    let app = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let mut buf = [0u8; 64];
    let mut got = None;
    for _ in 0..20 {
        app.send_to(b"hello", local_addr).await.unwrap();
        if let Ok(Ok((n, _))) = timeout(Duration::from_millis(250), app.recv_from(&mut buf)).await {
            got = Some(buf[..n].to_vec());
            break;
        }
    }
    assert_eq!(got.as_deref(), Some(&b"world"[..]));

    cancel.cancel();
    timeout(Duration::from_secs(2), client)
        .await
        .expect("engine did not stop after cancellation")
        .unwrap()
        .unwrap();
}
