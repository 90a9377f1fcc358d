//! Server engine: accepts tunnel connections and relays datagrams upstream.
//!
//! Each accepted connection is handled independently with its own dedicated
//! ephemeral UDP socket and its own rate limiter, so one abusive client
//! cannot exhaust another's quota.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::time::timeout;
use tracing::{info, warn};

use udptun_core::rate::{RateLimit, RateLimitConfig};
use udptun_proto::codec::{decode_from, encode};
use udptun_proto::frame::Frame;

/// Per-process server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub token: String,
    pub max_payload: usize,
    /// How long to wait for the single upstream reply datagram.
    pub udp_timeout: Duration,
    /// Upstream IP datagrams are forwarded to; the port comes from the frame.
    pub upstream_ip: IpAddr,
    /// Per-connection limits; each connection gets its own instance.
    pub rate: RateLimitConfig,
}

/// Accept loop. Accept failures are logged and the loop continues; each
/// accepted connection runs in its own task until it errors or the peer
/// closes it.
pub async fn run_server(listener: TcpListener, cfg: ServerConfig) -> anyhow::Result<()> {
    info!(listen = %listener.local_addr()?, "server started");
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(v) => v,
            Err(error) => {
                warn!(%error, "accept failed");
                continue;
            }
        };
        let cfg = cfg.clone();
        tokio::spawn(async move {
            handle_conn(stream, peer, cfg).await;
        });
    }
}

/// Synchronous forward-and-reply loop for one tunnel connection.
///
/// At most one upstream request is in flight per connection: the next
/// inbound frame is not read until the reply window for the previous one
/// has closed. Throughput per connection is bounded by that round trip;
/// concurrency comes only from running one loop per connection.
pub async fn handle_conn(mut stream: TcpStream, peer: SocketAddr, cfg: ServerConfig) {
    let _ = stream.set_nodelay(true);
    info!(%peer, "client connected");

    let udp = match UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await {
        Ok(s) => s,
        Err(error) => {
            warn!(%peer, %error, "upstream udp socket failed");
            return;
        }
    };

    let limiter = RateLimit::new(cfg.rate);
    let mut bytes_in: u64 = 0;
    let mut bytes_out: u64 = 0;
    let mut reply_buf = vec![0u8; 65535];

    loop {
        let frame = match decode_from(&mut stream, &cfg.token, cfg.max_payload).await {
            Ok(f) => f,
            Err(error) => {
                info!(%peer, reason = %error, bytes_in, bytes_out, "client disconnected");
                return;
            }
        };
        // Keepalives and other non-data frames are consumed without touching
        // the rate limiter and produce no reply.
        if frame.is_keepalive() || !frame.is_data() {
            continue;
        }
        if !limiter.allow(frame.payload.len()) {
            warn!(%peer, bytes = frame.payload.len(), "rate limit drop");
            continue;
        }
        // The codec already bounds this; re-check before forwarding anyway.
        if frame.payload.len() > cfg.max_payload {
            warn!(
                %peer,
                bytes = frame.payload.len(),
                max = cfg.max_payload,
                "oversized payload dropped"
            );
            continue;
        }
        bytes_in += frame.payload.len() as u64;

        let dst = SocketAddr::new(cfg.upstream_ip, frame.header.dst_port);
        if let Err(error) = udp.send_to(&frame.payload, dst).await {
            warn!(%peer, %dst, %error, "upstream forward failed");
            continue;
        }

        let n = match timeout(cfg.udp_timeout, udp.recv(&mut reply_buf)).await {
            Ok(Ok(n)) => n,
            Ok(Err(error)) => {
                warn!(%peer, %error, "upstream read failed");
                continue;
            }
            // No reply within the window: nothing goes back.
            Err(_) => continue,
        };

        let reply = Frame::data(
            frame.header.session_id,
            frame.header.dst_port,
            Bytes::copy_from_slice(&reply_buf[..n]),
        );
        let wire = match encode(&reply, &cfg.token, cfg.max_payload) {
            Ok(w) => w,
            Err(error) => {
                warn!(%peer, %error, "reply encode drop");
                continue;
            }
        };
        if let Err(error) = stream.write_all(&wire).await {
            warn!(%peer, %error, bytes_in, bytes_out, "tunnel write failed");
            return;
        }
        bytes_out += n as u64;
    }
}
