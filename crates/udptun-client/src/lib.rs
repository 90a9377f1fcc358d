//! Client engine: shuttles datagrams between local UDP peers and the tunnel.
//!
//! Three concurrently scheduled activities share the local UDP socket and
//! the session table: a UDP ingress loop, a UDP egress loop, and the tunnel
//! connection loop. They exchange frames over bounded queues with a
//! non-blocking, drop-on-full producer contract.

pub mod config;
pub mod local;
pub mod tunnel;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use udptun_core::rate::{RateLimit, RateLimitConfig};
use udptun_core::session::SessionTable;

/// Bound on the outbound and inbound frame queues. Producers never block on
/// a full queue; the frame is dropped instead.
pub const QUEUE_DEPTH: usize = 1024;

/// Everything the engine needs beyond the parsed config string.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// `host:port` the tunnel dials.
    pub server_addr: String,
    pub token: String,
    /// UDP destination port data frames are tagged with.
    pub dst_port: u16,
    pub max_payload: usize,
    pub keepalive: Duration,
    pub reconnect_delay: Duration,
    pub rate: RateLimitConfig,
}

/// Run the engine until `cancel` fires.
pub async fn run_client(
    local_addr: SocketAddr,
    cfg: EngineConfig,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let socket = UdpSocket::bind(local_addr).await?;
    run_client_with_socket(socket, cfg, cancel).await
}

/// Run the engine on an already-bound local UDP socket (used by tests to
/// bind port 0 and read back the assigned address).
pub async fn run_client_with_socket(
    socket: UdpSocket,
    cfg: EngineConfig,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let socket = Arc::new(socket);
    let table = Arc::new(SessionTable::new());
    let limiter = RateLimit::new(cfg.rate);

    let (outbound_tx, outbound_rx) = mpsc::channel(QUEUE_DEPTH);
    let (inbound_tx, inbound_rx) = mpsc::channel(QUEUE_DEPTH);

    info!(
        local = %socket.local_addr()?,
        server = %cfg.server_addr,
        dst_port = cfg.dst_port,
        "client engine started"
    );

    let ingress = tokio::spawn(local::udp_ingress(
        socket.clone(),
        table.clone(),
        outbound_tx,
        cfg.dst_port,
        cfg.max_payload,
        cancel.clone(),
    ));
    let egress = tokio::spawn(local::udp_egress(
        socket.clone(),
        table,
        inbound_rx,
        cancel.clone(),
    ));

    tunnel::run_tunnel(&cfg, outbound_rx, inbound_tx, limiter, cancel).await;

    let _ = ingress.await;
    let _ = egress.await;
    Ok(())
}
