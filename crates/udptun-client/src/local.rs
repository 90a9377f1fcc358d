//! Local UDP socket loops: ingress (peer -> tunnel) and egress (tunnel -> peer).

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use ring::rand::{SecureRandom, SystemRandom};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use udptun_core::session::SessionTable;
use udptun_proto::frame::Frame;

/// Receive datagrams from local peers and enqueue them as data frames.
///
/// A datagram larger than `max_payload` is dropped and logged, not
/// fragmented. Enqueueing is non-blocking: a full outbound queue drops the
/// newest frame so this loop never stalls the socket.
pub async fn udp_ingress(
    socket: Arc<UdpSocket>,
    table: Arc<SessionTable>,
    outbound: mpsc::Sender<Frame>,
    dst_port: u16,
    max_payload: usize,
    cancel: CancellationToken,
) {
    let rng = SystemRandom::new();
    let mut buf = vec![0u8; 65535];
    loop {
        let (n, peer) = tokio::select! {
            res = socket.recv_from(&mut buf) => match res {
                Ok(v) => v,
                Err(error) => {
                    warn!(%error, "local udp read failed");
                    continue;
                }
            },
            _ = cancel.cancelled() => return,
        };
        if n > max_payload {
            warn!(bytes = n, max = max_payload, %peer, "oversized datagram dropped");
            continue;
        }
        let session_id = match table.session_id(&peer) {
            Some(id) => id,
            None => {
                let id = new_session_id(&rng);
                table.set(id, peer);
                debug!(session_id = id, %peer, "new session");
                id
            }
        };
        let frame = Frame::data(session_id, dst_port, Bytes::copy_from_slice(&buf[..n]));
        if outbound.try_send(frame).is_err() {
            warn!(%peer, "outbound queue full, frame dropped");
        }
    }
}

/// Drain tunnel replies and write them back to the originating peer.
///
/// Non-data frames are ignored; frames whose session id was never recorded
/// (or whose peer is gone) are silently discarded.
pub async fn udp_egress(
    socket: Arc<UdpSocket>,
    table: Arc<SessionTable>,
    mut inbound: mpsc::Receiver<Frame>,
    cancel: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            f = inbound.recv() => match f {
                Some(f) => f,
                None => return,
            },
            _ = cancel.cancelled() => return,
        };
        if !frame.is_data() {
            continue;
        }
        let Some(addr) = table.addr(frame.header.session_id) else {
            continue;
        };
        if let Err(error) = socket.send_to(&frame.payload, addr).await {
            warn!(%error, %addr, "local udp write failed");
        }
    }
}

/// Fresh session id from the system CSPRNG.
///
/// Falls back to a coarse time-derived value if the secure source fails;
/// that fallback is a known collision risk under concurrent use.
fn new_session_id(rng: &SystemRandom) -> u64 {
    let mut b = [0u8; 8];
    if rng.fill(&mut b).is_ok() {
        u64::from_be_bytes(b)
    } else {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default()
    }
}
