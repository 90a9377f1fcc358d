//! Tunnel connection lifecycle: dial, pump frames, keepalive, reconnect.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedReadHalf;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use udptun_core::rate::RateLimit;
use udptun_proto::codec::{decode_from, encode};
use udptun_proto::error::ProtoError;
use udptun_proto::frame::Frame;

use crate::EngineConfig;

/// Reconnect loop: `Disconnected -> Connecting -> Connected -> Disconnected`
/// until `cancel` fires. Retries are unbounded with a fixed delay and no
/// backoff growth. Byte counters accumulate across reconnects.
pub async fn run_tunnel(
    cfg: &EngineConfig,
    mut outbound: mpsc::Receiver<Frame>,
    inbound: mpsc::Sender<Frame>,
    limiter: RateLimit,
    cancel: CancellationToken,
) {
    let bytes_in = Arc::new(AtomicU64::new(0));
    let mut bytes_out: u64 = 0;

    loop {
        let stream = tokio::select! {
            res = TcpStream::connect(&cfg.server_addr) => match res {
                Ok(s) => s,
                Err(error) => {
                    warn!(server = %cfg.server_addr, %error, "connect failed");
                    tokio::select! {
                        _ = tokio::time::sleep(cfg.reconnect_delay) => continue,
                        _ = cancel.cancelled() => return,
                    }
                }
            },
            _ = cancel.cancelled() => return,
        };
        let _ = stream.set_nodelay(true);
        info!(server = %cfg.server_addr, "connected");

        let (read_half, mut write_half) = stream.into_split();
        let (err_tx, mut err_rx) = mpsc::channel::<ProtoError>(1);
        let reader = tokio::spawn(reader_loop(
            read_half,
            cfg.token.clone(),
            cfg.max_payload,
            inbound.clone(),
            bytes_in.clone(),
            err_tx,
        ));

        let mut idle = Instant::now();
        // interval_at panics on a zero period.
        let keepalive = cfg.keepalive.max(std::time::Duration::from_millis(1));
        let mut keepalive_tick =
            tokio::time::interval_at(tokio::time::Instant::now() + keepalive, keepalive);

        let mut connected = true;
        while connected {
            tokio::select! {
                err = err_rx.recv() => {
                    let reason = err
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "reader exited".to_string());
                    warn!(
                        %reason,
                        bytes_in = bytes_in.load(Ordering::Relaxed),
                        bytes_out,
                        "disconnected"
                    );
                    connected = false;
                }
                frame = outbound.recv() => {
                    // Sender gone means the ingress loop was cancelled.
                    let Some(frame) = frame else {
                        reader.abort();
                        let _ = write_half.shutdown().await;
                        return;
                    };
                    if !limiter.allow(frame.payload.len()) {
                        warn!(bytes = frame.payload.len(), "rate limit drop");
                        continue;
                    }
                    match encode(&frame, &cfg.token, cfg.max_payload) {
                        Ok(wire) => {
                            if let Err(error) = write_half.write_all(&wire).await {
                                warn!(%error, "tunnel write failed");
                                connected = false;
                            } else {
                                bytes_out += frame.payload.len() as u64;
                                idle = Instant::now();
                            }
                        }
                        Err(error) => warn!(%error, "encode drop"),
                    }
                }
                _ = keepalive_tick.tick() => {
                    if idle.elapsed() < keepalive {
                        continue;
                    }
                    match encode(&Frame::keepalive(), &cfg.token, cfg.max_payload) {
                        Ok(wire) => {
                            if let Err(error) = write_half.write_all(&wire).await {
                                warn!(%error, "keepalive write failed");
                                connected = false;
                            }
                        }
                        Err(error) => warn!(%error, "keepalive encode failed"),
                    }
                }
                _ = cancel.cancelled() => {
                    reader.abort();
                    let _ = write_half.shutdown().await;
                    return;
                }
            }
        }

        reader.abort();
        let _ = write_half.shutdown().await;
        tokio::select! {
            _ = tokio::time::sleep(cfg.reconnect_delay) => {}
            _ = cancel.cancelled() => return,
        }
    }
}

/// Decode frames off the connection and push them onto the inbound queue
/// (non-blocking, drop-and-log on a full queue). The terminating error is
/// reported back to the connection loop.
async fn reader_loop(
    mut read: OwnedReadHalf,
    token: String,
    max_payload: usize,
    inbound: mpsc::Sender<Frame>,
    bytes_in: Arc<AtomicU64>,
    err_tx: mpsc::Sender<ProtoError>,
) {
    loop {
        match decode_from(&mut read, &token, max_payload).await {
            Ok(frame) => {
                bytes_in.fetch_add(frame.payload.len() as u64, Ordering::Relaxed);
                if inbound.try_send(frame).is_err() {
                    warn!("inbound queue full, frame dropped");
                }
            }
            Err(error) => {
                let _ = err_tx.send(error).await;
                return;
            }
        }
    }
}
