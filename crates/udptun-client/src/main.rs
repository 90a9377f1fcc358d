use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use udptun_client::config::ClientConfig;
use udptun_client::{EngineConfig, run_client};
use udptun_core::rate::RateLimitConfig;
use udptun_proto::constants::DEFAULT_MAX_PAYLOAD;

/// UDP-over-TCP tunnel client
#[derive(Parser, Debug)]
#[command(name = "udptun-client")]
#[command(about = "Authenticated UDP-over-TCP tunnel client", long_about = None)]
struct Args {
    /// Tunnel config: <serverHost>:<udpPortSpec>@<token>:<localPort>
    #[arg(short, long)]
    config: String,

    /// Destination UDP address, e.g. 127.0.0.1:53
    #[arg(short, long)]
    dst: SocketAddr,

    /// TCP port of the tunnel server
    #[arg(long, default_value_t = 9000)]
    server_port: u16,

    /// Maximum payload size in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_PAYLOAD)]
    max_payload: usize,

    /// Keepalive interval in seconds
    #[arg(long, default_value_t = 15)]
    keepalive_secs: u64,

    /// Reconnect delay in seconds
    #[arg(long, default_value_t = 2)]
    reconnect_secs: u64,

    /// Egress packets/sec limit (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    rate_pps: u32,

    /// Egress bytes/sec limit (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    rate_bps: u32,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: Level,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Configuration errors are fatal before any network activity begins.
    let cfg = ClientConfig::parse(&args.config)?;
    cfg.validate_dst_port(args.dst.port())?;

    let local_addr = SocketAddr::from(([127, 0, 0, 1], cfg.local_port));
    let engine = EngineConfig {
        server_addr: format!("{}:{}", cfg.server_host, args.server_port),
        token: cfg.token,
        dst_port: args.dst.port(),
        max_payload: args.max_payload,
        keepalive: Duration::from_secs(args.keepalive_secs),
        reconnect_delay: Duration::from_secs(args.reconnect_secs),
        rate: RateLimitConfig {
            packets_per_sec: args.rate_pps,
            bytes_per_sec: args.rate_bps,
        },
    };

    info!(
        listen = %local_addr,
        server = %engine.server_addr,
        dst = %args.dst,
        any_udp_port = cfg.any_udp_port,
        "starting client"
    );

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutting down");
            ctrl_c.cancel();
        }
    });

    run_client(local_addr, engine, cancel).await
}
