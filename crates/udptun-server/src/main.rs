use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use udptun_core::rate::RateLimitConfig;
use udptun_proto::constants::DEFAULT_MAX_PAYLOAD;
use udptun_server::{ServerConfig, run_server};

/// UDP-over-TCP tunnel server
#[derive(Parser, Debug)]
#[command(name = "udptun-server")]
#[command(about = "Authenticated UDP-over-TCP tunnel server", long_about = None)]
struct Args {
    /// TCP listen address
    #[arg(short, long, default_value = "0.0.0.0:9000")]
    listen: SocketAddr,

    /// Shared auth token (required)
    #[arg(short, long, default_value = "")]
    token: String,

    /// Maximum payload size in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_PAYLOAD)]
    max_payload: usize,

    /// Upstream UDP reply timeout in seconds
    #[arg(long, default_value_t = 3)]
    udp_timeout_secs: u64,

    /// Default upstream destination IP
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    dst_ip: IpAddr,

    /// Packets/sec limit per connection (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    rate_pps: u32,

    /// Bytes/sec limit per connection (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    rate_bps: u32,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
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

    if args.token.is_empty() {
        anyhow::bail!("missing token");
    }

    let cfg = ServerConfig {
        token: args.token,
        max_payload: args.max_payload,
        udp_timeout: Duration::from_secs(args.udp_timeout_secs),
        upstream_ip: args.dst_ip,
        rate: RateLimitConfig {
            packets_per_sec: args.rate_pps,
            bytes_per_sec: args.rate_bps,
        },
    };

    info!(listen = %args.listen, dst_ip = %cfg.upstream_ip, "starting server");

    let listener = TcpListener::bind(args.listen).await?;
    run_server(listener, cfg).await
}
