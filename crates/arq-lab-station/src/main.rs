use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::info;

use arq_lab_abstract::LinkConfig;
use arq_lab_station::{Dispatcher, StationConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Selective-repeat station over UDP")]
struct Args {
    /// Local address to bind, e.g. 127.0.0.1:9001.
    #[arg(long)]
    bind: SocketAddr,

    /// Address of the peer station.
    #[arg(long)]
    peer: SocketAddr,

    /// Packets to send to the peer.
    #[arg(long, default_value_t = 100)]
    packets: u32,

    /// Packets to wait for from the peer (defaults to --packets).
    #[arg(long)]
    expect: Option<u32>,

    #[arg(long, default_value_t = 4)]
    seq_bits: u8,

    #[arg(long, default_value_t = 256)]
    packet_len: usize,

    #[arg(long, default_value_t = 3000)]
    data_timeout_ms: u64,

    #[arg(long, default_value_t = 300)]
    ack_timeout_ms: u64,

    /// Line rate in bit/s; 0 disables pacing.
    #[arg(long, default_value_t = 8000)]
    bit_rate: u64,

    /// Per-bit error probability on outgoing frames.
    #[arg(long, default_value_t = 0.0)]
    ber: f64,

    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Give up after this many seconds.
    #[arg(long, default_value_t = 600)]
    run_for: u64,

    /// Write the final report as JSON.
    #[arg(long)]
    report_out: Option<PathBuf>,
}

impl Args {
    fn station_config(&self) -> StationConfig {
        let link = LinkConfig {
            seq_bits: self.seq_bits,
            packet_len: self.packet_len,
            data_timeout_ms: self.data_timeout_ms,
            ack_timeout_ms: self.ack_timeout_ms,
        };
        StationConfig {
            linger: Duration::from_millis(2 * self.data_timeout_ms),
            link,
            packets: self.packets,
            expect: self.expect.unwrap_or(self.packets),
            bit_rate: self.bit_rate,
            bit_error_rate: self.ber,
            seed: self.seed,
            run_for: Duration::from_secs(self.run_for),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let socket = UdpSocket::bind(args.bind)
        .await
        .with_context(|| format!("Failed to bind {}", args.bind))?;
    let dispatcher = Dispatcher::new(args.station_config(), socket, args.peer)?;
    let report = dispatcher.run().await?;

    info!(
        "done in {} ms: sent DATA={} ACK={} NAK={}, delivered {} ({} misordered)",
        report.elapsed_ms,
        report.data_frames,
        report.ack_frames,
        report.nak_frames,
        report.delivered,
        report.misordered
    );

    if let Some(path) = &args.report_out {
        let data = serde_json::to_vec_pretty(&report).context("Failed to serialize report")?;
        fs::write(path, &data)
            .with_context(|| format!("Failed to write report file {}", path.display()))?;
    }
    Ok(())
}
