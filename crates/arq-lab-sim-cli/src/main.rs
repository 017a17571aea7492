use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use arq_lab_abstract::{LinkConfig, SimConfig, StationId};
use arq_lab_simulator::{SimulationReport, Simulator, scenario_runner};

#[derive(Parser, Debug)]
#[command(author, version, about = "Selective-repeat data link simulator")]
struct Args {
    /// Run a TOML scenario and check its assertions.
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Launch the terminal UI visualizer.
    #[arg(long, default_value_t = false)]
    tui: bool,

    /// Write a JSON trace of the finished simulation.
    #[arg(long)]
    trace_out: Option<PathBuf>,

    /// Packets each station's network layer offers in the default run.
    #[arg(long, default_value_t = 64)]
    packets: u32,

    /// Also send traffic from B to A so acks ride on DATA frames.
    #[arg(long, default_value_t = false)]
    duplex: bool,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Probability that a frame is lost on the line.
    #[arg(long, default_value_t = 0.1)]
    loss: f64,

    /// Probability that a frame has a bit flipped on the line.
    #[arg(long, default_value_t = 0.05)]
    corrupt: f64,

    /// Simulated time after which the default run gives up.
    #[arg(long, default_value_t = 600_000)]
    max_ms: u64,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = init_logging(args.tui);
    info!("arq-lab-sim-cli starting…");

    let report = if let Some(path) = &args.scenario {
        if args.tui {
            run_scenario_tui(path)?
        } else {
            scenario_runner::run_scenario(path)?
        }
    } else {
        run_default_sim(&args)?
    };

    summarize(&report);

    if let Some(trace_path) = &args.trace_out {
        write_trace(trace_path, &report)?;
    }

    Ok(())
}

#[cfg(feature = "tui")]
type LogGuard = Option<arq_lab_simulator::tui::MemoryLogBuffer>;
#[cfg(not(feature = "tui"))]
type LogGuard = ();

#[cfg(feature = "tui")]
fn init_logging(use_tui: bool) -> LogGuard {
    use arq_lab_simulator::tui::MemoryLogBuffer;

    if use_tui {
        let buffer = MemoryLogBuffer::new();
        let writer = buffer.clone();
        tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .init();
        Some(buffer)
    } else {
        tracing_subscriber::fmt::init();
        None
    }
}

#[cfg(not(feature = "tui"))]
fn init_logging(_use_tui: bool) -> LogGuard {
    tracing_subscriber::fmt::init();
}

fn build_default_sim(args: &Args) -> Result<Simulator> {
    let config = SimConfig {
        loss_rate: args.loss,
        corrupt_rate: args.corrupt,
        seed: args.seed,
        ..Default::default()
    };
    let mut sim = Simulator::selective_repeat(config, LinkConfig::default())?;
    sim.schedule_supply(0, StationId::A, args.packets);
    if args.duplex {
        sim.schedule_supply(0, StationId::B, args.packets);
    }
    Ok(sim)
}

fn run_default_sim(args: &Args) -> Result<SimulationReport> {
    let mut sim = build_default_sim(args)?;
    if args.tui {
        run_tui(sim, None)
    } else {
        info!("Starting default headless simulation…");
        if sim.run_until(args.max_ms) {
            info!("Simulation complete.");
        } else {
            warn!(
                "Gave up at {} ms before every frame was acknowledged (A backlog {}, B backlog {})",
                args.max_ms,
                sim.backlog(StationId::A),
                sim.backlog(StationId::B)
            );
        }
        Ok(sim.export_report())
    }
}

fn run_scenario_tui(path: &Path) -> Result<SimulationReport> {
    let scenario = scenario_runner::load_scenario(path)?;
    let sim = scenario_runner::build_simulator(&scenario)?;
    let report = run_tui(sim, Some(scenario.name.clone()))?;
    scenario_runner::check_assertions(&report, &scenario.assertions)?;
    Ok(report)
}

#[cfg(feature = "tui")]
fn run_tui(sim: Simulator, scenario_name: Option<String>) -> Result<SimulationReport> {
    use arq_lab_simulator::tui::TuiApp;

    let mut app = TuiApp::new(sim, scenario_name);
    app.run()?;
    Ok(app.into_simulator().export_report())
}

#[cfg(not(feature = "tui"))]
fn run_tui(_sim: Simulator, _scenario_name: Option<String>) -> Result<SimulationReport> {
    anyhow::bail!("this build has no terminal UI; rebuild with --features tui")
}

fn summarize(report: &SimulationReport) {
    info!("Finished after {} ms", report.duration_ms);
    for station in [StationId::A, StationId::B] {
        let stats = report.station(station);
        info!(
            "{}: sent DATA={} ACK={} NAK={}, delivered {} ({} misordered)",
            station,
            stats.data_frames,
            stats.ack_frames,
            stats.nak_frames,
            stats.delivered.len(),
            stats.misordered
        );
    }
}

fn write_trace(path: &Path, report: &SimulationReport) -> Result<()> {
    let data = serde_json::to_vec_pretty(report).context("Failed to serialize simulation trace")?;
    fs::write(path, &data)
        .with_context(|| format!("Failed to write trace file {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dead_line_gives_up_at_the_limit() {
        let args = Args::parse_from([
            "arq-lab-sim-cli",
            "--loss",
            "1",
            "--corrupt",
            "0",
            "--packets",
            "2",
            "--max-ms",
            "20000",
        ]);
        let report = run_default_sim(&args).unwrap();
        assert!(report.duration_ms <= 20_000);
        assert!(report.station(StationId::A).data_frames > 2);
        assert!(report.station(StationId::B).delivered.is_empty());
    }
}
