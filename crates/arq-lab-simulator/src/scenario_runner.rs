use anyhow::{Context, anyhow, bail};
use arq_lab_abstract::{
    LinkConfig, SimConfig, StationId, TestAction, TestAssertion, TestScenario,
};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::engine::{Fault, Simulator};
use crate::trace::SimulationReport;

/// Simulated time a scenario may take when it sets no `max_duration`.
pub const DEFAULT_MAX_DURATION_MS: u64 = 60_000;

pub fn load_scenario(path: &Path) -> anyhow::Result<TestScenario> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
    toml::from_str(&content).context("Failed to parse scenario file")
}

/// Build a selective-repeat simulator with the scenario's overrides, supplies
/// and faults applied. Nothing has run yet.
pub fn build_simulator(scenario: &TestScenario) -> anyhow::Result<Simulator> {
    let mut config = SimConfig::default();
    scenario.config.apply_to(&mut config);
    let mut link = LinkConfig::default();
    scenario.link.apply_to(&mut link);

    let mut sim = Simulator::selective_repeat(config, link)
        .with_context(|| format!("Invalid link settings in scenario '{}'", scenario.name))?;

    for action in &scenario.actions {
        match *action {
            TestAction::Supply {
                time,
                station,
                count,
            } => sim.schedule_supply(time, station, count),
            TestAction::DropNextData { station, seq } => {
                sim.add_fault(station, Fault::DropData { seq })
            }
            TestAction::CorruptNextData { station, seq } => {
                sim.add_fault(station, Fault::CorruptData { seq })
            }
            TestAction::DropNextAck { station, ack } => {
                sim.add_fault(station, Fault::DropAck { ack })
            }
            TestAction::DropNextNak { station, ack } => {
                sim.add_fault(station, Fault::DropNak { ack })
            }
        }
    }
    Ok(sim)
}

pub fn run_scenario(path: &Path) -> anyhow::Result<SimulationReport> {
    let scenario = load_scenario(path)?;
    run(&scenario)
}

pub fn run_scenario_str(text: &str) -> anyhow::Result<SimulationReport> {
    let scenario: TestScenario = toml::from_str(text).context("Failed to parse scenario")?;
    run(&scenario)
}

/// Run to completion, then check every assertion in order.
pub fn run(scenario: &TestScenario) -> anyhow::Result<SimulationReport> {
    info!("Running Scenario: {}", scenario.name);
    if !scenario.description.is_empty() {
        info!("Description: {}", scenario.description);
    }

    let mut sim = build_simulator(scenario)?;

    let max_duration = scenario
        .assertions
        .iter()
        .find_map(|a| match a {
            TestAssertion::MaxDuration { ms } => Some(*ms),
            _ => None,
        })
        .unwrap_or(DEFAULT_MAX_DURATION_MS);

    if !sim.run_until(max_duration) {
        bail!("Test timed out after {} ms", max_duration);
    }

    let report = sim.export_report();
    check_assertions(&report, &scenario.assertions)?;

    info!("Test Scenario Passed!");
    Ok(report)
}

pub fn check_assertions(
    report: &SimulationReport,
    assertions: &[TestAssertion],
) -> anyhow::Result<()> {
    for assertion in assertions {
        match assertion {
            TestAssertion::DeliveredInOrder { station, count } => {
                let stats = report.station(*station);
                if !stats.delivered_in_order(*count) {
                    return Err(anyhow!(
                        "Assertion Failed: {} did not deliver packets 0..{} in order (delivered {:?})",
                        station,
                        count,
                        stats.delivered
                    ));
                }
            }
            TestAssertion::DataFrameCount { station, min, max } => {
                let sent = report.station(*station).data_frames;
                check_range("DATA frames", *station, sent, *min, *max)?;
            }
            TestAssertion::NakCount { station, min, max } => {
                let sent = report.station(*station).nak_frames;
                check_range("NAK frames", *station, sent, *min, *max)?;
            }
            TestAssertion::NoMisorderedDelivery => {
                for station in [StationId::A, StationId::B] {
                    let misordered = report.station(station).misordered;
                    if misordered > 0 {
                        return Err(anyhow!(
                            "Assertion Failed: {} made {} misordered deliveries",
                            station,
                            misordered
                        ));
                    }
                }
            }
            TestAssertion::MaxDuration { .. } => {} // Already checked
        }
    }
    Ok(())
}

fn check_range(
    what: &str,
    station: StationId,
    actual: u32,
    min: u32,
    max: Option<u32>,
) -> anyhow::Result<()> {
    if actual < min {
        bail!(
            "Assertion Failed: {} sent {} {}, expected min {}",
            station,
            actual,
            what,
            min
        );
    }
    if let Some(max) = max
        && actual > max
    {
        bail!(
            "Assertion Failed: {} sent {} {}, expected max {}",
            station,
            actual,
            what,
            max
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAK_SCENARIO: &str = r#"
        name = "nak fast path"

        [link]
        seq_bits = 3
        packet_len = 32

        [[actions]]
        type = "supply"
        time = 0
        count = 8

        [[actions]]
        type = "drop_next_data"
        seq = 2

        [[assertions]]
        type = "delivered_in_order"
        station = "B"
        count = 8

        [[assertions]]
        type = "nak_count"
        station = "B"
        min = 1

        [[assertions]]
        type = "data_frame_count"
        station = "A"
        min = 9

        [[assertions]]
        type = "no_misordered_delivery"

        [[assertions]]
        type = "max_duration"
        ms = 20000
    "#;

    #[test]
    fn nak_scenario_passes() {
        let report = run_scenario_str(NAK_SCENARIO).unwrap();
        assert_eq!(report.link.seq_bits, 3);
        assert_eq!(report.stations[1].delivered.len(), 8);
    }

    #[test]
    fn failed_assertion_is_named() {
        let text = r#"
            name = "too strict"

            [[actions]]
            type = "supply"
            time = 0
            count = 3

            [[assertions]]
            type = "data_frame_count"
            station = "A"
            min = 0
            max = 2
        "#;
        let err = run_scenario_str(text).unwrap_err();
        assert!(err.to_string().contains("expected max 2"), "{err}");
    }

    #[test]
    fn lost_link_times_out() {
        let text = r#"
            name = "dead line"

            [config]
            loss_rate = 1.0

            [[actions]]
            type = "supply"
            time = 0
            count = 1

            [[assertions]]
            type = "max_duration"
            ms = 10000
        "#;
        let err = run_scenario_str(text).unwrap_err();
        assert!(err.to_string().contains("timed out"), "{err}");
    }

    #[test]
    fn invalid_link_settings_are_reported() {
        let text = r#"
            name = "bad bits"

            [link]
            seq_bits = 9
        "#;
        assert!(run_scenario_str(text).is_err());
    }

    #[test]
    fn missing_file_has_context() {
        let err = run_scenario(Path::new("does/not/exist.toml")).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to read scenario file"));
    }
}
