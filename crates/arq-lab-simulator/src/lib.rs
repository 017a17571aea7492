pub mod engine;

#[cfg(feature = "tui")]
pub mod tui;

pub mod scenario_runner;
pub mod trace;

pub use engine::{LinkEventSummary, Simulator, StationStats};
pub use trace::SimulationReport;
