use arq_lab_abstract::{LinkConfig, SimConfig, StationId};
use serde::Serialize;
use std::collections::HashMap;

use crate::engine::{LinkEventSummary, StationStats};

/// Everything a finished (or paused) run produced, ready for `serde_json`.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub config: SimConfig,
    pub link: LinkConfig,
    pub duration_ms: u64,
    /// Indexed by [`StationId::index`].
    pub stations: [StationStats; 2],
    pub metrics: HashMap<String, Vec<(u64, f64)>>,
    pub link_events: Vec<LinkEventSummary>,
}

impl SimulationReport {
    pub fn station(&self, id: StationId) -> &StationStats {
        &self.stations[id.index()]
    }
}
