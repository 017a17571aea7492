use std::time::Duration;

use arq_lab_abstract::LinkConfig;

/// Settings for one station running over a real socket.
#[derive(Debug, Clone)]
pub struct StationConfig {
    pub link: LinkConfig,
    /// Packets this station's network layer offers, ids `0..packets`.
    pub packets: u32,
    /// Packets expected from the peer before the station may finish.
    pub expect: u32,
    /// Line rate in bit/s used to pace physical-layer readiness.
    pub bit_rate: u64,
    /// Per-bit flip probability applied to outgoing frames.
    pub bit_error_rate: f64,
    pub seed: u64,
    /// Hard limit on the run.
    pub run_for: Duration,
    /// How long to keep answering the peer once all work is done.
    pub linger: Duration,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            link: LinkConfig::default(),
            packets: 100,
            expect: 100,
            bit_rate: 8000,
            bit_error_rate: 0.0,
            seed: 0,
            run_for: Duration::from_secs(600),
            linger: Duration::from_secs(6),
        }
    }
}

impl StationConfig {
    /// Time a frame of `len` bytes keeps the line busy.
    pub fn serialization_delay(&self, len: usize) -> Duration {
        if self.bit_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(len as u64 * 8 * 1_000_000 / self.bit_rate)
    }
}
