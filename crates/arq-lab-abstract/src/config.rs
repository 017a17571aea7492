use serde::{Deserialize, Serialize};

/// Parameters of the selective-repeat protocol itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LinkConfig {
    /// Width of the sequence number in bits; `MAX_SEQ = 2^seq_bits - 1`.
    pub seq_bits: u8,
    /// Fixed size of every network-layer packet carried in a DATA frame.
    pub packet_len: usize,
    /// Retransmission timeout for an unacknowledged DATA frame.
    pub data_timeout_ms: u64,
    /// How long a cumulative ack may wait for a reverse DATA frame to ride on.
    pub ack_timeout_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            seq_bits: 4,
            packet_len: 256,
            data_timeout_ms: 3000,
            ack_timeout_ms: 300,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LinkConfigOverride {
    pub seq_bits: Option<u8>,
    pub packet_len: Option<usize>,
    pub data_timeout_ms: Option<u64>,
    pub ack_timeout_ms: Option<u64>,
}

impl LinkConfigOverride {
    pub fn apply_to(&self, config: &mut LinkConfig) {
        if let Some(v) = self.seq_bits {
            config.seq_bits = v;
        }
        if let Some(v) = self.packet_len {
            config.packet_len = v;
        }
        if let Some(v) = self.data_timeout_ms {
            config.data_timeout_ms = v;
        }
        if let Some(v) = self.ack_timeout_ms {
            config.ack_timeout_ms = v;
        }
    }
}

/// Channel model used by the simulator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    pub loss_rate: f64,
    pub corrupt_rate: f64,
    pub min_latency: u64,
    pub max_latency: u64,
    /// Line rate in bit/s; a frame occupies the line for `len * 8 / bit_rate`.
    pub bit_rate: u64,
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            loss_rate: 0.0,
            corrupt_rate: 0.0,
            min_latency: 10,
            max_latency: 100,
            bit_rate: 8000,
            seed: 0,
        }
    }
}

impl SimConfig {
    /// Milliseconds a frame of `len` bytes keeps the transmitter busy.
    pub fn serialization_delay(&self, len: usize) -> u64 {
        if self.bit_rate == 0 {
            return 0;
        }
        (len as u64 * 8 * 1000).div_ceil(self.bit_rate)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimConfigOverride {
    pub loss_rate: Option<f64>,
    pub corrupt_rate: Option<f64>,
    pub min_latency: Option<u64>,
    pub max_latency: Option<u64>,
    pub bit_rate: Option<u64>,
    pub seed: Option<u64>,
}

impl SimConfigOverride {
    pub fn apply_to(&self, config: &mut SimConfig) {
        if let Some(v) = self.loss_rate {
            config.loss_rate = v;
        }
        if let Some(v) = self.corrupt_rate {
            config.corrupt_rate = v;
        }
        if let Some(v) = self.min_latency {
            config.min_latency = v;
        }
        if let Some(v) = self.max_latency {
            config.max_latency = v;
        }
        if let Some(v) = self.bit_rate {
            config.bit_rate = v;
        }
        if let Some(v) = self.seed {
            config.seed = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialization_delay_rounds_up() {
        let config = SimConfig::default();
        // 263-byte DATA frame at 8000 bit/s
        assert_eq!(config.serialization_delay(263), 263);
        assert_eq!(config.serialization_delay(6), 6);

        let fast = SimConfig {
            bit_rate: 3000,
            ..Default::default()
        };
        assert_eq!(fast.serialization_delay(1), 3);
    }

    #[test]
    fn link_override_only_touches_given_fields() {
        let mut config = LinkConfig::default();
        LinkConfigOverride {
            seq_bits: Some(3),
            ack_timeout_ms: Some(50),
            ..Default::default()
        }
        .apply_to(&mut config);

        assert_eq!(config.seq_bits, 3);
        assert_eq!(config.ack_timeout_ms, 50);
        assert_eq!(config.packet_len, 256);
        assert_eq!(config.data_timeout_ms, 3000);
    }
}
