use std::fmt;

use crate::config::{LinkConfigOverride, SimConfigOverride};
use serde::{Deserialize, Serialize};

/// One of the two symmetric stations on the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum StationId {
    #[default]
    A,
    B,
}

impl StationId {
    pub fn peer(&self) -> Self {
        match self {
            StationId::A => StationId::B,
            StationId::B => StationId::A,
        }
    }

    pub fn index(&self) -> usize {
        match self {
            StationId::A => 0,
            StationId::B => 1,
        }
    }
}

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StationId::A => f.write_str("A"),
            StationId::B => f.write_str("B"),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct TestScenario {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub config: SimConfigOverride,
    #[serde(default)]
    pub link: LinkConfigOverride,
    #[serde(default)]
    pub actions: Vec<TestAction>,
    #[serde(default)]
    pub assertions: Vec<TestAssertion>,
}

/// Deterministic fault actions name the station that *sends* the frame.
#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TestAction {
    /// The network layer of `station` receives `count` new packets at `time`.
    Supply {
        time: u64,
        #[serde(default)]
        station: StationId,
        count: u32,
    },
    /// Drop the next DATA frame sent by `station` with sequence number `seq`.
    DropNextData {
        #[serde(default)]
        station: StationId,
        seq: u8,
    },
    /// Flip a payload bit in the next DATA frame sent by `station` with `seq`.
    CorruptNextData {
        #[serde(default)]
        station: StationId,
        seq: u8,
    },
    /// Drop the next standalone ACK sent by `station` carrying `ack`.
    DropNextAck { station: StationId, ack: u8 },
    /// Drop the next NAK sent by `station` carrying `ack`.
    DropNextNak { station: StationId, ack: u8 },
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TestAssertion {
    /// `station` delivered at least `count` packets, ids 0.. in order.
    DeliveredInOrder { station: StationId, count: u32 },
    /// Number of DATA frames (including retransmissions) sent by `station`.
    DataFrameCount {
        station: StationId,
        min: u32,
        max: Option<u32>,
    },
    /// Number of NAK frames sent by `station`.
    NakCount {
        station: StationId,
        min: u32,
        max: Option<u32>,
    },
    /// No station ever delivered a duplicate, gap or damaged packet.
    NoMisorderedDelivery,
    /// Assert that simulation finishes within time
    MaxDuration { ms: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scenario_with_defaults() {
        let text = r#"
            name = "nak fast path"

            [config]
            seed = 7

            [link]
            seq_bits = 3

            [[actions]]
            type = "supply"
            time = 0
            count = 4

            [[actions]]
            type = "drop_next_data"
            seq = 2

            [[actions]]
            type = "drop_next_nak"
            station = "B"
            ack = 1

            [[assertions]]
            type = "delivered_in_order"
            station = "B"
            count = 4

            [[assertions]]
            type = "nak_count"
            station = "B"
            min = 1
        "#;

        let scenario: TestScenario = toml::from_str(text).unwrap();
        assert_eq!(scenario.name, "nak fast path");
        assert!(scenario.description.is_empty());
        assert_eq!(scenario.config.seed, Some(7));
        assert_eq!(scenario.link.seq_bits, Some(3));
        assert_eq!(scenario.actions.len(), 3);
        assert!(matches!(
            scenario.actions[1],
            TestAction::DropNextData {
                station: StationId::A,
                seq: 2
            }
        ));
        assert!(matches!(
            scenario.assertions[1],
            TestAssertion::NakCount {
                station: StationId::B,
                min: 1,
                max: None
            }
        ));
    }
}
