pub mod config;
pub mod interface;
pub mod packet;
pub mod scenario;

pub use interface::{DataLinkProtocol, LinkContext, LinkEvent};
pub use packet::Packet;

pub use config::{LinkConfig, LinkConfigOverride, SimConfig, SimConfigOverride};
pub use scenario::{StationId, TestAction, TestAssertion, TestScenario};
