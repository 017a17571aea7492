//! One selective-repeat station over UDP, for running the protocol between
//! two real processes.

pub mod config;
pub mod dispatcher;
pub mod noise;

pub use config::StationConfig;
pub use dispatcher::{Dispatcher, StationReport};
