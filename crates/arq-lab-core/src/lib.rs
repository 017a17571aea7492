//! `arq-lab-core`: selective-repeat ARQ for a point-to-point data link.
//!
//! Each module has a single responsibility:
//! - [`seq`]      sequence arithmetic modulo `MAX_SEQ + 1`
//! - [`ledger`]   outstanding frames in timer-start order
//! - [`frame`]    wire format and checksum
//! - [`sender`]   send window and outbound buffers
//! - [`receiver`] receive window and out-of-order buffering
//! - [`protocol`] event dispatch and the admission gate
//!
//! The protocol never touches I/O; hosts drive it through
//! [`arq_lab_abstract::LinkContext`].

pub mod error;
pub mod frame;
pub mod ledger;
pub mod protocol;
pub mod receiver;
pub mod sender;
pub mod seq;

pub use error::LinkError;
pub use frame::{Frame, FrameKind};
pub use protocol::SelectiveRepeat;
pub use seq::SeqSpace;

use arq_lab_abstract::{DataLinkProtocol, LinkConfig};

/// A boxed selective-repeat station, ready to hand to a host.
pub fn station(config: LinkConfig) -> error::Result<Box<dyn DataLinkProtocol>> {
    Ok(Box::new(SelectiveRepeat::new(config)?))
}
