use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// Checksum mismatch, or fewer bytes than the smallest valid frame.
    #[error("bad checksum on {len}-byte frame")]
    Checksum { len: usize },

    /// A DATA frame whose length does not match the configured packet size.
    #[error("short frame: got {len} bytes, DATA frames are {expected} bytes")]
    ShortFrame { len: usize, expected: usize },

    #[error("unknown frame kind {0:#04x}")]
    UnknownKind(u8),

    /// The network layer handed over a packet of the wrong size.
    #[error("packet is {actual} bytes, link carries {expected}-byte packets")]
    PacketLength { actual: usize, expected: usize },

    #[error("invalid link configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, LinkError>;
