//! Wire format of data-link frames.
//!
//! ```text
//!  0      1      2      3                3+PKT_LEN
//!  +------+------+------+--------...------+---------------+
//!  | kind | ack  | seq  |    payload      | crc32 (LE)    |   DATA
//!  +------+------+------+--------...------+---------------+
//!  | kind | ack  | crc32 (LE)    |                            ACK / NAK
//!  +------+------+---------------+
//! ```
//!
//! The checksum covers every byte before it. A frame that fails any check is
//! unusable as a whole; none of its fields may be trusted.

use std::fmt;

use arq_lab_abstract::Packet;
use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{LinkError, Result};

pub const CHECKSUM_LEN: usize = 4;
/// `kind` + `ack` + checksum: the smallest frame on the wire.
pub const MIN_FRAME_LEN: usize = 2 + CHECKSUM_LEN;
pub const DATA_HEADER_LEN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameKind {
    Data = 1,
    Ack = 2,
    Nak = 3,
}

impl TryFrom<u8> for FrameKind {
    type Error = LinkError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(FrameKind::Data),
            2 => Ok(FrameKind::Ack),
            3 => Ok(FrameKind::Nak),
            other => Err(LinkError::UnknownKind(other)),
        }
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameKind::Data => f.write_str("DATA"),
            FrameKind::Ack => f.write_str("ACK"),
            FrameKind::Nak => f.write_str("NAK"),
        }
    }
}

/// CRC-32 of `bytes`, as appended to every frame.
pub fn checksum(bytes: &[u8]) -> u32 {
    crc32fast::hash(bytes)
}

/// On-wire length of a DATA frame carrying `packet_len`-byte packets.
pub fn data_frame_len(packet_len: usize) -> usize {
    DATA_HEADER_LEN + packet_len + CHECKSUM_LEN
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    /// Cumulative ack: the last sequence number received in order.
    pub ack: u8,
    /// Only meaningful for DATA.
    pub seq: u8,
    /// Present iff `kind` is DATA.
    pub payload: Option<Packet>,
}

impl Frame {
    pub fn data(seq: u8, ack: u8, packet: Packet) -> Self {
        Self {
            kind: FrameKind::Data,
            ack,
            seq,
            payload: Some(packet),
        }
    }

    pub fn ack(ack: u8) -> Self {
        Self {
            kind: FrameKind::Ack,
            ack,
            seq: 0,
            payload: None,
        }
    }

    /// A NAK requests the frame after `ack`.
    pub fn nak(ack: u8) -> Self {
        Self {
            kind: FrameKind::Nak,
            ack,
            seq: 0,
            payload: None,
        }
    }

    pub fn encode(&self) -> Bytes {
        let payload = self.payload.as_ref().map(Packet::as_bytes).unwrap_or(&[]);
        let mut buf = BytesMut::with_capacity(DATA_HEADER_LEN + payload.len() + CHECKSUM_LEN);
        buf.put_u8(self.kind as u8);
        buf.put_u8(self.ack);
        if self.kind == FrameKind::Data {
            buf.put_u8(self.seq);
            buf.put_slice(payload);
        }
        let crc = checksum(&buf);
        buf.put_u32_le(crc);
        buf.freeze()
    }

    /// Validate and parse a received frame. DATA frames must carry exactly
    /// `packet_len` payload bytes.
    pub fn decode(bytes: &[u8], packet_len: usize) -> Result<Self> {
        let len = bytes.len();
        if len < MIN_FRAME_LEN {
            return Err(LinkError::Checksum { len });
        }
        let (body, trailer) = bytes.split_at(len - CHECKSUM_LEN);
        let mut crc = [0u8; CHECKSUM_LEN];
        crc.copy_from_slice(trailer);
        if checksum(body) != u32::from_le_bytes(crc) {
            return Err(LinkError::Checksum { len });
        }

        let kind = FrameKind::try_from(body[0])?;
        let ack = body[1];
        match kind {
            FrameKind::Data => {
                let expected = data_frame_len(packet_len);
                if len != expected {
                    return Err(LinkError::ShortFrame { len, expected });
                }
                Ok(Frame::data(
                    body[2],
                    ack,
                    Packet::new(body[DATA_HEADER_LEN..].to_vec()),
                ))
            }
            FrameKind::Ack | FrameKind::Nak => {
                if len != MIN_FRAME_LEN {
                    return Err(LinkError::ShortFrame {
                        len,
                        expected: MIN_FRAME_LEN,
                    });
                }
                Ok(Self {
                    kind,
                    ack,
                    seq: 0,
                    payload: None,
                })
            }
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.kind, &self.payload) {
            (FrameKind::Data, Some(packet)) => write!(
                f,
                "DATA seq={} ack={} id={}",
                self.seq,
                self.ack,
                packet.id().unwrap_or_default()
            ),
            (kind, _) => write!(f, "{kind} ack={}", self.ack),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PKT_LEN: usize = 16;

    #[test]
    fn data_frame_layout() {
        let frame = Frame::data(5, 3, Packet::with_id(9, PKT_LEN));
        let wire = frame.encode();

        assert_eq!(wire.len(), data_frame_len(PKT_LEN));
        assert_eq!(&wire[..3], &[1, 3, 5]);
        assert_eq!(&wire[3..5], &9u16.to_le_bytes());
        let crc = checksum(&wire[..wire.len() - 4]);
        assert_eq!(&wire[wire.len() - 4..], &crc.to_le_bytes());

        assert_eq!(Frame::decode(&wire, PKT_LEN).unwrap(), frame);
    }

    #[test]
    fn control_frames_are_six_bytes() {
        let ack = Frame::ack(15).encode();
        let nak = Frame::nak(2).encode();
        assert_eq!(ack.len(), MIN_FRAME_LEN);
        assert_eq!(&ack[..2], &[2, 15]);
        assert_eq!(&nak[..2], &[3, 2]);

        let decoded = Frame::decode(&nak, PKT_LEN).unwrap();
        assert_eq!(decoded.kind, FrameKind::Nak);
        assert_eq!(decoded.ack, 2);
        assert!(decoded.payload.is_none());
    }

    #[test]
    fn flipped_payload_bit_fails_checksum() {
        let wire = Frame::data(1, 0, Packet::with_id(1, PKT_LEN)).encode();
        let mut raw = wire.to_vec();
        raw[10] ^= 0x01;
        assert_eq!(
            Frame::decode(&raw, PKT_LEN),
            Err(LinkError::Checksum { len: raw.len() })
        );
    }

    #[test]
    fn truncated_input_is_a_checksum_error() {
        assert_eq!(
            Frame::decode(&[1, 2, 3], PKT_LEN),
            Err(LinkError::Checksum { len: 3 })
        );
        let wire = Frame::data(1, 0, Packet::with_id(1, PKT_LEN)).encode();
        assert!(matches!(
            Frame::decode(&wire[..wire.len() - 1], PKT_LEN),
            Err(LinkError::Checksum { .. })
        ));
    }

    #[test]
    fn data_frame_with_wrong_packet_size() {
        let wire = Frame::data(1, 0, Packet::with_id(1, 8)).encode();
        assert_eq!(
            Frame::decode(&wire, PKT_LEN),
            Err(LinkError::ShortFrame {
                len: data_frame_len(8),
                expected: data_frame_len(PKT_LEN)
            })
        );
    }

    #[test]
    fn unknown_kind_with_valid_checksum() {
        let mut raw = vec![9u8, 0];
        let crc = checksum(&raw);
        raw.extend_from_slice(&crc.to_le_bytes());
        assert_eq!(Frame::decode(&raw, PKT_LEN), Err(LinkError::UnknownKind(9)));
    }

    #[test]
    fn display_names_the_packet() {
        let frame = Frame::data(4, 3, Packet::with_id(42, PKT_LEN));
        assert_eq!(frame.to_string(), "DATA seq=4 ack=3 id=42");
        assert_eq!(Frame::nak(6).to_string(), "NAK ack=6");
    }
}
