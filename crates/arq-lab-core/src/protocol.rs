//! The selective-repeat state machine.
//!
//! One [`SelectiveRepeat`] value holds everything a station knows: both
//! windows, the outstanding-frame ledger and the physical-layer readiness
//! flag. Hosts feed it [`LinkEvent`]s one at a time; every handler runs to
//! completion and finishes by re-evaluating the admission gate.

use arq_lab_abstract::{DataLinkProtocol, LinkConfig, LinkContext, LinkEvent, Packet};
use bytes::Bytes;
use tracing::{debug, warn};

use crate::error::{LinkError, Result};
use crate::frame::{Frame, FrameKind};
use crate::ledger::TimerLedger;
use crate::receiver::ReceiverWindow;
use crate::sender::SenderWindow;
use crate::seq::SeqSpace;

/// Metric recorded after every event: frames sent but not yet acknowledged.
pub const METRIC_NBUFFERED: &str = "nbuffered";

#[derive(Debug)]
pub struct SelectiveRepeat {
    config: LinkConfig,
    space: SeqSpace,
    sender: SenderWindow,
    receiver: ReceiverWindow,
    ledger: TimerLedger,
    phl_ready: bool,
}

impl SelectiveRepeat {
    pub fn new(config: LinkConfig) -> Result<Self> {
        let space = SeqSpace::new(config.seq_bits)?;
        if config.packet_len < 2 {
            return Err(LinkError::InvalidConfig(
                "packet_len must be at least 2".to_string(),
            ));
        }
        if config.data_timeout_ms == 0 || config.ack_timeout_ms == 0 {
            return Err(LinkError::InvalidConfig(
                "timeouts must be non-zero".to_string(),
            ));
        }
        Ok(Self {
            config,
            space,
            sender: SenderWindow::new(space),
            receiver: ReceiverWindow::new(space),
            ledger: TimerLedger::new(),
            phl_ready: false,
        })
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn space(&self) -> SeqSpace {
        self.space
    }

    pub fn sender(&self) -> &SenderWindow {
        &self.sender
    }

    pub fn receiver(&self) -> &ReceiverWindow {
        &self.receiver
    }

    pub fn ledger(&self) -> &TimerLedger {
        &self.ledger
    }

    pub fn physical_layer_ready(&self) -> bool {
        self.phl_ready
    }

    /// The admission gate: a new packet may enter only while the window has
    /// room and the physical layer can take a frame.
    pub fn admits_packets(&self) -> bool {
        self.sender.has_room() && self.phl_ready
    }

    fn transmit(&mut self, ctx: &mut dyn LinkContext, frame: Frame) {
        ctx.log(&format!("Send {frame}"));
        ctx.send_frame(frame.encode());
        self.phl_ready = false;
        // every frame carries the cumulative ack
        ctx.stop_ack_timer();
    }

    fn send_data(&mut self, ctx: &mut dyn LinkContext, seq: u8) {
        let Some(packet) = self.sender.packet(seq).cloned() else {
            warn!(seq, "no buffered packet for outstanding frame");
            return;
        };
        let frame = Frame::data(seq, self.receiver.ack_field(), packet);
        self.transmit(ctx, frame);
        self.ledger
            .arm(ctx, &self.space, seq, self.config.data_timeout_ms);
    }

    fn send_nak(&mut self, ctx: &mut dyn LinkContext) {
        let frame = Frame::nak(self.receiver.ack_field());
        self.transmit(ctx, frame);
        self.receiver.mark_nak_sent();
    }

    fn send_ack(&mut self, ctx: &mut dyn LinkContext) {
        let frame = Frame::ack(self.receiver.ack_field());
        self.transmit(ctx, frame);
    }

    fn on_network_layer_ready(&mut self, ctx: &mut dyn LinkContext) {
        if !self.sender.has_room() {
            warn!(
                nbuffered = self.sender.nbuffered(),
                "network layer ready while the window is full"
            );
            return;
        }
        let Some(packet) = ctx.fetch_packet() else {
            warn!("network layer signalled ready without a packet");
            return;
        };
        if packet.len() != self.config.packet_len {
            let err = LinkError::PacketLength {
                actual: packet.len(),
                expected: self.config.packet_len,
            };
            warn!("dropping outbound packet: {err}");
            return;
        }
        let seq = self.sender.admit(packet);
        self.send_data(ctx, seq);
    }

    fn on_frame(&mut self, ctx: &mut dyn LinkContext, bytes: Bytes) {
        let frame = match Frame::decode(&bytes, self.config.packet_len) {
            Ok(frame) => frame,
            Err(err) => {
                warn!("discarding frame: {err}");
                ctx.log(&format!("Receiver error: {err}"));
                if self.receiver.no_nak() {
                    self.send_nak(ctx);
                }
                return;
            }
        };
        ctx.log(&format!("Recv {frame}"));

        match frame.kind {
            FrameKind::Data => {
                if let Some(packet) = frame.payload {
                    self.on_data(ctx, frame.seq, packet);
                }
            }
            FrameKind::Nak => {
                let wanted = self.space.increment(frame.ack);
                if self.sender.is_outstanding(wanted) {
                    debug!(seq = wanted, "fast retransmit on NAK");
                    self.ledger.forget(wanted);
                    self.send_data(ctx, wanted);
                }
            }
            FrameKind::Ack => {}
        }

        for seq in self.sender.acknowledge(frame.ack) {
            self.ledger.disarm(ctx, &self.space, seq);
        }
    }

    fn on_data(&mut self, ctx: &mut dyn LinkContext, seq: u8, packet: Packet) {
        if seq != self.receiver.frame_expected() && self.receiver.no_nak() {
            self.send_nak(ctx);
        } else {
            ctx.start_ack_timer(self.config.ack_timeout_ms);
        }

        if !self.receiver.store(seq, packet) {
            debug!(seq, "duplicate or out-of-window DATA frame");
            return;
        }
        while let Some(packet) = self.receiver.pop_in_order() {
            ctx.deliver_packet(packet);
            ctx.start_ack_timer(self.config.ack_timeout_ms);
        }
    }

    /// Retransmits the oldest outstanding frame. The fired slot is only
    /// checked against it; with uniform timeouts the two always agree.
    fn on_data_timeout(&mut self, ctx: &mut dyn LinkContext, slot: u8) {
        let Some(seq) = self.ledger.oldest() else {
            warn!(slot, "data timeout with no outstanding frame");
            return;
        };
        if self.space.slot(seq) != slot as usize {
            warn!(
                slot,
                oldest = seq,
                "timer slot does not match the oldest outstanding frame"
            );
        }
        ctx.log(&format!("DATA {seq} timeout"));
        self.ledger.forget(seq);
        self.send_data(ctx, seq);
    }

    fn on_ack_timeout(&mut self, ctx: &mut dyn LinkContext) {
        ctx.log(&format!("ACK {} timeout", self.receiver.ack_field()));
        self.send_ack(ctx);
    }

    fn update_admission(&mut self, ctx: &mut dyn LinkContext) {
        if self.admits_packets() {
            ctx.enable_network_layer();
        } else {
            ctx.disable_network_layer();
        }
        ctx.record_metric(METRIC_NBUFFERED, self.sender.nbuffered() as f64);
    }
}

impl DataLinkProtocol for SelectiveRepeat {
    fn init(&mut self, ctx: &mut dyn LinkContext) {
        ctx.log(&format!(
            "selective repeat ready: MAX_SEQ={} W={} PKT_LEN={}",
            self.space.max_seq(),
            self.space.window(),
            self.config.packet_len
        ));
        ctx.disable_network_layer();
    }

    fn handle_event(&mut self, ctx: &mut dyn LinkContext, event: LinkEvent) {
        match event {
            LinkEvent::NetworkLayerReady => self.on_network_layer_ready(ctx),
            LinkEvent::PhysicalLayerReady => self.phl_ready = true,
            LinkEvent::FrameReceived(bytes) => self.on_frame(ctx, bytes),
            LinkEvent::DataTimeout(slot) => self.on_data_timeout(ctx, slot),
            LinkEvent::AckTimeout => self.on_ack_timeout(ctx),
        }
        self.update_admission(ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_configs() {
        let bad_bits = LinkConfig {
            seq_bits: 0,
            ..Default::default()
        };
        assert!(matches!(
            SelectiveRepeat::new(bad_bits),
            Err(LinkError::InvalidConfig(_))
        ));

        let no_timeout = LinkConfig {
            ack_timeout_ms: 0,
            ..Default::default()
        };
        assert!(SelectiveRepeat::new(no_timeout).is_err());

        let empty_packets = LinkConfig {
            packet_len: 0,
            ..Default::default()
        };
        assert!(SelectiveRepeat::new(empty_packets).is_err());
    }

    #[test]
    fn starts_closed() {
        let proto = SelectiveRepeat::new(LinkConfig::default()).unwrap();
        assert!(!proto.physical_layer_ready());
        assert!(!proto.admits_packets());
        assert_eq!(proto.space().window(), 8);
        assert_eq!(proto.sender().nbuffered(), 0);
        assert!(proto.ledger().is_empty());
    }
}
