use bytes::Bytes;

use crate::packet::Packet;

/// The capability provided by the host (simulator or real station) to a
/// data-link protocol. Physical layer, network layer and timer service are all
/// reached through this trait.
pub trait LinkContext {
    /// Hand a complete wire frame (checksum included) to the physical layer.
    fn send_frame(&mut self, frame: Bytes);

    /// Start (or restart) the retransmission timer of window slot `slot`.
    fn start_timer(&mut self, slot: u8, delay_ms: u64);

    /// Stop the retransmission timer of window slot `slot`. No-op if idle.
    fn stop_timer(&mut self, slot: u8);

    /// Start (or restart) the delayed-ack timer.
    fn start_ack_timer(&mut self, delay_ms: u64);

    /// Stop the delayed-ack timer. No-op if idle.
    fn stop_ack_timer(&mut self);

    /// Take the next outbound packet from the network layer.
    /// Only meaningful right after a `NetworkLayerReady` event.
    fn fetch_packet(&mut self) -> Option<Packet>;

    /// Deliver an in-order packet to the network layer.
    fn deliver_packet(&mut self, packet: Packet);

    /// Allow the network layer to raise `NetworkLayerReady`.
    fn enable_network_layer(&mut self);

    /// Suspend packet admission.
    fn disable_network_layer(&mut self);

    /// Log a message to the host's debug output.
    fn log(&mut self, message: &str);

    /// Current time in ms
    fn now(&self) -> u64;

    /// Record a numeric metric for visualization (e.g. window occupancy).
    fn record_metric(&mut self, _name: &str, _value: f64) {
        // Default no-op so headless hosts don't need to care.
    }
}

/// The five things that can happen to a data-link station.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// The network layer has a packet and admission is enabled.
    NetworkLayerReady,
    /// The physical layer can accept another frame.
    PhysicalLayerReady,
    /// Raw bytes arrived from the physical layer; not yet validated.
    FrameReceived(Bytes),
    /// The retransmission timer of the given slot expired.
    DataTimeout(u8),
    /// The delayed-ack timer expired.
    AckTimeout,
}

/// A data-link protocol driven by a host event loop.
pub trait DataLinkProtocol {
    /// Called once before the first event.
    fn init(&mut self, _ctx: &mut dyn LinkContext) {}

    /// Handle one event to completion.
    fn handle_event(&mut self, ctx: &mut dyn LinkContext, event: LinkEvent);
}
