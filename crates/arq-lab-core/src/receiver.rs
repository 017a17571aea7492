//! Receive-side window with out-of-order buffering.
//!
//! Frames inside `[frame_expected, too_far)` are buffered in any order and
//! handed to the network layer only once every earlier frame has arrived.

use arq_lab_abstract::Packet;

use crate::seq::SeqSpace;

#[derive(Debug)]
pub struct ReceiverWindow {
    space: SeqSpace,
    frame_expected: u8,
    too_far: u8,
    /// `arrived[s mod W]` is set while frame `s` waits for an earlier one.
    arrived: Vec<bool>,
    in_buf: Vec<Option<Packet>>,
    no_nak: bool,
}

impl ReceiverWindow {
    pub fn new(space: SeqSpace) -> Self {
        let window = space.window();
        Self {
            space,
            frame_expected: 0,
            too_far: window as u8,
            arrived: vec![false; window],
            in_buf: vec![None; window],
            no_nak: true,
        }
    }

    pub fn frame_expected(&self) -> u8 {
        self.frame_expected
    }

    pub fn too_far(&self) -> u8 {
        self.too_far
    }

    /// True iff no NAK went out since the last in-order delivery.
    pub fn no_nak(&self) -> bool {
        self.no_nak
    }

    /// Value for the `ack` field of any outgoing frame.
    pub fn ack_field(&self) -> u8 {
        self.space.decrement(self.frame_expected)
    }

    /// Number of frames buffered behind a gap.
    pub fn buffered(&self) -> usize {
        self.arrived.iter().filter(|a| **a).count()
    }

    pub fn mark_nak_sent(&mut self) {
        self.no_nak = false;
    }

    /// Buffer `packet` if `seq` is inside the window and not already held.
    /// Returns false for duplicates and out-of-window frames.
    pub fn store(&mut self, seq: u8, packet: Packet) -> bool {
        if !self.space.in_window(self.frame_expected, seq, self.too_far) {
            return false;
        }
        let slot = self.space.slot(seq);
        if self.arrived[slot] {
            return false;
        }
        self.arrived[slot] = true;
        self.in_buf[slot] = Some(packet);
        true
    }

    /// Take the packet at the lower edge if it has arrived, sliding the window
    /// by one.
    pub fn pop_in_order(&mut self) -> Option<Packet> {
        let slot = self.space.slot(self.frame_expected);
        if !self.arrived[slot] {
            return None;
        }
        self.arrived[slot] = false;
        self.no_nak = true;
        self.frame_expected = self.space.increment(self.frame_expected);
        self.too_far = self.space.increment(self.too_far);
        self.in_buf[slot].take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(w: &mut ReceiverWindow) -> Vec<u16> {
        std::iter::from_fn(|| w.pop_in_order())
            .filter_map(|p| p.id())
            .collect()
    }

    #[test]
    fn initial_edges() {
        let w = ReceiverWindow::new(SeqSpace::default());
        assert_eq!(w.frame_expected(), 0);
        assert_eq!(w.too_far(), 8);
        assert_eq!(w.ack_field(), 15);
        assert!(w.no_nak());
    }

    #[test]
    fn out_of_order_frames_wait_for_the_gap() {
        let mut w = ReceiverWindow::new(SeqSpace::default());
        for seq in [3u8, 1, 2] {
            assert!(w.store(seq, Packet::with_id(seq as u16, 4)));
        }
        assert!(drain(&mut w).is_empty());
        assert_eq!(w.buffered(), 3);

        assert!(w.store(0, Packet::with_id(0, 4)));
        assert_eq!(drain(&mut w), vec![0, 1, 2, 3]);
        assert_eq!(w.frame_expected(), 4);
        assert_eq!(w.too_far(), 12);
        assert_eq!(w.buffered(), 0);
    }

    #[test]
    fn duplicates_and_strangers_are_refused() {
        let mut w = ReceiverWindow::new(SeqSpace::default());
        assert!(w.store(2, Packet::with_id(2, 4)));
        assert!(!w.store(2, Packet::with_id(2, 4)));
        // beyond too_far
        assert!(!w.store(8, Packet::with_id(8, 4)));

        w.store(0, Packet::with_id(0, 4));
        drain(&mut w);
        // already delivered
        assert!(!w.store(0, Packet::with_id(0, 4)));
    }

    #[test]
    fn delivery_rearms_nak() {
        let mut w = ReceiverWindow::new(SeqSpace::default());
        w.mark_nak_sent();
        assert!(!w.no_nak());
        w.store(0, Packet::with_id(0, 4));
        w.pop_in_order();
        assert!(w.no_nak());
    }

    #[test]
    fn edges_stay_one_window_apart_across_wrap() {
        let space = SeqSpace::default();
        let mut w = ReceiverWindow::new(space);
        for n in 0..40u16 {
            let seq = (n % 16) as u8;
            assert!(w.store(seq, Packet::with_id(n, 4)));
            assert_eq!(w.pop_in_order().and_then(|p| p.id()), Some(n));
            assert_eq!(space.distance(w.frame_expected(), w.too_far()), 8);
        }
    }
}
