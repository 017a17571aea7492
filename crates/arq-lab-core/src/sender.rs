//! Send-side window bookkeeping.
//!
//! ```text
//!  ack_expected         next_frame_to_send
//!      │                        │
//!  ────┼────────────────────────┼──────────────▶ seq space (mod MAX_SEQ+1)
//!      │ <── nbuffered in flight ──▶│
//! ```
//!
//! This type only tracks state; transmitting and timers are the caller's job.

use arq_lab_abstract::Packet;

use crate::seq::SeqSpace;

#[derive(Debug)]
pub struct SenderWindow {
    space: SeqSpace,
    /// Oldest unacknowledged frame (lower edge).
    ack_expected: u8,
    /// Next sequence number to assign (upper edge, exclusive).
    next_frame_to_send: u8,
    nbuffered: usize,
    /// Indexed by `seq mod W`.
    out_buf: Vec<Option<Packet>>,
}

impl SenderWindow {
    pub fn new(space: SeqSpace) -> Self {
        Self {
            space,
            ack_expected: 0,
            next_frame_to_send: 0,
            nbuffered: 0,
            out_buf: vec![None; space.window()],
        }
    }

    pub fn ack_expected(&self) -> u8 {
        self.ack_expected
    }

    pub fn next_frame_to_send(&self) -> u8 {
        self.next_frame_to_send
    }

    pub fn nbuffered(&self) -> usize {
        self.nbuffered
    }

    /// True when another packet may be admitted.
    pub fn has_room(&self) -> bool {
        self.nbuffered < self.space.window()
    }

    /// Buffer `packet` under the next sequence number and advance the upper
    /// edge. Returns the assigned sequence number.
    ///
    /// # Panics
    ///
    /// If the window is full; the admission gate must prevent this.
    pub fn admit(&mut self, packet: Packet) -> u8 {
        assert!(
            self.has_room(),
            "packet admitted into a full window ({} buffered)",
            self.nbuffered
        );
        let seq = self.next_frame_to_send;
        self.out_buf[self.space.slot(seq)] = Some(packet);
        self.next_frame_to_send = self.space.increment(seq);
        self.nbuffered += 1;
        seq
    }

    /// True iff `seq` is sent but not yet acknowledged.
    pub fn is_outstanding(&self, seq: u8) -> bool {
        self.space
            .in_window(self.ack_expected, seq, self.next_frame_to_send)
    }

    /// The buffered packet of an outstanding frame.
    pub fn packet(&self, seq: u8) -> Option<&Packet> {
        if !self.is_outstanding(seq) {
            return None;
        }
        self.out_buf[self.space.slot(seq)].as_ref()
    }

    /// Apply a cumulative ack. Every frame from `ack_expected` through `ack`
    /// inclusive is released; returns their sequence numbers, oldest first.
    /// An ack outside the window releases nothing.
    pub fn acknowledge(&mut self, ack: u8) -> Vec<u8> {
        let mut released = Vec::new();
        while self.is_outstanding(ack) {
            let seq = self.ack_expected;
            self.out_buf[self.space.slot(seq)] = None;
            self.nbuffered -= 1;
            self.ack_expected = self.space.increment(seq);
            released.push(seq);
        }
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> SenderWindow {
        SenderWindow::new(SeqSpace::default())
    }

    #[test]
    fn admit_assigns_consecutive_numbers() {
        let mut w = window();
        assert_eq!(w.admit(Packet::with_id(0, 4)), 0);
        assert_eq!(w.admit(Packet::with_id(1, 4)), 1);
        assert_eq!(w.next_frame_to_send(), 2);
        assert_eq!(w.nbuffered(), 2);
        assert_eq!(w.packet(1).and_then(Packet::id), Some(1));
        assert!(w.packet(2).is_none());
    }

    #[test]
    fn fills_up_at_window_size() {
        let mut w = window();
        for id in 0..8 {
            assert!(w.has_room());
            w.admit(Packet::with_id(id, 4));
        }
        assert!(!w.has_room());
    }

    #[test]
    #[should_panic(expected = "full window")]
    fn admitting_past_the_window_panics() {
        let mut w = window();
        for id in 0..9 {
            w.admit(Packet::with_id(id, 4));
        }
    }

    #[test]
    fn cumulative_ack_releases_a_run() {
        let mut w = window();
        for id in 0..5 {
            w.admit(Packet::with_id(id, 4));
        }
        assert_eq!(w.acknowledge(2), vec![0, 1, 2]);
        assert_eq!(w.ack_expected(), 3);
        assert_eq!(w.nbuffered(), 2);
        assert!(w.packet(1).is_none());
        assert!(w.packet(3).is_some());
    }

    #[test]
    fn stale_and_future_acks_release_nothing() {
        let mut w = window();
        for id in 0..3 {
            w.admit(Packet::with_id(id, 4));
        }
        w.acknowledge(0);
        // already acknowledged
        assert!(w.acknowledge(0).is_empty());
        // not sent yet
        assert!(w.acknowledge(3).is_empty());
        // "ack = frame_expected - 1" before anything arrived
        assert!(w.acknowledge(15).is_empty());
        assert_eq!(w.nbuffered(), 2);
    }

    #[test]
    fn window_slides_across_wraparound() {
        let mut w = window();
        for id in 0..14 {
            w.admit(Packet::with_id(id, 4));
            w.acknowledge(w.next_frame_to_send().wrapping_sub(1));
        }
        assert_eq!(w.ack_expected(), 14);
        for id in 14..20 {
            w.admit(Packet::with_id(id, 4));
        }
        assert_eq!(w.next_frame_to_send(), 4);
        assert!(w.is_outstanding(15));
        assert!(w.is_outstanding(0));
        assert_eq!(w.acknowledge(1), vec![14, 15, 0, 1]);
        assert_eq!(w.nbuffered(), 2);
    }
}
