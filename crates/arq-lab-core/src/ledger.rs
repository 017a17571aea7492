//! Outstanding-frame ledger.
//!
//! Keeps the sequence numbers whose retransmission timers are running, in the
//! order the timers were started. A data timeout retransmits the head.

use std::collections::{HashSet, VecDeque};

use arq_lab_abstract::LinkContext;

use crate::seq::SeqSpace;

#[derive(Debug, Default)]
pub struct TimerLedger {
    order: VecDeque<u8>,
    pending: HashSet<u8>,
}

impl TimerLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `seq` at the tail.
    ///
    /// # Panics
    ///
    /// If `seq` is already pending: a second timer for the same frame means the
    /// caller lost track of its window.
    pub fn record(&mut self, seq: u8) {
        assert!(
            self.pending.insert(seq),
            "timer for seq {seq} started while already pending (ledger: {:?})",
            self.order
        );
        self.order.push_back(seq);
    }

    /// Remove `seq`. Returns whether it was pending; absent entries are fine.
    pub fn forget(&mut self, seq: u8) -> bool {
        if !self.pending.remove(&seq) {
            return false;
        }
        if let Some(pos) = self.order.iter().position(|s| *s == seq) {
            self.order.remove(pos);
        }
        true
    }

    pub fn oldest(&self) -> Option<u8> {
        self.order.front().copied()
    }

    pub fn contains(&self, seq: u8) -> bool {
        self.pending.contains(&seq)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Pending sequence numbers from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        self.order.iter().copied()
    }

    /// Start the slot timer for `seq` and record it.
    pub fn arm(
        &mut self,
        ctx: &mut dyn LinkContext,
        space: &SeqSpace,
        seq: u8,
        timeout_ms: u64,
    ) {
        self.record(seq);
        ctx.start_timer(space.slot(seq) as u8, timeout_ms);
    }

    /// Stop the slot timer for `seq` and forget it.
    pub fn disarm(&mut self, ctx: &mut dyn LinkContext, space: &SeqSpace, seq: u8) {
        ctx.stop_timer(space.slot(seq) as u8);
        self.forget(seq);
    }
}

#[cfg(test)]
mod tests {
    use super::TimerLedger;

    #[test]
    fn keeps_start_order() {
        let mut ledger = TimerLedger::new();
        ledger.record(3);
        ledger.record(4);
        ledger.record(5);
        assert_eq!(ledger.oldest(), Some(3));
        assert_eq!(ledger.iter().collect::<Vec<_>>(), vec![3, 4, 5]);
    }

    #[test]
    fn forget_from_middle_and_head() {
        let mut ledger = TimerLedger::new();
        for seq in [0, 1, 2] {
            ledger.record(seq);
        }
        assert!(ledger.forget(1));
        assert_eq!(ledger.iter().collect::<Vec<_>>(), vec![0, 2]);
        assert!(ledger.forget(0));
        assert_eq!(ledger.oldest(), Some(2));
    }

    #[test]
    fn forget_is_idempotent() {
        let mut ledger = TimerLedger::new();
        ledger.record(7);
        assert!(ledger.forget(7));
        assert!(!ledger.forget(7));
        assert!(!ledger.forget(9));
        assert!(ledger.is_empty());
        assert_eq!(ledger.oldest(), None);
    }

    #[test]
    fn retransmission_moves_entry_to_tail() {
        let mut ledger = TimerLedger::new();
        ledger.record(0);
        ledger.record(1);
        let head = ledger.oldest().unwrap();
        ledger.forget(head);
        ledger.record(head);
        assert_eq!(ledger.iter().collect::<Vec<_>>(), vec![1, 0]);
        assert!(ledger.contains(0));
    }

    #[test]
    #[should_panic(expected = "already pending")]
    fn double_record_is_fatal() {
        let mut ledger = TimerLedger::new();
        ledger.record(4);
        ledger.record(4);
    }
}
