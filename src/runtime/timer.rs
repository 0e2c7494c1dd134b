//! Deadline heap for the virtual clock.
//!
//! Sleep instructions park their frame here. The kernel only consults the
//! heap when the run queue is empty; it then advances the clock straight to
//! the earliest deadline. Entries for destroyed or re-parked frames are
//! invalidated by the frame's wait epoch and dropped at delivery.

use crate::types::{FrameId, Time};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

#[derive(Debug, PartialEq, Eq)]
struct TimerEntry {
    at: Time,
    /// Insertion sequence; ties at the same deadline fire FIFO.
    seq: u64,
    frame: FrameId,
    epoch: u64,
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.at, self.seq).cmp(&(other.at, other.seq))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Min-heap of pending deadlines.
#[derive(Debug, Default)]
pub(crate) struct TimerHeap {
    heap: BinaryHeap<Reverse<TimerEntry>>,
    seq: u64,
}

impl TimerHeap {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Schedules `frame` to wake at `at`.
    pub(crate) fn push(&mut self, at: Time, frame: FrameId, epoch: u64) {
        self.seq += 1;
        self.heap.push(Reverse(TimerEntry {
            at,
            seq: self.seq,
            frame,
            epoch,
        }));
    }

    /// Returns the earliest pending deadline.
    pub(crate) fn next_deadline(&self) -> Option<Time> {
        self.heap.peek().map(|Reverse(e)| e.at)
    }

    /// Pops the next entry due at or before `now`.
    pub(crate) fn pop_due(&mut self, now: Time) -> Option<(FrameId, u64)> {
        match self.heap.peek() {
            Some(Reverse(e)) if e.at <= now => {
                let Reverse(e) = self.heap.pop().expect("peeked entry");
                Some((e.frame, e.epoch))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::ArenaIndex;

    fn frame(n: u32) -> FrameId {
        FrameId::from_arena(ArenaIndex::new(n, 0))
    }

    #[test]
    fn pops_in_deadline_order() {
        let mut timers = TimerHeap::new();
        timers.push(Time::from_millis(20), frame(1), 0);
        timers.push(Time::from_millis(5), frame(2), 0);

        assert_eq!(timers.next_deadline(), Some(Time::from_millis(5)));
        assert_eq!(timers.pop_due(Time::from_millis(20)), Some((frame(2), 0)));
        assert_eq!(timers.pop_due(Time::from_millis(20)), Some((frame(1), 0)));
        assert!(timers.is_empty());
    }

    #[test]
    fn equal_deadlines_fire_fifo() {
        let mut timers = TimerHeap::new();
        timers.push(Time::from_millis(5), frame(1), 0);
        timers.push(Time::from_millis(5), frame(2), 0);

        assert_eq!(timers.pop_due(Time::from_millis(5)), Some((frame(1), 0)));
        assert_eq!(timers.pop_due(Time::from_millis(5)), Some((frame(2), 0)));
    }

    #[test]
    fn nothing_due_before_deadline() {
        let mut timers = TimerHeap::new();
        timers.push(Time::from_millis(5), frame(1), 0);
        assert_eq!(timers.pop_due(Time::from_millis(4)), None);
    }
}
