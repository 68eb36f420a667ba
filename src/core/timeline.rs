//! Time-keyed task queue for the choreography.
//!
//! Every stagger (per-source, per-layer, per-node, cycle repeat) is a future
//! state transition pushed here instead of a nested callback. Cancelling is a
//! single `cancel_all`, which also bumps the epoch so any entry that somehow
//! outlives the clear is recognised as stale on pop.

use core::cmp::Ordering;
use std::collections::BinaryHeap;

#[derive(Debug, Clone)]
struct Entry<T> {
    at: f64,
    seq: u64,
    epoch: u64,
    task: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    // Reversed so the max-heap pops the earliest entry; FIFO among equal times.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .at
            .total_cmp(&self.at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug, Clone)]
pub struct Timeline<T> {
    heap: BinaryHeap<Entry<T>>,
    seq: u64,
    epoch: u64,
}

impl<T> Default for Timeline<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Timeline<T> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            seq: 0,
            epoch: 0,
        }
    }

    /// Queue `task` to run once scene time reaches `at` seconds.
    pub fn schedule(&mut self, at: f64, task: T) {
        self.seq += 1;
        self.heap.push(Entry {
            at,
            seq: self.seq,
            epoch: self.epoch,
            task,
        });
    }

    /// Pop the earliest task due at or before `now`, with its due time.
    pub fn pop_due(&mut self, now: f64) -> Option<(f64, T)> {
        loop {
            if self.heap.peek()?.at > now {
                return None;
            }
            let entry = self.heap.pop()?;
            if entry.epoch == self.epoch {
                return Some((entry.at, entry.task));
            }
        }
    }

    pub fn next_due(&self) -> Option<f64> {
        self.heap.peek().map(|e| e.at)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Drop every pending task.
    pub fn cancel_all(&mut self) {
        self.heap.clear();
        self.epoch += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_time_order() {
        let mut tl = Timeline::new();
        tl.schedule(0.3, "c");
        tl.schedule(0.1, "a");
        tl.schedule(0.2, "b");

        assert!(tl.pop_due(0.05).is_none());
        assert_eq!(tl.pop_due(1.0), Some((0.1, "a")));
        assert_eq!(tl.pop_due(1.0), Some((0.2, "b")));
        assert_eq!(tl.pop_due(1.0), Some((0.3, "c")));
        assert!(tl.pop_due(1.0).is_none());
    }

    #[test]
    fn equal_times_are_fifo() {
        let mut tl = Timeline::new();
        for i in 0..5 {
            tl.schedule(1.0, i);
        }
        let order: Vec<_> = std::iter::from_fn(|| tl.pop_due(1.0).map(|(_, t)| t)).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn not_yet_due_stays_queued() {
        let mut tl = Timeline::new();
        tl.schedule(2.0, ());
        assert!(tl.pop_due(1.999).is_none());
        assert_eq!(tl.len(), 1);
        assert_eq!(tl.next_due(), Some(2.0));
    }

    #[test]
    fn cancel_all_empties_and_bumps_epoch() {
        let mut tl = Timeline::new();
        tl.schedule(0.1, 1);
        tl.schedule(0.2, 2);
        let before = tl.epoch();
        tl.cancel_all();
        assert!(tl.is_empty());
        assert!(tl.pop_due(10.0).is_none());
        assert_eq!(tl.epoch(), before + 1);

        tl.schedule(0.1, 3);
        assert_eq!(tl.pop_due(0.1), Some((0.1, 3)));
    }
}
