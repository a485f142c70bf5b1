//! Cancellable timer queue for delayed game transitions
//!
//! Timers are `(fire_time, token, payload)` entries in a min-heap polled once
//! per simulation tick. Cancelling a token invalidates the entry in place; the
//! heap drops it lazily when it reaches the top.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

/// Simulation time in seconds since the match started
pub type SimTime = f64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken(u64);

#[derive(Debug)]
struct Entry<T> {
    fire_at: SimTime,
    seq: u64,
    payload: T,
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
    // Reversed so the max-heap yields the earliest timer; equal fire times
    // keep scheduling order.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .fire_at
            .total_cmp(&self.fire_at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug)]
pub struct Scheduler<T> {
    heap: BinaryHeap<Entry<T>>,
    live: HashSet<u64>,
    next_seq: u64,
}

impl<T> Scheduler<T> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            live: HashSet::new(),
            next_seq: 0,
        }
    }

    pub fn schedule(&mut self, fire_at: SimTime, payload: T) -> TimerToken {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.live.insert(seq);
        self.heap.push(Entry {
            fire_at,
            seq,
            payload,
        });
        TimerToken(seq)
    }

    /// Returns false if the timer already fired or was cancelled
    ///
    /// Cancelled entries deeper in the heap stay until they surface; dead
    /// entries at the head are dropped right away.
    pub fn cancel(&mut self, token: TimerToken) -> bool {
        let removed = self.live.remove(&token.0);
        self.drop_dead_head();
        removed
    }

    fn drop_dead_head(&mut self) {
        while let Some(top) = self.heap.peek() {
            if self.live.contains(&top.seq) {
                break;
            }
            self.heap.pop();
        }
    }

    pub fn is_pending(&self, token: TimerToken) -> bool {
        self.live.contains(&token.0)
    }

    /// Removes and returns every live timer due at or before `now`, earliest first
    pub fn poll(&mut self, now: SimTime) -> Vec<T> {
        let mut due = Vec::new();
        while let Some(top) = self.heap.peek() {
            if top.fire_at > now {
                break;
            }
            if let Some(entry) = self.heap.pop() {
                if self.live.remove(&entry.seq) {
                    due.push(entry.payload);
                }
            }
        }
        due
    }

    pub fn pending(&self) -> usize {
        self.live.len()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.live.clear();
    }
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_returns_due_in_order() {
        let mut timers = Scheduler::new();
        timers.schedule(3.0, "c");
        timers.schedule(1.0, "a");
        timers.schedule(2.0, "b");

        assert!(timers.poll(0.5).is_empty());
        assert_eq!(timers.poll(2.0), vec!["a", "b"]);
        assert_eq!(timers.pending(), 1);
        assert_eq!(timers.poll(10.0), vec!["c"]);
        assert_eq!(timers.pending(), 0);
    }

    #[test]
    fn test_equal_times_keep_schedule_order() {
        let mut timers = Scheduler::new();
        timers.schedule(1.0, 1);
        timers.schedule(1.0, 2);
        timers.schedule(1.0, 3);
        assert_eq!(timers.poll(1.0), vec![1, 2, 3]);
    }

    #[test]
    fn test_cancelled_timer_never_fires() {
        let mut timers = Scheduler::new();
        let keep = timers.schedule(1.0, "keep");
        let drop = timers.schedule(1.0, "drop");

        assert!(timers.cancel(drop));
        assert!(!timers.cancel(drop));
        assert!(timers.is_pending(keep));
        assert!(!timers.is_pending(drop));

        assert_eq!(timers.poll(5.0), vec!["keep"]);
        assert!(!timers.is_pending(keep));
    }

    #[test]
    fn test_reschedule_loop_does_not_grow_heap() {
        let mut timers = Scheduler::new();
        let mut token = timers.schedule(1.0, 0);
        for n in 1..1000 {
            timers.cancel(token);
            token = timers.schedule(1.0 + n as f64, n);
        }

        assert_eq!(timers.pending(), 1);
        assert_eq!(timers.heap.len(), 1);
        assert_eq!(timers.poll(2000.0), vec![999]);
    }

    #[test]
    fn test_cancel_after_fire_is_noop() {
        let mut timers = Scheduler::new();
        let token = timers.schedule(0.0, ());
        assert_eq!(timers.poll(0.0).len(), 1);
        assert!(!timers.cancel(token));
    }
}
