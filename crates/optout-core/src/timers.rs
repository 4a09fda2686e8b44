//! Deferred work
//!
//! Rescans and vendor probes are never run inline from an event; they go
//! through this queue and re-check consent state when they fire.

use rand::Rng;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

use crate::bridge::Framework;
use crate::orchestrator::ScanTrigger;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Task {
    Rescan(ScanTrigger),
    Probe(Framework),
    /// Retry a vendor decline the rate limiter deferred
    VendorDecline(Framework),
}

#[derive(Debug, PartialEq, Eq)]
struct Entry {
    due: Instant,
    seq: u64,
    task: Task,
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap on (due, seq)
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
pub(crate) struct TimerQueue {
    heap: BinaryHeap<Entry>,
    next_seq: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, due: Instant, task: Task) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Entry { due, seq, task });
    }

    /// Remove and return the earliest task due at or before `now`
    pub fn pop_due(&mut self, now: Instant) -> Option<Task> {
        if self.heap.peek()?.due > now {
            return None;
        }
        self.heap.pop().map(|entry| entry.task)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|entry| entry.due)
    }

    /// Earliest pending rescan, if any
    pub fn pending_rescan(&self) -> Option<Instant> {
        self.heap
            .iter()
            .filter(|entry| matches!(entry.task, Task::Rescan(_)))
            .map(|entry| entry.due)
            .min()
    }

    pub fn contains(&self, task: Task) -> bool {
        self.heap.iter().any(|entry| entry.task == task)
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }
}

/// `base` plus a uniform random extra in `[0, jitter]`
pub(crate) fn jittered<R: Rng + ?Sized>(rng: &mut R, base: Duration, jitter: Duration) -> Duration {
    if jitter.is_zero() {
        return base;
    }
    let extra = rng.gen_range(0..=jitter.as_millis() as u64);
    base + Duration::from_millis(extra)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_pop_in_deadline_order() {
        let now = Instant::now();
        let mut queue = TimerQueue::new();
        queue.schedule(now + Duration::from_millis(300), Task::Probe(Framework::Tcf));
        queue.schedule(now + Duration::from_millis(100), Task::Rescan(ScanTrigger::Mutation));
        queue.schedule(now + Duration::from_millis(100), Task::Probe(Framework::SourcePoint));

        assert_eq!(queue.next_deadline(), Some(now + Duration::from_millis(100)));
        assert_eq!(queue.pop_due(now), None);

        let later = now + Duration::from_secs(1);
        assert_eq!(queue.pop_due(later), Some(Task::Rescan(ScanTrigger::Mutation)));
        assert_eq!(queue.pop_due(later), Some(Task::Probe(Framework::SourcePoint)));
        assert_eq!(queue.pop_due(later), Some(Task::Probe(Framework::Tcf)));
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn test_pending_rescan() {
        let now = Instant::now();
        let mut queue = TimerQueue::new();
        queue.schedule(now, Task::Probe(Framework::Tcf));
        assert_eq!(queue.pending_rescan(), None);

        queue.schedule(now + Duration::from_millis(50), Task::Rescan(ScanTrigger::Retry));
        assert_eq!(queue.pending_rescan(), Some(now + Duration::from_millis(50)));
        assert_eq!(queue.len(), 2);

        queue.schedule(now, Task::VendorDecline(Framework::SourcePoint));
        assert!(queue.contains(Task::VendorDecline(Framework::SourcePoint)));
        assert!(!queue.contains(Task::VendorDecline(Framework::Tcf)));

        queue.clear();
        assert_eq!(queue.next_deadline(), None);
    }

    #[test]
    fn test_jitter_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let base = Duration::from_millis(400);
        let jitter = Duration::from_millis(400);

        for _ in 0..100 {
            let delay = jittered(&mut rng, base, jitter);
            assert!(delay >= base && delay <= base + jitter);
        }
        assert_eq!(jittered(&mut rng, base, Duration::ZERO), base);
    }
}
