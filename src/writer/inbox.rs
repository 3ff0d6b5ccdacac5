//! The bounded, drop-oldest inbox backing a single writer key.
//!
//! A plain `crossbeam_channel::bounded` channel rejects or blocks on a full
//! queue; the spec instead wants the *oldest* unwritten record evicted so
//! the listener is never back-pressured. A `VecDeque` behind a
//! `parking_lot::Mutex` gives that eviction directly, in the same
//! lock-then-mutate shape the teacher uses for its line-buffer `VecDeque`
//! in `backend::async`.

use crate::record::LogRecord;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub struct Inbox {
    queue: Mutex<VecDeque<LogRecord>>,
    capacity: usize,
    /// Shared with the pool's per-device drop counter so overflow on any
    /// date for a device accumulates into one `dropped_total{device=...}`.
    dropped_total: Arc<AtomicU64>,
}

impl Inbox {
    pub fn new(capacity: usize, dropped_total: Arc<AtomicU64>) -> Self {
        Inbox {
            queue: Mutex::new(VecDeque::with_capacity(capacity.min(256))),
            capacity,
            dropped_total,
        }
    }

    /// Never blocks. Drops the oldest queued record on overflow.
    pub fn push(&self, record: LogRecord) {
        let mut q = self.queue.lock();
        if q.len() >= self.capacity {
            q.pop_front();
            self.dropped_total.fetch_add(1, Ordering::Relaxed);
        }
        q.push_back(record);
    }

    /// Pulls up to `max` records, oldest first, without blocking.
    pub fn drain_batch(&self, max: usize) -> Vec<LogRecord> {
        let mut q = self.queue.lock();
        let n = max.min(q.len());
        q.drain(..n).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    pub fn dropped_total(&self) -> u64 {
        self.dropped_total.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::IpAddr;

    fn rec(tag: &str) -> LogRecord {
        LogRecord::new(
            IpAddr::from([10, 0, 0, 1]),
            "dev".to_string(),
            tag.as_bytes().to_vec(),
        )
    }

    #[test]
    fn overflow_drops_oldest_and_counts() {
        let counter = Arc::new(AtomicU64::new(0));
        let inbox = Inbox::new(2, counter.clone());
        inbox.push(rec("a"));
        inbox.push(rec("b"));
        inbox.push(rec("c")); // evicts "a"

        let batch = inbox.drain_batch(10);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].payload, b"b");
        assert_eq!(batch[1].payload, b"c");
        assert_eq!(counter.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn drain_batch_respects_max() {
        let inbox = Inbox::new(10, Arc::new(AtomicU64::new(0)));
        for i in 0..5 {
            inbox.push(rec(&i.to_string()));
        }
        let first = inbox.drain_batch(3);
        assert_eq!(first.len(), 3);
        let rest = inbox.drain_batch(10);
        assert_eq!(rest.len(), 2);
        assert!(inbox.is_empty());
    }
}
