//! Bounded FIFO of submissions awaiting dispatch.
//!
//! Overflow is lossy on purpose: inserting into a full queue evicts the
//! single oldest entry and always accepts the newest one.

use std::collections::VecDeque;

use hxdbg_core::types::{EventRecord, SourceId};

use crate::reply::ReplyHandle;

#[derive(Debug)]
pub struct PendingEntry {
    pub record: EventRecord,
    pub source_id: Option<SourceId>,
    pub reply: ReplyHandle,
    pub enqueued_at_ms: u64,
    /// Submission sequence number, 1-based and monotonically increasing.
    pub seq: u64,
}

#[derive(Debug)]
pub struct PendingQueue {
    entries: VecDeque<PendingEntry>,
    capacity: usize,
    last_seq: u64,
}

impl PendingQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            last_seq: 0,
        }
    }

    /// Enqueue a submission. Returns the evicted entry when the queue was
    /// already at capacity.
    pub fn push(
        &mut self,
        record: EventRecord,
        source_id: Option<SourceId>,
        reply: ReplyHandle,
        now_ms: u64,
    ) -> Option<PendingEntry> {
        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_front()
        } else {
            None
        };

        self.last_seq += 1;
        self.entries.push_back(PendingEntry {
            record,
            source_id,
            reply,
            enqueued_at_ms: now_ms,
            seq: self.last_seq,
        });
        evicted
    }

    pub fn pop_front(&mut self) -> Option<PendingEntry> {
        self.entries.pop_front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Sequence numbers of retained entries, oldest first.
    pub fn retained_seqs(&self) -> Vec<u64> {
        self.entries.iter().map(|e| e.seq).collect()
    }

    /// Age of the oldest entry.
    pub fn oldest_age_ms(&self, now_ms: u64) -> Option<u64> {
        self.entries
            .front()
            .map(|e| now_ms.saturating_sub(e.enqueued_at_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hxdbg_core::types::Ack;
    use std::sync::{Arc, Mutex};

    fn record(n: u64) -> EventRecord {
        EventRecord {
            kind: "HTMX_EVENT".to_owned(),
            timestamp: String::new(),
            source_tag: format!("src-{n}"),
            payload: serde_json::json!({ "n": n }),
        }
    }

    #[test]
    fn fifo_order() {
        let mut q = PendingQueue::new(4);
        for n in 1..=3 {
            assert!(q.push(record(n), None, ReplyHandle::noop(), n).is_none());
        }
        let drained: Vec<u64> = std::iter::from_fn(|| q.pop_front().map(|e| e.seq)).collect();
        assert_eq!(drained, vec![1, 2, 3]);
        assert!(q.is_empty());
    }

    #[test]
    fn overflow_evicts_single_oldest() {
        let mut q = PendingQueue::new(2);
        q.push(record(1), None, ReplyHandle::noop(), 0);
        q.push(record(2), None, ReplyHandle::noop(), 0);
        let evicted = q
            .push(record(3), None, ReplyHandle::noop(), 0)
            .expect("full queue evicts");
        assert_eq!(evicted.seq, 1);
        assert_eq!(evicted.record.source_tag, "src-1");
        assert_eq!(q.retained_seqs(), vec![2, 3]);
    }

    #[test]
    fn never_exceeds_capacity_and_keeps_newest() {
        let mut q = PendingQueue::new(1000);
        for n in 1..=1500 {
            q.push(record(n), None, ReplyHandle::noop(), n);
            assert!(q.len() <= 1000);
        }
        assert_eq!(q.len(), 1000);
        let seqs = q.retained_seqs();
        assert_eq!(seqs.first(), Some(&501));
        assert_eq!(seqs.last(), Some(&1500));
    }

    #[test]
    fn evicted_reply_still_fires() {
        let acks = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&acks);
        let mut q = PendingQueue::new(1);
        q.push(
            record(1),
            None,
            ReplyHandle::new(move |ack| sink.lock().expect("lock").push(ack)),
            0,
        );
        let evicted = q.push(record(2), None, ReplyHandle::noop(), 0);
        drop(evicted);
        assert_eq!(*acks.lock().expect("lock"), vec![Ack::DROPPED]);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut q = PendingQueue::new(0);
        assert_eq!(q.capacity(), 1);
        q.push(record(1), None, ReplyHandle::noop(), 0);
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn oldest_age() {
        let mut q = PendingQueue::new(3);
        assert_eq!(q.oldest_age_ms(100), None);
        q.push(record(1), None, ReplyHandle::noop(), 40);
        q.push(record(2), None, ReplyHandle::noop(), 90);
        assert_eq!(q.oldest_age_ms(100), Some(60));
    }
}
