//! Byte-bounded export queue.
//!
//! The queue sits between request threads and the uploader task. Capacity
//! is counted in bytes rather than entries. When the bound is reached new
//! traces are dropped, never blocked on; a slow collector cannot stall
//! request handling.

use parking_lot::Mutex;
use std::collections::VecDeque;

struct Entry {
    key: String,
    bytes: Vec<u8>,
}

impl Entry {
    fn size(&self) -> usize {
        self.bytes.len() + self.key.len()
    }
}

struct QueueState {
    entries: VecDeque<Entry>,
    queued_bytes: usize,
    over_capacity: bool,
}

/// FIFO of `(signature, encoded trace)` entries with a byte bound.
///
/// The backpressure flag is edge-triggered: entering the full state logs one
/// warning and leaving it logs one line, however many drops happen in
/// between.
pub struct ExportQueue {
    max_queue_bytes: usize,
    state: Mutex<QueueState>,
}

impl ExportQueue {
    /// An empty queue refusing entries once `max_queue_bytes` is reached.
    pub fn new(max_queue_bytes: usize) -> Self {
        Self {
            max_queue_bytes,
            state: Mutex::new(QueueState {
                entries: VecDeque::new(),
                queued_bytes: 0,
                over_capacity: false,
            }),
        }
    }

    /// Appends an entry unless it would push the queue to or past its byte
    /// bound. An entry's size is its payload length plus its key length.
    ///
    /// Returns whether the entry was accepted.
    pub fn enqueue(&self, key: &str, bytes: Vec<u8>) -> bool {
        let entry = Entry {
            key: key.to_string(),
            bytes,
        };
        let entry_size = entry.size();

        let mut state = self.state.lock();
        if state.queued_bytes + entry_size >= self.max_queue_bytes {
            if !state.over_capacity {
                state.over_capacity = true;
                tracing::warn!(
                    queued_bytes = state.queued_bytes,
                    entry_bytes = entry_size,
                    max_queue_bytes = self.max_queue_bytes,
                    "trace queue is full, dropping traces until it drains"
                );
            }
            return false;
        }

        state.queued_bytes += entry_size;
        state.entries.push_back(entry);
        if state.over_capacity {
            state.over_capacity = false;
            tracing::info!(
                queued_bytes = state.queued_bytes,
                "trace queue resumed accepting traces"
            );
        }
        true
    }

    /// Removes entries FIFO until the queue is empty or the removed size
    /// reaches `max_bytes`. Entries are taken whole, so the returned batch
    /// can exceed `max_bytes` by at most one entry.
    pub fn drain_batch(&self, max_bytes: usize) -> Vec<(String, Vec<u8>)> {
        let mut state = self.state.lock();
        let mut batch = Vec::new();
        let mut batch_bytes = 0;
        while let Some(entry) = state.entries.pop_front() {
            let entry_size = entry.size();
            batch_bytes += entry_size;
            state.queued_bytes -= entry_size;
            batch.push((entry.key, entry.bytes));
            if batch_bytes >= max_bytes {
                break;
            }
        }
        batch
    }

    /// Returns `true` when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Bytes currently held, counting both payloads and keys.
    pub fn queued_bytes(&self) -> usize {
        self.state.lock().queued_bytes
    }

    /// Returns `true` while the queue is refusing new entries.
    pub fn is_over_capacity(&self) -> bool {
        self.state.lock().over_capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(len: usize) -> Vec<u8> {
        vec![0u8; len]
    }

    #[test]
    fn accepts_entries_under_the_bound() {
        let queue = ExportQueue::new(100);
        assert!(queue.enqueue("k", payload(10)));
        assert!(queue.enqueue("k", payload(10)));
        assert_eq!(queue.queued_bytes(), 22);
        assert!(!queue.is_over_capacity());
    }

    #[test]
    fn entry_size_counts_the_key() {
        let queue = ExportQueue::new(20);
        // 15 payload + 5 key = 20, which reaches the bound.
        assert!(!queue.enqueue("kkkkk", payload(15)));
        assert!(queue.is_empty());
    }

    #[test]
    fn drops_at_the_bound_and_resumes_after_a_drain() {
        let queue = ExportQueue::new(40);
        // 19 bytes each with the one-byte key.
        assert!(queue.enqueue("k", payload(18)));
        assert!(queue.enqueue("k", payload(18)));
        // 38 + 19 >= 40: dropped.
        assert!(!queue.enqueue("k", payload(18)));
        assert!(queue.is_over_capacity());
        assert_eq!(queue.queued_bytes(), 38);

        let drained = queue.drain_batch(usize::MAX);
        assert_eq!(drained.len(), 2);
        assert_eq!(queue.queued_bytes(), 0);
        // Still flagged until an enqueue succeeds.
        assert!(queue.is_over_capacity());

        assert!(queue.enqueue("k", payload(18)));
        assert!(!queue.is_over_capacity());
    }

    #[test]
    fn drains_in_fifo_order() {
        let queue = ExportQueue::new(1000);
        for index in 0..5u8 {
            assert!(queue.enqueue(&format!("k{index}"), vec![index]));
        }

        let drained = queue.drain_batch(usize::MAX);
        let keys: Vec<_> = drained.iter().map(|(key, _)| key.as_str()).collect();
        assert_eq!(keys, vec!["k0", "k1", "k2", "k3", "k4"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn batch_may_exceed_the_cap_by_one_entry() {
        let queue = ExportQueue::new(1000);
        for _ in 0..3 {
            assert!(queue.enqueue("k", payload(9)));
        }

        // Each entry is 10 bytes; the second entry crosses the 15-byte cap
        // and is included whole.
        let first = queue.drain_batch(15);
        assert_eq!(first.len(), 2);
        let second = queue.drain_batch(15);
        assert_eq!(second.len(), 1);
        assert!(queue.is_empty());
        assert_eq!(queue.queued_bytes(), 0);
    }

    #[test]
    fn drain_on_empty_returns_nothing() {
        let queue = ExportQueue::new(100);
        assert!(queue.drain_batch(50).is_empty());
    }
}
