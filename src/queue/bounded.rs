//! Fixed-capacity FIFO buffer with configurable overflow handling.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// What to do when a push arrives and the buffer is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest entry to make room for the new one.
    DropOldest,
    /// Silently discard the incoming entry.
    DropNewest,
    /// Discard the incoming entry and report it via the callback.
    Reject,
}

/// Invoked with the entry a full buffer discarded. Under `DropOldest`
/// that is the evicted entry; under `Reject` it is the incoming one.
pub type OverflowCallback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Cumulative counters for a buffer's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferStats {
    pub pushed: u64,
    pub popped: u64,
    pub overflowed: u64,
}

/// Circular FIFO buffer that never grows past its capacity.
pub struct BoundedBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
    policy: OverflowPolicy,
    on_overflow: Option<OverflowCallback<T>>,
    stats: BufferStats,
}

impl<T> BoundedBuffer<T> {
    /// Capacity is clamped to at least 1.
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
            policy,
            on_overflow: None,
            stats: BufferStats::default(),
        }
    }

    pub fn with_overflow_callback(mut self, callback: OverflowCallback<T>) -> Self {
        self.on_overflow = Some(callback);
        self
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> BufferStats {
        self.stats
    }

    /// Push a value, applying the overflow policy when full. Returns
    /// true if the value was accepted into the buffer.
    pub fn push(&mut self, value: T) -> bool {
        if self.items.len() < self.capacity {
            self.items.push_back(value);
            self.stats.pushed += 1;
            return true;
        }

        self.stats.overflowed += 1;
        match self.policy {
            OverflowPolicy::DropOldest => {
                if let Some(dropped) = self.items.pop_front() {
                    if let Some(callback) = &self.on_overflow {
                        callback(&dropped);
                    }
                }
                self.items.push_back(value);
                self.stats.pushed += 1;
                true
            }
            OverflowPolicy::DropNewest => false,
            OverflowPolicy::Reject => {
                if let Some(callback) = &self.on_overflow {
                    callback(&value);
                }
                false
            }
        }
    }

    pub fn pop(&mut self) -> Option<T> {
        let value = self.items.pop_front();
        if value.is_some() {
            self.stats.popped += 1;
        }
        value
    }

    /// Remove and return up to `n` entries from the front.
    pub fn drain_n(&mut self, n: usize) -> Vec<T> {
        let count = n.min(self.items.len());
        self.stats.popped += count as u64;
        self.items.drain(..count).collect()
    }

    /// Remove and return everything, oldest first.
    pub fn drain_all(&mut self) -> Vec<T> {
        self.stats.popped += self.items.len() as u64;
        self.items.drain(..).collect()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn preserves_fifo_order() {
        let mut buffer = BoundedBuffer::new(4, OverflowPolicy::DropOldest);
        for n in 1..=4 {
            assert!(buffer.push(n));
        }
        assert_eq!(buffer.drain_all(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn drop_oldest_evicts_front_and_notifies() {
        let dropped = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&dropped);
        let mut buffer = BoundedBuffer::new(2, OverflowPolicy::DropOldest)
            .with_overflow_callback(Arc::new(move |n: &usize| {
                seen.store(*n, Ordering::SeqCst);
            }));

        buffer.push(1);
        buffer.push(2);
        assert!(buffer.push(3));

        assert_eq!(dropped.load(Ordering::SeqCst), 1);
        assert_eq!(buffer.drain_all(), vec![2, 3]);
        assert_eq!(buffer.stats().overflowed, 1);
    }

    #[test]
    fn drop_newest_discards_incoming_silently() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut buffer = BoundedBuffer::new(2, OverflowPolicy::DropNewest)
            .with_overflow_callback(Arc::new(move |_: &usize| {
                counter.fetch_add(1, Ordering::SeqCst);
            }));

        buffer.push(1);
        buffer.push(2);
        assert!(!buffer.push(3));

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(buffer.drain_all(), vec![1, 2]);
    }

    #[test]
    fn reject_reports_incoming_entry() {
        let rejected = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&rejected);
        let mut buffer = BoundedBuffer::new(1, OverflowPolicy::Reject)
            .with_overflow_callback(Arc::new(move |n: &usize| {
                seen.store(*n, Ordering::SeqCst);
            }));

        buffer.push(7);
        assert!(!buffer.push(8));
        assert_eq!(rejected.load(Ordering::SeqCst), 8);
        assert_eq!(buffer.pop(), Some(7));
    }

    #[test]
    fn zero_capacity_is_clamped_to_one() {
        let mut buffer = BoundedBuffer::new(0, OverflowPolicy::Reject);
        assert_eq!(buffer.capacity(), 1);
        assert!(buffer.push(1));
        assert!(!buffer.push(2));
    }

    #[test]
    fn drain_n_takes_front_slice() {
        let mut buffer = BoundedBuffer::new(8, OverflowPolicy::Reject);
        for n in 1..=5 {
            buffer.push(n);
        }
        assert_eq!(buffer.drain_n(3), vec![1, 2, 3]);
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.stats().popped, 3);
    }
}
