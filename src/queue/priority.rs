//! Binary min-heap with stable FIFO ordering inside a priority class.
//!
//! Every enqueued entry is tagged with a monotonically increasing
//! sequence number, and the heap orders by `(priority, sequence)`.
//! Lower priority values dequeue first; equal priorities dequeue in
//! insertion order. A position index keyed by entry handle makes
//! `update_priority` and targeted removal O(log n) instead of a scan.

use std::collections::HashMap;

struct Entry<T> {
    key: u64,
    priority: u8,
    seq: u64,
    value: T,
}

/// Min-heap over `(priority, seq)` with handle-based reprioritization.
pub struct PriorityQueue<T> {
    heap: Vec<Entry<T>>,
    /// Entry handle -> current index in `heap`.
    positions: HashMap<u64, usize>,
    next_key: u64,
    next_seq: u64,
}

impl<T> PriorityQueue<T> {
    pub fn new() -> Self {
        Self {
            heap: Vec::new(),
            positions: HashMap::new(),
            next_key: 0,
            next_seq: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Insert a value at the given priority. Returns a handle usable
    /// with [`update_priority`](Self::update_priority).
    pub fn enqueue(&mut self, value: T, priority: u8) -> u64 {
        let key = self.next_key;
        self.next_key += 1;
        let seq = self.next_seq;
        self.next_seq += 1;

        let index = self.heap.len();
        self.heap.push(Entry {
            key,
            priority,
            seq,
            value,
        });
        self.positions.insert(key, index);
        self.sift_up(index);
        key
    }

    /// Remove and return the entry with the smallest `(priority, seq)`.
    pub fn dequeue(&mut self) -> Option<T> {
        if self.heap.is_empty() {
            return None;
        }
        let last = self.heap.len() - 1;
        self.swap(0, last);
        let entry = self.heap.pop()?;
        self.positions.remove(&entry.key);
        if !self.heap.is_empty() {
            self.sift_down(0);
        }
        Some(entry.value)
    }

    /// Peek at the next value without removing it.
    pub fn peek(&self) -> Option<&T> {
        self.heap.first().map(|e| &e.value)
    }

    /// Change the priority of a live entry. The entry keeps its
    /// original sequence number, so it still orders FIFO among
    /// entries that share its new priority class from before. Returns
    /// false if the handle is no longer in the queue.
    pub fn update_priority(&mut self, key: u64, priority: u8) -> bool {
        let Some(&index) = self.positions.get(&key) else {
            return false;
        };
        let old = self.heap[index].priority;
        if old == priority {
            return true;
        }
        self.heap[index].priority = priority;
        if priority < old {
            self.sift_up(index);
        } else {
            self.sift_down(index);
        }
        true
    }

    /// Remove every entry matching the predicate, returning the
    /// removed values. The heap invariant is rebuilt once afterwards.
    pub fn remove_if<F>(&mut self, mut predicate: F) -> Vec<T>
    where
        F: FnMut(&T) -> bool,
    {
        let mut removed = Vec::new();
        let mut kept = Vec::new();
        for entry in self.heap.drain(..) {
            if predicate(&entry.value) {
                removed.push(entry.value);
            } else {
                kept.push(entry);
            }
        }
        self.heap = kept;
        self.rebuild();
        removed
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.positions.clear();
    }

    fn less(&self, a: usize, b: usize) -> bool {
        let (ea, eb) = (&self.heap[a], &self.heap[b]);
        (ea.priority, ea.seq) < (eb.priority, eb.seq)
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        self.positions.insert(self.heap[a].key, a);
        self.positions.insert(self.heap[b].key, b);
    }

    fn sift_up(&mut self, mut index: usize) {
        while index > 0 {
            let parent = (index - 1) / 2;
            if self.less(index, parent) {
                self.swap(index, parent);
                index = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut index: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * index + 1;
            let right = left + 1;
            let mut smallest = index;
            if left < len && self.less(left, smallest) {
                smallest = left;
            }
            if right < len && self.less(right, smallest) {
                smallest = right;
            }
            if smallest == index {
                break;
            }
            self.swap(index, smallest);
            index = smallest;
        }
    }

    fn rebuild(&mut self) {
        self.positions.clear();
        for (index, entry) in self.heap.iter().enumerate() {
            self.positions.insert(entry.key, index);
        }
        // Floyd heapify: sift down every internal node.
        if self.heap.len() > 1 {
            for index in (0..self.heap.len() / 2).rev() {
                self.sift_down(index);
            }
        }
    }
}

impl<T> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dequeues_lowest_priority_first() {
        let mut queue = PriorityQueue::new();
        queue.enqueue("low", 9);
        queue.enqueue("high", 1);
        queue.enqueue("mid", 5);

        assert_eq!(queue.dequeue(), Some("high"));
        assert_eq!(queue.dequeue(), Some("mid"));
        assert_eq!(queue.dequeue(), Some("low"));
        assert_eq!(queue.dequeue(), None);
    }

    #[test]
    fn equal_priorities_dequeue_in_insertion_order() {
        let mut queue = PriorityQueue::new();
        for name in ["a", "b", "c", "d"] {
            queue.enqueue(name, 5);
        }
        let drained: Vec<_> = std::iter::from_fn(|| queue.dequeue()).collect();
        assert_eq!(drained, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn interleaved_priorities_keep_fifo_within_class() {
        let mut queue = PriorityQueue::new();
        queue.enqueue("a1", 3);
        queue.enqueue("b1", 1);
        queue.enqueue("a2", 3);
        queue.enqueue("b2", 1);
        queue.enqueue("a3", 3);

        let drained: Vec<_> = std::iter::from_fn(|| queue.dequeue()).collect();
        assert_eq!(drained, vec!["b1", "b2", "a1", "a2", "a3"]);
    }

    #[test]
    fn update_priority_moves_entry() {
        let mut queue = PriorityQueue::new();
        queue.enqueue("first", 1);
        let key = queue.enqueue("promoted", 9);
        queue.enqueue("second", 2);

        assert!(queue.update_priority(key, 0));
        assert_eq!(queue.dequeue(), Some("promoted"));
        assert_eq!(queue.dequeue(), Some("first"));
        assert_eq!(queue.dequeue(), Some("second"));
    }

    #[test]
    fn update_priority_on_dequeued_entry_returns_false() {
        let mut queue = PriorityQueue::new();
        let key = queue.enqueue("gone", 5);
        queue.dequeue();
        assert!(!queue.update_priority(key, 1));
    }

    #[test]
    fn remove_if_filters_and_preserves_order() {
        let mut queue = PriorityQueue::new();
        for n in 0..10u32 {
            queue.enqueue(n, (n % 3) as u8);
        }
        let removed = queue.remove_if(|n| n % 2 == 0);
        assert_eq!(removed.len(), 5);
        assert_eq!(queue.len(), 5);

        let mut previous: Option<(u8, u32)> = None;
        while let Some(n) = queue.dequeue() {
            assert_eq!(n % 2, 1);
            let class = (n % 3) as u8;
            if let Some((prev_class, _)) = previous {
                assert!(class >= prev_class);
            }
            previous = Some((class, n));
        }
    }
}
