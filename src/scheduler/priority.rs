//! Job prioritization.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// Heap slot. Orders by priority, then by arrival.
#[derive(Debug)]
struct Slot<T> {
    rank: (i32, Reverse<u64>),
    item: T,
}

impl<T> PartialEq for Slot<T> {
    fn eq(&self, other: &Self) -> bool {
        self.rank == other.rank
    }
}

impl<T> Eq for Slot<T> {}

impl<T> PartialOrd for Slot<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Slot<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank.cmp(&other.rank)
    }
}

/// Max-priority queue, FIFO among equal priorities.
pub struct PriorityQueue<T> {
    heap: BinaryHeap<Slot<T>>,
    arrivals: u64,
}

impl<T> PriorityQueue<T> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            arrivals: 0,
        }
    }

    pub fn push(&mut self, item: T, priority: i32) {
        let rank = (priority, Reverse(self.arrivals));
        self.arrivals += 1;
        self.heap.push(Slot { rank, item });
    }

    pub fn pop(&mut self) -> Option<T> {
        self.heap.pop().map(|slot| slot.item)
    }

    pub fn peek(&self) -> Option<&T> {
        self.heap.peek().map(|slot| &slot.item)
    }

    /// Remove every item, highest priority first.
    pub fn drain(&mut self) -> Vec<T> {
        let mut items = Vec::with_capacity(self.heap.len());
        while let Some(item) = self.pop() {
            items.push(item);
        }
        items
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
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
    fn higher_priority_first_then_fifo() {
        let mut q = PriorityQueue::new();
        q.push("a", 1);
        q.push("b", 5);
        q.push("c", 1);
        assert_eq!(q.pop(), Some("b"));
        assert_eq!(q.pop(), Some("a"));
        assert_eq!(q.pop(), Some("c"));
        assert!(q.pop().is_none());
    }

    #[test]
    fn negative_priorities_sort_below_default() {
        let mut q = PriorityQueue::new();
        q.push("low", -3);
        q.push("default", 0);
        assert_eq!(q.peek(), Some(&"default"));
    }

    #[test]
    fn drain_empties_in_dispatch_order() {
        let mut q = PriorityQueue::new();
        for (i, p) in [0, 0, 0, 0, 9].into_iter().enumerate() {
            q.push(i, p);
        }
        assert_eq!(q.drain(), vec![4, 0, 1, 2, 3]);
        assert!(q.is_empty());
    }
}
