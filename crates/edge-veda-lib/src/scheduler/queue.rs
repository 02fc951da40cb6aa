//! Priority queue for admitted tasks
//!
//! Orders strictly by priority and keeps insertion order within a priority.

use crate::models::{TaskId, TaskPriority, Workload};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A queued task with its caller-side payload
#[derive(Debug)]
pub struct QueueEntry<T> {
    pub id: TaskId,
    pub priority: TaskPriority,
    pub workload: Workload,
    seq: u64,
    pub payload: T,
}

impl<T> PartialEq for QueueEntry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl<T> Eq for QueueEntry<T> {}

impl<T> PartialOrd for QueueEntry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for QueueEntry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority first, then earlier insertion
        match self.priority.cmp(&other.priority) {
            Ordering::Equal => other.seq.cmp(&self.seq),
            ord => ord,
        }
    }
}

/// Stable max-priority queue
#[derive(Debug)]
pub struct TaskQueue<T> {
    heap: BinaryHeap<QueueEntry<T>>,
    next_seq: u64,
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TaskQueue<T> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    pub fn push(&mut self, id: TaskId, priority: TaskPriority, workload: Workload, payload: T) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(QueueEntry {
            id,
            priority,
            workload,
            seq,
            payload,
        });
    }

    pub fn pop(&mut self) -> Option<QueueEntry<T>> {
        self.heap.pop()
    }

    pub fn peek(&self) -> Option<&QueueEntry<T>> {
        self.heap.peek()
    }

    /// Remove a specific entry, wherever it sits in the queue
    pub fn remove(&mut self, id: TaskId) -> Option<QueueEntry<T>> {
        let mut entries = std::mem::take(&mut self.heap).into_vec();
        let removed = entries
            .iter()
            .position(|e| e.id == id)
            .map(|pos| entries.swap_remove(pos));
        self.heap = BinaryHeap::from(entries);
        removed
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.heap.iter().any(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn count_priority(&self, priority: TaskPriority) -> usize {
        self.heap.iter().filter(|e| e.priority == priority).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push(queue: &mut TaskQueue<()>, id: u64, priority: TaskPriority) {
        queue.push(TaskId(id), priority, Workload::Text, ());
    }

    #[test]
    fn test_priority_order() {
        let mut queue = TaskQueue::new();
        push(&mut queue, 1, TaskPriority::Low);
        push(&mut queue, 2, TaskPriority::Normal);
        push(&mut queue, 3, TaskPriority::High);

        let order: Vec<_> = std::iter::from_fn(|| queue.pop())
            .map(|e| e.priority)
            .collect();
        assert_eq!(
            order,
            vec![TaskPriority::High, TaskPriority::Normal, TaskPriority::Low]
        );
    }

    #[test]
    fn test_fifo_within_priority() {
        let mut queue = TaskQueue::new();
        for id in 1..=5 {
            push(&mut queue, id, TaskPriority::Normal);
        }
        push(&mut queue, 6, TaskPriority::High);

        let ids: Vec<_> = std::iter::from_fn(|| queue.pop()).map(|e| e.id.0).collect();
        assert_eq!(ids, vec![6, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_remove_keeps_order() {
        let mut queue = TaskQueue::new();
        push(&mut queue, 1, TaskPriority::Low);
        push(&mut queue, 2, TaskPriority::Low);
        push(&mut queue, 3, TaskPriority::High);
        push(&mut queue, 4, TaskPriority::Low);

        assert!(queue.remove(TaskId(2)).is_some());
        assert!(queue.remove(TaskId(2)).is_none());
        assert!(!queue.contains(TaskId(2)));
        assert_eq!(queue.count_priority(TaskPriority::Low), 2);

        let ids: Vec<_> = std::iter::from_fn(|| queue.pop()).map(|e| e.id.0).collect();
        assert_eq!(ids, vec![3, 1, 4]);
    }
}
