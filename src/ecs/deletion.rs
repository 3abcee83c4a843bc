//! Deferred entity destruction
//!
//! Destruction requests queue here and are reclaimed at most `K` per tick, so
//! a burst of deletions cannot blow the frame budget.

use std::collections::VecDeque;

use ahash::AHashSet;

use crate::core::types::EntityHandle;

/// FIFO of handles pending destruction, de-duplicated
#[derive(Debug, Default)]
pub struct DeletionQueue {
    queue: VecDeque<EntityHandle>,
    pending: AHashSet<EntityHandle>,
}

impl DeletionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a handle; returns false if it was already queued
    pub fn push(&mut self, handle: EntityHandle) -> bool {
        if !self.pending.insert(handle) {
            return false;
        }
        self.queue.push_back(handle);
        true
    }

    /// Dequeue up to `limit` handles in submission order
    pub fn drain(&mut self, limit: usize) -> Vec<EntityHandle> {
        let count = limit.min(self.queue.len());
        let batch: Vec<EntityHandle> = self.queue.drain(..count).collect();
        for handle in &batch {
            self.pending.remove(handle);
        }
        batch
    }

    pub fn contains(&self, handle: EntityHandle) -> bool {
        self.pending.contains(&handle)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_is_bounded_and_fifo() {
        let mut queue = DeletionQueue::new();
        for i in 0..10 {
            queue.push(EntityHandle::new(i, 0));
        }

        let first = queue.drain(4);
        assert_eq!(first.len(), 4);
        assert_eq!(first[0], EntityHandle::new(0, 0));
        assert_eq!(first[3], EntityHandle::new(3, 0));
        assert_eq!(queue.len(), 6);

        let rest = queue.drain(100);
        assert_eq!(rest.len(), 6);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_duplicate_push_ignored() {
        let mut queue = DeletionQueue::new();
        let h = EntityHandle::new(7, 2);
        assert!(queue.push(h));
        assert!(!queue.push(h));
        assert_eq!(queue.len(), 1);

        queue.drain(1);
        assert!(!queue.contains(h));
        // Can be queued again once drained
        assert!(queue.push(h));
    }
}
