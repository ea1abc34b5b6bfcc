// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Priority queue of pending runs.
//!
//! A binary max-heap ordered by (priority DESC, created_at ASC), with each
//! item's current heap index tracked in a run-id map that is updated on
//! every swap. That index is what makes `remove` and `update_priority`
//! O(log n) instead of a scan.
//!
//! The queue is process-local; it is rebuilt from the store's pending runs
//! at startup, before any submitter traffic is accepted.

use crate::error::SchedulerError;
use parking_lot::RwLock;
use std::collections::HashMap;
use tp_core::{RunId, WorkItem};
use tp_storage::{RunStore, ServiceStore, StoreError};
use tracing::debug;

#[derive(Debug, Clone)]
struct Entry {
    item: WorkItem,
    /// Insertion sequence; breaks ties on (priority, created_at).
    seq: u64,
}

impl Entry {
    fn ranks_above(&self, other: &Entry) -> bool {
        use std::cmp::Ordering;
        match self.item.priority.cmp(&other.item.priority) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => match self.item.created_at.cmp(&other.item.created_at) {
                Ordering::Less => true,
                Ordering::Greater => false,
                Ordering::Equal => self.seq < other.seq,
            },
        }
    }
}

#[derive(Default)]
struct Inner {
    heap: Vec<Entry>,
    /// run id → current heap index. Maintained on every swap.
    pos: HashMap<RunId, usize>,
    next_seq: u64,
}

impl Inner {
    fn swap(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        self.pos.insert(self.heap[a].item.run_id, a);
        self.pos.insert(self.heap[b].item.run_id, b);
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if self.heap[i].ranks_above(&self.heap[parent]) {
                self.swap(i, parent);
                i = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut i: usize) {
        loop {
            let left = 2 * i + 1;
            let right = 2 * i + 2;
            let mut top = i;
            if left < self.heap.len() && self.heap[left].ranks_above(&self.heap[top]) {
                top = left;
            }
            if right < self.heap.len() && self.heap[right].ranks_above(&self.heap[top]) {
                top = right;
            }
            if top == i {
                break;
            }
            self.swap(i, top);
            i = top;
        }
    }

    fn push(&mut self, item: WorkItem) -> Result<(), SchedulerError> {
        if self.pos.contains_key(&item.run_id) {
            return Err(SchedulerError::AlreadyQueued(item.run_id));
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        let index = self.heap.len();
        self.pos.insert(item.run_id, index);
        self.heap.push(Entry { item, seq });
        self.sift_up(index);
        Ok(())
    }

    fn pop(&mut self) -> Option<WorkItem> {
        self.remove_at(0)
    }

    fn remove_at(&mut self, i: usize) -> Option<WorkItem> {
        if i >= self.heap.len() {
            return None;
        }
        let last = self.heap.len() - 1;
        self.swap(i, last);
        let entry = match self.heap.pop() {
            Some(entry) => entry,
            None => return None,
        };
        self.pos.remove(&entry.item.run_id);
        if i < self.heap.len() {
            self.sift_down(i);
            self.sift_up(i);
        }
        Some(entry.item)
    }

    fn clear(&mut self) {
        self.heap.clear();
        self.pos.clear();
    }

    /// Pop from a detached copy of the heap, preserving the real one.
    fn sorted_prefix(&self, n: usize) -> Vec<WorkItem> {
        let mut scratch: Vec<Entry> = self.heap.clone();
        let mut out = Vec::with_capacity(n.min(scratch.len()));
        while out.len() < n && !scratch.is_empty() {
            let last = scratch.len() - 1;
            scratch.swap(0, last);
            if let Some(entry) = scratch.pop() {
                out.push(entry.item);
            }
            // Restore the heap property on the shrunk scratch vec.
            let mut i = 0;
            loop {
                let (left, right) = (2 * i + 1, 2 * i + 2);
                let mut top = i;
                if left < scratch.len() && scratch[left].ranks_above(&scratch[top]) {
                    top = left;
                }
                if right < scratch.len() && scratch[right].ranks_above(&scratch[top]) {
                    top = right;
                }
                if top == i {
                    break;
                }
                scratch.swap(i, top);
                i = top;
            }
        }
        out
    }
}

/// Thread-safe priority queue of pending runs, deduplicated by run id.
#[derive(Default)]
pub struct WorkQueue {
    inner: RwLock<Inner>,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a work item. Fails with [`SchedulerError::AlreadyQueued`]
    /// when the run already has a queued item; the queue is unchanged.
    pub fn push(&self, item: WorkItem) -> Result<(), SchedulerError> {
        self.inner.write().push(item)
    }

    /// Remove and return the highest-ordered item.
    pub fn pop(&self) -> Option<WorkItem> {
        self.inner.write().pop()
    }

    /// The highest-ordered item, without removing it.
    pub fn peek(&self) -> Option<WorkItem> {
        self.inner.read().heap.first().map(|e| e.item.clone())
    }

    /// Up to `n` items in strict queue order, without removing any.
    pub fn peek_batch(&self, n: usize) -> Vec<WorkItem> {
        self.inner.read().sorted_prefix(n)
    }

    /// Remove the item for `run_id` if present; silent when absent.
    pub fn remove(&self, run_id: RunId) {
        let mut inner = self.inner.write();
        if let Some(i) = inner.pos.get(&run_id).copied() {
            inner.remove_at(i);
        }
    }

    /// Change an item's priority and reheapify. Fails with
    /// [`SchedulerError::NotQueued`] when absent.
    pub fn update_priority(&self, run_id: RunId, priority: i32) -> Result<(), SchedulerError> {
        let mut inner = self.inner.write();
        let i = inner.pos.get(&run_id).copied().ok_or(SchedulerError::NotQueued(run_id))?;
        inner.heap[i].item.priority = priority;
        inner.sift_down(i);
        inner.sift_up(i);
        Ok(())
    }

    pub fn contains(&self, run_id: RunId) -> bool {
        self.inner.read().pos.contains_key(&run_id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().heap.is_empty()
    }

    /// All queued items in queue order.
    pub fn snapshot(&self) -> Vec<WorkItem> {
        let inner = self.inner.read();
        inner.sorted_prefix(inner.heap.len())
    }

    /// Clear and rebuild from the store's pending runs. Runs whose service
    /// has been deleted are skipped (the submitter deleted the service; no
    /// invariant of its view is violated). Any other store error aborts the
    /// load without installing partial state. Returns the item count.
    pub async fn load_from_store(
        &self,
        runs: &dyn RunStore,
        services: &dyn ServiceStore,
        limit: usize,
    ) -> Result<usize, SchedulerError> {
        let pending = runs.get_pending(limit).await?;
        let mut items = Vec::with_capacity(pending.len());
        for run in &pending {
            match services.get(run.service_id).await {
                Ok(service) => items.push(WorkItem::from_run(run, &service)),
                Err(StoreError::NotFound(_)) => {
                    debug!(run_id = %run.id, "skipping orphaned run: service deleted");
                }
                Err(e) => return Err(e.into()),
            }
        }

        let mut inner = self.inner.write();
        inner.clear();
        for item in items {
            // Distinct pending rows cannot collide on run id.
            let _ = inner.push(item);
        }
        Ok(inner.heap.len())
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
