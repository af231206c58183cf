//! Time-ordered queue for outbound reply tasks.
//!
//! Tasks are ordered by eligibility time (earliest first), then by sequence
//! number (FIFO among tasks that became eligible together). A task pushed
//! back with a future `next_eligible` (backoff) therefore never blocks
//! tasks behind it that are already eligible.
//!
//! The queue is bounded: at capacity, `enqueue` fails fast so the webhook
//! path can fail the task instead of blocking the platform's delivery call.

use std::collections::BinaryHeap;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::ReplyId;

/// An in-flight unit of outbound work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchTask {
    /// The reply being responded to (and the ledger key for the outcome).
    pub reply_id: ReplyId,

    /// The fully rendered response text.
    pub rendered_response: String,

    /// Completed post attempts so far. Zero for a fresh task.
    pub attempt: u32,

    /// Earliest time the task may be handed to the poster.
    pub next_eligible: DateTime<Utc>,
}

impl DispatchTask {
    /// Creates a fresh task, eligible immediately.
    pub fn new(reply_id: ReplyId, rendered_response: String, now: DateTime<Utc>) -> Self {
        DispatchTask {
            reply_id,
            rendered_response,
            attempt: 0,
            next_eligible: now,
        }
    }
}

/// The queue rejected a task because it is at capacity.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("dispatch queue saturated (capacity {capacity})")]
pub struct QueueSaturatedError {
    pub capacity: usize,
}

/// A queued task with its FIFO sequence number.
#[derive(Debug)]
struct QueuedTask {
    task: DispatchTask,
    sequence: u64,
}

// BinaryHeap is a max-heap; reverse both fields so the earliest-eligible,
// lowest-sequence task surfaces first.
impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.task.next_eligible == other.task.next_eligible && self.sequence == other.sequence
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .task
            .next_eligible
            .cmp(&self.task.next_eligible)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// A bounded queue of dispatch tasks ordered by eligibility.
#[derive(Debug)]
pub struct DispatchQueue {
    heap: BinaryHeap<QueuedTask>,
    next_sequence: u64,
    capacity: usize,
}

impl DispatchQueue {
    /// Creates an empty queue with the given capacity.
    pub fn new(capacity: usize) -> Self {
        DispatchQueue {
            heap: BinaryHeap::with_capacity(capacity),
            next_sequence: 0,
            capacity,
        }
    }

    /// Number of queued tasks.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// True if no tasks are queued.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// The configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Adds a task to the queue.
    ///
    /// Fails with [`QueueSaturatedError`] at capacity; the caller finalizes
    /// the corresponding ledger record as failed rather than waiting.
    pub fn enqueue(&mut self, task: DispatchTask) -> Result<(), QueueSaturatedError> {
        if self.heap.len() >= self.capacity {
            return Err(QueueSaturatedError {
                capacity: self.capacity,
            });
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(QueuedTask { task, sequence });
        Ok(())
    }

    /// Removes and returns the earliest-eligible task whose `next_eligible`
    /// is at or before `now`.
    ///
    /// Returns `None` when the queue is empty or every task is still backing
    /// off. Because the heap surfaces the earliest eligibility first, a
    /// delayed head can only hide tasks that are even later, never ready
    /// ones.
    pub fn dequeue_ready(&mut self, now: DateTime<Utc>) -> Option<DispatchTask> {
        if self.heap.peek()?.task.next_eligible > now {
            return None;
        }
        self.heap.pop().map(|q| q.task)
    }

    /// The eligibility time of the next task, if any. Used by the dispatch
    /// loop for logging idle ticks.
    pub fn next_eligible_at(&self) -> Option<DateTime<Utc>> {
        self.heap.peek().map(|q| q.task.next_eligible)
    }
}
