//! Memory-bounded batching of decoded records, grouped by resource
//! snapshot, with a drop-and-count overflow policy.
//!
//! This is a pure batching layer with no concurrency concerns, in the same
//! spirit as a batch processor that only decides *what* is grouped together
//! and *when* it is full; which thread drains it is the pipeline's problem.

use crate::resource::ResourceSnapshot;
use prost::Message;
use std::collections::VecDeque;

/// A bounded group of decoded records awaiting one export attempt.
///
/// A batch owns all memory for its records and is destroyed atomically
/// after export, successful or not — never partially retried. The resource
/// snapshot is fixed at creation, so a configuration reload mid-flight
/// leaves existing batches exportable and unchanged.
#[derive(Debug)]
pub struct Batch<T> {
    records: Vec<T>,
    capacity: usize,
    dropped: u64,
    resource: ResourceSnapshot,
}

impl<T> Batch<T> {
    fn new(capacity: usize, resource: ResourceSnapshot) -> Self {
        Self {
            records: Vec::new(),
            capacity,
            dropped: 0,
            resource,
        }
    }

    /// Records in insertion order.
    pub fn records(&self) -> &[T] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.records.len() >= self.capacity
    }

    /// Events dropped against this batch (overflow or decode failure).
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// The resource snapshot this batch was created under.
    pub fn resource(&self) -> &ResourceSnapshot {
        &self.resource
    }
}

/// FIFO queue of batches for one event class.
///
/// `queue_max` bounds the total records across all queued batches; beyond
/// it, appends are dropped and counted, never blocked or surfaced to the
/// caller — telemetry about telemetry failure would only feed back on
/// itself. Draining is FIFO to bound memory and keep rough time order.
#[derive(Debug)]
pub struct BatchQueue<T> {
    queue: VecDeque<Batch<T>>,
    batch_max: usize,
    queue_max: usize,
    queued: usize,
    dropped: u64,
    resource: ResourceSnapshot,
}

impl<T: Message + Default> BatchQueue<T> {
    pub fn new(batch_max: usize, queue_max: usize, resource: ResourceSnapshot) -> Self {
        Self {
            queue: VecDeque::new(),
            batch_max: batch_max.max(1),
            queue_max: queue_max.max(1),
            queued: 0,
            dropped: 0,
            resource,
        }
    }

    /// Points future batches at a new resource snapshot; queued batches
    /// keep the snapshot they were created with.
    pub fn set_resource(&mut self, resource: ResourceSnapshot) {
        self.resource = resource;
    }

    /// Updates the capacity limits for future appends.
    pub fn set_limits(&mut self, batch_max: usize, queue_max: usize) {
        self.batch_max = batch_max.max(1);
        self.queue_max = queue_max.max(1);
    }

    /// Decodes `payload` and appends it to the tail batch, rotating to a
    /// fresh batch when the tail is full.
    ///
    /// Returns `true` when the record was enqueued. Overflow past
    /// `queue_max` and undecodable payloads are absorbed as drops on the
    /// tail batch — identical failure modes from the caller's view, both
    /// observable only through counters.
    pub fn append_payload(&mut self, payload: &[u8]) -> bool {
        if self.queue.is_empty() {
            let batch = Batch::new(self.batch_max, self.resource.clone());
            self.queue.push_back(batch);
        }

        if self.queued >= self.queue_max {
            self.drop_one();
            return false;
        }

        let Ok(record) = T::decode(payload) else {
            self.drop_one();
            return false;
        };

        if self.queue.back().is_some_and(Batch::is_full) {
            let batch = Batch::new(self.batch_max, self.resource.clone());
            self.queue.push_back(batch);
        }

        // A tail batch exists by now.
        if let Some(tail) = self.queue.back_mut() {
            tail.records.push(record);
            self.queued += 1;
        }
        true
    }

    /// Removes and returns the oldest batch, or `None` when empty.
    pub fn take_head(&mut self) -> Option<Batch<T>> {
        let head = self.queue.pop_front()?;
        self.queued -= head.len();
        Some(head)
    }

    /// Total records across all queued batches.
    pub fn queued(&self) -> usize {
        self.queued
    }

    /// Queue-lifetime total of dropped events.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Number of queued batches.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    fn drop_one(&mut self) {
        self.dropped += 1;
        if let Some(tail) = self.queue.back_mut() {
            tail.dropped += 1;
        }
    }
}
