//! Bounded per-stream history store.
//!
//! One fixed-capacity ring buffer per stream key, strict FIFO eviction.
//! Memory never grows past the sum of configured capacities regardless of
//! run length. Each buffer has a single writer (the scheduler task owning
//! its plugin) and many readers; the per-stream lock is held only for the
//! duration of one push or read, never across a collection call.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::metric::{Sample, StreamKey};

/// Fixed-capacity FIFO buffer of the most recent samples for one stream.
#[derive(Debug)]
pub struct RingBuffer {
    capacity: usize,
    samples: VecDeque<Sample>,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            samples: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    pub fn push(&mut self, sample: Sample) {
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    /// Up to the `n` most recent samples, oldest first.
    pub fn window(&self, n: usize) -> Vec<Sample> {
        let skip = self.samples.len().saturating_sub(n);
        self.samples.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// All ring buffers, keyed by stream.
pub struct BufferStore {
    default_capacity: usize,
    streams: RwLock<BTreeMap<StreamKey, Arc<RwLock<RingBuffer>>>>,
}

impl BufferStore {
    pub fn new(default_capacity: usize) -> Self {
        Self {
            default_capacity: default_capacity.max(1),
            streams: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn default_capacity(&self) -> usize {
        self.default_capacity
    }

    /// Create a stream's buffer. Idempotent: re-creating with the same
    /// capacity is a no-op; a capacity change drops the buffer and
    /// reinitializes it.
    pub fn create(&self, key: StreamKey, capacity: usize) {
        let capacity = capacity.max(1);
        let mut streams = self.streams.write();
        match streams.get(&key) {
            Some(existing) if existing.read().capacity() == capacity => {}
            _ => {
                streams.insert(key, Arc::new(RwLock::new(RingBuffer::new(capacity))));
            }
        }
    }

    /// Append a sample to its stream, creating the buffer with the default
    /// capacity if it does not exist yet.
    pub fn push(&self, sample: Sample) {
        let buffer = self.stream(&sample.key).unwrap_or_else(|| {
            let mut streams = self.streams.write();
            Arc::clone(
                streams
                    .entry(sample.key.clone())
                    .or_insert_with(|| Arc::new(RwLock::new(RingBuffer::new(self.default_capacity)))),
            )
        });
        buffer.write().push(sample);
    }

    pub fn latest(&self, key: &StreamKey) -> Option<Sample> {
        self.stream(key)?.read().latest().cloned()
    }

    /// Up to the `n` most recent samples of a stream, oldest first.
    pub fn window(&self, key: &StreamKey, n: usize) -> Vec<Sample> {
        match self.stream(key) {
            Some(buffer) => buffer.read().window(n),
            None => Vec::new(),
        }
    }

    pub fn keys(&self) -> Vec<StreamKey> {
        self.streams.read().keys().cloned().collect()
    }

    pub fn stream_count(&self) -> usize {
        self.streams.read().len()
    }

    /// Upper bound on stored samples across all streams.
    pub fn total_capacity(&self) -> usize {
        self.streams
            .read()
            .values()
            .map(|b| b.read().capacity())
            .sum()
    }

    fn stream(&self, key: &StreamKey) -> Option<Arc<RwLock<RingBuffer>>> {
        self.streams.read().get(key).map(Arc::clone)
    }
}
