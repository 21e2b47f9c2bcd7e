use std::collections::VecDeque;

use crate::dataset::Sample;

/// FIFO window over the most recently emitted samples.
#[derive(Debug, Clone)]
pub struct SlidingBuffer {
    samples: VecDeque<Sample>,
    capacity: usize,
}

impl SlidingBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn append(&mut self, sample: Sample) {
        self.samples.push_back(sample);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.samples.clear();
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

    /// Samples in emission order, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Sample> + '_ {
        self.samples.iter()
    }

    /// The first `len` samples, oldest first.
    pub fn prefix(&self, len: usize) -> Vec<Sample> {
        self.samples.iter().take(len).cloned().collect()
    }

    pub fn to_vec(&self) -> Vec<Sample> {
        self.samples.iter().cloned().collect()
    }
}
