// Bounded, insertion-ordered store of emotion samples

use crate::models::EmotionSample;
use std::collections::VecDeque;

/// Default number of samples retained per session
pub const HISTORY_CAPACITY: usize = 100;

/// Fixed-capacity history with FIFO eviction.
///
/// Samples stay in insertion order; once full, every push drops the oldest
/// sample. Readers only ever receive copies via [`HistoryBuffer::snapshot`].
#[derive(Clone, Debug)]
pub struct HistoryBuffer {
    samples: VecDeque<EmotionSample>,
    capacity: usize,
}

impl HistoryBuffer {
    /// Creates a buffer holding at most [`HISTORY_CAPACITY`] samples
    pub fn new() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }

    /// Creates a buffer with a custom bound; zero is treated as one
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a sample, evicting from the front until within capacity
    pub fn push(&mut self, sample: EmotionSample) {
        self.samples.push_back(sample);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    /// Copy of the retained samples, oldest first
    pub fn snapshot(&self) -> Vec<EmotionSample> {
        self.samples.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn latest(&self) -> Option<&EmotionSample> {
        self.samples.back()
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

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new()
    }
}
