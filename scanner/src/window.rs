//! Fixed-capacity RSSI window
//!
//! Keeps a running sum plus two monotonic deques so average, max and min
//! are all O(1) amortized per push.

use std::collections::VecDeque;

/// Default number of readings kept per frequency
pub const DEFAULT_WINDOW_SIZE: usize = 10;

/// Sliding window over the most recent RSSI readings
#[derive(Debug, Clone)]
pub struct SlidingWindowStats {
    data: VecDeque<(u64, i16)>,
    capacity: usize,
    sum: i64,
    next_seq: u64,
    // (seq, value) pairs, values non-increasing front to back
    max_queue: VecDeque<(u64, i16)>,
    // (seq, value) pairs, values non-decreasing front to back
    min_queue: VecDeque<(u64, i16)>,
}

impl SlidingWindowStats {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            data: VecDeque::with_capacity(capacity),
            capacity,
            sum: 0,
            next_seq: 0,
            max_queue: VecDeque::new(),
            min_queue: VecDeque::new(),
        }
    }

    /// Add value to window
    pub fn push(&mut self, value: i16) {
        if self.data.len() >= self.capacity {
            if let Some((seq, old)) = self.data.pop_front() {
                self.sum -= old as i64;
                if self.max_queue.front().map(|&(s, _)| s) == Some(seq) {
                    self.max_queue.pop_front();
                }
                if self.min_queue.front().map(|&(s, _)| s) == Some(seq) {
                    self.min_queue.pop_front();
                }
            }
        }

        let seq = self.next_seq;
        self.next_seq += 1;

        self.data.push_back((seq, value));
        self.sum += value as i64;

        while self.max_queue.back().is_some_and(|&(_, v)| v < value) {
            self.max_queue.pop_back();
        }
        self.max_queue.push_back((seq, value));

        while self.min_queue.back().is_some_and(|&(_, v)| v > value) {
            self.min_queue.pop_back();
        }
        self.min_queue.push_back((seq, value));
    }

    /// Get mean
    pub fn mean(&self) -> Option<f64> {
        if self.data.is_empty() {
            return None;
        }
        Some(self.sum as f64 / self.data.len() as f64)
    }

    /// Mean rounded to whole dBm
    pub fn average(&self) -> Option<i16> {
        self.mean().map(|m| m.round() as i16)
    }

    pub fn max(&self) -> Option<i16> {
        self.max_queue.front().map(|&(_, v)| v)
    }

    pub fn min(&self) -> Option<i16> {
        self.min_queue.front().map(|&(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Check if window is full
    pub fn is_full(&self) -> bool {
        self.data.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest-first values
    pub fn values(&self) -> Vec<i16> {
        self.data.iter().map(|&(_, v)| v).collect()
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.max_queue.clear();
        self.min_queue.clear();
        self.sum = 0;
    }
}

impl Default for SlidingWindowStats {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE)
    }
}
