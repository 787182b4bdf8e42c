//! Bounded radar point history

use crate::model::RadarPoint;
use std::collections::VecDeque;

/// FIFO ring of the most recent radar points
#[derive(Debug, Clone)]
pub struct RadarHistory {
    points: VecDeque<RadarPoint>,
    capacity: usize,
}

impl RadarHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            points: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Append a point, evicting the oldest ones beyond capacity
    pub fn push(&mut self, point: RadarPoint) {
        self.points.push_back(point);
        while self.points.len() > self.capacity {
            self.points.pop_front();
        }
    }

    /// Change capacity, trimming the oldest points if needed
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        while self.points.len() > self.capacity {
            self.points.pop_front();
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    pub fn latest(&self) -> Option<&RadarPoint> {
        self.points.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RadarPoint> {
        self.points.iter()
    }

    /// Oldest-first copy
    pub fn to_vec(&self) -> Vec<RadarPoint> {
        self.points.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EventType;

    fn point(ts: u64) -> RadarPoint {
        RadarPoint {
            timestamp: ts,
            frequency: 433_000_000,
            rssi: -80,
            snr: -20,
            packet_length: 12,
            event_type: EventType::RxDone,
        }
    }

    #[test]
    fn never_exceeds_capacity() {
        let mut history = RadarHistory::new(5);
        for ts in 0..37 {
            history.push(point(ts));
            assert!(history.len() <= 5);
        }

        let kept: Vec<u64> = history.iter().map(|p| p.timestamp).collect();
        assert_eq!(kept, vec![32, 33, 34, 35, 36]);
    }

    #[test]
    fn shrinking_trims_oldest() {
        let mut history = RadarHistory::new(4);
        for ts in 0..4 {
            history.push(point(ts));
        }
        history.set_capacity(2);
        assert_eq!(history.to_vec(), vec![point(2), point(3)]);
    }

    #[test]
    fn zero_capacity_keeps_nothing() {
        let mut history = RadarHistory::new(0);
        history.push(point(1));
        assert!(history.is_empty());
    }
}
