//! Per-frequency Statistics Collector
//!
//! Turns raw [`ScanSample`]s into ranked [`FrequencyStats`]. Entries are
//! created on first sample and only leave through age-based cleanup.
//!
//! The collector is driven from the foreground only, so it is a plain value
//! with `&mut self` methods.

use crate::activity::ActivityScorer;
use crate::clock::{Clock, MonotonicClock};
use crate::model::{FrequencyStats, ScanSample};
use crate::window::{SlidingWindowStats, DEFAULT_WINDOW_SIZE};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

/// Recent sample history capacity
pub const RECENT_SAMPLE_CAPACITY: usize = 100;

#[derive(Debug, Clone)]
struct TrackedFrequency {
    stats: FrequencyStats,
    window: SlidingWindowStats,
}

/// Statistics Collector
pub struct StatisticsCollector {
    // Ordered by frequency so equal scores rank low-to-high Hz
    channels: BTreeMap<u32, TrackedFrequency>,
    recent: VecDeque<ScanSample>,
    window_size: usize,
    clock: Arc<dyn Clock>,
}

impl StatisticsCollector {
    /// Create collector on its own monotonic clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(MonotonicClock::new()))
    }

    /// Create collector sharing a clock with the sample producer
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            channels: BTreeMap::new(),
            recent: VecDeque::with_capacity(RECENT_SAMPLE_CAPACITY),
            window_size: DEFAULT_WINDOW_SIZE,
            clock,
        }
    }

    /// Override the per-frequency RSSI window size
    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size.max(1);
        self
    }

    /// Record one observation
    pub fn add_sample(&mut self, sample: ScanSample) {
        if self.recent.len() >= RECENT_SAMPLE_CAPACITY {
            self.recent.pop_front();
        }
        self.recent.push_back(sample);

        let window_size = self.window_size;
        let tracked = self
            .channels
            .entry(sample.frequency)
            .or_insert_with(|| TrackedFrequency {
                stats: FrequencyStats::new(sample.frequency),
                window: SlidingWindowStats::new(window_size),
            });

        tracked.stats.sample_count = tracked.stats.sample_count.saturating_add(1);
        tracked.stats.last_seen = sample.timestamp;
        if sample.packet_received {
            tracked.stats.packet_count = tracked.stats.packet_count.saturating_add(1);
        }
        tracked.window.push(sample.rssi);
    }

    /// Refresh RSSI aggregates and activity scores for every frequency
    pub fn update_statistics(&mut self) {
        let now = self.clock.now_ms();

        for tracked in self.channels.values_mut() {
            if let (Some(avg), Some(max), Some(min)) =
                (tracked.window.average(), tracked.window.max(), tracked.window.min())
            {
                tracked.stats.avg_rssi = avg;
                tracked.stats.max_rssi = max;
                tracked.stats.min_rssi = min;
            }
            tracked.stats.activity_score = ActivityScorer::score(&tracked.stats, now);
        }

        tracing::trace!("Refreshed statistics for {} frequencies", self.channels.len());
    }

    /// Snapshot for one frequency, `None` if it was never sampled
    pub fn get_stats(&self, frequency: u32) -> Option<FrequencyStats> {
        self.channels.get(&frequency).map(|t| t.stats)
    }

    /// All frequencies, most active first
    pub fn get_all_stats(&self) -> Vec<FrequencyStats> {
        let mut all: Vec<FrequencyStats> = self.channels.values().map(|t| t.stats).collect();
        all.sort_by(|a, b| b.activity_score.total_cmp(&a.activity_score));
        all
    }

    /// Evict frequencies and recent samples older than `max_age_ms`
    pub fn cleanup(&mut self, max_age_ms: u64) {
        let now = self.clock.now_ms();
        let before = self.channels.len();

        self.channels
            .retain(|_, t| now.saturating_sub(t.stats.last_seen) <= max_age_ms);
        self.recent
            .retain(|s| now.saturating_sub(s.timestamp) <= max_age_ms);

        let evicted = before - self.channels.len();
        if evicted > 0 {
            tracing::debug!("Evicted {} stale frequencies", evicted);
        }
    }

    pub fn clear(&mut self) {
        self.channels.clear();
        self.recent.clear();
    }

    pub fn recent_sample_count(&self) -> usize {
        self.recent.len()
    }

    pub fn frequency_count(&self) -> usize {
        self.channels.len()
    }

    /// Oldest-first copy of the recent sample history
    pub fn recent_samples(&self) -> Vec<ScanSample> {
        self.recent.iter().copied().collect()
    }
}

impl Default for StatisticsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn sample(frequency: u32, rssi: i16, packet: bool, timestamp: u64) -> ScanSample {
        ScanSample {
            rssi,
            packet_received: packet,
            ..ScanSample::new(frequency, timestamp)
        }
    }

    #[test]
    fn window_tracks_recent_rssi_only() {
        let clock = ManualClock::new(0);
        let mut collector = StatisticsCollector::with_clock(Arc::new(clock));

        for rssi in -100..=-86 {
            collector.add_sample(sample(433_000_000, rssi, false, 0));
        }
        collector.update_statistics();

        let stats = collector.get_stats(433_000_000).unwrap();
        assert_eq!(stats.sample_count, 15);
        assert_eq!(stats.min_rssi, -95);
        assert_eq!(stats.max_rssi, -86);
    }

    #[test]
    fn unknown_frequency_is_not_found() {
        let collector = StatisticsCollector::new();
        assert!(collector.get_stats(868_000_000).is_none());
    }

    #[test]
    fn stats_keep_defaults_until_refresh() {
        let mut collector = StatisticsCollector::with_clock(Arc::new(ManualClock::new(0)));
        collector.add_sample(sample(433_000_000, -70, true, 0));

        let stats = collector.get_stats(433_000_000).unwrap();
        assert_eq!(stats.avg_rssi, -120);
        assert_eq!(stats.activity_score, 0.0);
        assert_eq!(stats.packet_count, 1);

        collector.update_statistics();
        let stats = collector.get_stats(433_000_000).unwrap();
        assert_eq!(stats.avg_rssi, -70);
        assert!(stats.activity_score > 0.0);
    }

    #[test]
    fn ranking_is_descending_with_stable_ties() {
        let mut collector = StatisticsCollector::with_clock(Arc::new(ManualClock::new(1_000)));

        // Two identical quiet channels and one busy one
        collector.add_sample(sample(435_000_000, -110, false, 1_000));
        collector.add_sample(sample(433_000_000, -110, false, 1_000));
        collector.add_sample(sample(434_000_000, -60, true, 1_000));
        collector.update_statistics();

        let ranked: Vec<u32> = collector.get_all_stats().iter().map(|s| s.frequency).collect();
        assert_eq!(ranked, vec![434_000_000, 433_000_000, 435_000_000]);
    }

    #[test]
    fn cleanup_evicts_by_age() {
        let clock = ManualClock::new(0);
        let mut collector = StatisticsCollector::with_clock(Arc::new(clock.clone()));

        collector.add_sample(sample(433_000_000, -80, false, 0));
        collector.add_sample(sample(434_000_000, -80, false, 4_000));
        collector.add_sample(sample(435_000_000, -80, false, 9_000));

        clock.set(10_000);
        collector.cleanup(5_000);

        assert_eq!(collector.frequency_count(), 1);
        assert!(collector.get_stats(435_000_000).is_some());
        assert_eq!(collector.recent_sample_count(), 1);

        let now = clock.now_ms();
        for stats in collector.get_all_stats() {
            assert!(now - stats.last_seen <= 5_000);
        }
    }

    #[test]
    fn recent_history_is_bounded() {
        let mut collector = StatisticsCollector::with_clock(Arc::new(ManualClock::new(0)));
        for i in 0..250u64 {
            collector.add_sample(sample(433_000_000 + (i as u32 % 3), -90, false, i));
        }

        assert_eq!(collector.recent_sample_count(), RECENT_SAMPLE_CAPACITY);
        assert_eq!(collector.recent_samples()[0].timestamp, 150);
        assert_eq!(collector.frequency_count(), 3);

        collector.clear();
        assert_eq!(collector.recent_sample_count(), 0);
        assert_eq!(collector.frequency_count(), 0);
    }
}
