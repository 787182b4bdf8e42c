//! Sweep / measurement mode
//!
//! Visits every frequency in turn, takes a few observations on each and
//! feeds them to a [`StatisticsCollector`]. Runs on the caller's task; it is
//! not meant to share the radio with a running [`FrequencyListener`].
//!
//! [`FrequencyListener`]: crate::listener::FrequencyListener

use crate::clock::Clock;
use crate::model::{FrequencyConfig, ScanSample};
use crate::statistics::StatisticsCollector;
use crate::{Result, ScanError};
use lorascope_hal::{FrameStatus, RadioAdapter};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Order in which a pass visits the frequency list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SweepOrder {
    Sequential,
    Random,
}

/// Sweep configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScannerConfig {
    /// Pause after each frequency (ms)
    pub scan_interval_ms: u64,
    /// Pause between observations on one frequency (ms)
    pub sample_interval_ms: u64,
    pub order: SweepOrder,
    /// Keep sweeping until interrupted
    pub continuous: bool,
    pub samples_per_freq: u32,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            scan_interval_ms: 100,
            sample_interval_ms: 10,
            order: SweepOrder::Sequential,
            continuous: false,
            samples_per_freq: 10,
        }
    }
}

/// Frequency Sweeper
pub struct FrequencySweeper {
    radio: Box<dyn RadioAdapter>,
    frequencies: Vec<FrequencyConfig>,
    config: ScannerConfig,
    clock: Arc<dyn Clock>,
    rng: StdRng,
    initialized: bool,
    passes: u64,
}

impl FrequencySweeper {
    pub fn new(
        radio: Box<dyn RadioAdapter>,
        frequencies: Vec<FrequencyConfig>,
        config: ScannerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            radio,
            frequencies,
            config,
            clock,
            rng: StdRng::from_entropy(),
            initialized: false,
            passes: 0,
        }
    }

    /// Fix the shuffle order for reproducible random sweeps
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn init(&mut self) -> Result<()> {
        if self.frequencies.is_empty() {
            return Err(ScanError::EmptyFrequencySet);
        }
        self.radio.init().map_err(ScanError::AdapterInit)?;
        self.initialized = true;

        tracing::info!(
            "Sweeping {} frequencies with {}, {} samples each",
            self.frequencies.len(),
            self.radio.name(),
            self.config.samples_per_freq
        );
        Ok(())
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    pub fn is_continuous(&self) -> bool {
        self.config.continuous
    }

    /// Completed passes
    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// Visit order for the next pass
    pub fn pass_order(&mut self) -> Vec<FrequencyConfig> {
        let mut order = self.frequencies.clone();
        if self.config.order == SweepOrder::Random {
            order.shuffle(&mut self.rng);
        }
        order
    }

    /// Run one pass over every frequency and refresh the collector.
    /// Returns the number of samples taken.
    pub async fn sweep_once(&mut self, collector: &mut StatisticsCollector) -> Result<usize> {
        if !self.initialized {
            return Err(ScanError::NotInitialized);
        }

        let mut taken = 0;
        for channel in self.pass_order() {
            self.tune(&channel);

            for i in 0..self.config.samples_per_freq {
                collector.add_sample(self.observe(channel.frequency));
                taken += 1;

                if i + 1 < self.config.samples_per_freq {
                    tokio::time::sleep(Duration::from_millis(self.config.sample_interval_ms)).await;
                }
            }

            tokio::time::sleep(Duration::from_millis(self.config.scan_interval_ms)).await;
        }

        collector.update_statistics();
        self.passes += 1;
        tracing::debug!("Sweep pass {} done, {} samples", self.passes, taken);
        Ok(taken)
    }

    fn tune(&mut self, channel: &FrequencyConfig) {
        if let Err(e) = self.radio.set_frequency(channel.frequency) {
            tracing::warn!("Failed to tune to {} Hz: {}", channel.frequency, e);
        }
        if let Err(e) = self.radio.set_bandwidth(channel.bandwidth) {
            tracing::warn!("Bandwidth {} kHz rejected: {}", channel.bandwidth, e);
        }
        if let Err(e) = self.radio.set_spreading_factor(channel.spreading_factor) {
            tracing::warn!("Spreading factor {} rejected: {}", channel.spreading_factor, e);
        }
        if let Err(e) = self.radio.set_coding_rate(channel.coding_rate) {
            tracing::warn!("Coding rate 4/{} rejected: {}", channel.coding_rate, e);
        }
    }

    /// One frame poll; falls back to ambient RSSI when nothing arrived
    fn observe(&mut self, frequency: u32) -> ScanSample {
        let mut sample = ScanSample::new(frequency, self.clock.now_ms());

        match self.radio.receive_frame() {
            Ok(frame) => match frame.status {
                FrameStatus::Done => {
                    sample.rssi = frame.rssi;
                    sample.snr = self.radio.get_snr();
                    sample.packet_received = true;
                }
                FrameStatus::CrcError => {
                    sample.rssi = frame.rssi;
                    sample.error_count = 1;
                }
                FrameStatus::Empty => sample.rssi = self.radio.get_rssi(),
            },
            Err(e) => {
                tracing::debug!("Frame poll failed on {} Hz: {}", frequency, e);
                sample.rssi = self.radio.get_rssi();
            }
        }

        sample
    }

    /// Hand the radio back, e.g. to a listener
    pub fn into_radio(self) -> Box<dyn RadioAdapter> {
        self.radio
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use lorascope_hal::{SimChannel, SimConfig, SimulatedRadio};

    fn channels(freqs: &[u32]) -> Vec<FrequencyConfig> {
        freqs.iter().map(|&f| FrequencyConfig::new(f)).collect()
    }

    fn busy_sim() -> SimulatedRadio {
        SimulatedRadio::new(SimConfig {
            seed: 7,
            noise_floor_dbm: -115.0,
            rssi_jitter_db: 0.0,
            channels: vec![SimChannel {
                frequency: 434_000_000,
                rssi_dbm: -65.0,
                packet_probability: 1.0,
                crc_error_probability: 0.0,
            }],
        })
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_requires_init() {
        let mut sweeper = FrequencySweeper::new(
            Box::new(busy_sim()),
            channels(&[433_000_000]),
            ScannerConfig::default(),
            Arc::new(ManualClock::new(0)),
        );
        let mut collector = StatisticsCollector::new();
        assert!(matches!(
            sweeper.sweep_once(&mut collector).await,
            Err(ScanError::NotInitialized)
        ));
    }

    #[test]
    fn empty_list_fails_init() {
        let mut sweeper = FrequencySweeper::new(
            Box::new(busy_sim()),
            Vec::new(),
            ScannerConfig::default(),
            Arc::new(ManualClock::new(0)),
        );
        assert!(matches!(sweeper.init(), Err(ScanError::EmptyFrequencySet)));
    }

    #[tokio::test(start_paused = true)]
    async fn busy_channel_ranks_first() {
        let clock = ManualClock::new(0);
        let config = ScannerConfig {
            samples_per_freq: 5,
            ..Default::default()
        };
        let mut sweeper = FrequencySweeper::new(
            Box::new(busy_sim()),
            channels(&[433_000_000, 434_000_000, 435_000_000]),
            config,
            Arc::new(clock.clone()),
        );
        sweeper.init().unwrap();

        let mut collector = StatisticsCollector::with_clock(Arc::new(clock));
        let taken = sweeper.sweep_once(&mut collector).await.unwrap();

        assert_eq!(taken, 15);
        assert_eq!(sweeper.passes(), 1);
        assert_eq!(collector.frequency_count(), 3);

        let ranked = collector.get_all_stats();
        assert_eq!(ranked[0].frequency, 434_000_000);
        assert_eq!(ranked[0].packet_count, 5);
        assert_eq!(ranked[0].avg_rssi, -65);
    }

    #[test]
    fn random_order_is_a_permutation() {
        let freqs: Vec<u32> = (0..20).map(|i| 433_000_000 + i * 100_000).collect();
        let config = ScannerConfig {
            order: SweepOrder::Random,
            ..Default::default()
        };
        let mut sweeper = FrequencySweeper::new(
            Box::new(busy_sim()),
            channels(&freqs),
            config,
            Arc::new(ManualClock::new(0)),
        )
        .with_seed(42);

        let mut visited: Vec<u32> = sweeper.pass_order().iter().map(|c| c.frequency).collect();
        visited.sort_unstable();
        assert_eq!(visited, freqs);
    }

    #[test]
    fn sequential_order_is_stable() {
        let freqs = [433_000_000, 434_000_000, 435_000_000];
        let mut sweeper = FrequencySweeper::new(
            Box::new(busy_sim()),
            channels(&freqs),
            ScannerConfig::default(),
            Arc::new(ManualClock::new(0)),
        );
        let visited: Vec<u32> = sweeper.pass_order().iter().map(|c| c.frequency).collect();
        assert_eq!(visited, freqs.to_vec());
    }
}
