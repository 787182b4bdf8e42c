//! Value types shared by the listener, the collector and the display side

use lorascope_hal::{RSSI_UNKNOWN_DBM, SNR_UNKNOWN_DB};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Weakest RSSI accepted as a real reception (dBm)
pub const RSSI_FLOOR_DBM: i16 = -120;

/// Strongest RSSI accepted as a real reception (dBm)
pub const RSSI_CEILING_DBM: i16 = -50;

/// Whether an RSSI reading is inside the plausible reception domain
pub fn rssi_in_domain(rssi: i16) -> bool {
    (RSSI_FLOOR_DBM..=RSSI_CEILING_DBM).contains(&rssi)
}

/// Classified outcome of one RX window
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EventType {
    /// Frame received intact
    RxDone,
    /// Frame received with a failed integrity check
    CrcError,
    /// Window closed with nothing received (never recorded)
    Timeout,
}

/// One receive event on the time/frequency plane
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RadarPoint {
    /// Monotonic milliseconds
    pub timestamp: u64,
    pub frequency: u32,
    pub rssi: i16,
    pub snr: i16,
    pub packet_length: u16,
    pub event_type: EventType,
}

/// Running aggregate over recorded radar points
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct EventStats {
    pub total_events: u32,
    pub rx_done_count: u32,
    pub rx_error_count: u32,
    /// Mean RSSI over RxDone events
    pub avg_rssi: Option<f64>,
    pub max_rssi: Option<i16>,
    pub min_rssi: Option<i16>,
    pub first_event_time: Option<u64>,
    pub last_event_time: Option<u64>,
}

impl EventStats {
    /// Fold in a successful reception
    pub fn record_rx_done(&mut self, rssi: i16, timestamp: u64) {
        self.rx_done_count += 1;
        self.total_events += 1;
        self.touch(timestamp);

        let n = self.rx_done_count as f64;
        let avg = self.avg_rssi.unwrap_or(0.0);
        self.avg_rssi = Some(avg + (rssi as f64 - avg) / n);
        self.max_rssi = Some(self.max_rssi.map_or(rssi, |m| m.max(rssi)));
        self.min_rssi = Some(self.min_rssi.map_or(rssi, |m| m.min(rssi)));
    }

    /// Fold in a CRC failure; RSSI fields are untouched
    pub fn record_crc_error(&mut self, timestamp: u64) {
        self.rx_error_count += 1;
        self.total_events += 1;
        self.touch(timestamp);
    }

    fn touch(&mut self, timestamp: u64) {
        if self.first_event_time.is_none() {
            self.first_event_time = Some(timestamp);
        }
        self.last_event_time = Some(timestamp);
    }

    /// Average RSSI rounded to whole dBm
    pub fn avg_rssi_dbm(&self) -> Option<i16> {
        self.avg_rssi.map(|avg| avg.round() as i16)
    }

    /// Share of events that failed CRC
    pub fn error_rate(&self) -> f64 {
        if self.total_events == 0 {
            return 0.0;
        }
        self.rx_error_count as f64 / self.total_events as f64
    }

    /// Time between first and last event
    pub fn span(&self) -> Duration {
        match (self.first_event_time, self.last_event_time) {
            (Some(first), Some(last)) => Duration::from_millis(last.saturating_sub(first)),
            _ => Duration::ZERO,
        }
    }
}

/// Raw per-frequency observation fed to the statistics collector
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScanSample {
    pub frequency: u32,
    pub rssi: i16,
    pub snr: i16,
    pub packet_received: bool,
    /// Monotonic milliseconds
    pub timestamp: u64,
    pub error_count: u8,
}

impl ScanSample {
    /// An empty observation at `frequency`
    pub fn new(frequency: u32, timestamp: u64) -> Self {
        Self {
            frequency,
            rssi: RSSI_UNKNOWN_DBM,
            snr: SNR_UNKNOWN_DB,
            packet_received: false,
            timestamp,
            error_count: 0,
        }
    }
}

impl From<&RadarPoint> for ScanSample {
    fn from(point: &RadarPoint) -> Self {
        Self {
            frequency: point.frequency,
            rssi: point.rssi,
            snr: point.snr,
            packet_received: point.event_type == EventType::RxDone,
            timestamp: point.timestamp,
            error_count: u8::from(point.event_type == EventType::CrcError),
        }
    }
}

/// Per-frequency aggregate
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FrequencyStats {
    pub frequency: u32,
    pub sample_count: u32,
    /// Window average (dBm)
    pub avg_rssi: i16,
    pub max_rssi: i16,
    pub min_rssi: i16,
    pub packet_count: u32,
    /// 0.0 - 1.0
    pub activity_score: f64,
    /// Monotonic milliseconds
    pub last_seen: u64,
}

impl FrequencyStats {
    pub fn new(frequency: u32) -> Self {
        Self {
            frequency,
            sample_count: 0,
            avg_rssi: RSSI_UNKNOWN_DBM,
            max_rssi: RSSI_UNKNOWN_DBM,
            min_rssi: RSSI_UNKNOWN_DBM,
            packet_count: 0,
            activity_score: 0.0,
            last_seen: 0,
        }
    }
}

/// One configured channel
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FrequencyConfig {
    /// Hz
    pub frequency: u32,
    /// ms
    pub dwell_time: u32,
    /// kHz
    pub bandwidth: u16,
    pub spreading_factor: u8,
    pub coding_rate: u8,
}

impl FrequencyConfig {
    pub fn new(frequency: u32) -> Self {
        Self {
            frequency,
            ..Default::default()
        }
    }

    /// One-line summary for logs and listings
    pub fn describe(&self) -> String {
        format!(
            "{:.3} MHz, dwell {} ms, BW {} kHz, SF {}, CR 4/{}",
            self.frequency as f64 / 1_000_000.0,
            self.dwell_time,
            self.bandwidth,
            self.spreading_factor,
            self.coding_rate
        )
    }
}

impl Default for FrequencyConfig {
    fn default() -> Self {
        Self {
            frequency: 433_000_000,
            dwell_time: 1000,
            bandwidth: 125,
            spreading_factor: 7,
            coding_rate: 5,
        }
    }
}

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    pub frequencies: Vec<FrequencyConfig>,
    pub current_index: usize,
    pub rx_window_ms: u64,
    pub bandwidth: u16,
    pub spreading_factor: u8,
    pub coding_rate: u8,
    /// Radar history capacity
    pub max_points: usize,
    /// Frame poll tick inside a window
    pub poll_interval_ms: u64,
    /// Gap between windows
    pub idle_interval_ms: u64,
    /// How long `stop` waits for the worker before aborting it
    pub stop_grace_ms: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            frequencies: Vec::new(),
            current_index: 0,
            rx_window_ms: 1000,
            bandwidth: 125,
            spreading_factor: 7,
            coding_rate: 5,
            max_points: 100,
            poll_interval_ms: 10,
            idle_interval_ms: 100,
            stop_grace_ms: 100,
        }
    }
}

impl ListenerConfig {
    pub fn current_frequency(&self) -> Option<u32> {
        self.frequencies.get(self.current_index).map(|f| f.frequency)
    }

    /// Step the cursor forward, wrapping at the end
    pub fn advance(&mut self) -> Option<u32> {
        if self.frequencies.is_empty() {
            return None;
        }
        self.current_index = (self.current_index + 1) % self.frequencies.len();
        self.current_frequency()
    }

    /// Step the cursor back, wrapping at the start
    pub fn retreat(&mut self) -> Option<u32> {
        if self.frequencies.is_empty() {
            return None;
        }
        let count = self.frequencies.len();
        self.current_index = (self.current_index + count - 1) % count;
        self.current_frequency()
    }

    pub fn rx_window(&self) -> Duration {
        Duration::from_millis(self.rx_window_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}

/// Frequency range + radio parameters, expanded into a channel list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FrequencyPlan {
    pub start_hz: u32,
    pub end_hz: u32,
    pub step_hz: u32,
    pub rx_window_ms: u32,
    pub bandwidth: u16,
    pub spreading_factor: u8,
    pub coding_rate: u8,
    pub max_points: usize,
}

impl Default for FrequencyPlan {
    fn default() -> Self {
        Self {
            start_hz: 410_125_000,
            end_hz: 493_125_000,
            step_hz: 1_000_000,
            rx_window_ms: 1000,
            bandwidth: 125,
            spreading_factor: 7,
            coding_rate: 5,
            max_points: 100,
        }
    }
}

impl FrequencyPlan {
    /// Every channel from start to end inclusive. A zero step yields only
    /// the start frequency; start past end yields nothing.
    pub fn frequencies(&self) -> Vec<FrequencyConfig> {
        let channel = |frequency| FrequencyConfig {
            frequency,
            dwell_time: self.rx_window_ms,
            bandwidth: self.bandwidth,
            spreading_factor: self.spreading_factor,
            coding_rate: self.coding_rate,
        };

        if self.start_hz > self.end_hz {
            return Vec::new();
        }
        if self.step_hz == 0 {
            return vec![channel(self.start_hz)];
        }

        (self.start_hz as u64..=self.end_hz as u64)
            .step_by(self.step_hz as usize)
            .map(|hz| channel(hz as u32))
            .collect()
    }

    pub fn listener_config(&self) -> ListenerConfig {
        ListenerConfig {
            frequencies: self.frequencies(),
            current_index: 0,
            rx_window_ms: self.rx_window_ms as u64,
            bandwidth: self.bandwidth,
            spreading_factor: self.spreading_factor,
            coding_rate: self.coding_rate,
            max_points: self.max_points,
            ..Default::default()
        }
    }
}
