//! Frequency Listener
//!
//! Runs the scan cycle on a background task: open an RX window on the current
//! frequency, poll the radio until a frame shows up or the window closes, and
//! record what was heard.
//!
//! The radio and the channel cursor share one lock so a foreground hop
//! (retune + cursor move) never interleaves with a poll. Event history and
//! its statistics are written only by the worker and read as snapshots.

use crate::clock::Clock;
use crate::events::{classify, EventLog, RecordOutcome};
use crate::model::{EventStats, EventType, ListenerConfig, RadarPoint};
use crate::sink::PresentationSink;
use crate::{Result, ScanError};
use lorascope_hal::RadioAdapter;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, TryLockError,
};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Capacity of the live event feed
pub const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Listener lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ListenerState {
    Idle = 0,
    Running = 1,
    /// Cancellation requested, worker finishing its current step
    Stopping = 2,
}

impl ListenerState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ListenerState::Running,
            2 => ListenerState::Stopping,
            _ => ListenerState::Idle,
        }
    }
}

/// Radio plus the configuration it is tuned from
struct Tuner {
    radio: Box<dyn RadioAdapter>,
    config: ListenerConfig,
    initialized: bool,
    /// Frequency last accepted by the radio
    tuned: Option<u32>,
}

impl Tuner {
    /// Retune if the cursor moved since the last successful tune
    fn tune_to_cursor(&mut self) -> Option<u32> {
        let frequency = self.config.current_frequency()?;
        if self.tuned != Some(frequency) {
            match self.radio.set_frequency(frequency) {
                Ok(()) => self.tuned = Some(frequency),
                Err(e) => {
                    tracing::warn!("Failed to tune to {} Hz: {}", frequency, e);
                    self.tuned = None;
                }
            }
        }
        Some(frequency)
    }

    /// Push the full radio configuration; rejected parameters are logged only
    fn apply_config(&mut self) {
        self.tuned = None;
        self.tune_to_cursor();

        if let Err(e) = self.radio.set_bandwidth(self.config.bandwidth) {
            tracing::warn!("Bandwidth {} kHz rejected: {}", self.config.bandwidth, e);
        }
        if let Err(e) = self.radio.set_spreading_factor(self.config.spreading_factor) {
            tracing::warn!("Spreading factor {} rejected: {}", self.config.spreading_factor, e);
        }
        if let Err(e) = self.radio.set_coding_rate(self.config.coding_rate) {
            tracing::warn!("Coding rate 4/{} rejected: {}", self.config.coding_rate, e);
        }
    }
}

/// State shared between the foreground handle and the worker task
struct Shared {
    tuner: Mutex<Tuner>,
    log: RwLock<EventLog>,
    state: AtomicU8,
    // Kept outside the tuner so stop never waits on a radio call
    stop_grace_ms: AtomicU64,
    sink: RwLock<Option<Arc<dyn PresentationSink>>>,
    clock: Arc<dyn Clock>,
    events_tx: mpsc::Sender<RadarPoint>,
}

impl Shared {
    fn tuner(&self) -> MutexGuard<'_, Tuner> {
        self.tuner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn log(&self) -> RwLockReadGuard<'_, EventLog> {
        self.log.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn log_mut(&self) -> RwLockWriteGuard<'_, EventLog> {
        self.log.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn sink(&self) -> Option<Arc<dyn PresentationSink>> {
        self.sink.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn state(&self) -> ListenerState {
        ListenerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ListenerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms.load(Ordering::Acquire))
    }

    fn set_stop_grace(&self, grace: Duration) {
        self.stop_grace_ms.store(grace.as_millis() as u64, Ordering::Release);
    }
}

/// Frequency-hopping listener
pub struct FrequencyListener {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    cancel_tx: Option<watch::Sender<bool>>,
}

impl FrequencyListener {
    /// Create a listener around `radio`. The receiver carries a copy of every
    /// recorded point; when it falls behind, copies are dropped.
    pub fn new(
        radio: Box<dyn RadioAdapter>,
        clock: Arc<dyn Clock>,
    ) -> (Self, mpsc::Receiver<RadarPoint>) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let config = ListenerConfig::default();
        let stop_grace_ms = config.stop_grace_ms;

        (
            Self {
                shared: Arc::new(Shared {
                    log: RwLock::new(EventLog::new(config.max_points)),
                    tuner: Mutex::new(Tuner {
                        radio,
                        config,
                        initialized: false,
                        tuned: None,
                    }),
                    state: AtomicU8::new(ListenerState::Idle as u8),
                    stop_grace_ms: AtomicU64::new(stop_grace_ms),
                    sink: RwLock::new(None),
                    clock,
                    events_tx: tx,
                }),
                worker: None,
                cancel_tx: None,
            },
            rx,
        )
    }

    /// Bring up the radio and tune it to the configured cursor.
    ///
    /// Rejected bandwidth, spreading factor or coding rate only produce
    /// warnings.
    pub fn init(&mut self, config: ListenerConfig) -> Result<()> {
        validate(&config)?;
        if self.shared.state() != ListenerState::Idle {
            return Err(ScanError::InvalidConfig(
                "cannot re-initialize while scanning".to_string(),
            ));
        }

        let (frequency, index, total) = {
            let mut tuner = self.shared.tuner();
            tuner.initialized = false;

            if let Err(e) = tuner.radio.init() {
                tracing::error!("{} failed to initialize: {}", tuner.radio.name(), e);
                return Err(ScanError::AdapterInit(e));
            }

            self.shared.log_mut().set_max_points(config.max_points);
            self.shared.set_stop_grace(config.stop_grace());
            tuner.config = config;
            tuner.apply_config();
            tuner.initialized = true;

            tracing::info!(
                "{} ready, {} frequencies, window {} ms",
                tuner.radio.name(),
                tuner.config.frequencies.len(),
                tuner.config.rx_window_ms
            );
            cursor(&tuner)
        };

        self.notify_cursor(frequency, index, total);
        Ok(())
    }

    /// Spawn the scan cycle. Must be called inside a Tokio runtime.
    pub fn start(&mut self) -> Result<()> {
        if self.shared.state() == ListenerState::Running {
            return Ok(());
        }
        if !self.shared.tuner().initialized {
            return Err(ScanError::NotInitialized);
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);
        self.shared.set_state(ListenerState::Running);
        self.worker = Some(tokio::spawn(scan_cycle(self.shared.clone(), cancel_rx)));
        self.cancel_tx = Some(cancel_tx);

        if let Some(sink) = self.shared.sink() {
            sink.set_scanning(true);
        }
        tracing::info!("Scanning started");
        Ok(())
    }

    /// Ask the worker to finish and wait up to the grace period; after that
    /// the task is aborted.
    pub async fn stop(&mut self) {
        if self.shared.state() == ListenerState::Idle {
            return;
        }
        self.shared.set_state(ListenerState::Stopping);

        if let Some(cancel_tx) = self.cancel_tx.take() {
            let _ = cancel_tx.send(true);
        }

        if let Some(mut worker) = self.worker.take() {
            let grace = self.shared.stop_grace();
            match tokio::time::timeout(grace, &mut worker).await {
                Ok(Ok(())) => tracing::debug!("Scan worker exited"),
                Ok(Err(e)) => tracing::warn!("Scan worker ended abnormally: {}", e),
                Err(_) => {
                    tracing::warn!(
                        "Scan worker ignored cancellation for {:?}, aborting it",
                        grace
                    );
                    worker.abort();
                }
            }
        }

        self.shared.set_state(ListenerState::Idle);
        if let Some(sink) = self.shared.sink() {
            sink.set_scanning(false);
        }
        tracing::info!("Scanning stopped");
    }

    /// Stop scanning and put the radio to sleep. A radio still stuck in a
    /// call from an aborted worker is left as is.
    pub async fn power_down(&mut self) {
        self.stop().await;
        let mut tuner = match self.shared.tuner.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(e)) => e.into_inner(),
            Err(TryLockError::WouldBlock) => {
                tracing::warn!("Radio busy, skipping sleep");
                return;
            }
        };
        if !tuner.radio.sleep() {
            tracing::warn!("{} did not enter sleep", tuner.radio.name());
        }
        tuner.tuned = None;
    }

    /// Hop to the next frequency, wrapping at the end
    pub fn next_frequency(&self) -> Result<u32> {
        self.hop(ListenerConfig::advance)
    }

    /// Hop to the previous frequency, wrapping at the start
    pub fn prev_frequency(&self) -> Result<u32> {
        self.hop(ListenerConfig::retreat)
    }

    fn hop(&self, step: fn(&mut ListenerConfig) -> Option<u32>) -> Result<u32> {
        let (frequency, index, total) = {
            let mut tuner = self.shared.tuner();
            if !tuner.initialized {
                return Err(ScanError::NotInitialized);
            }
            step(&mut tuner.config).ok_or(ScanError::EmptyFrequencySet)?;
            tuner.tune_to_cursor();
            cursor(&tuner)
        };

        tracing::debug!(
            "Hopped to {:.3} MHz ({}/{})",
            frequency as f64 / 1_000_000.0,
            index + 1,
            total
        );
        self.notify_cursor(frequency, index, total);
        Ok(frequency)
    }

    fn notify_cursor(&self, frequency: u32, index: usize, total: usize) {
        if let Some(sink) = self.shared.sink() {
            sink.set_current_freq(frequency);
            sink.set_current_freq_index(index, total);
        }
    }

    /// Snapshot of the radar history, oldest first
    pub fn get_radar_points(&self) -> Vec<RadarPoint> {
        self.shared.log().points()
    }

    pub fn get_event_stats(&self) -> EventStats {
        self.shared.log().stats()
    }

    pub fn clear_radar_points(&self) {
        self.shared.log_mut().clear_points();
    }

    pub fn clear_event_stats(&self) {
        self.shared.log_mut().clear_stats();
    }

    pub fn is_running(&self) -> bool {
        self.shared.state() == ListenerState::Running
    }

    pub fn state(&self) -> ListenerState {
        self.shared.state()
    }

    pub fn current_frequency(&self) -> Option<u32> {
        self.shared.tuner().config.current_frequency()
    }

    pub fn current_index(&self) -> usize {
        self.shared.tuner().config.current_index
    }

    pub fn frequency_count(&self) -> usize {
        self.shared.tuner().config.frequencies.len()
    }

    pub fn radio_name(&self) -> String {
        self.shared.tuner().radio.name().to_string()
    }

    pub fn config(&self) -> ListenerConfig {
        self.shared.tuner().config.clone()
    }

    /// Replace the configuration wholesale. An initialized radio is retuned
    /// right away; a running scan picks it up on its next poll.
    pub fn set_config(&self, config: ListenerConfig) -> Result<()> {
        validate(&config)?;

        let (frequency, index, total, initialized) = {
            let mut tuner = self.shared.tuner();
            self.shared.log_mut().set_max_points(config.max_points);
            self.shared.set_stop_grace(config.stop_grace());
            tuner.config = config;
            if tuner.initialized {
                tuner.apply_config();
            }
            let (frequency, index, total) = cursor(&tuner);
            (frequency, index, total, tuner.initialized)
        };

        if initialized {
            self.notify_cursor(frequency, index, total);
        }
        Ok(())
    }

    pub fn set_sink(&self, sink: Arc<dyn PresentationSink>) {
        *self.shared.sink.write().unwrap_or_else(PoisonError::into_inner) = Some(sink);
    }
}

impl Drop for FrequencyListener {
    fn drop(&mut self) {
        if let Some(cancel_tx) = self.cancel_tx.take() {
            let _ = cancel_tx.send(true);
        }
    }
}

fn validate(config: &ListenerConfig) -> Result<()> {
    if config.frequencies.is_empty() {
        return Err(ScanError::EmptyFrequencySet);
    }
    if config.current_index >= config.frequencies.len() {
        return Err(ScanError::InvalidConfig(format!(
            "frequency index {} out of range for {} frequencies",
            config.current_index,
            config.frequencies.len()
        )));
    }
    Ok(())
}

/// (frequency, index, total) of a validated cursor
fn cursor(tuner: &Tuner) -> (u32, usize, usize) {
    let config = &tuner.config;
    (
        config.current_frequency().unwrap_or_default(),
        config.current_index,
        config.frequencies.len(),
    )
}

/// How one RX window ended
enum Window {
    Heard {
        event_type: EventType,
        frequency: u32,
        rssi: i16,
        packet_length: u16,
    },
    Timeout,
    Cancelled,
}

async fn scan_cycle(shared: Arc<Shared>, mut cancel_rx: watch::Receiver<bool>) {
    tracing::debug!("Scan worker running");

    loop {
        if *cancel_rx.borrow() {
            break;
        }

        match rx_window(&shared, &mut cancel_rx).await {
            Window::Cancelled => break,
            Window::Timeout => tracing::trace!("RX window timed out"),
            Window::Heard {
                event_type,
                frequency,
                rssi,
                packet_length,
            } => record(&shared, event_type, frequency, rssi, packet_length),
        }

        let idle = shared.tuner().config.idle_interval();
        tokio::select! {
            _ = cancel_rx.changed() => break,
            _ = tokio::time::sleep(idle) => {}
        }
    }

    tracing::debug!("Scan worker exiting");
}

/// Poll the radio until a frame is classified, the window closes, or
/// cancellation arrives
async fn rx_window(shared: &Shared, cancel_rx: &mut watch::Receiver<bool>) -> Window {
    let (window, poll) = {
        let mut tuner = shared.tuner();
        tuner.tune_to_cursor();
        (tuner.config.rx_window(), tuner.config.poll_interval())
    };
    let started = Instant::now();

    loop {
        if started.elapsed() >= window {
            return Window::Timeout;
        }

        let polled = {
            let mut tuner = shared.tuner();
            let frequency = tuner.config.current_frequency().unwrap_or_default();
            tuner.radio.receive_frame().map(|frame| (frame, frequency))
        };

        match polled {
            Ok((frame, frequency)) => {
                if let Some(event_type) = classify(&frame) {
                    return Window::Heard {
                        event_type,
                        frequency,
                        rssi: frame.rssi,
                        packet_length: u16::try_from(frame.len()).unwrap_or(u16::MAX),
                    };
                }
            }
            Err(e) => tracing::debug!("Frame poll failed: {}", e),
        }

        tokio::select! {
            _ = cancel_rx.changed() => return Window::Cancelled,
            _ = tokio::time::sleep(poll) => {}
        }
    }
}

fn record(shared: &Shared, event_type: EventType, frequency: u32, rssi: i16, packet_length: u16) {
    let timestamp = shared.clock.now_ms();
    let outcome = shared
        .log_mut()
        .record(event_type, frequency, rssi, packet_length, timestamp);

    match outcome {
        RecordOutcome::Recorded(point) => {
            tracing::debug!(
                "{:?} on {:.3} MHz, {} dBm, {} bytes",
                point.event_type,
                point.frequency as f64 / 1_000_000.0,
                point.rssi,
                point.packet_length
            );

            if point.event_type == EventType::RxDone {
                if let Some(sink) = shared.sink() {
                    sink.set_current_freq(point.frequency);
                    sink.set_current_rssi(point.rssi);
                }
            }

            if let Err(mpsc::error::TrySendError::Full(_)) = shared.events_tx.try_send(point) {
                tracing::trace!("Event feed full, dropping live copy");
            }
        }
        RecordOutcome::Rejected { rssi } => {
            tracing::warn!(
                "Dropped frame on {:.3} MHz with implausible RSSI {} dBm",
                frequency as f64 / 1_000_000.0,
                rssi
            );
        }
        RecordOutcome::Skipped => {}
    }
}
