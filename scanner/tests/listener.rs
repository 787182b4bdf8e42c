use lorascope_hal::{FrameStatus, HalError, ModuleType, RadioAdapter, RecvFrame};
use lorascope_scanner::{
    EventType, FrequencyConfig, FrequencyListener, ListenerConfig, ListenerState, ManualClock,
    PresentationSink, ScanError,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_test::assert_ok;

const MHZ: u32 = 1_000_000;

#[derive(Default)]
struct RadioState {
    init_calls: u32,
    tuned: Vec<u32>,
    current: u32,
    /// Frames queued per frequency, served one per poll
    frames: HashMap<u32, VecDeque<RecvFrame>>,
    polls: u32,
    asleep: bool,
}

/// Radio that replays queued frames for whatever frequency it is tuned to
struct ScriptedRadio {
    state: Arc<Mutex<RadioState>>,
    fail_init: bool,
    reject_bandwidth: bool,
}

impl ScriptedRadio {
    fn new() -> (Self, Arc<Mutex<RadioState>>) {
        let state = Arc::new(Mutex::new(RadioState::default()));
        (
            Self {
                state: state.clone(),
                fail_init: false,
                reject_bandwidth: false,
            },
            state,
        )
    }
}

impl RadioAdapter for ScriptedRadio {
    fn module_type(&self) -> ModuleType {
        ModuleType::Simulated
    }

    fn name(&self) -> &str {
        "Scripted"
    }

    fn init(&mut self) -> Result<(), HalError> {
        self.state.lock().unwrap().init_calls += 1;
        if self.fail_init {
            return Err(HalError::DeviceNotFound("/dev/ttyUSB9".to_string()));
        }
        Ok(())
    }

    fn set_frequency(&mut self, hz: u32) -> Result<(), HalError> {
        let mut state = self.state.lock().unwrap();
        state.tuned.push(hz);
        state.current = hz;
        Ok(())
    }

    fn set_bandwidth(&mut self, khz: u16) -> Result<(), HalError> {
        if self.reject_bandwidth {
            return Err(HalError::InvalidConfig(format!("{} kHz", khz)));
        }
        Ok(())
    }

    fn set_spreading_factor(&mut self, _sf: u8) -> Result<(), HalError> {
        Ok(())
    }

    fn set_coding_rate(&mut self, _cr: u8) -> Result<(), HalError> {
        Ok(())
    }

    fn get_rssi(&mut self) -> i16 {
        -110
    }

    fn get_snr(&mut self) -> i16 {
        -20
    }

    fn receive_frame(&mut self) -> Result<RecvFrame, HalError> {
        let mut state = self.state.lock().unwrap();
        state.polls += 1;
        let current = state.current;
        Ok(state
            .frames
            .get_mut(&current)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(RecvFrame::empty))
    }

    fn standby(&mut self) -> bool {
        self.state.lock().unwrap().asleep = false;
        true
    }

    fn sleep(&mut self) -> bool {
        self.state.lock().unwrap().asleep = true;
        true
    }
}

#[derive(Default)]
struct RecordingSink {
    freqs: Mutex<Vec<u32>>,
    indices: Mutex<Vec<(usize, usize)>>,
    rssi: Mutex<Vec<i16>>,
    scanning: Mutex<Vec<bool>>,
}

impl PresentationSink for RecordingSink {
    fn set_current_freq(&self, hz: u32) {
        self.freqs.lock().unwrap().push(hz);
    }

    fn set_current_freq_index(&self, index: usize, total: usize) {
        self.indices.lock().unwrap().push((index, total));
    }

    fn set_current_rssi(&self, dbm: i16) {
        self.rssi.lock().unwrap().push(dbm);
    }

    fn set_scanning(&self, scanning: bool) {
        self.scanning.lock().unwrap().push(scanning);
    }
}

fn frame(status: FrameStatus, rssi: i16, len: usize) -> RecvFrame {
    RecvFrame {
        status,
        rssi,
        payload: vec![0xA5; len],
    }
}

fn config(freqs_mhz: &[u32], max_points: usize) -> ListenerConfig {
    ListenerConfig {
        frequencies: freqs_mhz.iter().map(|&f| FrequencyConfig::new(f * MHZ)).collect(),
        max_points,
        ..Default::default()
    }
}

fn queue(state: &Arc<Mutex<RadioState>>, hz: u32, frames: Vec<RecvFrame>) {
    state.lock().unwrap().frames.entry(hz).or_default().extend(frames);
}

#[tokio::test(start_paused = true)]
async fn init_fails_fast_on_empty_frequency_set() {
    let (radio, state) = ScriptedRadio::new();
    let (mut listener, _events) = FrequencyListener::new(Box::new(radio), Arc::new(ManualClock::new(0)));

    let result = listener.init(ListenerConfig::default());
    assert!(matches!(result, Err(ScanError::EmptyFrequencySet)));
    assert_eq!(state.lock().unwrap().init_calls, 0);
}

#[tokio::test(start_paused = true)]
async fn init_reports_adapter_failure() {
    let (mut radio, _state) = ScriptedRadio::new();
    radio.fail_init = true;
    let (mut listener, _events) = FrequencyListener::new(Box::new(radio), Arc::new(ManualClock::new(0)));

    let result = listener.init(config(&[433], 10));
    assert!(matches!(result, Err(ScanError::AdapterInit(HalError::DeviceNotFound(_)))));
    assert!(matches!(listener.start(), Err(ScanError::NotInitialized)));
    assert_eq!(listener.state(), ListenerState::Idle);
}

#[tokio::test(start_paused = true)]
async fn init_rejects_cursor_out_of_bounds() {
    let (radio, _state) = ScriptedRadio::new();
    let (mut listener, _events) = FrequencyListener::new(Box::new(radio), Arc::new(ManualClock::new(0)));

    let mut bad = config(&[433, 434], 10);
    bad.current_index = 2;
    assert!(matches!(listener.init(bad), Err(ScanError::InvalidConfig(_))));
}

#[tokio::test(start_paused = true)]
async fn init_tunes_cursor_despite_rejected_parameters() {
    let (mut radio, state) = ScriptedRadio::new();
    radio.reject_bandwidth = true;
    let (mut listener, _events) = FrequencyListener::new(Box::new(radio), Arc::new(ManualClock::new(0)));

    let mut cfg = config(&[433, 434, 435], 10);
    cfg.current_index = 1;
    assert_ok!(listener.init(cfg));

    assert_eq!(state.lock().unwrap().tuned, vec![434 * MHZ]);
    assert_eq!(listener.current_frequency(), Some(434 * MHZ));
}

#[tokio::test(start_paused = true)]
async fn cursor_wraps_and_notifies_sink() {
    let (radio, state) = ScriptedRadio::new();
    let (mut listener, _events) = FrequencyListener::new(Box::new(radio), Arc::new(ManualClock::new(0)));
    let sink = Arc::new(RecordingSink::default());
    listener.set_sink(sink.clone());

    let mut cfg = config(&[433, 434, 435], 10);
    cfg.current_index = 2;
    assert_ok!(listener.init(cfg));

    assert_eq!(assert_ok!(listener.next_frequency()), 433 * MHZ);
    assert_eq!(listener.current_index(), 0);
    assert_eq!(assert_ok!(listener.prev_frequency()), 435 * MHZ);
    assert_eq!(listener.current_index(), 2);

    assert_eq!(state.lock().unwrap().tuned, vec![435 * MHZ, 433 * MHZ, 435 * MHZ]);
    assert_eq!(*sink.indices.lock().unwrap(), vec![(2, 3), (0, 3), (2, 3)]);
    assert_eq!(*sink.freqs.lock().unwrap(), vec![435 * MHZ, 433 * MHZ, 435 * MHZ]);
}

#[tokio::test(start_paused = true)]
async fn hop_before_init_is_rejected() {
    let (radio, _state) = ScriptedRadio::new();
    let (listener, _events) = FrequencyListener::new(Box::new(radio), Arc::new(ManualClock::new(0)));
    assert!(matches!(listener.next_frequency(), Err(ScanError::NotInitialized)));
}

#[tokio::test(start_paused = true)]
async fn history_is_bounded_and_ordered() {
    let (radio, state) = ScriptedRadio::new();
    let (mut listener, _events) = FrequencyListener::new(Box::new(radio), Arc::new(ManualClock::new(0)));
    assert_ok!(listener.init(config(&[433], 2)));

    queue(
        &state,
        433 * MHZ,
        vec![
            frame(FrameStatus::Done, -70, 12),
            frame(FrameStatus::Done, -60, 20),
            frame(FrameStatus::Done, -90, 8),
        ],
    );

    assert_ok!(listener.start());
    tokio::time::sleep(Duration::from_secs(2)).await;
    listener.stop().await;

    let points = listener.get_radar_points();
    let kept: Vec<(i16, u16)> = points.iter().map(|p| (p.rssi, p.packet_length)).collect();
    assert_eq!(kept, vec![(-60, 20), (-90, 8)]);

    let stats = listener.get_event_stats();
    assert_eq!(stats.total_events, 3);
    assert_eq!(stats.rx_done_count, 3);
    assert_eq!(stats.avg_rssi_dbm(), Some(-73));
    assert!(points.iter().all(|p| p.snr == -20));
}

#[tokio::test(start_paused = true)]
async fn implausible_rssi_is_dropped() {
    let (radio, state) = ScriptedRadio::new();
    let (mut listener, _events) = FrequencyListener::new(Box::new(radio), Arc::new(ManualClock::new(0)));
    assert_ok!(listener.init(config(&[433], 10)));

    queue(&state, 433 * MHZ, vec![frame(FrameStatus::Done, -30, 10)]);

    assert_ok!(listener.start());
    tokio::time::sleep(Duration::from_secs(1)).await;
    listener.stop().await;

    assert!(listener.get_radar_points().is_empty());
    assert_eq!(listener.get_event_stats().total_events, 0);
}

#[tokio::test(start_paused = true)]
async fn crc_errors_and_timeouts() {
    let (radio, state) = ScriptedRadio::new();
    let (mut listener, _events) = FrequencyListener::new(Box::new(radio), Arc::new(ManualClock::new(0)));
    let mut cfg = config(&[433], 10);
    cfg.rx_window_ms = 200;
    assert_ok!(listener.init(cfg));

    queue(&state, 433 * MHZ, vec![frame(FrameStatus::CrcError, -85, 0)]);

    assert_ok!(listener.start());
    // Several windows: one CRC error, the rest time out
    tokio::time::sleep(Duration::from_secs(3)).await;
    listener.stop().await;

    let points = listener.get_radar_points();
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].event_type, EventType::CrcError);
    assert_eq!(points[0].rssi, -120);
    assert_eq!(points[0].packet_length, 0);

    let stats = listener.get_event_stats();
    assert_eq!(stats.rx_error_count, 1);
    assert_eq!(stats.total_events, 1);
    assert_eq!(stats.avg_rssi, None);
    assert!(state.lock().unwrap().polls > 20);
}

#[tokio::test(start_paused = true)]
async fn zero_window_always_times_out() {
    let (radio, state) = ScriptedRadio::new();
    let (mut listener, _events) = FrequencyListener::new(Box::new(radio), Arc::new(ManualClock::new(0)));
    let mut cfg = config(&[433], 10);
    cfg.rx_window_ms = 0;
    assert_ok!(listener.init(cfg));

    queue(&state, 433 * MHZ, vec![frame(FrameStatus::Done, -70, 4)]);

    assert_ok!(listener.start());
    tokio::time::sleep(Duration::from_secs(1)).await;
    listener.stop().await;

    assert!(listener.get_radar_points().is_empty());
    assert_eq!(state.lock().unwrap().polls, 0);
}

#[tokio::test(start_paused = true)]
async fn start_is_idempotent_and_stop_returns_to_idle() {
    let (radio, _state) = ScriptedRadio::new();
    let (mut listener, _events) = FrequencyListener::new(Box::new(radio), Arc::new(ManualClock::new(0)));
    let sink = Arc::new(RecordingSink::default());
    listener.set_sink(sink.clone());

    // Stopping an idle listener does nothing
    listener.stop().await;
    assert_eq!(listener.state(), ListenerState::Idle);

    assert_ok!(listener.init(config(&[433, 434], 10)));
    assert_ok!(listener.start());
    assert_ok!(listener.start());
    assert!(listener.is_running());

    tokio::time::sleep(Duration::from_millis(250)).await;
    listener.stop().await;

    assert_eq!(listener.state(), ListenerState::Idle);
    assert!(!listener.is_running());
    assert_eq!(*sink.scanning.lock().unwrap(), vec![true, false]);
}

#[tokio::test(start_paused = true)]
async fn hop_while_running_moves_next_window() {
    let (radio, state) = ScriptedRadio::new();
    let (mut listener, mut events) = FrequencyListener::new(Box::new(radio), Arc::new(ManualClock::new(0)));
    let sink = Arc::new(RecordingSink::default());
    listener.set_sink(sink.clone());
    assert_ok!(listener.init(config(&[433, 434, 435], 10)));

    queue(&state, 434 * MHZ, vec![frame(FrameStatus::Done, -66, 16)]);

    assert_ok!(listener.start());
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(listener.get_radar_points().is_empty());

    assert_ok!(listener.next_frequency());
    tokio::time::sleep(Duration::from_secs(2)).await;
    listener.stop().await;

    let point = events.try_recv().unwrap();
    assert_eq!(point.frequency, 434 * MHZ);
    assert_eq!(point.rssi, -66);
    assert_eq!(listener.get_radar_points(), vec![point]);
    assert_eq!(*sink.rssi.lock().unwrap(), vec![-66]);
}

#[tokio::test(start_paused = true)]
async fn clearing_resets_snapshots() {
    let (radio, state) = ScriptedRadio::new();
    let clock = ManualClock::new(5_000);
    let (mut listener, _events) = FrequencyListener::new(Box::new(radio), Arc::new(clock.clone()));
    assert_ok!(listener.init(config(&[433], 10)));

    queue(&state, 433 * MHZ, vec![frame(FrameStatus::Done, -80, 3)]);
    assert_ok!(listener.start());
    tokio::time::sleep(Duration::from_millis(500)).await;

    let points = listener.get_radar_points();
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].timestamp, 5_000);

    listener.clear_radar_points();
    listener.clear_event_stats();
    assert!(listener.get_radar_points().is_empty());
    assert_eq!(listener.get_event_stats().total_events, 0);

    listener.stop().await;
}

#[tokio::test(start_paused = true)]
async fn set_config_replaces_list_and_capacity() {
    let (radio, state) = ScriptedRadio::new();
    let (mut listener, _events) = FrequencyListener::new(Box::new(radio), Arc::new(ManualClock::new(0)));
    assert_ok!(listener.init(config(&[433], 10)));

    let mut next = config(&[868, 869], 1);
    next.current_index = 1;
    assert_ok!(listener.set_config(next));

    assert_eq!(listener.frequency_count(), 2);
    assert_eq!(listener.current_frequency(), Some(869 * MHZ));
    assert_eq!(state.lock().unwrap().tuned.last(), Some(&(869 * MHZ)));
    assert!(matches!(listener.set_config(ListenerConfig::default()), Err(ScanError::EmptyFrequencySet)));
}

#[tokio::test(start_paused = true)]
async fn power_down_sleeps_radio() {
    let (radio, state) = ScriptedRadio::new();
    let (mut listener, _events) = FrequencyListener::new(Box::new(radio), Arc::new(ManualClock::new(0)));
    assert_ok!(listener.init(config(&[433], 10)));
    assert_ok!(listener.start());

    listener.power_down().await;

    assert_eq!(listener.state(), ListenerState::Idle);
    assert!(state.lock().unwrap().asleep);
}

/// Radio whose receive call blocks the thread well past any stop grace
struct HangingRadio {
    asleep: Arc<std::sync::atomic::AtomicBool>,
}

impl RadioAdapter for HangingRadio {
    fn module_type(&self) -> ModuleType {
        ModuleType::Simulated
    }

    fn name(&self) -> &str {
        "Hanging"
    }

    fn init(&mut self) -> Result<(), HalError> {
        Ok(())
    }

    fn set_frequency(&mut self, _hz: u32) -> Result<(), HalError> {
        Ok(())
    }

    fn set_bandwidth(&mut self, _khz: u16) -> Result<(), HalError> {
        Ok(())
    }

    fn set_spreading_factor(&mut self, _sf: u8) -> Result<(), HalError> {
        Ok(())
    }

    fn set_coding_rate(&mut self, _cr: u8) -> Result<(), HalError> {
        Ok(())
    }

    fn get_rssi(&mut self) -> i16 {
        -110
    }

    fn get_snr(&mut self) -> i16 {
        -20
    }

    fn receive_frame(&mut self) -> Result<RecvFrame, HalError> {
        std::thread::sleep(Duration::from_secs(2));
        Ok(RecvFrame::empty())
    }

    fn standby(&mut self) -> bool {
        true
    }

    fn sleep(&mut self) -> bool {
        self.asleep.store(true, std::sync::atomic::Ordering::SeqCst);
        true
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_aborts_worker_stuck_in_radio_call() {
    let asleep = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let radio = HangingRadio { asleep: asleep.clone() };
    let (mut listener, _events) = FrequencyListener::new(Box::new(radio), Arc::new(ManualClock::new(0)));
    let sink = Arc::new(RecordingSink::default());
    listener.set_sink(sink.clone());

    let mut cfg = config(&[433], 10);
    cfg.stop_grace_ms = 100;
    assert_ok!(listener.init(cfg));
    assert_ok!(listener.start());

    // Let the worker enter the blocking receive
    tokio::time::sleep(Duration::from_millis(200)).await;

    let started = std::time::Instant::now();
    listener.stop().await;
    assert!(started.elapsed() < Duration::from_secs(1), "stop took {:?}", started.elapsed());
    assert_eq!(listener.state(), ListenerState::Idle);
    assert!(!listener.is_running());
    assert_eq!(*sink.scanning.lock().unwrap(), vec![true, false]);

    // The radio is still busy, so power down skips sleep instead of waiting
    let started = std::time::Instant::now();
    listener.power_down().await;
    assert!(started.elapsed() < Duration::from_secs(1), "power down took {:?}", started.elapsed());
    assert!(!asleep.load(std::sync::atomic::Ordering::SeqCst));
}
