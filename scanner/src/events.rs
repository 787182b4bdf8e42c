//! Event classification and recording
//!
//! The listener's worker is the only writer of an [`EventLog`]; readers take
//! snapshots.

use crate::history::RadarHistory;
use crate::model::{rssi_in_domain, EventStats, EventType, RadarPoint, RSSI_FLOOR_DBM};
use lorascope_hal::{FrameStatus, RecvFrame, SNR_UNKNOWN_DB};

/// Map a polled frame to an event type; `None` means keep polling
pub fn classify(frame: &RecvFrame) -> Option<EventType> {
    match frame.status {
        FrameStatus::Done => Some(EventType::RxDone),
        FrameStatus::CrcError => Some(EventType::CrcError),
        FrameStatus::Empty => None,
    }
}

/// What became of a classified event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Recorded(RadarPoint),
    /// RSSI outside the plausible domain
    Rejected { rssi: i16 },
    /// Timeouts are not kept
    Skipped,
}

/// Radar history plus its running statistics
#[derive(Debug, Clone)]
pub struct EventLog {
    history: RadarHistory,
    stats: EventStats,
}

impl EventLog {
    pub fn new(max_points: usize) -> Self {
        Self {
            history: RadarHistory::new(max_points),
            stats: EventStats::default(),
        }
    }

    /// Record one classified event heard at `frequency`
    pub fn record(
        &mut self,
        event_type: EventType,
        frequency: u32,
        rssi: i16,
        packet_length: u16,
        timestamp: u64,
    ) -> RecordOutcome {
        let point = match event_type {
            EventType::Timeout => return RecordOutcome::Skipped,
            EventType::RxDone => {
                if !rssi_in_domain(rssi) {
                    return RecordOutcome::Rejected { rssi };
                }
                self.stats.record_rx_done(rssi, timestamp);
                RadarPoint {
                    timestamp,
                    frequency,
                    rssi,
                    snr: SNR_UNKNOWN_DB,
                    packet_length,
                    event_type,
                }
            }
            EventType::CrcError => {
                self.stats.record_crc_error(timestamp);
                RadarPoint {
                    timestamp,
                    frequency,
                    rssi: RSSI_FLOOR_DBM,
                    snr: SNR_UNKNOWN_DB,
                    packet_length: 0,
                    event_type,
                }
            }
        };

        self.history.push(point);
        RecordOutcome::Recorded(point)
    }

    pub fn points(&self) -> Vec<RadarPoint> {
        self.history.to_vec()
    }

    pub fn stats(&self) -> EventStats {
        self.stats
    }

    pub fn history(&self) -> &RadarHistory {
        &self.history
    }

    pub fn set_max_points(&mut self, max_points: usize) {
        self.history.set_capacity(max_points);
    }

    pub fn clear_points(&mut self) {
        self.history.clear();
    }

    pub fn clear_stats(&mut self) {
        self.stats = EventStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MHZ: u32 = 1_000_000;

    #[test]
    fn bounded_history_scenario() {
        let mut log = EventLog::new(2);
        log.record(EventType::RxDone, 433 * MHZ, -70, 10, 1);
        log.record(EventType::RxDone, 434 * MHZ, -60, 10, 2);
        log.record(EventType::RxDone, 435 * MHZ, -90, 10, 3);

        let kept: Vec<(u32, i16)> = log.points().iter().map(|p| (p.frequency, p.rssi)).collect();
        assert_eq!(kept, vec![(434 * MHZ, -60), (435 * MHZ, -90)]);

        let stats = log.stats();
        assert_eq!(stats.total_events, 3);
        assert_eq!(stats.avg_rssi_dbm(), Some(-73));
    }

    #[test]
    fn out_of_domain_rssi_is_rejected() {
        let mut log = EventLog::new(10);
        assert_eq!(
            log.record(EventType::RxDone, 433 * MHZ, -30, 10, 1),
            RecordOutcome::Rejected { rssi: -30 }
        );
        assert_eq!(
            log.record(EventType::RxDone, 433 * MHZ, -121, 10, 2),
            RecordOutcome::Rejected { rssi: -121 }
        );
        assert!(log.points().is_empty());
        assert_eq!(log.stats(), EventStats::default());

        // Domain bounds are inclusive
        assert!(matches!(log.record(EventType::RxDone, 433 * MHZ, -50, 1, 3), RecordOutcome::Recorded(_)));
        assert!(matches!(log.record(EventType::RxDone, 433 * MHZ, -120, 1, 4), RecordOutcome::Recorded(_)));
    }

    #[test]
    fn timeouts_are_not_recorded() {
        let mut log = EventLog::new(10);
        assert_eq!(log.record(EventType::Timeout, 433 * MHZ, -80, 0, 1), RecordOutcome::Skipped);
        assert!(log.points().is_empty());
        assert_eq!(log.stats().total_events, 0);
    }

    #[test]
    fn crc_error_uses_sentinel_point() {
        let mut log = EventLog::new(10);
        let outcome = log.record(EventType::CrcError, 433 * MHZ, -75, 40, 9);

        let RecordOutcome::Recorded(point) = outcome else {
            panic!("crc error should be recorded");
        };
        assert_eq!(point.rssi, RSSI_FLOOR_DBM);
        assert_eq!(point.packet_length, 0);

        let stats = log.stats();
        assert_eq!(stats.rx_error_count, 1);
        assert_eq!(stats.avg_rssi, None);
    }

    #[test]
    fn totals_stay_consistent_under_mixed_traffic() {
        let mut log = EventLog::new(3);
        let pattern = [
            (EventType::RxDone, -80),
            (EventType::CrcError, -120),
            (EventType::Timeout, -120),
            (EventType::RxDone, -20),
            (EventType::RxDone, -110),
        ];
        for (i, &(event_type, rssi)) in pattern.iter().cycle().take(50).enumerate() {
            log.record(event_type, 433 * MHZ, rssi, 8, i as u64);
            let stats = log.stats();
            assert_eq!(stats.total_events, stats.rx_done_count + stats.rx_error_count);
            assert!(log.history().len() <= 3);
        }
    }

    #[test]
    fn classify_frames() {
        assert_eq!(classify(&RecvFrame::empty()), None);
        let frame = RecvFrame {
            status: FrameStatus::CrcError,
            rssi: -90,
            payload: Vec::new(),
        };
        assert_eq!(classify(&frame), Some(EventType::CrcError));
    }
}
