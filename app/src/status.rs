// Live status board fed by the listener

use lorascope_scanner::PresentationSink;
use std::sync::atomic::{AtomicBool, AtomicI16, AtomicU32, AtomicUsize, Ordering};

/// Latest values pushed by the listener
#[derive(Debug, Default)]
pub struct StatusBoard {
    current_freq: AtomicU32,
    index: AtomicUsize,
    total: AtomicUsize,
    rssi: AtomicI16,
    scanning: AtomicBool,
}

/// Point-in-time copy of the board
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub current_freq: u32,
    pub index: usize,
    pub total: usize,
    pub rssi: i16,
    pub scanning: bool,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self {
            rssi: AtomicI16::new(lorascope_hal::RSSI_UNKNOWN_DBM),
            ..Default::default()
        }
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            current_freq: self.current_freq.load(Ordering::Relaxed),
            index: self.index.load(Ordering::Relaxed),
            total: self.total.load(Ordering::Relaxed),
            rssi: self.rssi.load(Ordering::Relaxed),
            scanning: self.scanning.load(Ordering::Acquire),
        }
    }
}

impl PresentationSink for StatusBoard {
    fn set_current_freq(&self, hz: u32) {
        self.current_freq.store(hz, Ordering::Relaxed);
    }

    fn set_current_freq_index(&self, index: usize, total: usize) {
        self.index.store(index, Ordering::Relaxed);
        self.total.store(total, Ordering::Relaxed);
    }

    fn set_current_rssi(&self, dbm: i16) {
        self.rssi.store(dbm, Ordering::Relaxed);
    }

    fn set_scanning(&self, scanning: bool) {
        self.scanning.store(scanning, Ordering::Release);
    }
}
