//! Presentation sink
//!
//! Push side of the display interface. The listener calls these from both the
//! foreground and its worker, so implementations must be cheap and `Sync`.

/// Receives live scanner state
pub trait PresentationSink: Send + Sync {
    /// Frequency now being listened on (Hz)
    fn set_current_freq(&self, hz: u32);

    /// Cursor position within the frequency list
    fn set_current_freq_index(&self, index: usize, total: usize);

    /// RSSI of the latest reception (dBm)
    fn set_current_rssi(&self, dbm: i16);

    fn set_scanning(&self, scanning: bool);
}

/// Sink that only logs
pub struct LoggingSink;

impl PresentationSink for LoggingSink {
    fn set_current_freq(&self, hz: u32) {
        tracing::debug!("Current frequency: {:.3} MHz", hz as f64 / 1_000_000.0);
    }

    fn set_current_freq_index(&self, index: usize, total: usize) {
        tracing::trace!("Frequency {}/{}", index + 1, total);
    }

    fn set_current_rssi(&self, dbm: i16) {
        tracing::trace!("RSSI: {} dBm", dbm);
    }

    fn set_scanning(&self, scanning: bool) {
        tracing::info!("Scanning {}", if scanning { "active" } else { "inactive" });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn logging_sink_works_as_trait_object() {
        let sink: Arc<dyn PresentationSink> = Arc::new(LoggingSink);
        sink.set_current_freq(433_125_000);
        sink.set_current_freq_index(0, 84);
        sink.set_current_rssi(-90);
        sink.set_scanning(true);
    }
}
