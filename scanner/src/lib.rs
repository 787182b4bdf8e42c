//! LoRaScope Scanning Engine
//!
//! Hops a radio across a list of frequencies, classifies what it hears into
//! a bounded event history with running statistics, and ranks frequencies by
//! recent activity.
//!
//! # Modules
//!
//! - [`listener`] - background scan cycle and frequency cursor
//! - [`events`] - classification and recording of receive events
//! - [`statistics`] - per-frequency aggregation and ranking
//! - [`sweep`] - sample-taking sweep feeding the collector
//!
//! # Example
//!
//! ```rust,no_run
//! use lorascope_hal::{create_adapter, HalConfig};
//! use lorascope_scanner::{FrequencyListener, FrequencyPlan, MonotonicClock};
//! use std::sync::Arc;
//!
//! # async fn run() -> lorascope_scanner::Result<()> {
//! let radio = create_adapter(&HalConfig::default()).map_err(lorascope_scanner::ScanError::AdapterInit)?;
//! let (mut listener, mut events) = FrequencyListener::new(radio, Arc::new(MonotonicClock::new()));
//!
//! listener.init(FrequencyPlan::default().listener_config())?;
//! listener.start()?;
//!
//! while let Some(point) = events.recv().await {
//!     println!("{:?} @ {} Hz, {} dBm", point.event_type, point.frequency, point.rssi);
//! }
//! # Ok(())
//! # }
//! ```

pub mod activity;
pub mod clock;
pub mod events;
pub mod history;
pub mod listener;
pub mod model;
pub mod sink;
pub mod statistics;
pub mod sweep;
pub mod window;

use lorascope_hal::HalError;

pub use activity::ActivityScorer;
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use events::{EventLog, RecordOutcome};
pub use history::RadarHistory;
pub use listener::{FrequencyListener, ListenerState};
pub use model::{
    EventStats, EventType, FrequencyConfig, FrequencyPlan, FrequencyStats, ListenerConfig,
    RadarPoint, ScanSample,
};
pub use sink::{LoggingSink, PresentationSink};
pub use statistics::StatisticsCollector;
pub use sweep::{FrequencySweeper, ScannerConfig, SweepOrder};
pub use window::SlidingWindowStats;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("Radio failed to initialize: {0}")]
    AdapterInit(HalError),

    #[error("No frequencies configured")]
    EmptyFrequencySet,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Listener not initialized")]
    NotInitialized,
}

pub type Result<T> = std::result::Result<T, ScanError>;
