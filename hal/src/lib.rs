//! LoRaScope Hardware Abstraction Layer
//!
//! Provides one capability interface over the narrowband radio modules
//! LoRaScope can listen with.
//!
//! # Modules
//!
//! - [`serial`] - UART link used by serial-attached modules
//! - [`e220`] - EBYTE E220 (LLCC68) modules in 433/868/915 MHz variants
//! - [`sim`] - Seeded traffic simulator for bench work and tests
//!
//! # Example
//!
//! ```rust,no_run
//! use lorascope_hal::{create_adapter, HalConfig, FrameStatus};
//!
//! let mut radio = create_adapter(&HalConfig::default()).unwrap();
//! radio.init().unwrap();
//! radio.set_frequency(433_125_000).unwrap();
//!
//! let frame = radio.receive_frame().unwrap();
//! if frame.status == FrameStatus::Done {
//!     println!("{} bytes @ {} dBm", frame.payload.len(), frame.rssi);
//! }
//! ```

use serde::{Deserialize, Serialize};

pub mod e220;
pub mod serial;
pub mod sim;

// Re-exports for convenience
pub use e220::{E220Adapter, E220Registers};
pub use serial::{SerialLink, SerialPort};
pub use sim::{SimChannel, SimConfig, SimulatedRadio};

/// RSSI reported when the module has nothing to measure (dBm)
pub const RSSI_UNKNOWN_DBM: i16 = -120;

/// SNR reported by modules without a real SNR measurement (dB)
pub const SNR_UNKNOWN_DB: i16 = -20;

/// Capability interface shared by every radio module.
///
/// Adapters are chosen once at startup and handed around as
/// `Box<dyn RadioAdapter>`.
pub trait RadioAdapter: Send {
    /// Module variant
    fn module_type(&self) -> ModuleType;

    /// Human readable module name
    fn name(&self) -> &str;

    /// Bring the module up. Calling it twice is harmless.
    fn init(&mut self) -> Result<(), HalError>;

    /// Tune to a carrier frequency in Hz
    fn set_frequency(&mut self, hz: u32) -> Result<(), HalError>;

    /// Set bandwidth in kHz (125/250/500)
    fn set_bandwidth(&mut self, khz: u16) -> Result<(), HalError>;

    /// Set spreading factor (7-12)
    fn set_spreading_factor(&mut self, sf: u8) -> Result<(), HalError>;

    /// Set coding rate denominator (5-8 for 4/5..4/8)
    fn set_coding_rate(&mut self, cr: u8) -> Result<(), HalError>;

    /// Current RSSI in dBm, [`RSSI_UNKNOWN_DBM`] when unavailable
    fn get_rssi(&mut self) -> i16;

    /// Current SNR in dB, [`SNR_UNKNOWN_DB`] when unavailable
    fn get_snr(&mut self) -> i16;

    /// Poll for a received frame without blocking for new traffic.
    fn receive_frame(&mut self) -> Result<RecvFrame, HalError>;

    /// Poll for a good packet and return its payload
    fn receive_packet(&mut self) -> Result<Option<Vec<u8>>, HalError> {
        let frame = self.receive_frame()?;
        match frame.status {
            FrameStatus::Done if !frame.payload.is_empty() => Ok(Some(frame.payload)),
            _ => Ok(None),
        }
    }

    /// Leave low-power mode and idle
    fn standby(&mut self) -> bool;

    /// Enter low-power mode
    fn sleep(&mut self) -> bool;
}

/// Outcome of a frame poll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameStatus {
    /// A frame arrived intact
    Done,
    /// A frame arrived but failed its integrity check
    CrcError,
    /// Nothing arrived
    Empty,
}

impl FrameStatus {
    /// Map a driver result code: 0 = done, 1 = CRC error, anything else = nothing.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => FrameStatus::Done,
            1 => FrameStatus::CrcError,
            _ => FrameStatus::Empty,
        }
    }

    /// Inverse of [`FrameStatus::from_code`]
    pub fn code(&self) -> i32 {
        match self {
            FrameStatus::Done => 0,
            FrameStatus::CrcError => 1,
            FrameStatus::Empty => -1,
        }
    }
}

/// A polled frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecvFrame {
    pub status: FrameStatus,
    pub rssi: i16,
    pub payload: Vec<u8>,
}

impl RecvFrame {
    /// Nothing received
    pub fn empty() -> Self {
        Self {
            status: FrameStatus::Empty,
            rssi: RSSI_UNKNOWN_DBM,
            payload: Vec::new(),
        }
    }

    /// Payload length as carried in events
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Supported module variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[allow(non_camel_case_types)]
pub enum ModuleType {
    /// E220-433T30D
    E220_433,
    /// E220-868T30D
    E220_868,
    /// E220-915T30D
    E220_915,
    /// Semtech SX1262 on SPI
    Sx1262,
    /// HopeRF RFM95 on SPI
    Rf95,
    /// Software traffic model
    Simulated,
}

impl ModuleType {
    pub fn display_name(&self) -> &'static str {
        match self {
            ModuleType::E220_433 => "E220-433",
            ModuleType::E220_868 => "E220-868",
            ModuleType::E220_915 => "E220-915",
            ModuleType::Sx1262 => "SX1262",
            ModuleType::Rf95 => "RF95",
            ModuleType::Simulated => "Simulated",
        }
    }

    /// Whether the module talks over a UART
    pub fn is_serial(&self) -> bool {
        matches!(self, ModuleType::E220_433 | ModuleType::E220_868 | ModuleType::E220_915)
    }
}

impl std::fmt::Display for ModuleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// HAL Error types
#[derive(Debug, thiserror::Error)]
pub enum HalError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Communication error: {0}")]
    CommunicationError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Unsupported module: {0}")]
    Unsupported(String),

    #[error("Device not initialized")]
    NotInitialized,
}

/// HAL Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HalConfig {
    pub module: ModuleType,
    pub serial_port: String,
    pub baud: u32,
    pub sim: SimConfig,
}

impl Default for HalConfig {
    fn default() -> Self {
        Self {
            module: ModuleType::Simulated,
            serial_port: "/dev/ttyUSB0".to_string(),
            baud: 9600,
            sim: SimConfig::default(),
        }
    }
}

/// Build the adapter for the configured module.
///
/// Serial ports are not opened here; a missing device shows up as an
/// error from [`RadioAdapter::init`].
pub fn create_adapter(config: &HalConfig) -> Result<Box<dyn RadioAdapter>, HalError> {
    match config.module {
        ModuleType::E220_433 | ModuleType::E220_868 | ModuleType::E220_915 => {
            let port = SerialPort::new(&config.serial_port, config.baud);
            tracing::info!("Using {} on {}", config.module, config.serial_port);
            Ok(Box::new(E220Adapter::new(port, config.module)?))
        }
        ModuleType::Simulated => {
            tracing::info!("Using simulated radio (seed {})", config.sim.seed);
            Ok(Box::new(SimulatedRadio::new(config.sim.clone())))
        }
        ModuleType::Sx1262 | ModuleType::Rf95 => Err(HalError::Unsupported(format!(
            "{} has no frame receive path",
            config.module
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_codes_map_to_status() {
        assert_eq!(FrameStatus::from_code(0), FrameStatus::Done);
        assert_eq!(FrameStatus::from_code(1), FrameStatus::CrcError);
        assert_eq!(FrameStatus::from_code(2), FrameStatus::Empty);
        assert_eq!(FrameStatus::from_code(-1), FrameStatus::Empty);
    }

    #[test]
    fn spi_modules_are_rejected() {
        let config = HalConfig {
            module: ModuleType::Sx1262,
            ..Default::default()
        };
        assert!(matches!(create_adapter(&config), Err(HalError::Unsupported(_))));
    }

    #[test]
    fn module_type_uses_kebab_case() {
        let json = serde_json::to_string(&ModuleType::E220_433).unwrap();
        assert_eq!(json, "\"e220-433\"");
        let parsed: ModuleType = serde_json::from_str("\"simulated\"").unwrap();
        assert_eq!(parsed, ModuleType::Simulated);
    }
}
