//! Simulated radio for bench work without hardware
//!
//! Each configured channel carries bursty traffic with its own mean RSSI,
//! packet probability and CRC error probability. The generator is seeded
//! so runs are reproducible.

use crate::{FrameStatus, HalError, ModuleType, RadioAdapter, RecvFrame, RSSI_UNKNOWN_DBM, SNR_UNKNOWN_DB};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

/// One busy channel in the simulation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimChannel {
    pub frequency: u32,
    /// Mean RSSI of frames on this channel (dBm)
    pub rssi_dbm: f64,
    /// Chance that a single poll finds a frame
    pub packet_probability: f64,
    /// Chance that a found frame is corrupt
    pub crc_error_probability: f64,
}

/// Simulation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub seed: u64,
    /// Background noise floor (dBm)
    pub noise_floor_dbm: f64,
    /// RSSI standard deviation (dB)
    pub rssi_jitter_db: f64,
    pub channels: Vec<SimChannel>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 0x10_2A_5C_0E,
            noise_floor_dbm: -112.0,
            rssi_jitter_db: 4.0,
            channels: vec![
                SimChannel {
                    frequency: 433_125_000,
                    rssi_dbm: -72.0,
                    packet_probability: 0.02,
                    crc_error_probability: 0.1,
                },
                SimChannel {
                    frequency: 434_125_000,
                    rssi_dbm: -95.0,
                    packet_probability: 0.008,
                    crc_error_probability: 0.3,
                },
                SimChannel {
                    frequency: 470_125_000,
                    rssi_dbm: -60.0,
                    packet_probability: 0.005,
                    crc_error_probability: 0.05,
                },
            ],
        }
    }
}

/// Seeded traffic generator implementing [`RadioAdapter`]
pub struct SimulatedRadio {
    config: SimConfig,
    rng: StdRng,
    frequency: u32,
    ready: bool,
    asleep: bool,
}

impl SimulatedRadio {
    pub fn new(config: SimConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            rng,
            frequency: 0,
            ready: false,
            asleep: false,
        }
    }

    /// Currently tuned frequency
    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    fn active_channel(&self) -> Option<&SimChannel> {
        self.config
            .channels
            .iter()
            .find(|c| c.frequency == self.frequency)
    }

    fn sample_rssi(&mut self, mean: f64) -> i16 {
        let jitter = self.config.rssi_jitter_db.max(0.0);
        let value = match Normal::new(mean, jitter) {
            Ok(dist) => dist.sample(&mut self.rng),
            Err(_) => mean,
        };
        value.round().clamp(-140.0, -20.0) as i16
    }

    fn listening(&self) -> Result<(), HalError> {
        if !self.ready {
            return Err(HalError::NotInitialized);
        }
        if self.asleep {
            return Err(HalError::DeviceNotFound("radio is asleep".to_string()));
        }
        Ok(())
    }
}

impl RadioAdapter for SimulatedRadio {
    fn module_type(&self) -> ModuleType {
        ModuleType::Simulated
    }

    fn name(&self) -> &str {
        "Simulated"
    }

    fn init(&mut self) -> Result<(), HalError> {
        self.ready = true;
        self.asleep = false;
        tracing::info!(
            "Simulated radio initialized with {} active channels",
            self.config.channels.len()
        );
        Ok(())
    }

    fn set_frequency(&mut self, hz: u32) -> Result<(), HalError> {
        self.listening()?;
        self.frequency = hz;
        Ok(())
    }

    fn set_bandwidth(&mut self, khz: u16) -> Result<(), HalError> {
        self.listening()?;
        match khz {
            125 | 250 | 500 => Ok(()),
            other => Err(HalError::InvalidConfig(format!("Unsupported bandwidth {} kHz", other))),
        }
    }

    fn set_spreading_factor(&mut self, sf: u8) -> Result<(), HalError> {
        self.listening()?;
        if (7..=12).contains(&sf) {
            Ok(())
        } else {
            Err(HalError::InvalidConfig(format!("Spreading factor {} out of range 7-12", sf)))
        }
    }

    fn set_coding_rate(&mut self, cr: u8) -> Result<(), HalError> {
        self.listening()?;
        if (5..=8).contains(&cr) {
            Ok(())
        } else {
            Err(HalError::InvalidConfig(format!("Coding rate 4/{} out of range", cr)))
        }
    }

    fn get_rssi(&mut self) -> i16 {
        if self.listening().is_err() {
            return RSSI_UNKNOWN_DBM;
        }
        let floor = self.config.noise_floor_dbm;
        self.sample_rssi(floor)
    }

    fn get_snr(&mut self) -> i16 {
        SNR_UNKNOWN_DB
    }

    fn receive_frame(&mut self) -> Result<RecvFrame, HalError> {
        self.listening()?;

        let Some(channel) = self.active_channel().cloned() else {
            return Ok(RecvFrame::empty());
        };

        if !self.rng.gen_bool(channel.packet_probability.clamp(0.0, 1.0)) {
            return Ok(RecvFrame::empty());
        }

        let rssi = self.sample_rssi(channel.rssi_dbm);
        if self.rng.gen_bool(channel.crc_error_probability.clamp(0.0, 1.0)) {
            return Ok(RecvFrame {
                status: FrameStatus::CrcError,
                rssi,
                payload: Vec::new(),
            });
        }

        let len = self.rng.gen_range(8..=64);
        let payload = (0..len).map(|_| self.rng.gen()).collect();

        Ok(RecvFrame {
            status: FrameStatus::Done,
            rssi,
            payload,
        })
    }

    fn standby(&mut self) -> bool {
        self.asleep = false;
        self.ready
    }

    fn sleep(&mut self) -> bool {
        if self.ready {
            self.asleep = true;
        }
        self.ready
    }
}
