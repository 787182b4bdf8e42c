//! EBYTE E220 (LLCC68) modules over UART
//!
//! The E220 hides the LoRa modem behind a register block. Bandwidth and
//! spreading factor both land in the single air-data-rate field, so the
//! later of the two calls wins.

use crate::serial::SerialLink;
use crate::{FrameStatus, HalError, ModuleType, RadioAdapter, RecvFrame, RSSI_UNKNOWN_DBM, SNR_UNKNOWN_DB};

const CMD_WRITE: u8 = 0xC0;
const CMD_REPLY: u8 = 0xC1;
const REG_BLOCK_LEN: u8 = 0x08;
const AMBIENT_RSSI_READ: [u8; 6] = [0xC0, 0xC1, 0xC2, 0xC3, 0x00, 0x01];

const MAX_FRAME: usize = 256;
const MAX_CHANNEL: u32 = 80;
const CHANNEL_SPACING_HZ: u32 = 1_000_000;

// Consecutive empty reads (100 ms each) before a reply is considered lost
const REPLY_RETRIES: usize = 3;

/// Shadow copy of the module's configuration registers (00H-07H)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct E220Registers {
    pub address: u16,
    /// UART baud code, bits 7-5 of REG0 (0b011 = 9600)
    pub uart_baud: u8,
    /// Air data rate code, bits 2-0 of REG0
    pub air_data_rate: u8,
    /// Ambient noise RSSI register enable, bit 5 of REG1
    pub ambient_noise: bool,
    /// TX power code, bits 1-0 of REG1
    pub tx_power: u8,
    pub channel: u8,
    /// Append an RSSI byte to every received frame, bit 7 of REG3
    pub rssi_byte: bool,
    pub crypt_key: u16,
}

impl Default for E220Registers {
    fn default() -> Self {
        Self {
            address: 0x0000,
            uart_baud: 0b011,
            air_data_rate: 0b010,
            ambient_noise: true,
            tx_power: 0b00,
            channel: 0,
            rssi_byte: true,
            crypt_key: 0x0000,
        }
    }
}

impl E220Registers {
    /// Encode registers 00H-07H
    pub fn encode(&self) -> [u8; 8] {
        let reg0 = ((self.uart_baud & 0b111) << 5) | (self.air_data_rate & 0b111);
        let reg1 = (u8::from(self.ambient_noise) << 5) | (self.tx_power & 0b11);
        let reg3 = u8::from(self.rssi_byte) << 7;

        [
            (self.address >> 8) as u8,
            self.address as u8,
            reg0,
            reg1,
            self.channel,
            reg3,
            (self.crypt_key >> 8) as u8,
            self.crypt_key as u8,
        ]
    }

    /// Full write command for the register block
    pub fn write_command(&self) -> Vec<u8> {
        let mut cmd = vec![CMD_WRITE, 0x00, REG_BLOCK_LEN];
        cmd.extend_from_slice(&self.encode());
        cmd
    }
}

/// E220 adapter over any serial link
pub struct E220Adapter<L: SerialLink> {
    link: L,
    module: ModuleType,
    name: String,
    registers: E220Registers,
    initialized: bool,
}

impl<L: SerialLink> E220Adapter<L> {
    pub fn new(link: L, module: ModuleType) -> Result<Self, HalError> {
        if !module.is_serial() {
            return Err(HalError::InvalidConfig(format!("{} is not an E220 variant", module)));
        }

        Ok(Self {
            link,
            module,
            name: module.display_name().to_string(),
            registers: E220Registers::default(),
            initialized: false,
        })
    }

    pub fn registers(&self) -> &E220Registers {
        &self.registers
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Lowest carrier frequency of the band (channel 0)
    pub fn base_frequency(&self) -> u32 {
        match self.module {
            ModuleType::E220_868 => 850_000_000,
            ModuleType::E220_915 => 902_000_000,
            _ => 410_125_000,
        }
    }

    /// Channel number for a carrier frequency
    pub fn channel_for(&self, hz: u32) -> Result<u8, HalError> {
        let base = self.base_frequency();
        if hz < base {
            return Err(HalError::InvalidConfig(format!(
                "{} Hz is below the {} band",
                hz, self.module
            )));
        }

        let channel = (hz - base) / CHANNEL_SPACING_HZ;
        if channel > MAX_CHANNEL {
            return Err(HalError::InvalidConfig(format!(
                "{} Hz is above the {} band",
                hz, self.module
            )));
        }

        Ok(channel as u8)
    }

    fn ensure_initialized(&self) -> Result<(), HalError> {
        if self.initialized {
            Ok(())
        } else {
            Err(HalError::NotInitialized)
        }
    }

    /// Read exactly `buf.len()` bytes or give up after a few silent timeouts
    fn read_reply(&mut self, buf: &mut [u8]) -> Result<(), HalError> {
        let mut filled = 0;
        let mut silent = 0;

        while filled < buf.len() {
            let n = self.link.read(&mut buf[filled..])?;
            if n == 0 {
                silent += 1;
                if silent >= REPLY_RETRIES {
                    return Err(HalError::Timeout);
                }
                continue;
            }
            filled += n;
        }

        Ok(())
    }

    fn write_registers(&mut self, registers: &E220Registers) -> Result<(), HalError> {
        self.link.write_all(&registers.write_command())?;

        let mut reply = [0u8; 3 + REG_BLOCK_LEN as usize];
        self.read_reply(&mut reply)?;

        if reply[0] != CMD_REPLY || reply[1] != 0x00 || reply[2] != REG_BLOCK_LEN {
            return Err(HalError::CommunicationError(format!(
                "Unexpected register reply header {:02X} {:02X} {:02X}",
                reply[0], reply[1], reply[2]
            )));
        }

        Ok(())
    }

    /// Apply a register change; the shadow copy only moves on success
    fn apply(&mut self, update: impl FnOnce(&mut E220Registers)) -> Result<(), HalError> {
        self.ensure_initialized()?;

        let mut next = self.registers;
        update(&mut next);
        self.write_registers(&next)?;
        self.registers = next;
        Ok(())
    }
}

impl<L: SerialLink> RadioAdapter for E220Adapter<L> {
    fn module_type(&self) -> ModuleType {
        self.module
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn init(&mut self) -> Result<(), HalError> {
        if self.initialized {
            return Ok(());
        }

        tracing::info!("Initializing {}", self.name);
        self.link.open()?;

        let registers = E220Registers::default();
        self.write_registers(&registers)?;
        self.registers = registers;
        self.initialized = true;

        tracing::info!("{} initialized", self.name);
        Ok(())
    }

    fn set_frequency(&mut self, hz: u32) -> Result<(), HalError> {
        let channel = self.channel_for(hz)?;
        tracing::debug!("{}: {} Hz -> channel {}", self.name, hz, channel);
        self.apply(|regs| regs.channel = channel)
    }

    fn set_bandwidth(&mut self, khz: u16) -> Result<(), HalError> {
        let rate = match khz {
            125 => 0b010, // 2.4 kbps
            250 => 0b100, // 9.6 kbps
            500 => 0b101, // 19.2 kbps
            other => {
                return Err(HalError::InvalidConfig(format!("Unsupported bandwidth {} kHz", other)));
            }
        };
        self.apply(|regs| regs.air_data_rate = rate)
    }

    fn set_spreading_factor(&mut self, sf: u8) -> Result<(), HalError> {
        if !(7..=12).contains(&sf) {
            return Err(HalError::InvalidConfig(format!("Spreading factor {} out of range 7-12", sf)));
        }
        self.apply(|regs| regs.air_data_rate = sf - 7)
    }

    fn set_coding_rate(&mut self, cr: u8) -> Result<(), HalError> {
        if !(5..=8).contains(&cr) {
            return Err(HalError::InvalidConfig(format!("Coding rate 4/{} out of range", cr)));
        }
        // No coding rate register; 4/5 keeps the ambient noise register on
        self.apply(|regs| regs.ambient_noise = cr == 5)
    }

    fn get_rssi(&mut self) -> i16 {
        if !self.initialized || !self.registers.ambient_noise {
            return RSSI_UNKNOWN_DBM;
        }

        let result = self.link.write_all(&AMBIENT_RSSI_READ).and_then(|_| {
            let mut reply = [0u8; 4];
            self.read_reply(&mut reply)?;
            if reply[0] != CMD_REPLY {
                return Err(HalError::CommunicationError("Bad RSSI reply".to_string()));
            }
            Ok(reply[3])
        });

        match result {
            Ok(raw) => rssi_from_byte(raw),
            Err(e) => {
                tracing::debug!("{}: ambient RSSI read failed: {}", self.name, e);
                RSSI_UNKNOWN_DBM
            }
        }
    }

    // The module never reports SNR, so the placeholder holds even with a frame pending
    fn get_snr(&mut self) -> i16 {
        SNR_UNKNOWN_DB
    }

    fn receive_frame(&mut self) -> Result<RecvFrame, HalError> {
        self.ensure_initialized()?;

        let mut available = self.link.bytes_available()?;
        if available == 0 {
            return Ok(RecvFrame::empty());
        }

        // Drain the UART until it goes quiet
        let mut data = Vec::with_capacity(available.min(MAX_FRAME));
        while available > 0 && data.len() < MAX_FRAME {
            let mut chunk = [0u8; MAX_FRAME];
            let want = available.min(MAX_FRAME - data.len());
            let n = self.link.read(&mut chunk[..want])?;
            if n == 0 {
                break;
            }
            data.extend_from_slice(&chunk[..n]);
            available = self.link.bytes_available()?;
        }

        if data.is_empty() {
            return Ok(RecvFrame::empty());
        }

        if !self.registers.rssi_byte {
            return Ok(RecvFrame {
                status: FrameStatus::Done,
                rssi: RSSI_UNKNOWN_DBM,
                payload: data,
            });
        }

        let raw_rssi = data.pop().unwrap_or(0);
        let status = if data.is_empty() {
            // RSSI trailer without a payload: the body was lost
            FrameStatus::CrcError
        } else {
            FrameStatus::Done
        };

        tracing::trace!("{}: frame {:?}, {} bytes", self.name, status, data.len());

        Ok(RecvFrame {
            status,
            rssi: rssi_from_byte(raw_rssi),
            payload: data,
        })
    }

    fn standby(&mut self) -> bool {
        if !self.initialized {
            return false;
        }
        let registers = self.registers;
        self.write_registers(&registers).is_ok()
    }

    fn sleep(&mut self) -> bool {
        // Sleep is strapped through M0/M1; the register block is left intact
        self.initialized
    }
}

/// Convert the module's RSSI byte to dBm
pub fn rssi_from_byte(raw: u8) -> i16 {
    -(256 - raw as i16)
}
