//! TMC2209 stepper driver (UART mode)
//!
//! Register codec for the TMC2209. The chip is configured and polled over a
//! single-wire UART; this module only builds and parses datagrams; the
//! firmware owns the serial port.
//!
//! # UART Protocol
//!
//! 115200 baud, 8N1:
//! - Sync byte: 0x05
//! - Node address: 0-3 (set by MS1/MS2 pins), 0xFF in replies
//! - Register address, bit 7 set for writes
//! - Data (4 bytes, big-endian)
//! - CRC8
//!
//! # Safety mapping
//!
//! `DRV_STATUS` and `GSTAT` are folded into a [`MotorStatus`] snapshot for the
//! supervisor. Fail-safe actions map onto register writes: high impedance
//! turns the chopper off (`TOFF = 0`), hold drops both currents to the safe
//! hold level. A stop zeroes `VACTUAL`, halting the internal pulse generator
//! while the coils stay energized and hold position.

use twinstep_core::safety::{FailSafeAction, MotorStatus};

/// TMC2209 register addresses
pub mod reg {
    /// General configuration
    pub const GCONF: u8 = 0x00;
    /// Global status flags (write 1 to clear)
    pub const GSTAT: u8 = 0x01;
    /// Interface transmission counter
    pub const IFCNT: u8 = 0x02;
    /// Hold/run current settings
    pub const IHOLD_IRUN: u8 = 0x10;
    /// Power down delay
    pub const TPOWERDOWN: u8 = 0x11;
    /// Internal pulse generator velocity (0 = motion from STEP input only)
    pub const VACTUAL: u8 = 0x22;
    /// Chopper configuration
    pub const CHOPCONF: u8 = 0x6C;
    /// Driver status
    pub const DRV_STATUS: u8 = 0x6F;
    /// StealthChop PWM configuration
    pub const PWMCONF: u8 = 0x70;
}

/// UART sync byte
const SYNC_BYTE: u8 = 0x05;

/// Address the chip uses in its replies
const REPLY_ADDRESS: u8 = 0xFF;

/// Hold current delay written with every IHOLD_IRUN update
const IHOLDDELAY: u32 = 6;

/// Off time used while the chopper is enabled
const TOFF_ENABLED: u32 = 5;

/// TMC2209 driver configuration
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Tmc2209Config {
    /// UART address (0-3, set by MS1/MS2 pins)
    pub uart_address: u8,
    /// Run current in mA
    pub run_current_ma: u16,
    /// Hold current in mA
    pub hold_current_ma: u16,
    /// Current used for the fail-safe hold, in mA
    pub safe_hold_current_ma: u16,
    /// Run current while thermally derated, percent of `run_current_ma`
    pub derate_percent: u8,
    /// Enable StealthChop mode
    pub stealthchop: bool,
    /// Microstepping (1, 2, 4, ... 256)
    pub microsteps: u16,
}

impl Default for Tmc2209Config {
    fn default() -> Self {
        Self {
            uart_address: 0,
            run_current_ma: 800,
            hold_current_ma: 400,
            safe_hold_current_ma: 200,
            derate_percent: 60,
            stealthchop: true,
            microsteps: 16,
        }
    }
}

impl Tmc2209Config {
    /// Convert microsteps to MRES register value
    pub fn mres(&self) -> u8 {
        match self.microsteps {
            256 => 0,
            128 => 1,
            64 => 2,
            32 => 3,
            16 => 4,
            8 => 5,
            4 => 6,
            2 => 7,
            1 => 8,
            _ => 4,
        }
    }

    /// Convert current in mA to an IRUN/IHOLD scale value (0-31)
    ///
    /// Assumes Rsense = 0.11 ohm and the internal 0.325 V reference, which
    /// gives CS = I_rms * 15.34 - 1.
    pub fn current_to_cs(current_ma: u16) -> u8 {
        let cs = ((current_ma as u32) * 1534 / 100_000).saturating_sub(1);
        cs.min(31) as u8
    }

    /// Run current while derated
    pub fn derated_run_current_ma(&self) -> u16 {
        let percent = self.derate_percent.min(100) as u32;
        ((self.run_current_ma as u32) * percent / 100) as u16
    }
}

/// CRC8 over a datagram, as specified in the TMC2209 datasheet
///
/// Polynomial x^8 + x^2 + x + 1, data bits fed least significant first.
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc = 0u8;
    for &byte in data {
        let mut current = byte;
        for _ in 0..8 {
            if ((crc >> 7) ^ (current & 0x01)) != 0 {
                crc = (crc << 1) ^ 0x07;
            } else {
                crc <<= 1;
            }
            current >>= 1;
        }
    }
    crc
}

/// Build a write datagram
pub fn build_write_datagram(addr: u8, reg: u8, data: u32) -> [u8; 8] {
    let mut datagram = [0u8; 8];
    datagram[0] = SYNC_BYTE;
    datagram[1] = addr;
    datagram[2] = reg | 0x80;
    datagram[3..7].copy_from_slice(&data.to_be_bytes());
    datagram[7] = crc8(&datagram[..7]);
    datagram
}

/// Build a read request datagram
pub fn build_read_request(addr: u8, reg: u8) -> [u8; 4] {
    let mut datagram = [0u8; 4];
    datagram[0] = SYNC_BYTE;
    datagram[1] = addr;
    datagram[2] = reg & 0x7F;
    datagram[3] = crc8(&datagram[..3]);
    datagram
}

/// Parse a read reply
///
/// The reply is sync, 0xFF, register, 4 data bytes and CRC. `expected_reg`
/// guards against a reply to an earlier request still sitting in the
/// receive buffer.
pub fn parse_read_response(response: &[u8; 8], expected_reg: u8) -> Result<u32, Tmc2209Error> {
    if response[0] != SYNC_BYTE || response[1] != REPLY_ADDRESS {
        return Err(Tmc2209Error::InvalidSync);
    }

    if response[7] != crc8(&response[..7]) {
        return Err(Tmc2209Error::CrcMismatch);
    }

    if response[2] != expected_reg {
        return Err(Tmc2209Error::UnexpectedRegister);
    }

    Ok(u32::from_be_bytes([
        response[3],
        response[4],
        response[5],
        response[6],
    ]))
}

/// TMC2209 communication errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Tmc2209Error {
    /// Missing sync byte or wrong reply address
    InvalidSync,
    /// CRC mismatch
    CrcMismatch,
    /// Reply is for a different register
    UnexpectedRegister,
    /// No reply within the expected time
    Timeout,
    /// The UART transfer itself failed
    Bus,
}

/// Parsed DRV_STATUS register
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DrvStatus {
    /// Motor standstill indicator
    pub standstill: bool,
    /// Overtemperature pre-warning (120°C)
    pub ot_prewarning: bool,
    /// Overtemperature shutdown (150°C)
    pub ot_shutdown: bool,
    /// Short to ground on phase A
    pub s2ga: bool,
    /// Short to ground on phase B
    pub s2gb: bool,
    /// Short to supply on phase A
    pub s2vsa: bool,
    /// Short to supply on phase B
    pub s2vsb: bool,
    /// Open load on phase A
    pub ola: bool,
    /// Open load on phase B
    pub olb: bool,
    /// StealthChop active
    pub stealth: bool,
    /// Current scaling (0-31)
    pub cs_actual: u8,
}

impl DrvStatus {
    /// Parse from raw DRV_STATUS register value
    pub fn from_register(value: u32) -> Self {
        let bit = |n: u32| value & (1 << n) != 0;
        Self {
            standstill: bit(31),
            olb: bit(30),
            ola: bit(29),
            ot_prewarning: bit(26),
            ot_shutdown: bit(25),
            s2ga: bit(24),
            s2gb: bit(23),
            stealth: bit(14),
            s2vsa: bit(12),
            s2vsb: bit(11),
            cs_actual: ((value >> 16) & 0x1F) as u8,
        }
    }

    /// Fold into the board-independent status bits
    pub fn motor_status(&self) -> MotorStatus {
        let mut status = MotorStatus::empty();
        status.set(
            MotorStatus::OVERCURRENT,
            self.s2ga || self.s2gb || self.s2vsa || self.s2vsb,
        );
        status.set(MotorStatus::THERMAL_SHUTDOWN, self.ot_shutdown);
        status.set(MotorStatus::THERMAL_WARNING, self.ot_prewarning);
        status.set(MotorStatus::STEP_LOSS_A, self.ola);
        status.set(MotorStatus::STEP_LOSS_B, self.olb);
        status
    }
}

/// Parsed GSTAT register
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GStat {
    /// The chip has been reset since GSTAT was last cleared
    pub reset: bool,
    /// Driver shut down due to a fault
    pub drv_err: bool,
    /// Charge pump undervoltage
    pub uv_cp: bool,
}

impl GStat {
    /// Parse from raw GSTAT register value
    pub fn from_register(value: u32) -> Self {
        Self {
            reset: value & 0x01 != 0,
            drv_err: value & 0x02 != 0,
            uv_cp: value & 0x04 != 0,
        }
    }

    /// Fold into the board-independent status bits
    pub fn motor_status(&self) -> MotorStatus {
        if self.uv_cp {
            MotorStatus::UNDERVOLTAGE
        } else {
            MotorStatus::empty()
        }
    }
}

/// Combine the two status registers into one snapshot
pub fn combined_status(drv: &DrvStatus, gstat: &GStat) -> MotorStatus {
    drv.motor_status() | gstat.motor_status()
}

/// Datagram builder for one TMC2209
#[derive(Debug, Clone)]
pub struct Tmc2209Driver {
    config: Tmc2209Config,
    derated: bool,
}

impl Tmc2209Driver {
    /// Create a new driver
    pub fn new(config: Tmc2209Config) -> Self {
        Self {
            config,
            derated: false,
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Tmc2209Config {
        &self.config
    }

    /// Check if the run current is currently derated
    pub fn is_derated(&self) -> bool {
        self.derated
    }

    fn write(&self, reg: u8, value: u32) -> [u8; 8] {
        build_write_datagram(self.config.uart_address, reg, value)
    }

    fn gconf(&self) -> u32 {
        let mut gconf = 0u32;
        // en_spreadcycle
        if !self.config.stealthchop {
            gconf |= 1 << 2;
        }
        // pdn_disable, mstep_reg_select, multistep_filt
        gconf |= 1 << 6;
        gconf |= 1 << 7;
        gconf |= 1 << 8;
        gconf
    }

    fn chopconf(&self, toff: u32) -> u32 {
        let mut chopconf = toff & 0x0F;
        // HSTRT = 4, TBL = 2
        chopconf |= 4 << 4;
        chopconf |= 2 << 15;
        chopconf |= (self.config.mres() as u32) << 24;
        // intpol
        chopconf |= 1 << 28;
        chopconf
    }

    fn pwmconf(&self) -> u32 {
        // PWM_OFS 36, PWM_GRAD 14, PWM_FREQ 1, autoscale, autograd, PWM_REG 4, PWM_LIM 12
        36 | (14 << 8) | (1 << 16) | (1 << 18) | (1 << 19) | (4 << 24) | (12 << 28)
    }

    fn ihold_irun(run_ma: u16, hold_ma: u16) -> u32 {
        let ihold = Tmc2209Config::current_to_cs(hold_ma) as u32;
        let irun = Tmc2209Config::current_to_cs(run_ma) as u32;
        (IHOLDDELAY << 16) | ((irun & 0x1F) << 8) | (ihold & 0x1F)
    }

    fn normal_current(&self) -> u32 {
        let run = if self.derated {
            self.config.derated_run_current_ma()
        } else {
            self.config.run_current_ma
        };
        Self::ihold_irun(run, self.config.hold_current_ma)
    }

    /// Register writes for initialization, in order
    pub fn init_datagrams(&self) -> [[u8; 8]; 6] {
        [
            self.write(reg::GSTAT, 0x07),
            self.write(reg::GCONF, self.gconf()),
            self.write(reg::CHOPCONF, self.chopconf(TOFF_ENABLED)),
            self.write(reg::IHOLD_IRUN, self.normal_current()),
            self.write(reg::TPOWERDOWN, 20),
            self.write(reg::PWMCONF, self.pwmconf()),
        ]
    }

    /// Read request for DRV_STATUS
    pub fn read_status_request(&self) -> [u8; 4] {
        build_read_request(self.config.uart_address, reg::DRV_STATUS)
    }

    /// Read request for GSTAT
    pub fn read_gstat_request(&self) -> [u8; 4] {
        build_read_request(self.config.uart_address, reg::GSTAT)
    }

    /// Read request for IFCNT, used to confirm writes arrived
    pub fn read_ifcnt_request(&self) -> [u8; 4] {
        build_read_request(self.config.uart_address, reg::IFCNT)
    }

    /// Clear the latched GSTAT flags
    pub fn clear_gstat_datagram(&self) -> [u8; 8] {
        self.write(reg::GSTAT, 0x07)
    }

    /// Switch the run current between full and derated
    pub fn derate_datagram(&mut self, derate: bool) -> [u8; 8] {
        self.derated = derate;
        self.write(reg::IHOLD_IRUN, self.normal_current())
    }

    /// Register write that puts the driver into the fail-safe state
    pub fn fail_safe_datagram(&self, action: FailSafeAction) -> [u8; 8] {
        match action {
            FailSafeAction::MotorHiZ => self.write(reg::CHOPCONF, self.chopconf(0)),
            FailSafeAction::MotorHold => {
                let safe = self.config.safe_hold_current_ma;
                self.write(reg::IHOLD_IRUN, Self::ihold_irun(safe, safe))
            }
            FailSafeAction::MotorStop | FailSafeAction::SystemReset => self.write(reg::VACTUAL, 0),
        }
    }

    /// Register writes that undo any fail-safe state
    pub fn release_datagrams(&self) -> [[u8; 8]; 2] {
        [
            self.write(reg::CHOPCONF, self.chopconf(TOFF_ENABLED)),
            self.write(reg::IHOLD_IRUN, self.normal_current()),
        ]
    }
}
