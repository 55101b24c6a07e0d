//! AS5600 magnetic rotary encoder (I2C)
//!
//! 12-bit contactless angle sensor. The driver reads the raw angle and the
//! field magnitude and packages them as an [`EncoderSample`]; deciding
//! whether the sample is plausible is left to the safety core.

use embedded_hal::i2c::{Error as _, ErrorKind};
use twinstep_core::safety::EncoderSample;

/// Fixed I2C address
pub const DEFAULT_ADDRESS: u8 = 0x36;

/// Counts per revolution
pub const COUNTS_PER_TURN: u16 = 4096;

/// AS5600 register addresses
pub mod reg {
    /// Magnet status (MD, ML, MH)
    pub const STATUS: u8 = 0x0B;
    /// Unscaled angle, 12 bits across two bytes
    pub const RAW_ANGLE: u8 = 0x0C;
    /// Scaled angle, 12 bits across two bytes
    pub const ANGLE: u8 = 0x0E;
    /// Automatic gain control
    pub const AGC: u8 = 0x1A;
    /// CORDIC magnitude, 12 bits across two bytes
    pub const MAGNITUDE: u8 = 0x1B;
}

const STATUS_MH: u8 = 1 << 3;
const STATUS_ML: u8 = 1 << 4;
const STATUS_MD: u8 = 1 << 5;

/// Convert a 12-bit angle reading to degrees in `[0, 360)`
pub fn raw_to_degrees(raw: u16) -> f32 {
    (raw & 0x0FFF) as f32 * 360.0 / COUNTS_PER_TURN as f32
}

/// Decoded STATUS register
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MagnetStatus {
    /// A magnet was detected
    pub detected: bool,
    /// Field too weak (AGC at maximum)
    pub too_weak: bool,
    /// Field too strong (AGC at minimum)
    pub too_strong: bool,
}

impl MagnetStatus {
    /// Parse from raw STATUS register value
    pub fn from_register(value: u8) -> Self {
        Self {
            detected: value & STATUS_MD != 0,
            too_weak: value & STATUS_ML != 0,
            too_strong: value & STATUS_MH != 0,
        }
    }

    /// Magnet present with field strength in the recommended range
    pub fn is_ok(&self) -> bool {
        self.detected && !self.too_weak && !self.too_strong
    }
}

/// AS5600 communication errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum As5600Error<E> {
    /// The I2C transfer failed
    Bus(E),
}

impl<E: embedded_hal::i2c::Error> As5600Error<E> {
    /// Generic kind of the underlying bus error
    pub fn kind(&self) -> ErrorKind {
        match self {
            As5600Error::Bus(e) => e.kind(),
        }
    }
}

/// AS5600 driver
pub struct As5600<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C> As5600<I2C>
where
    I2C: embedded_hal_async::i2c::I2c,
{
    /// Create a driver at the default address
    pub fn new(i2c: I2C) -> Self {
        Self::with_address(i2c, DEFAULT_ADDRESS)
    }

    /// Create a driver behind an address translator
    pub fn with_address(i2c: I2C, address: u8) -> Self {
        Self { i2c, address }
    }

    /// Give the bus back
    pub fn release(self) -> I2C {
        self.i2c
    }

    async fn read_u8(&mut self, register: u8) -> Result<u8, As5600Error<I2C::Error>> {
        let mut buf = [0u8; 1];
        self.i2c
            .write_read(self.address, &[register], &mut buf)
            .await
            .map_err(As5600Error::Bus)?;
        Ok(buf[0])
    }

    async fn read_u12(&mut self, register: u8) -> Result<u16, As5600Error<I2C::Error>> {
        let mut buf = [0u8; 2];
        self.i2c
            .write_read(self.address, &[register], &mut buf)
            .await
            .map_err(As5600Error::Bus)?;
        Ok(u16::from_be_bytes(buf) & 0x0FFF)
    }

    /// Read the magnet status
    pub async fn read_status(&mut self) -> Result<MagnetStatus, As5600Error<I2C::Error>> {
        Ok(MagnetStatus::from_register(self.read_u8(reg::STATUS).await?))
    }

    /// Read the unscaled 12-bit angle
    pub async fn read_raw_angle(&mut self) -> Result<u16, As5600Error<I2C::Error>> {
        self.read_u12(reg::RAW_ANGLE).await
    }

    /// Read the 12-bit field magnitude
    pub async fn read_magnitude(&mut self) -> Result<u16, As5600Error<I2C::Error>> {
        self.read_u12(reg::MAGNITUDE).await
    }

    /// Read the automatic gain control value
    pub async fn read_agc(&mut self) -> Result<u8, As5600Error<I2C::Error>> {
        self.read_u8(reg::AGC).await
    }

    /// Read one position sample
    ///
    /// Without a magnet the magnitude is reported as zero, whatever the
    /// CORDIC register holds, so the sample fails the field check.
    pub async fn read_sample(
        &mut self,
        timestamp_ms: u32,
    ) -> Result<EncoderSample, As5600Error<I2C::Error>> {
        let status = self.read_status().await?;
        let raw = self.read_raw_angle().await?;
        let magnitude = if status.detected {
            self.read_magnitude().await?
        } else {
            0
        };

        Ok(EncoderSample {
            position_deg: raw_to_degrees(raw),
            magnitude,
            timestamp_ms,
        })
    }
}
