//! SGP30 gas sensor driver.
//!
//! Works on top of any blocking [`embedded_hal::i2c::I2c`] bus. Every 16-bit
//! word that crosses the bus, in either direction, is followed by a CRC-8.

use std::fmt::{self, Debug, Formatter};

use crc_all::Crc;
use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

/// I2C address of the SGP30.
pub const ADDRESS: u8 = 0x58;

/// Feature set versions reported by SGP30 parts this driver supports.
const FEATURE_SETS: [u16; 2] = [0x0020, 0x0022];

/// CRC-8 parameters of the SGP30 word checksum.
const CHECKSUM_POLYNOMIAL: u8 = 0x31;
const CHECKSUM_INIT: u8 = 0xff;

const MAX_ARGUMENT_WORDS: usize = 2;
const MAX_REPLY_WORDS: usize = 3;

#[repr(u16)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Command {
    IaqInit = 0x2003,
    MeasureIaq = 0x2008,
    GetIaqBaseline = 0x2015,
    SetIaqBaseline = 0x201e,
    SetAbsoluteHumidity = 0x2061,
    GetFeatureSet = 0x202f,
    GetSerialId = 0x3682,
}

impl Command {
    fn raw(self) -> u16 {
        self as u16
    }

    /// Time the sensor needs after the command before it can be read back.
    fn delay_ms(self) -> u32 {
        match self {
            Command::MeasureIaq => 50,
            _ => 10,
        }
    }
}

/// One air quality measurement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Measurement {
    /// Equivalent CO2, in ppm.
    pub eco2: u16,
    /// Total volatile organic compounds, in ppb.
    pub tvoc: u16,
}

/// IAQ algorithm baseline values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Baseline {
    pub eco2: u16,
    pub tvoc: u16,
}

/// Ambient conditions used for humidity compensation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HumidityCompensation {
    pub celsius: f32,
    pub relative_humidity: f32,
}

impl HumidityCompensation {
    /// Absolute humidity in g/m³.
    pub fn absolute_humidity(&self) -> f32 {
        absolute_humidity(self.celsius, self.relative_humidity)
    }
}

/// Convert temperature and relative humidity into absolute humidity (g/m³)
/// with the Magnus formula.
pub fn absolute_humidity(celsius: f32, relative_humidity: f32) -> f32 {
    let saturation = 6.112 * ((17.62 * celsius) / (243.12 + celsius)).exp();
    let vapour_pressure = (relative_humidity / 100.0) * saturation;
    216.7 * (vapour_pressure / (273.15 + celsius))
}

/// Encode absolute humidity as the 8.8 fixed-point word the sensor expects.
///
/// Out of range values saturate; zero turns compensation off on the sensor.
pub fn encode_absolute_humidity(grams_per_m3: f32) -> u16 {
    (grams_per_m3 * 256.0) as u16
}

pub struct Sgp30<I2C, D> {
    i2c: I2C,
    delay: D,
    serial: [u16; 3],
}

impl<I2C, D> Sgp30<I2C, D>
where
    I2C: I2c,
    D: DelayNs,
{
    /// Bring the sensor up on the given bus.
    ///
    /// Reads the serial id, checks the feature set and starts the IAQ
    /// algorithm. Any bus or protocol failure is returned as is.
    #[tracing::instrument(skip_all, err)]
    pub fn connect(i2c: I2C, delay: D) -> Result<Self, Error<I2C::Error>> {
        let mut sensor = Sgp30 {
            i2c,
            delay,
            serial: [0; 3],
        };

        let mut serial = [0u16; 3];
        sensor.execute(Command::GetSerialId, &[], &mut serial)?;
        sensor.serial = serial;

        let mut feature_set = [0u16; 1];
        sensor.execute(Command::GetFeatureSet, &[], &mut feature_set)?;
        if !FEATURE_SETS.contains(&feature_set[0]) {
            tracing::error!(feature_set = feature_set[0], "not an SGP30");
            return Err(Error::UnsupportedFeatureSet(feature_set[0]));
        }

        sensor.execute(Command::IaqInit, &[], &mut [])?;
        tracing::debug!(?serial, feature_set = feature_set[0], "IAQ algorithm started");

        Ok(sensor)
    }

    /// Serial id read while connecting.
    pub fn serial(&self) -> [u16; 3] {
        self.serial
    }

    /// Run one IAQ measurement.
    pub fn measure_iaq(&mut self) -> Result<Measurement, Error<I2C::Error>> {
        let mut reply = [0u16; 2];
        self.execute(Command::MeasureIaq, &[], &mut reply)?;
        Ok(Measurement {
            eco2: reply[0],
            tvoc: reply[1],
        })
    }

    pub fn iaq_baseline(&mut self) -> Result<Baseline, Error<I2C::Error>> {
        let mut reply = [0u16; 2];
        self.execute(Command::GetIaqBaseline, &[], &mut reply)?;
        Ok(Baseline {
            eco2: reply[0],
            tvoc: reply[1],
        })
    }

    /// Restore a previously saved baseline.
    ///
    /// The sensor takes the TVOC word first.
    pub fn set_iaq_baseline(&mut self, baseline: Baseline) -> Result<(), Error<I2C::Error>> {
        self.execute(
            Command::SetIaqBaseline,
            &[baseline.tvoc, baseline.eco2],
            &mut [],
        )
    }

    pub fn set_absolute_humidity(&mut self, grams_per_m3: f32) -> Result<(), Error<I2C::Error>> {
        let word = encode_absolute_humidity(grams_per_m3);
        self.execute(Command::SetAbsoluteHumidity, &[word], &mut [])
    }

    pub fn set_humidity_compensation(
        &mut self,
        compensation: HumidityCompensation,
    ) -> Result<(), Error<I2C::Error>> {
        self.set_absolute_humidity(compensation.absolute_humidity())
    }

    fn execute(
        &mut self,
        command: Command,
        arguments: &[u16],
        reply: &mut [u16],
    ) -> Result<(), Error<I2C::Error>> {
        debug_assert!(arguments.len() <= MAX_ARGUMENT_WORDS);
        debug_assert!(reply.len() <= MAX_REPLY_WORDS);

        let mut request = [0u8; 2 + 3 * MAX_ARGUMENT_WORDS];
        request[..2].copy_from_slice(&command.raw().to_be_bytes());
        let mut len = 2;
        for word in arguments {
            let bytes = word.to_be_bytes();
            request[len..len + 2].copy_from_slice(&bytes);
            request[len + 2] = word_checksum(bytes);
            len += 3;
        }

        self.i2c
            .write(ADDRESS, &request[..len])
            .map_err(Error::Bus)?;
        self.delay.delay_ms(command.delay_ms());

        if reply.is_empty() {
            return Ok(());
        }

        let mut buffer = [0u8; 3 * MAX_REPLY_WORDS];
        let buffer = &mut buffer[..3 * reply.len()];
        self.i2c.read(ADDRESS, buffer).map_err(Error::Bus)?;

        for (word, chunk) in reply.iter_mut().zip(buffer.chunks_exact(3)) {
            let bytes = [chunk[0], chunk[1]];
            if word_checksum(bytes) != chunk[2] {
                return Err(Error::Crc);
            }
            *word = u16::from_be_bytes(bytes);
        }

        Ok(())
    }
}

impl<I2C, D> Debug for Sgp30<I2C, D> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sgp30")
            .field("address", &ADDRESS)
            .field("serial", &self.serial)
            .finish()
    }
}

/// Checksum the sensor attaches to every data word.
fn word_checksum(word: [u8; 2]) -> u8 {
    let mut crc = Crc::<u8>::new(CHECKSUM_POLYNOMIAL, 8, CHECKSUM_INIT, 0x00, false);
    crc.init();
    crc.update(&word);
    crc.finish()
}

#[derive(thiserror::Error, Debug)]
pub enum Error<E> {
    #[error("i2c bus: {0:?}")]
    Bus(E),

    #[error("crc mismatch in sensor reply")]
    Crc,

    #[error("unsupported feature set {0:#06x}")]
    UnsupportedFeatureSet(u16),
}
