//! I2C bus access.

use std::path::{Path, PathBuf};

use linux_embedded_hal::i2cdev::linux::LinuxI2CError;
use linux_embedded_hal::I2cdev;

/// Clock the sensor bus is expected to run at.
pub const CLOCK_FREQUENCY_HZ: u32 = 100_000;

/// Open the i2c-dev node at `path`.
///
/// The bus clock is fixed by the device tree on Linux, so it is only checked
/// against [`CLOCK_FREQUENCY_HZ`] here, not set.
#[tracing::instrument(err)]
pub fn open(path: &Path) -> Result<I2cdev, Error> {
    let bus = I2cdev::new(path).map_err(|source| Error::Open {
        path: path.to_path_buf(),
        source,
    })?;

    match clock_frequency(path) {
        Some(hz) if hz == CLOCK_FREQUENCY_HZ => tracing::info!(hz, "i2c bus opened"),
        Some(hz) => tracing::warn!(
            hz,
            expected = CLOCK_FREQUENCY_HZ,
            "i2c bus runs at an unexpected clock frequency"
        ),
        None => tracing::debug!("i2c bus clock frequency unknown"),
    }

    Ok(bus)
}

/// Bus clock as advertised by the adapter's device tree node.
pub fn clock_frequency(path: &Path) -> Option<u32> {
    let adapter = path.file_name()?;
    let node = Path::new("/sys/class/i2c-adapter")
        .join(adapter)
        .join("of_node/clock-frequency");

    let raw = std::fs::read(node).ok()?;
    parse_clock_frequency(&raw)
}

/// Device tree cells are big-endian `u32`s.
fn parse_clock_frequency(raw: &[u8]) -> Option<u32> {
    let cell: [u8; 4] = raw.get(..4)?.try_into().ok()?;
    Some(u32::from_be_bytes(cell))
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("open i2c bus {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: LinuxI2CError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_device_tree_cell() {
        assert_eq!(parse_clock_frequency(&[0x00, 0x01, 0x86, 0xa0]), Some(100_000));
        assert_eq!(parse_clock_frequency(&[0x00, 0x06, 0x1a, 0x80]), Some(400_000));
    }

    #[test]
    fn parse_short_cell() {
        assert_eq!(parse_clock_frequency(&[0x00, 0x01]), None);
        assert_eq!(parse_clock_frequency(&[]), None);
    }

    #[test]
    fn missing_adapter_has_no_clock() {
        assert_eq!(clock_frequency(Path::new("/dev/i2c-does-not-exist")), None);
        assert_eq!(clock_frequency(Path::new("/")), None);
    }

    #[test]
    fn open_missing_bus_fails() {
        let result = open(Path::new("/dev/i2c-does-not-exist"));
        assert!(matches!(result, Err(Error::Open { .. })));
    }
}
