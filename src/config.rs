//! Deployment settings taken from the process environment.

use std::env::VarError;
use std::path::PathBuf;

pub const SERVER_URI_VAR: &str = "IOT_ECO2_MQTT_SERVER_URI";
pub const I2C_BUS_VAR: &str = "IOT_ECO2_I2C_BUS";

const DEFAULT_SERVER_URI: &str = "tcp://localhost:1883";
const DEFAULT_I2C_BUS: &str = "/dev/i2c-1";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// MQTT broker to publish to.
    pub server_uri: String,
    /// i2c-dev node the sensor hangs off.
    pub i2c_bus: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server_uri: DEFAULT_SERVER_URI.to_string(),
            i2c_bus: PathBuf::from(DEFAULT_I2C_BUS),
        }
    }
}

impl Config {
    /// Create the configuration from the environment variables, falling back
    /// to the defaults for unset ones.
    pub fn from_env() -> Result<Config, Error> {
        Config::from_lookup(|name| std::env::var(name))
    }

    fn from_lookup<F>(lookup: F) -> Result<Config, Error>
    where
        F: Fn(&'static str) -> Result<String, VarError>,
    {
        let mut config = Config::default();

        if let Some(server_uri) = read(&lookup, SERVER_URI_VAR)? {
            config.server_uri = server_uri;
        }
        if let Some(i2c_bus) = read(&lookup, I2C_BUS_VAR)? {
            config.i2c_bus = PathBuf::from(i2c_bus);
        }

        Ok(config)
    }
}

fn read<F>(lookup: &F, name: &'static str) -> Result<Option<String>, Error>
where
    F: Fn(&'static str) -> Result<String, VarError>,
{
    match lookup(name) {
        Ok(value) if value.trim().is_empty() => Err(Error::Empty(name)),
        Ok(value) => Ok(Some(value)),
        Err(VarError::NotPresent) => Ok(None),
        Err(source) => Err(Error::Var { name, source }),
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{0} is set but empty")]
    Empty(&'static str),

    #[error("read {name}: {source}")]
    Var {
        name: &'static str,
        #[source]
        source: VarError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;

    #[test]
    fn defaults_when_unset() {
        let config = Config::from_lookup(|_| Err(VarError::NotPresent)).unwrap();

        assert_eq!(config, Config::default());
        assert_eq!(config.server_uri, "tcp://localhost:1883");
        assert_eq!(config.i2c_bus, PathBuf::from("/dev/i2c-1"));
    }

    #[test]
    fn overrides_from_environment() {
        let config = Config::from_lookup(|name| match name {
            SERVER_URI_VAR => Ok("tcp://broker.local:1883".to_string()),
            I2C_BUS_VAR => Ok("/dev/i2c-3".to_string()),
            _ => Err(VarError::NotPresent),
        })
        .unwrap();

        assert_eq!(config.server_uri, "tcp://broker.local:1883");
        assert_eq!(config.i2c_bus, PathBuf::from("/dev/i2c-3"));
    }

    #[test]
    fn empty_value_is_rejected() {
        let result = Config::from_lookup(|name| match name {
            SERVER_URI_VAR => Ok("  ".to_string()),
            _ => Err(VarError::NotPresent),
        });

        assert!(matches!(result, Err(Error::Empty(SERVER_URI_VAR))));
    }

    #[test]
    fn non_unicode_value_is_rejected() {
        let result = Config::from_lookup(|name| match name {
            I2C_BUS_VAR => Err(VarError::NotUnicode(OsString::from("bus"))),
            _ => Err(VarError::NotPresent),
        });

        assert!(matches!(result, Err(Error::Var { name: I2C_BUS_VAR, .. })));
    }
}
