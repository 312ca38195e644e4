//! # IoT eCO2 Relay
//!
//! IoT eCO2 Relay runs on a Raspberry Pi next to an SGP30 gas sensor. It
//! reads the sensor over I2C and republishes every eCO2 reading on the
//! `chatter` MQTT topic at 10 Hz, until the process is told to stop.
//!
//! The moving parts are small on purpose: [`sgp30`] talks to the sensor,
//! [`mq`] to the broker, and [`relay`] glues the two together.

pub mod bus;
pub mod config;
pub mod mq;
pub mod rate;
pub mod relay;
pub mod sgp30;
pub mod shutdown;
