//! Relays eCO2 readings from the gas sensor to the message queue.

use std::num::NonZeroU32;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use linux_embedded_hal::Delay;

use crate::bus;
use crate::config::{self, Config};
use crate::mq::{self, NodeOptions, Publisher, TopicPublisher};
use crate::rate::{Rate, RateLimiter};
use crate::sgp30::{self, Baseline, HumidityCompensation, Measurement, Sgp30};
use crate::shutdown::{Interrupted, ShutdownPredicate, ShutdownSignal};

pub const TOPIC: &str = "chatter";
pub const QUEUE_DEPTH: usize = 10;
pub const NODE_NAME: &str = "talker";
pub const RATE_HZ: NonZeroU32 = match NonZeroU32::new(10) {
    Some(hz) => hz,
    None => panic!("publish rate must not be zero"),
};

pub const IAQ_BASELINE: Baseline = Baseline {
    eco2: 0x8973,
    tvoc: 0x8aae,
};

pub const HUMIDITY_COMPENSATION: HumidityCompensation = HumidityCompensation {
    celsius: 22.1,
    relative_humidity: 44.0,
};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The gas sensor as seen by the relay.
pub trait GasSensor {
    type Error: std::error::Error + Send + Sync + 'static;

    fn serial(&self) -> [u16; 3];

    fn measure(&mut self) -> Result<Measurement, Self::Error>;

    fn set_iaq_baseline(&mut self, baseline: Baseline) -> Result<(), Self::Error>;

    fn iaq_baseline(&mut self) -> Result<Baseline, Self::Error>;

    fn set_humidity_compensation(
        &mut self,
        compensation: HumidityCompensation,
    ) -> Result<(), Self::Error>;
}

impl<I2C, D> GasSensor for Sgp30<I2C, D>
where
    I2C: I2c,
    I2C::Error: Send + Sync + 'static,
    D: DelayNs,
{
    type Error = sgp30::Error<I2C::Error>;

    fn serial(&self) -> [u16; 3] {
        Sgp30::serial(self)
    }

    fn measure(&mut self) -> Result<Measurement, Self::Error> {
        self.measure_iaq()
    }

    fn set_iaq_baseline(&mut self, baseline: Baseline) -> Result<(), Self::Error> {
        Sgp30::set_iaq_baseline(self, baseline)
    }

    fn iaq_baseline(&mut self) -> Result<Baseline, Self::Error> {
        Sgp30::iaq_baseline(self)
    }

    fn set_humidity_compensation(
        &mut self,
        compensation: HumidityCompensation,
    ) -> Result<(), Self::Error> {
        Sgp30::set_humidity_compensation(self, compensation)
    }
}

/// Owns the sensor for the lifetime of the process. Dropping the context
/// releases the sensor and its bus.
#[derive(Debug)]
pub struct Context<S> {
    sensor: S,
}

impl<S: GasSensor> Context<S> {
    /// Report the sensor serial and apply the fixed calibration.
    #[tracing::instrument(skip_all, err)]
    pub fn initialize(mut sensor: S) -> Result<Self, Error> {
        tracing::info!(serial = %format_serial(sensor.serial()), "SGP30 serial #");

        sensor.set_iaq_baseline(IAQ_BASELINE).map_err(sensor_error)?;
        sensor
            .set_humidity_compensation(HUMIDITY_COMPENSATION)
            .map_err(sensor_error)?;

        match sensor.iaq_baseline() {
            Ok(baseline) => tracing::debug!(
                eco2 = %format_args!("{:#x}", baseline.eco2),
                tvoc = %format_args!("{:#x}", baseline.tvoc),
                "baseline values"
            ),
            Err(e) => tracing::warn!(error = %e, "unable to read back the baseline"),
        }

        Ok(Context { sensor })
    }
}

/// Read eCO2 and publish it, once per rate cycle, until shutdown.
///
/// Returns [`Error::Interrupted`] if shutdown arrives while sleeping; every
/// other error is a real fault.
pub fn publish_loop<S, P, R, Q>(
    context: &mut Context<S>,
    publisher: &mut P,
    rate: &mut R,
    shutdown: &Q,
) -> Result<(), Error>
where
    S: GasSensor,
    P: Publisher,
    R: RateLimiter,
    Q: ShutdownPredicate + ?Sized,
{
    while !shutdown.is_shutdown() {
        let measurement = context.sensor.measure().map_err(sensor_error)?;
        tracing::info!(eco2 = measurement.eco2, tvoc = measurement.tvoc, "eCO2 reading");

        publisher
            .publish(&measurement.eco2.to_string())
            .map_err(|e| Error::Publish(Box::new(e)))?;

        rate.sleep()?;
    }

    tracing::info!("shutdown requested, leaving the publish loop");
    Ok(())
}

/// Turn the shutdown interrupt into a clean exit. Anything else is passed
/// through untouched.
pub fn suppress_interrupt(result: Result<(), Error>) -> Result<(), Error> {
    match result {
        Err(Error::Interrupted(_)) => {
            tracing::info!("interrupted, shutting down");
            Ok(())
        }
        other => other,
    }
}

/// Bring up the bus, the sensor and the publisher, then relay until shutdown.
///
/// Signals keep their default action until the publisher is connected, so
/// a stuck bring-up can still be killed with Ctrl-C.
pub fn run(config: &Config) -> Result<(), Error> {
    let bus = bus::open(&config.i2c_bus)?;
    let sensor = Sgp30::connect(bus, Delay).map_err(sensor_error)?;
    let mut context = Context::initialize(sensor)?;

    let node = NodeOptions::new(NODE_NAME, false);
    let mut publisher = TopicPublisher::new(&config.server_uri, TOPIC, QUEUE_DEPTH, &node)?;
    publisher.connect()?;

    let shutdown = ShutdownSignal::new();
    shutdown.install_handler()?;
    let mut rate = loop_rate(shutdown.clone());
    tracing::info!(topic = publisher.topic(), period = ?rate.period(), "publishing eCO2");

    publish_loop(&mut context, &mut publisher, &mut rate, &shutdown)
}

fn loop_rate(shutdown: ShutdownSignal) -> Rate {
    Rate::new(RATE_HZ, shutdown)
}

fn sensor_error<E>(e: E) -> Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    Error::Sensor(Box::new(e))
}

fn format_serial(serial: [u16; 3]) -> String {
    let words: Vec<String> = serial.iter().map(|word| format!("{word:#x}")).collect();
    format!("[{}]", words.join(", "))
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("configuration: {0}")]
    Config(#[from] config::Error),

    #[error("{0}")]
    Bus(#[from] bus::Error),

    #[error("sensor: {0}")]
    Sensor(#[source] BoxError),

    #[error("publish: {0}")]
    Publish(#[source] BoxError),

    #[error("message queue: {0}")]
    MessageQueue(#[from] mq::Error),

    #[error("install signal handler: {0}")]
    SignalHandler(#[from] ctrlc::Error),

    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}
