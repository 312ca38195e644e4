use iot_eco2_relay_rs::config::Config;
use iot_eco2_relay_rs::relay;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), relay::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    tracing::info!(?config, "starting the eCO2 relay");

    let result = relay::suppress_interrupt(relay::run(&config));
    if let Err(e) = &result {
        tracing::error!(error = %e, "eCO2 relay stopped");
    }
    result
}
