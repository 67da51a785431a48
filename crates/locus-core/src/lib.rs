pub mod config;
pub mod error;

pub use config::{
    Config, FenceConfig, MapConfig, PositionConfig, TransportConfig, ValidationResult,
    WeatherConfig,
};
pub use error::{AppError, ConfigError, PositionError, TransportError};

use anyhow::Result;

/// Initialize logging for the application
pub fn init() -> Result<()> {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();

    if installed.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }

    tracing::info!("Locus core initialized");
    Ok(())
}
