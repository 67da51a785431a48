//! Centralized error types for Locus.
//!
//! Collaborator errors (position source, transport) are defined here so
//! every crate can surface them through [`AppError`]. Use `user_message()`
//! for text suitable for an end user.

use locus_geo::FenceError;
use locus_weather::WeatherError;
use thiserror::Error;

/// Top-level application error type.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Geo-fence error: {0}")]
    Fence(#[from] FenceError),

    #[error("Weather service error: {0}")]
    Weather(#[from] WeatherError),

    #[error("Position error: {0}")]
    Position(#[from] PositionError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0:#}")]
    Other(anyhow::Error),
}

impl From<anyhow::Error> for AppError {
    /// Recover the typed error behind an `anyhow` chain, context included.
    fn from(err: anyhow::Error) -> Self {
        let err = match err.downcast::<ConfigError>() {
            Ok(e) => return AppError::Config(e),
            Err(err) => err,
        };
        let err = match err.downcast::<FenceError>() {
            Ok(e) => return AppError::Fence(e),
            Err(err) => err,
        };
        let err = match err.downcast::<WeatherError>() {
            Ok(e) => return AppError::Weather(e),
            Err(err) => err,
        };
        let err = match err.downcast::<std::io::Error>() {
            Ok(e) => return AppError::Io(e),
            Err(err) => err,
        };
        AppError::Other(err)
    }
}

impl AppError {
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::Config(e) => e.user_message(),
            AppError::Fence(_) => "The geo-fence settings are invalid. Check your settings.",
            AppError::Weather(e) => weather_user_message(e),
            AppError::Position(e) => e.user_message(),
            AppError::Transport(e) => e.user_message(),
            AppError::Io(_) => "A file operation failed. Please try again.",
            AppError::Other(_) => "An unexpected error occurred. Please try again.",
        }
    }
}

fn weather_user_message(e: &WeatherError) -> &'static str {
    match e {
        WeatherError::InvalidApiKey => {
            "Error fetching weather data. Please check the API key or network."
        }
        WeatherError::Network(_) => "Unable to reach the weather service. Check your connection.",
        WeatherError::Api { status, .. } if *status >= 500 => {
            "Weather service unavailable. Please try again later."
        }
        WeatherError::Api { .. } | WeatherError::Parse(_) => {
            "Weather service error. Please try again."
        }
        WeatherError::InvalidUrl(_) => "Weather service URL is invalid. Check settings.",
        WeatherError::Aborted(_) => "Weather data unavailable. Please try again.",
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Configuration parse error: {0}")]
    ParseError(String),
}

impl ConfigError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ConfigError::Invalid(_) => "Invalid configuration. Check your settings.",
            ConfigError::ParseError(_) => "Configuration file is malformed. Check your settings.",
        }
    }
}

/// Failures reported by a position source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PositionError {
    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Location service unavailable")]
    Unavailable,

    #[error("Location request timed out")]
    Timeout,

    #[error("Location error: {0}")]
    Other(String),
}

impl PositionError {
    pub fn user_message(&self) -> &'static str {
        match self {
            PositionError::PermissionDenied => "Location access was denied.",
            PositionError::Unavailable => "Geolocation is not available on this device.",
            PositionError::Timeout => "Getting your location took too long. Retrying.",
            PositionError::Other(_) => "Your location could not be determined.",
        }
    }
}

/// Failures reported by the real-time transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Transport is closed")]
    Closed,

    #[error("Failed to encode message: {0}")]
    Encode(String),

    #[error("Failed to decode message: {0}")]
    Decode(String),
}

impl TransportError {
    pub fn user_message(&self) -> &'static str {
        match self {
            TransportError::Closed => "Disconnected from the tracking server.",
            TransportError::Encode(_) | TransportError::Decode(_) => {
                "A location update could not be delivered."
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_conversion() {
        let app_err: AppError = PositionError::Timeout.into();
        assert!(matches!(app_err, AppError::Position(PositionError::Timeout)));

        let app_err: AppError = FenceError::InvalidRadius(-1.0).into();
        assert!(matches!(app_err, AppError::Fence(_)));
    }

    #[test]
    fn test_user_message_propagation() {
        let app_err = AppError::Transport(TransportError::Closed);
        assert_eq!(app_err.user_message(), "Disconnected from the tracking server.");

        let app_err = AppError::Weather(WeatherError::InvalidApiKey);
        assert!(app_err.user_message().contains("API key"));
    }

    #[test]
    fn test_anyhow_chain_recovers_typed_error() {
        let err = anyhow::Error::new(ConfigError::ParseError("bad toml".into()))
            .context("Failed to load configuration");
        let app_err = AppError::from(err);
        assert!(matches!(app_err, AppError::Config(ConfigError::ParseError(_))));
        assert_eq!(
            app_err.user_message(),
            "Configuration file is malformed. Check your settings."
        );

        let io = anyhow::Error::new(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"))
            .context("Failed to read track");
        assert!(matches!(AppError::from(io), AppError::Io(_)));

        let other = AppError::from(anyhow::anyhow!("something odd"));
        assert!(matches!(other, AppError::Other(_)));
    }

    #[test]
    fn test_weather_server_error_message() {
        let app_err = AppError::Weather(WeatherError::Api {
            status: 502,
            message: "bad gateway".into(),
        });
        assert_eq!(
            app_err.user_message(),
            "Weather service unavailable. Please try again later."
        );
    }
}
