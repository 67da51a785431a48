use chrono::{DateTime, Utc};
use locus_geo::Coordinate;
use serde::{Deserialize, Serialize};

/// Base URL for condition icons; the icon code and `.png` are appended.
pub const ICON_BASE_URL: &str = "https://openweathermap.org/img/wn";

/// Temperature unit preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
    Kelvin,
}

impl TemperatureUnit {
    /// Value of the `units` query parameter understood by the API
    pub fn api_units(&self) -> &'static str {
        match self {
            Self::Celsius => "metric",
            Self::Fahrenheit => "imperial",
            Self::Kelvin => "standard",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Celsius => "°C",
            Self::Fahrenheit => "°F",
            Self::Kelvin => "K",
        }
    }
}

/// Build the icon URL for an API icon code such as `"01d"`.
pub fn icon_url(code: &str) -> String {
    format!("{}/{}.png", ICON_BASE_URL, code)
}

/// Current conditions at a coordinate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    pub location: Coordinate,
    pub temperature: f64,
    pub unit: TemperatureUnit,
    /// Free-text description, e.g. "scattered clouds"
    pub condition: String,
    pub icon_url: String,
    /// Place name reported by the API, if any
    pub place: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

/// Weather provider errors
#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Invalid API key")]
    InvalidApiKey,
    #[error("Weather API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    /// The lookup task ended without producing a result.
    #[error("Lookup aborted: {0}")]
    Aborted(String),
}
