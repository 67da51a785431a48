use anyhow::{Context, Result};
use locus_geo::{Coordinate, FenceError, GeoFence, MembershipScope};
use locus_weather::TemperatureUnit;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::error::ConfigError;

/// Environment variable consulted when no API key is configured.
pub const WEATHER_API_KEY_ENV: &str = "OPENWEATHER_API_KEY";

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application configuration directory
    pub config_dir: PathBuf,

    /// Geo-fence definition
    #[serde(default)]
    pub fence: FenceConfig,

    /// Weather widget settings
    #[serde(default)]
    pub weather: WeatherConfig,

    /// Map view settings
    #[serde(default)]
    pub map: MapConfig,

    /// Position watch settings
    #[serde(default)]
    pub position: PositionConfig,

    /// Real-time transport settings
    #[serde(default)]
    pub transport: TransportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FenceConfig {
    pub center_latitude: f64,
    pub center_longitude: f64,
    pub radius_meters: f64,
    /// Whether membership is tracked per device or as one shared flag
    #[serde(default)]
    pub scope: MembershipScope,
}

impl Default for FenceConfig {
    fn default() -> Self {
        // New Delhi, 2 km
        Self {
            center_latitude: 28.7041,
            center_longitude: 77.1025,
            radius_meters: 2000.0,
            scope: MembershipScope::PerEntity,
        }
    }
}

impl FenceConfig {
    pub fn center(&self) -> Coordinate {
        Coordinate::new(self.center_latitude, self.center_longitude)
    }

    pub fn to_fence(&self) -> Result<GeoFence, FenceError> {
        GeoFence::new(self.center(), self.radius_meters)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    /// Show the weather widget
    pub enabled: bool,

    /// OpenWeatherMap API key (falls back to `OPENWEATHER_API_KEY`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// API host
    #[serde(default = "default_weather_base_url")]
    pub base_url: String,

    /// Temperature unit preference
    #[serde(default)]
    pub temperature_unit: TemperatureUnit,
}

fn default_weather_base_url() -> String {
    locus_weather::provider::OPENWEATHER_API_URL.to_string()
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            base_url: default_weather_base_url(),
            temperature_unit: TemperatureUnit::Celsius,
        }
    }
}

impl WeatherConfig {
    /// The API key to use: the configured one, else the environment.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty() && !k.starts_with("YOUR_"))
            .or_else(|| {
                std::env::var(WEATHER_API_KEY_ENV)
                    .ok()
                    .filter(|k| !k.trim().is_empty())
            })
    }

    pub fn is_configured(&self) -> bool {
        self.resolved_api_key().is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapConfig {
    /// Zoom level used when the map is first centered on the fence
    pub initial_zoom: u8,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self { initial_zoom: 14 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionConfig {
    pub high_accuracy: bool,
    /// Give up on a single fix after this long
    pub timeout_ms: u64,
    /// Accept cached fixes no older than this (0 = always fresh)
    pub maximum_age_ms: u64,
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout_ms: 5000,
            maximum_age_ms: 0,
        }
    }
}

impl PositionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn maximum_age(&self) -> Duration {
        Duration::from_millis(self.maximum_age_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Buffered messages per subscriber before the slowest one lags
    pub channel_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("locus");

        Self {
            config_dir,
            fence: FenceConfig::default(),
            weather: WeatherConfig::default(),
            map: MapConfig::default(),
            position: PositionConfig::default(),
            transport: TransportConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, creating it if missing
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`, writing defaults there if missing
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            let mut config = Self::default();
            if let Some(parent) = path.parent() {
                config.config_dir = parent.to_path_buf();
            }
            config.save_to(path)?;
            tracing::info!("Wrote default configuration to {}", path.display());
            return Ok(config);
        }

        let contents = std::fs::read_to_string(path).context("Failed to read config file")?;
        let config: Config = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))?;

        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Warnings are logged; errors fail the load.
    pub fn load_validated(path: &Path) -> Result<(Self, ValidationResult)> {
        let config = Self::load_from(path)?;
        let validation = config.validate();

        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()).into());
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        let center = self.fence.center();
        if !center.is_finite() {
            result.add_error("fence.center", "Fence center must be finite numbers");
        } else {
            if !(-90.0..=90.0).contains(&center.latitude) {
                result.add_warning(
                    "fence.center_latitude",
                    "Latitude is outside -90..90; distances will be meaningless",
                );
            }
            if !(-180.0..=180.0).contains(&center.longitude) {
                result.add_warning(
                    "fence.center_longitude",
                    "Longitude is outside -180..180",
                );
            }
        }

        if let Err(e) = self.fence.to_fence() {
            result.add_error("fence.radius_meters", e.to_string());
        } else if self.fence.radius_meters == 0.0 {
            result.add_warning(
                "fence.radius_meters",
                "Zero radius: only the exact center counts as inside",
            );
        }

        if self.weather.enabled {
            self.validate_url(&self.weather.base_url, "weather.base_url", &mut result);
            if !self.weather.is_configured() {
                result.add_warning(
                    "weather.api_key",
                    format!(
                        "No API key configured (set weather.api_key or {}); weather will be unavailable",
                        WEATHER_API_KEY_ENV
                    ),
                );
            }
        }

        if self.map.initial_zoom > 19 {
            result.add_warning("map.initial_zoom", "Zoom levels above 19 are rarely supported");
        }

        if self.position.timeout_ms == 0 {
            result.add_error("position.timeout_ms", "Position timeout must be greater than 0");
        }

        if self.transport.channel_capacity == 0 {
            result.add_error(
                "transport.channel_capacity",
                "Channel capacity must be greater than 0",
            );
        }

        result
    }

    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }
                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Path of the default configuration file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("locus");

        Ok(config_dir.join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_default_config() {
        let config = Config::default();
        let result = config.validate();
        assert!(result.is_valid(), "Default config should be valid: {:?}", result.errors);
    }

    #[test]
    fn test_default_fence_is_delhi() {
        let fence = Config::default().fence.to_fence().unwrap();
        assert_eq!(fence.center(), Coordinate::new(28.7041, 77.1025));
        assert_eq!(fence.radius_meters(), 2000.0);
    }

    #[test]
    fn test_negative_radius_is_error() {
        let mut config = Config::default();
        config.fence.radius_meters = -10.0;
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.field == "fence.radius_meters"));
    }

    #[test]
    fn test_out_of_range_center_is_warning() {
        let mut config = Config::default();
        config.fence.center_latitude = 120.0;
        let result = config.validate();
        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|w| w.field == "fence.center_latitude"));
    }

    #[test]
    fn test_nan_center_is_error() {
        let mut config = Config::default();
        config.fence.center_longitude = f64::NAN;
        assert!(!config.validate().is_valid());
    }

    #[test]
    fn test_invalid_weather_url() {
        let mut config = Config::default();
        config.weather.base_url = "ftp://weather.example".to_string();
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.message.contains("http or https")));
    }

    #[test]
    fn test_disabled_weather_skips_url_check() {
        let mut config = Config::default();
        config.weather.enabled = false;
        config.weather.base_url = "not-a-url".to_string();
        assert!(config.validate().is_valid());
    }

    #[test]
    fn test_configured_api_key_wins() {
        let weather = WeatherConfig {
            api_key: Some("abc123".into()),
            ..WeatherConfig::default()
        };
        assert_eq!(weather.resolved_api_key().as_deref(), Some("abc123"));
    }

    #[test]
    fn test_zero_channel_capacity_is_error() {
        let mut config = Config::default();
        config.transport.channel_capacity = 0;
        let result = config.validate();
        assert!(result.errors.iter().any(|e| e.field == "transport.channel_capacity"));
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locus").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.config_dir, dir.path().join("locus"));
        assert_eq!(config.map.initial_zoom, 14);
    }

    #[test]
    fn test_load_partial_file_uses_section_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
config_dir = "/tmp/locus"

[fence]
center_latitude = 51.5074
center_longitude = -0.1278
radius_meters = 500.0
scope = "shared"
"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.fence.radius_meters, 500.0);
        assert_eq!(config.fence.scope, MembershipScope::Shared);
        assert!(config.weather.enabled);
        assert_eq!(config.transport.channel_capacity, 64);
    }

    #[test]
    fn test_load_validated_rejects_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::default();
        config.fence.radius_meters = -1.0;
        config.save_to(&path).unwrap();

        let err = Config::load_validated(&path).unwrap_err();
        assert!(err.to_string().contains("fence.radius_meters"));
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[fence\nradius_meters = ").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        match err.downcast_ref::<ConfigError>() {
            Some(ConfigError::ParseError(message)) => {
                assert!(message.contains("config.toml"));
            }
            other => panic!("expected a parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_validation_result_error_summary() {
        let mut result = ValidationResult::default();
        result.add_error("field1", "error1");
        result.add_error("field2", "error2");
        let summary = result.error_summary();
        assert!(summary.contains("field1"));
        assert!(summary.contains("field2"));
    }
}
