//! OpenWeatherMap current-conditions client.

use chrono::Utc;
use locus_geo::Coordinate;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::retry::{with_retry, RetryConfig};
use crate::types::{icon_url, TemperatureUnit, WeatherError, WeatherReport};

pub const OPENWEATHER_API_URL: &str = "https://api.openweathermap.org";
const CURRENT_WEATHER_PATH: &str = "data/2.5/weather";
const REQUEST_TIMEOUT_SECS: u64 = 10;
const USER_AGENT: &str = "Locus/0.1.0";

#[derive(Debug, Deserialize)]
struct CurrentResponse {
    main: MainBlock,
    #[serde(default)]
    weather: Vec<ConditionBlock>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MainBlock {
    temp: f64,
}

#[derive(Debug, Deserialize)]
struct ConditionBlock {
    description: String,
    icon: String,
}

/// Parse a base URL so that relative joins append to its path.
fn parse_base_url(base_url: &str) -> Result<Url, WeatherError> {
    let mut url = Url::parse(base_url).map_err(|e| WeatherError::InvalidUrl(e.to_string()))?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

#[derive(Debug, Clone)]
pub struct WeatherProvider {
    client: Arc<Client>,
    base_url: Url,
    api_key: String,
    unit: TemperatureUnit,
    retry: RetryConfig,
}

impl WeatherProvider {
    pub fn new(api_key: impl Into<String>, unit: TemperatureUnit) -> Result<Self, WeatherError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()?;

        let base_url = parse_base_url(OPENWEATHER_API_URL)?;

        Ok(Self {
            client: Arc::new(client),
            base_url,
            api_key: api_key.into(),
            unit,
            retry: RetryConfig::default(),
        })
    }

    /// Point the provider at another API host (mirrors, test servers).
    /// A path on the base URL is kept as a prefix of the API path.
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, WeatherError> {
        self.base_url = parse_base_url(base_url)?;
        Ok(self)
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn unit(&self) -> TemperatureUnit {
        self.unit
    }

    fn endpoint(&self, at: &Coordinate) -> Result<Url, WeatherError> {
        let mut url = self
            .base_url
            .join(CURRENT_WEATHER_PATH)
            .map_err(|e| WeatherError::InvalidUrl(e.to_string()))?;

        url.query_pairs_mut()
            .append_pair("lat", &at.latitude.to_string())
            .append_pair("lon", &at.longitude.to_string())
            .append_pair("appid", &self.api_key)
            .append_pair("units", self.unit.api_units());

        Ok(url)
    }

    /// Fetch current conditions at `at`.
    pub async fn fetch(&self, at: &Coordinate) -> Result<WeatherReport, WeatherError> {
        let url = self.endpoint(at)?;
        tracing::debug!("Fetching weather for {}", at);

        let client = &self.client;
        let response = with_retry(&self.retry, || client.get(url.clone()).send()).await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(WeatherError::InvalidApiKey);
        }
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| status.to_string());
            return Err(WeatherError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: CurrentResponse = response
            .json()
            .await
            .map_err(|e| WeatherError::Parse(e.to_string()))?;

        let condition = body
            .weather
            .into_iter()
            .next()
            .ok_or_else(|| WeatherError::Parse("response has no weather conditions".into()))?;

        let report = WeatherReport {
            location: *at,
            temperature: body.main.temp,
            unit: self.unit,
            condition: condition.description,
            icon_url: icon_url(&condition.icon),
            place: body.name.filter(|n| !n.is_empty()),
            fetched_at: Utc::now(),
        };

        tracing::info!(
            "Weather at {}: {}{} {}",
            at,
            report.temperature,
            report.unit.symbol(),
            report.condition
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_query() {
        let provider = WeatherProvider::new("secret", TemperatureUnit::Celsius).unwrap();
        let url = provider.endpoint(&Coordinate::new(28.7041, 77.1025)).unwrap();

        assert_eq!(url.path(), "/data/2.5/weather");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("lat".into(), "28.7041".into())));
        assert!(pairs.contains(&("lon".into(), "77.1025".into())));
        assert!(pairs.contains(&("appid".into(), "secret".into())));
        assert!(pairs.contains(&("units".into(), "metric".into())));
    }

    #[test]
    fn test_endpoint_respects_unit() {
        let provider = WeatherProvider::new("k", TemperatureUnit::Fahrenheit).unwrap();
        let url = provider.endpoint(&Coordinate::new(0.0, 0.0)).unwrap();
        assert!(url.query().unwrap_or_default().contains("units=imperial"));
    }

    #[test]
    fn test_base_url_prefix_survives_join() {
        for base in ["https://proxy.example/owm", "https://proxy.example/owm/"] {
            let provider = WeatherProvider::new("k", TemperatureUnit::Celsius)
                .unwrap()
                .with_base_url(base)
                .unwrap();
            let url = provider.endpoint(&Coordinate::new(0.0, 0.0)).unwrap();
            assert_eq!(url.path(), "/owm/data/2.5/weather");
        }
    }

    #[test]
    fn test_invalid_base_url() {
        let provider = WeatherProvider::new("k", TemperatureUnit::Celsius).unwrap();
        assert!(matches!(
            provider.with_base_url("not a url"),
            Err(WeatherError::InvalidUrl(_))
        ));
    }
}
