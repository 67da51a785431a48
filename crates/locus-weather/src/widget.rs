use crate::types::{WeatherError, WeatherReport};

pub const UNAVAILABLE_TEXT: &str = "Weather data unavailable";

/// What the weather widget currently shows.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum WeatherWidget {
    #[default]
    Unavailable,
    Available(WeatherReport),
}

impl WeatherWidget {
    pub fn from_result(result: &Result<WeatherReport, WeatherError>) -> Self {
        match result {
            Ok(report) => Self::Available(report.clone()),
            Err(_) => Self::Unavailable,
        }
    }

    pub fn report(&self) -> Option<&WeatherReport> {
        match self {
            Self::Available(report) => Some(report),
            Self::Unavailable => None,
        }
    }

    /// Plain-text rendering, one field per line.
    pub fn render(&self) -> String {
        match self {
            Self::Unavailable => UNAVAILABLE_TEXT.to_string(),
            Self::Available(report) => format!(
                "Temperature: {}{}\nCondition: {}\nIcon: {}",
                report.temperature,
                report.unit.symbol(),
                report.condition,
                report.icon_url
            ),
        }
    }
}
