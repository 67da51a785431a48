//! Weather lookups for Locus
//!
//! Fetches current conditions for a coordinate from the OpenWeatherMap API
//! and turns the outcome into the state of the weather widget.

pub mod provider;
pub mod retry;
pub mod types;
pub mod widget;

pub use provider::WeatherProvider;
pub use retry::RetryConfig;
pub use types::*;
pub use widget::WeatherWidget;
