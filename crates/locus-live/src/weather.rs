use std::future::Future;

use locus_geo::Coordinate;
use locus_weather::{WeatherError, WeatherProvider, WeatherReport};

/// Looks up current weather for a coordinate.
pub trait WeatherLookup: Send + Sync + 'static {
    fn lookup(&self, at: Coordinate) -> impl Future<Output = Result<WeatherReport, WeatherError>> + Send;
}

impl WeatherLookup for WeatherProvider {
    fn lookup(&self, at: Coordinate) -> impl Future<Output = Result<WeatherReport, WeatherError>> + Send {
        async move { self.fetch(&at).await }
    }
}
