use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::{Coordinate, ProviderError, model::fahrenheit_to_kelvin};

use super::{CoordinateProvider, fetch_json};

const DEFAULT_BASE_URL: &str = "https://api.forecast.io";

/// Coordinate-dependent provider; reports Fahrenheit.
#[derive(Debug, Clone)]
pub struct ForecastIoProvider {
    api_key: String,
    base_url: String,
    http: Client,
}

impl ForecastIoProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            http: Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[derive(Debug, Deserialize)]
struct FioCurrently {
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct FioResponse {
    currently: FioCurrently,
}

#[async_trait]
impl CoordinateProvider for ForecastIoProvider {
    async fn temperature_at(
        &self,
        city: &str,
        coordinate: &Coordinate,
    ) -> Result<f64, ProviderError> {
        let url = format!(
            "{}/forecast/{}/{},{}",
            self.base_url, self.api_key, coordinate.latitude, coordinate.longitude
        );

        let parsed: FioResponse = fetch_json(self.http.get(url), "Forecast.io").await?;
        let kelvin = fahrenheit_to_kelvin(parsed.currently.temperature);

        debug!(city, %coordinate, kelvin, "forecastio responded");

        Ok(kelvin)
    }
}
