use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::{ProviderError, Reading};

use super::{TemperatureProvider, fetch_json};

const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org";

/// Direct-temperature provider. OpenWeatherMap reports Kelvin by default.
#[derive(Debug, Clone)]
pub struct OpenWeatherMapProvider {
    api_key: String,
    base_url: String,
    http: Client,
}

impl OpenWeatherMapProvider {
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
struct OwmCoord {
    lat: f64,
    lon: f64,
}

#[derive(Debug, Deserialize)]
struct OwmMain {
    temp: f64,
    #[serde(default)]
    pressure: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwmResponse {
    #[serde(default)]
    name: String,
    coord: Option<OwmCoord>,
    main: OwmMain,
}

#[async_trait]
impl TemperatureProvider for OpenWeatherMapProvider {
    async fn temperature(&self, city: &str) -> Result<Reading, ProviderError> {
        let url = format!("{}/data/2.5/weather", self.base_url);

        let request = self
            .http
            .get(url)
            .query(&[("q", city), ("appid", self.api_key.as_str())]);

        let parsed: OwmResponse = fetch_json(request, "OpenWeatherMap").await?;

        debug!(
            city,
            name = %parsed.name,
            kelvin = parsed.main.temp,
            pressure = ?parsed.main.pressure,
            lat = ?parsed.coord.as_ref().map(|c| c.lat),
            lon = ?parsed.coord.as_ref().map(|c| c.lon),
            "openweathermap responded"
        );

        // Direct-only provider: the station coordinate is logged, not forwarded.
        Ok(Reading::without_coordinate(parsed.main.temp))
    }
}
