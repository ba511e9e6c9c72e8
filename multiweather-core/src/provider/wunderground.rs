use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use tracing::debug;

use crate::{Coordinate, ProviderError, Reading, model::celsius_to_kelvin};

use super::{TemperatureProvider, fetch_json};

const DEFAULT_BASE_URL: &str = "http://api.wunderground.com";

/// Decimal places used when formatting the observation location.
pub const COORDINATE_PRECISION: usize = 6;

/// Direct-temperature provider that also reports where it observed.
#[derive(Debug, Clone)]
pub struct WeatherUndergroundProvider {
    api_key: String,
    base_url: String,
    http: Client,
}

impl WeatherUndergroundProvider {
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
struct WuLocation {
    #[serde(default, deserialize_with = "number_or_string")]
    latitude: f64,
    #[serde(default, deserialize_with = "number_or_string")]
    longitude: f64,
}

#[derive(Debug, Deserialize)]
struct WuObservation {
    temp_c: f64,
    display_location: Option<WuLocation>,
}

#[derive(Debug, Deserialize)]
struct WuResponse {
    current_observation: WuObservation,
}

/// The conditions feed encodes degrees as strings ("42.360000"); accept numbers too.
fn number_or_string<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) if s.trim().is_empty() => Ok(0.0),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

#[async_trait]
impl TemperatureProvider for WeatherUndergroundProvider {
    async fn temperature(&self, city: &str) -> Result<Reading, ProviderError> {
        let url = format!("{}/api/{}/conditions/q/{}.json", self.base_url, self.api_key, city);

        let parsed: WuResponse = fetch_json(self.http.get(url), "Weather Underground").await?;
        let observation = parsed.current_observation;

        let kelvin = celsius_to_kelvin(observation.temp_c);
        let coordinate = observation
            .display_location
            .map(|loc| Coordinate::from_degrees(loc.latitude, loc.longitude, COORDINATE_PRECISION))
            .unwrap_or_default();

        debug!(city, kelvin, %coordinate, "weatherunderground responded");

        Ok(Reading::new(kelvin, coordinate))
    }
}
