use crate::{
    Config, Coordinate, ProviderError, Reading,
    provider::{
        forecastio::ForecastIoProvider, openweathermap::OpenWeatherMapProvider,
        wunderground::WeatherUndergroundProvider,
    },
};
use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use std::{convert::TryFrom, sync::Arc};

pub mod forecastio;
pub mod openweathermap;
pub mod wunderground;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    OpenWeatherMap,
    WeatherUnderground,
    ForecastIo,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenWeatherMap => "openweathermap",
            ProviderId::WeatherUnderground => "weatherunderground",
            ProviderId::ForecastIo => "forecastio",
        }
    }

    pub const fn all() -> &'static [ProviderId] {
        &[ProviderId::OpenWeatherMap, ProviderId::WeatherUnderground, ProviderId::ForecastIo]
    }

    /// Primaries are fanned out by the aggregator; the rest are coordinate-dependent.
    pub fn is_primary(&self) -> bool {
        !matches!(self, ProviderId::ForecastIo)
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProviderId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        match lower.as_str() {
            "openweathermap" => Ok(ProviderId::OpenWeatherMap),
            "weatherunderground" => Ok(ProviderId::WeatherUnderground),
            "forecastio" => Ok(ProviderId::ForecastIo),
            _ => Err(anyhow::anyhow!(
                "Unknown provider '{value}'. Supported providers: openweathermap, weatherunderground, forecastio."
            )),
        }
    }
}

/// A provider queried directly by city. Fanned out concurrently by the aggregator.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TemperatureProvider: Send + Sync {
    async fn temperature(&self, city: &str) -> Result<Reading, ProviderError>;
}

/// A provider that can only answer once a primary has located the city.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CoordinateProvider: Send + Sync {
    async fn temperature_at(
        &self,
        city: &str,
        coordinate: &Coordinate,
    ) -> Result<f64, ProviderError>;
}

/// Construct a primary provider from config.
pub fn primary_provider_from_config(
    id: ProviderId,
    config: &Config,
) -> anyhow::Result<Arc<dyn TemperatureProvider>> {
    let (api_key, base_url) = credentials(id, config)?;

    let provider: Arc<dyn TemperatureProvider> = match id {
        ProviderId::OpenWeatherMap => {
            let p = OpenWeatherMapProvider::new(api_key);
            Arc::new(match base_url {
                Some(url) => p.with_base_url(url),
                None => p,
            })
        }
        ProviderId::WeatherUnderground => {
            let p = WeatherUndergroundProvider::new(api_key);
            Arc::new(match base_url {
                Some(url) => p.with_base_url(url),
                None => p,
            })
        }
        ProviderId::ForecastIo => {
            return Err(anyhow::anyhow!(
                "Provider '{id}' needs coordinates and cannot be used as a primary provider."
            ));
        }
    };

    Ok(provider)
}

/// Construct the coordinate-dependent provider from config.
pub fn coordinate_provider_from_config(
    config: &Config,
) -> anyhow::Result<Arc<dyn CoordinateProvider>> {
    let (api_key, base_url) = credentials(ProviderId::ForecastIo, config)?;

    let provider = ForecastIoProvider::new(api_key);
    Ok(Arc::new(match base_url {
        Some(url) => provider.with_base_url(url),
        None => provider,
    }))
}

fn credentials(id: ProviderId, config: &Config) -> anyhow::Result<(String, Option<String>)> {
    let provider = config.provider_config(id).ok_or_else(|| {
        anyhow::anyhow!(
            "No API key configured for provider '{id}'.\n\
                 Hint: run `weather configure {id}` and enter your API key."
        )
    })?;

    Ok((provider.api_key.clone(), provider.base_url.clone()))
}

/// Send a prepared request and decode a JSON body, mapping failures onto the
/// provider error taxonomy.
pub(crate) async fn fetch_json<T: DeserializeOwned>(
    request: RequestBuilder,
    label: &str,
) -> Result<T, ProviderError> {
    let res = request
        .send()
        .await
        .map_err(|e| ProviderError::Network(format!("Failed to send request to {label}: {e}")))?;

    let status = res.status();
    let body = res.text().await.map_err(|e| {
        ProviderError::Network(format!("Failed to read {label} response body: {e}"))
    })?;

    if !status.is_success() {
        return Err(ProviderError::Network(format!(
            "{label} request failed with status {}: {}",
            status,
            truncate_body(&body),
        )));
    }

    serde_json::from_str(&body)
        .map_err(|e| ProviderError::Decode(format!("Failed to parse {label} JSON: {e}")))
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() > MAX {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    } else {
        body.to_string()
    }
}
