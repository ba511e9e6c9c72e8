use serde::{Deserialize, Serialize};

/// Offset between the Celsius and Kelvin scales.
pub const KELVIN_OFFSET: f64 = 273.15;

pub fn celsius_to_kelvin(celsius: f64) -> f64 {
    celsius + KELVIN_OFFSET
}

pub fn fahrenheit_to_kelvin(fahrenheit: f64) -> f64 {
    (fahrenheit + 459.67) * 5.0 / 9.0
}

/// A latitude/longitude pair as decimal strings at a provider-defined precision.
///
/// Providers that cannot locate a city report [`Coordinate::zero`] instead of
/// omitting the coordinate. This sentinel is a compatibility shim: it makes the
/// origin (0, 0) indistinguishable from "no coordinate", and `Option<Coordinate>`
/// would be the cleaner model. The aggregator relies on [`Coordinate::is_present`]
/// and nothing else to decide whether a secondary lookup happens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: String,
    pub longitude: String,
}

impl Coordinate {
    pub fn new(latitude: impl Into<String>, longitude: impl Into<String>) -> Self {
        Self { latitude: latitude.into(), longitude: longitude.into() }
    }

    /// The "no coordinate" sentinel at 6-decimal precision.
    pub fn zero() -> Self {
        Self::new("0.000000", "0.000000")
    }

    /// Format degrees with a fixed number of decimals, e.g. `40.712800`.
    pub fn from_degrees(latitude: f64, longitude: f64, precision: usize) -> Self {
        Self::new(
            format!("{latitude:.precision$}"),
            format!("{longitude:.precision$}"),
        )
    }

    /// False only for the zero sentinel, at any precision ("0.0000", "0.000000", "").
    pub fn is_present(&self) -> bool {
        !(is_zero_component(&self.latitude) && is_zero_component(&self.longitude))
    }
}

impl Default for Coordinate {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.latitude, self.longitude)
    }
}

fn is_zero_component(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || value.parse::<f64>().is_ok_and(|v| v == 0.0)
}

/// Successful outcome of a primary provider.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub kelvin: f64,
    pub coordinate: Coordinate,
}

impl Reading {
    pub fn new(kelvin: f64, coordinate: Coordinate) -> Self {
        Self { kelvin, coordinate }
    }

    /// A reading from a provider that does not report a location.
    pub fn without_coordinate(kelvin: f64) -> Self {
        Self::new(kelvin, Coordinate::zero())
    }
}

/// JSON body returned by `GET /weather/{city}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherReport {
    pub city: String,
    pub temp: f64,
    pub took: String,
}
