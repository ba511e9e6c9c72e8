//! Core library for the multi-provider weather aggregator.
//!
//! This crate defines:
//! - The provider capabilities and their HTTP adapters
//! - The concurrent aggregation engine
//! - Configuration & credentials handling
//! - Shared domain models and errors
//!
//! It is used by `multiweather-cli`, but can also be reused by other binaries or services.

pub mod aggregator;
pub mod config;
pub mod error;
pub mod model;
pub mod provider;

pub use aggregator::{Aggregator, aggregator_from_config};
pub use config::{Config, ProviderConfig};
pub use error::{AggregateError, ProviderError};
pub use model::{Coordinate, Reading, WeatherReport};
pub use provider::{CoordinateProvider, ProviderId, TemperatureProvider};
