use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};
use multiweather_core::{Config, ProviderId, aggregator_from_config, model::KELVIN_OFFSET};

use crate::server;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather", version, about = "Multi-provider weather aggregator")]
pub struct Cli {
    /// Config file to use instead of the platform default.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level used when RUST_LOG is unset (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve `GET /weather/{city}` over HTTP.
    Serve {
        /// Listen address; overrides `listen` from the config file.
        #[arg(long)]
        listen: Option<SocketAddr>,
    },

    /// Query every provider once and print the aggregate temperature.
    Show {
        /// City name, passed to every provider unmodified.
        city: String,
    },

    /// Configure credentials for a specific provider.
    Configure {
        /// Provider short name, e.g. "openweathermap", "weatherunderground" or "forecastio".
        provider: String,
    },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let config_path = match self.config {
            Some(path) => path,
            None => Config::config_file_path()?,
        };
        let mut config = Config::load_from(&config_path)?;

        match self.command {
            Command::Serve { listen } => {
                let addr = match listen {
                    Some(addr) => addr,
                    None => config.listen_addr()?,
                };
                let aggregator = aggregator_from_config(&config)?;
                server::serve(addr, Arc::new(aggregator)).await?;
            }
            Command::Show { city } => {
                let aggregator = aggregator_from_config(&config)?;
                let begin = Instant::now();
                let kelvin = aggregator.temperature(&city).await?;
                println!("{}", format_temperature(&city, kelvin, begin.elapsed()));
            }
            Command::Configure { provider } => {
                let id = ProviderId::try_from(provider.as_str())?;
                let api_key = inquire::Password::new(&format!("API key for {id}:"))
                    .without_confirmation()
                    .prompt()
                    .context("Failed to read API key")?;

                config.upsert_provider_api_key(id, api_key.trim().to_string());
                config.save_to(&config_path)?;
                println!("Saved API key for {id} to {}", config_path.display());
            }
        }

        Ok(())
    }
}

fn format_temperature(city: &str, kelvin: f64, took: std::time::Duration) -> String {
    format!("{city}: {kelvin:.2} K ({:.1} °C), took {took:?}", kelvin - KELVIN_OFFSET)
}
