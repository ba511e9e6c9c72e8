//! HTTP front end: `GET /weather/{city}`.

use std::{net::SocketAddr, sync::Arc, time::Instant};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use multiweather_core::{Aggregator, WeatherReport};
use tracing::{info, warn};

pub fn router(aggregator: Arc<Aggregator>) -> Router {
    Router::new()
        .route("/weather/*city", get(weather))
        .with_state(aggregator)
}

/// The whole remainder of the path is the city, passed on unvalidated.
async fn weather(
    State(aggregator): State<Arc<Aggregator>>,
    Path(city): Path<String>,
) -> Response {
    let begin = Instant::now();

    match aggregator.temperature(&city).await {
        Ok(temp) => {
            let took = begin.elapsed();
            info!(city = %city, temp, ?took, "served");
            Json(WeatherReport { city, temp, took: format!("{took:?}") }).into_response()
        }
        Err(err) => {
            warn!(city = %city, error = %err, "request failed");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

pub async fn serve(addr: SocketAddr, aggregator: Arc<Aggregator>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!(%addr, providers = aggregator.provider_count(), "listening");

    axum::serve(listener, router(aggregator))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
