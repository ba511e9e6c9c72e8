//! Fan-out/fan-in engine that turns N primary providers plus one
//! coordinate-dependent provider into a single temperature.
//!
//! One task is spawned per primary provider. Each task reports exactly once on
//! two bounded queues of capacity N:
//! - a coordinate queue, carrying the provider's coordinate on success and the
//!   zero sentinel on failure, so the secondary pass always sees N messages;
//! - an outcome queue, carrying the temperature or the error.
//!
//! The aggregator first drains the coordinate queue, calling the secondary
//! provider sequentially for every usable coordinate, then drains the outcome
//! queue where the first error observed fails the call. Tasks whose outcome was
//! never observed are left to finish on their own.
//!
//! The average always divides by `N + 1`, whatever number of secondary
//! temperatures were summed.

use std::{fmt, sync::Arc, time::Duration};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    AggregateError, Config, Coordinate, ProviderError,
    provider::{
        CoordinateProvider, TemperatureProvider, coordinate_provider_from_config,
        primary_provider_from_config,
    },
};

pub struct Aggregator {
    primaries: Vec<Arc<dyn TemperatureProvider>>,
    secondary: Arc<dyn CoordinateProvider>,
    provider_timeout: Option<Duration>,
    deadline: Option<Duration>,
}

impl fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Aggregator")
            .field("primaries", &self.primaries.len())
            .field("provider_timeout", &self.provider_timeout)
            .field("deadline", &self.deadline)
            .finish()
    }
}

impl Aggregator {
    pub fn new(
        primaries: Vec<Arc<dyn TemperatureProvider>>,
        secondary: Arc<dyn CoordinateProvider>,
    ) -> Result<Self, AggregateError> {
        if primaries.is_empty() {
            return Err(AggregateError::NoProviders);
        }

        Ok(Self { primaries, secondary, provider_timeout: None, deadline: None })
    }

    /// Bound every individual provider call, primary or secondary.
    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = Some(timeout);
        self
    }

    /// Default deadline applied by [`Aggregator::temperature`].
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn provider_count(&self) -> usize {
        self.primaries.len()
    }

    /// Aggregate temperature in Kelvin, bounded by the configured deadline.
    pub async fn temperature(&self, city: &str) -> Result<f64, AggregateError> {
        self.temperature_within(city, self.deadline).await
    }

    /// Aggregate temperature in Kelvin, bounded by an explicit deadline.
    #[tracing::instrument(level = "debug", skip(self), fields(providers = self.primaries.len()))]
    pub async fn temperature_within(
        &self,
        city: &str,
        deadline: Option<Duration>,
    ) -> Result<f64, AggregateError> {
        let result = match deadline {
            Some(limit) => tokio::time::timeout(limit, self.aggregate(city))
                .await
                .unwrap_or(Err(AggregateError::DeadlineExceeded(limit))),
            None => self.aggregate(city).await,
        };

        match &result {
            Ok(kelvin) => info!(city, kelvin, "aggregate temperature"),
            Err(err) => warn!(city, error = %err, "aggregate failed"),
        }

        result
    }

    async fn aggregate(&self, city: &str) -> Result<f64, AggregateError> {
        let n = self.primaries.len();
        let (coord_tx, mut coord_rx) = mpsc::channel::<(usize, Coordinate)>(n);
        let (outcome_tx, mut outcome_rx) = mpsc::channel::<(usize, Result<f64, ProviderError>)>(n);

        for (index, provider) in self.primaries.iter().enumerate() {
            let provider = Arc::clone(provider);
            let city = city.to_owned();
            let coord_tx = coord_tx.clone();
            let outcome_tx = outcome_tx.clone();
            let timeout = self.provider_timeout;

            tokio::spawn(async move {
                let (coordinate, outcome) =
                    match bounded(timeout, provider.temperature(&city)).await {
                        Ok(reading) => (reading.coordinate, Ok(reading.kelvin)),
                        Err(err) => (Coordinate::zero(), Err(err)),
                    };

                debug!(provider = index, city = %city, outcome = ?outcome, %coordinate, "primary finished");

                // Both queues hold N messages, so these never wait. A send only
                // fails once the aggregator has returned.
                let _ = coord_tx.send((index, coordinate)).await;
                let _ = outcome_tx.send((index, outcome)).await;
            });
        }
        drop(coord_tx);
        drop(outcome_tx);

        let mut secondary: Vec<Option<f64>> = vec![None; n];
        for _ in 0..n {
            // None means every task is gone; a panicked task never reports.
            let Some((index, coordinate)) = coord_rx.recv().await else {
                break;
            };
            if !coordinate.is_present() {
                continue;
            }

            let kelvin = bounded(
                self.provider_timeout,
                self.secondary.temperature_at(city, &coordinate),
            )
            .await?;
            debug!(provider = index, city, %coordinate, kelvin, "secondary finished");
            secondary[index] = Some(kelvin);
        }

        let mut primary: Vec<Option<f64>> = vec![None; n];
        for _ in 0..n {
            let (index, outcome) = outcome_rx.recv().await.ok_or(AggregateError::MissingResult)?;
            primary[index] = Some(outcome?);
        }

        // Summing in provider order keeps the result independent of completion order.
        let sum: f64 = primary.iter().chain(secondary.iter()).flatten().sum();

        Ok(sum / (n as f64 + 1.0))
    }
}

async fn bounded<T>(
    timeout: Option<Duration>,
    call: impl Future<Output = Result<T, ProviderError>>,
) -> Result<T, ProviderError> {
    match timeout {
        Some(after) => tokio::time::timeout(after, call)
            .await
            .unwrap_or(Err(ProviderError::Timeout { after })),
        None => call.await,
    }
}

/// Assemble the aggregator described by `config`.
pub fn aggregator_from_config(config: &Config) -> anyhow::Result<Aggregator> {
    let primaries = config
        .primary_ids()?
        .into_iter()
        .map(|id| primary_provider_from_config(id, config))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let secondary = coordinate_provider_from_config(config)?;

    let mut aggregator = Aggregator::new(primaries, secondary)?;
    if let Some(timeout) = config.provider_timeout() {
        aggregator = aggregator.with_provider_timeout(timeout);
    }
    if let Some(deadline) = config.deadline() {
        aggregator = aggregator.with_deadline(deadline);
    }

    Ok(aggregator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ProviderId, Reading,
        provider::{MockCoordinateProvider, MockTemperatureProvider},
    };
    use async_trait::async_trait;
    use mockall::predicate::eq;

    fn primary(reading: Result<Reading, ProviderError>) -> Arc<dyn TemperatureProvider> {
        let mut mock = MockTemperatureProvider::new();
        mock.expect_temperature()
            .with(eq("Boston"))
            .times(1)
            .returning(move |_| reading.clone());
        Arc::new(mock)
    }

    fn no_secondary() -> Arc<dyn CoordinateProvider> {
        let mut mock = MockCoordinateProvider::new();
        mock.expect_temperature_at().never();
        Arc::new(mock)
    }

    /// Secondary that answers with the coordinate's latitude plus 300.
    fn latitude_secondary(calls: usize) -> Arc<dyn CoordinateProvider> {
        let mut mock = MockCoordinateProvider::new();
        mock.expect_temperature_at()
            .times(calls)
            .returning(|_, c| Ok(300.0 + c.latitude.parse::<f64>().unwrap()));
        Arc::new(mock)
    }

    struct Delayed {
        delay: Duration,
        outcome: Result<Reading, ProviderError>,
    }

    #[async_trait]
    impl TemperatureProvider for Delayed {
        async fn temperature(&self, _city: &str) -> Result<Reading, ProviderError> {
            tokio::time::sleep(self.delay).await;
            self.outcome.clone()
        }
    }

    fn delayed(ms: u64, outcome: Result<Reading, ProviderError>) -> Arc<dyn TemperatureProvider> {
        Arc::new(Delayed { delay: Duration::from_millis(ms), outcome })
    }

    struct Panicking;

    #[async_trait]
    impl TemperatureProvider for Panicking {
        async fn temperature(&self, _city: &str) -> Result<Reading, ProviderError> {
            panic!("provider blew up");
        }
    }

    #[tokio::test]
    async fn averages_primaries_and_secondary_over_n_plus_one() {
        let mut secondary = MockCoordinateProvider::new();
        secondary
            .expect_temperature_at()
            .with(eq("Boston"), eq(Coordinate::new("40.0000", "-70.0000")))
            .times(1)
            .returning(|_, _| Ok(310.0));

        let aggregator = Aggregator::new(
            vec![
                primary(Ok(Reading::new(300.0, Coordinate::new("40.0000", "-70.0000")))),
                primary(Ok(Reading::without_coordinate(290.0))),
            ],
            Arc::new(secondary),
        )
        .unwrap();

        let kelvin = aggregator.temperature("Boston").await.expect("aggregate should succeed");
        assert_eq!(kelvin, 300.0);
    }

    #[tokio::test]
    async fn one_failing_primary_fails_the_aggregate() {
        let network = ProviderError::Network("connection refused".into());
        let aggregator = Aggregator::new(
            vec![primary(Ok(Reading::without_coordinate(300.0))), primary(Err(network.clone()))],
            no_secondary(),
        )
        .unwrap();

        let err = aggregator.temperature("Boston").await.unwrap_err();
        assert_eq!(err, AggregateError::Provider(network));
        assert_eq!(err.to_string(), "connection refused");
    }

    #[tokio::test]
    async fn single_provider_keeps_fixed_divisor() {
        let aggregator =
            Aggregator::new(vec![primary(Ok(Reading::without_coordinate(280.0)))], no_secondary())
                .unwrap();

        assert_eq!(aggregator.temperature("Boston").await.unwrap(), 140.0);
    }

    #[tokio::test]
    async fn every_usable_coordinate_triggers_one_secondary_call() {
        let aggregator = Aggregator::new(
            vec![
                primary(Ok(Reading::new(280.0, Coordinate::new("10.0000", "1.0000")))),
                primary(Ok(Reading::new(290.0, Coordinate::new("20.0000", "2.0000")))),
                primary(Ok(Reading::new(300.0, Coordinate::new("0.0000", "0.0000")))),
            ],
            latitude_secondary(2),
        )
        .unwrap();

        let kelvin = aggregator.temperature("Boston").await.unwrap();
        let expected = (280.0 + 290.0 + 300.0 + 310.0 + 320.0) / 4.0;
        assert!((kelvin - expected).abs() < 1e-9, "{kelvin} != {expected}");
    }

    #[tokio::test]
    async fn secondary_failure_fails_the_aggregate() {
        let mut secondary = MockCoordinateProvider::new();
        secondary
            .expect_temperature_at()
            .times(1)
            .returning(|_, _| Err(ProviderError::Decode("missing field `currently`".into())));

        let aggregator = Aggregator::new(
            vec![primary(Ok(Reading::new(300.0, Coordinate::new("40.000000", "-70.000000"))))],
            Arc::new(secondary),
        )
        .unwrap();

        let err = aggregator.temperature("Boston").await.unwrap_err();
        assert_eq!(err.to_string(), "missing field `currently`");
    }

    #[tokio::test]
    async fn first_observed_error_wins() {
        let aggregator = Aggregator::new(
            vec![
                delayed(80, Err(ProviderError::Network("slow failure".into()))),
                delayed(5, Err(ProviderError::Network("fast failure".into()))),
            ],
            no_secondary(),
        )
        .unwrap();

        let err = aggregator.temperature("Boston").await.unwrap_err();
        assert_eq!(err.to_string(), "fast failure");
    }

    #[tokio::test]
    async fn result_is_identical_under_any_completion_order() {
        let values = [0.1, 0.7, 1e16, 0.3];
        let mut results = Vec::new();

        for delays in [[5, 25, 45, 65], [65, 45, 25, 5], [25, 5, 65, 45]] {
            let primaries = values
                .iter()
                .zip(delays)
                .enumerate()
                .map(|(i, (&kelvin, ms))| {
                    let coordinate = if i % 2 == 0 {
                        Coordinate::new(format!("{}.5000", i + 1), "1.0000")
                    } else {
                        Coordinate::zero()
                    };
                    delayed(ms, Ok(Reading::new(kelvin, coordinate)))
                })
                .collect();

            let aggregator = Aggregator::new(primaries, latitude_secondary(2)).unwrap();
            results.push(aggregator.temperature("Boston").await.unwrap());
        }

        assert!(results.windows(2).all(|w| w[0].to_bits() == w[1].to_bits()), "{results:?}");
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let aggregator = Aggregator::new(
            vec![
                primary(Ok(Reading::without_coordinate(300.0))),
                delayed(500, Ok(Reading::without_coordinate(290.0))),
            ],
            no_secondary(),
        )
        .unwrap()
        .with_provider_timeout(Duration::from_millis(20));

        let err = aggregator.temperature("Boston").await.unwrap_err();
        assert_eq!(
            err,
            AggregateError::Provider(ProviderError::Timeout { after: Duration::from_millis(20) })
        );
    }

    #[tokio::test]
    async fn aggregate_deadline_is_enforced() {
        let aggregator = Aggregator::new(
            vec![delayed(500, Ok(Reading::without_coordinate(290.0)))],
            no_secondary(),
        )
        .unwrap()
        .with_deadline(Duration::from_secs(60));

        let err = aggregator
            .temperature_within("Boston", Some(Duration::from_millis(20)))
            .await
            .unwrap_err();
        assert_eq!(err, AggregateError::DeadlineExceeded(Duration::from_millis(20)));
    }

    #[tokio::test]
    async fn panicked_provider_does_not_hang() {
        let aggregator = Aggregator::new(
            vec![Arc::new(Panicking), delayed(5, Ok(Reading::without_coordinate(290.0)))],
            no_secondary(),
        )
        .unwrap();

        let err = aggregator.temperature("Boston").await.unwrap_err();
        assert_eq!(err, AggregateError::MissingResult);
    }

    #[test]
    fn empty_provider_list_is_rejected() {
        let err = Aggregator::new(Vec::new(), no_secondary()).unwrap_err();
        assert_eq!(err, AggregateError::NoProviders);
    }

    #[test]
    fn from_config_requires_every_key() {
        let mut cfg = Config::default();
        cfg.upsert_provider_api_key(ProviderId::OpenWeatherMap, "OWM".into());
        cfg.upsert_provider_api_key(ProviderId::WeatherUnderground, "WU".into());

        let err = aggregator_from_config(&cfg).unwrap_err();
        assert!(err.to_string().contains("'forecastio'"));

        cfg.upsert_provider_api_key(ProviderId::ForecastIo, "FIO".into());
        let aggregator = aggregator_from_config(&cfg).expect("fully configured");
        assert_eq!(aggregator.provider_count(), 2);
        assert_eq!(aggregator.deadline, Some(Duration::from_secs(30)));
        assert_eq!(aggregator.provider_timeout, Some(Duration::from_secs(10)));
    }
}
