use std::time::Duration;

use thiserror::Error;

/// Failure of a single provider invocation.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    /// The HTTP call failed or came back with a non-success status.
    #[error("{0}")]
    Network(String),

    /// The response body did not match the provider's schema.
    #[error("{0}")]
    Decode(String),

    #[error("provider did not respond within {after:?}")]
    Timeout { after: Duration },
}

/// Failure of an aggregate call. Provider failures pass through untouched.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AggregateError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("aggregate deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    #[error("at least one primary provider is required")]
    NoProviders,

    #[error("a provider task ended without reporting a result")]
    MissingResult,
}
