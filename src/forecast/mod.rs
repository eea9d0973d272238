// SPDX-License-Identifier: MIT
//! Upstream forecast provider: payload model, error taxonomy and HTTP client.
mod client;
mod model;

use std::future::Future;

use http::StatusCode;
use thiserror::Error;

pub use client::{forecast_url, ForecastClient, DEFAULT_UPSTREAM_URL};
pub use model::{Daily, DailyUnits, ForecastResult};

/// Failure of a single upstream forecast call.
#[derive(Debug, Error)]
pub enum ForecastError {
    /// The provider could not be reached, or its body could not be read.
    #[error("forecast provider unreachable: {0}")]
    Unreachable(#[source] reqwest::Error),

    /// The provider answered with a non-success status.
    #[error("failed to get forecast: {0}")]
    UpstreamStatus(StatusCode),

    /// The provider answered 2xx with a body that is not a forecast.
    #[error("malformed forecast response: {0}")]
    MalformedResponse(#[source] serde_json::Error),
}

impl ForecastError {
    /// Upstream status, when the provider answered at all.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ForecastError::UpstreamStatus(status) => Some(*status),
            ForecastError::Unreachable(err) => err.status(),
            ForecastError::MalformedResponse(_) => None,
        }
    }
}

/// Source of forecasts for a coordinate pair.
///
/// Coordinates are passed through as received; validating them is left to
/// the provider. Dropping the returned future cancels the call.
pub trait ForecastSource: Send + Sync + 'static {
    /// Fetch the forecast for `latitude`/`longitude`.
    fn fetch(
        &self,
        latitude: &str,
        longitude: &str,
    ) -> impl Future<Output = Result<ForecastResult, ForecastError>> + Send;
}
