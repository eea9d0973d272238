// SPDX-License-Identifier: MIT
use std::future::Future;

use reqwest::header::HeaderMap;
use reqwest::Client;
use tracing::{field, info, instrument, Span};

use super::{ForecastError, ForecastResult, ForecastSource};
use crate::telemetry::propagation;

/// Public Open-Meteo API.
pub const DEFAULT_UPSTREAM_URL: &str = "https://api.open-meteo.com";

/// Fixed daily fields, one-day window, Europe/Berlin timezone.
const FORECAST_QUERY: &str = "daily=temperature_2m_max,temperature_2m_min,daylight_duration&timezone=Europe%2FBerlin&forecast_days=1";

/// Upstream URL for a coordinate pair. Coordinates are substituted verbatim.
pub fn forecast_url(base_url: &str, latitude: &str, longitude: &str) -> String {
    format!(
        "{}/v1/forecast?{FORECAST_QUERY}&latitude={latitude}&longitude={longitude}",
        base_url.trim_end_matches('/')
    )
}

/// HTTP client for the upstream forecast provider.
///
/// Each call runs in a client span and carries the W3C trace context of that
/// span, so the provider can correlate it if it records traces.
#[derive(Debug, Clone)]
pub struct ForecastClient {
    http: Client,
    base_url: String,
}

impl ForecastClient {
    /// Client for the provider at `base_url` (scheme and host, no path).
    pub fn new(base_url: impl Into<String>) -> reqwest::Result<Self> {
        let http = Client::builder().build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    /// Provider base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[instrument(
        name = "GET /v1/forecast",
        skip(self),
        fields(
            otel.kind = "client",
            http.request.method = "GET",
            url.full = field::Empty,
            http.response.status_code = field::Empty,
        )
    )]
    async fn get(&self, latitude: &str, longitude: &str) -> Result<ForecastResult, ForecastError> {
        let url = forecast_url(&self.base_url, latitude, longitude);
        let span = Span::current();
        span.record("url.full", url.as_str());
        info!(%url, "Getting forecast");

        let mut headers = HeaderMap::new();
        propagation::inject_current(&mut headers);

        let response = self
            .http
            .get(&url)
            .headers(headers)
            .send()
            .await
            .map_err(ForecastError::Unreachable)?;

        let status = response.status();
        span.record("http.response.status_code", status.as_u16());
        if !status.is_success() {
            return Err(ForecastError::UpstreamStatus(status));
        }

        let body = response.bytes().await.map_err(ForecastError::Unreachable)?;
        serde_json::from_slice(&body).map_err(ForecastError::MalformedResponse)
    }
}

impl ForecastSource for ForecastClient {
    fn fetch(
        &self,
        latitude: &str,
        longitude: &str,
    ) -> impl Future<Output = Result<ForecastResult, ForecastError>> + Send {
        self.get(latitude, longitude)
    }
}
