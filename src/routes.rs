// SPDX-License-Identifier: MIT
//! HTTP routes.
//!
//! `GET /forecast?latitude=..&longitude=..` forwards the coordinates to a
//! [`ForecastSource`] and returns its result as JSON. Every request runs in a
//! server span created by [`TraceLayer`], parented to any inbound W3C trace
//! context.
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{MatchedPath, Query, State};
use axum::http::{header, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, field, info, info_span, warn, Span};
use tracing_opentelemetry::OpenTelemetrySpanExt;

use crate::forecast::{ForecastError, ForecastSource};
use crate::telemetry::propagation;

/// Route served by this service.
pub const FORECAST_ROUTE: &str = "/forecast";

/// Errors returned to HTTP callers as plain text.
#[derive(Debug, Error)]
pub enum ApiError {
    /// `latitude` or `longitude` is absent or empty.
    #[error("latitude and longitude are required")]
    MissingCoordinates,

    /// The upstream call failed.
    #[error(transparent)]
    Forecast(#[from] ForecastError),

    /// The forecast could not be encoded for the response.
    #[error(transparent)]
    Serialization(serde_json::Error),
}

impl ApiError {
    /// Status code sent for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingCoordinates => StatusCode::BAD_REQUEST,
            ApiError::Forecast(_) | ApiError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::MissingCoordinates => warn!("latitude and longitude are required"),
            ApiError::Forecast(err) => error!(error = %err, "failed to get forecast"),
            ApiError::Serialization(err) => error!(error = %err, "failed to encode forecast"),
        }
        (self.status(), self.to_string()).into_response()
    }
}

/// Query string of `GET /forecast`.
#[derive(Debug, Default, Deserialize)]
pub struct ForecastQuery {
    pub latitude: Option<String>,
    pub longitude: Option<String>,
}

impl ForecastQuery {
    /// Both coordinates, if both are present and non-empty.
    pub fn coordinates(self) -> Option<(String, String)> {
        let latitude = self.latitude.filter(|v| !v.is_empty())?;
        let longitude = self.longitude.filter(|v| !v.is_empty())?;
        Some((latitude, longitude))
    }
}

/// Creates the application router around `source`.
///
/// This function is public to allow testing the router without starting a full server.
pub fn create_router<S: ForecastSource>(source: S) -> Router {
    Router::new()
        .route(FORECAST_ROUTE, get(forecast_handler::<S>))
        .with_state(Arc::new(source))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(make_request_span)
                .on_response(|response: &Response, latency: Duration, span: &Span| {
                    span.record("http.response.status_code", response.status().as_u16());
                    debug!(latency_ms = latency.as_secs_f64() * 1000.0, "request finished");
                }),
        )
}

/// Server span for one inbound request, named after its route.
fn make_request_span(request: &Request<Body>) -> Span {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);
    let method = request.method();
    let span = info_span!(
        "request",
        otel.name = %format!("{method} {route}"),
        otel.kind = "server",
        http.request.method = %method,
        http.route = route,
        url.path = request.uri().path(),
        http.response.status_code = field::Empty,
    );
    if let Err(err) = span.set_parent(propagation::extract(request.headers())) {
        debug!(error = %err, "could not attach remote parent to request span");
    }
    span
}

async fn forecast_handler<S: ForecastSource>(
    State(source): State<Arc<S>>,
    Query(query): Query<ForecastQuery>,
) -> Result<Response, ApiError> {
    let (latitude, longitude) = query.coordinates().ok_or(ApiError::MissingCoordinates)?;

    let span = Span::current();
    span.set_attribute("latitude", latitude.clone());
    span.set_attribute("longitude", longitude.clone());

    let forecast = source.fetch(&latitude, &longitude).await?;
    info!(
        elevation = forecast.elevation,
        "Elevation Found: {:.2}",
        forecast.elevation
    );

    let body = serde_json::to_vec(&forecast).map_err(ApiError::Serialization)?;
    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}
