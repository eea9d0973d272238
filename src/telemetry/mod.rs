// SPDX-License-Identifier: MIT
//! Telemetry bootstrap and shutdown (traces, metrics, logs).
//!
//! This module wires OpenTelemetry into `tracing` for the forecast service.
//! The public API is intentionally small:
//!
//! * [`TelemetryConfig`] – collector endpoint, resource metadata and export cadence.
//! * [`Telemetry::init`] – builds the three pipelines, installs the propagator,
//!   the global providers and the `tracing` subscriber.
//! * [`Telemetry::shutdown`] – combined, idempotent flush of every pipeline.
//!
//! Feature flags (Cargo features) influence behavior:
//!
//! * `console-log` – add a compact console formatting layer (on by default).
//! * `json` – switch the console layer to one JSON object per line.
//!
//! # Example
//! ```no_run
//! use std::time::Duration;
//! use forecast_otel::telemetry::{ResourceProvider, Telemetry, TelemetryConfig};
//! # async fn run() -> anyhow::Result<()> {
//! let cfg = TelemetryConfig::default();
//! let telemetry = Telemetry::init(&cfg, ResourceProvider::new(&cfg));
//! // ... application logic ...
//! telemetry.shutdown(Duration::from_secs(5)).await?;
//! # Ok(()) }
//! ```
//!
//! # Degraded pipelines
//! A pipeline whose exporter cannot be built is kept in a degraded state rather
//! than failing startup. Each one is logged at `warn` with
//! `telemetry.degraded = true` and counted on `telemetry.pipeline.degraded`.
//! An already installed global subscriber is kept as well; the pipelines still
//! run but events only reach whatever that subscriber does with them.
//!
//! # Threading Model
//! Batch processors and the periodic reader run on their own threads with the
//! blocking HTTP client; shutdowns are therefore driven from the blocking pool.
pub mod lifecycle;
pub mod pipeline;
pub mod propagation;
pub mod resource;
pub mod runtime;

use std::io;
use std::time::Duration;

use opentelemetry::metrics::{Meter, MeterProvider as _};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use tracing::{warn, Subscriber};
use tracing_opentelemetry::OpenTelemetryLayer;
#[cfg(feature = "console-log")]
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::MakeWriter;
#[cfg(feature = "console-log")]
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Layer, Registry};

pub use lifecycle::{Shutdown, ShutdownCause, ShutdownError, ShutdownFailure, ShutdownRegistry};
pub use pipeline::{new_log_pipeline, new_metric_pipeline, new_trace_pipeline, Pipeline, Signal};
pub use resource::ResourceProvider;
pub use runtime::{RuntimeCollector, RuntimeSample};

/// Instrumentation scope for tracers and meters created here.
pub const SCOPE: &str = "forecast";

/// Configuration used when initializing telemetry.
///
/// Values are sourced from environment variables if available:
/// * `OTEL_EXPORTER_OTLP_ENDPOINT` – base endpoint (e.g. `http://localhost:4318`).
/// * `OTEL_SERVICE_NAME` – service name resource attribute.
/// * `RUST_ENV` – deployment environment (added as `deployment.environment`).
///
/// Defaults are used when variables are absent.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Base OTLP endpoint (without per-signal suffix). Example: `http://localhost:4318`.
    pub endpoint: String,
    /// Service name reported in resource attributes (`service.name`).
    pub service_name: String,
    /// Service version reported in resource attributes (`service.version`).
    pub service_version: String,
    /// Deployment environment (`deployment.environment`).
    pub environment: String,
    /// Longest time a span or log record waits in a batch.
    pub export_delay: Duration,
    /// Batch size that triggers an export before `export_delay` elapses.
    pub max_export_batch_size: usize,
    /// Metric collection and push interval.
    pub metric_interval: Duration,
    /// Minimum interval between runtime statistics samples.
    pub runtime_sample_interval: Duration,
    /// Deadline for the combined shutdown of all pipelines.
    pub shutdown_timeout: Duration,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            endpoint: std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:4318".to_string()),
            service_name: std::env::var("OTEL_SERVICE_NAME")
                .unwrap_or_else(|_| "forecast".to_string()),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: std::env::var("RUST_ENV").unwrap_or_else(|_| "dev".into()),
            export_delay: Duration::from_secs(5),
            max_export_batch_size: 512,
            metric_interval: Duration::from_secs(60),
            runtime_sample_interval: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl TelemetryConfig {
    /// Full OTLP/HTTP endpoint for one signal, e.g. `http://localhost:4318/v1/traces`.
    pub fn signal_endpoint(&self, signal: Signal) -> String {
        format!("{}/v1/{}", self.endpoint.trim_end_matches('/'), signal)
    }
}

/// Process-wide telemetry context.
///
/// Owns the memoized resource and the shutdown registry of all three
/// pipelines. Call [`Telemetry::shutdown`] before the Tokio runtime exits to
/// flush any remaining batches; repeating the call is a no-op.
pub struct Telemetry {
    resources: ResourceProvider,
    registry: ShutdownRegistry,
    meter: Meter,
    degraded: Vec<Signal>,
    subscriber_installed: bool,
}

impl Telemetry {
    /// Build the trace, metric and log pipelines and install them behind the
    /// `tracing` facade, together with the W3C propagator.
    ///
    /// Nothing here aborts startup. Exporter failures leave the affected
    /// pipeline degraded and are reported once the subscriber can carry the
    /// warning; an existing global subscriber is kept and reported the same way.
    pub fn init(cfg: &TelemetryConfig, resources: ResourceProvider) -> Self {
        propagation::install();

        let resource = resources.get();
        let traces = new_trace_pipeline(cfg, resource);
        let metrics = new_metric_pipeline(cfg, resource);
        let logs = new_log_pipeline(cfg, resource);

        if let Some(provider) = traces.provider() {
            global::set_tracer_provider(provider.clone());
        }
        let meter = match metrics.provider() {
            Some(provider) => {
                global::set_meter_provider(provider.clone());
                provider.meter(SCOPE)
            }
            None => global::meter(SCOPE),
        };

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let otel_trace_layer = traces
            .provider()
            .map(|provider| OpenTelemetryLayer::new(provider.tracer(SCOPE)));

        let installed = Registry::default()
            .with(filter)
            .with(console_layer(io::stdout))
            .with(logs.tracing_hook())
            .with(otel_trace_layer)
            .try_init();
        let subscriber_installed = match installed {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    target: "telemetry",
                    error = %err,
                    telemetry.degraded = true,
                    "tracing subscriber already installed, keeping it"
                );
                false
            }
        };

        let mut degraded = Vec::new();
        let states = [
            (traces.signal(), traces.degradation()),
            (metrics.signal(), metrics.degradation()),
            (logs.signal(), logs.degradation()),
        ];
        for (signal, reason) in states {
            if let Some(reason) = reason {
                report_degraded(&meter, signal, reason);
                degraded.push(signal);
            }
        }

        let registry = ShutdownRegistry::new();
        registry.register(traces);
        registry.register(metrics);
        registry.register(logs);

        Self {
            resources,
            registry,
            meter,
            degraded,
            subscriber_installed,
        }
    }

    /// Meter for instruments owned by this service.
    pub fn meter(&self) -> &Meter {
        &self.meter
    }

    /// The resource shared by every pipeline.
    pub fn resources(&self) -> &ResourceProvider {
        &self.resources
    }

    /// Signals whose exporter could not be built.
    pub fn degraded(&self) -> &[Signal] {
        &self.degraded
    }

    /// Whether `init` installed the global `tracing` subscriber.
    pub fn subscriber_installed(&self) -> bool {
        self.subscriber_installed
    }

    /// Pending pipeline shutdowns.
    pub fn registry(&self) -> &ShutdownRegistry {
        &self.registry
    }

    /// Flush and shutdown every pipeline within `timeout`.
    ///
    /// All pipelines are attempted even if some fail; the failures are
    /// returned together. Later calls return `Ok(())`.
    ///
    /// # Errors
    /// Returns a [`ShutdownError`] listing each failing pipeline.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), ShutdownError> {
        self.registry.shutdown_all(timeout).await
    }
}

fn report_degraded(meter: &Meter, signal: Signal, reason: &str) {
    warn!(
        target: "telemetry",
        signal = %signal,
        reason,
        telemetry.degraded = true,
        "telemetry pipeline degraded, continuing without export"
    );
    meter
        .u64_counter("telemetry.pipeline.degraded")
        .with_description("Telemetry pipelines that failed to initialize")
        .build()
        .add(1, &[KeyValue::new("signal", signal.as_str())]);
}

// Console formatting: plain compact single-line output.
#[cfg(all(feature = "console-log", not(feature = "json")))]
fn console_layer<S, W>(writer: W) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    fmt::layer()
        .with_writer(writer)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .compact()
}

// One JSON object per line, for log shippers.
#[cfg(feature = "json")]
fn console_layer<S, W>(writer: W) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    fmt::layer()
        .json()
        .with_writer(writer)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
}

#[cfg(not(feature = "console-log"))]
fn console_layer<S, W>(_writer: W) -> impl Layer<S>
where
    S: Subscriber,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::layer::Identity::new()
}
