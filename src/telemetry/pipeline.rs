// SPDX-License-Identifier: MIT
//! Trace, metric and log export pipelines.
//!
//! Each constructor wraps an OTLP/HTTP exporter in the SDK's batching (traces,
//! logs) or periodic (metrics) processor and tags it with the shared resource.
//! If the exporter cannot be built the constructor still returns a
//! [`Pipeline`], in the degraded state: it carries no provider, its shutdown
//! does nothing and [`Pipeline::degradation`] holds the reason.
use std::fmt;
use std::time::Duration;

use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::{LogExporter, MetricExporter, Protocol, SpanExporter, WithExportConfig};
use opentelemetry_sdk::error::OTelSdkResult;
use opentelemetry_sdk::logs::{self, BatchLogProcessor, SdkLoggerProvider};
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::trace::{self, BatchSpanProcessor, SdkTracerProvider};
use opentelemetry_sdk::Resource;
use tracing::Subscriber;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer};

use super::lifecycle::Shutdown;
use super::TelemetryConfig;

/// Targets whose events never reach the log pipeline; the exporters use them.
const LOG_HOOK_FILTER: &str = "info,hyper=off,h2=off,reqwest=off,opentelemetry=off,opentelemetry_sdk=off";

/// Telemetry signal carried by a pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Signal {
    /// Spans.
    Traces,
    /// Instrument readings.
    Metrics,
    /// Log records.
    Logs,
}

impl Signal {
    /// Lower-case name, also the OTLP/HTTP path segment.
    pub fn as_str(self) -> &'static str {
        match self {
            Signal::Traces => "traces",
            Signal::Metrics => "metrics",
            Signal::Logs => "logs",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One export pipeline: an SDK provider, or the reason it is missing.
#[derive(Debug)]
pub struct Pipeline<P> {
    signal: Signal,
    provider: Option<P>,
    degradation: Option<String>,
}

impl<P> Pipeline<P> {
    fn ready(signal: Signal, provider: P) -> Self {
        Self {
            signal,
            provider: Some(provider),
            degradation: None,
        }
    }

    fn degraded(signal: Signal, reason: impl fmt::Display) -> Self {
        Self {
            signal,
            provider: None,
            degradation: Some(reason.to_string()),
        }
    }

    /// Signal this pipeline exports.
    pub fn signal(&self) -> Signal {
        self.signal
    }

    /// The SDK provider, absent when the pipeline is degraded.
    pub fn provider(&self) -> Option<&P> {
        self.provider.as_ref()
    }

    /// Why the exporter could not be built, if it could not.
    pub fn degradation(&self) -> Option<&str> {
        self.degradation.as_deref()
    }
}

impl Pipeline<SdkLoggerProvider> {
    /// Layer mirroring every `tracing` event into this pipeline.
    ///
    /// `None` when the pipeline is degraded; `Option<Layer>` is itself a no-op
    /// layer, so the result can be stacked unconditionally.
    pub fn tracing_hook<S>(&self) -> Option<impl Layer<S>>
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        self.provider.as_ref().map(|provider| {
            OpenTelemetryTracingBridge::new(provider).with_filter(EnvFilter::new(LOG_HOOK_FILTER))
        })
    }
}

impl Shutdown for Pipeline<SdkTracerProvider> {
    fn name(&self) -> &str {
        self.signal.as_str()
    }

    fn shutdown(&self, timeout: Duration) -> OTelSdkResult {
        self.provider
            .as_ref()
            .map_or(Ok(()), |provider| provider.shutdown_with_timeout(timeout))
    }
}

impl Shutdown for Pipeline<SdkMeterProvider> {
    fn name(&self) -> &str {
        self.signal.as_str()
    }

    fn shutdown(&self, timeout: Duration) -> OTelSdkResult {
        self.provider
            .as_ref()
            .map_or(Ok(()), |provider| provider.shutdown_with_timeout(timeout))
    }
}

impl Shutdown for Pipeline<SdkLoggerProvider> {
    fn name(&self) -> &str {
        self.signal.as_str()
    }

    fn shutdown(&self, timeout: Duration) -> OTelSdkResult {
        self.provider
            .as_ref()
            .map_or(Ok(()), |provider| provider.shutdown_with_timeout(timeout))
    }
}

/// Span pipeline: batches are flushed every `export_delay` or once
/// `max_export_batch_size` spans are queued, whichever comes first.
pub fn new_trace_pipeline(cfg: &TelemetryConfig, resource: &Resource) -> Pipeline<SdkTracerProvider> {
    let exporter = SpanExporter::builder()
        .with_http()
        .with_protocol(Protocol::HttpBinary)
        .with_endpoint(cfg.signal_endpoint(Signal::Traces))
        .build();
    let exporter = match exporter {
        Ok(exporter) => exporter,
        Err(err) => return Pipeline::degraded(Signal::Traces, err),
    };

    let batch = trace::BatchConfigBuilder::default()
        .with_scheduled_delay(cfg.export_delay)
        .with_max_export_batch_size(cfg.max_export_batch_size)
        .build();
    let processor = BatchSpanProcessor::builder(exporter)
        .with_batch_config(batch)
        .build();
    let provider = SdkTracerProvider::builder()
        .with_span_processor(processor)
        .with_resource(resource.clone())
        .build();
    Pipeline::ready(Signal::Traces, provider)
}

/// Metric pipeline: a periodic reader collects and pushes every `metric_interval`.
pub fn new_metric_pipeline(cfg: &TelemetryConfig, resource: &Resource) -> Pipeline<SdkMeterProvider> {
    let exporter = MetricExporter::builder()
        .with_http()
        .with_protocol(Protocol::HttpBinary)
        .with_endpoint(cfg.signal_endpoint(Signal::Metrics))
        .build();
    let exporter = match exporter {
        Ok(exporter) => exporter,
        Err(err) => return Pipeline::degraded(Signal::Metrics, err),
    };

    let reader = PeriodicReader::builder(exporter)
        .with_interval(cfg.metric_interval)
        .build();
    let provider = SdkMeterProvider::builder()
        .with_reader(reader)
        .with_resource(resource.clone())
        .build();
    Pipeline::ready(Signal::Metrics, provider)
}

/// Log pipeline, batched like spans. Attach it to `tracing` through
/// [`Pipeline::tracing_hook`].
pub fn new_log_pipeline(cfg: &TelemetryConfig, resource: &Resource) -> Pipeline<SdkLoggerProvider> {
    let exporter = LogExporter::builder()
        .with_http()
        .with_protocol(Protocol::HttpBinary)
        .with_endpoint(cfg.signal_endpoint(Signal::Logs))
        .build();
    let exporter = match exporter {
        Ok(exporter) => exporter,
        Err(err) => return Pipeline::degraded(Signal::Logs, err),
    };

    let batch = logs::BatchConfigBuilder::default()
        .with_scheduled_delay(cfg.export_delay)
        .with_max_export_batch_size(cfg.max_export_batch_size)
        .build();
    let processor = BatchLogProcessor::builder(exporter)
        .with_batch_config(batch)
        .build();
    let provider = SdkLoggerProvider::builder()
        .with_log_processor(processor)
        .with_resource(resource.clone())
        .build();
    Pipeline::ready(Signal::Logs, provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    fn config(endpoint: &str) -> TelemetryConfig {
        TelemetryConfig {
            endpoint: endpoint.to_string(),
            ..TelemetryConfig::default()
        }
    }

    #[test]
    fn signal_names() {
        assert_eq!(Signal::Traces.to_string(), "traces");
        assert_eq!(Signal::Metrics.as_str(), "metrics");
        assert_eq!(Signal::Logs.as_str(), "logs");
    }

    #[test]
    fn degraded_pipeline_shutdown_is_noop() {
        let pipeline: Pipeline<SdkTracerProvider> =
            Pipeline::degraded(Signal::Traces, "collector unreachable");
        assert!(pipeline.provider().is_none());
        assert_eq!(pipeline.degradation(), Some("collector unreachable"));
        assert_eq!(pipeline.name(), "traces");
        assert_ok!(pipeline.shutdown(Duration::from_secs(1)));
        assert_ok!(pipeline.shutdown(Duration::from_secs(1)));
    }

    #[test]
    fn degraded_log_pipeline_has_no_hook() {
        let pipeline: Pipeline<SdkLoggerProvider> = Pipeline::degraded(Signal::Logs, "nope");
        assert!(pipeline
            .tracing_hook::<tracing_subscriber::Registry>()
            .is_none());
    }

    #[test]
    fn invalid_endpoint_degrades_every_pipeline() {
        let cfg = config("http://not a host:4318");
        let resource = Resource::builder_empty().build();

        let traces = new_trace_pipeline(&cfg, &resource);
        let metrics = new_metric_pipeline(&cfg, &resource);
        let logs = new_log_pipeline(&cfg, &resource);

        assert!(traces.provider().is_none());
        assert!(traces.degradation().is_some());
        assert!(metrics.degradation().is_some());
        assert!(logs.degradation().is_some());
        assert_ok!(metrics.shutdown(Duration::ZERO));
    }

    #[tokio::test]
    async fn pipelines_build_against_local_endpoint() {
        let cfg = config("http://127.0.0.1:4318");
        let resource = Resource::builder_empty().build();

        let traces = new_trace_pipeline(&cfg, &resource);
        let metrics = new_metric_pipeline(&cfg, &resource);
        let logs = new_log_pipeline(&cfg, &resource);

        assert_eq!(traces.signal(), Signal::Traces);
        assert!(traces.provider().is_some(), "{:?}", traces.degradation());
        assert!(metrics.provider().is_some(), "{:?}", metrics.degradation());
        assert!(logs.provider().is_some(), "{:?}", logs.degradation());
        assert!(logs
            .tracing_hook::<tracing_subscriber::Registry>()
            .is_some());
    }
}
