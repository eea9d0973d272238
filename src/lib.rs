// SPDX-License-Identifier: MIT
//! Weather forecast proxy instrumented end to end with OpenTelemetry.
//!
//! The service exposes `GET /forecast?latitude=..&longitude=..`, forwards the
//! coordinates to an upstream forecast provider and returns its JSON payload.
//! Every request produces a server span, the upstream call a child client
//! span, and all `tracing` events are mirrored into an OTLP log pipeline:
//! * Traces, metrics and logs are exported over OTLP/HTTP, each with its own pipeline.
//! * A pipeline that cannot be built is degraded, never fatal.
//! * One combined, idempotent shutdown flushes all pipelines.
//!
//! The primary entry points are [`server::run`], [`routes::create_router`] and
//! [`telemetry::Telemetry`].
//!
//! # Feature Flags
//! * `console-log` – add a compact console formatter (file/line/thread id). On by default.
//! * `json` – format console output as one JSON object per line (implies `console-log`).
//!
//! # Quick Start
//! ```no_run
//! use forecast_otel::{config::AppConfig, server};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::from_env()?;
//!     let grace = config.telemetry.shutdown_timeout;
//!     server::block_on_bounded(server::run(config), grace)?
//! }
//! ```
pub mod config;
pub mod forecast;
pub mod routes;
pub mod server;
pub mod telemetry;

#[cfg(test)]
mod test_support;
