// SPDX-License-Identifier: MIT
//! Process supervisor: startup, serving and telemetry drain.
//!
//! The service moves through `Init → Running → Draining → Stopped`. The
//! combined telemetry shutdown runs on every path out of `Running`, including a
//! failed bind, so the failure itself still reaches the collector.
use std::fmt;
use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::runtime::Handle;
use tracing::{error, info};

use crate::config::AppConfig;
use crate::forecast::ForecastClient;
use crate::routes::create_router;
use crate::telemetry::{ResourceProvider, RuntimeCollector, Telemetry};

/// Lifecycle phase of the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Building telemetry and the upstream client.
    Init,
    /// Serving requests.
    Running,
    /// Flushing telemetry after the server stopped.
    Draining,
    /// Telemetry flushed; the process may exit.
    Stopped,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Init => "init",
            Phase::Running => "running",
            Phase::Draining => "draining",
            Phase::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Owns process-wide startup and shutdown sequencing.
#[derive(Debug)]
pub struct Supervisor {
    config: AppConfig,
    phase: Phase,
}

impl Supervisor {
    /// Supervisor for `config`, in [`Phase::Init`].
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            phase: Phase::Init,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn enter(&mut self, phase: Phase) {
        info!(from = %self.phase, to = %phase, "lifecycle transition");
        self.phase = phase;
    }

    /// Run the service until an interrupt, then drain telemetry.
    ///
    /// # Errors
    ///
    /// Returns an error if the upstream client cannot be built or the listener
    /// fails to bind or serve.
    pub async fn run(mut self) -> Result<()> {
        let telemetry_cfg = self.config.telemetry.clone();
        let telemetry = Telemetry::init(&telemetry_cfg, ResourceProvider::new(&telemetry_cfg));
        let runtime = RuntimeCollector::start(
            telemetry.meter(),
            &Handle::current(),
            telemetry_cfg.runtime_sample_interval,
        );

        let served = self.serve().await;
        if let Err(err) = &served {
            error!(error = %format!("{err:#}"), "forecast service stopped with an error");
        }

        self.enter(Phase::Draining);
        drop(runtime);
        if let Err(err) = telemetry.shutdown(telemetry_cfg.shutdown_timeout).await {
            error!(
                error = %err,
                failed = err.failures().len(),
                "telemetry shutdown incomplete"
            );
        }
        self.enter(Phase::Stopped);
        served
    }

    async fn serve(&mut self) -> Result<()> {
        let client = ForecastClient::new(self.config.upstream_url.clone())
            .context("failed to build upstream client")?;
        let app = create_router(client);

        let addr = self.config.socket_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("could not start server on {addr}"))?;

        self.enter(Phase::Running);
        info!(%addr, upstream = %self.config.upstream_url, "Starting forecast service");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("server error")?;

        info!("Server shutdown complete");
        Ok(())
    }
}

/// Runs the forecast service with the provided configuration.
///
/// # Errors
///
/// See [`Supervisor::run`].
pub async fn run(config: AppConfig) -> Result<()> {
    Supervisor::new(config).run().await
}

/// Runs `future` to completion on a new multi-threaded runtime.
///
/// Blocking work still running afterwards, such as an exporter that ignored
/// its shutdown deadline, is abandoned after `grace` instead of holding the
/// process open.
///
/// # Errors
///
/// Returns an error if the runtime cannot be built.
pub fn block_on_bounded<F: Future>(future: F, grace: Duration) -> std::io::Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let output = runtime.block_on(future);
    runtime.shutdown_timeout(grace);
    Ok(output)
}

/// Waits for a shutdown signal (SIGINT, or SIGTERM on unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        () = terminate => {
            info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
