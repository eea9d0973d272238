// SPDX-License-Identifier: MIT
use anyhow::Result;
use forecast_otel::config::AppConfig;
use forecast_otel::server;

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;
    let grace = config.telemetry.shutdown_timeout;
    server::block_on_bounded(server::run(config), grace)?
}
