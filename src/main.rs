//! meshroute - one-shot Istio routing reconciler

use clap::Parser;
use tracing::{error, info};

use meshroute::Config;
use meshroute_common::telemetry::{init_telemetry, shutdown_telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_telemetry(config.telemetry())?;

    let result = meshroute::run(&config).await;
    match &result {
        Ok(report) => info!(
            destination_rule = %report.destination_rule,
            virtual_service = %report.virtual_service,
            gateway = %report.gateway,
            writes = report.writes(),
            "meshroute finished"
        ),
        Err(e) => error!(error = %e, retryable = e.is_retryable(), "reconciliation failed"),
    }

    shutdown_telemetry();
    result?;
    Ok(())
}
