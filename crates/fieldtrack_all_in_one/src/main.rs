mod config;

use common::postgres::{PostgresClient, PostgresOperatorRepository};
use common::telemetry::{init_telemetry, shutdown_telemetry, TelemetryProviders};
use config::ServiceConfig;
use fieldtrack_runner::Runner;
use location_relay::LocationRelay;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Tracing + optional OpenTelemetry export for traces and logs
    let telemetry_providers: Option<TelemetryProviders> = match init_telemetry(&config.telemetry())
    {
        Ok(providers) => providers,
        Err(e) => {
            eprintln!("Failed to initialize telemetry: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        otel_enabled = config.otel_enabled,
        otel_endpoint = %config.otel_endpoint,
        "Starting fieldtrack-all-in-one service"
    );
    debug!("Configuration: {:?}", config);

    let postgres_client = match connect_postgres(&config).await {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to connect to PostgreSQL: {:#}", e);
            std::process::exit(1);
        }
    };

    let operator_repository = Arc::new(PostgresOperatorRepository::new(postgres_client.clone()));

    let location_relay = match LocationRelay::new(operator_repository, config.location_relay()) {
        Ok(relay) => relay,
        Err(e) => {
            error!("Failed to initialize location relay: {:#}", e);
            std::process::exit(1);
        }
    };

    let mut runner = Runner::new();
    for (name, process) in location_relay.into_runner_processes() {
        runner = runner.with_named_process(name, process);
    }

    runner = runner
        .with_closer(move || async move {
            info!("Running cleanup tasks...");
            postgres_client.close();

            // Flush pending traces and logs
            shutdown_telemetry(telemetry_providers);

            info!("Cleanup complete");
            Ok(())
        })
        .with_closer_timeout(Duration::from_secs(10));

    runner.run().await;
}

async fn connect_postgres(config: &ServiceConfig) -> anyhow::Result<PostgresClient> {
    info!("Initializing PostgreSQL...");
    let client = PostgresClient::new(&config.postgres())?;
    client
        .ping_with_timeout(Duration::from_secs(config.startup_timeout_secs))
        .await?;
    info!("PostgreSQL connection established");
    Ok(client)
}
