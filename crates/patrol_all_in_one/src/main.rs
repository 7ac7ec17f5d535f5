mod config;

use anyhow::Context;
use axum::Router;
use common::domain::{ImageRecognizer, VehicleStatusRepository};
use common::http::run_http_server;
use common::nats::{NatsArtifactStore, NatsClient};
use common::postgres::{
    PostgresClient, PostgresDecisionRepository, PostgresVehicleStatusRepository,
};
use common::telemetry::{init_telemetry, shutdown_telemetry, TelemetryProviders};
use config::ServiceConfig;
use decision_worker::dead_letter::FileDeadLetterQueue;
use decision_worker::inference::{HttpImageRecognizer, StubImageRecognizer};
use decision_worker::{DecisionWorker, DecisionWorkerDeps};
use patrol_runner::Runner;
use std::sync::Arc;
use telemetry_gateway::{TelemetryGateway, TelemetryGatewayConfig};
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() {
    // Initialize configuration and tracing
    let config = match ServiceConfig::from_env().and_then(|cfg| cfg.validate().map(|_| cfg)) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let telemetry_providers: Option<TelemetryProviders> =
        match init_telemetry(&config.telemetry_config()) {
            Ok(providers) => providers,
            Err(e) => {
                eprintln!("Failed to initialize telemetry: {}", e);
                std::process::exit(1);
            }
        };

    info!(
        otel_enabled = config.otel_enabled,
        otel_endpoint = %config.otel_endpoint,
        "Starting patrol-all-in-one service"
    );
    debug!("Configuration: {:?}", config);

    let deps = match initialize_shared_dependencies(&config).await {
        Ok(deps) => deps,
        Err(e) => {
            error!("Failed to initialize shared dependencies: {:#}", e);
            shutdown_telemetry(telemetry_providers);
            std::process::exit(1);
        }
    };

    let recognizer = match create_recognizer(&config) {
        Ok(recognizer) => recognizer,
        Err(e) => {
            error!("Failed to initialize recognizer: {:#}", e);
            shutdown_telemetry(telemetry_providers);
            std::process::exit(1);
        }
    };

    // Telemetry gateway: MQTT ingestion and commands, broadcast hub, observer websocket
    let telemetry_gateway = match TelemetryGateway::new(
        TelemetryGatewayConfig {
            hub: config.hub_config(),
            mqtt: config.mqtt_config(),
            allowed_origins: config.ws_allowed_origins(),
        },
        deps.vehicle_status,
    ) {
        Ok(gateway) => gateway,
        Err(e) => {
            error!("Failed to initialize telemetry gateway: {}", e);
            shutdown_telemetry(telemetry_providers);
            std::process::exit(1);
        }
    };

    // Decision worker: recognition, artifact upload, decision log, dead letters
    let decision_worker = DecisionWorker::new(
        config.decision_config(),
        DecisionWorkerDeps {
            recognizer,
            artifacts: deps.artifacts,
            repository: deps.decisions,
            dead_letters: Arc::new(FileDeadLetterQueue::new(&config.dead_letter_path)),
        },
    );

    let router = Router::new()
        .merge(telemetry_gateway.router())
        .merge(decision_worker.router());
    let http_config = config.http_server_config();

    let ingestion = telemetry_gateway.ingestion();
    let decisions = decision_worker.service();
    let gateway_processes = telemetry_gateway.into_runner_processes();
    let nats_client = deps.nats;

    let runner = Runner::new()
        .with_named_process("broadcast_hub", gateway_processes.broadcast_hub)
        .with_named_process("mqtt_ingestion", gateway_processes.mqtt_ingestion)
        .with_named_process("http_server", move |ctx| async move {
            run_http_server(http_config, router, ctx).await
        })
        .with_closer(move || async move {
            info!("Running cleanup tasks...");
            // Background work must finish before telemetry is flushed
            ingestion.drain().await;
            decisions.drain().await;

            if let Err(e) = nats_client.close().await {
                warn!(error = %e, "failed to close NATS connection");
            }

            shutdown_telemetry(telemetry_providers);
            Ok(())
        })
        .with_closer_timeout(config.shutdown_timeout());

    // Telemetry is already flushed by the closer at this point
    if let Err(e) = runner.run().await {
        eprintln!("patrol-all-in-one stopped with error: {:#}", e);
        std::process::exit(1);
    }
}

struct SharedDependencies {
    vehicle_status: Arc<dyn VehicleStatusRepository>,
    decisions: Arc<PostgresDecisionRepository>,
    artifacts: Arc<NatsArtifactStore>,
    nats: Arc<NatsClient>,
}

async fn initialize_shared_dependencies(
    config: &ServiceConfig,
) -> anyhow::Result<SharedDependencies> {
    // PostgreSQL initialization
    info!("Initializing PostgreSQL...");
    let postgres_client = PostgresClient::new(&config.postgres_config())?;
    tokio::time::timeout(config.startup_timeout(), postgres_client.ping())
        .await
        .context("Timed out connecting to PostgreSQL")?
        .context("Failed to connect to PostgreSQL")?;

    // NATS initialization
    info!("Initializing NATS...");
    let nats_client =
        Arc::new(NatsClient::connect(&config.nats_url, config.startup_timeout()).await?);
    let artifacts = Arc::new(NatsArtifactStore::new(nats_client.jetstream().clone()));

    Ok(SharedDependencies {
        vehicle_status: Arc::new(PostgresVehicleStatusRepository::new(
            postgres_client.clone(),
        )),
        decisions: Arc::new(PostgresDecisionRepository::new(postgres_client)),
        artifacts,
        nats: nats_client,
    })
}

fn create_recognizer(config: &ServiceConfig) -> anyhow::Result<Arc<dyn ImageRecognizer>> {
    match config.inference_url() {
        Some(url) => {
            info!(inference_url = %url, "Using remote inference service");
            Ok(Arc::new(HttpImageRecognizer::new(url, config.inference_timeout())?))
        }
        None => {
            warn!("No inference URL configured, using stub recognizer");
            Ok(Arc::new(StubImageRecognizer::new()))
        }
    }
}
