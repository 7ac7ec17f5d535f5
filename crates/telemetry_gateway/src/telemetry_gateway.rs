use crate::command_routes;
use crate::domain::{CommandService, StatusIngestionService};
use crate::hub::{BroadcastHub, HubConfig, HubHandle};
use crate::mqtt::{mqtt_connection, run_mqtt_subscriber, MqttCommandPublisher, MqttSubscriberConfig};
use crate::ws::telemetry_routes;
use axum::Router;
use common::domain::{DomainResult, VehicleStatusRepository};
use rumqttc::{AsyncClient, EventLoop};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Long-running unit handed to the process runner
pub type RunnerProcess = Box<
    dyn FnOnce(CancellationToken) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>
        + Send,
>;

pub struct TelemetryGatewayConfig {
    pub hub: HubConfig,
    pub mqtt: MqttSubscriberConfig,
    pub allowed_origins: Vec<String>,
}

/// Wires MQTT ingestion, vehicle commands, the broadcast hub and the observer
/// websocket route. Ingestion and commands share one MQTT client.
pub struct TelemetryGateway {
    hub: BroadcastHub,
    hub_handle: HubHandle,
    ingestion: Arc<StatusIngestionService>,
    commands: Arc<CommandService>,
    mqtt_config: MqttSubscriberConfig,
    mqtt_client: AsyncClient,
    mqtt_eventloop: EventLoop,
    allowed_origins: Vec<String>,
}

/// Processes produced by [`TelemetryGateway::into_runner_processes`]
pub struct TelemetryGatewayProcesses {
    pub broadcast_hub: RunnerProcess,
    pub mqtt_ingestion: RunnerProcess,
}

impl TelemetryGateway {
    /// Fails only on an unusable broker URL; no connection is attempted here.
    pub fn new(
        config: TelemetryGatewayConfig,
        repository: Arc<dyn VehicleStatusRepository>,
    ) -> DomainResult<Self> {
        debug!("initializing telemetry gateway module");

        let (hub, hub_handle) = BroadcastHub::new(config.hub);
        let ingestion = Arc::new(StatusIngestionService::new(hub_handle.clone(), repository));

        let (mqtt_client, mqtt_eventloop) = mqtt_connection(&config.mqtt)?;
        let publisher = MqttCommandPublisher::new(mqtt_client.clone(), &config.mqtt.topic_prefix);
        let commands = Arc::new(CommandService::new(Arc::new(publisher)));

        Ok(Self {
            hub,
            hub_handle,
            ingestion,
            commands,
            mqtt_config: config.mqtt,
            mqtt_client,
            mqtt_eventloop,
            allowed_origins: config.allowed_origins,
        })
    }

    pub fn hub_handle(&self) -> HubHandle {
        self.hub_handle.clone()
    }

    /// Ingestion service, kept by callers that need to drain it on shutdown
    pub fn ingestion(&self) -> Arc<StatusIngestionService> {
        Arc::clone(&self.ingestion)
    }

    pub fn commands(&self) -> Arc<CommandService> {
        Arc::clone(&self.commands)
    }

    pub fn router(&self) -> Router {
        telemetry_routes(self.hub_handle.clone(), self.allowed_origins.clone())
            .merge(command_routes(Arc::clone(&self.commands)))
    }

    pub fn into_runner_processes(self) -> TelemetryGatewayProcesses {
        let hub = self.hub;
        let ingestion = self.ingestion;
        let mqtt_config = self.mqtt_config;
        let mqtt_client = self.mqtt_client;
        let mqtt_eventloop = self.mqtt_eventloop;

        TelemetryGatewayProcesses {
            broadcast_hub: Box::new(move |ctx| Box::pin(async move { hub.run(ctx).await })),
            mqtt_ingestion: Box::new(move |ctx| {
                Box::pin(async move {
                    run_mqtt_subscriber(mqtt_config, mqtt_client, mqtt_eventloop, &ingestion, ctx)
                        .await
                })
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use common::domain::{DomainError, MockVehicleStatusRepository};
    use tower::ServiceExt;

    fn config(broker_url: &str) -> TelemetryGatewayConfig {
        TelemetryGatewayConfig {
            hub: HubConfig::default(),
            mqtt: MqttSubscriberConfig {
                broker_url: broker_url.to_string(),
                ..Default::default()
            },
            allowed_origins: vec!["*".to_string()],
        }
    }

    #[test]
    fn test_invalid_broker_url_is_rejected() {
        let result = TelemetryGateway::new(
            config("mqtt://broker:notaport"),
            Arc::new(MockVehicleStatusRepository::new()),
        );

        assert!(matches!(result, Err(DomainError::InvalidBrokerUrl(_))));
    }

    #[tokio::test]
    async fn test_router_queues_commands_on_shared_client() {
        let gateway = TelemetryGateway::new(
            config("mqtt://localhost:1883"),
            Arc::new(MockVehicleStatusRepository::new()),
        )
        .unwrap();

        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/commands/send")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"vehicle_id":"veh-1","command":"stop"}"#))
            .unwrap();

        let response = gateway.router().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }
}
