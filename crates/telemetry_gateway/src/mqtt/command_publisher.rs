use crate::mqtt::command_topic;
use async_trait::async_trait;
use common::domain::{CommandPublisher, DomainError, DomainResult, VehicleCommand};
use rumqttc::{AsyncClient, QoS};
use tracing::{debug, instrument};

/// Publishes commands at QoS 1 through the client shared with status ingestion.
///
/// Commands are queued on the client without waiting for the broker, so a
/// disconnected broker delays delivery rather than failing the request. A full
/// client queue is reported as [`DomainError::CommandPublishError`].
#[derive(Clone)]
pub struct MqttCommandPublisher {
    client: AsyncClient,
    topic_prefix: String,
}

impl MqttCommandPublisher {
    pub fn new(client: AsyncClient, topic_prefix: impl Into<String>) -> Self {
        Self {
            client,
            topic_prefix: topic_prefix.into(),
        }
    }
}

#[async_trait]
impl CommandPublisher for MqttCommandPublisher {
    #[instrument(skip_all, fields(vehicle_id = %vehicle_id, command_id = %command.command_id))]
    async fn publish_command(
        &self,
        vehicle_id: &str,
        command: &VehicleCommand,
    ) -> DomainResult<()> {
        let topic = command_topic(&self.topic_prefix, vehicle_id);
        let payload = serde_json::to_vec(command)
            .map_err(|e| DomainError::CommandPublishError(e.to_string()))?;

        self.client
            .try_publish(&topic, QoS::AtLeastOnce, false, payload)
            .map_err(|e| DomainError::CommandPublishError(format!("{}: {}", topic, e)))?;

        debug!(topic = %topic, "command queued on MQTT client");
        Ok(())
    }
}
