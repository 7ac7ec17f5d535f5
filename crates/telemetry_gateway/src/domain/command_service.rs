use common::domain::{CommandPublisher, DomainError, DomainResult, VehicleCommand};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Issues commands to vehicles over the outbound command channel.
pub struct CommandService {
    publisher: Arc<dyn CommandPublisher>,
}

impl CommandService {
    pub fn new(publisher: Arc<dyn CommandPublisher>) -> Self {
        Self { publisher }
    }

    /// Queue `command` for `vehicle_id`.
    ///
    /// # Returns
    /// The generated command ID once the publisher has accepted the command.
    #[instrument(skip_all, fields(vehicle_id = %vehicle_id, command = %command))]
    pub async fn send_command(
        &self,
        vehicle_id: &str,
        command: &str,
        task_id: Option<String>,
    ) -> DomainResult<String> {
        validate_vehicle_id(vehicle_id)?;
        if command.trim().is_empty() {
            return Err(DomainError::ValidationError(
                "command is required".to_string(),
            ));
        }

        let command = VehicleCommand {
            command_id: Uuid::new_v4().to_string(),
            command: command.to_string(),
            task_id: task_id.filter(|t| !t.is_empty()),
        };

        self.publisher.publish_command(vehicle_id, &command).await?;

        info!(command_id = %command.command_id, "command queued");
        Ok(command.command_id)
    }
}

/// Vehicle IDs become a topic level, so MQTT separators and wildcards are refused
fn validate_vehicle_id(vehicle_id: &str) -> DomainResult<()> {
    if vehicle_id.trim().is_empty() {
        return Err(DomainError::ValidationError(
            "vehicle_id is required".to_string(),
        ));
    }
    if vehicle_id.contains(&['/', '+', '#'][..]) {
        return Err(DomainError::ValidationError(format!(
            "vehicle_id '{}' contains a topic separator or wildcard",
            vehicle_id
        )));
    }
    Ok(())
}
