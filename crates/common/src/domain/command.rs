use crate::domain::result::DomainResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Command delivered to a vehicle on `<prefix>/<vehicle_id>/command`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleCommand {
    pub command_id: String,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

/// Outbound channel to vehicles
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait CommandPublisher: Send + Sync {
    /// Queue `command` for delivery to `vehicle_id` at least once
    async fn publish_command(&self, vehicle_id: &str, command: &VehicleCommand)
        -> DomainResult<()>;
}
