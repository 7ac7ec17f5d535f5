use crate::decoder::decode_status;
use crate::hub::HubHandle;
use common::domain::{
    DomainResult, StatusRecord, TelemetryHistoryEntry, TelemetryUpdate, VehicleStatusRepository,
};
use std::sync::Arc;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, Instrument};

/// Dispatches decoded vehicle status to the broadcast hub and to persistence.
///
/// The two dispatches are independent: broadcasting happens inline and never
/// waits, persistence runs as a tracked background task so either can fail
/// without affecting the other.
pub struct StatusIngestionService {
    hub: HubHandle,
    repository: Arc<dyn VehicleStatusRepository>,
    tracker: TaskTracker,
}

impl StatusIngestionService {
    pub fn new(hub: HubHandle, repository: Arc<dyn VehicleStatusRepository>) -> Self {
        Self {
            hub,
            repository,
            tracker: TaskTracker::new(),
        }
    }

    /// Decode one status event and dispatch it.
    ///
    /// # Returns
    /// The vehicle ID on acceptance. Only malformed input is returned as an
    /// error; dispatch failures are logged where they happen.
    pub fn ingest(&self, topic: &str, payload: &[u8]) -> DomainResult<String> {
        let (vehicle_id, status) = decode_status(topic, payload)?;

        self.broadcast(&vehicle_id, &status);
        self.persist(vehicle_id.clone(), status);

        Ok(vehicle_id)
    }

    fn broadcast(&self, vehicle_id: &str, status: &StatusRecord) {
        let update = TelemetryUpdate::new(vehicle_id, status.clone());

        let message = match serde_json::to_string(&update) {
            Ok(message) => message,
            Err(e) => {
                error!(error = %e, "failed to serialize telemetry update");
                return;
            }
        };

        match self.hub.publish(message) {
            Ok(()) => debug!("telemetry update handed to hub"),
            Err(e) => error!(error = %e, "failed to publish telemetry update"),
        }
    }

    fn persist(&self, vehicle_id: String, status: StatusRecord) {
        let repository = Arc::clone(&self.repository);

        self.tracker.spawn(
            async move {
                if let Err(e) = repository
                    .update_current_status(&vehicle_id, &status)
                    .await
                {
                    error!(error = %e, "failed to update current vehicle status");
                }

                let entry = match TelemetryHistoryEntry::from_status(&vehicle_id, &status) {
                    Ok(entry) => entry,
                    Err(e) => {
                        error!(error = %e, "failed to build telemetry history entry");
                        return;
                    }
                };

                if let Err(e) = repository.append_history_entry(&entry).await {
                    error!(error = %e, "failed to append telemetry history entry");
                }
            }
            .in_current_span(),
        );
    }

    /// Wait for in-flight persistence tasks, including any spawned while
    /// draining.
    pub async fn drain(&self) {
        self.tracker.close();
        debug!(in_flight = self.tracker.len(), "draining status persistence tasks");
        self.tracker.wait().await;
    }
}
