use crate::domain::{
    DomainError, DomainResult, StatusRecord, TelemetryHistoryEntry, VehicleStatusRepository,
};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use tokio_postgres::types::Json;
use tracing::{debug, instrument, warn};

/// PostgreSQL implementation of VehicleStatusRepository
///
/// Expects `vehicles (id, current_status jsonb)` and
/// `vehicle_telemetry (vehicle_id, "timestamp", latitude, longitude, battery, state)`.
#[derive(Clone)]
pub struct PostgresVehicleStatusRepository {
    client: PostgresClient,
}

impl PostgresVehicleStatusRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl VehicleStatusRepository for PostgresVehicleStatusRepository {
    #[instrument(skip_all, fields(vehicle_id = %vehicle_id))]
    async fn update_current_status(
        &self,
        vehicle_id: &str,
        status: &StatusRecord,
    ) -> DomainResult<()> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let updated = conn
            .execute(
                "UPDATE vehicles SET current_status = $1 WHERE id = $2",
                &[&Json(status), &vehicle_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        if updated == 0 {
            // Unknown vehicles still get history rows
            warn!("status update matched no vehicle row");
        } else {
            debug!("updated current status");
        }

        Ok(())
    }

    #[instrument(skip_all, fields(vehicle_id = %entry.vehicle_id))]
    async fn append_history_entry(&self, entry: &TelemetryHistoryEntry) -> DomainResult<()> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        conn.execute(
            "INSERT INTO vehicle_telemetry (vehicle_id, \"timestamp\", latitude, longitude, battery, state)
             VALUES ($1, $2, $3, $4, $5, $6)",
            &[
                &entry.vehicle_id,
                &entry.recorded_at,
                &entry.latitude,
                &entry.longitude,
                &entry.battery,
                &entry.state,
            ],
        )
        .await
        .map_err(|e| DomainError::RepositoryError(e.into()))?;

        debug!("appended telemetry history entry");
        Ok(())
    }
}
