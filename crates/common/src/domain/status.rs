use crate::domain::result::{DomainError, DomainResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Geographic position reported by a vehicle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lng: f64,
}

/// Status snapshot reported by a vehicle on `<prefix>/<vehicle_id>/status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    /// Capture time in epoch seconds
    pub timestamp: i64,
    pub position: Position,
    /// Battery level, 0-100
    pub battery: f64,
    pub state: String,
}

/// Status record tagged with the vehicle it came from.
///
/// Serializes flat, which is the message shape pushed to observers:
/// `{"vehicle_id": ..., "timestamp": ..., "position": {...}, "battery": ..., "state": ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryUpdate {
    pub vehicle_id: String,
    #[serde(flatten)]
    pub status: StatusRecord,
}

impl TelemetryUpdate {
    pub fn new(vehicle_id: impl Into<String>, status: StatusRecord) -> Self {
        Self {
            vehicle_id: vehicle_id.into(),
            status,
        }
    }
}

/// Row appended to the telemetry history for every accepted status
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryHistoryEntry {
    pub vehicle_id: String,
    pub recorded_at: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub battery: f64,
    pub state: String,
}

impl TelemetryHistoryEntry {
    /// Build a history entry from a decoded status.
    ///
    /// Fails when the reported timestamp is outside the range chrono can represent.
    pub fn from_status(vehicle_id: &str, status: &StatusRecord) -> DomainResult<Self> {
        let recorded_at = DateTime::from_timestamp(status.timestamp, 0).ok_or_else(|| {
            DomainError::MalformedPayload(format!(
                "timestamp {} is out of range",
                status.timestamp
            ))
        })?;

        Ok(Self {
            vehicle_id: vehicle_id.to_string(),
            recorded_at,
            latitude: status.position.lat,
            longitude: status.position.lng,
            battery: status.battery,
            state: status.state.clone(),
        })
    }
}

/// Persistence sink for vehicle status.
/// Infrastructure layer (e.g., common::postgres) implements this trait
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait VehicleStatusRepository: Send + Sync {
    /// Replace the vehicle's current status snapshot
    async fn update_current_status(&self, vehicle_id: &str, status: &StatusRecord)
        -> DomainResult<()>;

    /// Append one entry to the vehicle's telemetry history
    async fn append_history_entry(&self, entry: &TelemetryHistoryEntry) -> DomainResult<()>;
}
