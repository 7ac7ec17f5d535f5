use crate::domain::CommandService;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use common::http::ApiError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, warn};

#[derive(Debug, Deserialize)]
pub struct SendCommandRequest {
    pub vehicle_id: String,
    pub command: String,
    #[serde(default)]
    pub task_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CommandAccepted {
    pub status: &'static str,
    pub command_id: String,
}

/// Routes for vehicle commands: `POST /api/v1/commands/send`
///
/// Replies `202 Accepted` once the command is queued for delivery.
pub fn command_routes(service: Arc<CommandService>) -> Router {
    Router::new()
        .route("/api/v1/commands/send", post(handle_send_command))
        .with_state(service)
}

async fn handle_send_command(
    State(service): State<Arc<CommandService>>,
    request: Result<Json<SendCommandRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CommandAccepted>), ApiError> {
    let Json(request) = request.map_err(|rejection| {
        warn!(error = %rejection, "rejecting malformed command request");
        ApiError::bad_request(rejection.body_text())
    })?;

    let command_id = service
        .send_command(&request.vehicle_id, &request.command, request.task_id)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to send command");
            ApiError::from(e)
        })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(CommandAccepted {
            status: "queued",
            command_id,
        }),
    ))
}
