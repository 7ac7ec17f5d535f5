use crate::domain::DecisionService;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::routing::post;
use axum::{Json, Router};
use bytes::Bytes;
use common::domain::{DecisionRecord, DecisionRequestContext};
use common::http::ApiError;
use std::sync::Arc;
use tracing::{error, warn};

/// Largest accepted request body for a decision upload
pub const MAX_DECISION_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Routes for the decision endpoint: `POST /api/v1/decisions/recognize`
///
/// Multipart fields: `metadata` (JSON request context) and `image` (file).
pub fn decision_routes(service: Arc<DecisionService>) -> Router {
    Router::new()
        .route("/api/v1/decisions/recognize", post(handle_decision))
        .layer(DefaultBodyLimit::max(MAX_DECISION_BODY_BYTES))
        .with_state(service)
}

async fn handle_decision(
    State(service): State<Arc<DecisionService>>,
    mut multipart: Multipart,
) -> Result<Json<DecisionRecord>, ApiError> {
    let mut metadata: Option<String> = None;
    let mut image: Option<Bytes> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("invalid multipart body: {}", e)))?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("metadata") => {
                metadata = Some(field.text().await.map_err(|e| {
                    ApiError::bad_request(format!("failed to read metadata: {}", e))
                })?);
            }
            Some("image") => {
                image = Some(field.bytes().await.map_err(|e| {
                    ApiError::bad_request(format!("failed to read image: {}", e))
                })?);
            }
            _ => {}
        }
    }

    let metadata = metadata
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("metadata is required"))?;
    let context: DecisionRequestContext = serde_json::from_str(&metadata).map_err(|e| {
        warn!(error = %e, "rejecting decision request with invalid metadata");
        ApiError::bad_request("invalid metadata JSON")
    })?;

    let image = image
        .filter(|i| !i.is_empty())
        .ok_or_else(|| ApiError::bad_request("image file is required"))?;

    let decision = service
        .process_decision(image, context)
        .await
        .map_err(|e| {
            error!(error = %e, "decision request failed");
            ApiError::from(e)
        })?;

    Ok(Json(decision))
}
