use crate::hub::{run_observer_session, HubHandle};
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures::StreamExt;
use std::sync::Arc;
use tracing::{error, warn};
use uuid::Uuid;

#[derive(Clone)]
struct TelemetryWsState {
    hub: HubHandle,
    allowed_origins: Arc<Vec<String>>,
}

/// Routes for live telemetry observers: `GET /ws/telemetry`
///
/// `allowed_origins` containing `*` accepts any origin. Requests without an
/// `Origin` header (non-browser clients) are always accepted.
pub fn telemetry_routes(hub: HubHandle, allowed_origins: Vec<String>) -> Router {
    Router::new()
        .route("/ws/telemetry", get(telemetry_ws_handler))
        .with_state(TelemetryWsState {
            hub,
            allowed_origins: Arc::new(allowed_origins),
        })
}

async fn telemetry_ws_handler(
    State(state): State<TelemetryWsState>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok());

    if !origin_allowed(&state.allowed_origins, origin) {
        warn!(origin = ?origin, "rejecting telemetry websocket from disallowed origin");
        return (StatusCode::FORBIDDEN, "origin not allowed").into_response();
    }

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state.hub))
}

async fn handle_socket(socket: WebSocket, hub: HubHandle) {
    let (sink, stream) = socket.split();
    let observer_id = Uuid::new_v4();

    if let Err(e) = run_observer_session(hub, observer_id, sink, stream).await {
        error!(observer_id = %observer_id, error = %e, "observer session failed");
    }
}

fn origin_allowed(allowed: &[String], origin: Option<&str>) -> bool {
    match origin {
        None => true,
        Some(origin) => allowed
            .iter()
            .any(|candidate| candidate == "*" || candidate.eq_ignore_ascii_case(origin)),
    }
}
