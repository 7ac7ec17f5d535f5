//! Reusable HTTP server with request tracing and optional CORS.
//!
//! # Example
//!
//! ```ignore
//! use common::http::{run_http_server, HttpServerConfig};
//!
//! let router = axum::Router::new()
//!     .merge(telemetry_routes)
//!     .merge(decision_routes);
//!
//! run_http_server(HttpServerConfig::default(), router, cancellation_token).await?;
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use http::{header, Method};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::debug;

/// Configuration for the HTTP server.
#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    /// Server host address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Allowed CORS origins; `None` disables the CORS layer.
    pub cors_allowed_origins: Option<Vec<String>>,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8888,
            cors_allowed_origins: None,
        }
    }
}

/// Split a comma-separated origin list, dropping blanks.
pub fn parse_origin_list(origins: &str) -> Vec<String> {
    origins
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let allow_origin = if allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            allowed_origins
                .iter()
                .filter_map(|origin| origin.parse().ok()),
        )
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(Duration::from_secs(3600))
}

/// Serve `router` until `cancellation_token` is cancelled.
///
/// Always applies request tracing; applies CORS when origins are configured.
pub async fn run_http_server(
    config: HttpServerConfig,
    router: Router,
    cancellation_token: CancellationToken,
) -> Result<(), anyhow::Error> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("invalid server address {}:{}", config.host, config.port))?;

    let mut router = router.layer(TraceLayer::new_for_http());
    if let Some(origins) = config.cors_allowed_origins.as_deref() {
        router = router.layer(build_cors_layer(origins));
    }

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind HTTP listener on {}", addr))?;

    debug!(address = %addr, "Starting HTTP server");

    let serve = axum::serve(listener, router).with_graceful_shutdown(async move {
        cancellation_token.cancelled().await;
        debug!("HTTP server shutdown signal received");
    });

    match serve.await {
        Ok(()) => {
            debug!("HTTP server stopped gracefully");
            Ok(())
        }
        Err(e) => {
            tracing::error!("HTTP server error: {}", e);
            Err(e.into())
        }
    }
}
