use crate::domain::{DecisionService, DecisionServiceConfig};
use crate::http::decision_routes;
use axum::Router;
use common::domain::{ArtifactStore, DeadLetterQueue, DecisionRepository, ImageRecognizer};
use std::sync::Arc;
use tracing::debug;

/// Collaborators the decision worker is built from
pub struct DecisionWorkerDeps {
    pub recognizer: Arc<dyn ImageRecognizer>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub repository: Arc<dyn DecisionRepository>,
    pub dead_letters: Arc<dyn DeadLetterQueue>,
}

/// Exposes the decision endpoint and owns its background work.
pub struct DecisionWorker {
    service: Arc<DecisionService>,
}

impl DecisionWorker {
    pub fn new(config: DecisionServiceConfig, deps: DecisionWorkerDeps) -> Self {
        debug!(bucket = %config.artifact_bucket, "initializing decision worker module");

        let service = Arc::new(DecisionService::new(
            deps.recognizer,
            deps.artifacts,
            deps.repository,
            deps.dead_letters,
            config,
        ));

        Self { service }
    }

    /// Service handle, kept by callers that need to drain it on shutdown
    pub fn service(&self) -> Arc<DecisionService> {
        Arc::clone(&self.service)
    }

    pub fn router(&self) -> Router {
        decision_routes(Arc::clone(&self.service))
    }
}
