use crate::domain::{
    DecisionRecord, DecisionRepository, DecisionRequestContext, DomainError, DomainResult,
};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use tokio_postgres::types::Json;
use tracing::{debug, instrument};

/// PostgreSQL implementation of DecisionRepository
///
/// Expects `decision_logs (id, vehicle_id, image_url, server_decision jsonb, request_metadata jsonb)`.
#[derive(Clone)]
pub struct PostgresDecisionRepository {
    client: PostgresClient,
}

impl PostgresDecisionRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DecisionRepository for PostgresDecisionRepository {
    #[instrument(skip_all, fields(decision_id = %decision.id, vehicle_id = %context.vehicle_id))]
    async fn persist(
        &self,
        decision: &DecisionRecord,
        artifact_url: &str,
        context: &DecisionRequestContext,
    ) -> DomainResult<()> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        conn.execute(
            "INSERT INTO decision_logs (id, vehicle_id, image_url, server_decision, request_metadata)
             VALUES ($1, $2, $3, $4, $5)",
            &[
                &decision.id,
                &context.vehicle_id,
                &artifact_url,
                &Json(decision),
                &Json(context),
            ],
        )
        .await
        .map_err(|e| DomainError::RepositoryError(e.into()))?;

        debug!("persisted decision log");
        Ok(())
    }
}
