use bytes::Bytes;
use common::domain::{
    ArtifactStore, DeadLetterQueue, DecisionRecord, DecisionRepository, DecisionRequestContext,
    DomainError, DomainResult, FailedDecisionTask, ImageRecognizer,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument, Span};

const ARTIFACT_CONTENT_TYPE: &str = "image/jpeg";

#[derive(Debug, Clone)]
pub struct DecisionServiceConfig {
    /// Object store bucket for decision images
    pub artifact_bucket: String,
    /// Upper bound on the synchronous recognition call
    pub inference_timeout: Duration,
}

impl Default for DecisionServiceConfig {
    fn default() -> Self {
        Self {
            artifact_bucket: "decisions".to_string(),
            inference_timeout: Duration::from_secs(30),
        }
    }
}

/// Orchestrates a recognition request.
///
/// Recognition runs inline and is the only caller-visible failure. Artifact
/// upload and persistence run afterwards in a tracked background task with
/// the dead-letter queue as the fallback when persistence fails.
pub struct DecisionService {
    recognizer: Arc<dyn ImageRecognizer>,
    artifacts: Arc<dyn ArtifactStore>,
    repository: Arc<dyn DecisionRepository>,
    dead_letters: Arc<dyn DeadLetterQueue>,
    config: DecisionServiceConfig,
    tracker: TaskTracker,
}

impl DecisionService {
    pub fn new(
        recognizer: Arc<dyn ImageRecognizer>,
        artifacts: Arc<dyn ArtifactStore>,
        repository: Arc<dyn DecisionRepository>,
        dead_letters: Arc<dyn DeadLetterQueue>,
        config: DecisionServiceConfig,
    ) -> Self {
        Self {
            recognizer,
            artifacts,
            repository,
            dead_letters,
            config,
            tracker: TaskTracker::new(),
        }
    }

    /// Recognize `image` and return the decision without waiting for upload or persistence.
    #[instrument(
        skip_all,
        fields(
            vehicle_id = %context.vehicle_id,
            image_size = image.len(),
            decision_id = tracing::field::Empty,
        )
    )]
    pub async fn process_decision(
        &self,
        image: Bytes,
        context: DecisionRequestContext,
    ) -> DomainResult<DecisionRecord> {
        let recognition = tokio::time::timeout(
            self.config.inference_timeout,
            self.recognizer.recognize(image.clone()),
        )
        .await;

        let mut decision = match recognition {
            Ok(Ok(decision)) => decision,
            Ok(Err(e)) => {
                error!(error = %e, "recognition failed");
                return Err(e);
            }
            Err(_) => {
                error!(timeout = ?self.config.inference_timeout, "recognition timed out");
                return Err(DomainError::InferenceTimeout(self.config.inference_timeout));
            }
        };

        decision.ensure_id();
        Span::current().record("decision_id", decision.id.as_str());
        debug!(action = %decision.action, confidence = decision.confidence, "decision made");

        self.spawn_upload_and_log(decision.clone(), image, context);

        Ok(decision)
    }

    fn spawn_upload_and_log(
        &self,
        decision: DecisionRecord,
        image: Bytes,
        context: DecisionRequestContext,
    ) {
        let span = info_span!(
            "log_decision",
            decision_id = %decision.id,
            vehicle_id = %context.vehicle_id,
        );

        self.tracker.spawn(
            upload_and_log(
                Arc::clone(&self.artifacts),
                Arc::clone(&self.repository),
                Arc::clone(&self.dead_letters),
                self.config.artifact_bucket.clone(),
                decision,
                image,
                context,
            )
            .instrument(span),
        );
    }

    /// Wait for in-flight background tasks, including any spawned while
    /// draining.
    pub async fn drain(&self) {
        self.tracker.close();
        debug!(in_flight = self.tracker.len(), "draining decision background tasks");
        self.tracker.wait().await;
    }
}

async fn upload_and_log(
    artifacts: Arc<dyn ArtifactStore>,
    repository: Arc<dyn DecisionRepository>,
    dead_letters: Arc<dyn DeadLetterQueue>,
    bucket: String,
    decision: DecisionRecord,
    image: Bytes,
    context: DecisionRequestContext,
) {
    let object_name = format!("{}.jpg", decision.id);

    let image_url = match artifacts
        .upload(&bucket, &object_name, image, ARTIFACT_CONTENT_TYPE)
        .await
    {
        Ok(url) => url,
        Err(e) => {
            // Persist anyway, without an artifact reference
            error!(error = %e, "background task failed: image upload");
            String::new()
        }
    };

    if let Err(e) = repository.persist(&decision, &image_url, &context).await {
        error!(error = %e, "background task failed: log decision");

        let task = FailedDecisionTask {
            result: decision,
            image_url,
            metadata: context,
        };

        match dead_letters.append(&task).await {
            Ok(()) => warn!("failed decision written to dead-letter queue"),
            Err(dlq_err) => error!(
                data_loss = true,
                error = %dlq_err,
                "CRITICAL: could not write failed decision to dead-letter queue, record lost"
            ),
        }
        return;
    }

    info!("background task complete: decision logged");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dead_letter::FileDeadLetterQueue;
    use async_trait::async_trait;
    use common::domain::{
        MockArtifactStore, MockDeadLetterQueue, MockDecisionRepository, MockImageRecognizer,
    };
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Notify;

    fn context() -> DecisionRequestContext {
        DecisionRequestContext {
            vehicle_id: "veh-1".to_string(),
            timestamp: 1_700_000_000,
        }
    }

    fn decision(id: &str) -> DecisionRecord {
        DecisionRecord {
            id: id.to_string(),
            action: "pickup".to_string(),
            confidence: 0.95,
            reason: Some("is_trash_type_A".to_string()),
        }
    }

    fn recognizer_returning(id: &'static str) -> MockImageRecognizer {
        let mut recognizer = MockImageRecognizer::new();
        recognizer
            .expect_recognize()
            .times(1)
            .returning(move |_| Ok(decision(id)));
        recognizer
    }

    fn service(
        recognizer: impl ImageRecognizer + 'static,
        artifacts: impl ArtifactStore + 'static,
        repository: impl DecisionRepository + 'static,
        dead_letters: impl DeadLetterQueue + 'static,
    ) -> DecisionService {
        DecisionService::new(
            Arc::new(recognizer),
            Arc::new(artifacts),
            Arc::new(repository),
            Arc::new(dead_letters),
            DecisionServiceConfig {
                artifact_bucket: "decisions".to_string(),
                inference_timeout: Duration::from_millis(200),
            },
        )
    }

    /// Repository that blocks until released
    struct GatedRepository {
        gate: Arc<Notify>,
        persisted: Arc<AtomicBool>,
    }

    #[async_trait]
    impl DecisionRepository for GatedRepository {
        async fn persist(
            &self,
            _decision: &DecisionRecord,
            _artifact_url: &str,
            _context: &DecisionRequestContext,
        ) -> DomainResult<()> {
            self.gate.notified().await;
            self.persisted.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Artifact store that takes a while
    struct SlowArtifactStore;

    #[async_trait]
    impl ArtifactStore for SlowArtifactStore {
        async fn upload(
            &self,
            bucket: &str,
            name: &str,
            _content: Bytes,
            _content_type: &str,
        ) -> DomainResult<String> {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(format!("nats-object://{}/{}", bucket, name))
        }
    }

    struct SlowRecognizer;

    #[async_trait]
    impl ImageRecognizer for SlowRecognizer {
        async fn recognize(&self, _image: Bytes) -> DomainResult<DecisionRecord> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(decision("late"))
        }
    }

    #[tokio::test]
    async fn test_returns_before_background_work_completes() {
        let gate = Arc::new(Notify::new());
        let persisted = Arc::new(AtomicBool::new(false));

        let mut dead_letters = MockDeadLetterQueue::new();
        dead_letters.expect_append().times(0);

        let service = service(
            recognizer_returning("abc"),
            SlowArtifactStore,
            GatedRepository {
                gate: Arc::clone(&gate),
                persisted: Arc::clone(&persisted),
            },
            dead_letters,
        );

        let result = service
            .process_decision(Bytes::from_static(b"jpeg"), context())
            .await
            .unwrap();

        assert_eq!(result.id, "abc");
        assert!(!persisted.load(Ordering::SeqCst));

        // notify_one stores a permit if persist is not waiting yet
        gate.notify_one();
        service.drain().await;
        assert!(persisted.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_missing_id_is_generated() {
        let mut recognizer = MockImageRecognizer::new();
        recognizer
            .expect_recognize()
            .returning(|_| Ok(decision("")));

        let mut artifacts = MockArtifactStore::new();
        artifacts
            .expect_upload()
            .withf(|bucket, name, _, content_type| {
                bucket == "decisions" && name.ends_with(".jpg") && content_type == "image/jpeg"
            })
            .times(1)
            .returning(|bucket, name, _, _| Ok(format!("nats-object://{}/{}", bucket, name)));

        let mut repository = MockDecisionRepository::new();
        repository
            .expect_persist()
            .withf(|decision, url, _| url == format!("nats-object://decisions/{}.jpg", decision.id))
            .times(1)
            .returning(|_, _, _| Ok(()));

        let service = service(recognizer, artifacts, repository, MockDeadLetterQueue::new());

        let result = service
            .process_decision(Bytes::from_static(b"jpeg"), context())
            .await
            .unwrap();

        assert!(!result.id.is_empty());
        service.drain().await;
    }

    #[tokio::test]
    async fn test_persistence_failure_writes_dead_letter_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("failed_tasks.log");

        let mut artifacts = MockArtifactStore::new();
        artifacts
            .expect_upload()
            .returning(|_, _, _, _| Ok("nats-object://decisions/abc.jpg".to_string()));

        let mut repository = MockDecisionRepository::new();
        repository
            .expect_persist()
            .times(1)
            .returning(|_, _, _| Err(DomainError::RepositoryError(anyhow::anyhow!("db down"))));

        let service = service(
            recognizer_returning("abc"),
            artifacts,
            repository,
            FileDeadLetterQueue::new(&path),
        );

        service
            .process_decision(Bytes::from_static(b"jpeg"), context())
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(2), service.drain())
            .await
            .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("\"image_id\":\"abc\""));

        let task: FailedDecisionTask = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(task.result.id, "abc");
        assert_eq!(task.image_url, "nats-object://decisions/abc.jpg");
        assert_eq!(task.metadata, context());
    }

    #[tokio::test]
    async fn test_upload_failure_persists_with_empty_url() {
        let mut artifacts = MockArtifactStore::new();
        artifacts
            .expect_upload()
            .times(1)
            .returning(|_, _, _, _| Err(DomainError::UploadError("bucket offline".to_string())));

        let mut repository = MockDecisionRepository::new();
        repository
            .expect_persist()
            .withf(|decision, url, context| {
                decision.id == "abc" && url.is_empty() && context.vehicle_id == "veh-1"
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let mut dead_letters = MockDeadLetterQueue::new();
        dead_letters.expect_append().times(0);

        let service = service(recognizer_returning("abc"), artifacts, repository, dead_letters);

        service
            .process_decision(Bytes::from_static(b"jpeg"), context())
            .await
            .unwrap();
        service.drain().await;
    }

    #[tokio::test]
    async fn test_upload_and_persist_failure_dead_letters_empty_url() {
        let mut artifacts = MockArtifactStore::new();
        artifacts
            .expect_upload()
            .returning(|_, _, _, _| Err(DomainError::UploadError("bucket offline".to_string())));

        let mut repository = MockDecisionRepository::new();
        repository
            .expect_persist()
            .returning(|_, _, _| Err(DomainError::RepositoryError(anyhow::anyhow!("db down"))));

        let mut dead_letters = MockDeadLetterQueue::new();
        dead_letters
            .expect_append()
            .withf(|task: &FailedDecisionTask| task.result.id == "abc" && task.image_url.is_empty())
            .times(1)
            .returning(|_| Ok(()));

        let service = service(recognizer_returning("abc"), artifacts, repository, dead_letters);

        service
            .process_decision(Bytes::from_static(b"jpeg"), context())
            .await
            .unwrap();
        service.drain().await;
    }

    #[tokio::test]
    async fn test_dead_letter_failure_is_contained() {
        let mut artifacts = MockArtifactStore::new();
        artifacts
            .expect_upload()
            .returning(|_, _, _, _| Ok("nats-object://decisions/abc.jpg".to_string()));

        let mut repository = MockDecisionRepository::new();
        repository
            .expect_persist()
            .returning(|_, _, _| Err(DomainError::RepositoryError(anyhow::anyhow!("db down"))));

        let mut dead_letters = MockDeadLetterQueue::new();
        dead_letters
            .expect_append()
            .times(1)
            .returning(|_| Err(DomainError::DeadLetterError("disk full".to_string())));

        let service = service(recognizer_returning("abc"), artifacts, repository, dead_letters);

        let result = service
            .process_decision(Bytes::from_static(b"jpeg"), context())
            .await;

        assert!(result.is_ok());
        service.drain().await;
    }

    #[tokio::test]
    async fn test_inference_failure_skips_background_work() {
        let mut recognizer = MockImageRecognizer::new();
        recognizer
            .expect_recognize()
            .returning(|_| Err(DomainError::InferenceError("model crashed".to_string())));

        let mut artifacts = MockArtifactStore::new();
        artifacts.expect_upload().times(0);
        let mut repository = MockDecisionRepository::new();
        repository.expect_persist().times(0);

        let service = service(recognizer, artifacts, repository, MockDeadLetterQueue::new());

        let result = service
            .process_decision(Bytes::from_static(b"jpeg"), context())
            .await;

        assert!(matches!(result, Err(DomainError::InferenceError(_))));
        service.drain().await;
    }

    #[tokio::test]
    async fn test_inference_timeout() {
        let mut artifacts = MockArtifactStore::new();
        artifacts.expect_upload().times(0);

        let service = service(
            SlowRecognizer,
            artifacts,
            MockDecisionRepository::new(),
            MockDeadLetterQueue::new(),
        );

        let result = service
            .process_decision(Bytes::from_static(b"jpeg"), context())
            .await;

        assert!(matches!(result, Err(DomainError::InferenceTimeout(_))));
    }
}
