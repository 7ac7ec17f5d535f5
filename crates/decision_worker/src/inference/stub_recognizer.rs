use async_trait::async_trait;
use bytes::Bytes;
use common::domain::{DecisionRecord, DomainResult, ImageRecognizer};
use tracing::debug;

/// Recognizer used when no inference endpoint is configured.
///
/// Always answers with a high-confidence `pickup` and leaves the ID unset.
#[derive(Debug, Default, Clone)]
pub struct StubImageRecognizer;

impl StubImageRecognizer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ImageRecognizer for StubImageRecognizer {
    async fn recognize(&self, image: Bytes) -> DomainResult<DecisionRecord> {
        debug!(image_size = image.len(), "stub recognizer called");

        Ok(DecisionRecord {
            id: String::new(),
            action: "pickup".to_string(),
            confidence: 0.95,
            reason: Some("is_trash_type_A (stubbed)".to_string()),
        })
    }
}
