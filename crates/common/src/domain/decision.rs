use crate::domain::result::DomainResult;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Result of recognizing one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    /// Globally unique decision ID; empty until assigned. Carried as `image_id` on the wire
    #[serde(default, rename = "image_id", alias = "id")]
    pub id: String,
    pub action: String,
    /// Confidence score, 0.0-1.0
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl DecisionRecord {
    /// Assign a fresh UUID when the recognizer did not supply an ID
    pub fn ensure_id(&mut self) -> &str {
        if self.id.is_empty() {
            self.id = uuid::Uuid::new_v4().to_string();
        }
        &self.id
    }
}

/// Caller-supplied metadata accompanying a decision request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRequestContext {
    pub vehicle_id: String,
    /// Request time in epoch seconds
    pub timestamp: i64,
}

/// Decision whose persistence failed, as written to the dead-letter log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedDecisionTask {
    pub result: DecisionRecord,
    /// Artifact reference, empty when the upload also failed
    pub image_url: String,
    pub metadata: DecisionRequestContext,
}

/// Inference collaborator
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ImageRecognizer: Send + Sync {
    /// Run recognition over a raw image
    ///
    /// # Returns
    /// The decision, possibly without an ID
    async fn recognize(&self, image: Bytes) -> DomainResult<DecisionRecord>;
}

/// Object storage collaborator for decision artifacts
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store `content` under `bucket/name`
    ///
    /// # Returns
    /// A reference (URL) to the stored object
    async fn upload(
        &self,
        bucket: &str,
        name: &str,
        content: Bytes,
        content_type: &str,
    ) -> DomainResult<String>;
}

/// Persistence collaborator for decision records
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DecisionRepository: Send + Sync {
    async fn persist(
        &self,
        decision: &DecisionRecord,
        artifact_url: &str,
        context: &DecisionRequestContext,
    ) -> DomainResult<()>;
}

/// Durable fallback for decisions that could not be persisted.
///
/// Implementations must serialize concurrent appends so records never interleave.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DeadLetterQueue: Send + Sync {
    async fn append(&self, task: &FailedDecisionTask) -> DomainResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_id_generates_when_missing() {
        let mut decision = DecisionRecord {
            id: String::new(),
            action: "pickup".to_string(),
            confidence: 0.95,
            reason: None,
        };

        let id = decision.ensure_id().to_string();

        assert!(uuid::Uuid::parse_str(&id).is_ok());
        assert_eq!(decision.id, id);
    }

    #[test]
    fn test_ensure_id_keeps_existing() {
        let mut decision = DecisionRecord {
            id: "abc".to_string(),
            action: "ignore".to_string(),
            confidence: 0.4,
            reason: Some("empty frame".to_string()),
        };

        decision.ensure_id();

        assert_eq!(decision.id, "abc");
    }

    #[test]
    fn test_decision_record_reads_image_id_and_id() {
        let decision: DecisionRecord = serde_json::from_str(
            r#"{"image_id":"img-7","action":"pickup","confidence":0.9}"#,
        )
        .unwrap();
        assert_eq!(decision.id, "img-7");
        assert_eq!(decision.reason, None);

        let legacy: DecisionRecord =
            serde_json::from_str(r#"{"id":"img-8","action":"ignore","confidence":0.1}"#).unwrap();
        assert_eq!(legacy.id, "img-8");
    }

    #[test]
    fn test_decision_record_serializes_image_id() {
        let decision = DecisionRecord {
            id: "img-9".to_string(),
            action: "pickup".to_string(),
            confidence: 0.5,
            reason: None,
        };

        let value = serde_json::to_value(&decision).unwrap();

        assert_eq!(value["image_id"], "img-9");
        assert!(value.get("id").is_none());
        assert!(value.get("reason").is_none());
    }

    #[test]
    fn test_failed_task_wire_shape() {
        let task = FailedDecisionTask {
            result: DecisionRecord {
                id: "abc".to_string(),
                action: "pickup".to_string(),
                confidence: 0.95,
                reason: Some("is_trash_type_A".to_string()),
            },
            image_url: String::new(),
            metadata: DecisionRequestContext {
                vehicle_id: "veh-1".to_string(),
                timestamp: 1_700_000_000,
            },
        };

        let value = serde_json::to_value(&task).unwrap();

        assert_eq!(value["result"]["image_id"], "abc");
        assert_eq!(value["image_url"], "");
        assert_eq!(value["metadata"]["vehicle_id"], "veh-1");
        assert_eq!(value["metadata"]["timestamp"], 1_700_000_000);
    }
}
