use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use common::domain::{DecisionRecord, DomainError, DomainResult, ImageRecognizer};
use reqwest::multipart::{Form, Part};
use std::time::Duration;
use tracing::{debug, instrument};

/// Recognizer backed by a remote inference service.
///
/// Posts the image as multipart field `image` to `<base_url>/v1/recognize`
/// and expects a JSON decision in return.
pub struct HttpImageRecognizer {
    client: reqwest::Client,
    base_url: String,
}

impl HttpImageRecognizer {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build inference HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ImageRecognizer for HttpImageRecognizer {
    #[instrument(skip_all, fields(base_url = %self.base_url, image_size = image.len()))]
    async fn recognize(&self, image: Bytes) -> DomainResult<DecisionRecord> {
        let url = format!("{}/v1/recognize", self.base_url);

        let part = Part::bytes(image.to_vec())
            .file_name("image.jpg")
            .mime_str("image/jpeg")
            .map_err(|e| DomainError::InferenceError(e.to_string()))?;
        let form = Form::new().part("image", part);

        let resp = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| DomainError::InferenceError(format!("request failed: {}", e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(DomainError::InferenceError(format!(
                "inference service returned {} - {}",
                status, body
            )));
        }

        let decision: DecisionRecord = resp
            .json()
            .await
            .map_err(|e| DomainError::InferenceError(format!("invalid response: {}", e)))?;

        debug!(action = %decision.action, confidence = decision.confidence, "inference complete");
        Ok(decision)
    }
}
