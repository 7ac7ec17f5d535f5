use async_trait::async_trait;
use common::domain::{DeadLetterQueue, DomainError, DomainResult, FailedDecisionTask};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

/// Append-only JSON-lines file of decisions whose persistence failed.
///
/// One record per line, in append order. Appends are serialized through a
/// single gate so concurrent writers never interleave partial lines.
pub struct FileDeadLetterQueue {
    path: PathBuf,
    gate: Mutex<()>,
}

impl FileDeadLetterQueue {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            gate: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DeadLetterQueue for FileDeadLetterQueue {
    #[instrument(skip_all, fields(decision_id = %task.result.id, path = %self.path.display()))]
    async fn append(&self, task: &FailedDecisionTask) -> DomainResult<()> {
        let mut line =
            serde_json::to_vec(task).map_err(|e| DomainError::DeadLetterError(e.to_string()))?;
        line.push(b'\n');

        let _guard = self.gate.lock().await;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| DomainError::DeadLetterError(format!("open failed: {}", e)))?;

        file.write_all(&line)
            .await
            .map_err(|e| DomainError::DeadLetterError(format!("write failed: {}", e)))?;

        file.sync_data()
            .await
            .map_err(|e| DomainError::DeadLetterError(format!("sync failed: {}", e)))?;

        debug!("appended dead-letter record");
        Ok(())
    }
}
