use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// One produced artifact, located relative to the service's output root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputEntry {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

impl OutputEntry {
    /// `{root}/{subfolder}/{filename}`, skipping an empty subfolder
    pub fn artifact_path(&self, root: &Path) -> String {
        let mut path = root.to_path_buf();
        if !self.subfolder.is_empty() {
            path.push(&self.subfolder);
        }
        path.push(&self.filename);
        path.to_string_lossy().into_owned()
    }
}

/// Normalized external job status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalJobStatus {
    /// Queued or executing
    Running,
    /// Finished with at least one output
    Completed { outputs: Vec<OutputEntry> },
    /// Finished unsuccessfully
    Failed { error: String },
}

impl ExternalJobStatus {
    /// Output metadata stored on the job row: `{"outputs": [...]}`
    pub fn result_metadata(outputs: &[OutputEntry]) -> Value {
        serde_json::json!({ "outputs": outputs })
    }
}

/// External asynchronous compute service.
///
/// Transport failures and timeouts surface as `GentreeError::Connection`;
/// malformed or unexpected responses as `GentreeError::Protocol`.
#[async_trait]
pub trait ComputeService: Send + Sync {
    /// Submit a fully substituted workflow, returning the external job id
    async fn submit(&self, workflow: &Value) -> Result<String>;

    /// Current status of a previously submitted job
    async fn get_status(&self, external_job_id: &str) -> Result<ExternalJobStatus>;
}
