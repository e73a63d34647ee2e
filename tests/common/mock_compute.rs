use async_trait::async_trait;
use gentree_core::compute::{ComputeService, ExternalJobStatus, OutputEntry};
use gentree_core::error::{GentreeError, Result};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Compute service double with scripted responses.
///
/// Submissions succeed with `ext-1`, `ext-2`, ... unless a failure is queued.
/// Status calls pop the queue for that id and report `Running` once it is empty.
#[derive(Default)]
pub struct MockComputeService {
    submit_failures: Mutex<VecDeque<GentreeError>>,
    statuses: Mutex<HashMap<String, VecDeque<Result<ExternalJobStatus>>>>,
    submitted: Mutex<Vec<Value>>,
    status_calls: Mutex<Vec<String>>,
}

impl MockComputeService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_submit(&self, error: GentreeError) {
        self.submit_failures.lock().unwrap().push_back(error);
    }

    pub fn script_status(&self, external_id: &str, status: Result<ExternalJobStatus>) {
        self.statuses
            .lock()
            .unwrap()
            .entry(external_id.to_string())
            .or_default()
            .push_back(status);
    }

    pub fn complete(&self, external_id: &str, filename: &str) {
        self.script_status(external_id, Ok(completed_with(filename)));
    }

    pub fn submitted_payloads(&self) -> Vec<Value> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn status_call_count(&self, external_id: &str) -> usize {
        self.status_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|id| id.as_str() == external_id)
            .count()
    }
}

pub fn completed_with(filename: &str) -> ExternalJobStatus {
    ExternalJobStatus::Completed {
        outputs: vec![OutputEntry {
            filename: filename.to_string(),
            subfolder: "gentree".to_string(),
            kind: "output".to_string(),
        }],
    }
}

#[async_trait]
impl ComputeService for MockComputeService {
    async fn submit(&self, workflow: &Value) -> Result<String> {
        if let Some(error) = self.submit_failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        let mut submitted = self.submitted.lock().unwrap();
        submitted.push(workflow.clone());
        Ok(format!("ext-{}", submitted.len()))
    }

    async fn get_status(&self, external_job_id: &str) -> Result<ExternalJobStatus> {
        self.status_calls
            .lock()
            .unwrap()
            .push(external_job_id.to_string());
        self.statuses
            .lock()
            .unwrap()
            .get_mut(external_job_id)
            .and_then(|queue| queue.pop_front())
            .unwrap_or(Ok(ExternalJobStatus::Running))
    }
}
