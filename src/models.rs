use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Everything one grading run needs besides static configuration.
/// Built by the coordinator, consumed by the archive builder, discarded
/// when the run finishes.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub code: String,
    pub test_source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub name: String,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitResult {
    pub passed: bool,
    #[serde(default)]
    pub tests: Vec<TestOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SubmitResult {
    /// A run that produced no per-test verdicts, only a diagnostic.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            passed: false,
            tests: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// Attempt record as handed to the storage collaborator. The store assigns
/// the id and creation timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSubmission {
    pub user_id: Uuid,
    pub chapter_slug: String,
    pub task_slug: String,
    pub code: String,
    pub passed: bool,
    pub result: SubmitResult,
}

/// Persisted attempt record. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    pub user_id: Uuid,
    pub chapter_slug: String,
    pub task_slug: String,
    pub code: String,
    pub passed: bool,
    pub result: SubmitResult,
    pub created_at: DateTime<Utc>,
}
