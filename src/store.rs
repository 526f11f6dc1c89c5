use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::{io::AsyncWriteExt, sync::Mutex};
use uuid::Uuid;

use crate::{
    error::StoreError,
    models::{NewSubmission, Submission},
};

/// Attempt-storage collaborator. Assigns the id and creation timestamp and
/// returns the immutable stored record.
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn create(&self, submission: NewSubmission) -> Result<Submission, StoreError>;
}

/// In-process store with optional append-only JSONL persistence. Records
/// are immutable once inserted; the write lock only serializes file
/// appends.
#[derive(Clone)]
pub struct MemorySubmissionStore {
    records: Arc<DashMap<Uuid, Submission>>,
    persistence_path: Option<PathBuf>,
    write_lock: Arc<Mutex<()>>,
}

impl MemorySubmissionStore {
    pub fn new(persistence_path: Option<PathBuf>) -> Self {
        Self {
            records: Arc::new(DashMap::new()),
            persistence_path,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<Submission> {
        self.records.get(id).map(|e| e.value().clone())
    }

    pub fn has_solved(&self, user_id: Uuid, chapter_slug: &str, task_slug: &str) -> bool {
        self.records.iter().any(|e| {
            let s = e.value();
            s.user_id == user_id
                && s.chapter_slug == chapter_slug
                && s.task_slug == task_slug
                && s.passed
        })
    }

    async fn append(&self, record: &Submission) {
        let Some(path) = &self.persistence_path else {
            return;
        };
        let line = match serde_json::to_string(record) {
            Ok(line) => line,
            Err(err) => {
                tracing::warn!(submission = %record.id, error = %err, "submission not serializable");
                return;
            }
        };

        let _guard = self.write_lock.lock().await;
        let mut options = tokio::fs::OpenOptions::new();
        options.create(true).append(true);
        match options.open(path).await {
            Ok(mut file) => {
                if let Err(err) = file.write_all(line.as_bytes()).await {
                    tracing::warn!(error = %err, "submission log append failed");
                } else {
                    let _ = file.write_all(b"\n").await;
                }
            }
            Err(err) => tracing::warn!(error = %err, "submission log open failed"),
        }
    }
}

#[async_trait]
impl SubmissionStore for MemorySubmissionStore {
    async fn create(&self, submission: NewSubmission) -> Result<Submission, StoreError> {
        let record = Submission {
            id: Uuid::new_v4(),
            user_id: submission.user_id,
            chapter_slug: submission.chapter_slug,
            task_slug: submission.task_slug,
            code: submission.code,
            passed: submission.passed,
            result: submission.result,
            created_at: Utc::now(),
        };

        self.records.insert(record.id, record.clone());
        self.append(&record).await;
        Ok(record)
    }
}
