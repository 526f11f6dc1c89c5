use thiserror::Error;

/// Caller-visible grading failures. Anything infrastructural stays out of
/// this enum: it is logged in full server-side and reaches the caller only
/// as an opaque failed verdict.
#[derive(Debug, Error)]
pub enum GradeError {
    #[error("task chapter not found")]
    ChapterNotFound,
    #[error("task not found")]
    TaskNotFound,
    #[error("{0}")]
    InvalidCode(String),
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive framing: {0}")]
    Framing(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("execution timeout")]
    Timeout,
    #[error("sandbox failure: {0}")]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
#[error("submission storage: {0}")]
pub struct StoreError(pub String);
