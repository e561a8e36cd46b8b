//! Identifier aliases and the small value types shared across crates.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;

/// Platform-side job identifier, assigned at submission.
pub type JobId = uuid::Uuid;

/// Identifier of the user (messaging front end) that requested the job.
pub type RequesterId = i64;

/// The remote service's own task identifier, returned by task creation.
pub type TaskId = String;

/// Identifier of a workflow graph on the remote service.
pub type WorkflowId = String;

/// All wall-clock timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// The kind of generation a job asks for (e.g. `"product"`).
///
/// Each account maps the job types it supports to a concrete remote
/// [`WorkflowId`]; a job can only run on an account whose map contains
/// its type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobType(pub String);

impl JobType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobType {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Reference to an asset held by the remote service (an uploaded input
/// or a produced output). Opaque to the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileRef(pub String);

impl FileRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FileRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One job input, in the order the workflow expects them.
///
/// `File` variants are temporary local copies (downloaded from the
/// front end); the orchestrator removes them once the job reaches a
/// terminal state.
#[derive(Debug, Clone)]
pub enum AssetSource {
    /// A temporary file on local disk, deleted after the job completes.
    File(PathBuf),
    /// Raw bytes already in memory.
    Bytes(Vec<u8>),
}

/// Terminal result delivered to the submitter's callback, exactly once
/// per job.
#[derive(Debug, Clone)]
pub enum JobOutcome {
    /// The remote task succeeded; `result` points at the artifact.
    Completed { result: FileRef },
    /// The job failed permanently (retries exhausted or a permanent error).
    Failed { error: WorkflowError },
    /// The job was cancelled by the requester or during shutdown.
    Cancelled,
}

impl JobOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, JobOutcome::Completed { .. })
    }
}
