//! Typed failure taxonomy for job execution.
//!
//! The dispatcher decides retry-vs-fail purely from the variant, so
//! every path through the client must map into one of these instead of
//! a stringly-typed error.

use crate::types::JobType;

/// A failure while driving a job against the remote service.
///
/// Variants are split by *policy*, not just by origin: the dispatcher
/// requeues [retryable](WorkflowError::is_retryable) failures on a
/// fresh account and fails the job immediately on everything else.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WorkflowError {
    /// No account in the pool supports the job's type. Permanent;
    /// surfaced before the job is ever queued.
    #[error("no account supports job type \"{0}\"")]
    CapabilityMismatch(JobType),

    /// The service rejected an upload outright (4xx or malformed
    /// response). Permanent.
    #[error("upload rejected by the service: {0}")]
    UploadRejected(String),

    /// Upload kept failing transiently (timeouts, 5xx) until the
    /// in-call retry budget ran out. Retryable at the job level.
    #[error("upload failed after {attempts} attempts: {message}")]
    UploadFailed { attempts: u32, message: String },

    /// Task creation failed hard (bad workflow id, auth failure, ...).
    /// Permanent.
    #[error("task creation failed: {0}")]
    TaskCreation(String),

    /// The remote queue stayed full for the whole creation retry
    /// budget. Retryable: the job goes back in line.
    #[error("remote task queue still full after {0} attempts")]
    QueueBusy(u32),

    /// A status poll failed (network error or 5xx). Retryable.
    #[error("status poll failed: {0}")]
    Poll(String),

    /// An HTTP call or the job as a whole ran out of time. Retryable
    /// for per-call timeouts; the job deadline makes it terminal.
    #[error("timed out: {0}")]
    Timeout(String),

    /// The remote task vanished. Permanent.
    #[error("remote task not found: {0}")]
    NotFound(String),

    /// The remote service reported the task as failed. Permanent.
    #[error("remote task failed: {0}")]
    TaskFailed(String),
}

impl WorkflowError {
    /// Whether the dispatcher may requeue the job after this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WorkflowError::UploadFailed { .. }
                | WorkflowError::QueueBusy(_)
                | WorkflowError::Poll(_)
                | WorkflowError::Timeout(_)
        )
    }

    /// Short machine-readable kind, used in logs and callback payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkflowError::CapabilityMismatch(_) => "capability_mismatch",
            WorkflowError::UploadRejected(_) => "upload_rejected",
            WorkflowError::UploadFailed { .. } => "upload_failed",
            WorkflowError::TaskCreation(_) => "task_creation",
            WorkflowError::QueueBusy(_) => "queue_busy",
            WorkflowError::Poll(_) => "poll",
            WorkflowError::Timeout(_) => "timeout",
            WorkflowError::NotFound(_) => "not_found",
            WorkflowError::TaskFailed(_) => "task_failed",
        }
    }
}
