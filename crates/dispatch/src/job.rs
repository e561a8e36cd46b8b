//! The job record and its status state machine.
//!
//! A [`Job`] is owned by exactly one place at a time: the dispatcher
//! queue while pending, then the single execution task driving it.
//! There is no shared mutation; moves enforce the ownership.

use std::time::Instant;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use prodshot_core::types::{AssetSource, JobId, JobType, RequesterId, TaskId, Timestamp};
use prodshot_core::JobOutcome;

/// Completion callback: invoked exactly once with the terminal outcome.
pub type ResultCallback = Box<dyn FnOnce(JobOutcome) -> BoxFuture<'static, ()> + Send>;

/// Lifecycle of a job.
///
/// ```text
/// Queued -> Assigned -> Uploading -> Submitted -> Polling
///    ^          |            |           |          |
///    |          +------------+-----------+----------+--> Completed | Failed | Cancelled
///    +-- retryable failure requeues (retries += 1)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Assigned,
    Uploading,
    Submitted,
    Polling,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Terminal states are final; no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        if self.is_terminal() {
            return false;
        }
        match next {
            // Requeue after a retryable failure, from any in-flight state.
            Queued => matches!(self, Assigned | Uploading | Submitted | Polling),
            Assigned => self == Queued,
            Uploading => self == Assigned,
            Submitted => self == Uploading,
            Polling => self == Submitted,
            // Any non-terminal state can reach a terminal one.
            Completed | Failed | Cancelled => true,
        }
    }
}

/// One user-originated generation request.
pub struct Job {
    pub id: JobId,
    pub requester_id: RequesterId,
    pub job_type: JobType,
    /// Ordered inputs, as the workflow's input nodes expect them.
    pub inputs: Vec<AssetSource>,
    pub status: JobStatus,
    /// Id of the account running this job; `Some` iff the status is in
    /// `Assigned..=Polling`.
    pub assigned_account: Option<String>,
    /// Number of retryable failures absorbed so far.
    pub retries: u32,
    pub external_task_id: Option<TaskId>,
    pub created_at: Timestamp,
    /// Absolute deadline; elapsing it is terminal regardless of the
    /// remaining retry budget.
    pub deadline: Instant,
    pub(crate) cancel: CancellationToken,
    callback: Option<ResultCallback>,
}

impl Job {
    pub fn new(
        requester_id: RequesterId,
        job_type: JobType,
        inputs: Vec<AssetSource>,
        deadline: Instant,
        cancel: CancellationToken,
        callback: ResultCallback,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            requester_id,
            job_type,
            inputs,
            status: JobStatus::Queued,
            assigned_account: None,
            retries: 0,
            external_task_id: None,
            created_at: chrono::Utc::now(),
            deadline,
            cancel,
            callback: Some(callback),
        }
    }

    /// Move to a new status, logging the transition.
    pub(crate) fn set_status(&mut self, next: JobStatus) {
        debug_assert!(
            self.status.can_transition_to(next),
            "illegal job transition {:?} -> {next:?}",
            self.status
        );
        tracing::debug!(job_id = %self.id, from = ?self.status, to = ?next, "Job transition");
        self.status = next;
    }

    /// Consume the job with its terminal outcome and fire the callback.
    ///
    /// Taking `self` by value is what makes the notification
    /// exactly-once: a finished job cannot be touched again.
    pub(crate) async fn finish(mut self, outcome: JobOutcome) {
        let status = match &outcome {
            JobOutcome::Completed { .. } => JobStatus::Completed,
            JobOutcome::Failed { .. } => JobStatus::Failed,
            JobOutcome::Cancelled => JobStatus::Cancelled,
        };
        self.set_status(status);
        self.assigned_account = None;

        if let Some(callback) = self.callback.take() {
            callback(outcome).await;
        }
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("requester_id", &self.requester_id)
            .field("job_type", &self.job_type)
            .field("status", &self.status)
            .field("assigned_account", &self.assigned_account)
            .field("retries", &self.retries)
            .field("external_task_id", &self.external_task_id)
            .finish_non_exhaustive()
    }
}
