//! The boundary the messaging front end calls.
//!
//! [`Orchestrator`] turns a submit call into a [`Job`], hands it to the
//! dispatcher, and guarantees that the caller's callback fires exactly
//! once with a terminal outcome — and that any temporary local copies
//! of the input assets are removed on every exit path.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use prodshot_core::types::{AssetSource, JobId, JobType, RequesterId};
use prodshot_core::{JobOutcome, WorkflowError};
use prodshot_runninghub::client::WorkflowService;

use crate::config::DispatchConfig;
use crate::dispatcher::Dispatcher;
use crate::job::{Job, ResultCallback};
use crate::pool::AccountPool;

/// Public entry point for job submission and cancellation.
pub struct Orchestrator {
    dispatcher: Arc<Dispatcher>,
}

impl Orchestrator {
    /// Build the dispatcher and start its loop.
    pub fn start(
        pool: Arc<AccountPool>,
        service: Arc<dyn WorkflowService>,
        config: DispatchConfig,
    ) -> Arc<Self> {
        let dispatcher = Dispatcher::start(pool, service, config);
        Arc::new(Self { dispatcher })
    }

    /// Submit a generation job.
    ///
    /// `on_result` fires exactly once with the terminal outcome. A
    /// permanent capability mismatch (no account supports `job_type`)
    /// is reported through the callback immediately, without queueing.
    pub async fn submit(
        &self,
        requester_id: RequesterId,
        job_type: JobType,
        inputs: Vec<AssetSource>,
        on_result: ResultCallback,
    ) -> JobId {
        // Temp local copies get removed after the callback, whatever
        // the outcome.
        let temp_paths: Vec<PathBuf> = inputs
            .iter()
            .filter_map(|input| match input {
                AssetSource::File(path) => Some(path.clone()),
                AssetSource::Bytes(_) => None,
            })
            .collect();

        let wrapped: ResultCallback = Box::new(move |outcome| {
            Box::pin(async move {
                on_result(outcome).await;
                cleanup_temp_files(&temp_paths).await;
            })
        });

        let deadline = Instant::now() + self.dispatcher.config().job_deadline;
        let job = Job::new(
            requester_id,
            job_type,
            inputs,
            deadline,
            self.dispatcher.job_token(),
            wrapped,
        );
        let job_id = job.id;

        tracing::info!(
            job_id = %job_id,
            requester_id,
            job_type = %job.job_type,
            inputs = job.inputs.len(),
            "Job submitted",
        );

        if let Err(rejected) = self.dispatcher.enqueue(job).await {
            let outcome = if self.dispatcher.is_accepting() {
                tracing::warn!(
                    job_id = %job_id,
                    job_type = %rejected.job_type,
                    "No account supports this job type",
                );
                JobOutcome::Failed {
                    error: WorkflowError::CapabilityMismatch(rejected.job_type.clone()),
                }
            } else {
                JobOutcome::Cancelled
            };
            rejected.finish(outcome).await;
        }

        job_id
    }

    /// Cancel a job by id. Returns `false` if it is already terminal.
    pub async fn cancel(&self, job_id: JobId) -> bool {
        self.dispatcher.cancel(job_id).await
    }

    /// Shut down the dispatcher, cancelling all outstanding jobs.
    pub async fn shutdown(&self) {
        self.dispatcher.shutdown().await;
    }
}

/// Remove temporary input copies, tolerating files that are already
/// gone.
async fn cleanup_temp_files(paths: &[PathBuf]) {
    for path in paths {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "Removed temp input copy");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to remove temp input copy",
                );
            }
        }
    }
}
