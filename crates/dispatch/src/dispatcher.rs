//! The admission-controlled dispatch loop.
//!
//! A single long-lived task drains the FIFO queue, pairing each job
//! with an account from the pool. Each paired job runs in its own
//! spawned task (so one slow poll never blocks other ready jobs) while
//! total concurrency stays bounded by the sum of account capacities.
//!
//! Accounts are released on every exit path — success, failure,
//! cancellation, deadline — and release is idempotent, so a bug in one
//! job's execution can never strand or corrupt capacity.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use prodshot_core::types::{AssetSource, JobId};
use prodshot_core::{Account, FileRef, JobOutcome, WorkflowError};
use prodshot_runninghub::client::{CreateOutcome, TaskPoll, WorkflowService};
use prodshot_runninghub::poll::PollState;

use crate::config::DispatchConfig;
use crate::job::{Job, JobStatus};
use crate::pool::AccountPool;

/// How one execution attempt ended, before retry policy is applied.
enum Attempt {
    Completed(FileRef),
    Error(WorkflowError),
    Cancelled,
    DeadlineExceeded,
}

/// Background job dispatcher.
///
/// Created via [`Dispatcher::start`], which spawns the queue loop.
/// The returned `Arc` is the handle used for enqueue/cancel/shutdown.
pub struct Dispatcher {
    pool: Arc<AccountPool>,
    service: Arc<dyn WorkflowService>,
    config: DispatchConfig,
    queue: Mutex<VecDeque<Job>>,
    /// Cancellation handles for queued and in-flight jobs.
    cancellations: Mutex<HashMap<JobId, CancellationToken>>,
    accepting: AtomicBool,
    /// Master token — cancelled during shutdown; job tokens are its
    /// children.
    shutdown_token: CancellationToken,
    tracker: TaskTracker,
}

impl Dispatcher {
    /// Create the dispatcher and start its queue loop.
    pub fn start(
        pool: Arc<AccountPool>,
        service: Arc<dyn WorkflowService>,
        config: DispatchConfig,
    ) -> Arc<Self> {
        let dispatcher = Arc::new(Self {
            pool,
            service,
            config,
            queue: Mutex::new(VecDeque::new()),
            cancellations: Mutex::new(HashMap::new()),
            accepting: AtomicBool::new(true),
            shutdown_token: CancellationToken::new(),
            tracker: TaskTracker::new(),
        });

        let this = Arc::clone(&dispatcher);
        dispatcher.tracker.spawn(async move { this.run_loop().await });
        dispatcher
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Whether new work is still being accepted.
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// A cancellation token for a new job, child of the master token so
    /// shutdown propagates automatically.
    pub fn job_token(&self) -> CancellationToken {
        self.shutdown_token.child_token()
    }

    /// Append a job to the queue.
    ///
    /// Returns the job back (without enqueuing) when no account in the
    /// pool supports its type at all — a permanent capability mismatch,
    /// distinct from temporary capacity exhaustion, which waits in the
    /// queue — or when the dispatcher is shutting down.
    pub async fn enqueue(&self, job: Job) -> Result<(), Job> {
        if !self.is_accepting() || !self.pool.supports(&job.job_type).await {
            return Err(job);
        }

        let job_id = job.id;
        self.cancellations
            .lock()
            .await
            .insert(job_id, job.cancel.clone());
        tracing::info!(
            job_id = %job_id,
            job_type = %job.job_type,
            retries = job.retries,
            "Job queued",
        );
        self.queue.lock().await.push_back(job);

        // Shutdown may have drained the queue between the intake check
        // above and the push; reclaim the job if it is still there.
        if !self.is_accepting() {
            let reclaimed = {
                let mut queue = self.queue.lock().await;
                queue
                    .iter()
                    .position(|j| j.id == job_id)
                    .and_then(|i| queue.remove(i))
            };
            if let Some(job) = reclaimed {
                self.finish(job, JobOutcome::Cancelled).await;
            }
        }
        Ok(())
    }

    /// Cancel a queued or in-flight job.
    ///
    /// Returns `false` if the job is unknown (already terminal).
    pub async fn cancel(&self, job_id: JobId) -> bool {
        match self.cancellations.lock().await.get(&job_id) {
            Some(token) => {
                tracing::info!(job_id = %job_id, "Cancelling job");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Stop intake, cancel every queued and in-flight job, wait briefly
    /// for cleanups, then reset pool load as a final safety net.
    pub async fn shutdown(&self) {
        tracing::info!("Dispatcher shutting down");
        self.accepting.store(false, Ordering::SeqCst);

        // Cancels the loop and, through child tokens, every job.
        self.shutdown_token.cancel();

        let drained: Vec<Job> = self.queue.lock().await.drain(..).collect();
        for job in drained {
            self.finish(job, JobOutcome::Cancelled).await;
        }

        self.tracker.close();
        if tokio::time::timeout(self.config.shutdown_grace, self.tracker.wait())
            .await
            .is_err()
        {
            tracing::warn!("Timed out waiting for in-flight jobs to clean up");
        }

        // The loop or an execute task may have requeued a job while the
        // first drain ran; sweep again now that they have stopped.
        let stragglers: Vec<Job> = self.queue.lock().await.drain(..).collect();
        for job in stragglers {
            self.finish(job, JobOutcome::Cancelled).await;
        }

        self.pool.release_all().await;
        tracing::info!("Dispatcher shut down");
    }

    // ---- queue loop ----

    async fn run_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.queue_poll_interval);
        tracing::info!(
            queue_poll_ms = self.config.queue_poll_interval.as_millis() as u64,
            "Dispatcher started",
        );

        loop {
            tokio::select! {
                _ = self.shutdown_token.cancelled() => break,
                _ = ticker.tick() => self.dispatch_ready().await,
            }
        }
    }

    /// Drain the queue until it is empty or the pool runs out of
    /// capacity for the job at the head.
    async fn dispatch_ready(self: &Arc<Self>) {
        loop {
            let Some(mut job) = self.queue.lock().await.pop_front() else {
                return;
            };

            if job.cancel.is_cancelled() {
                self.finish(job, JobOutcome::Cancelled).await;
                continue;
            }

            if Instant::now() >= job.deadline {
                self.finish(
                    job,
                    JobOutcome::Failed {
                        error: WorkflowError::Timeout("job deadline elapsed while queued".into()),
                    },
                )
                .await;
                continue;
            }

            match self.pool.acquire(&job.job_type).await {
                None => {
                    // Back-pressure: requeue at the head and wait for
                    // the next tick instead of spinning.
                    self.queue.lock().await.push_front(job);
                    return;
                }
                Some(account) => {
                    job.set_status(JobStatus::Assigned);
                    job.assigned_account = Some(account.id.clone());
                    let this = Arc::clone(self);
                    self.tracker
                        .spawn(async move { this.execute(job, account).await });
                }
            }
        }
    }

    // ---- per-job execution ----

    /// Run one job on an acquired account, then apply retry policy.
    ///
    /// The account is released exactly once on every path out of here.
    async fn execute(self: Arc<Self>, mut job: Job, account: Arc<Account>) {
        let token = job.cancel.clone();
        let remaining = job.deadline.saturating_duration_since(Instant::now());

        let attempt = tokio::select! {
            _ = token.cancelled() => Attempt::Cancelled,
            result = tokio::time::timeout(remaining, self.run_attempt(&mut job, &account)) => {
                match result {
                    Ok(Ok(file)) => Attempt::Completed(file),
                    Ok(Err(e)) => Attempt::Error(e),
                    Err(_) => Attempt::DeadlineExceeded,
                }
            }
        };

        // Guaranteed release, before any callback runs.
        self.pool.release(&account.id).await;

        match attempt {
            Attempt::Completed(result) => {
                self.finish(job, JobOutcome::Completed { result }).await;
            }
            Attempt::Cancelled => {
                self.finish(job, JobOutcome::Cancelled).await;
            }
            Attempt::DeadlineExceeded => {
                tracing::warn!(job_id = %job.id, "Job deadline elapsed mid-flight");
                self.finish(
                    job,
                    JobOutcome::Failed {
                        error: WorkflowError::Timeout("job deadline elapsed".into()),
                    },
                )
                .await;
            }
            Attempt::Error(error) if error.is_retryable() => {
                job.retries += 1;
                if job.retries >= self.config.max_retries {
                    tracing::warn!(
                        job_id = %job.id,
                        retries = job.retries,
                        error = %error,
                        "Retry budget exhausted",
                    );
                    self.finish(job, JobOutcome::Failed { error }).await;
                } else if job.cancel.is_cancelled() || !self.is_accepting() {
                    // Shutdown or cancel raced the failure; do not
                    // strand the job in a queue nobody drains.
                    self.finish(job, JobOutcome::Cancelled).await;
                } else {
                    tracing::warn!(
                        job_id = %job.id,
                        retries = job.retries,
                        error = %error,
                        "Retryable failure, requeueing",
                    );
                    job.set_status(JobStatus::Queued);
                    job.assigned_account = None;
                    job.external_task_id = None;
                    // A different account may pick it up next time.
                    self.queue.lock().await.push_back(job);
                }
            }
            Attempt::Error(error) => {
                self.finish(job, JobOutcome::Failed { error }).await;
            }
        }
    }

    /// One full pass: upload inputs, create the remote task, poll to
    /// completion. Cancellation and the deadline are enforced by the
    /// caller wrapping this future.
    async fn run_attempt(
        &self,
        job: &mut Job,
        account: &Account,
    ) -> Result<FileRef, WorkflowError> {
        job.set_status(JobStatus::Uploading);
        let mut refs = Vec::with_capacity(job.inputs.len());
        for (index, input) in job.inputs.iter().enumerate() {
            let bytes = match input {
                AssetSource::Bytes(bytes) => bytes.clone(),
                AssetSource::File(path) => tokio::fs::read(path).await.map_err(|e| {
                    WorkflowError::UploadRejected(format!(
                        "failed to read local input {}: {e}",
                        path.display()
                    ))
                })?,
            };
            let file_ref = self.service.upload_asset(bytes, account).await?;
            tracing::debug!(job_id = %job.id, index, file_ref = %file_ref, "Input uploaded");
            refs.push(file_ref);
        }

        job.set_status(JobStatus::Submitted);
        let workflow_id = account
            .workflow_for(&job.job_type)
            .ok_or_else(|| WorkflowError::CapabilityMismatch(job.job_type.clone()))?
            .clone();

        let mut attempts = 0u32;
        let task_id = loop {
            attempts += 1;
            match self.service.create_task(&refs, &workflow_id, account).await? {
                CreateOutcome::Created(task_id) => break task_id,
                CreateOutcome::QueueFull => {
                    if attempts >= self.config.queue_full_retries {
                        return Err(WorkflowError::QueueBusy(attempts));
                    }
                    tracing::debug!(
                        job_id = %job.id,
                        attempts,
                        delay_ms = self.config.queue_full_delay.as_millis() as u64,
                        "Remote queue full, waiting before retrying creation",
                    );
                    tokio::time::sleep(self.config.queue_full_delay).await;
                }
            }
        };

        job.external_task_id = Some(task_id.clone());
        job.set_status(JobStatus::Polling);
        let mut state = PollState::new();

        loop {
            tokio::time::sleep(self.config.poll_interval).await;
            match self
                .service
                .poll_status(&task_id, account, &mut state)
                .await?
            {
                TaskPoll::Queued | TaskPoll::Running => continue,
                TaskPoll::Succeeded(result) => {
                    tracing::info!(
                        job_id = %job.id,
                        task_id = %task_id,
                        polls = state.attempts(),
                        "Remote task succeeded",
                    );
                    return Ok(result);
                }
                TaskPoll::Failed(message) => {
                    return Err(WorkflowError::TaskFailed(message));
                }
            }
        }
    }

    /// Terminal bookkeeping: drop the cancellation handle and fire the
    /// job's callback with its outcome.
    async fn finish(&self, job: Job, outcome: JobOutcome) {
        self.cancellations.lock().await.remove(&job.id);
        match &outcome {
            JobOutcome::Completed { result } => {
                tracing::info!(job_id = %job.id, result = %result, "Job completed");
            }
            JobOutcome::Failed { error } => {
                tracing::warn!(
                    job_id = %job.id,
                    kind = error.kind(),
                    error = %error,
                    "Job failed",
                );
            }
            JobOutcome::Cancelled => {
                tracing::info!(job_id = %job.id, "Job cancelled");
            }
        }
        job.finish(outcome).await;
    }
}
