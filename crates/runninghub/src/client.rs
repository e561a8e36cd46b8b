//! Policy-aware RunningHub client and the dispatcher-facing trait.
//!
//! [`RunningHubClient`] layers retry budgets, error classification, and
//! the freshness gate on top of the raw [`RunningHubApi`] wrappers. The
//! dispatcher only sees the [`WorkflowService`] trait, so tests can
//! substitute a scripted double.

use std::time::{Duration, Instant};

use async_trait::async_trait;

use prodshot_core::retry::{retry_transient, RetryPolicy};
use prodshot_core::{Account, FileRef, TaskId, WorkflowError, WorkflowId};

use crate::api::{ApiError, NodeInfo, RemoteStatus, RunningHubApi, TaskOutput};
use crate::poll::{evaluate_result, FreshnessConfig, PollState, Verdict};

/// Binding of one input position to a workflow input node.
///
/// RunningHub workflows take their inputs through named node fields;
/// which node receives which uploaded file is fixed per workflow graph.
#[derive(Debug, Clone)]
pub struct NodeBinding {
    pub node_id: String,
    pub field_name: String,
}

impl NodeBinding {
    pub fn image(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            field_name: "image".to_string(),
        }
    }
}

/// Configuration for [`RunningHubClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base API URL, e.g. `https://api.runninghub.com`.
    pub base_url: String,
    /// Per-HTTP-call timeout.
    pub http_timeout: Duration,
    /// Retry budget for transient upload failures.
    pub upload_retry: RetryPolicy,
    /// Retry budget for transient task-creation failures (network
    /// blips, 5xx). Queue-full responses are *not* covered here; the
    /// dispatcher owns that loop.
    pub create_retry: RetryPolicy,
    /// Thresholds for the stale-result gate.
    pub freshness: FreshnessConfig,
    /// Input-node bindings, in job input order.
    pub input_nodes: Vec<NodeBinding>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.runninghub.com".to_string(),
            http_timeout: Duration::from_secs(30),
            upload_retry: RetryPolicy::default(),
            create_retry: RetryPolicy::default(),
            freshness: FreshnessConfig::default(),
            input_nodes: vec![NodeBinding::image("2"), NodeBinding::image("32")],
        }
    }
}

impl ClientConfig {
    /// Load overrides from environment variables.
    ///
    /// | Env Var                           | Default                      |
    /// |-----------------------------------|------------------------------|
    /// | `RUNNINGHUB_API_URL`              | `https://api.runninghub.com` |
    /// | `RUNNINGHUB_HTTP_TIMEOUT_SECS`    | `30`                         |
    /// | `RUNNINGHUB_GRACE_PERIOD_SECS`    | `10`                         |
    /// | `RUNNINGHUB_MIN_COST_TIME_SECS`   | `2`                          |
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("RUNNINGHUB_API_URL") {
            config.base_url = url;
        }
        if let Some(timeout) = env_duration_secs("RUNNINGHUB_HTTP_TIMEOUT_SECS") {
            config.http_timeout = timeout;
        }
        if let Some(grace) = env_duration_secs("RUNNINGHUB_GRACE_PERIOD_SECS") {
            config.freshness.grace_period = grace;
        }
        if let Some(min_cost) = env_duration_secs("RUNNINGHUB_MIN_COST_TIME_SECS") {
            config.freshness.min_cost_time = min_cost;
        }
        config
    }
}

fn env_duration_secs(name: &str) -> Option<Duration> {
    let raw = std::env::var(name).ok()?;
    let secs: u64 = raw
        .parse()
        .unwrap_or_else(|_| panic!("{name} must be a valid u64"));
    Some(Duration::from_secs(secs))
}

/// Outcome of one task-creation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    /// The task was queued remotely.
    Created(TaskId),
    /// The account's remote queue is at capacity; back off and retry
    /// creation (this is not a failure).
    QueueFull,
}

/// Result of one status poll, after the freshness gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskPoll {
    /// Waiting in the remote queue.
    Queued,
    /// Executing (or a `SUCCESS` the gate refused to trust yet).
    Running,
    /// Finished; the artifact reference has cleared the gate.
    Succeeded(FileRef),
    /// The remote service reported the task as failed.
    Failed(String),
}

/// The protocol surface the dispatcher drives.
///
/// Implemented by [`RunningHubClient`] in production and by scripted
/// doubles in dispatcher tests.
#[async_trait]
pub trait WorkflowService: Send + Sync {
    /// Upload one input asset under the account's credential.
    async fn upload_asset(
        &self,
        bytes: Vec<u8>,
        account: &Account,
    ) -> Result<FileRef, WorkflowError>;

    /// Create a remote task from uploaded refs.
    async fn create_task(
        &self,
        refs: &[FileRef],
        workflow_id: &WorkflowId,
        account: &Account,
    ) -> Result<CreateOutcome, WorkflowError>;

    /// Issue one status check, applying the freshness gate on success.
    async fn poll_status(
        &self,
        task_id: &TaskId,
        account: &Account,
        state: &mut PollState,
    ) -> Result<TaskPoll, WorkflowError>;
}

/// RunningHub client with retries and stale-result protection.
pub struct RunningHubClient {
    api: RunningHubApi,
    config: ClientConfig,
}

impl RunningHubClient {
    pub fn new(config: ClientConfig) -> Self {
        let api = RunningHubApi::new(config.base_url.clone(), config.http_timeout);
        Self { api, config }
    }

    /// Direct access to the raw API (account probes, ops tooling).
    pub fn api(&self) -> &RunningHubApi {
        &self.api
    }

    /// Fetch the primary output of a finished task.
    ///
    /// Returns the artifact reference plus the remote-reported
    /// processing time, when present.
    pub async fn get_outputs(
        &self,
        task_id: &TaskId,
        account: &Account,
    ) -> Result<(FileRef, Option<Duration>), WorkflowError> {
        let outputs = self
            .api
            .task_outputs(account, task_id)
            .await
            .map_err(|e| map_poll_error(e, task_id))?;

        let first = outputs
            .into_iter()
            .next()
            .ok_or_else(|| WorkflowError::Poll(format!("task {task_id} reported no outputs")))?;

        let cost_time = cost_time_of(&first);
        Ok((FileRef(first.file_url), cost_time))
    }

}

/// Build the `nodeInfoList` by pairing uploaded refs with the
/// configured input nodes, in order.
fn build_node_info(
    refs: &[FileRef],
    bindings: &[NodeBinding],
) -> Result<Vec<NodeInfo>, WorkflowError> {
    if refs.len() > bindings.len() {
        return Err(WorkflowError::TaskCreation(format!(
            "workflow accepts {} input(s) but the job supplied {}",
            bindings.len(),
            refs.len()
        )));
    }

    Ok(refs
        .iter()
        .zip(bindings)
        .map(|(r, b)| NodeInfo {
            node_id: b.node_id.clone(),
            field_name: b.field_name.clone(),
            field_value: r.as_str().to_string(),
        })
        .collect())
}

fn cost_time_of(output: &TaskOutput) -> Option<Duration> {
    output.task_cost_time.map(Duration::from_secs_f64)
}

/// Map a status/outputs API error into the dispatcher taxonomy.
fn map_poll_error(e: ApiError, task_id: &str) -> WorkflowError {
    if e.is_not_found() {
        WorkflowError::NotFound(task_id.to_string())
    } else if e.is_timeout() {
        WorkflowError::Timeout(format!("status poll for task {task_id}"))
    } else {
        WorkflowError::Poll(e.to_string())
    }
}

#[async_trait]
impl WorkflowService for RunningHubClient {
    async fn upload_asset(
        &self,
        bytes: Vec<u8>,
        account: &Account,
    ) -> Result<FileRef, WorkflowError> {
        let result = retry_transient(
            &self.config.upload_retry,
            ApiError::is_transient,
            |attempt| {
                let bytes = bytes.clone();
                async move {
                    tracing::debug!(account_id = %account.id, attempt, "Uploading asset");
                    self.api.upload(account, bytes).await
                }
            },
        )
        .await;

        match result {
            Ok(data) => Ok(FileRef(data.file_name)),
            Err(e) if e.is_transient() => Err(WorkflowError::UploadFailed {
                attempts: self.config.upload_retry.max_attempts,
                message: e.to_string(),
            }),
            Err(e) => Err(WorkflowError::UploadRejected(e.to_string())),
        }
    }

    async fn create_task(
        &self,
        refs: &[FileRef],
        workflow_id: &WorkflowId,
        account: &Account,
    ) -> Result<CreateOutcome, WorkflowError> {
        let node_info = build_node_info(refs, &self.config.input_nodes)?;

        let result = retry_transient(
            &self.config.create_retry,
            ApiError::is_transient,
            |attempt| {
                let node_info = node_info.clone();
                async move {
                    tracing::debug!(
                        account_id = %account.id,
                        workflow_id = %workflow_id,
                        attempt,
                        "Creating remote task",
                    );
                    self.api.create_task(account, workflow_id, &node_info).await
                }
            },
        )
        .await;

        match result {
            Ok(data) => {
                tracing::info!(
                    account_id = %account.id,
                    task_id = %data.task_id,
                    "Remote task created",
                );
                Ok(CreateOutcome::Created(data.task_id))
            }
            Err(e) if e.is_queue_full() => {
                tracing::debug!(account_id = %account.id, "Remote task queue full");
                Ok(CreateOutcome::QueueFull)
            }
            Err(e) => Err(WorkflowError::TaskCreation(e.to_string())),
        }
    }

    async fn poll_status(
        &self,
        task_id: &TaskId,
        account: &Account,
        state: &mut PollState,
    ) -> Result<TaskPoll, WorkflowError> {
        state.note_attempt();

        let raw = self
            .api
            .task_status(account, task_id)
            .await
            .map_err(|e| map_poll_error(e, task_id))?;

        let status = RemoteStatus::parse(&raw)
            .ok_or_else(|| WorkflowError::Poll(format!("unknown task status \"{raw}\"")))?;

        match status {
            RemoteStatus::Queued => Ok(TaskPoll::Queued),
            RemoteStatus::Running => Ok(TaskPoll::Running),
            RemoteStatus::Failed => Ok(TaskPoll::Failed(format!(
                "remote execution of task {task_id} failed"
            ))),
            RemoteStatus::Success => {
                let (result, cost_time) = self.get_outputs(task_id, account).await?;
                match evaluate_result(
                    state,
                    result.as_str(),
                    cost_time,
                    Instant::now(),
                    &self.config.freshness,
                ) {
                    Verdict::Trusted => Ok(TaskPoll::Succeeded(result)),
                    Verdict::Suspect(reason) => {
                        // Likely a cached artifact from an earlier task.
                        tracing::debug!(
                            task_id = %task_id,
                            attempt = state.attempts(),
                            reason,
                            "Rejecting suspect success, continuing to poll",
                        );
                        Ok(TaskPoll::Running)
                    }
                }
            }
        }
    }
}
