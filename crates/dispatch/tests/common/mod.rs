//! Shared test fixtures: a scripted workflow-service double and
//! small builders for pools, configs, and callbacks.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{oneshot, Mutex};

use prodshot_core::types::{JobType, TaskId, WorkflowId};
use prodshot_core::{Account, ApiKey, FileRef, JobOutcome, WorkflowError};
use prodshot_dispatch::{AccountPool, DispatchConfig, ResultCallback};
use prodshot_runninghub::client::{CreateOutcome, TaskPoll, WorkflowService};
use prodshot_runninghub::poll::PollState;

/// A workflow-service double driven by scripted responses.
///
/// Each call pops the next scripted response for its kind; when the
/// script is empty the call falls back to a success default (unique
/// upload refs and task ids, and `default_poll` for status checks).
pub struct ScriptedService {
    uploads: Mutex<VecDeque<Result<FileRef, WorkflowError>>>,
    creates: Mutex<VecDeque<Result<CreateOutcome, WorkflowError>>>,
    polls: Mutex<VecDeque<Result<TaskPoll, WorkflowError>>>,
    default_poll: Mutex<Option<TaskPoll>>,
    pub upload_calls: AtomicU32,
    pub create_calls: AtomicU32,
    pub poll_calls: AtomicU32,
}

impl ScriptedService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            uploads: Mutex::new(VecDeque::new()),
            creates: Mutex::new(VecDeque::new()),
            polls: Mutex::new(VecDeque::new()),
            default_poll: Mutex::new(None),
            upload_calls: AtomicU32::new(0),
            create_calls: AtomicU32::new(0),
            poll_calls: AtomicU32::new(0),
        })
    }

    pub async fn script_upload(&self, response: Result<FileRef, WorkflowError>) {
        self.uploads.lock().await.push_back(response);
    }

    pub async fn script_create(&self, response: Result<CreateOutcome, WorkflowError>) {
        self.creates.lock().await.push_back(response);
    }

    pub async fn script_poll(&self, response: Result<TaskPoll, WorkflowError>) {
        self.polls.lock().await.push_back(response);
    }

    /// Response used for every status check once the script runs out.
    /// When unset, unscripted polls succeed with a unique result ref.
    pub async fn set_default_poll(&self, poll: TaskPoll) {
        *self.default_poll.lock().await = Some(poll);
    }

    pub fn upload_count(&self) -> u32 {
        self.upload_calls.load(Ordering::SeqCst)
    }

    pub fn create_count(&self) -> u32 {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn poll_count(&self) -> u32 {
        self.poll_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkflowService for ScriptedService {
    async fn upload_asset(
        &self,
        _bytes: Vec<u8>,
        _account: &Account,
    ) -> Result<FileRef, WorkflowError> {
        let n = self.upload_calls.fetch_add(1, Ordering::SeqCst) + 1;
        match self.uploads.lock().await.pop_front() {
            Some(response) => response,
            None => Ok(FileRef(format!("upload-{n}"))),
        }
    }

    async fn create_task(
        &self,
        _refs: &[FileRef],
        _workflow_id: &WorkflowId,
        _account: &Account,
    ) -> Result<CreateOutcome, WorkflowError> {
        let n = self.create_calls.fetch_add(1, Ordering::SeqCst) + 1;
        match self.creates.lock().await.pop_front() {
            Some(response) => response,
            None => Ok(CreateOutcome::Created(format!("task-{n}"))),
        }
    }

    async fn poll_status(
        &self,
        _task_id: &TaskId,
        _account: &Account,
        state: &mut PollState,
    ) -> Result<TaskPoll, WorkflowError> {
        state.note_attempt();
        let n = self.poll_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(response) = self.polls.lock().await.pop_front() {
            return response;
        }
        match self.default_poll.lock().await.clone() {
            Some(poll) => Ok(poll),
            None => Ok(TaskPoll::Succeeded(FileRef(format!("result-{n}")))),
        }
    }
}

/// Build an account supporting the given job types.
pub fn account(key: &str, types: &[&str], max_concurrency: u32) -> Account {
    let workflows: HashMap<_, _> = types
        .iter()
        .map(|t| (JobType::from(*t), format!("wf-{t}")))
        .collect();
    Account::new(ApiKey::new(key), workflows, max_concurrency)
}

/// A pool pre-loaded with the given accounts.
pub async fn pool_with(accounts: Vec<Account>) -> Arc<AccountPool> {
    let pool = Arc::new(AccountPool::new());
    for acc in accounts {
        pool.add_account(acc).await;
    }
    pool
}

/// Millisecond-scale config so tests finish quickly.
pub fn test_config() -> DispatchConfig {
    DispatchConfig {
        queue_poll_interval: Duration::from_millis(10),
        max_retries: 3,
        queue_full_retries: 5,
        queue_full_delay: Duration::from_millis(5),
        poll_interval: Duration::from_millis(5),
        job_deadline: Duration::from_secs(5),
        shutdown_grace: Duration::from_millis(500),
    }
}

/// A one-shot callback plus the receiver for its outcome.
pub fn outcome_channel() -> (ResultCallback, oneshot::Receiver<JobOutcome>) {
    let (tx, rx) = oneshot::channel();
    let callback: ResultCallback = Box::new(move |outcome| {
        Box::pin(async move {
            let _ = tx.send(outcome);
        })
    });
    (callback, rx)
}

/// Await an outcome with a test-level timeout.
pub async fn expect_outcome(rx: oneshot::Receiver<JobOutcome>) -> JobOutcome {
    tokio::time::timeout(Duration::from_secs(10), rx)
        .await
        .expect("timed out waiting for job outcome")
        .expect("callback dropped without firing")
}
