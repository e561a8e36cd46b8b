//! RunningHub REST client library.
//!
//! Speaks the RunningHub task protocol (asset upload, task creation,
//! status polling, output retrieval) on behalf of a worker [`Account`]:
//!
//! - [`api`] — thin typed wrappers over the raw HTTP endpoints.
//! - [`client`] — [`RunningHubClient`], the retrying, policy-aware
//!   client plus the [`WorkflowService`] trait the dispatcher runs
//!   against.
//! - [`poll`] — per-task [`PollState`] and the freshness gate that
//!   rejects stale cached results the service has been observed to
//!   return right after submission.
//!
//! [`Account`]: prodshot_core::Account

pub mod api;
pub mod client;
pub mod poll;

pub use api::{ApiError, RemoteStatus, RunningHubApi};
pub use client::{ClientConfig, CreateOutcome, NodeBinding, RunningHubClient, TaskPoll, WorkflowService};
pub use poll::{FreshnessConfig, PollState, Verdict};
