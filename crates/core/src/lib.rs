//! Shared domain types for the prodshot generation platform.
//!
//! This crate holds the building blocks used by the RunningHub client
//! and the dispatcher:
//!
//! - [`types`] — job/asset identifiers and the terminal [`types::JobOutcome`].
//! - [`account`] — credentialed worker accounts and key fingerprinting.
//! - [`error`] — the typed failure taxonomy surfaced to callers.
//! - [`retry`] — backoff arithmetic and the transient-retry helper.
//!
//! It has no internal dependencies so every other crate can depend on it.

pub mod account;
pub mod error;
pub mod retry;
pub mod types;

pub use account::{Account, ApiKey};
pub use error::WorkflowError;
pub use retry::{next_delay, BackoffConfig, RetryPolicy};
pub use types::{AssetSource, FileRef, JobId, JobOutcome, JobType, RequesterId, TaskId, WorkflowId};
