//! Admission-controlled job dispatch for the generation platform.
//!
//! The pieces, bottom up:
//!
//! - [`pool`] — [`AccountPool`], the single-mutex registry of worker
//!   accounts with least-loaded acquire and idempotent release.
//! - [`job`] — the [`Job`] record and its status state machine.
//! - [`dispatcher`] — the FIFO queue and background loop that pairs
//!   jobs with accounts, fans out one task per job, and enforces
//!   deadlines, retries, cancellation, and guaranteed release.
//! - [`orchestrator`] — the boundary the messaging front end calls:
//!   submit, cancel, shutdown, temp-file cleanup.
//! - [`config`] — env-tunable dispatch parameters and account loading.

pub mod config;
pub mod dispatcher;
pub mod job;
pub mod orchestrator;
pub mod pool;

pub use config::DispatchConfig;
pub use dispatcher::Dispatcher;
pub use job::{Job, JobStatus, ResultCallback};
pub use orchestrator::Orchestrator;
pub use pool::AccountPool;
