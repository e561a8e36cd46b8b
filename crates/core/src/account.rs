//! Worker accounts for the remote generation service.
//!
//! An [`Account`] is a credentialed, capacity-limited identity used to
//! submit work. The credential itself is wrapped in [`ApiKey`] so it
//! never leaks through `Debug` output or logs; accounts are identified
//! everywhere else by a SHA-256 fingerprint of the key.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use crate::types::{JobType, WorkflowId};

/// How many hex characters of the key digest form the account id.
const FINGERPRINT_LENGTH: usize = 12;

/// An API key for the remote service.
///
/// `Debug` prints a redacted placeholder; call [`ApiKey::expose`] at
/// the single point where the raw value is written into a request.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The raw secret. Only the HTTP layer should call this.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Stable, non-reversible identifier derived from the key.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        let hex = format!("{digest:x}");
        hex[..FINGERPRINT_LENGTH].to_string()
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(****)")
    }
}

/// A worker account on the remote generation service.
///
/// Load accounting (`current_load`, `last_used`) is owned by the
/// account pool, not the account itself, so a shared `Arc<Account>`
/// stays immutable.
#[derive(Debug, Clone)]
pub struct Account {
    /// Fingerprint of the API key; used in logs and pool bookkeeping.
    pub id: String,
    /// The credential presented to the remote service.
    pub api_key: ApiKey,
    /// Job types this account can run, mapped to remote workflow ids.
    pub workflows: HashMap<JobType, WorkflowId>,
    /// Maximum number of concurrent remote tasks for this account.
    pub max_concurrency: u32,
}

impl Account {
    pub fn new(
        api_key: ApiKey,
        workflows: HashMap<JobType, WorkflowId>,
        max_concurrency: u32,
    ) -> Self {
        Self {
            id: api_key.fingerprint(),
            api_key,
            workflows,
            max_concurrency,
        }
    }

    /// Whether this account can run the given job type.
    pub fn supports(&self, job_type: &JobType) -> bool {
        self.workflows.contains_key(job_type)
    }

    /// The remote workflow id bound to the given job type, if supported.
    pub fn workflow_for(&self, job_type: &JobType) -> Option<&WorkflowId> {
        self.workflows.get(job_type)
    }
}
