//! Account pool: admission control over the worker accounts.
//!
//! Total concurrent remote work is capped by the sum of the accounts'
//! capacities, enforced by [`AccountPool::acquire`] returning `None`
//! when nothing qualifies. That `None` is the back-pressure signal the
//! dispatcher waits on.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;

use prodshot_core::types::JobType;
use prodshot_core::Account;

/// Per-account load bookkeeping, only ever touched under the pool's
/// mutex.
struct Slot {
    account: Arc<Account>,
    current_load: u32,
    last_used: Option<Instant>,
}

/// Point-in-time load snapshot, for logs and tests.
#[derive(Debug, Clone)]
pub struct AccountLoad {
    pub account_id: String,
    pub current_load: u32,
    pub max_concurrency: u32,
}

/// Registry of worker accounts with atomic acquire/release.
///
/// All state lives behind one mutex; no method performs I/O, so the
/// critical sections are short.
pub struct AccountPool {
    slots: Mutex<Vec<Slot>>,
}

impl AccountPool {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(Vec::new()),
        }
    }

    /// Register an account. Accounts are never removed at runtime.
    pub async fn add_account(&self, account: Account) {
        let types: Vec<&str> = account.workflows.keys().map(|t| t.as_str()).collect();
        tracing::info!(
            account_id = %account.id,
            max_concurrency = account.max_concurrency,
            job_types = ?types,
            "Registered worker account",
        );
        self.slots.lock().await.push(Slot {
            account: Arc::new(account),
            current_load: 0,
            last_used: None,
        });
    }

    /// Whether any account supports the job type at all, regardless of
    /// current load. Backs the dispatcher's capability fast-fail.
    pub async fn supports(&self, job_type: &JobType) -> bool {
        self.slots
            .lock()
            .await
            .iter()
            .any(|s| s.account.supports(job_type))
    }

    /// Acquire the least-loaded account able to run `job_type`.
    ///
    /// Ties break by oldest `last_used` (never-used counts as oldest)
    /// so load spreads evenly over time. Returns `None` when every
    /// candidate is at capacity — the caller should wait and retry.
    pub async fn acquire(&self, job_type: &JobType) -> Option<Arc<Account>> {
        let mut slots = self.slots.lock().await;

        let slot = slots
            .iter_mut()
            .filter(|s| {
                s.account.supports(job_type) && s.current_load < s.account.max_concurrency
            })
            .min_by_key(|s| (s.current_load, s.last_used))?;

        slot.current_load += 1;
        slot.last_used = Some(Instant::now());
        tracing::debug!(
            account_id = %slot.account.id,
            current_load = slot.current_load,
            max_concurrency = slot.account.max_concurrency,
            "Acquired account",
        );
        Some(Arc::clone(&slot.account))
    }

    /// Release one unit of load on the given account.
    ///
    /// Idempotent: the load floor is zero, so releasing an account that
    /// is already idle is a no-op.
    pub async fn release(&self, account_id: &str) {
        let mut slots = self.slots.lock().await;
        if let Some(slot) = slots.iter_mut().find(|s| s.account.id == account_id) {
            slot.current_load = slot.current_load.saturating_sub(1);
            tracing::debug!(
                account_id = %account_id,
                current_load = slot.current_load,
                "Released account",
            );
        } else {
            tracing::warn!(account_id = %account_id, "Release for unknown account");
        }
    }

    /// Reset every account's load to zero. Shutdown safety net only.
    pub async fn release_all(&self) {
        let mut slots = self.slots.lock().await;
        for slot in slots.iter_mut() {
            slot.current_load = 0;
        }
    }

    /// Current load of every registered account.
    pub async fn snapshot(&self) -> Vec<AccountLoad> {
        self.slots
            .lock()
            .await
            .iter()
            .map(|s| AccountLoad {
                account_id: s.account.id.clone(),
                current_load: s.current_load,
                max_concurrency: s.account.max_concurrency,
            })
            .collect()
    }
}

impl Default for AccountPool {
    fn default() -> Self {
        Self::new()
    }
}
