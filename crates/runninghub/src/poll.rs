//! Completion polling state and the stale-result freshness gate.
//!
//! RunningHub has been observed to answer a status poll with `SUCCESS`
//! and a *previous* task's artifact immediately after submission.
//! Accepting that naively hands one user another user's image, so a
//! `SUCCESS` response has to clear three checks before it is trusted:
//!
//! 1. a minimum wall-clock grace period since submission,
//! 2. a sanity floor on the remote-reported processing time,
//! 3. suspicion of a result reference identical to the previous poll's
//!    — the first repeat is rejected once and only a subsequent
//!    observation is accepted.
//!
//! None of these are documented contracts of the service; the
//! thresholds live in [`FreshnessConfig`] and are meant to be tuned
//! against production behaviour.

use std::time::{Duration, Instant};

/// Tunable thresholds for the freshness gate.
#[derive(Debug, Clone)]
pub struct FreshnessConfig {
    /// No `SUCCESS` is trusted before this much time has passed since
    /// task submission.
    pub grace_period: Duration,
    /// Reported processing times below this are treated as cached.
    pub min_cost_time: Duration,
    /// How many times a repeated result reference is rejected before a
    /// further observation of it is accepted.
    pub repeat_suspicion: u32,
}

impl Default for FreshnessConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(10),
            min_cost_time: Duration::from_secs(2),
            repeat_suspicion: 1,
        }
    }
}

/// Ephemeral polling state for one in-flight task.
///
/// Created right after task submission, discarded when polling ends.
#[derive(Debug)]
pub struct PollState {
    submitted_at: Instant,
    last_result: Option<String>,
    repeat_rejections: u32,
    attempts: u32,
}

impl PollState {
    /// State for a task submitted now.
    pub fn new() -> Self {
        Self::submitted_at(Instant::now())
    }

    /// State for a task submitted at a specific instant.
    pub fn submitted_at(instant: Instant) -> Self {
        Self {
            submitted_at: instant,
            last_result: None,
            repeat_rejections: 0,
            attempts: 0,
        }
    }

    /// Record one status-check attempt.
    pub fn note_attempt(&mut self) {
        self.attempts += 1;
    }

    /// Number of status checks issued so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

impl Default for PollState {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of running a `SUCCESS` response through the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The result is fresh; report completion.
    Trusted,
    /// The result is suspect; keep polling as if the task were running.
    Suspect(&'static str),
}

/// Evaluate a `SUCCESS` result against the freshness gate.
///
/// Mutates `state`: every observed reference becomes the comparison
/// point for the next poll, and a rejected repeat consumes one unit of
/// repeat suspicion.
pub fn evaluate_result(
    state: &mut PollState,
    result_ref: &str,
    cost_time: Option<Duration>,
    now: Instant,
    config: &FreshnessConfig,
) -> Verdict {
    let repeated = state.last_result.as_deref() == Some(result_ref);
    if !repeated {
        // Suspicion is per-value: a new reference starts a fresh cycle.
        state.repeat_rejections = 0;
    }
    state.last_result = Some(result_ref.to_string());

    if now.duration_since(state.submitted_at) < config.grace_period {
        return Verdict::Suspect("success reported within the grace period");
    }

    if let Some(cost) = cost_time {
        if cost < config.min_cost_time {
            return Verdict::Suspect("reported processing time implausibly small");
        }
    }

    if repeated && state.repeat_rejections < config.repeat_suspicion {
        state.repeat_rejections += 1;
        return Verdict::Suspect("result reference repeated from previous poll");
    }

    Verdict::Trusted
}
