//! Delayed retry queue backing the retry escalation trigger.
//!
//! Hand-offs wait until their backoff delay has elapsed and are re-executed by
//! a periodic [`DelayedRetryQueue::tick`]. The queue is process-local; pending
//! retries do not survive a restart.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

use super::engine::ExecutionEngine;
use super::error::EngineError;
use super::models::{InstanceProperties, RetryHandoff};
use super::retry::RetryScheduler;

/// Property carrying the attempt number handed to a re-executed workflow.
pub const RETRY_RUN_ID_PROPERTY: &str = "retry.run.id";

/// Upper bound on any single retry delay, whatever the backoff computes.
pub const MAX_RETRY_DELAY_SECS: i64 = 7 * 24 * 60 * 60;

/// Upper bound on the configured number of re-executions per run.
pub const MAX_RETRY_ATTEMPTS: u32 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryBackoff {
    Periodic,
    Exponential,
}

impl std::str::FromStr for RetryBackoff {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "periodic" => Ok(RetryBackoff::Periodic),
            "exponential" => Ok(RetryBackoff::Exponential),
            other => Err(format!("unknown retry backoff '{}'", other)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub delay: Duration,
    /// Maximum number of re-executions per run.
    pub attempts: u32,
    pub backoff: RetryBackoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::seconds(600),
            attempts: 3,
            backoff: RetryBackoff::Periodic,
        }
    }
}

impl RetryPolicy {
    /// Delay before re-executing the attempt that follows `attempt`, capped at
    /// [`MAX_RETRY_DELAY_SECS`].
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let max_millis = MAX_RETRY_DELAY_SECS * 1_000;
        let base = self.delay.num_milliseconds().max(0);
        let millis = match self.backoff {
            RetryBackoff::Periodic => Some(base),
            RetryBackoff::Exponential => 2_i64
                .checked_pow(attempt)
                .and_then(|factor| base.checked_mul(factor)),
        };
        Duration::milliseconds(millis.unwrap_or(max_millis).min(max_millis))
    }
}

/// Result of a periodic retry tick.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RetryTickResult {
    pub rerun: u64,
    pub failed: u64,
}

struct PendingRetry<E> {
    handoff: RetryHandoff,
    engine: Arc<E>,
    attempt: u32,
    due_at: DateTime<Utc>,
}

pub struct DelayedRetryQueue<E: ExecutionEngine> {
    policy: RetryPolicy,
    pending: Mutex<Vec<PendingRetry<E>>>,
}

impl<E: ExecutionEngine> DelayedRetryQueue<E> {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn pending(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or_default()
    }

    /// Re-executes every hand-off due at `now`, earliest first.
    ///
    /// A failed re-execution is logged and counted; it is not queued again.
    pub fn tick(&self, now: DateTime<Utc>) -> Result<RetryTickResult, EngineError> {
        let mut due = {
            let mut pending = self
                .pending
                .lock()
                .map_err(|e| EngineError::Unavailable(e.to_string()))?;
            let (due, waiting): (Vec<_>, Vec<_>) =
                pending.drain(..).partition(|p| p.due_at <= now);
            *pending = waiting;
            due
        };
        due.sort_by_key(|p| p.due_at);

        let mut result = RetryTickResult::default();
        for retry in due {
            let next_attempt = retry.attempt + 1;
            let mut props = InstanceProperties::new();
            props.insert(RETRY_RUN_ID_PROPERTY.to_string(), next_attempt.to_string());
            match retry.engine.rerun_workflow(&retry.handoff.workflow_id, &props) {
                Ok(()) => {
                    log::info!(
                        "retry rerun entity={} nominal_time={} workflow_id={} attempt={}",
                        retry.handoff.entity_name,
                        retry.handoff.nominal_time,
                        retry.handoff.workflow_id,
                        next_attempt
                    );
                    result.rerun += 1;
                }
                Err(err) => {
                    log::warn!(
                        "retry rerun failed entity={} workflow_id={}: {}",
                        retry.handoff.entity_name,
                        retry.handoff.workflow_id,
                        err
                    );
                    result.failed += 1;
                }
            }
        }
        Ok(result)
    }
}

impl<E: ExecutionEngine> RetryScheduler<E> for DelayedRetryQueue<E> {
    fn submit(&self, handoff: RetryHandoff, engine: Arc<E>) {
        let attempt = handoff.run_id.trim().parse::<u32>().unwrap_or(0);
        if attempt >= self.policy.attempts {
            log::warn!(
                "retries exhausted entity={} nominal_time={} workflow_id={} attempts={}",
                handoff.entity_name,
                handoff.nominal_time,
                handoff.workflow_id,
                self.policy.attempts
            );
            return;
        }
        let due_at = handoff
            .received_at
            .checked_add_signed(self.policy.delay_for(attempt))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        match self.pending.lock() {
            Ok(mut pending) => pending.push(PendingRetry {
                handoff,
                engine,
                attempt,
                due_at,
            }),
            Err(err) => log::error!("retry queue unavailable: {}", err),
        }
    }
}
