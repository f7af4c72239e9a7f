//! Failure-triggered retry escalation.
//!
//! The trigger reacts to completion notifications. A `FAILED` run is handed
//! to the injected [`RetryScheduler`] together with the engine it should be
//! re-executed against, and the caller receives an [`InstanceRunFailed`]
//! signal. Every other status is acknowledged.

use std::sync::Arc;

use super::engine::ExecutionEngine;
use super::error::InstanceRunFailed;
use super::models::{CompletionNotification, RetryHandoff};

/// Receives hand-offs for failed runs. Submission is fire-and-forget.
pub trait RetryScheduler<E: ExecutionEngine>: Send + Sync {
    fn submit(&self, handoff: RetryHandoff, engine: Arc<E>);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompletionAck {
    Done,
}

impl CompletionAck {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionAck::Done => "DONE",
        }
    }
}

pub struct RetryEscalationTrigger<E: ExecutionEngine> {
    engine: Arc<E>,
    scheduler: Arc<dyn RetryScheduler<E>>,
}

impl<E: ExecutionEngine> RetryEscalationTrigger<E> {
    pub fn new(engine: Arc<E>, scheduler: Arc<dyn RetryScheduler<E>>) -> Self {
        Self { engine, scheduler }
    }

    /// Repeated notifications for the same run produce repeated hand-offs.
    pub fn on_completion(
        &self,
        notification: &CompletionNotification,
    ) -> Result<CompletionAck, InstanceRunFailed> {
        if !notification.is_failure() {
            return Ok(CompletionAck::Done);
        }

        log::warn!(
            "run failed process={} nominal_time={} workflow_id={} run_id={}",
            notification.process,
            notification.nominal_time,
            notification.workflow_id,
            notification.run_id
        );
        self.scheduler.submit(
            RetryHandoff {
                entity_name: notification.process.clone(),
                feed_name: notification.feed_name.clone(),
                nominal_time: notification.nominal_time.clone(),
                run_id: notification.run_id.clone(),
                workflow_id: notification.workflow_id.clone(),
                received_at: notification.received_at,
            },
            self.engine.clone(),
        );
        Err(InstanceRunFailed {
            process: notification.process.clone(),
            nominal_time: notification.nominal_time.clone(),
        })
    }
}
