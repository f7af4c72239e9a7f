//! Execution-engine contract used by the lifecycle dispatcher.

use chrono::{DateTime, Utc};

use conduit_entity::Entity;

use super::error::EngineError;
use super::models::{InstanceProperties, InstancesResult};

/// Capability interface over the engine that runs entity instances.
///
/// The control plane never mutates instance state itself; every transition is
/// requested through one of these calls. Ranges are `[start, end)` over the
/// instances' nominal times. Implementations own their own synchronization and
/// decide whether concurrent requests for the same range are serialized.
pub trait ExecutionEngine: Send + Sync {
    fn running_instances(&self, entity: &Entity) -> Result<InstancesResult, EngineError>;

    fn status(
        &self,
        entity: &Entity,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<InstancesResult, EngineError>;

    fn kill(
        &self,
        entity: &Entity,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        props: &InstanceProperties,
    ) -> Result<InstancesResult, EngineError>;

    fn suspend(
        &self,
        entity: &Entity,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        props: &InstanceProperties,
    ) -> Result<InstancesResult, EngineError>;

    fn resume(
        &self,
        entity: &Entity,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        props: &InstanceProperties,
    ) -> Result<InstancesResult, EngineError>;

    fn rerun(
        &self,
        entity: &Entity,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        props: &InstanceProperties,
    ) -> Result<InstancesResult, EngineError>;

    /// Re-executes a single failed workflow run. Used by retry schedulers.
    fn rerun_workflow(
        &self,
        workflow_id: &str,
        props: &InstanceProperties,
    ) -> Result<(), EngineError>;
}
