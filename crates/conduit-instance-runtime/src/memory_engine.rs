//! In-process execution engine keeping instance state in memory.
//!
//! Backs the standalone server and the test suites. Transitions follow the
//! usual workflow-engine rules: only instances in a compatible state inside the
//! requested nominal range move; everything else is left untouched.

use std::sync::RwLock;

use chrono::{DateTime, Utc};

use conduit_entity::Entity;

use super::engine::ExecutionEngine;
use super::error::EngineError;
use super::models::{Instance, InstanceProperties, InstanceStatus, InstancesResult};

pub struct InMemoryExecutionEngine {
    instances: RwLock<Vec<Instance>>,
}

impl InMemoryExecutionEngine {
    pub fn new() -> Self {
        Self::with_instances(Vec::new())
    }

    pub fn with_instances(instances: Vec<Instance>) -> Self {
        Self {
            instances: RwLock::new(instances),
        }
    }

    /// Builds an engine from a JSON array of instances.
    pub fn from_json(raw: &str) -> Result<Self, EngineError> {
        let instances: Vec<Instance> = serde_json::from_str(raw)
            .map_err(|e| EngineError::Rejected(format!("decode instances: {}", e)))?;
        Ok(Self::with_instances(instances))
    }

    pub fn add_instance(&self, instance: Instance) -> Result<(), EngineError> {
        self.instances
            .write()
            .map_err(|e| EngineError::Unavailable(e.to_string()))?
            .push(instance);
        Ok(())
    }

    pub fn snapshot(&self) -> Vec<Instance> {
        self.instances
            .read()
            .map(|instances| instances.clone())
            .unwrap_or_default()
    }

    fn transition(
        &self,
        action: &str,
        entity: &Entity,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        eligible: fn(InstanceStatus) -> bool,
        target: InstanceStatus,
    ) -> Result<InstancesResult, EngineError> {
        let mut instances = self
            .instances
            .write()
            .map_err(|e| EngineError::Unavailable(e.to_string()))?;
        let mut changed = Vec::new();
        for instance in instances.iter_mut() {
            if !belongs_to(instance, entity) || !in_range(instance, start, end) {
                continue;
            }
            if !eligible(instance.status) {
                continue;
            }
            if target == InstanceStatus::Running && instance.status.is_terminal() {
                instance.run_id += 1;
            }
            instance.status = target;
            changed.push(instance.clone());
        }
        Ok(InstancesResult::new(
            format!("{} applied to {} instance(s)", action, changed.len()),
            changed,
        ))
    }
}

impl Default for InMemoryExecutionEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn belongs_to(instance: &Instance, entity: &Entity) -> bool {
    instance.entity_type == entity.entity_type && instance.entity_name == entity.name
}

fn in_range(instance: &Instance, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    instance.nominal_time >= start && instance.nominal_time < end
}

impl ExecutionEngine for InMemoryExecutionEngine {
    fn running_instances(&self, entity: &Entity) -> Result<InstancesResult, EngineError> {
        let instances = self
            .instances
            .read()
            .map_err(|e| EngineError::Unavailable(e.to_string()))?;
        let running = instances
            .iter()
            .filter(|i| belongs_to(i, entity) && i.status == InstanceStatus::Running)
            .cloned()
            .collect::<Vec<_>>();
        Ok(InstancesResult::new("Running Instances", running))
    }

    fn status(
        &self,
        entity: &Entity,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<InstancesResult, EngineError> {
        let instances = self
            .instances
            .read()
            .map_err(|e| EngineError::Unavailable(e.to_string()))?;
        let mut matched = instances
            .iter()
            .filter(|i| belongs_to(i, entity) && in_range(i, start, end))
            .cloned()
            .collect::<Vec<_>>();
        matched.sort_by(|a, b| a.nominal_time.cmp(&b.nominal_time));
        Ok(InstancesResult::new("Instance Status", matched))
    }

    fn kill(
        &self,
        entity: &Entity,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        _props: &InstanceProperties,
    ) -> Result<InstancesResult, EngineError> {
        self.transition(
            "KILL",
            entity,
            start,
            end,
            |s| !s.is_terminal(),
            InstanceStatus::Killed,
        )
    }

    fn suspend(
        &self,
        entity: &Entity,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        _props: &InstanceProperties,
    ) -> Result<InstancesResult, EngineError> {
        self.transition(
            "SUSPEND",
            entity,
            start,
            end,
            |s| matches!(s, InstanceStatus::Running | InstanceStatus::Waiting),
            InstanceStatus::Suspended,
        )
    }

    fn resume(
        &self,
        entity: &Entity,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        _props: &InstanceProperties,
    ) -> Result<InstancesResult, EngineError> {
        self.transition(
            "RESUME",
            entity,
            start,
            end,
            |s| s == InstanceStatus::Suspended,
            InstanceStatus::Running,
        )
    }

    fn rerun(
        &self,
        entity: &Entity,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        _props: &InstanceProperties,
    ) -> Result<InstancesResult, EngineError> {
        self.transition(
            "RERUN",
            entity,
            start,
            end,
            |s| s.is_terminal(),
            InstanceStatus::Running,
        )
    }

    fn rerun_workflow(
        &self,
        workflow_id: &str,
        _props: &InstanceProperties,
    ) -> Result<(), EngineError> {
        let mut instances = self
            .instances
            .write()
            .map_err(|e| EngineError::Unavailable(e.to_string()))?;
        let instance = instances
            .iter_mut()
            .find(|i| i.workflow_id.as_deref() == Some(workflow_id))
            .ok_or_else(|| EngineError::Rejected(format!("unknown workflow {}", workflow_id)))?;
        if !instance.status.is_terminal() {
            return Err(EngineError::Rejected(format!(
                "workflow {} is {} and cannot be re-run",
                workflow_id, instance.status
            )));
        }
        instance.status = InstanceStatus::Running;
        instance.run_id += 1;
        Ok(())
    }
}
