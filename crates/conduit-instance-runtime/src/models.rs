//! Instance-level domain models for the control plane.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use conduit_entity::EntityType;

/// Flat key/value properties read from a lifecycle request payload.
pub type InstanceProperties = BTreeMap<String, String>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InstanceStatus {
    Waiting,
    Running,
    Suspended,
    Killed,
    Failed,
    Succeeded,
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Waiting => "WAITING",
            InstanceStatus::Running => "RUNNING",
            InstanceStatus::Suspended => "SUSPENDED",
            InstanceStatus::Killed => "KILLED",
            InstanceStatus::Failed => "FAILED",
            InstanceStatus::Succeeded => "SUCCEEDED",
        }
    }

    /// Whether the instance has stopped and can only be re-run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            InstanceStatus::Killed | InstanceStatus::Failed | InstanceStatus::Succeeded
        )
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One scheduled execution of an entity on one cluster at one nominal time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub entity_type: EntityType,
    pub entity_name: String,
    pub cluster: String,
    pub nominal_time: DateTime<Utc>,
    pub status: InstanceStatus,
    pub run_id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    /// `None` when no log location has been resolved for this run.
    #[serde(default)]
    pub log_url: Option<String>,
}

impl Instance {
    pub fn new(
        entity_type: EntityType,
        entity_name: impl Into<String>,
        cluster: impl Into<String>,
        nominal_time: DateTime<Utc>,
        status: InstanceStatus,
    ) -> Self {
        Self {
            entity_type,
            entity_name: entity_name.into(),
            cluster: cluster.into(),
            nominal_time,
            status,
            run_id: 0,
            workflow_id: None,
            log_url: None,
        }
    }

    pub fn with_workflow_id(mut self, workflow_id: impl Into<String>) -> Self {
        self.workflow_id = Some(workflow_id.into());
        self
    }

    pub fn with_run_id(mut self, run_id: u32) -> Self {
        self.run_id = run_id;
        self
    }
}

/// Response envelope for every instance operation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstancesResult {
    pub message: String,
    pub instances: Vec<Instance>,
}

impl InstancesResult {
    pub fn new(message: impl Into<String>, instances: Vec<Instance>) -> Self {
        Self {
            message: message.into(),
            instances,
        }
    }
}

/// Signal that one instance run failed and may be re-executed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryHandoff {
    pub entity_name: String,
    pub feed_name: Option<String>,
    pub nominal_time: String,
    pub run_id: String,
    pub workflow_id: String,
    pub received_at: DateTime<Utc>,
}

/// Completion event published by the execution engine for one instance run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionNotification {
    pub process: String,
    #[serde(default)]
    pub feed_name: Option<String>,
    #[serde(default)]
    pub feed_path: Option<String>,
    pub nominal_time: String,
    pub timestamp: String,
    pub status: String,
    pub workflow_id: String,
    pub run_id: String,
    pub received_at: DateTime<Utc>,
}

impl CompletionNotification {
    pub fn is_failure(&self) -> bool {
        self.status.trim().eq_ignore_ascii_case("FAILED")
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn notification(status: &str) -> CompletionNotification {
        CompletionNotification {
            process: "demo-process".into(),
            feed_name: None,
            feed_path: None,
            nominal_time: "2024-01-20T00:00Z".into(),
            timestamp: "2024-01-20T00:05Z".into(),
            status: status.into(),
            workflow_id: "wf-1".into(),
            run_id: "0".into(),
            received_at: Utc.with_ymd_and_hms(2024, 1, 20, 0, 6, 0).unwrap(),
        }
    }

    #[test]
    fn failure_status_is_case_insensitive() {
        assert!(notification("FAILED").is_failure());
        assert!(notification("failed").is_failure());
        assert!(notification("Failed").is_failure());
        assert!(!notification("SUCCEEDED").is_failure());
        assert!(!notification("KILLED").is_failure());
    }

    #[test]
    fn instance_status_serializes_upper_case() {
        let json = serde_json::to_string(&InstanceStatus::Suspended).expect("encode");
        assert_eq!(json, "\"SUSPENDED\"");
        assert!(InstanceStatus::Killed.is_terminal());
        assert!(!InstanceStatus::Waiting.is_terminal());
    }
}
