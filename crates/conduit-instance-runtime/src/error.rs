//! Error taxonomy for instance operations and its client-facing projection.

use conduit_entity::{EntityType, RegistryError};

/// Date-range validation failure against one cluster window.
///
/// Timestamps are pre-formatted for user-facing messages.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum WindowError {
    #[error("Start date {start} is before {entity_type} start {window_start} on cluster {cluster}")]
    StartBeforeWindow {
        cluster: String,
        entity_type: EntityType,
        start: String,
        window_start: String,
    },
    #[error("Start date {start} is after end date {end}")]
    StartAfterEnd {
        cluster: String,
        entity_type: EntityType,
        start: String,
        end: String,
    },
    #[error("End date {end} is after {entity_type} end {window_end} on cluster {cluster}")]
    EndAfterWindow {
        cluster: String,
        entity_type: EntityType,
        end: String,
        window_end: String,
    },
    #[error("Start date {start} is after {entity_type} end {window_end} on cluster {cluster}")]
    StartAfterWindow {
        cluster: String,
        entity_type: EntityType,
        start: String,
        window_end: String,
    },
}

impl WindowError {
    pub fn cluster(&self) -> &str {
        match self {
            WindowError::StartBeforeWindow { cluster, .. }
            | WindowError::StartAfterEnd { cluster, .. }
            | WindowError::EndAfterWindow { cluster, .. }
            | WindowError::StartAfterWindow { cluster, .. } => cluster,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            WindowError::StartBeforeWindow { .. } => "start_before_window",
            WindowError::StartAfterEnd { .. } => "start_after_end",
            WindowError::EndAfterWindow { .. } => "end_after_window",
            WindowError::StartAfterWindow { .. } => "start_after_window",
        }
    }
}

/// Opaque failure reported by an execution engine adapter.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("execution engine rejected the request: {0}")]
    Rejected(String),
    #[error("execution engine unavailable: {0}")]
    Unavailable(String),
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("audit write failed: {0}")]
pub struct AuditError(pub String);

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum LogResolveError {
    #[error("{entity} is not defined on cluster '{cluster}'")]
    UnknownCluster { entity: String, cluster: String },
    #[error("run id '{0}' is not a valid attempt number")]
    InvalidRunId(String),
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InstanceError {
    #[error("Parameter {0} is empty")]
    MissingParameter(&'static str),
    #[error("colo '{0}' is not served by this control plane")]
    UnknownColo(String),
    #[error("{0}")]
    InvalidEntityType(String),
    #[error("{entity_type} entity '{name}' is not registered")]
    UnknownEntity {
        entity_type: EntityType,
        name: String,
    },
    #[error("invalid timestamp '{0}'. expected yyyy-MM-ddTHH:mmZ")]
    BadTimestamp(String),
    #[error("{0} declares no cluster windows")]
    NoClusterWindows(String),
    #[error(transparent)]
    Window(#[from] WindowError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Audit(#[from] AuditError),
    #[error(transparent)]
    Registry(RegistryError),
}

impl InstanceError {
    pub fn code(&self) -> &'static str {
        match self {
            InstanceError::MissingParameter(_) => "missing_parameter",
            InstanceError::UnknownColo(_) => "unknown_colo",
            InstanceError::InvalidEntityType(_) => "invalid_entity_type",
            InstanceError::UnknownEntity { .. } => "unknown_entity",
            InstanceError::BadTimestamp(_) => "bad_timestamp",
            InstanceError::NoClusterWindows(_) => "no_cluster_windows",
            InstanceError::Window(e) => e.code(),
            InstanceError::Engine(_) => "engine_failure",
            InstanceError::Audit(_) => "audit_failure",
            InstanceError::Registry(_) => "registry_failure",
        }
    }
}

impl From<RegistryError> for InstanceError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::UnknownEntity { entity_type, name } => {
                InstanceError::UnknownEntity { entity_type, name }
            }
            RegistryError::BadTimestamp(value) => InstanceError::BadTimestamp(value),
            other => InstanceError::Registry(other),
        }
    }
}

/// Client-visible failure of an instance operation.
///
/// Every validation and engine failure is reported as a bad request carrying
/// the original message; `code` identifies the underlying taxonomy entry.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct BadRequest {
    pub code: &'static str,
    pub message: String,
}

impl From<InstanceError> for BadRequest {
    fn from(err: InstanceError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

/// Upward failure signal raised for a `FAILED` completion notification.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{process}:{nominal_time} Failed")]
pub struct InstanceRunFailed {
    pub process: String,
    pub nominal_time: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_errors_map_onto_instance_taxonomy() {
        let unknown: InstanceError = RegistryError::UnknownEntity {
            entity_type: EntityType::Process,
            name: "ghost".into(),
        }
        .into();
        assert_eq!(unknown.code(), "unknown_entity");

        let bad_ts: InstanceError = RegistryError::BadTimestamp("soon".into()).into();
        assert_eq!(bad_ts, InstanceError::BadTimestamp("soon".into()));

        let storage: InstanceError = RegistryError::Storage("poisoned".into()).into();
        assert_eq!(storage.code(), "registry_failure");
    }

    #[test]
    fn bad_request_keeps_original_message() {
        let err = InstanceError::Window(WindowError::EndAfterWindow {
            cluster: "east".into(),
            entity_type: EntityType::Process,
            end: "2024-03-06T00:00Z".into(),
            window_end: "2024-02-01T00:00Z".into(),
        });
        let message = err.to_string();
        let bad_request = BadRequest::from(err);
        assert_eq!(bad_request.code, "end_after_window");
        assert_eq!(bad_request.message, message);
        assert_eq!(
            message,
            "End date 2024-03-06T00:00Z is after PROCESS end 2024-02-01T00:00Z on cluster east"
        );
    }
}
