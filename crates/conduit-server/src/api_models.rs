//! Request and response shapes for the control-plane HTTP API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use conduit_instance_runtime::CompletionNotification;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub meta: ApiMeta,
    pub request_id: String,
    pub data: T,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiMeta {
    pub status: String,
    pub api_version: String,
}

impl ApiMeta {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            api_version: "v1".to_string(),
        }
    }
}

/// Query string shared by the instance endpoints. Which fields are required
/// depends on the operation.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct InstanceQuery {
    pub colo: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub runid: Option<String>,
}

/// Completion event as posted by the execution engine.
#[derive(Clone, Debug, Deserialize)]
pub struct CompletionRequest {
    pub process: String,
    #[serde(default)]
    pub feed_name: Option<String>,
    #[serde(default)]
    pub feed_path: Option<String>,
    #[serde(default)]
    pub nominal_time: String,
    #[serde(default)]
    pub timestamp: String,
    pub status: String,
    #[serde(default)]
    pub workflow_id: String,
    #[serde(default)]
    pub run_id: String,
}

impl CompletionRequest {
    pub fn into_notification(self, received_at: DateTime<Utc>) -> CompletionNotification {
        CompletionNotification {
            process: self.process,
            feed_name: self.feed_name,
            feed_path: self.feed_path,
            nominal_time: self.nominal_time,
            timestamp: self.timestamp,
            status: self.status,
            workflow_id: self.workflow_id,
            run_id: self.run_id,
            received_at,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub result: String,
}
