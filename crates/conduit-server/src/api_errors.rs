//! HTTP error mapping for control-plane handlers.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;

use conduit_instance_runtime::{BadRequest, InstanceRunFailed};

#[derive(Clone, Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(ErrorState),
    Internal(ErrorState),
}

#[derive(Clone, Debug)]
pub struct ErrorState {
    pub code: &'static str,
    pub message: String,
    pub request_id: Option<String>,
    pub details: Option<Value>,
}

impl ErrorState {
    fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            request_id: None,
            details: None,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
struct ErrorEnvelope {
    request_id: String,
    error: ErrorBody,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(ErrorState::new("invalid_argument", message))
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(ErrorState::new("internal", message))
    }

    fn state_mut(&mut self) -> &mut ErrorState {
        match self {
            Self::BadRequest(s) | Self::Internal(s) => s,
        }
    }

    pub fn with_code(mut self, code: &'static str) -> Self {
        self.state_mut().code = code;
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.state_mut().request_id = Some(request_id.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.state_mut().details = Some(details);
        self
    }
}

impl From<BadRequest> for ApiError {
    fn from(err: BadRequest) -> Self {
        Self::bad_request(err.message).with_code(err.code)
    }
}

impl From<InstanceRunFailed> for ApiError {
    fn from(err: InstanceRunFailed) -> Self {
        let details = serde_json::json!({
            "process": err.process,
            "nominal_time": err.nominal_time,
        });
        Self::internal(err.to_string())
            .with_code("instance_run_failed")
            .with_details(details)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, state) = match self {
            Self::BadRequest(s) => (StatusCode::BAD_REQUEST, s),
            Self::Internal(s) => (StatusCode::INTERNAL_SERVER_ERROR, s),
        };
        let request_id = state
            .request_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let body = ErrorEnvelope {
            request_id,
            error: ErrorBody {
                code: state.code,
                message: state.message,
                details: state.details,
            },
        };
        (status, Json(body)).into_response()
    }
}
