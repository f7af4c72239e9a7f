//! HTTP surface for the Conduit instance control plane.
//!
//! Routes map one-to-one onto [`LifecycleDispatcher`] operations and the
//! completion-notification trigger. Successful responses are wrapped in
//! [`ApiEnvelope`]; failures use the `{request_id, error}` envelope produced by
//! [`ApiError`].
//!
//! [`LifecycleDispatcher`]: conduit_instance_runtime::LifecycleDispatcher

pub mod api_errors;
pub mod api_handlers;
pub mod api_models;

pub use api_errors::ApiError;
pub use api_handlers::{build_router, ControlPlaneState};
pub use api_models::{ApiEnvelope, ApiMeta, CompletionRequest, CompletionResponse, InstanceQuery};
