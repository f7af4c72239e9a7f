//! Instance lifecycle control plane: window validation, lifecycle dispatch,
//! audit, log enrichment and failure-triggered retry escalation.

pub mod audit;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod log_resolver;
pub mod memory_engine;
pub mod models;
pub mod properties;
pub mod retry;
pub mod retry_queue;
#[cfg(feature = "sqlite-persistence")]
pub mod sqlite_audit;
pub mod window;

pub use audit::{
    AuditAction, AuditRecord, AuditSink, InMemoryAuditLog, LogAuditSink,
    DEFAULT_IN_MEMORY_AUDIT_CAPACITY,
};
pub use config::{AuditBackend, ControlPlaneConfig};
pub use dispatcher::{
    InstanceRequest, LifecycleAction, LifecycleDispatcher, RequestContext, DEFAULT_RUN_ID,
};
pub use engine::ExecutionEngine;
pub use error::{
    AuditError, BadRequest, EngineError, InstanceError, InstanceRunFailed, LogResolveError,
    WindowError,
};
pub use log_resolver::{LogCategory, LogResolver, TemplateLogResolver};
pub use memory_engine::InMemoryExecutionEngine;
pub use models::{
    CompletionNotification, Instance, InstanceProperties, InstanceStatus, InstancesResult,
    RetryHandoff,
};
pub use properties::parse_properties;
pub use retry::{CompletionAck, RetryEscalationTrigger, RetryScheduler};
pub use retry_queue::{
    DelayedRetryQueue, RetryBackoff, RetryPolicy, RetryTickResult, MAX_RETRY_ATTEMPTS,
    MAX_RETRY_DELAY_SECS, RETRY_RUN_ID_PROPERTY,
};
#[cfg(feature = "sqlite-persistence")]
pub use sqlite_audit::SqliteAuditLog;
pub use window::{effective_end, end_quantum, OrderedErrors, ValidatedRange, WindowResolver};
