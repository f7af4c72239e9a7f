//! Audit trail for mutating instance operations.

use std::collections::VecDeque;
use std::fmt;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::AuditError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditAction {
    #[serde(rename = "INSTANCE_KILL")]
    InstanceKill,
    #[serde(rename = "INSTANCE_SUSPEND")]
    InstanceSuspend,
    #[serde(rename = "INSTANCE_RESUME")]
    InstanceResume,
    #[serde(rename = "INSTANCE_RERUN")]
    InstanceRerun,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::InstanceKill => "INSTANCE_KILL",
            AuditAction::InstanceSuspend => "INSTANCE_SUSPEND",
            AuditAction::InstanceResume => "INSTANCE_RESUME",
            AuditAction::InstanceRerun => "INSTANCE_RERUN",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub action: AuditAction,
    /// Entity type exactly as requested; it has not been validated yet when
    /// the record is written.
    pub entity_type: String,
    pub entity_name: String,
    pub request_id: String,
    pub requester: Option<String>,
    pub remote_addr: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

pub trait AuditSink: Send + Sync {
    fn record(&self, record: &AuditRecord) -> Result<(), AuditError>;
}

/// Writes audit records to the `log` facade under the `conduit::audit` target.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogAuditSink;

impl AuditSink for LogAuditSink {
    fn record(&self, record: &AuditRecord) -> Result<(), AuditError> {
        log::info!(
            target: "conduit::audit",
            "audit action={} entity_type={} entity={} request_id={} requester={} remote_addr={} at={}",
            record.action,
            record.entity_type,
            record.entity_name,
            record.request_id,
            record.requester.as_deref().unwrap_or("-"),
            record.remote_addr.as_deref().unwrap_or("-"),
            record.recorded_at.to_rfc3339()
        );
        Ok(())
    }
}

/// Default number of records retained by [`InMemoryAuditLog::new`].
pub const DEFAULT_IN_MEMORY_AUDIT_CAPACITY: usize = 10_000;

/// Keeps the most recent audit records in memory, in write order.
///
/// Meant for tests and short-lived inspection. Once `capacity` records are
/// held, each new record evicts the oldest one; use the sqlite sink for a
/// durable trail.
pub struct InMemoryAuditLog {
    capacity: usize,
    records: RwLock<VecDeque<AuditRecord>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_IN_MEMORY_AUDIT_CAPACITY)
    }

    /// A capacity of zero is treated as one.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            records: RwLock::new(VecDeque::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .read()
            .map(|records| records.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for InMemoryAuditLog {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditSink for InMemoryAuditLog {
    fn record(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let mut records = self
            .records
            .write()
            .map_err(|e| AuditError(e.to_string()))?;
        while records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(record.clone());
        Ok(())
    }
}
