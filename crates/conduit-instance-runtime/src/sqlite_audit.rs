//! SQLite-backed audit log.

use std::str::FromStr;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::audit::{AuditAction, AuditRecord, AuditSink};
use super::error::AuditError;

impl FromStr for AuditAction {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INSTANCE_KILL" => Ok(AuditAction::InstanceKill),
            "INSTANCE_SUSPEND" => Ok(AuditAction::InstanceSuspend),
            "INSTANCE_RESUME" => Ok(AuditAction::InstanceResume),
            "INSTANCE_RERUN" => Ok(AuditAction::InstanceRerun),
            other => Err(AuditError(format!("unknown audit action '{}'", other))),
        }
    }
}

#[derive(Clone)]
pub struct SqliteAuditLog {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteAuditLog {
    pub fn new(db_path: &str) -> Result<Self, AuditError> {
        let conn = Connection::open(db_path)
            .map_err(|e| AuditError(format!("failed to open audit sqlite db: {}", e)))?;
        let this = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        this.ensure_schema()?;
        Ok(this)
    }

    fn ensure_schema(&self) -> Result<(), AuditError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| AuditError("audit sqlite lock poisoned".to_string()))?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS instance_audit_log (
              audit_id INTEGER PRIMARY KEY AUTOINCREMENT,
              action TEXT NOT NULL,
              entity_type TEXT NOT NULL,
              entity_name TEXT NOT NULL,
              request_id TEXT NOT NULL,
              requester TEXT,
              remote_addr TEXT,
              recorded_at TEXT NOT NULL
            );
            "#,
        )
        .map_err(|e| AuditError(format!("failed to init audit schema: {}", e)))?;
        Ok(())
    }

    /// Most recent records first.
    pub fn recent(&self, limit: usize) -> Result<Vec<AuditRecord>, AuditError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| AuditError("audit sqlite lock poisoned".to_string()))?;
        let mut stmt = conn
            .prepare(
                "SELECT action, entity_type, entity_name, request_id, requester, remote_addr, recorded_at
                 FROM instance_audit_log ORDER BY audit_id DESC LIMIT ?1",
            )
            .map_err(|e| AuditError(format!("failed to prepare audit query: {}", e)))?;
        let rows = stmt
            .query_map(params![limit as i64], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, Option<String>>(4)?,
                    r.get::<_, Option<String>>(5)?,
                    r.get::<_, String>(6)?,
                ))
            })
            .map_err(|e| AuditError(format!("failed to query audit log: {}", e)))?;

        let mut records = Vec::new();
        for row in rows {
            let (action, entity_type, entity_name, request_id, requester, remote_addr, at) =
                row.map_err(|e| AuditError(format!("failed to read audit row: {}", e)))?;
            let recorded_at = DateTime::parse_from_rfc3339(&at)
                .map_err(|e| AuditError(format!("invalid audit timestamp '{}': {}", at, e)))?
                .with_timezone(&Utc);
            records.push(AuditRecord {
                action: action.parse()?,
                entity_type,
                entity_name,
                request_id,
                requester,
                remote_addr,
                recorded_at,
            });
        }
        Ok(records)
    }
}

impl AuditSink for SqliteAuditLog {
    fn record(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| AuditError("audit sqlite lock poisoned".to_string()))?;
        conn.execute(
            "INSERT INTO instance_audit_log
             (action, entity_type, entity_name, request_id, requester, remote_addr, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.action.as_str(),
                record.entity_type,
                record.entity_name,
                record.request_id,
                record.requester,
                record.remote_addr,
                record.recorded_at.to_rfc3339()
            ],
        )
        .map_err(|e| AuditError(format!("failed to persist audit record: {}", e)))?;
        Ok(())
    }
}
