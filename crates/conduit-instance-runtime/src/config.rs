//! Control-plane configuration read from `CONDUIT_*` environment variables.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Duration;

use super::audit::{AuditSink, InMemoryAuditLog, LogAuditSink};
use super::retry_queue::{
    RetryBackoff, RetryPolicy, MAX_RETRY_ATTEMPTS, MAX_RETRY_DELAY_SECS,
};

const DEFAULT_COLOS: &str = "local";
const DEFAULT_LOG_BASE_URL: &str = "http://localhost:11000/logs";
const DEFAULT_SQLITE_DB: &str = "conduit_audit.db";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuditBackend {
    Log,
    /// Bounded in-process log for tests and inspection; not durable.
    Memory,
    Sqlite,
}

#[derive(Clone, Debug)]
pub struct ControlPlaneConfig {
    pub colos: Vec<String>,
    pub log_base_url: String,
    pub audit_backend: AuditBackend,
    pub sqlite_db_path: String,
    pub retry: RetryPolicy,
}

impl ControlPlaneConfig {
    pub fn from_env() -> Result<Self, String> {
        let mut envs = HashMap::new();
        for key in [
            "CONDUIT_COLOS",
            "CONDUIT_LOG_BASE_URL",
            "CONDUIT_AUDIT_BACKEND",
            "CONDUIT_SQLITE_DB",
            "CONDUIT_RETRY_DELAY_SECS",
            "CONDUIT_RETRY_ATTEMPTS",
            "CONDUIT_RETRY_BACKOFF",
        ] {
            if let Ok(value) = std::env::var(key) {
                envs.insert(key.to_string(), value);
            }
        }
        Self::from_env_map(&envs)
    }

    pub fn from_env_map(envs: &HashMap<String, String>) -> Result<Self, String> {
        let colos: Vec<String> = non_empty(envs, "CONDUIT_COLOS")
            .unwrap_or_else(|| DEFAULT_COLOS.to_string())
            .split(',')
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        if colos.is_empty() {
            return Err("CONDUIT_COLOS must name at least one colo".to_string());
        }

        let log_base_url = non_empty(envs, "CONDUIT_LOG_BASE_URL")
            .unwrap_or_else(|| DEFAULT_LOG_BASE_URL.to_string());

        let backend_raw = non_empty(envs, "CONDUIT_AUDIT_BACKEND")
            .map(|v| v.to_ascii_lowercase())
            .unwrap_or_else(|| "log".to_string());
        let audit_backend = match backend_raw.as_str() {
            "log" => AuditBackend::Log,
            "memory" => AuditBackend::Memory,
            "sqlite" => AuditBackend::Sqlite,
            other => {
                return Err(format!(
                    "invalid CONDUIT_AUDIT_BACKEND='{}'. expected one of: log, memory, sqlite",
                    other
                ));
            }
        };
        let sqlite_db_path =
            non_empty(envs, "CONDUIT_SQLITE_DB").unwrap_or_else(|| DEFAULT_SQLITE_DB.to_string());

        let defaults = RetryPolicy::default();
        let delay = match non_empty(envs, "CONDUIT_RETRY_DELAY_SECS") {
            Some(raw) => {
                let secs: i64 = parse_number(&raw, "CONDUIT_RETRY_DELAY_SECS")?;
                Duration::seconds(bounded(
                    secs,
                    0,
                    MAX_RETRY_DELAY_SECS,
                    "CONDUIT_RETRY_DELAY_SECS",
                )?)
            }
            None => defaults.delay,
        };
        let attempts = match non_empty(envs, "CONDUIT_RETRY_ATTEMPTS") {
            Some(raw) => bounded(
                parse_number(&raw, "CONDUIT_RETRY_ATTEMPTS")?,
                0,
                MAX_RETRY_ATTEMPTS,
                "CONDUIT_RETRY_ATTEMPTS",
            )?,
            None => defaults.attempts,
        };
        let backoff = match non_empty(envs, "CONDUIT_RETRY_BACKOFF") {
            Some(raw) => raw.parse::<RetryBackoff>().map_err(|_| {
                format!(
                    "invalid CONDUIT_RETRY_BACKOFF='{}'. expected one of: periodic, exponential",
                    raw
                )
            })?,
            None => defaults.backoff,
        };

        Ok(Self {
            colos,
            log_base_url,
            audit_backend,
            sqlite_db_path,
            retry: RetryPolicy {
                delay,
                attempts,
                backoff,
            },
        })
    }

    /// Opens the configured audit sink. The sqlite backend creates its schema
    /// on open, so a bad path fails here rather than on the first request.
    pub fn build_audit_sink(&self) -> Result<Arc<dyn AuditSink>, String> {
        match self.audit_backend {
            AuditBackend::Log => Ok(Arc::new(LogAuditSink)),
            AuditBackend::Memory => Ok(Arc::new(InMemoryAuditLog::new())),
            AuditBackend::Sqlite => self.sqlite_audit_sink(),
        }
    }

    fn sqlite_audit_sink(&self) -> Result<Arc<dyn AuditSink>, String> {
        #[cfg(not(feature = "sqlite-persistence"))]
        {
            Err(
                "CONDUIT_AUDIT_BACKEND=sqlite requires feature 'sqlite-persistence'. Rebuild with --features \"sqlite-persistence\"."
                    .to_string(),
            )
        }
        #[cfg(feature = "sqlite-persistence")]
        {
            let sink = super::sqlite_audit::SqliteAuditLog::new(&self.sqlite_db_path).map_err(
                |e| {
                    format!(
                        "audit backend sqlite health check failed for CONDUIT_SQLITE_DB='{}': {}",
                        self.sqlite_db_path, e
                    )
                },
            )?;
            Ok(Arc::new(sink))
        }
    }
}

fn non_empty(envs: &HashMap<String, String>, key: &str) -> Option<String> {
    envs.get(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_number<T: std::str::FromStr>(raw: &str, key: &str) -> Result<T, String> {
    raw.parse::<T>()
        .map_err(|_| format!("invalid {}='{}'. expected an integer", key, raw))
}

fn bounded<T: PartialOrd + std::fmt::Display>(
    value: T,
    min: T,
    max: T,
    key: &str,
) -> Result<T, String> {
    if value < min || value > max {
        return Err(format!(
            "invalid {}='{}'. expected a value between {} and {}",
            key, value, min, max
        ));
    }
    Ok(value)
}
