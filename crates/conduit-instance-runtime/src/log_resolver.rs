//! Log location lookup for instance runs.

use std::fmt;

use conduit_entity::{format_utc, Entity};

use super::error::LogResolveError;
use super::models::Instance;

/// Category of logs to link for a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LogCategory {
    Default,
    Retention,
    Replication,
}

impl LogCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogCategory::Default => "default",
            LogCategory::Retention => "retention",
            LogCategory::Replication => "replication",
        }
    }
}

impl fmt::Display for LogCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait LogResolver: Send + Sync {
    /// Returns `instance` with its log URL populated for `run_id`.
    fn resolve_log_url(
        &self,
        entity: &Entity,
        instance: &Instance,
        category: LogCategory,
        run_id: &str,
    ) -> Result<Instance, LogResolveError>;
}

/// Resolves `{base}/{cluster}/{type}/{entity}/{nominal}/{category}/{run_id}`.
#[derive(Clone, Debug)]
pub struct TemplateLogResolver {
    base_url: String,
}

impl TemplateLogResolver {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

impl LogResolver for TemplateLogResolver {
    fn resolve_log_url(
        &self,
        entity: &Entity,
        instance: &Instance,
        category: LogCategory,
        run_id: &str,
    ) -> Result<Instance, LogResolveError> {
        if entity.window(&instance.cluster).is_none() {
            return Err(LogResolveError::UnknownCluster {
                entity: entity.name.clone(),
                cluster: instance.cluster.clone(),
            });
        }
        let run: u32 = run_id
            .trim()
            .parse()
            .map_err(|_| LogResolveError::InvalidRunId(run_id.to_string()))?;

        let mut resolved = instance.clone();
        resolved.log_url = Some(format!(
            "{}/{}/{}/{}/{}/{}/{}",
            self.base_url,
            instance.cluster,
            entity.entity_type.as_str().to_ascii_lowercase(),
            entity.name,
            format_utc(&instance.nominal_time),
            category,
            run
        ));
        Ok(resolved)
    }
}
