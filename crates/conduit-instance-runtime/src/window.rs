//! Cluster window resolution for time-range requests.
//!
//! An entity may be scheduled on several clusters, each with its own window.
//! Resolution scans the clusters in the entity's declared order and stops at
//! the first one whose window covers the request. When none does, the error
//! captured for the first cluster is the one reported, even if a later cluster
//! came closer. This precedence is a compatibility policy and must not be
//! replaced by a best-match heuristic.

use chrono::{DateTime, Duration, Utc};

use conduit_entity::{Entity, EntityRegistry, EntityType};

use super::error::{InstanceError, WindowError};

/// Length of the window synthesized when a request omits its end.
pub fn end_quantum() -> Duration {
    Duration::seconds(1)
}

/// Effective end of a request: the given end, or `start` plus one quantum.
pub fn effective_end(start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> DateTime<Utc> {
    end.unwrap_or_else(|| start + end_quantum())
}

/// A request range accepted by one of the entity's clusters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedRange {
    pub entity: Entity,
    /// Cluster whose window governs the request.
    pub cluster: String,
    pub start: DateTime<Utc>,
    /// Requested end, or `start` plus one quantum when it was omitted.
    pub end: DateTime<Utc>,
}

/// Per-cluster failures in declared cluster order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OrderedErrors(Vec<InstanceError>);

impl OrderedErrors {
    pub fn first(&self) -> Option<&InstanceError> {
        self.0.first()
    }

    pub fn into_first(self) -> Option<InstanceError> {
        self.0.into_iter().next()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &InstanceError> {
        self.0.iter()
    }
}

pub struct WindowResolver<'a> {
    registry: &'a dyn EntityRegistry,
}

impl<'a> WindowResolver<'a> {
    pub fn new(registry: &'a dyn EntityRegistry) -> Self {
        Self { registry }
    }

    /// Validates raw request parameters and resolves the governing cluster.
    pub fn validate_params(
        &self,
        entity_type: &str,
        entity_name: &str,
        start: &str,
        end: Option<&str>,
    ) -> Result<ValidatedRange, InstanceError> {
        not_empty("entityType", entity_type)?;
        not_empty("entityName", entity_name)?;
        not_empty("start", start)?;

        let entity_type = parse_entity_type(entity_type)?;
        let entity = self.registry.resolve(entity_type, entity_name)?;

        let start = self.registry.parse_timestamp(start)?;
        let end = match end.filter(|e| !e.trim().is_empty()) {
            Some(raw) => Some(self.registry.parse_timestamp(raw)?),
            None => None,
        };

        let name = entity.name.clone();
        self.resolve_range(entity, start, end).map_err(|errors| {
            errors
                .into_first()
                .unwrap_or_else(|| InstanceError::NoClusterWindows(name))
        })
    }

    /// Scans `entity`'s clusters in declared order; the first that accepts the
    /// range wins.
    pub fn resolve_range(
        &self,
        entity: Entity,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> Result<ValidatedRange, OrderedErrors> {
        let mut errors = Vec::new();
        let mut governing = None;
        for cluster in entity.clusters_defined() {
            match self.check_cluster(&entity, cluster, start, end) {
                Ok(()) => {
                    governing = Some(cluster.to_string());
                    break;
                }
                Err(e) => errors.push(e),
            }
        }
        match governing {
            Some(cluster) => Ok(ValidatedRange {
                entity,
                cluster,
                start,
                end: effective_end(start, end),
            }),
            None => Err(OrderedErrors(errors)),
        }
    }

    fn check_cluster(
        &self,
        entity: &Entity,
        cluster: &str,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> Result<(), InstanceError> {
        let (window_start, window_end) = self.registry.date_window(entity, cluster)?;
        let fmt = |t: &DateTime<Utc>| self.registry.format_timestamp(t);

        if start < window_start {
            return Err(WindowError::StartBeforeWindow {
                cluster: cluster.to_string(),
                entity_type: entity.entity_type,
                start: fmt(&start),
                window_start: fmt(&window_start),
            }
            .into());
        }
        match end {
            Some(end) => {
                if start > end {
                    return Err(WindowError::StartAfterEnd {
                        cluster: cluster.to_string(),
                        entity_type: entity.entity_type,
                        start: fmt(&start),
                        end: fmt(&end),
                    }
                    .into());
                }
                if end > window_end {
                    return Err(WindowError::EndAfterWindow {
                        cluster: cluster.to_string(),
                        entity_type: entity.entity_type,
                        end: fmt(&end),
                        window_end: fmt(&window_end),
                    }
                    .into());
                }
            }
            None if start > window_end => {
                return Err(WindowError::StartAfterWindow {
                    cluster: cluster.to_string(),
                    entity_type: entity.entity_type,
                    start: fmt(&start),
                    window_end: fmt(&window_end),
                }
                .into());
            }
            None => {}
        }
        Ok(())
    }
}

pub(crate) fn not_empty(field: &'static str, value: &str) -> Result<(), InstanceError> {
    if value.trim().is_empty() {
        return Err(InstanceError::MissingParameter(field));
    }
    Ok(())
}

pub(crate) fn parse_entity_type(raw: &str) -> Result<EntityType, InstanceError> {
    raw.parse::<EntityType>()
        .map_err(|e| InstanceError::InvalidEntityType(e.to_string()))
}
