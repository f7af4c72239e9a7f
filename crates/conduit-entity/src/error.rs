//! Error types for entity resolution, validation and catalog access.

use crate::model::EntityType;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown entity type '{0}'. expected one of: process, feed, cluster")]
pub struct ParseEntityTypeError(pub String);

/// Structural problems in an entity definition.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EntityValidationError {
    #[error("entity name must not be empty")]
    EmptyName,
    #[error("{entity} declares cluster '{cluster}' more than once")]
    DuplicateCluster { entity: String, cluster: String },
    #[error("{entity} window on cluster '{cluster}' starts after it ends")]
    InvertedWindow { entity: String, cluster: String },
    #[error("cluster entity {0} cannot declare cluster windows")]
    ClusterWithWindows(String),
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog at {0} is unreachable")]
    Unreachable(String),
    #[error("catalog query failed: {0}")]
    Query(String),
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("{entity_type} entity '{name}' is not registered")]
    UnknownEntity {
        entity_type: EntityType,
        name: String,
    },
    #[error("{entity} is not defined on cluster '{cluster}'")]
    UnknownCluster { entity: String, cluster: String },
    #[error("invalid timestamp '{0}'. expected yyyy-MM-ddTHH:mmZ")]
    BadTimestamp(String),
    #[error("invalid entity: {0}")]
    Invalid(#[from] EntityValidationError),
    #[error("catalog service at {0} is not alive")]
    CatalogUnavailable(String),
    #[error("catalog table {database}.{table} does not exist")]
    CatalogTableMissing { database: String, table: String },
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("failed to decode entity definitions: {0}")]
    Decode(String),
    #[error("registry storage error: {0}")]
    Storage(String),
}
