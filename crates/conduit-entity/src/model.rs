//! Entity snapshots and their per-cluster scheduling windows.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EntityValidationError, ParseEntityTypeError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntityType {
    Process,
    Feed,
    Cluster,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Process => "PROCESS",
            EntityType::Feed => "FEED",
            EntityType::Cluster => "CLUSTER",
        }
    }

    /// Whether instances of this entity type are scheduled on clusters.
    pub fn is_schedulable(&self) -> bool {
        !matches!(self, EntityType::Cluster)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = ParseEntityTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PROCESS" => Ok(EntityType::Process),
            "FEED" => Ok(EntityType::Feed),
            "CLUSTER" => Ok(EntityType::Cluster),
            _ => Err(ParseEntityTypeError(s.to_string())),
        }
    }
}

/// Validity window of an entity on one cluster, `[start, end)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterWindow {
    pub cluster: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ClusterWindow {
    pub fn new(cluster: impl Into<String>, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            cluster: cluster.into(),
            start,
            end,
        }
    }
}

/// Catalog-registry table backing a feed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogTable {
    pub catalog_url: String,
    pub database: String,
    pub table: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub entity_type: EntityType,
    pub name: String,
    /// Declared cluster order. Window resolution scans clusters in this order.
    #[serde(default)]
    pub clusters: Vec<ClusterWindow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_table: Option<CatalogTable>,
}

impl Entity {
    pub fn new(entity_type: EntityType, name: impl Into<String>) -> Self {
        Self {
            entity_type,
            name: name.into(),
            clusters: Vec::new(),
            catalog_table: None,
        }
    }

    pub fn with_cluster(
        mut self,
        cluster: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        self.clusters.push(ClusterWindow::new(cluster, start, end));
        self
    }

    pub fn with_catalog_table(
        mut self,
        catalog_url: impl Into<String>,
        database: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        self.catalog_table = Some(CatalogTable {
            catalog_url: catalog_url.into(),
            database: database.into(),
            table: table.into(),
        });
        self
    }

    pub fn clusters_defined(&self) -> impl Iterator<Item = &str> {
        self.clusters.iter().map(|w| w.cluster.as_str())
    }

    pub fn window(&self, cluster: &str) -> Option<&ClusterWindow> {
        self.clusters.iter().find(|w| w.cluster == cluster)
    }

    pub fn validate(&self) -> Result<(), EntityValidationError> {
        if self.name.trim().is_empty() {
            return Err(EntityValidationError::EmptyName);
        }
        if self.entity_type == EntityType::Cluster && !self.clusters.is_empty() {
            return Err(EntityValidationError::ClusterWithWindows(self.name.clone()));
        }
        let mut seen = HashSet::new();
        for window in &self.clusters {
            if !seen.insert(window.cluster.as_str()) {
                return Err(EntityValidationError::DuplicateCluster {
                    entity: self.name.clone(),
                    cluster: window.cluster.clone(),
                });
            }
            if window.start > window.end {
                return Err(EntityValidationError::InvertedWindow {
                    entity: self.name.clone(),
                    cluster: window.cluster.clone(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn entity_type_parses_case_insensitively() {
        assert_eq!("process".parse::<EntityType>(), Ok(EntityType::Process));
        assert_eq!(" Feed ".parse::<EntityType>(), Ok(EntityType::Feed));
        assert_eq!("CLUSTER".parse::<EntityType>(), Ok(EntityType::Cluster));
        assert!("dataset".parse::<EntityType>().is_err());
    }

    #[test]
    fn clusters_keep_declared_order() {
        let entity = Entity::new(EntityType::Process, "demo-process")
            .with_cluster("west", day(1), day(2))
            .with_cluster("east", day(1), day(2));
        let order: Vec<&str> = entity.clusters_defined().collect();
        assert_eq!(order, ["west", "east"]);
        assert_eq!(entity.window("east").map(|w| w.end), Some(day(2)));
        assert!(entity.window("north").is_none());
    }

    #[test]
    fn validate_rejects_duplicate_cluster() {
        let entity = Entity::new(EntityType::Feed, "clicks")
            .with_cluster("east", day(1), day(2))
            .with_cluster("east", day(3), day(4));
        assert!(matches!(
            entity.validate(),
            Err(EntityValidationError::DuplicateCluster { ref cluster, .. }) if cluster == "east"
        ));
    }

    #[test]
    fn validate_rejects_inverted_window() {
        let entity = Entity::new(EntityType::Feed, "clicks").with_cluster("east", day(5), day(4));
        assert!(matches!(
            entity.validate(),
            Err(EntityValidationError::InvertedWindow { .. })
        ));
    }

    #[test]
    fn entity_round_trips_through_json_with_upper_case_type() {
        let raw = r#"{
            "entity_type": "PROCESS",
            "name": "demo-process",
            "clusters": [
                {"cluster": "east", "start": "2024-01-01T00:00:00Z", "end": "2024-02-01T00:00:00Z"}
            ]
        }"#;
        let entity: Entity = serde_json::from_str(raw).expect("decode");
        assert_eq!(entity.entity_type, EntityType::Process);
        assert_eq!(entity.clusters.len(), 1);
        assert!(entity.catalog_table.is_none());
    }
}
