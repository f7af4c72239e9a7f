//! Entity registry contract and an in-memory implementation.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use crate::catalog::CatalogService;
use crate::error::RegistryError;
use crate::model::{Entity, EntityType};
use crate::timestamp;

/// Resolves entity snapshots and exposes their per-cluster windows.
///
/// Implementations must be safe to share across request handlers; callers
/// treat every returned [`Entity`] as an immutable snapshot.
pub trait EntityRegistry: Send + Sync {
    fn resolve(&self, entity_type: EntityType, name: &str) -> Result<Entity, RegistryError>;

    /// `[start, end)` window of `entity` on `cluster`.
    fn date_window(
        &self,
        entity: &Entity,
        cluster: &str,
    ) -> Result<(DateTime<Utc>, DateTime<Utc>), RegistryError> {
        entity
            .window(cluster)
            .map(|w| (w.start, w.end))
            .ok_or_else(|| RegistryError::UnknownCluster {
                entity: entity.name.clone(),
                cluster: cluster.to_string(),
            })
    }

    fn parse_timestamp(&self, value: &str) -> Result<DateTime<Utc>, RegistryError> {
        timestamp::parse_utc(value)
    }

    fn format_timestamp(&self, instant: &DateTime<Utc>) -> String {
        timestamp::format_utc(instant)
    }
}

type EntityKey = (EntityType, String);

/// Registry holding validated entity definitions in memory.
pub struct InMemoryEntityRegistry {
    entities: RwLock<HashMap<EntityKey, Entity>>,
}

impl InMemoryEntityRegistry {
    pub fn new() -> Self {
        Self {
            entities: RwLock::new(HashMap::new()),
        }
    }

    /// Builds a registry from a JSON array of entity definitions.
    pub fn from_json(raw: &str) -> Result<Self, RegistryError> {
        let entities: Vec<Entity> =
            serde_json::from_str(raw).map_err(|e| RegistryError::Decode(e.to_string()))?;
        let registry = Self::new();
        for entity in entities {
            registry.register(entity)?;
        }
        Ok(registry)
    }

    /// Validates and stores `entity`, returning the definition it replaced.
    pub fn register(&self, entity: Entity) -> Result<Option<Entity>, RegistryError> {
        entity.validate()?;
        let mut entities = self
            .entities
            .write()
            .map_err(|e| RegistryError::Storage(e.to_string()))?;
        Ok(entities.insert((entity.entity_type, entity.name.clone()), entity))
    }

    /// Like [`register`](Self::register), but first checks that the catalog
    /// table backing the entity (if any) is reachable and exists.
    pub fn register_checked(
        &self,
        entity: Entity,
        catalog: &dyn CatalogService,
    ) -> Result<Option<Entity>, RegistryError> {
        if let Some(table) = &entity.catalog_table {
            if !catalog.is_alive(&table.catalog_url)? {
                return Err(RegistryError::CatalogUnavailable(table.catalog_url.clone()));
            }
            if !catalog.table_exists(&table.catalog_url, &table.database, &table.table)? {
                return Err(RegistryError::CatalogTableMissing {
                    database: table.database.clone(),
                    table: table.table.clone(),
                });
            }
        }
        self.register(entity)
    }

    pub fn remove(&self, entity_type: EntityType, name: &str) -> Option<Entity> {
        self.entities
            .write()
            .ok()
            .and_then(|mut entities| entities.remove(&(entity_type, name.to_string())))
    }

    pub fn len(&self) -> usize {
        self.entities.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryEntityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityRegistry for InMemoryEntityRegistry {
    fn resolve(&self, entity_type: EntityType, name: &str) -> Result<Entity, RegistryError> {
        let entities = self
            .entities
            .read()
            .map_err(|e| RegistryError::Storage(e.to_string()))?;
        entities
            .get(&(entity_type, name.to_string()))
            .cloned()
            .ok_or_else(|| RegistryError::UnknownEntity {
                entity_type,
                name: name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::catalog::StaticCatalog;

    fn jan(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
    }

    fn demo_process() -> Entity {
        Entity::new(EntityType::Process, "demo-process")
            .with_cluster("east", jan(1), jan(31))
            .with_cluster("west", jan(15), jan(31))
    }

    #[test]
    fn resolve_returns_registered_snapshot() {
        let registry = InMemoryEntityRegistry::new();
        registry.register(demo_process()).expect("register");
        let entity = registry
            .resolve(EntityType::Process, "demo-process")
            .expect("resolve");
        assert_eq!(entity, demo_process());
    }

    #[test]
    fn resolve_is_keyed_by_type() {
        let registry = InMemoryEntityRegistry::new();
        registry.register(demo_process()).expect("register");
        let err = registry
            .resolve(EntityType::Feed, "demo-process")
            .expect_err("feed lookup must miss");
        assert!(matches!(
            err,
            RegistryError::UnknownEntity {
                entity_type: EntityType::Feed,
                ..
            }
        ));
    }

    #[test]
    fn date_window_reports_unknown_cluster() {
        let registry = InMemoryEntityRegistry::new();
        let entity = demo_process();
        assert_eq!(
            registry.date_window(&entity, "west").expect("window"),
            (jan(15), jan(31))
        );
        assert!(matches!(
            registry.date_window(&entity, "north"),
            Err(RegistryError::UnknownCluster { .. })
        ));
    }

    #[test]
    fn register_rejects_invalid_entity() {
        let registry = InMemoryEntityRegistry::new();
        let err = registry
            .register(Entity::new(EntityType::Feed, " "))
            .expect_err("empty name");
        assert!(matches!(err, RegistryError::Invalid(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn register_checked_requires_catalog_table() {
        let registry = InMemoryEntityRegistry::new();
        let catalog = StaticCatalog::new();
        let feed = Entity::new(EntityType::Feed, "clicks")
            .with_cluster("east", jan(1), jan(31))
            .with_catalog_table("thrift://meta:9083", "web", "clicks");

        let err = registry
            .register_checked(feed.clone(), &catalog)
            .expect_err("catalog is down");
        assert_eq!(
            err,
            RegistryError::CatalogUnavailable("thrift://meta:9083".into())
        );

        catalog.add_endpoint("thrift://meta:9083");
        let err = registry
            .register_checked(feed.clone(), &catalog)
            .expect_err("table missing");
        assert!(matches!(err, RegistryError::CatalogTableMissing { .. }));

        catalog.add_table("thrift://meta:9083", "web", "clicks");
        registry
            .register_checked(feed, &catalog)
            .expect("catalog-backed feed registers");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn from_json_loads_definitions() {
        let raw = r#"[
            {"entity_type": "FEED", "name": "clicks", "clusters": [
                {"cluster": "east", "start": "2024-01-01T00:00:00Z", "end": "2024-02-01T00:00:00Z"}
            ]},
            {"entity_type": "CLUSTER", "name": "east"}
        ]"#;
        let registry = InMemoryEntityRegistry::from_json(raw).expect("load");
        assert_eq!(registry.len(), 2);
        assert!(registry.resolve(EntityType::Cluster, "east").is_ok());
    }
}
