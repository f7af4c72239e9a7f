//! Catalog-registry contract (Hive metastore, HCatalog and similar).

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use crate::error::CatalogError;

/// Minimal operations a catalog registry must support.
pub trait CatalogService: Send + Sync {
    /// Whether the catalog service at `catalog_url` is reachable.
    fn is_alive(&self, catalog_url: &str) -> Result<bool, CatalogError>;

    fn table_exists(
        &self,
        catalog_url: &str,
        database: &str,
        table: &str,
    ) -> Result<bool, CatalogError>;
}

/// In-process catalog with a fixed set of reachable endpoints and tables.
#[derive(Default)]
pub struct StaticCatalog {
    tables: RwLock<HashMap<String, HashSet<(String, String)>>>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `catalog_url` reachable and registers `database.table` on it.
    pub fn add_table(&self, catalog_url: &str, database: &str, table: &str) {
        if let Ok(mut tables) = self.tables.write() {
            tables
                .entry(catalog_url.to_string())
                .or_default()
                .insert((database.to_string(), table.to_string()));
        }
    }

    /// Marks `catalog_url` reachable without any tables.
    pub fn add_endpoint(&self, catalog_url: &str) {
        if let Ok(mut tables) = self.tables.write() {
            tables.entry(catalog_url.to_string()).or_default();
        }
    }
}

impl CatalogService for StaticCatalog {
    fn is_alive(&self, catalog_url: &str) -> Result<bool, CatalogError> {
        let tables = self
            .tables
            .read()
            .map_err(|e| CatalogError::Query(e.to_string()))?;
        Ok(tables.contains_key(catalog_url))
    }

    fn table_exists(
        &self,
        catalog_url: &str,
        database: &str,
        table: &str,
    ) -> Result<bool, CatalogError> {
        let tables = self
            .tables
            .read()
            .map_err(|e| CatalogError::Query(e.to_string()))?;
        let endpoint = tables
            .get(catalog_url)
            .ok_or_else(|| CatalogError::Unreachable(catalog_url.to_string()))?;
        Ok(endpoint.contains(&(database.to_string(), table.to_string())))
    }
}
