//! Entity definitions consumed by the Conduit control plane.
//!
//! An entity is a recurring process, a feed, or a cluster definition. Processes
//! and feeds declare an ordered list of clusters, each with its own `[start, end)`
//! scheduling window. Registries resolve entities by type and name and hand out
//! immutable snapshots; nothing in the control plane mutates them.

pub mod catalog;
pub mod error;
pub mod model;
pub mod registry;
pub mod timestamp;

pub use catalog::{CatalogService, StaticCatalog};
pub use error::{CatalogError, EntityValidationError, ParseEntityTypeError, RegistryError};
pub use model::{CatalogTable, ClusterWindow, Entity, EntityType};
pub use registry::{EntityRegistry, InMemoryEntityRegistry};
pub use timestamp::{format_utc, parse_utc, TIMESTAMP_FORMAT};
