pub mod component_schema;
pub mod config;
pub mod errors;
pub mod provider;

#[cfg(test)]
pub(crate) mod testing;

pub use component_schema::{ColumnDef, ComponentMetadata, Discriminator, Relation, RelationKind};
pub use config::SchemaDefinition;
pub use errors::SchemaCatalogError;
pub use provider::{SchemaCatalog, SchemaMetadataProvider};
