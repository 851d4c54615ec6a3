use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use super::component_schema::ComponentMetadata;
use super::config::SchemaDefinition;
use super::errors::SchemaCatalogError;

/// Source of component metadata for the compiler.
///
/// Implementations must be safe to share between threads so that several
/// compilations can run against one catalog concurrently.
pub trait SchemaMetadataProvider: Send + Sync {
    fn describe(&self, component: &str) -> Result<Arc<ComponentMetadata>, SchemaCatalogError>;
}

/// In-memory catalog of validated component definitions.
#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    name: Option<String>,
    components: HashMap<String, Arc<ComponentMetadata>>,
}

impl SchemaCatalog {
    pub fn from_definition(definition: SchemaDefinition) -> Result<Self, SchemaCatalogError> {
        definition.validate()?;
        let mut catalog = SchemaCatalog {
            name: definition.name,
            components: HashMap::new(),
        };
        for component in definition.components {
            catalog
                .components
                .insert(component.name.clone(), Arc::new(component));
        }
        log::debug!(
            "Loaded schema catalog {:?} with {} components",
            catalog.name,
            catalog.components.len()
        );
        Ok(catalog)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, SchemaCatalogError> {
        Self::from_definition(SchemaDefinition::from_yaml_str(yaml)?)
    }

    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, SchemaCatalogError> {
        Self::from_definition(SchemaDefinition::from_yaml_file(path)?)
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn component_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.components.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl SchemaMetadataProvider for SchemaCatalog {
    fn describe(&self, component: &str) -> Result<Arc<ComponentMetadata>, SchemaCatalogError> {
        self.components
            .get(component)
            .cloned()
            .ok_or_else(|| SchemaCatalogError::UnknownComponent {
                component: component.to_string(),
            })
    }
}
