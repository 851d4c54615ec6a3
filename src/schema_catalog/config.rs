//! YAML component definitions.
//!
//! ```yaml
//! name: blog
//! components:
//!   - name: User
//!     table: entity
//!     inheritance: { column: type, value: 0 }
//!     columns:
//!       - { name: id, type: integer, primary: true }
//!       - { name: name }
//!     relations:
//!       - { name: Phonenumber, kind: one_to_many, target: Phonenumber, local: id, foreign: entity_id }
//! ```

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::component_schema::{ComponentMetadata, RelationKind};
use super::errors::SchemaCatalogError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    #[serde(default)]
    pub name: Option<String>,
    pub components: Vec<ComponentMetadata>,
}

impl SchemaDefinition {
    /// Load component definitions from a YAML file
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, SchemaCatalogError> {
        let contents =
            fs::read_to_string(path).map_err(|e| SchemaCatalogError::ConfigReadError {
                error: e.to_string(),
            })?;

        Self::from_yaml_str(&contents)
    }

    /// Parse component definitions from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self, SchemaCatalogError> {
        serde_yaml::from_str(yaml).map_err(|e| SchemaCatalogError::ConfigParseError {
            error: e.to_string(),
        })
    }

    /// Cross-checks every component and relation against the rest of the definition.
    pub fn validate(&self) -> Result<(), SchemaCatalogError> {
        let mut by_name: HashMap<&str, &ComponentMetadata> = HashMap::new();
        for component in &self.components {
            if by_name.insert(&component.name, component).is_some() {
                return Err(SchemaCatalogError::DuplicateComponent {
                    component: component.name.clone(),
                });
            }
        }

        for component in &self.components {
            validate_columns(component)?;
            for relation in &component.relations {
                let target = by_name.get(relation.target.as_str()).ok_or_else(|| {
                    SchemaCatalogError::invalid(
                        &component.name,
                        format!(
                            "relation `{}` targets unknown component `{}`",
                            relation.name, relation.target
                        ),
                    )
                })?;

                match relation.kind {
                    RelationKind::ManyToMany => {
                        let bridge_name = relation.bridge.as_deref().ok_or_else(|| {
                            SchemaCatalogError::invalid(
                                &component.name,
                                format!(
                                    "many-to-many relation `{}` has no bridge component",
                                    relation.name
                                ),
                            )
                        })?;
                        let bridge = by_name.get(bridge_name).ok_or_else(|| {
                            SchemaCatalogError::invalid(
                                &component.name,
                                format!(
                                    "relation `{}` uses unknown bridge component `{}`",
                                    relation.name, bridge_name
                                ),
                            )
                        })?;
                        require_column(component, bridge, &relation.local, &relation.name)?;
                        require_column(component, bridge, &relation.foreign, &relation.name)?;
                    }
                    RelationKind::OneToOne | RelationKind::OneToMany => {
                        require_column(component, component, &relation.local, &relation.name)?;
                        require_column(component, target, &relation.foreign, &relation.name)?;
                    }
                }
            }
        }

        Ok(())
    }
}

fn validate_columns(component: &ComponentMetadata) -> Result<(), SchemaCatalogError> {
    if component.identifier().is_none() {
        return Err(SchemaCatalogError::invalid(
            &component.name,
            "component declares no primary key column",
        ));
    }

    let mut seen = HashSet::new();
    for column in &component.columns {
        if !seen.insert(column.name.as_str()) {
            return Err(SchemaCatalogError::invalid(
                &component.name,
                format!("column `{}` is declared twice", column.name),
            ));
        }
    }

    if let Some(discriminator) = &component.inheritance {
        if component.column(&discriminator.column).is_none() {
            return Err(SchemaCatalogError::invalid(
                &component.name,
                format!(
                    "discriminator column `{}` is not a column of `{}`",
                    discriminator.column, component.table_name
                ),
            ));
        }
    }
    Ok(())
}

fn require_column(
    owner: &ComponentMetadata,
    holder: &ComponentMetadata,
    column: &str,
    relation: &str,
) -> Result<(), SchemaCatalogError> {
    if holder.column(column).is_some() {
        return Ok(());
    }
    Err(SchemaCatalogError::invalid(
        &owner.name,
        format!(
            "relation `{}` references column `{}` missing from `{}`",
            relation, column, holder.name
        ),
    ))
}
