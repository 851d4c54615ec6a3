//! # Schema Catalog Error Types
//!
//! Errors raised while loading component definitions or looking them up.
//!
//! - **Lookup errors**: a component name the catalog does not know
//! - **Definition errors**: relations pointing at missing components or columns
//! - **Configuration errors**: file I/O and YAML parsing while loading a catalog

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SchemaCatalogError {
    #[error("No component schema found for `{component}`")]
    UnknownComponent { component: String },
    #[error("Component `{component}` is defined more than once")]
    DuplicateComponent { component: String },
    #[error("Invalid definition of component `{component}`: {message}")]
    InvalidDefinition { component: String, message: String },
    #[error("Failed to read schema file: {error}")]
    ConfigReadError { error: String },
    #[error("Failed to parse schema definition: {error}")]
    ConfigParseError { error: String },
}

impl SchemaCatalogError {
    pub fn invalid(component: impl Into<String>, message: impl Into<String>) -> Self {
        SchemaCatalogError::InvalidDefinition {
            component: component.into(),
            message: message.into(),
        }
    }
}
