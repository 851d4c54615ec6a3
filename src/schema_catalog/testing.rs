//! Shared catalog fixture for in-crate tests.

use super::provider::SchemaCatalog;

pub const FIXTURE_YAML: &str = include_str!("../../tests/fixtures/entity_schema.yaml");

pub fn fixture_catalog() -> SchemaCatalog {
    SchemaCatalog::from_yaml_str(FIXTURE_YAML).expect("fixture schema must load")
}
