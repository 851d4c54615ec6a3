//! Integration tests - Tests that run whole compilations and hydrations
//!
//! These tests load the fixture schema from disk and drive the public API the
//! way a caller would. Database access goes through a mocked connection.

use dql_compiler::SchemaCatalog;

mod compile_tests;
mod fetch_tests;
mod hydration_tests;
mod provider_tests;

const FIXTURE_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/entity_schema.yaml");

pub fn fixture_catalog() -> SchemaCatalog {
    let _ = env_logger::builder().is_test(true).try_init();
    SchemaCatalog::from_yaml_file(FIXTURE_PATH).expect("fixture schema must load")
}
