use std::sync::Arc;

use mockall::mock;
use mockall::predicate::eq;

use dql_compiler::dql_parser::ast::ClauseKind;
use dql_compiler::schema_catalog::ComponentMetadata;
use dql_compiler::sql_generator::SqliteDialect;
use dql_compiler::{compile, QueryError, SchemaCatalogError, SchemaMetadataProvider};

use super::fixture_catalog;

mock! {
    pub Provider {}

    impl SchemaMetadataProvider for Provider {
        fn describe(&self, component: &str) -> Result<Arc<ComponentMetadata>, SchemaCatalogError>;
    }
}

#[test]
fn test_metadata_is_looked_up_per_component() {
    let catalog = fixture_catalog();
    let user = catalog.describe("User").unwrap();
    let phone = catalog.describe("Phonenumber").unwrap();

    let mut provider = MockProvider::new();
    provider
        .expect_describe()
        .with(eq("User"))
        .returning(move |_| Ok(user.clone()));
    provider
        .expect_describe()
        .with(eq("Phonenumber"))
        .returning(move |_| Ok(phone.clone()));

    let compiled = compile(
        &provider,
        &SqliteDialect,
        "SELECT u.name, p.phonenumber FROM User u LEFT JOIN u.Phonenumber p",
        &[],
    )
    .unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT e.id AS e__id, e.name AS e__name, p.id AS p__id, p.phonenumber AS p__phonenumber \
         FROM entity e LEFT JOIN phonenumber p ON e.id = p.entity_id WHERE (e.type = 0)"
    );
}

#[test]
fn test_provider_failure_surfaces_as_metadata_error() {
    let catalog = fixture_catalog();
    let user = catalog.describe("User").unwrap();

    let mut provider = MockProvider::new();
    provider
        .expect_describe()
        .with(eq("User"))
        .returning(move |_| Ok(user.clone()));
    provider.expect_describe().with(eq("Phonenumber")).returning(|_| {
        Err(SchemaCatalogError::ConfigReadError {
            error: "catalog offline".to_string(),
        })
    });

    let err = compile(&provider, &SqliteDialect, "FROM User u LEFT JOIN u.Phonenumber p", &[]).unwrap_err();
    assert_eq!(err.clause(), ClauseKind::Join);
    match err {
        QueryError::Metadata { message, .. } => assert!(message.contains("catalog offline")),
        other => panic!("unexpected error {:?}", other),
    }
}
