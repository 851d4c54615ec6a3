use dql_compiler::dql_parser::ast::ClauseKind;
use dql_compiler::sql_generator::{MysqlDialect, PostgresDialect};
use dql_compiler::{compile, compile_count, dialect_for_name, CompilerConfig, QueryCompiler, QueryError};
use serde_json::json;
use test_case::test_case;

use super::fixture_catalog;

#[test]
fn test_on_condition_replaces_join_predicate() {
    let catalog = fixture_catalog();
    let compiled = compile(
        &catalog,
        &MysqlDialect,
        "SELECT u.name, p.id FROM User u LEFT JOIN u.Phonenumber p ON p.phonenumber = '123 123'",
        &[],
    )
    .unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT e.id AS e__id, e.name AS e__name, p.id AS p__id FROM entity e \
         LEFT JOIN phonenumber p ON (p.phonenumber = '123 123') WHERE (e.type = 0)"
    );
    assert!(compiled.params.is_empty());
    let aliases: Vec<&str> = compiled.hydration_plan.nodes.iter().map(|n| n.sql_alias.as_str()).collect();
    assert_eq!(aliases, vec!["e", "p"]);
}

#[test]
fn test_many_to_many_goes_through_bridge() {
    let catalog = fixture_catalog();
    let compiled = compile(&catalog, &MysqlDialect, "SELECT u.id, g.id FROM User u INNER JOIN u.Group g", &[]).unwrap();
    assert!(compiled.sql.contains(
        "FROM entity e INNER JOIN groupuser g ON (e.id = g.user_id) INNER JOIN entity e2 ON e2.id = g.group_id AND e2.type = 1"
    ));
}

#[test]
fn test_self_referential_many_to_many_excludes_source_row() {
    let catalog = fixture_catalog();
    let compiled = compile(&catalog, &MysqlDialect, "SELECT e.name, e2.name FROM Entity e INNER JOIN e.Entity e2", &[]).unwrap();
    assert!(compiled.sql.ends_with(
        "FROM entity e INNER JOIN entity_reference e3 ON (e.id = e3.entity1 OR e.id = e3.entity2) \
         INNER JOIN entity e2 ON (e2.id = e3.entity2 OR e2.id = e3.entity1) AND e2.id != e.id"
    ));
}

#[test]
fn test_self_referential_one_to_one_excludes_source_row() {
    let catalog = fixture_catalog();
    let compiled = compile(&catalog, &MysqlDialect, "SELECT c.name, p.name FROM Category c LEFT JOIN c.Parent p", &[]).unwrap();
    assert!(compiled
        .sql
        .ends_with("FROM category c LEFT JOIN category c2 ON c.parent_id = c2.id AND c2.id != c.id"));
}

#[test]
fn test_unknown_relation() {
    let catalog = fixture_catalog();
    let err = compile(&catalog, &MysqlDialect, "FROM User u LEFT JOIN u.NoSuchRelation x", &[]).unwrap_err();
    match err {
        QueryError::UnknownRelation { component, relation, .. } => {
            assert_eq!(component, "User");
            assert_eq!(relation, "NoSuchRelation");
        }
        other => panic!("expected UnknownRelation, got {:?}", other),
    }
}

#[test]
fn test_unknown_component_names_the_clause() {
    let catalog = fixture_catalog();
    let err = compile(&catalog, &MysqlDialect, "FROM Nope n", &[]).unwrap_err();
    assert_eq!(err.clause(), ClauseKind::From);
    assert!(err.to_string().contains("Nope"));
}

#[test]
fn test_parameters_follow_text_order() {
    let catalog = fixture_catalog();
    let compiled = compile(
        &catalog,
        &MysqlDialect,
        "SELECT u.name, p.id FROM User u LEFT JOIN u.Phonenumber p WITH p.phonenumber = ? WHERE u.name = ?",
        &[json!("123"), json!("zYne")],
    )
    .unwrap();
    assert_eq!(compiled.params, vec![json!("123"), json!("zYne")]);
    let first = compiled.sql.find("p.phonenumber = ?").unwrap();
    let second = compiled.sql.find("e.name = ?").unwrap();
    assert!(first < second);
}

#[test_case("mysql", "SELECT e.id AS e__id, e.address AS e__address FROM email e LIMIT 5 OFFSET 10" ; "mysql")]
#[test_case("sqlite", "SELECT e.id AS e__id, e.address AS e__address FROM email e LIMIT 5 OFFSET 10" ; "sqlite")]
#[test_case("oracle", "SELECT e.id AS e__id, e.address AS e__address FROM email e OFFSET 10 ROWS FETCH NEXT 5 ROWS ONLY" ; "oracle")]
#[test_case("mssql", "SELECT e.id AS e__id, e.address AS e__address FROM email e ORDER BY (SELECT NULL) OFFSET 10 ROWS FETCH NEXT 5 ROWS ONLY" ; "mssql")]
fn test_limit_per_dialect(name: &str, expected: &str) {
    let catalog = fixture_catalog();
    let dialect = dialect_for_name(name).unwrap();
    let compiled = compile(&catalog, dialect.as_ref(), "SELECT e.address FROM Email e LIMIT 5 OFFSET 10", &[]).unwrap();
    assert_eq!(compiled.sql, expected);
}

#[test]
fn test_fan_out_limit_counts_roots() {
    let catalog = fixture_catalog();
    let compiled = compile(
        &catalog,
        &PostgresDialect,
        "SELECT u.name, p.phonenumber FROM User u LEFT JOIN u.Phonenumber p LIMIT 10",
        &[],
    )
    .unwrap();
    assert!(compiled.sql.contains("WHERE e.id IN (SELECT DISTINCT e2.id FROM entity e2"));
    assert!(compiled.sql.ends_with("LIMIT 10) AND (e.type = 0)"));
}

#[test]
fn test_count_ignores_order_and_limit() {
    let catalog = fixture_catalog();
    let count = compile_count(
        &catalog,
        &MysqlDialect,
        "SELECT u.name, p.phonenumber FROM User u LEFT JOIN u.Phonenumber p ORDER BY u.name LIMIT 10",
        &[],
    )
    .unwrap();
    assert_eq!(
        count.sql,
        "SELECT COUNT(*) AS num_results FROM (SELECT DISTINCT e.id FROM entity e \
         LEFT JOIN phonenumber p ON e.id = p.entity_id WHERE (e.type = 0)) count_query"
    );
}

#[test]
fn test_config_from_yaml_drives_compilation() {
    let config = CompilerConfig::from_yaml_str("quote_identifiers: true\ncount_alias: total\n").unwrap();
    let catalog = fixture_catalog();
    let compiler = QueryCompiler::new(&catalog, &PostgresDialect).with_config(config);
    let compiled = compiler.compile("SELECT e.address FROM Email e", &[]).unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT \"e\".\"id\" AS \"e__id\", \"e\".\"address\" AS \"e__address\" FROM \"email\" \"e\""
    );
    let count = compiler.compile_count("FROM Email e", &[]).unwrap();
    assert_eq!(count.count_alias, "total");
    assert_eq!(count.sql, "SELECT COUNT(*) AS \"total\" FROM \"email\" \"e\"");
}

#[test]
fn test_backslash_in_literal_follows_config() {
    let catalog = fixture_catalog();
    let compiled = compile(&catalog, &PostgresDialect, r"SELECT u.name FROM User u WHERE u.name = 'C:\'", &[]).unwrap();
    assert!(compiled.sql.ends_with(r"WHERE (e.name = 'C:\') AND (e.type = 0)"));

    let config = CompilerConfig::from_yaml_str("backslash_escapes: true\n").unwrap();
    let compiled = QueryCompiler::new(&catalog, &MysqlDialect)
        .with_config(config)
        .compile(r"SELECT u.name FROM User u WHERE u.name = 'it\'s ?' AND u.id = ?", &[json!(4)])
        .unwrap();
    assert!(compiled.sql.ends_with(r"WHERE (e.name = 'it\'s ?' AND e.id = ?) AND (e.type = 0)"));
    assert_eq!(compiled.params, vec![json!(4)]);
}

#[test]
fn test_compiled_query_serializes() -> anyhow::Result<()> {
    let catalog = fixture_catalog();
    let compiled = compile(&catalog, &MysqlDialect, "SELECT u.name FROM User u WHERE u.id = ?", &[json!(4)])?;
    let value = serde_json::to_value(&compiled)?;
    assert_eq!(value["params"], json!([4]));
    assert_eq!(value["hydration_plan"]["nodes"][0]["component"], json!("User"));
    Ok(())
}
