use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use mockall::mock;
use serde_json::{json, Value};
use thiserror::Error;

use dql_compiler::sql_generator::PostgresDialect;
use dql_compiler::{
    fetch, fetch_count, fetch_default, CompilerConfig, Connection, FetchError, HydratedResult, HydrationMode, QueryCompiler,
    ResultRow, RowStream,
};

use super::fixture_catalog;

#[derive(Debug, Clone, Error, PartialEq)]
#[error("database unavailable: {0}")]
pub struct DbError(String);

mock! {
    pub Db {}

    #[async_trait]
    impl Connection for Db {
        type Error = DbError;

        async fn execute(&self, sql: &str, params: &[Value]) -> Result<RowStream<DbError>, DbError>;
    }
}

fn row_stream(values: Vec<Value>) -> RowStream<DbError> {
    let rows: Vec<Result<ResultRow, DbError>> = values
        .into_iter()
        .map(|value| match value {
            Value::Object(object) => Ok(object.into_iter().collect()),
            other => Err(DbError(format!("not a row: {}", other))),
        })
        .collect();
    stream::iter(rows).boxed()
}

#[tokio::test]
async fn test_fetch_executes_and_hydrates() {
    let catalog = fixture_catalog();
    let compiler = QueryCompiler::new(&catalog, &PostgresDialect);
    let compiled = compiler
        .compile(
            "SELECT u.name, p.phonenumber FROM User u LEFT JOIN u.Phonenumber p WHERE u.name = ?",
            &[json!("zYne")],
        )
        .unwrap();

    let expected_sql = compiled.sql.clone();
    let mut db = MockDb::new();
    db.expect_execute()
        .withf(move |sql, params| sql == expected_sql && params.len() == 1 && params[0] == json!("zYne"))
        .times(1)
        .returning(|_, _| {
            Ok(row_stream(vec![
                json!({"e__id": 4, "e__name": "zYne", "p__id": 1, "p__phonenumber": "123 123"}),
                json!({"e__id": 4, "e__name": "zYne", "p__id": 2, "p__phonenumber": "222 222"}),
            ]))
        });

    let result = fetch(&db, &compiled, HydrationMode::Record).await.unwrap();
    match result {
        HydratedResult::Records(users) => {
            assert_eq!(users.len(), 1);
            assert_eq!(users.get(0).and_then(|u| u.many("Phonenumber")).map(|p| p.len()), Some(2));
        }
        other => panic!("unexpected result {:?}", other),
    }
}

#[tokio::test]
async fn test_fetch_default_uses_configured_mode() {
    let catalog = fixture_catalog();
    let config = CompilerConfig::from_yaml_str("default_hydration: scalar\n").unwrap();
    let compiled = QueryCompiler::new(&catalog, &PostgresDialect)
        .with_config(config)
        .compile("SELECT u.name FROM User u", &[])
        .unwrap();

    let mut db = MockDb::new();
    db.expect_execute().times(1).returning(|_, _| {
        Ok(row_stream(vec![
            json!({"e__id": 4, "e__name": "zYne"}),
            json!({"e__id": 5, "e__name": "arnold"}),
        ]))
    });

    match fetch_default(&db, &compiled).await.unwrap() {
        HydratedResult::Scalar(rows) => {
            assert_eq!(rows.len(), 2);
            assert_eq!(rows[1]["u_name"], json!("arnold"));
        }
        other => panic!("unexpected result {:?}", other),
    }
}

#[tokio::test]
async fn test_connection_error_passes_through() {
    let catalog = fixture_catalog();
    let compiled = QueryCompiler::new(&catalog, &PostgresDialect)
        .compile("SELECT u.name FROM User u", &[])
        .unwrap();

    let mut db = MockDb::new();
    db.expect_execute()
        .returning(|_, _| Err(DbError("connection refused".to_string())));

    let err = fetch(&db, &compiled, HydrationMode::Array).await.unwrap_err();
    match err {
        FetchError::Connection(inner) => assert_eq!(inner, DbError("connection refused".to_string())),
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_short_row_is_a_hydration_error() {
    let catalog = fixture_catalog();
    let compiled = QueryCompiler::new(&catalog, &PostgresDialect)
        .compile("SELECT u.name FROM User u", &[])
        .unwrap();

    let mut db = MockDb::new();
    db.expect_execute()
        .returning(|_, _| Ok(row_stream(vec![json!({"e__id": 4})])));

    let err = fetch(&db, &compiled, HydrationMode::Record).await.unwrap_err();
    assert!(matches!(err, FetchError::Hydration(_)));
}

#[tokio::test]
async fn test_fetch_count_reads_numeric_strings() {
    let catalog = fixture_catalog();
    let count = QueryCompiler::new(&catalog, &PostgresDialect)
        .compile_count("FROM User u LEFT JOIN u.Phonenumber p", &[])
        .unwrap();

    let mut db = MockDb::new();
    db.expect_execute()
        .withf(|sql, _| sql.starts_with("SELECT COUNT(*) AS num_results FROM (SELECT DISTINCT e.id"))
        .returning(|_, _| Ok(row_stream(vec![json!({"num_results": "42"})])));

    assert_eq!(fetch_count(&db, &count).await.unwrap(), 42);
}

#[tokio::test]
async fn test_fetch_count_without_rows() {
    let catalog = fixture_catalog();
    let count = QueryCompiler::new(&catalog, &PostgresDialect)
        .compile_count("FROM Email e", &[])
        .unwrap();

    let mut db = MockDb::new();
    db.expect_execute().returning(|_, _| Ok(row_stream(Vec::new())));

    let err = fetch_count(&db, &count).await.unwrap_err();
    assert!(matches!(err, FetchError::MissingCount { alias } if alias == "num_results"));
}
