//! DQL compiler - object queries over a relational schema
//!
//! This crate turns DQL text into dialect SQL and hydrates the flat result
//! rows back into nested records:
//! - DQL tokenizing and parsing
//! - Alias resolution and join planning against component metadata
//! - SQL generation with limit subqueries and count statements
//! - Row hydration into records, arrays or scalar rows

pub mod compiler;
pub mod config;
pub mod connection;
pub mod dql_parser;
pub mod hydration;
pub mod query_planner;
pub mod schema_catalog;
pub mod sql_generator;

use serde_json::Value;

pub use compiler::{CompiledCount, CompiledQuery, Query, QueryCompiler};
pub use config::{CompilerConfig, ConfigError};
pub use connection::{fetch, fetch_count, fetch_default, Connection, FetchError, RowStream};
pub use hydration::{
    hydrate, Collection, HydratedResult, HydrationError, HydrationMode, HydrationPlan, Record, Related, ResultRow,
};
pub use query_planner::QueryError;
pub use schema_catalog::{SchemaCatalog, SchemaCatalogError, SchemaMetadataProvider};
pub use sql_generator::{dialect_for_name, Dialect};

/// Compiles `dql` with the default configuration.
pub fn compile(
    provider: &dyn SchemaMetadataProvider,
    dialect: &dyn Dialect,
    dql: &str,
    params: &[Value],
) -> Result<CompiledQuery, QueryError> {
    QueryCompiler::new(provider, dialect).compile(dql, params)
}

/// Compiles the count statement for `dql` with the default configuration.
pub fn compile_count(
    provider: &dyn SchemaMetadataProvider,
    dialect: &dyn Dialect,
    dql: &str,
    params: &[Value],
) -> Result<CompiledCount, QueryError> {
    QueryCompiler::new(provider, dialect).compile_count(dql, params)
}
