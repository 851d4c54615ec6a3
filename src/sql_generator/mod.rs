//! Rendering of query plans into dialect SQL with ordered parameters.

mod count_query;
pub mod dialect;
mod limit_subquery;
pub mod sql_writer;
mod to_sql_query;

use serde_json::Value;

use crate::config::CompilerConfig;
use crate::query_planner::QueryPlan;

pub use dialect::{
    dialect_for_name, Dialect, MssqlDialect, MysqlDialect, OracleDialect, PostgresDialect, SqliteDialect,
};
pub use sql_writer::{RenderContext, SqlStatement, SqlWriter, ToSql};
pub use to_sql_query::SqlBuilder;

/// Renders the SELECT statement of `plan`.
pub fn generate_sql(plan: &QueryPlan, dialect: &dyn Dialect, config: &CompilerConfig, values: &[Value]) -> SqlStatement {
    SqlBuilder::new(plan, dialect, config, values).build()
}

/// Renders the statement counting the results of `plan`.
pub fn generate_count_sql(
    plan: &QueryPlan,
    dialect: &dyn Dialect,
    config: &CompilerConfig,
    values: &[Value],
) -> SqlStatement {
    SqlBuilder::new(plan, dialect, config, values).build_count()
}
