//! Per-database SQL differences: identifier quoting, the shape of LIMIT and
//! OFFSET, and whether a limited fan-out query needs a limit subquery.

use std::fmt;

use serde_json::Value;

pub trait Dialect: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Trailing LIMIT/OFFSET text without a leading space, or an empty string.
    fn limit_clause(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        match (limit, offset) {
            (Some(limit), Some(offset)) => format!("LIMIT {} OFFSET {}", limit, offset),
            (Some(limit), None) => format!("LIMIT {}", limit),
            (None, Some(offset)) => format!("OFFSET {}", offset),
            (None, None) => String::new(),
        }
    }

    /// Whether LIMIT on a query with to-many joins must be applied to root
    /// identifiers in a subquery rather than to the joined rows.
    fn needs_limit_subquery_wrap(&self) -> bool {
        true
    }

    /// Whether the limit subquery must be wrapped in a derived table before it
    /// can be used with `IN` (MySQL rejects LIMIT inside `IN (...)`).
    fn limit_subquery_requires_derived_table(&self) -> bool {
        false
    }

    /// Whether OFFSET/FETCH is only valid after an ORDER BY.
    fn offset_requires_order_by(&self) -> bool {
        false
    }

    fn literal(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(true) => "1".to_string(),
            Value::Bool(false) => "0".to_string(),
            Value::Number(n) => n.to_string(),
            Value::String(s) => format!("'{}'", s.replace('\'', "''")),
            other => format!("'{}'", other.to_string().replace('\'', "''")),
        }
    }

    /// Inheritance filter for an already rendered alias and column.
    fn discriminator_predicate(&self, alias: &str, column: &str, value: &Value) -> String {
        format!("{}.{} = {}", alias, column, self.literal(value))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlDialect;

impl Dialect for MysqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn limit_clause(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        match (limit, offset) {
            (Some(limit), Some(offset)) => format!("LIMIT {} OFFSET {}", limit, offset),
            (Some(limit), None) => format!("LIMIT {}", limit),
            // MySQL has no bare OFFSET
            (None, Some(offset)) => format!("LIMIT {} OFFSET {}", u64::MAX, offset),
            (None, None) => String::new(),
        }
    }

    fn limit_subquery_requires_derived_table(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "pgsql"
    }

    fn literal(&self, value: &Value) -> String {
        match value {
            Value::Bool(true) => "TRUE".to_string(),
            Value::Bool(false) => "FALSE".to_string(),
            other => default_literal(other),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn limit_clause(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        match (limit, offset) {
            (Some(limit), Some(offset)) => format!("LIMIT {} OFFSET {}", limit, offset),
            (Some(limit), None) => format!("LIMIT {}", limit),
            (None, Some(offset)) => format!("LIMIT -1 OFFSET {}", offset),
            (None, None) => String::new(),
        }
    }
}

fn fetch_clause(limit: Option<u64>, offset: Option<u64>) -> String {
    match (limit, offset) {
        (Some(limit), offset) => format!(
            "OFFSET {} ROWS FETCH NEXT {} ROWS ONLY",
            offset.unwrap_or(0),
            limit
        ),
        (None, Some(offset)) => format!("OFFSET {} ROWS", offset),
        (None, None) => String::new(),
    }
}

fn default_literal(value: &Value) -> String {
    MysqlDialect.literal(value)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OracleDialect;

impl Dialect for OracleDialect {
    fn name(&self) -> &'static str {
        "oracle"
    }

    fn limit_clause(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        fetch_clause(limit, offset)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MssqlDialect;

impl Dialect for MssqlDialect {
    fn name(&self) -> &'static str {
        "mssql"
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("[{}]", name.replace(']', "]]"))
    }

    fn limit_clause(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        fetch_clause(limit, offset)
    }

    fn offset_requires_order_by(&self) -> bool {
        true
    }
}

/// Looks a dialect up by its driver name.
pub fn dialect_for_name(name: &str) -> Option<Box<dyn Dialect>> {
    match name.to_ascii_lowercase().as_str() {
        "mysql" | "mariadb" => Some(Box::new(MysqlDialect)),
        "pgsql" | "postgres" | "postgresql" => Some(Box::new(PostgresDialect)),
        "sqlite" => Some(Box::new(SqliteDialect)),
        "oracle" | "oci" => Some(Box::new(OracleDialect)),
        "mssql" | "sqlsrv" => Some(Box::new(MssqlDialect)),
        _ => None,
    }
}
