//! Compilation entry points and the [`Query`] builder.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::CompilerConfig;
use crate::dql_parser::ast::ClauseKind;
use crate::hydration::{HydrationMode, HydrationPlan};
use crate::query_planner::{plan_dql, QueryError, QueryPlan};
use crate::schema_catalog::SchemaMetadataProvider;
use crate::sql_generator::{generate_count_sql, generate_sql, Dialect};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<Value>,
    pub hydration_plan: HydrationPlan,
    /// Mode [`fetch_default`](crate::connection::fetch_default) hydrates with.
    #[serde(default)]
    pub hydration_mode: HydrationMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledCount {
    pub sql: String,
    pub params: Vec<Value>,
    /// Column holding the count.
    pub count_alias: String,
}

/// Compiles DQL against one schema and dialect. Holds no per-query state, so
/// one compiler can serve any number of compilations.
pub struct QueryCompiler<'a> {
    provider: &'a dyn SchemaMetadataProvider,
    dialect: &'a dyn Dialect,
    config: CompilerConfig,
}

impl<'a> QueryCompiler<'a> {
    pub fn new(provider: &'a dyn SchemaMetadataProvider, dialect: &'a dyn Dialect) -> Self {
        QueryCompiler {
            provider,
            dialect,
            config: CompilerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: CompilerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect
    }

    pub fn plan(&self, dql: &str) -> Result<QueryPlan, QueryError> {
        plan_dql(self.provider, &self.config, dql)
    }

    pub fn compile(&self, dql: &str, params: &[Value]) -> Result<CompiledQuery, QueryError> {
        let plan = self.plan(dql)?;
        check_parameters(&plan, params)?;
        let statement = generate_sql(&plan, self.dialect, &self.config, params);
        Ok(CompiledQuery {
            sql: statement.sql,
            params: statement.params,
            hydration_plan: HydrationPlan::from_query_plan(&plan),
            hydration_mode: self.config.default_hydration,
        })
    }

    pub fn compile_count(&self, dql: &str, params: &[Value]) -> Result<CompiledCount, QueryError> {
        let plan = self.plan(dql)?;
        check_parameters(&plan, params)?;
        let statement = generate_count_sql(&plan, self.dialect, &self.config, params);
        Ok(CompiledCount {
            sql: statement.sql,
            params: statement.params,
            count_alias: self.config.count_alias.clone(),
        })
    }

    pub fn compile_query(&self, query: &Query) -> Result<CompiledQuery, QueryError> {
        self.compile(&query.to_dql(), &query.params())
    }

    pub fn compile_count_query(&self, query: &Query) -> Result<CompiledCount, QueryError> {
        self.compile_count(&query.to_dql(), &query.params())
    }
}

fn check_parameters(plan: &QueryPlan, params: &[Value]) -> Result<(), QueryError> {
    if plan.placeholders != params.len() {
        return Err(QueryError::ParameterMismatch {
            clause: ClauseKind::Query,
            expected: plan.placeholders,
            given: params.len(),
        });
    }
    Ok(())
}

/// Programmatic DQL assembly. Parameters are kept per clause and returned in
/// the order the clauses appear in the generated text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    distinct: bool,
    select: Vec<String>,
    from: Vec<String>,
    joins: Vec<String>,
    where_parts: Vec<String>,
    group_by: Vec<String>,
    having_parts: Vec<String>,
    order_by: Vec<String>,
    limit: Option<u64>,
    offset: Option<u64>,
    where_params: Vec<Value>,
    having_params: Vec<Value>,
}

impl Query {
    pub fn create() -> Self {
        Self::default()
    }

    /// A query rooted at `component` under `alias`.
    pub fn for_component(component: &str, alias: &str) -> Self {
        Self::create().from(&format!("{} {}", component, alias))
    }

    pub fn select(mut self, items: &str) -> Self {
        self.select.push(items.to_string());
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn from(mut self, component: &str) -> Self {
        self.from.push(component.to_string());
        self
    }

    pub fn left_join(mut self, join: &str) -> Self {
        self.joins.push(format!("LEFT JOIN {}", join));
        self
    }

    pub fn inner_join(mut self, join: &str) -> Self {
        self.joins.push(format!("INNER JOIN {}", join));
        self
    }

    /// Replaces the WHERE condition.
    pub fn where_(mut self, condition: &str, params: Vec<Value>) -> Self {
        self.where_parts = vec![condition.to_string()];
        self.where_params = params;
        self
    }

    pub fn and_where(mut self, condition: &str, params: Vec<Value>) -> Self {
        self.where_parts.push(condition.to_string());
        self.where_params.extend(params);
        self
    }

    pub fn group_by(mut self, items: &str) -> Self {
        self.group_by.push(items.to_string());
        self
    }

    pub fn having(mut self, condition: &str, params: Vec<Value>) -> Self {
        self.having_parts.push(condition.to_string());
        self.having_params.extend(params);
        self
    }

    pub fn order_by(mut self, items: &str) -> Self {
        self.order_by.push(items.to_string());
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn params(&self) -> Vec<Value> {
        self.where_params
            .iter()
            .chain(&self.having_params)
            .cloned()
            .collect()
    }

    pub fn to_dql(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if !self.select.is_empty() {
            let distinct = if self.distinct { "DISTINCT " } else { "" };
            parts.push(format!("SELECT {}{}", distinct, self.select.join(", ")));
        }
        if !self.from.is_empty() {
            parts.push(format!("FROM {}", self.from.join(", ")));
        }
        parts.extend(self.joins.iter().cloned());
        if !self.where_parts.is_empty() {
            parts.push(format!("WHERE {}", conjunction(&self.where_parts)));
        }
        if !self.group_by.is_empty() {
            parts.push(format!("GROUP BY {}", self.group_by.join(", ")));
        }
        if !self.having_parts.is_empty() {
            parts.push(format!("HAVING {}", conjunction(&self.having_parts)));
        }
        if !self.order_by.is_empty() {
            parts.push(format!("ORDER BY {}", self.order_by.join(", ")));
        }
        if let Some(limit) = self.limit {
            parts.push(format!("LIMIT {}", limit));
        }
        if let Some(offset) = self.offset {
            parts.push(format!("OFFSET {}", offset));
        }
        parts.join(" ")
    }
}

fn conjunction(parts: &[String]) -> String {
    if parts.len() == 1 {
        return parts[0].clone();
    }
    parts
        .iter()
        .map(|part| format!("({})", part))
        .collect::<Vec<_>>()
        .join(" AND ")
}
