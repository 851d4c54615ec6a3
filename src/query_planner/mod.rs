//! Semantic analysis: from a parsed DQL query to a [`QueryPlan`].
//!
//! 1. aliases are bound and FROM elements expanded into a join graph
//!    ([`join_planner`]),
//! 2. clause text is resolved against that graph ([`expression`]),
//! 3. default orderings, key completion and join pruning are applied.

pub mod alias_resolver;
pub(crate) mod analyzer;
mod clause_builder;
pub mod clause_set;
pub mod errors;
pub mod expression;
pub mod join_graph;
pub(crate) mod join_planner;
pub mod query_plan;

use crate::config::CompilerConfig;
use crate::dql_parser::parse_query_with;
use crate::schema_catalog::SchemaMetadataProvider;

pub use alias_resolver::{AliasId, AliasNames, AliasResolver};
pub use analyzer::plan_query;
pub use clause_set::{ClauseSet, OrderTerm, SelectItem, Subquery};
pub use errors::QueryError;
pub use expression::{ExprPiece, ResolvedExpr};
pub use join_graph::{JoinGraph, JoinNode, JoinType, NodeRole};
pub use query_plan::QueryPlan;

/// Parses and plans `dql` in one step.
pub fn plan_dql(
    provider: &dyn SchemaMetadataProvider,
    config: &CompilerConfig,
    dql: &str,
) -> Result<QueryPlan, QueryError> {
    let ast = parse_query_with(dql, config.scanner())?;
    let plan = plan_query(provider, config, &ast)?;
    log::debug!(
        "Planned query with {} join(s), {} select item(s), {} placeholder(s)",
        plan.emitted.len().saturating_sub(1),
        plan.clauses.select.len(),
        plan.placeholders
    );
    Ok(plan)
}
