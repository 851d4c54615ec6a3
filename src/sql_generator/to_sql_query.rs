use serde_json::Value;

use super::dialect::Dialect;
use super::sql_writer::{RenderContext, SqlStatement, SqlWriter, ToSql};
use crate::config::CompilerConfig;
use crate::query_planner::alias_resolver::AliasId;
use crate::query_planner::clause_set::{ClauseSet, OrderTerm, SelectItem, Subquery};
use crate::query_planner::expression::ResolvedExpr;
use crate::query_planner::join_graph::{JoinGraph, JoinNode};
use crate::query_planner::query_plan::QueryPlan;

/// Renders a [`QueryPlan`] for one dialect.
pub struct SqlBuilder<'b> {
    pub(super) plan: &'b QueryPlan,
    pub(super) dialect: &'b dyn Dialect,
    pub(super) config: &'b CompilerConfig,
    pub(super) values: &'b [Value],
}

impl<'b> SqlBuilder<'b> {
    pub fn new(
        plan: &'b QueryPlan,
        dialect: &'b dyn Dialect,
        config: &'b CompilerConfig,
        values: &'b [Value],
    ) -> Self {
        SqlBuilder {
            plan,
            dialect,
            config,
            values,
        }
    }

    pub(super) fn context(&self) -> RenderContext<'b> {
        RenderContext::new(
            self.dialect,
            &self.plan.aliases,
            self.config.quote_identifiers,
            self.values,
        )
    }

    /// A LIMIT over fanned-out rows is applied to distinct root identifiers
    /// in a subquery. Grouped or aggregated statements return one row per
    /// group, so their LIMIT is applied directly.
    pub fn uses_limit_subquery(&self) -> bool {
        let clauses = &self.plan.clauses;
        self.plan.shadow_aliases.is_some()
            && self.dialect.needs_limit_subquery_wrap()
            && clauses.group_by.is_empty()
            && !clauses.has_aggregates()
    }

    pub fn build(&self) -> SqlStatement {
        if self.uses_limit_subquery() {
            return self.build_limited();
        }

        let ctx = self.context();
        let clauses = &self.plan.clauses;
        let mut out = SqlWriter::new();
        write_select_list(&ctx, clauses, &mut out);
        write_from(&ctx, &self.plan.graph, &self.plan.emitted, &mut out);
        if let Some(filter) = RootFilter::new(self.plan.graph.root(), clauses.where_clause.as_ref()) {
            out.push(" WHERE ");
            filter.to_sql(&ctx, &mut out);
        }
        write_grouping(&ctx, clauses, &mut out);
        write_order_by(&ctx, &clauses.order_by, &mut out);
        write_limit(&ctx, clauses.limit, clauses.offset, !clauses.order_by.is_empty(), &mut out);

        let statement = out.finish();
        log::debug!("Generated SQL: {}", statement.sql);
        statement
    }
}

pub(super) fn write_select_list(ctx: &RenderContext<'_>, clauses: &ClauseSet, out: &mut SqlWriter) {
    out.push("SELECT ");
    if clauses.distinct {
        out.push("DISTINCT ");
    }
    out.push_list(ctx, &clauses.select, ", ");
}

impl ToSql for JoinNode {
    fn to_sql(&self, ctx: &RenderContext<'_>, out: &mut SqlWriter) {
        out.push(" ")
            .push(self.join_type.keyword())
            .push(" ")
            .push_ident(ctx, &self.component.table_name)
            .push(" ")
            .push_ident(ctx, ctx.names.get(self.alias));

        let predicates = self.predicates();
        if predicates.is_empty() {
            return;
        }
        out.push(" ON ");
        for (i, (expr, parenthesize)) in predicates.into_iter().enumerate() {
            if i > 0 {
                out.push(" AND ");
            }
            if parenthesize {
                out.push("(");
                expr.to_sql(ctx, out);
                out.push(")");
            } else {
                expr.to_sql(ctx, out);
            }
        }
    }
}

/// ` FROM root r JOIN ...` over the given emission order.
pub(super) fn write_from(ctx: &RenderContext<'_>, graph: &JoinGraph, emitted: &[AliasId], out: &mut SqlWriter) {
    let root = graph.root();
    out.push(" FROM ")
        .push_ident(ctx, &root.component.table_name)
        .push(" ")
        .push_ident(ctx, ctx.names.get(root.alias));
    for node in emitted.iter().filter_map(|id| graph.node(*id)) {
        if node.alias != root.alias {
            node.to_sql(ctx, out);
        }
    }
}

/// The WHERE condition of a statement: the user's condition and the root
/// component's inheritance discriminator.
pub(super) struct RootFilter<'p> {
    user: Option<&'p ResolvedExpr>,
    discriminator: Option<ResolvedExpr>,
}

impl<'p> RootFilter<'p> {
    pub fn new(root: &JoinNode, user: Option<&'p ResolvedExpr>) -> Option<Self> {
        let discriminator = root
            .component
            .inheritance
            .as_ref()
            .map(|discriminator| ResolvedExpr::discriminator(root.alias, discriminator));
        if user.is_none() && discriminator.is_none() {
            return None;
        }
        Some(RootFilter {
            user,
            discriminator,
        })
    }
}

impl ToSql for RootFilter<'_> {
    fn to_sql(&self, ctx: &RenderContext<'_>, out: &mut SqlWriter) {
        let parts = self.user.into_iter().chain(self.discriminator.as_ref());
        for (i, expr) in parts.enumerate() {
            if i > 0 {
                out.push(" AND ");
            }
            out.push("(");
            expr.to_sql(ctx, out);
            out.push(")");
        }
    }
}

/// ` GROUP BY ...` and ` HAVING (...)`.
pub(super) fn write_grouping(ctx: &RenderContext<'_>, clauses: &ClauseSet, out: &mut SqlWriter) {
    if !clauses.group_by.is_empty() {
        out.push(" GROUP BY ").push_list(ctx, &clauses.group_by, ", ");
    }
    if let Some(having) = &clauses.having {
        out.push(" HAVING (");
        having.to_sql(ctx, out);
        out.push(")");
    }
}

pub(super) fn write_order_by<T: std::borrow::Borrow<OrderTerm>>(ctx: &RenderContext<'_>, terms: &[T], out: &mut SqlWriter) {
    for (i, term) in terms.iter().enumerate() {
        out.push(if i == 0 { " ORDER BY " } else { ", " });
        term.borrow().to_sql(ctx, out);
    }
}

/// Dialect LIMIT/OFFSET text, preceded by a neutral ORDER BY where the
/// dialect only accepts OFFSET after one.
pub(super) fn write_limit(
    ctx: &RenderContext<'_>,
    limit: Option<u64>,
    offset: Option<u64>,
    ordered: bool,
    out: &mut SqlWriter,
) {
    let clause = ctx.dialect.limit_clause(limit, offset);
    if clause.is_empty() {
        return;
    }
    if !ordered && ctx.dialect.offset_requires_order_by() {
        out.push(" ORDER BY (SELECT NULL)");
    }
    out.push(" ").push(&clause);
}

/// Renders a nested `SELECT` in place. The surrounding parentheses belong to
/// the enclosing expression.
pub(crate) fn write_subquery(ctx: &RenderContext<'_>, subquery: &Subquery, out: &mut SqlWriter) {
    let ctx = ctx.inlining(None);
    let clauses = &subquery.clauses;

    out.push("SELECT ");
    if clauses.distinct {
        out.push("DISTINCT ");
    }
    for (i, item) in clauses.select.iter().enumerate() {
        if i > 0 {
            out.push(", ");
        }
        match item {
            SelectItem::Field { alias, column, .. } => {
                out.push_column(&ctx, ctx.names.get(*alias), column);
            }
            SelectItem::Expression { .. } => item.to_sql(&ctx, out),
        }
    }
    write_from(&ctx, &subquery.graph, &subquery.emitted, out);
    if let Some(filter) = RootFilter::new(subquery.graph.root(), clauses.where_clause.as_ref()) {
        out.push(" WHERE ");
        filter.to_sql(&ctx, out);
    }
    write_grouping(&ctx, clauses, out);
    write_order_by(&ctx, &clauses.order_by, out);
    write_limit(&ctx, clauses.limit, clauses.offset, !clauses.order_by.is_empty(), out);
}
