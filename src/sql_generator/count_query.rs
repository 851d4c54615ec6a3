//! Count statements: how many hydrated roots (or groups) the unlimited query
//! returns. ORDER BY, LIMIT and OFFSET never take part.

use super::sql_writer::{RenderContext, SqlStatement, SqlWriter, ToSql};
use super::to_sql_query::{write_from, write_grouping, RootFilter, SqlBuilder};
use crate::query_planner::alias_resolver::AliasId;
use crate::query_planner::clause_set::{ClauseSet, SelectItem};

const COUNT_QUERY: &str = "count_query";
const COUNT_QUERY_WRAP: &str = "count_query_wrap";

impl SqlBuilder<'_> {
    pub fn build_count(&self) -> SqlStatement {
        let ctx = self.context();
        let clauses = &self.plan.clauses;
        let root = self.plan.graph.root();
        let root_alias = ctx.names.get(root.alias);
        let pk_columns = root.component.primary_key_names();

        let mut out = SqlWriter::new();
        out.push("SELECT COUNT(*) AS ")
            .push_ident(&ctx, &self.config.count_alias);

        if !clauses.group_by.is_empty() {
            // one row per group
            out.push(" FROM (SELECT ");
            write_group_outputs(&ctx, clauses, &mut out);
            self.write_body(&ctx, &mut out);
            write_grouping(&ctx, clauses, &mut out);
            out.push(") ").push_ident(&ctx, COUNT_QUERY);
        } else if clauses.having.is_some() {
            // HAVING over ungrouped rows: count the distinct roots it keeps
            out.push(" FROM (SELECT DISTINCT ");
            push_columns(&ctx, &mut out, COUNT_QUERY, &pk_columns);
            out.push(" FROM (SELECT ");
            push_columns(&ctx, &mut out, root_alias, &pk_columns);
            for item in having_outputs(clauses) {
                out.push(", ");
                item.to_sql(&ctx, &mut out);
            }
            for (alias, column) in having_columns(clauses, root.alias, &pk_columns) {
                out.push(", ").push_column(&ctx, ctx.names.get(alias), column);
            }
            self.write_body(&ctx, &mut out);
            write_grouping(&ctx, clauses, &mut out);
            out.push(") ")
                .push_ident(&ctx, COUNT_QUERY)
                .push(") ")
                .push_ident(&ctx, COUNT_QUERY_WRAP);
        } else if clauses.distinct || self.plan.has_fan_out() {
            out.push(" FROM (SELECT DISTINCT ");
            push_columns(&ctx, &mut out, root_alias, &pk_columns);
            self.write_body(&ctx, &mut out);
            out.push(") ").push_ident(&ctx, COUNT_QUERY);
        } else {
            self.write_body(&ctx, &mut out);
        }

        let statement = out.finish();
        log::debug!("Generated count SQL: {}", statement.sql);
        statement
    }

    /// ` FROM ... [WHERE ...]` of the counted statement.
    fn write_body(&self, ctx: &RenderContext<'_>, out: &mut SqlWriter) {
        write_from(ctx, &self.plan.graph, &self.plan.emitted, out);
        let root = self.plan.graph.root();
        if let Some(filter) = RootFilter::new(root, self.plan.clauses.where_clause.as_ref()) {
            out.push(" WHERE ");
            filter.to_sql(ctx, out);
        }
    }
}

/// Select expressions the HAVING clause refers to by output name.
fn having_outputs(clauses: &ClauseSet) -> Vec<&SelectItem> {
    let Some(having) = &clauses.having else {
        return Vec::new();
    };
    let mut items: Vec<&SelectItem> = Vec::new();
    for (owner, ordinal) in having.output_refs() {
        if let Some(item) = clauses.expression(owner, ordinal) {
            if !items.iter().any(|seen| std::ptr::eq(*seen, item)) {
                items.push(item);
            }
        }
    }
    items
}

/// Plain columns the HAVING clause reads, minus the root key already selected.
fn having_columns<'c>(clauses: &'c ClauseSet, root: AliasId, pk_columns: &[String]) -> Vec<(AliasId, &'c str)> {
    let Some(having) = &clauses.having else {
        return Vec::new();
    };
    let mut columns: Vec<(AliasId, &str)> = Vec::new();
    for (alias, column) in having.columns() {
        let is_root_key = alias == root && pk_columns.iter().any(|pk| pk == column);
        if !is_root_key && !columns.contains(&(alias, column)) {
            columns.push((alias, column));
        }
    }
    columns
}

/// Grouping expressions under unique names, then the outputs HAVING needs.
fn write_group_outputs(ctx: &RenderContext<'_>, clauses: &ClauseSet, out: &mut SqlWriter) {
    for (i, expr) in clauses.group_by.iter().enumerate() {
        if i > 0 {
            out.push(", ");
        }
        expr.to_sql(ctx, out);
        let name = match expr.as_column() {
            Some((alias, column)) => format!("{}__{}", ctx.names.get(alias), column),
            None => format!("group__{}", i),
        };
        out.push(" AS ").push_ident(ctx, &name);
    }
    for item in having_outputs(clauses) {
        out.push(", ");
        item.to_sql(ctx, out);
    }
}

fn push_columns(ctx: &RenderContext<'_>, out: &mut SqlWriter, table: &str, columns: &[String]) {
    for (i, column) in columns.iter().enumerate() {
        if i > 0 {
            out.push(", ");
        }
        out.push_column(ctx, table, column);
    }
}
