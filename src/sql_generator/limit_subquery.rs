//! LIMIT/OFFSET over queries whose joins fan root rows out.
//!
//! The limit is applied to the distinct root identifiers in a subquery that
//! repeats the joins under fresh aliases; the outer statement re-joins
//! everything and keeps only rows whose root is in that set:
//!
//! ```text
//! SELECT ... FROM entity e LEFT JOIN phonenumber p ON ...
//! WHERE e.id IN (SELECT DISTINCT e2.id FROM entity e2 LEFT JOIN phonenumber p2 ON ... LIMIT 10)
//! ```
//!
//! An explicit ORDER BY on root columns is selected next to the identifiers,
//! and a derived table projects the identifiers back out. When the ORDER BY
//! reads a joined alias the ordered subquery is wrapped once more so DISTINCT
//! and LIMIT apply to its ordered output.

use super::sql_writer::{RenderContext, SqlStatement, SqlWriter, ToSql};
use super::to_sql_query::{
    write_from, write_grouping, write_limit, write_order_by, write_select_list, RootFilter, SqlBuilder,
};
use crate::query_planner::clause_set::OrderTerm;
use crate::query_planner::expression::ResolvedExpr;

const LIMIT_SUBQUERY: &str = "limit_subquery";
const LIMIT_SUBQUERY_WRAP: &str = "limit_subquery_wrap";

impl SqlBuilder<'_> {
    pub(super) fn build_limited(&self) -> SqlStatement {
        let ctx = self.context();
        let clauses = &self.plan.clauses;
        let root = self.plan.graph.root();
        let pk_columns = root.component.primary_key_names();

        let mut out = SqlWriter::new();
        write_select_list(&ctx, clauses, &mut out);
        write_from(&ctx, &self.plan.graph, &self.plan.emitted, &mut out);

        out.push(" WHERE ");
        if pk_columns.len() > 1 {
            out.push("(");
        }
        for (i, column) in pk_columns.iter().enumerate() {
            if i > 0 {
                out.push(", ");
            }
            out.push_column(&ctx, ctx.names.get(root.alias), column);
        }
        if pk_columns.len() > 1 {
            out.push(")");
        }
        out.push(" IN (");
        self.write_limited_identifiers(&ctx, &pk_columns, &mut out);
        out.push(")");

        if let Some(filter) = RootFilter::new(root, clauses.where_clause.as_ref()) {
            out.push(" AND ");
            filter.to_sql(&ctx, &mut out);
        }
        write_grouping(&ctx, clauses, &mut out);
        write_order_by(&ctx, &clauses.order_by, &mut out);

        let statement = out.finish();
        log::debug!("Generated SQL with limit subquery: {}", statement.sql);
        statement
    }

    /// The subquery yielding the limited root identifiers.
    fn write_limited_identifiers(&self, ctx: &RenderContext<'_>, pk_columns: &[String], out: &mut SqlWriter) {
        let clauses = &self.plan.clauses;
        let root_id = self.plan.graph.root_id();
        let shadow = self.plan.shadow_aliases.as_ref().unwrap_or(&self.plan.aliases);
        let inner_ctx = ctx.with_names(shadow).inlining(Some(clauses));

        // schema default orderings do not decide which roots are kept
        let explicit: Vec<&OrderTerm> = clauses.order_by.iter().filter(|term| !term.implicit).collect();
        let ordered_by_join = explicit
            .iter()
            .any(|term| term.expr.deps.iter().any(|alias| *alias != root_id));
        let derived_table = ctx.dialect.limit_subquery_requires_derived_table();

        // DISTINCT needs every ORDER BY expression in its select list
        let order_outputs: Vec<&ResolvedExpr> = if ordered_by_join {
            Vec::new()
        } else {
            let mut outputs: Vec<&ResolvedExpr> = Vec::new();
            for term in &explicit {
                let is_root_key = term
                    .expr
                    .as_column()
                    .is_some_and(|(alias, column)| alias == root_id && pk_columns.iter().any(|pk| pk == column));
                if !is_root_key && !outputs.contains(&&term.expr) {
                    outputs.push(&term.expr);
                }
            }
            outputs
        };

        let mut inner = SqlWriter::new();
        inner.push(if ordered_by_join { "SELECT " } else { "SELECT DISTINCT " });
        for (i, column) in pk_columns.iter().enumerate() {
            if i > 0 {
                inner.push(", ");
            }
            inner.push_column(&inner_ctx, shadow.get(root_id), column);
        }
        for expr in &order_outputs {
            inner.push(", ");
            expr.to_sql(&inner_ctx, &mut inner);
        }
        write_from(&inner_ctx, &self.plan.graph, &self.plan.emitted, &mut inner);
        if let Some(filter) = RootFilter::new(self.plan.graph.root(), clauses.where_clause.as_ref()) {
            inner.push(" WHERE ");
            filter.to_sql(&inner_ctx, &mut inner);
        }
        write_grouping(&inner_ctx, clauses, &mut inner);
        write_order_by(&inner_ctx, &explicit, &mut inner);

        // LIMIT sits inside a derived table once the key is projected out of it
        let mut limit_in_derived_table = false;
        let mut limited = if ordered_by_join {
            log::debug!("ORDER BY reads a joined alias; wrapping the limit subquery");
            let mut wrap = SqlWriter::new();
            wrap.push("SELECT DISTINCT ");
            push_derived_columns(ctx, &mut wrap, LIMIT_SUBQUERY, pk_columns);
            wrap.push(" FROM (")
                .append(inner)
                .push(") ")
                .push_ident(ctx, LIMIT_SUBQUERY);
            write_limit(ctx, clauses.limit, clauses.offset, false, &mut wrap);
            wrap
        } else if !order_outputs.is_empty() {
            write_limit(ctx, clauses.limit, clauses.offset, true, &mut inner);
            let mut wrap = SqlWriter::new();
            wrap.push("SELECT ");
            push_derived_columns(ctx, &mut wrap, LIMIT_SUBQUERY, pk_columns);
            wrap.push(" FROM (")
                .append(inner)
                .push(") ")
                .push_ident(ctx, LIMIT_SUBQUERY);
            limit_in_derived_table = true;
            wrap
        } else {
            write_limit(ctx, clauses.limit, clauses.offset, !explicit.is_empty(), &mut inner);
            inner
        };

        if derived_table && !limit_in_derived_table {
            let mut wrap = SqlWriter::new();
            wrap.push("SELECT ");
            push_derived_columns(ctx, &mut wrap, LIMIT_SUBQUERY_WRAP, pk_columns);
            wrap.push(" FROM (")
                .append(limited)
                .push(") AS ")
                .push_ident(ctx, LIMIT_SUBQUERY_WRAP);
            limited = wrap;
        }
        out.append(limited);
    }
}

fn push_derived_columns(ctx: &RenderContext<'_>, out: &mut SqlWriter, table: &str, columns: &[String]) {
    for (i, column) in columns.iter().enumerate() {
        if i > 0 {
            out.push(", ");
        }
        out.push_column(ctx, table, column);
    }
}

#[cfg(test)]
mod tests {
    use crate::config::CompilerConfig;
    use crate::query_planner::plan_dql;
    use crate::schema_catalog::testing::fixture_catalog;
    use crate::sql_generator::dialect::{Dialect, MysqlDialect, PostgresDialect, SqliteDialect};
    use crate::sql_generator::to_sql_query::SqlBuilder;
    use serde_json::{json, Value};

    fn sql_with(dql: &str, dialect: &dyn Dialect, values: &[Value]) -> (String, Vec<Value>) {
        let catalog = fixture_catalog();
        let config = CompilerConfig::default();
        let plan = plan_dql(&catalog, &config, dql).unwrap();
        let statement = SqlBuilder::new(&plan, dialect, &config, values).build();
        (statement.sql, statement.params)
    }

    #[test]
    fn test_limit_with_fan_out_uses_identifier_subquery() {
        let (sql, _) = sql_with(
            "SELECT u.name, p.phonenumber FROM User u LEFT JOIN u.Phonenumber p LIMIT 10",
            &PostgresDialect,
            &[],
        );
        assert_eq!(
            sql,
            "SELECT e.id AS e__id, e.name AS e__name, p.id AS p__id, p.phonenumber AS p__phonenumber \
             FROM entity e LEFT JOIN phonenumber p ON e.id = p.entity_id \
             WHERE e.id IN (SELECT DISTINCT e2.id FROM entity e2 LEFT JOIN phonenumber p2 ON e2.id = p2.entity_id \
             WHERE (e2.type = 0) LIMIT 10) AND (e.type = 0)"
        );
    }

    #[test]
    fn test_order_by_joined_alias_wraps_twice() {
        let (sql, _) = sql_with(
            "SELECT u.name, p.phonenumber FROM User u LEFT JOIN u.Phonenumber p ORDER BY p.phonenumber LIMIT 10 OFFSET 5",
            &SqliteDialect,
            &[],
        );
        assert_eq!(
            sql,
            "SELECT e.id AS e__id, e.name AS e__name, p.id AS p__id, p.phonenumber AS p__phonenumber \
             FROM entity e LEFT JOIN phonenumber p ON e.id = p.entity_id \
             WHERE e.id IN (SELECT DISTINCT limit_subquery.id FROM (SELECT e2.id FROM entity e2 \
             LEFT JOIN phonenumber p2 ON e2.id = p2.entity_id WHERE (e2.type = 0) ORDER BY p2.phonenumber) \
             limit_subquery LIMIT 10 OFFSET 5) AND (e.type = 0) ORDER BY p.phonenumber"
        );
    }

    #[test]
    fn test_mysql_keeps_limit_inside_derived_table() {
        let (sql, params) = sql_with(
            "SELECT u.name, p.phonenumber FROM User u LEFT JOIN u.Phonenumber p WHERE u.name = ? ORDER BY u.name LIMIT 3",
            &MysqlDialect,
            &[json!("zYne")],
        );
        assert_eq!(
            sql,
            "SELECT e.id AS e__id, e.name AS e__name, p.id AS p__id, p.phonenumber AS p__phonenumber \
             FROM entity e LEFT JOIN phonenumber p ON e.id = p.entity_id \
             WHERE e.id IN (SELECT limit_subquery.id FROM (SELECT DISTINCT e2.id, e2.name FROM entity e2 \
             LEFT JOIN phonenumber p2 ON e2.id = p2.entity_id WHERE (e2.name = ?) AND (e2.type = 0) \
             ORDER BY e2.name LIMIT 3) limit_subquery) AND (e.name = ?) AND (e.type = 0) ORDER BY e.name"
        );
        // the WHERE clause is rendered twice, so is its parameter
        assert_eq!(params, vec![json!("zYne"), json!("zYne")]);
    }

    #[test]
    fn test_mysql_unordered_limit_gets_its_own_derived_table() {
        let (sql, _) = sql_with(
            "SELECT u.name, p.phonenumber FROM User u LEFT JOIN u.Phonenumber p LIMIT 3",
            &MysqlDialect,
            &[],
        );
        assert!(sql.contains(
            "WHERE e.id IN (SELECT limit_subquery_wrap.id FROM (SELECT DISTINCT e2.id FROM entity e2 \
             LEFT JOIN phonenumber p2 ON e2.id = p2.entity_id WHERE (e2.type = 0) LIMIT 3) AS limit_subquery_wrap)"
        ));
    }

    #[test]
    fn test_root_ordering_is_selected_alongside_distinct_identifiers() {
        let (sql, _) = sql_with(
            "SELECT u.name, p.phonenumber FROM User u LEFT JOIN u.Phonenumber p ORDER BY u.name DESC, u.id LIMIT 10",
            &PostgresDialect,
            &[],
        );
        assert_eq!(
            sql,
            "SELECT e.id AS e__id, e.name AS e__name, p.id AS p__id, p.phonenumber AS p__phonenumber \
             FROM entity e LEFT JOIN phonenumber p ON e.id = p.entity_id \
             WHERE e.id IN (SELECT limit_subquery.id FROM (SELECT DISTINCT e2.id, e2.name FROM entity e2 \
             LEFT JOIN phonenumber p2 ON e2.id = p2.entity_id WHERE (e2.type = 0) ORDER BY e2.name DESC, e2.id \
             LIMIT 10) limit_subquery) AND (e.type = 0) ORDER BY e.name DESC, e.id"
        );
    }

    #[test]
    fn test_default_ordering_stays_out_of_limit_subquery() {
        let (sql, _) = sql_with(
            "SELECT m.username, r.name FROM Member m LEFT JOIN m.Roles r LIMIT 2",
            &PostgresDialect,
            &[],
        );
        assert_eq!(
            sql,
            "SELECT m.id AS m__id, m.username AS m__username, r.id AS r__id, r.name AS r__name \
             FROM member m LEFT JOIN member_role m2 ON (m.id = m2.member_id) LEFT JOIN role r ON r.id = m2.role_id \
             WHERE m.id IN (SELECT DISTINCT m3.id FROM member m3 LEFT JOIN member_role m4 ON (m3.id = m4.member_id) \
             LEFT JOIN role r2 ON r2.id = m4.role_id LIMIT 2) ORDER BY m2.position ASC"
        );
    }
}
