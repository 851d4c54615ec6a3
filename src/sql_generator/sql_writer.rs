use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::dialect::Dialect;
use super::to_sql_query::write_subquery;
use crate::query_planner::alias_resolver::AliasNames;
use crate::query_planner::clause_set::{expression_output, ClauseSet, OrderTerm, SelectItem};
use crate::query_planner::expression::{ExprPiece, ResolvedExpr};

/// SQL text plus the parameter values in the order their `?` appear.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlStatement {
    pub sql: String,
    pub params: Vec<Value>,
}

/// What a statement is rendered against: the dialect, the alias names of the
/// statement and the caller's positional parameter values.
#[derive(Clone, Copy)]
pub struct RenderContext<'r> {
    pub dialect: &'r dyn Dialect,
    pub names: &'r AliasNames,
    pub quote: bool,
    pub values: &'r [Value],
    /// When set, references to select-list outputs are replaced by the
    /// referenced expression, for statements that do not carry that select list.
    pub inline_outputs: Option<&'r ClauseSet>,
}

impl<'r> RenderContext<'r> {
    pub fn new(dialect: &'r dyn Dialect, names: &'r AliasNames, quote: bool, values: &'r [Value]) -> Self {
        RenderContext {
            dialect,
            names,
            quote,
            values,
            inline_outputs: None,
        }
    }

    pub fn with_names(self, names: &'r AliasNames) -> Self {
        RenderContext { names, ..self }
    }

    pub fn inlining(self, clauses: Option<&'r ClauseSet>) -> Self {
        RenderContext {
            inline_outputs: clauses,
            ..self
        }
    }

    pub fn ident<'n>(&self, name: &'n str) -> Cow<'n, str> {
        if self.quote {
            Cow::Owned(self.dialect.quote_identifier(name))
        } else {
            Cow::Borrowed(name)
        }
    }
}

#[derive(Debug, Default)]
pub struct SqlWriter {
    sql: String,
    params: Vec<Value>,
}

impl SqlWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, text: &str) -> &mut Self {
        self.sql.push_str(text);
        self
    }

    pub fn push_ident(&mut self, ctx: &RenderContext<'_>, name: &str) -> &mut Self {
        let ident = ctx.ident(name);
        self.sql.push_str(&ident);
        self
    }

    pub fn push_column(&mut self, ctx: &RenderContext<'_>, alias: &str, column: &str) -> &mut Self {
        self.push_ident(ctx, alias).push(".").push_ident(ctx, column)
    }

    pub fn push_param(&mut self, value: Value) -> &mut Self {
        self.sql.push('?');
        self.params.push(value);
        self
    }

    /// Renders every item with `separator` between them.
    pub fn push_list<T: ToSql>(&mut self, ctx: &RenderContext<'_>, items: &[T], separator: &str) -> &mut Self {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.push(separator);
            }
            item.to_sql(ctx, self);
        }
        self
    }

    /// Appends another statement's text and parameters.
    pub fn append(&mut self, other: SqlWriter) -> &mut Self {
        self.sql.push_str(&other.sql);
        self.params.extend(other.params);
        self
    }

    pub fn finish(self) -> SqlStatement {
        SqlStatement {
            sql: self.sql,
            params: self.params,
        }
    }
}

/// Rendering of planner values into a [`SqlWriter`].
pub trait ToSql {
    fn to_sql(&self, ctx: &RenderContext<'_>, out: &mut SqlWriter);
}

impl ToSql for ResolvedExpr {
    fn to_sql(&self, ctx: &RenderContext<'_>, out: &mut SqlWriter) {
        for piece in &self.pieces {
            match piece {
                ExprPiece::Text(text) => {
                    out.push(text);
                }
                ExprPiece::Column { alias, column } => {
                    out.push_column(ctx, ctx.names.get(*alias), column);
                }
                ExprPiece::OutputRef { owner, ordinal } => {
                    let inlined = ctx
                        .inline_outputs
                        .and_then(|clauses| clauses.expression(*owner, *ordinal));
                    match inlined {
                        Some(SelectItem::Expression { expr, .. }) => expr.to_sql(ctx, out),
                        _ => {
                            out.push_ident(ctx, &expression_output(ctx.names, *owner, *ordinal));
                        }
                    }
                }
                ExprPiece::Placeholder(ordinal) => {
                    let value = ctx.values.get(*ordinal).cloned().unwrap_or(Value::Null);
                    out.push_param(value);
                }
                ExprPiece::Subquery(subquery) => {
                    write_subquery(ctx, subquery, out);
                }
                ExprPiece::Discriminator {
                    alias,
                    column,
                    value,
                } => {
                    let alias = ctx.ident(ctx.names.get(*alias));
                    let column = ctx.ident(column);
                    out.push(&ctx.dialect.discriminator_predicate(&alias, &column, value));
                }
            }
        }
    }
}

impl ToSql for SelectItem {
    fn to_sql(&self, ctx: &RenderContext<'_>, out: &mut SqlWriter) {
        match self {
            SelectItem::Field { alias, column, .. } => {
                out.push_column(ctx, ctx.names.get(*alias), column);
            }
            SelectItem::Expression { expr, .. } => expr.to_sql(ctx, out),
        }
        out.push(" AS ").push_ident(ctx, &self.output_name(ctx.names));
    }
}

impl ToSql for OrderTerm {
    fn to_sql(&self, ctx: &RenderContext<'_>, out: &mut SqlWriter) {
        self.expr.to_sql(ctx, out);
        if let Some(direction) = &self.direction {
            out.push(" ").push(direction);
        }
    }
}
