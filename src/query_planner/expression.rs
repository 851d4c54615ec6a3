//! Resolved expressions.
//!
//! Clause text is scanned once with a quote-aware state machine and turned into
//! a list of [`ExprPiece`]s: verbatim text, resolved `alias.column` references,
//! references to select-list outputs, positional placeholders and correlated
//! subqueries. The SQL builder later renders the pieces with whichever alias
//! names and dialect it is working with, so one resolved expression can appear
//! both in the outer statement and in a shadow-aliased limit subquery.

use std::collections::{BTreeSet, HashMap, HashSet};

use lazy_static::lazy_static;
use serde_json::Value;

use super::alias_resolver::AliasId;
use super::analyzer::Analyzer;
use super::clause_set::Subquery;
use super::errors::QueryError;
use crate::dql_parser::ast::ClauseKind;
use crate::dql_parser::common::starts_with_keyword;
use crate::schema_catalog::Discriminator;

lazy_static! {
    static ref AGGREGATE_FUNCTIONS: HashSet<&'static str> = [
        "COUNT",
        "SUM",
        "AVG",
        "MIN",
        "MAX",
        "GROUP_CONCAT",
        "STRING_AGG",
        "ARRAY_AGG",
        "STDDEV",
        "VARIANCE",
        "BIT_AND",
        "BIT_OR",
    ]
    .into_iter()
    .collect();
    static ref RESERVED_WORDS: HashSet<&'static str> = [
        "AND", "OR", "NOT", "XOR", "IN", "IS", "NULL", "LIKE", "ILIKE", "BETWEEN", "EXISTS",
        "TRUE", "FALSE", "CASE", "WHEN", "THEN", "ELSE", "END", "AS", "ASC", "DESC", "DISTINCT",
        "ALL", "ANY", "SOME", "ESCAPE", "INTERVAL", "REGEXP", "SELECT", "FROM", "WHERE", "ON",
        "WITH", "JOIN", "LEFT", "INNER", "GROUP", "ORDER", "BY", "HAVING", "LIMIT", "OFFSET",
        "NULLS", "FIRST", "LAST", "MEMBER", "OF", "EMPTY", "SIZE",
    ]
    .into_iter()
    .collect();
}

pub fn is_aggregate_function(name: &str) -> bool {
    AGGREGATE_FUNCTIONS.contains(name.to_ascii_uppercase().as_str())
}

pub fn is_reserved_word(word: &str) -> bool {
    RESERVED_WORDS.contains(word.to_ascii_uppercase().as_str())
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprPiece {
    Text(String),
    Column { alias: AliasId, column: String },
    /// Reference to the select-list expression `owner__ordinal`.
    OutputRef { owner: AliasId, ordinal: usize },
    /// Ordinal of a positional `?` across the whole query.
    Placeholder(usize),
    Subquery(Box<Subquery>),
    /// Inheritance filter; rendered through the dialect.
    Discriminator {
        alias: AliasId,
        column: String,
        value: Value,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedExpr {
    pub pieces: Vec<ExprPiece>,
    /// Aliases the expression reads from, including correlated outer aliases
    /// of nested subqueries.
    pub deps: BTreeSet<AliasId>,
    /// Calls an aggregate function at top level.
    pub aggregate: bool,
}

impl ResolvedExpr {
    pub fn column(alias: AliasId, column: &str) -> Self {
        let mut builder = ExprBuilder::new();
        builder.column(alias, column);
        builder.build()
    }

    pub fn discriminator(alias: AliasId, discriminator: &Discriminator) -> Self {
        let mut builder = ExprBuilder::new();
        builder.discriminator(alias, discriminator);
        builder.build()
    }

    /// The referenced column when the expression is exactly one `alias.column`.
    pub fn as_column(&self) -> Option<(AliasId, &str)> {
        match self.pieces.as_slice() {
            [ExprPiece::Column { alias, column }] => Some((*alias, column.as_str())),
            _ => None,
        }
    }

    pub fn columns(&self) -> impl Iterator<Item = (AliasId, &str)> {
        self.pieces.iter().filter_map(|piece| match piece {
            ExprPiece::Column { alias, column } => Some((*alias, column.as_str())),
            _ => None,
        })
    }

    pub fn output_refs(&self) -> impl Iterator<Item = (AliasId, usize)> + '_ {
        self.pieces.iter().filter_map(|piece| match piece {
            ExprPiece::OutputRef { owner, ordinal } => Some((*owner, *ordinal)),
            _ => None,
        })
    }
}

#[derive(Debug, Default)]
pub struct ExprBuilder {
    expr: ResolvedExpr,
}

impl ExprBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&mut self, text: &str) -> &mut Self {
        if let Some(ExprPiece::Text(last)) = self.expr.pieces.last_mut() {
            last.push_str(text);
        } else if !text.is_empty() {
            self.expr.pieces.push(ExprPiece::Text(text.to_string()));
        }
        self
    }

    pub fn column(&mut self, alias: AliasId, column: &str) -> &mut Self {
        self.expr.deps.insert(alias);
        self.expr.pieces.push(ExprPiece::Column {
            alias,
            column: column.to_string(),
        });
        self
    }

    pub fn output_ref(&mut self, owner: AliasId, ordinal: usize) -> &mut Self {
        self.expr.deps.insert(owner);
        self.expr
            .pieces
            .push(ExprPiece::OutputRef { owner, ordinal });
        self
    }

    pub fn placeholder(&mut self, ordinal: usize) -> &mut Self {
        self.expr.pieces.push(ExprPiece::Placeholder(ordinal));
        self
    }

    pub fn subquery(&mut self, subquery: Subquery) -> &mut Self {
        self.expr.deps.extend(subquery.outer_references());
        self.expr
            .pieces
            .push(ExprPiece::Subquery(Box::new(subquery)));
        self
    }

    pub fn discriminator(&mut self, alias: AliasId, discriminator: &Discriminator) -> &mut Self {
        self.expr.deps.insert(alias);
        self.expr.pieces.push(ExprPiece::Discriminator {
            alias,
            column: discriminator.column.clone(),
            value: discriminator.value.clone(),
        });
        self
    }

    pub fn mark_aggregate(&mut self) -> &mut Self {
        self.expr.aggregate = true;
        self
    }

    pub fn build(self) -> ResolvedExpr {
        self.expr
    }
}

/// How bare identifiers (no `alias.` prefix) are treated.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct BarePolicy<'b> {
    /// Select-list aliases, e.g. `count` in `COUNT(u.id) count`.
    pub outputs: Option<&'b HashMap<String, (AliasId, usize)>>,
    /// Component whose fields a bare identifier may name.
    pub default_alias: Option<AliasId>,
}

/// Context for resolving a join condition.
pub(crate) struct JoinScope<'b> {
    pub join: &'b str,
    /// Every user alias of the FROM clause, joined or not yet.
    pub declared: &'b HashSet<String>,
}

impl Analyzer<'_> {
    /// Resolves the DQL expression `text` into pieces. `first_param` is the
    /// ordinal of the first `?` inside `text`.
    pub(crate) fn resolve_expr(
        &mut self,
        text: &str,
        first_param: usize,
        clause: ClauseKind,
        bare: &BarePolicy<'_>,
        join: Option<&JoinScope<'_>>,
    ) -> Result<ResolvedExpr, QueryError> {
        let scanner = self.config.scanner();
        scanner.validate(text).map_err(|e| QueryError::tokenize(clause, e))?;

        let bytes = text.as_bytes();
        let mut out = ExprBuilder::new();
        let mut param = first_param;
        let mut i = 0;

        while i < bytes.len() {
            let b = bytes[i];
            if b == b'\'' || b == b'"' {
                let end = scanner.literal_end(text, i);
                out.text(&text[i..end]);
                i = end;
            } else if b == b'?' {
                out.placeholder(param);
                param += 1;
                i += 1;
            } else if b == b'(' {
                let rest = text[i + 1..].trim_start();
                if starts_with_keyword(rest, "SELECT") {
                    let close = scanner.closing_paren(text, i).map_err(|e| QueryError::tokenize(clause, e))?;
                    let inner = &text[i + 1..close];
                    let subquery = self.analyze_subquery(inner, param, clause)?;
                    param += scanner.count_placeholders(inner).map_err(|e| QueryError::tokenize(clause, e))?;
                    out.text("(").subquery(subquery).text(")");
                    i = close + 1;
                } else {
                    out.text("(");
                    i += 1;
                }
            } else if b == b':' && bytes.get(i + 1) == Some(&b':') {
                // `::type` cast, passed through with its type name
                let start = i;
                i = scan_reference(bytes, i + 2);
                out.text(&text[start..i]);
            } else if b == b':' && bytes.get(i + 1).is_some_and(|c| is_ident_start(*c)) {
                let end = scan_reference(bytes, i + 1);
                return Err(QueryError::syntax(
                    clause,
                    format!(
                        "named parameter `{}` is not supported, use positional `?`",
                        &text[i..end]
                    ),
                ));
            } else if is_ident_start(b) {
                let start = i;
                i = scan_reference(bytes, i);
                let word = &text[start..i];
                let calls = text[i..].trim_start().starts_with('(');
                if calls && !word.contains('.') {
                    if is_aggregate_function(word) {
                        out.mark_aggregate();
                    }
                    out.text(word);
                } else if word.contains('.') {
                    self.resolve_reference(word, clause, join, &mut out)?;
                } else {
                    self.resolve_bare(word, bare, &mut out);
                }
            } else if b.is_ascii_digit() {
                let start = i;
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'.' || bytes[i] == b'_') {
                    i += 1;
                }
                out.text(&text[start..i]);
            } else {
                let width = text[i..].chars().next().map(char::len_utf8).unwrap_or(1);
                out.text(&text[i..i + width]);
                i += width;
            }
        }

        Ok(out.build())
    }

    fn resolve_reference(
        &self,
        word: &str,
        clause: ClauseKind,
        join: Option<&JoinScope<'_>>,
        out: &mut ExprBuilder,
    ) -> Result<(), QueryError> {
        let (alias, field) = word.split_once('.').unwrap_or((word, ""));
        let id = match self.resolver.lookup(alias) {
            Some(id) => id,
            None => {
                return Err(match join {
                    Some(scope) if scope.declared.contains(alias) => QueryError::AmbiguousJoin {
                        clause,
                        join: scope.join.to_string(),
                        alias: alias.to_string(),
                    },
                    _ => QueryError::UnknownAlias {
                        clause,
                        alias: alias.to_string(),
                    },
                })
            }
        };
        let unknown_field = || QueryError::UnknownField {
            clause,
            alias: alias.to_string(),
            field: field.to_string(),
        };
        if field.contains('.') {
            return Err(unknown_field());
        }
        let component = self.components.get(&id).ok_or_else(|| QueryError::UnknownAlias {
            clause,
            alias: alias.to_string(),
        })?;
        let column = component.column(field).ok_or_else(unknown_field)?;
        out.column(id, &column.name);
        Ok(())
    }

    fn resolve_bare(&self, word: &str, bare: &BarePolicy<'_>, out: &mut ExprBuilder) {
        if is_reserved_word(word) {
            out.text(word);
            return;
        }
        if let Some(&(owner, ordinal)) = bare.outputs.and_then(|outputs| outputs.get(word)) {
            out.output_ref(owner, ordinal);
            return;
        }
        let column = bare
            .default_alias
            .and_then(|alias| self.components.get(&alias).map(|c| (alias, c)))
            .and_then(|(alias, component)| component.column(word).map(|c| (alias, c.name.clone())));
        match column {
            Some((alias, name)) => {
                out.column(alias, &name);
            }
            None => {
                out.text(word);
            }
        }
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

/// End of the identifier or dotted reference starting at `start`.
fn scan_reference(bytes: &[u8], start: usize) -> usize {
    let mut i = start;
    while i < bytes.len() {
        let b = bytes[i];
        if b.is_ascii_alphanumeric() || b == b'_' {
            i += 1;
        } else if b == b'.' && bytes.get(i + 1).is_some_and(|c| is_ident_start(*c)) {
            i += 1;
        } else {
            break;
        }
    }
    i
}
