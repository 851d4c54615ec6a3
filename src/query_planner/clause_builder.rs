//! Resolution of the SELECT, WHERE, GROUP BY, HAVING and ORDER BY clauses,
//! plus the completions applied to a top-level select list.

use std::collections::{BTreeSet, HashMap};

use super::alias_resolver::AliasId;
use super::analyzer::Analyzer;
use super::clause_set::{ClauseSet, OrderTerm, SelectItem};
use super::errors::QueryError;
use super::expression::{is_reserved_word, BarePolicy};
use super::join_graph::{JoinGraph, NodeRole};
use crate::dql_parser::ast::{ClauseKind, DqlQuery, Segment};
use crate::dql_parser::common::{is_identifier, keyword_eq, parse_path};
use crate::dql_parser::errors::TokenizeError;
use crate::dql_parser::tokenizer::Scanner;
use crate::schema_catalog::RelationKind;

const DIRECTION_WORDS: [&str; 5] = ["ASC", "DESC", "NULLS", "FIRST", "LAST"];

/// Comma-separated items of a clause with the ordinal of each item's first `?`.
fn segment_items<'s>(
    segment: &'s Segment,
    clause: ClauseKind,
    param_base: usize,
    scanner: Scanner,
) -> Result<Vec<(&'s str, usize)>, QueryError> {
    let text = segment.text.as_str();
    let spans = scanner.split_top_level_spans(text, ",").map_err(|e| QueryError::tokenize(clause, e))?;
    let mut items = Vec::with_capacity(spans.len());
    for span in spans {
        let span = span.trimmed(text);
        if span.is_empty() {
            return Err(QueryError::syntax(clause, "empty list item"));
        }
        let before = scanner.count_placeholders(&text[..span.start]).map_err(|e| QueryError::tokenize(clause, e))?;
        items.push((span.slice(text), param_base + segment.first_param + before));
    }
    Ok(items)
}

/// Splits `u.name DESC NULLS LAST` into the expression and its direction.
fn split_direction(item: &str, scanner: Scanner) -> Result<(&str, Option<String>), TokenizeError> {
    let words = scanner.top_level_words(item)?;
    let mut first_direction = words.len();
    while first_direction > 1 {
        let word = words[first_direction - 1].slice(item);
        if DIRECTION_WORDS.iter().any(|kw| keyword_eq(word, kw)) {
            first_direction -= 1;
        } else {
            break;
        }
    }
    if first_direction == words.len() {
        return Ok((item, None));
    }
    let expr = item[..words[first_direction].start].trim();
    let direction = words[first_direction..]
        .iter()
        .map(|span| span.slice(item).to_ascii_uppercase())
        .collect::<Vec<_>>()
        .join(" ");
    Ok((expr, Some(direction)))
}

fn ends_with_operator(word: &str) -> bool {
    word.ends_with(['=', '<', '>', '+', '-', '*', '/', '|', '%', ',']) || is_reserved_word(word)
}

/// Splits `COUNT(u.id) AS total` or `COUNT(u.id) total` into expression and alias.
fn split_select_alias(item: &str, scanner: Scanner) -> Result<(&str, Option<&str>), TokenizeError> {
    let words = scanner.top_level_words(item)?;
    let n = words.len();
    if n >= 3 {
        let last = words[n - 1].slice(item);
        if keyword_eq(words[n - 2].slice(item), "AS") && is_identifier(last) {
            return Ok((item[..words[n - 2].start].trim(), Some(last)));
        }
    }
    if n >= 2 {
        let last = words[n - 1].slice(item);
        let previous = words[n - 2].slice(item);
        if is_identifier(last) && !is_reserved_word(last) && !ends_with_operator(previous) {
            return Ok((item[..words[n - 1].start].trim(), Some(last)));
        }
    }
    Ok((item, None))
}

impl Analyzer<'_> {
    pub(super) fn build_clauses(
        &mut self,
        ast: &DqlQuery,
        graph: &JoinGraph,
        param_base: usize,
    ) -> Result<ClauseSet, QueryError> {
        let root = graph.root_id();
        let scanner = self.config.scanner();
        let mut clauses = ClauseSet {
            distinct: ast.distinct,
            limit: ast.limit,
            offset: ast.offset,
            ..ClauseSet::default()
        };

        match &ast.select {
            Some(segment) => {
                let mut ordinal = 0;
                for (item, first_param) in segment_items(segment, ClauseKind::Select, param_base, scanner)? {
                    self.select_item(graph, item, first_param, &mut ordinal, &mut clauses.select)?;
                }
            }
            None => {
                for node in graph.nodes().iter().filter(|node| node.role != NodeRole::Bridge) {
                    for column in &node.component.columns {
                        clauses.select.push(SelectItem::field(node.alias, column));
                    }
                }
            }
        }

        let outputs = clauses.output_names();
        let resolving = BarePolicy {
            outputs: Some(&outputs),
            default_alias: Some(root),
        };

        if let Some(segment) = &ast.where_clause {
            clauses.where_clause = Some(self.resolve_expr(
                &segment.text,
                param_base + segment.first_param,
                ClauseKind::Where,
                &BarePolicy::default(),
                None,
            )?);
        }

        if let Some(segment) = &ast.group_by {
            for (item, first_param) in segment_items(segment, ClauseKind::GroupBy, param_base, scanner)? {
                let expr = self.resolve_expr(item, first_param, ClauseKind::GroupBy, &resolving, None)?;
                clauses.group_by.push(expr);
            }
        }

        if let Some(segment) = &ast.having {
            clauses.having = Some(self.resolve_expr(
                &segment.text,
                param_base + segment.first_param,
                ClauseKind::Having,
                &resolving,
                None,
            )?);
        }

        if let Some(segment) = &ast.order_by {
            for (item, first_param) in segment_items(segment, ClauseKind::OrderBy, param_base, scanner)? {
                let (expr_text, direction) =
                    split_direction(item, scanner).map_err(|e| QueryError::tokenize(ClauseKind::OrderBy, e))?;
                let expr = self.resolve_expr(expr_text, first_param, ClauseKind::OrderBy, &resolving, None)?;
                clauses.order_by.push(OrderTerm {
                    expr,
                    direction,
                    implicit: false,
                });
            }
        }

        Ok(clauses)
    }

    fn select_item(
        &mut self,
        graph: &JoinGraph,
        item: &str,
        first_param: usize,
        ordinal: &mut usize,
        select: &mut Vec<SelectItem>,
    ) -> Result<(), QueryError> {
        let clause = ClauseKind::Select;
        let (expr_text, name) = split_select_alias(item, self.config.scanner()).map_err(|e| QueryError::tokenize(clause, e))?;

        if name.is_none() {
            if let Some(prefix) = expr_text.strip_suffix(".*") {
                let id = self.lookup_alias(prefix, clause)?;
                let component = self.component_of(id, prefix, clause)?;
                select.extend(component.columns.iter().map(|column| SelectItem::field(id, column)));
                return Ok(());
            }
            match parse_path(expr_text).as_deref() {
                Some([alias, field]) => {
                    let id = self.lookup_alias(alias, clause)?;
                    let component = self.component_of(id, alias, clause)?;
                    let column = component.column(field).ok_or_else(|| QueryError::UnknownField {
                        clause,
                        alias: alias.to_string(),
                        field: field.to_string(),
                    })?;
                    select.push(SelectItem::field(id, column));
                    return Ok(());
                }
                Some([field]) => {
                    if let Some(column) = graph.root().component.column(field) {
                        select.push(SelectItem::field(graph.root_id(), column));
                        return Ok(());
                    }
                }
                _ => {}
            }
        }

        let expr = self.resolve_expr(expr_text, first_param, clause, &BarePolicy::default(), None)?;
        let owner = expr
            .deps
            .iter()
            .copied()
            .find(|id| graph.contains(*id))
            .unwrap_or_else(|| graph.root_id());
        select.push(SelectItem::Expression {
            owner,
            ordinal: *ordinal,
            expr,
            name: name.map(str::to_string),
        });
        *ordinal += 1;
        Ok(())
    }

    /// Appends the schema's default orderings after the explicit ones: each
    /// emitted join in order (bridge ordering first for many-to-many), then the
    /// root component's.
    pub(super) fn append_default_ordering(
        &mut self,
        graph: &JoinGraph,
        emitted: &[AliasId],
        clauses: &mut ClauseSet,
    ) -> Result<(), QueryError> {
        let mut defaults: Vec<(AliasId, String)> = Vec::new();
        for id in emitted {
            let Some(node) = graph.node(*id) else { continue };
            if node.role != NodeRole::Target {
                continue;
            }
            let Some(relation) = &node.relation else { continue };
            if relation.kind == RelationKind::ManyToMany {
                if let Some(bridge) = node.parent.and_then(|parent| graph.node(parent)) {
                    if let Some(order) = relation.ref_order_by.as_ref().or(bridge.component.order_by.as_ref()) {
                        defaults.push((bridge.alias, order.clone()));
                    }
                }
            }
            if let Some(order) = relation.order_by.as_ref().or(node.component.order_by.as_ref()) {
                defaults.push((node.alias, order.clone()));
            }
        }
        let root = graph.root();
        if let Some(order) = &root.component.order_by {
            defaults.push((root.alias, order.clone()));
        }

        let scanner = self.config.scanner();
        for (alias, order) in defaults {
            let segment = Segment {
                text: order,
                first_param: 0,
            };
            let policy = BarePolicy {
                outputs: None,
                default_alias: Some(alias),
            };
            for (item, _) in segment_items(&segment, ClauseKind::OrderBy, 0, scanner)? {
                let placeholders = scanner
                    .count_placeholders(item)
                    .map_err(|e| QueryError::tokenize(ClauseKind::OrderBy, e))?;
                if placeholders > 0 {
                    return Err(QueryError::syntax(
                        ClauseKind::OrderBy,
                        format!("default ordering `{}` cannot bind parameters", segment.text),
                    ));
                }
                let (expr_text, direction) =
                    split_direction(item, scanner).map_err(|e| QueryError::tokenize(ClauseKind::OrderBy, e))?;
                let expr = self.resolve_expr(expr_text, 0, ClauseKind::OrderBy, &policy, None)?;
                if clauses.order_by.iter().any(|term| term.expr == expr) {
                    continue;
                }
                clauses.order_by.push(OrderTerm {
                    expr,
                    direction,
                    implicit: true,
                });
            }
        }
        Ok(())
    }

    /// Completes a top-level select list and puts it in canonical order.
    ///
    /// Outside aggregate and grouped queries every hydrated alias and its
    /// ancestors get their primary key selected. Primary keys named in GROUP BY
    /// and INDEXBY columns of hydrated aliases are selected too. Fields are then grouped
    /// per alias in join order, primary keys first, followed by expressions.
    pub(super) fn complete_selection(&self, graph: &JoinGraph, emitted: &[AliasId], clauses: &mut ClauseSet) {
        let mut additions: Vec<SelectItem> = Vec::new();
        let add = |clauses: &ClauseSet, additions: &mut Vec<SelectItem>, alias: AliasId, column: &str| {
            let Some(node) = graph.node(alias) else { return };
            let Some(def) = node.component.column(column) else { return };
            let pending = additions.iter().any(|item| {
                matches!(item, SelectItem::Field { alias: a, column: c, .. } if *a == alias && *c == def.name)
            });
            if !pending && !clauses.is_selected(alias, &def.name) {
                additions.push(SelectItem::implicit_field(alias, def));
            }
        };

        for expr in &clauses.group_by {
            if let Some((alias, column)) = expr.as_column() {
                let is_pk = graph
                    .node(alias)
                    .is_some_and(|node| node.component.is_primary_key(column));
                if is_pk {
                    add(&*clauses, &mut additions, alias, column);
                }
            }
        }

        let mut hydrated: BTreeSet<AliasId> = clauses.select.iter().map(SelectItem::alias).collect();
        if !clauses.has_aggregates() && clauses.group_by.is_empty() {
            for alias in hydrated.clone() {
                hydrated.extend(graph.logical_ancestors(alias));
            }
            for alias in &hydrated {
                if let Some(node) = graph.node(*alias) {
                    for pk in node.component.primary_keys() {
                        add(&*clauses, &mut additions, *alias, &pk.name);
                    }
                }
            }
        }

        for node in graph.nodes() {
            if let Some(column) = &node.index_by {
                if hydrated.contains(&node.alias) {
                    add(&*clauses, &mut additions, node.alias, column);
                }
            }
        }

        clauses.select.extend(additions);

        let position: HashMap<AliasId, usize> = emitted
            .iter()
            .enumerate()
            .map(|(index, alias)| (*alias, index))
            .collect();
        let (mut fields, expressions): (Vec<SelectItem>, Vec<SelectItem>) = std::mem::take(&mut clauses.select)
            .into_iter()
            .partition(|item| matches!(item, SelectItem::Field { .. }));
        fields.sort_by_key(|item| {
            let alias = item.alias();
            let is_pk = match item {
                SelectItem::Field { column, .. } => graph
                    .node(alias)
                    .is_some_and(|node| node.component.is_primary_key(column)),
                SelectItem::Expression { .. } => false,
            };
            (position.get(&alias).copied().unwrap_or(usize::MAX), !is_pk)
        });
        fields.extend(expressions);
        clauses.select = fields;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STANDARD: Scanner = Scanner::new(false);

    #[test]
    fn test_split_direction() {
        assert_eq!(split_direction("u.name DESC", STANDARD).unwrap(), ("u.name", Some("DESC".to_string())));
        assert_eq!(
            split_direction("COUNT(p.id) asc nulls last", STANDARD).unwrap(),
            ("COUNT(p.id)", Some("ASC NULLS LAST".to_string()))
        );
        assert_eq!(split_direction("u.name", STANDARD).unwrap(), ("u.name", None));
    }

    #[test]
    fn test_split_select_alias() {
        assert_eq!(split_select_alias("COUNT(u.id) count", STANDARD).unwrap(), ("COUNT(u.id)", Some("count")));
        assert_eq!(split_select_alias("COUNT(u.id) AS total", STANDARD).unwrap(), ("COUNT(u.id)", Some("total")));
        assert_eq!(split_select_alias("u.id + 1", STANDARD).unwrap(), ("u.id + 1", None));
        assert_eq!(split_select_alias("u.name", STANDARD).unwrap(), ("u.name", None));
        assert_eq!(
            split_select_alias("CASE WHEN u.id > 1 THEN 1 ELSE 0 END", STANDARD).unwrap(),
            ("CASE WHEN u.id > 1 THEN 1 ELSE 0 END", None)
        );
        assert_eq!(split_select_alias("u.id = u.name", STANDARD).unwrap(), ("u.id = u.name", None));
    }

    #[test]
    fn test_segment_items_track_placeholders() {
        let segment = Segment {
            text: "COALESCE(?, u.name), u.id, ?".to_string(),
            first_param: 2,
        };
        let items = segment_items(&segment, ClauseKind::Select, 10, STANDARD).unwrap();
        assert_eq!(
            items,
            vec![("COALESCE(?, u.name)", 12), ("u.id", 13), ("?", 13)]
        );
    }

    #[test]
    fn test_segment_items_reject_empty() {
        let segment = Segment {
            text: "u.id,,u.name".to_string(),
            first_param: 0,
        };
        assert!(segment_items(&segment, ClauseKind::GroupBy, 0, STANDARD).is_err());
    }
}
