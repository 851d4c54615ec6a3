//! Semantic analysis of a parsed query: alias binding, FROM-clause join
//! planning and subquery handling. Clause resolution lives in
//! [`clause_builder`](super::clause_builder).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::alias_resolver::{AliasId, AliasResolver};
use super::clause_set::{ClauseSet, SelectItem, Subquery};
use super::errors::QueryError;
use super::expression::{BarePolicy, JoinScope};
use super::join_graph::{JoinGraph, JoinNode, JoinType};
use super::join_planner;
use super::query_plan::QueryPlan;
use crate::config::CompilerConfig;
use crate::dql_parser::ast::{ClauseKind, DqlQuery, FromElement, JoinKind};
use crate::dql_parser::common::parse_path;
use crate::dql_parser::parse_query_with;
use crate::schema_catalog::{ComponentMetadata, SchemaMetadataProvider};

pub(crate) struct Analyzer<'a> {
    pub(super) provider: &'a dyn SchemaMetadataProvider,
    pub(super) config: &'a CompilerConfig,
    pub(super) resolver: AliasResolver,
    pub(super) components: HashMap<AliasId, Arc<ComponentMetadata>>,
    depth: u32,
}

impl<'a> Analyzer<'a> {
    pub(crate) fn new(provider: &'a dyn SchemaMetadataProvider, config: &'a CompilerConfig) -> Self {
        Analyzer {
            provider,
            config,
            resolver: AliasResolver::new(),
            components: HashMap::new(),
            depth: 0,
        }
    }

    fn describe(&self, component: &str, clause: ClauseKind) -> Result<Arc<ComponentMetadata>, QueryError> {
        self.provider
            .describe(component)
            .map_err(|e| QueryError::schema(clause, e))
    }

    /// Binds `user_alias` in the current scope to a fresh occurrence of `component`.
    pub(super) fn bind_component(&mut self, user_alias: &str, component: &str) -> Result<AliasId, QueryError> {
        let metadata = self.describe(component, ClauseKind::From)?;
        let id = self.resolver.bind(user_alias, &metadata.table_name);
        self.components.insert(id, metadata);
        Ok(id)
    }

    pub(super) fn component_of(&self, id: AliasId, alias: &str, clause: ClauseKind) -> Result<Arc<ComponentMetadata>, QueryError> {
        self.components
            .get(&id)
            .cloned()
            .ok_or_else(|| QueryError::UnknownAlias {
                clause,
                alias: alias.to_string(),
            })
    }

    pub(super) fn lookup_alias(&self, alias: &str, clause: ClauseKind) -> Result<AliasId, QueryError> {
        self.resolver
            .lookup(alias)
            .ok_or_else(|| QueryError::UnknownAlias {
                clause,
                alias: alias.to_string(),
            })
    }

    /// Join graph and clauses of one (sub)query. Placeholder ordinals inside
    /// are offset by `param_base`.
    pub(super) fn analyze(&mut self, ast: &DqlQuery, param_base: usize) -> Result<(JoinGraph, ClauseSet), QueryError> {
        let declared: HashSet<String> = ast
            .from
            .iter()
            .map(|element| element.effective_alias().to_string())
            .collect();
        let graph = self.plan_from(&ast.from, param_base, &declared)?;
        let clauses = self.build_clauses(ast, &graph, param_base)?;
        Ok((graph, clauses))
    }

    pub(super) fn analyze_subquery(&mut self, text: &str, param_base: usize, clause: ClauseKind) -> Result<Subquery, QueryError> {
        if self.depth >= self.config.max_subquery_depth {
            return Err(QueryError::syntax(
                clause,
                format!(
                    "subqueries nested deeper than {} level(s)",
                    self.config.max_subquery_depth
                ),
            ));
        }
        let ast = parse_query_with(text, self.config.scanner())?;

        self.depth += 1;
        self.resolver.push_scope();
        let analyzed = self.analyze(&ast, param_base);
        self.resolver.pop_scope();
        self.depth -= 1;

        let (graph, mut clauses) = analyzed?;
        if ast.select.is_none() {
            // a subquery without SELECT yields its root identifier
            clauses.select = graph
                .root()
                .component
                .primary_keys()
                .map(|column| SelectItem::field(graph.root_id(), column))
                .collect();
        }
        self.assign_outputs(&mut clauses);
        let keep = graph.aliases().collect();
        let emitted = graph.emission_order(&keep);
        Ok(Subquery {
            graph,
            clauses,
            emitted,
        })
    }

    fn plan_from(&mut self, from: &[FromElement], param_base: usize, declared: &HashSet<String>) -> Result<JoinGraph, QueryError> {
        let Some(root_element) = from.first() else {
            return Err(QueryError::syntax(ClauseKind::From, "query has no FROM clause"));
        };
        let component_name = root_element.path.first().map(String::as_str).unwrap_or_default();
        let user_alias = root_element.effective_alias().to_string();
        let root = self.bind_component(&user_alias, component_name)?;
        let component = self.component_of(root, &user_alias, ClauseKind::From)?;
        let mut graph = JoinGraph::new(JoinNode::root(root, user_alias.clone(), component));

        if let Some(index_by) = &root_element.index_by {
            let column = self.index_column(root, &user_alias, index_by)?;
            graph.set_index_by(root, column);
        }

        for element in &from[1..] {
            self.plan_join(&mut graph, element, param_base, declared)?;
        }
        Ok(graph)
    }

    fn plan_join(
        &mut self,
        graph: &mut JoinGraph,
        element: &FromElement,
        param_base: usize,
        declared: &HashSet<String>,
    ) -> Result<(), QueryError> {
        let clause = ClauseKind::Join;
        let join_type = match element.join {
            Some(JoinKind::Inner) => JoinType::Inner,
            _ => JoinType::Left,
        };
        let join_name = element.path.join(".");
        let head = element.path.first().map(String::as_str).unwrap_or_default();

        let mut current = match self.resolver.lookup(head) {
            Some(id) if graph.contains(id) => id,
            _ if declared.contains(head) => {
                return Err(QueryError::AmbiguousJoin {
                    clause,
                    join: join_name,
                    alias: head.to_string(),
                })
            }
            _ => {
                return Err(QueryError::UnknownAlias {
                    clause,
                    alias: head.to_string(),
                })
            }
        };

        let user_alias = element.effective_alias().to_string();
        if self.resolver.lookup_local(&user_alias).is_some() {
            return Err(QueryError::syntax(
                clause,
                format!("alias `{}` is defined more than once", user_alias),
            ));
        }

        let hops = &element.path[1..];
        for (n, relation_name) in hops.iter().enumerate() {
            let last = n + 1 == hops.len();
            let key = if last {
                user_alias.clone()
            } else {
                element.path[..n + 2].join(".")
            };
            if !last {
                if let Some(existing) = self.resolver.lookup_local(&key) {
                    current = existing;
                    continue;
                }
            }

            let source = self.component_of(current, head, clause)?;
            let relation = source
                .relation(relation_name)
                .cloned()
                .ok_or_else(|| QueryError::UnknownRelation {
                    clause,
                    component: source.name.clone(),
                    relation: relation_name.clone(),
                })?;
            let expanded = join_planner::expand_relation(
                self.provider,
                &mut self.resolver,
                graph,
                current,
                &relation,
                join_type,
                &key,
            )?;
            for id in expanded.added() {
                if let Some(node) = graph.node(id) {
                    self.components.insert(id, node.component.clone());
                }
            }
            current = expanded.target;
        }

        if let Some(condition) = &element.condition {
            let scope = JoinScope {
                join: &join_name,
                declared,
            };
            let expr = self.resolve_expr(
                &condition.segment.text,
                param_base + condition.segment.first_param,
                clause,
                &BarePolicy::default(),
                Some(&scope),
            )?;
            graph.attach_condition(current, condition.kind, expr);
        }

        if let Some(index_by) = &element.index_by {
            let column = self.index_column(current, &user_alias, index_by)?;
            graph.set_index_by(current, column);
        }
        Ok(())
    }

    fn index_column(&self, id: AliasId, user_alias: &str, text: &str) -> Result<String, QueryError> {
        let clause = ClauseKind::IndexBy;
        let path = parse_path(text)
            .ok_or_else(|| QueryError::syntax(clause, format!("invalid INDEXBY column `{}`", text)))?;
        let column = match path.as_slice() {
            [column] => *column,
            [alias, column] => {
                if self.resolver.lookup(alias) != Some(id) {
                    return Err(QueryError::UnknownAlias {
                        clause,
                        alias: alias.to_string(),
                    });
                }
                *column
            }
            _ => {
                return Err(QueryError::syntax(
                    clause,
                    format!("invalid INDEXBY column `{}`", text),
                ))
            }
        };
        let component = self.component_of(id, user_alias, clause)?;
        component
            .column(column)
            .map(|c| c.name.clone())
            .ok_or_else(|| QueryError::UnknownColumn {
                clause,
                alias: user_alias.to_string(),
                column: column.to_string(),
            })
    }

    /// Fills in `<sqlAlias>__<column>` output names. A field selected more
    /// than once gets `__2`, `__3`, ... on its later occurrences.
    pub(super) fn assign_outputs(&self, clauses: &mut ClauseSet) {
        let mut seen: HashMap<String, usize> = HashMap::new();
        for item in &mut clauses.select {
            if let SelectItem::Field {
                alias,
                column,
                output,
                ..
            } = item
            {
                let base = format!("{}__{}", self.resolver.name(*alias), column);
                let count = seen.entry(base.clone()).or_insert(0);
                *count += 1;
                *output = if *count == 1 {
                    base
                } else {
                    format!("{}__{}", base, count)
                };
            }
        }
    }
}

/// Builds the complete plan of a top-level query.
pub fn plan_query(
    provider: &dyn SchemaMetadataProvider,
    config: &CompilerConfig,
    ast: &DqlQuery,
) -> Result<QueryPlan, QueryError> {
    let mut analyzer = Analyzer::new(provider, config);
    let (graph, mut clauses) = analyzer.analyze(ast, 0)?;

    let keep: HashSet<AliasId> = if config.prune_unreferenced_joins {
        graph.retained(&clauses.referenced_aliases())
    } else {
        graph.aliases().collect()
    };
    let emitted = graph.emission_order(&keep);
    if emitted.len() < graph.len() {
        log::debug!(
            "Pruned {} unreferenced join(s)",
            graph.len() - emitted.len()
        );
    }

    analyzer.append_default_ordering(&graph, &emitted, &mut clauses)?;
    analyzer.complete_selection(&graph, &emitted, &mut clauses);
    analyzer.assign_outputs(&mut clauses);

    let fan_out = emitted
        .iter()
        .filter_map(|id| graph.node(*id))
        .any(JoinNode::is_fan_out);
    let shadow_aliases = if fan_out && (clauses.limit.is_some() || clauses.offset.is_some()) {
        Some(analyzer.resolver.shadow(&emitted))
    } else {
        None
    };

    Ok(QueryPlan {
        aliases: analyzer.resolver.names(),
        shadow_aliases,
        graph,
        clauses,
        emitted,
        placeholders: ast.placeholders,
    })
}
