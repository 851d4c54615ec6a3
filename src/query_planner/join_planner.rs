//! Expansion of relation hops into physical joins.
//!
//! One-to-one and one-to-many hops become a single join. Many-to-many hops
//! become two: the bridge table, then the target. The predicates produced here
//! are the structural ones; user ON/WITH conditions are attached afterwards.

use std::collections::BTreeSet;
use std::sync::Arc;

use super::alias_resolver::{AliasId, AliasResolver};
use super::errors::QueryError;
use super::expression::{ExprBuilder, ResolvedExpr};
use super::join_graph::{JoinGraph, JoinNode, JoinType, NodeRole};
use crate::dql_parser::ast::ClauseKind;
use crate::schema_catalog::{ComponentMetadata, Relation, RelationKind, SchemaMetadataProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ExpandedJoin {
    pub target: AliasId,
    pub bridge: Option<AliasId>,
}

impl ExpandedJoin {
    pub fn added(&self) -> impl Iterator<Item = AliasId> {
        self.bridge.into_iter().chain(std::iter::once(self.target))
    }
}

pub(crate) fn expand_relation(
    provider: &dyn SchemaMetadataProvider,
    resolver: &mut AliasResolver,
    graph: &mut JoinGraph,
    source: AliasId,
    relation: &Relation,
    join_type: JoinType,
    user_alias: &str,
) -> Result<ExpandedJoin, QueryError> {
    let clause = ClauseKind::Join;
    let source_component = graph
        .node(source)
        .map(|node| node.component.clone())
        .ok_or_else(|| QueryError::UnknownAlias {
            clause,
            alias: resolver.name(source).to_string(),
        })?;
    let target_component = provider
        .describe(&relation.target)
        .map_err(|e| QueryError::schema(clause, e))?;
    let self_referential = source_component.is_self_referential(relation);

    let mut extra_predicates = Vec::new();
    let expansion = match relation.kind {
        RelationKind::OneToOne | RelationKind::OneToMany => {
            let target = resolver.bind(user_alias, &target_component.table_name);

            let mut on = ExprBuilder::new();
            if self_referential && relation.kind == RelationKind::OneToMany && !relation.directed {
                on.text("(")
                    .column(source, &relation.local)
                    .text(" = ")
                    .column(target, &relation.foreign)
                    .text(" OR ")
                    .column(source, &relation.foreign)
                    .text(" = ")
                    .column(target, &relation.local)
                    .text(")");
            } else {
                on.column(source, &relation.local)
                    .text(" = ")
                    .column(target, &relation.foreign);
            }

            if self_referential {
                extra_predicates.push(exclusion(target, source, &target_component));
            }
            if let Some(discriminator) = &target_component.inheritance {
                extra_predicates.push(ResolvedExpr::discriminator(target, discriminator));
            }

            graph.add(JoinNode {
                alias: target,
                user_alias: Some(user_alias.to_string()),
                component: target_component,
                role: NodeRole::Target,
                parent: Some(source),
                source: Some(source),
                relation: Some(relation.clone()),
                join_type,
                structural: Some(on.build()),
                condition: None,
                extra_predicates,
                depends_on: BTreeSet::new(),
                index_by: None,
            });
            ExpandedJoin {
                target,
                bridge: None,
            }
        }
        RelationKind::ManyToMany => {
            let bridge_name = relation.bridge.as_deref().ok_or_else(|| QueryError::Metadata {
                clause,
                message: format!("many-to-many relation `{}` has no bridge component", relation.name),
            })?;
            let bridge_component = provider
                .describe(bridge_name)
                .map_err(|e| QueryError::schema(clause, e))?;
            let source_pk = identifier(&source_component, clause)?;
            let target_pk = identifier(&target_component, clause)?;

            let target = resolver.bind(user_alias, &target_component.table_name);
            let bridge = resolver.assign(&bridge_component.table_name);
            let symmetric = self_referential && !relation.directed;

            let mut bridge_on = ExprBuilder::new();
            bridge_on
                .text("(")
                .column(source, &source_pk)
                .text(" = ")
                .column(bridge, &relation.local);
            if symmetric {
                bridge_on
                    .text(" OR ")
                    .column(source, &source_pk)
                    .text(" = ")
                    .column(bridge, &relation.foreign);
            }
            bridge_on.text(")");

            let mut target_on = ExprBuilder::new();
            if symmetric {
                target_on
                    .text("(")
                    .column(target, &target_pk)
                    .text(" = ")
                    .column(bridge, &relation.foreign)
                    .text(" OR ")
                    .column(target, &target_pk)
                    .text(" = ")
                    .column(bridge, &relation.local)
                    .text(")");
            } else {
                target_on
                    .column(target, &target_pk)
                    .text(" = ")
                    .column(bridge, &relation.foreign);
            }

            if self_referential {
                extra_predicates.push(exclusion(target, source, &target_component));
            }
            if let Some(discriminator) = &target_component.inheritance {
                extra_predicates.push(ResolvedExpr::discriminator(target, discriminator));
            }

            graph.add(JoinNode {
                alias: bridge,
                user_alias: None,
                component: bridge_component,
                role: NodeRole::Bridge,
                parent: Some(source),
                source: Some(source),
                relation: Some(relation.clone()),
                join_type,
                structural: Some(bridge_on.build()),
                condition: None,
                extra_predicates: Vec::new(),
                depends_on: BTreeSet::new(),
                index_by: None,
            });
            graph.add(JoinNode {
                alias: target,
                user_alias: Some(user_alias.to_string()),
                component: target_component,
                role: NodeRole::Target,
                parent: Some(bridge),
                source: Some(source),
                relation: Some(relation.clone()),
                join_type,
                structural: Some(target_on.build()),
                condition: None,
                extra_predicates,
                depends_on: BTreeSet::new(),
                index_by: None,
            });
            ExpandedJoin {
                target,
                bridge: Some(bridge),
            }
        }
    };

    log::trace!(
        "Expanded relation {}.{} ({:?}) into {:?}",
        source_component.name,
        relation.name,
        relation.kind,
        expansion
    );
    Ok(expansion)
}

fn identifier(component: &Arc<ComponentMetadata>, clause: ClauseKind) -> Result<String, QueryError> {
    component
        .identifier()
        .map(|column| column.name.clone())
        .ok_or_else(|| QueryError::Metadata {
            clause,
            message: format!("component `{}` has no primary key", component.name),
        })
}

/// `target.pk != source.pk` for every primary key column.
fn exclusion(target: AliasId, source: AliasId, component: &ComponentMetadata) -> ResolvedExpr {
    let mut expr = ExprBuilder::new();
    for (n, pk) in component.primary_keys().enumerate() {
        if n > 0 {
            expr.text(" AND ");
        }
        expr.column(target, &pk.name)
            .text(" != ")
            .column(source, &pk.name);
    }
    expr.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query_planner::expression::ExprPiece;
    use crate::schema_catalog::testing::fixture_catalog;

    fn setup(component: &str) -> (crate::schema_catalog::SchemaCatalog, AliasResolver, JoinGraph, AliasId) {
        let catalog = fixture_catalog();
        let mut resolver = AliasResolver::new();
        let meta = catalog.describe(component).unwrap();
        let root = resolver.bind("r", &meta.table_name);
        let graph = JoinGraph::new(JoinNode::root(root, "r".to_string(), meta));
        (catalog, resolver, graph, root)
    }

    #[test]
    fn test_many_to_many_adds_bridge_then_target() {
        let (catalog, mut resolver, mut graph, root) = setup("User");
        let relation = catalog.describe("User").unwrap().relation("Group").unwrap().clone();
        let expanded =
            expand_relation(&catalog, &mut resolver, &mut graph, root, &relation, JoinType::Inner, "g")
                .unwrap();
        let bridge = expanded.bridge.unwrap();
        assert_eq!(resolver.name(expanded.target), "e2");
        assert_eq!(resolver.name(bridge), "g");
        let aliases: Vec<AliasId> = graph.aliases().collect();
        assert_eq!(aliases, vec![root, bridge, expanded.target]);

        let target = graph.node(expanded.target).unwrap();
        assert_eq!(target.parent, Some(bridge));
        assert_eq!(target.source, Some(root));
        // discriminator of Group
        assert!(matches!(
            target.extra_predicates[0].pieces.as_slice(),
            [ExprPiece::Discriminator { column, .. }] if column == "type"
        ));
        assert!(target.depends_on.contains(&bridge));
    }

    #[test]
    fn test_self_referential_one_to_many_is_symmetric_with_exclusion() {
        let (catalog, mut resolver, mut graph, root) = setup("Category");
        let relation = catalog.describe("Category").unwrap().relation("Children").unwrap().clone();
        let expanded =
            expand_relation(&catalog, &mut resolver, &mut graph, root, &relation, JoinType::Left, "c")
                .unwrap();
        let node = graph.node(expanded.target).unwrap();
        let structural = node.structural.as_ref().unwrap();
        assert_eq!(structural.columns().count(), 4);
        assert_eq!(node.extra_predicates.len(), 1);
    }

    #[test]
    fn test_directed_self_reference_is_one_way() {
        let (catalog, mut resolver, mut graph, root) = setup("Category");
        let relation = catalog
            .describe("Category")
            .unwrap()
            .relation("Subcategories")
            .unwrap()
            .clone();
        let expanded =
            expand_relation(&catalog, &mut resolver, &mut graph, root, &relation, JoinType::Left, "s")
                .unwrap();
        let node = graph.node(expanded.target).unwrap();
        assert_eq!(node.structural.as_ref().unwrap().columns().count(), 2);
        assert_eq!(node.extra_predicates.len(), 1);
    }

    #[test]
    fn test_self_referential_one_to_one_excludes_source_row() {
        let (catalog, mut resolver, mut graph, root) = setup("Category");
        let relation = catalog.describe("Category").unwrap().relation("Parent").unwrap().clone();
        let expanded =
            expand_relation(&catalog, &mut resolver, &mut graph, root, &relation, JoinType::Left, "p")
                .unwrap();
        let node = graph.node(expanded.target).unwrap();
        assert_eq!(node.structural.as_ref().unwrap().columns().count(), 2);
        assert_eq!(node.extra_predicates.len(), 1);
        let excluded: Vec<AliasId> = node.extra_predicates[0].deps.iter().copied().collect();
        assert_eq!(excluded, vec![root, expanded.target]);
    }
}
