use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::alias_resolver::AliasId;
use super::expression::ResolvedExpr;
use crate::dql_parser::ast::ConditionKind;
use crate::schema_catalog::{ComponentMetadata, Relation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    Left,
}

impl JoinType {
    pub fn keyword(&self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRole {
    Root,
    /// Association table of a many-to-many relation; never hydrated.
    Bridge,
    Target,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinCondition {
    pub kind: ConditionKind,
    pub expr: ResolvedExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinNode {
    pub alias: AliasId,
    pub user_alias: Option<String>,
    pub component: Arc<ComponentMetadata>,
    pub role: NodeRole,
    /// Node this one is physically joined to.
    pub parent: Option<AliasId>,
    /// Node this one hangs off in the hydrated graph. Differs from `parent`
    /// only for many-to-many targets, whose parent is the bridge.
    pub source: Option<AliasId>,
    pub relation: Option<Relation>,
    pub join_type: JoinType,
    pub structural: Option<ResolvedExpr>,
    pub condition: Option<JoinCondition>,
    /// Self-reference exclusion and discriminator filters, always ANDed last.
    pub extra_predicates: Vec<ResolvedExpr>,
    /// Aliases the join predicate reads from.
    pub depends_on: BTreeSet<AliasId>,
    /// Physical column keying the hydrated collection.
    pub index_by: Option<String>,
}

impl JoinNode {
    pub fn root(alias: AliasId, user_alias: String, component: Arc<ComponentMetadata>) -> Self {
        JoinNode {
            alias,
            user_alias: Some(user_alias),
            component,
            role: NodeRole::Root,
            parent: None,
            source: None,
            relation: None,
            join_type: JoinType::Inner,
            structural: None,
            condition: None,
            extra_predicates: Vec::new(),
            depends_on: BTreeSet::new(),
            index_by: None,
        }
    }

    pub fn user_alias(&self) -> &str {
        self.user_alias.as_deref().unwrap_or(&self.component.name)
    }

    /// True when joining this node can multiply the rows of its parent.
    pub fn is_fan_out(&self) -> bool {
        self.relation
            .as_ref()
            .is_some_and(|relation| relation.kind.is_to_many())
    }

    /// Conjuncts of the ON clause in render order, each flagged with whether it
    /// must be parenthesised. An ON condition replaces the structural
    /// predicate, a WITH condition is appended to it.
    pub fn predicates(&self) -> Vec<(&ResolvedExpr, bool)> {
        let mut parts = Vec::new();
        match &self.condition {
            Some(JoinCondition {
                kind: ConditionKind::On,
                expr,
            }) => parts.push((expr, true)),
            Some(JoinCondition {
                kind: ConditionKind::With,
                expr,
            }) => {
                if let Some(structural) = &self.structural {
                    parts.push((structural, false));
                }
                parts.push((expr, true));
            }
            None => {
                if let Some(structural) = &self.structural {
                    parts.push((structural, false));
                }
            }
        }
        parts.extend(self.extra_predicates.iter().map(|expr| (expr, false)));
        parts
    }

    fn refresh_dependencies(&mut self) {
        let mut deps = BTreeSet::new();
        if let Some(parent) = self.parent {
            deps.insert(parent);
        }
        for (expr, _) in self.predicates() {
            deps.extend(expr.deps.iter().copied());
        }
        deps.remove(&self.alias);
        self.depends_on = deps;
    }
}

/// Join nodes of one (sub)query in declaration order; the root comes first.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinGraph {
    nodes: Vec<JoinNode>,
}

impl JoinGraph {
    pub fn new(root: JoinNode) -> Self {
        JoinGraph { nodes: vec![root] }
    }

    pub fn root(&self) -> &JoinNode {
        &self.nodes[0]
    }

    pub fn root_id(&self) -> AliasId {
        self.nodes[0].alias
    }

    pub fn nodes(&self) -> &[JoinNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn aliases(&self) -> impl Iterator<Item = AliasId> + '_ {
        self.nodes.iter().map(|node| node.alias)
    }

    pub fn contains(&self, alias: AliasId) -> bool {
        self.nodes.iter().any(|node| node.alias == alias)
    }

    pub fn node(&self, alias: AliasId) -> Option<&JoinNode> {
        self.nodes.iter().find(|node| node.alias == alias)
    }

    fn node_mut(&mut self, alias: AliasId) -> Option<&mut JoinNode> {
        self.nodes.iter_mut().find(|node| node.alias == alias)
    }

    pub fn add(&mut self, mut node: JoinNode) {
        node.refresh_dependencies();
        self.nodes.push(node);
    }

    pub fn attach_condition(&mut self, alias: AliasId, kind: ConditionKind, expr: ResolvedExpr) {
        if let Some(node) = self.node_mut(alias) {
            node.condition = Some(JoinCondition { kind, expr });
            node.refresh_dependencies();
        }
    }

    pub fn set_index_by(&mut self, alias: AliasId, column: String) {
        if let Some(node) = self.node_mut(alias) {
            node.index_by = Some(column);
        }
    }

    /// Hydration ancestors of `alias`, nearest first. Bridges are skipped.
    pub fn logical_ancestors(&self, alias: AliasId) -> Vec<AliasId> {
        let mut ancestors = Vec::new();
        let mut current = self.node(alias).and_then(|node| node.source);
        while let Some(id) = current {
            if ancestors.contains(&id) {
                break;
            }
            ancestors.push(id);
            current = self.node(id).and_then(|node| node.source);
        }
        ancestors
    }

    /// Aliases that must stay joined when only `referenced` is read by the
    /// statement. Inner joins always stay since they filter rows; a left join
    /// stays when it, a descendant, or a kept join condition needs it.
    pub fn retained(&self, referenced: &BTreeSet<AliasId>) -> HashSet<AliasId> {
        let mut keep: HashSet<AliasId> = self
            .nodes
            .iter()
            .filter(|node| {
                node.role == NodeRole::Root
                    || node.join_type == JoinType::Inner
                    || referenced.contains(&node.alias)
            })
            .map(|node| node.alias)
            .collect();

        loop {
            let before = keep.len();
            for node in &self.nodes {
                if !keep.contains(&node.alias) {
                    continue;
                }
                for dep in &node.depends_on {
                    if self.contains(*dep) {
                        keep.insert(*dep);
                    }
                }
            }
            if keep.len() == before {
                break;
            }
        }
        keep
    }

    /// Stable topological order of the kept nodes: declaration order, except
    /// that a node never precedes its parent or an alias its predicate reads.
    pub fn emission_order(&self, keep: &HashSet<AliasId>) -> Vec<AliasId> {
        let mut pending: Vec<&JoinNode> = self
            .nodes
            .iter()
            .filter(|node| keep.contains(&node.alias))
            .collect();
        let mut emitted: Vec<AliasId> = Vec::with_capacity(pending.len());

        while !pending.is_empty() {
            let ready = pending.iter().position(|node| {
                node.depends_on
                    .iter()
                    .all(|dep| emitted.contains(dep) || !keep.contains(dep))
            });
            match ready {
                Some(pos) => emitted.push(pending.remove(pos).alias),
                None => {
                    log::warn!(
                        "Join predicates form a cycle; emitting {} join(s) in declaration order",
                        pending.len()
                    );
                    emitted.extend(pending.iter().map(|node| node.alias));
                    break;
                }
            }
        }
        emitted
    }
}
