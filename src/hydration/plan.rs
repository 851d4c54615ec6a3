//! Hydration plans: which result columns feed which record, and how records
//! hang together.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::query_planner::alias_resolver::AliasId;
use crate::query_planner::clause_set::SelectItem;
use crate::query_planner::join_graph::NodeRole;
use crate::query_planner::query_plan::QueryPlan;
use crate::schema_catalog::RelationKind;

/// A value of the hydrated record and the result column it is read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldBinding {
    pub key: String,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HydrationNode {
    /// DQL alias, e.g. `u`.
    pub alias: String,
    pub sql_alias: String,
    pub component: String,
    /// Index of the parent node; `None` for the root.
    pub parent: Option<usize>,
    /// Relation connecting this node to its parent.
    pub relation: Option<String>,
    pub kind: Option<RelationKind>,
    /// Selected primary key columns. Empty when the keys are not part of the
    /// result, in which case every row makes a new record.
    pub identifier: Vec<FieldBinding>,
    pub fields: Vec<FieldBinding>,
    pub aggregates: Vec<FieldBinding>,
    /// Output column keying the collection this node's records go into.
    pub index_by: Option<String>,
    pub children: Vec<usize>,
}

impl HydrationNode {
    /// Whether the parent holds a collection of these records.
    pub fn is_collection(&self) -> bool {
        self.kind.is_some_and(|kind| kind.is_to_many())
    }
}

/// Hydration nodes with the root first and every parent before its children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HydrationPlan {
    pub nodes: Vec<HydrationNode>,
}

impl HydrationPlan {
    pub fn root(&self) -> Option<&HydrationNode> {
        self.nodes.first()
    }

    pub fn node(&self, alias: &str) -> Option<&HydrationNode> {
        self.nodes.iter().find(|node| node.alias == alias)
    }

    /// Builds the plan from the select list of a compiled query. Bridges are
    /// never hydrated, and a joined alias with no selected field is left out;
    /// its selected descendants then hang off the nearest hydrated ancestor.
    pub fn from_query_plan(plan: &QueryPlan) -> Self {
        let graph = &plan.graph;
        let root_id = graph.root_id();
        let mut nodes: Vec<HydrationNode> = Vec::new();
        let mut index_of: HashMap<AliasId, usize> = HashMap::new();

        for id in &plan.emitted {
            let Some(join) = graph.node(*id) else { continue };
            if join.role == NodeRole::Bridge {
                continue;
            }
            let selected = plan
                .clauses
                .select
                .iter()
                .any(|item| matches!(item, SelectItem::Field { alias, .. } if alias == id));
            if *id != root_id && !selected {
                continue;
            }

            let parent = graph
                .logical_ancestors(*id)
                .into_iter()
                .find_map(|ancestor| index_of.get(&ancestor).copied());

            let mut fields: Vec<FieldBinding> = Vec::new();
            let mut identifier: Vec<FieldBinding> = Vec::new();
            let mut index_by = None;
            for item in &plan.clauses.select {
                let SelectItem::Field {
                    alias,
                    column,
                    field,
                    output,
                    ..
                } = item
                else {
                    continue;
                };
                if alias != id || fields.iter().any(|binding| &binding.key == field) {
                    continue;
                }
                let binding = FieldBinding {
                    key: field.clone(),
                    output: output.clone(),
                };
                if join.component.is_primary_key(column) {
                    identifier.push(binding.clone());
                }
                if join.index_by.as_deref() == Some(column.as_str()) {
                    index_by = Some(output.clone());
                }
                fields.push(binding);
            }
            // a partially selected composite key cannot identify a record
            if identifier.len() != join.component.primary_keys().count() {
                identifier.clear();
            }

            let position = nodes.len();
            if let Some(parent) = parent {
                nodes[parent].children.push(position);
            }
            index_of.insert(*id, position);
            nodes.push(HydrationNode {
                alias: join.user_alias().to_string(),
                sql_alias: plan.sql_alias(*id).to_string(),
                component: join.component.name.clone(),
                parent,
                relation: join.relation.as_ref().map(|relation| relation.name.clone()),
                kind: join.relation.as_ref().map(|relation| relation.kind),
                identifier,
                fields,
                aggregates: Vec::new(),
                index_by,
                children: Vec::new(),
            });
        }

        for item in &plan.clauses.select {
            if let SelectItem::Expression { owner, name, .. } = item {
                let output = item.output_name(&plan.aliases);
                let node = index_of.get(owner).copied().unwrap_or(0);
                if let Some(node) = nodes.get_mut(node) {
                    node.aggregates.push(FieldBinding {
                        key: name.clone().unwrap_or_else(|| output.clone()),
                        output,
                    });
                }
            }
        }

        log::trace!("Hydration plan has {} node(s)", nodes.len());
        HydrationPlan { nodes }
    }
}
