use std::collections::HashSet;

use super::alias_resolver::{AliasId, AliasNames};
use super::clause_set::ClauseSet;
use super::join_graph::{JoinGraph, JoinNode};

/// Fully analysed top-level query, ready for SQL generation and hydration
/// planning.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub aliases: AliasNames,
    /// Fresh names for every emitted alias, present when the query needs a
    /// limit subquery that repeats the joins.
    pub shadow_aliases: Option<AliasNames>,
    pub graph: JoinGraph,
    pub clauses: ClauseSet,
    /// Join emission order after pruning; the root comes first.
    pub emitted: Vec<AliasId>,
    pub placeholders: usize,
}

impl QueryPlan {
    pub fn emitted_nodes(&self) -> impl Iterator<Item = &JoinNode> {
        self.emitted.iter().filter_map(|id| self.graph.node(*id))
    }

    /// True when some emitted join can return several rows per root row.
    pub fn has_fan_out(&self) -> bool {
        self.emitted_nodes().any(JoinNode::is_fan_out)
    }

    pub fn emitted_set(&self) -> HashSet<AliasId> {
        self.emitted.iter().copied().collect()
    }

    pub fn sql_alias(&self, id: AliasId) -> &str {
        self.aliases.get(id)
    }
}
