use std::collections::{BTreeSet, HashMap};

use super::alias_resolver::{AliasId, AliasNames};
use super::expression::ResolvedExpr;
use super::join_graph::JoinGraph;
use crate::schema_catalog::ColumnDef;

#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    Field {
        alias: AliasId,
        column: String,
        /// Key the value is hydrated under.
        field: String,
        /// Result-set column name, `<sqlAlias>__<column>`.
        output: String,
        /// Added by the compiler rather than requested.
        implicit: bool,
    },
    Expression {
        owner: AliasId,
        ordinal: usize,
        expr: ResolvedExpr,
        /// Alias given in the query, e.g. `count` in `COUNT(u.id) count`.
        name: Option<String>,
    },
}

impl SelectItem {
    pub fn field(alias: AliasId, column: &ColumnDef) -> Self {
        SelectItem::Field {
            alias,
            column: column.name.clone(),
            field: column.field_name().to_string(),
            output: String::new(),
            implicit: false,
        }
    }

    pub fn implicit_field(alias: AliasId, column: &ColumnDef) -> Self {
        SelectItem::Field {
            alias,
            column: column.name.clone(),
            field: column.field_name().to_string(),
            output: String::new(),
            implicit: true,
        }
    }

    /// Alias the item is hydrated onto.
    pub fn alias(&self) -> AliasId {
        match self {
            SelectItem::Field { alias, .. } => *alias,
            SelectItem::Expression { owner, .. } => *owner,
        }
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, SelectItem::Expression { expr, .. } if expr.aggregate)
    }

    /// Result-set column name under the given alias names.
    pub fn output_name(&self, names: &AliasNames) -> String {
        match self {
            SelectItem::Field { output, .. } => output.clone(),
            SelectItem::Expression { owner, ordinal, .. } => expression_output(names, *owner, *ordinal),
        }
    }
}

pub fn expression_output(names: &AliasNames, owner: AliasId, ordinal: usize) -> String {
    format!("{}__{}", names.get(owner), ordinal)
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderTerm {
    pub expr: ResolvedExpr,
    /// `ASC`, `DESC`, optionally followed by `NULLS FIRST|LAST`.
    pub direction: Option<String>,
    /// Default ordering from the schema rather than the query.
    pub implicit: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClauseSet {
    pub distinct: bool,
    pub select: Vec<SelectItem>,
    pub where_clause: Option<ResolvedExpr>,
    pub group_by: Vec<ResolvedExpr>,
    pub having: Option<ResolvedExpr>,
    pub order_by: Vec<OrderTerm>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl ClauseSet {
    pub fn has_aggregates(&self) -> bool {
        self.select.iter().any(SelectItem::is_aggregate)
    }

    pub fn is_selected(&self, alias: AliasId, column: &str) -> bool {
        self.select.iter().any(|item| {
            matches!(item, SelectItem::Field { alias: a, column: c, .. } if *a == alias && c == column)
        })
    }

    pub fn expression(&self, owner: AliasId, ordinal: usize) -> Option<&SelectItem> {
        self.select.iter().find(|item| {
            matches!(item, SelectItem::Expression { owner: o, ordinal: n, .. } if *o == owner && *n == ordinal)
        })
    }

    /// Named select expressions, for resolving bare identifiers in later clauses.
    pub fn output_names(&self) -> HashMap<String, (AliasId, usize)> {
        self.select
            .iter()
            .filter_map(|item| match item {
                SelectItem::Expression {
                    owner,
                    ordinal,
                    name: Some(name),
                    ..
                } => Some((name.clone(), (*owner, *ordinal))),
                _ => None,
            })
            .collect()
    }

    /// Every alias read by some clause.
    pub fn referenced_aliases(&self) -> BTreeSet<AliasId> {
        let mut aliases: BTreeSet<AliasId> = BTreeSet::new();
        for item in &self.select {
            aliases.insert(item.alias());
            if let SelectItem::Expression { expr, .. } = item {
                aliases.extend(expr.deps.iter().copied());
            }
        }
        let exprs = self
            .where_clause
            .iter()
            .chain(self.group_by.iter())
            .chain(self.having.iter())
            .chain(self.order_by.iter().map(|term| &term.expr));
        for expr in exprs {
            aliases.extend(expr.deps.iter().copied());
        }
        aliases
    }
}

/// A `(SELECT ...)` nested in some clause expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Subquery {
    pub graph: JoinGraph,
    pub clauses: ClauseSet,
    pub emitted: Vec<AliasId>,
}

impl Subquery {
    /// Aliases of enclosing statements the subquery correlates with.
    pub fn outer_references(&self) -> BTreeSet<AliasId> {
        let mut refs = self.clauses.referenced_aliases();
        for node in self.graph.nodes() {
            refs.extend(node.depends_on.iter().copied());
        }
        refs.retain(|alias| !self.graph.contains(*alias));
        refs
    }
}
