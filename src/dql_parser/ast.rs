use std::fmt;

use serde::{Deserialize, Serialize};

/// Clause a piece of DQL text (or an error) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClauseKind {
    Query,
    Select,
    From,
    Join,
    IndexBy,
    Where,
    GroupBy,
    Having,
    OrderBy,
    Limit,
    Offset,
}

impl fmt::Display for ClauseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClauseKind::Query => "query",
            ClauseKind::Select => "SELECT",
            ClauseKind::From => "FROM",
            ClauseKind::Join => "JOIN",
            ClauseKind::IndexBy => "INDEXBY",
            ClauseKind::Where => "WHERE",
            ClauseKind::GroupBy => "GROUP BY",
            ClauseKind::Having => "HAVING",
            ClauseKind::OrderBy => "ORDER BY",
            ClauseKind::Limit => "LIMIT",
            ClauseKind::Offset => "OFFSET",
        };
        f.write_str(name)
    }
}

/// Raw clause text plus the ordinal of the first `?` it contains, counted over
/// the whole query text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    pub first_param: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionKind {
    /// Replaces the structural join predicate.
    On,
    /// Is ANDed onto the structural join predicate.
    With,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinConditionText {
    pub kind: ConditionKind,
    pub segment: Segment,
}

/// One component reference of the FROM clause: the root (`User u`) or a
/// relation path (`LEFT JOIN u.Phonenumber p WITH ...`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FromElement {
    pub path: Vec<String>,
    pub alias: Option<String>,
    /// `None` for the root element.
    pub join: Option<JoinKind>,
    pub condition: Option<JoinConditionText>,
    pub index_by: Option<String>,
}

impl FromElement {
    /// Alias used when the query does not name one: the component or relation name.
    pub fn effective_alias(&self) -> &str {
        match &self.alias {
            Some(alias) => alias,
            None => self.path.last().map(String::as_str).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DqlQuery {
    pub distinct: bool,
    pub select: Option<Segment>,
    pub from: Vec<FromElement>,
    pub where_clause: Option<Segment>,
    pub group_by: Option<Segment>,
    pub having: Option<Segment>,
    pub order_by: Option<Segment>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub placeholders: usize,
}
