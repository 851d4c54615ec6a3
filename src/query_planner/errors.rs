use thiserror::Error;

use crate::dql_parser::ast::ClauseKind;
use crate::dql_parser::errors::TokenizeError;
use crate::schema_catalog::SchemaCatalogError;

/// Compilation failures. Every variant names the clause it was raised from.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum QueryError {
    #[error("Syntax error in {clause} clause: {reason}")]
    Syntax { clause: ClauseKind, reason: String },
    #[error("Unknown component `{component}` in {clause} clause")]
    UnknownComponent {
        clause: ClauseKind,
        component: String,
    },
    #[error("Component `{component}` has no relation `{relation}` ({clause} clause)")]
    UnknownRelation {
        clause: ClauseKind,
        component: String,
        relation: String,
    },
    #[error("Unknown alias `{alias}` in {clause} clause")]
    UnknownAlias { clause: ClauseKind, alias: String },
    #[error("`{field}` is not a field of `{alias}` ({clause} clause)")]
    UnknownField {
        clause: ClauseKind,
        alias: String,
        field: String,
    },
    #[error("Cannot index `{alias}` by `{column}`: no such column ({clause} clause)")]
    UnknownColumn {
        clause: ClauseKind,
        alias: String,
        column: String,
    },
    #[error("Condition of join `{join}` references `{alias}` before it is joined ({clause} clause)")]
    AmbiguousJoin {
        clause: ClauseKind,
        join: String,
        alias: String,
    },
    #[error("Query has {expected} placeholder(s) but {given} value(s) were bound ({clause} clause)")]
    ParameterMismatch {
        clause: ClauseKind,
        expected: usize,
        given: usize,
    },
    #[error("Schema metadata unavailable in {clause} clause: {message}")]
    Metadata { clause: ClauseKind, message: String },
}

impl QueryError {
    pub fn clause(&self) -> ClauseKind {
        match self {
            QueryError::Syntax { clause, .. }
            | QueryError::UnknownComponent { clause, .. }
            | QueryError::UnknownRelation { clause, .. }
            | QueryError::UnknownAlias { clause, .. }
            | QueryError::UnknownField { clause, .. }
            | QueryError::UnknownColumn { clause, .. }
            | QueryError::AmbiguousJoin { clause, .. }
            | QueryError::ParameterMismatch { clause, .. }
            | QueryError::Metadata { clause, .. } => *clause,
        }
    }

    pub(crate) fn syntax(clause: ClauseKind, reason: impl Into<String>) -> Self {
        QueryError::Syntax {
            clause,
            reason: reason.into(),
        }
    }

    pub(crate) fn tokenize(clause: ClauseKind, error: TokenizeError) -> Self {
        QueryError::Syntax {
            clause,
            reason: error.to_string(),
        }
    }

    pub(crate) fn schema(clause: ClauseKind, error: SchemaCatalogError) -> Self {
        match error {
            SchemaCatalogError::UnknownComponent { component } => {
                QueryError::UnknownComponent { clause, component }
            }
            other => QueryError::Metadata {
                clause,
                message: other.to_string(),
            },
        }
    }
}
