use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum HydrationError {
    /// The row lacks a column the hydration plan expects; the SQL and the
    /// plan it was compiled with have drifted apart.
    #[error("Result row has no column `{column}` (expected for alias `{alias}`)")]
    Shape { alias: String, column: String },
    #[error("Unknown hydration mode `{0}` (expected record, array or scalar)")]
    UnknownMode(String),
}
