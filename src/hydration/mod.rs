//! Reconstruction of nested records from the flat rows a compiled query
//! returns.

pub mod errors;
pub mod hydrator;
pub mod plan;
pub mod record;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use errors::HydrationError;
pub use hydrator::Hydrator;
pub use plan::{FieldBinding, HydrationNode, HydrationPlan};
pub use record::{Collection, Record, Related};

/// One result row, keyed by `<sqlAlias>__<column>` output names.
pub type ResultRow = HashMap<String, Value>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HydrationMode {
    /// A [`Collection`] of [`Record`]s.
    #[default]
    Record,
    /// Nested `serde_json` objects and arrays.
    Array,
    /// One flat map per row, keyed `<alias>_<field>`.
    Scalar,
}

impl fmt::Display for HydrationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HydrationMode::Record => "record",
            HydrationMode::Array => "array",
            HydrationMode::Scalar => "scalar",
        };
        f.write_str(name)
    }
}

impl FromStr for HydrationMode {
    type Err = HydrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "record" | "object" => Ok(HydrationMode::Record),
            "array" => Ok(HydrationMode::Array),
            "scalar" => Ok(HydrationMode::Scalar),
            _ => Err(HydrationError::UnknownMode(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HydratedResult {
    Records(Collection),
    Array(Value),
    Scalar(Vec<Map<String, Value>>),
}

impl HydratedResult {
    /// Number of top-level results.
    pub fn len(&self) -> usize {
        match self {
            HydratedResult::Records(collection) => collection.len(),
            HydratedResult::Array(Value::Array(items)) => items.len(),
            HydratedResult::Array(Value::Object(items)) => items.len(),
            HydratedResult::Array(_) => 0,
            HydratedResult::Scalar(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_value(self) -> Value {
        match self {
            HydratedResult::Records(collection) => collection.to_value(),
            HydratedResult::Array(value) => value,
            HydratedResult::Scalar(rows) => Value::Array(rows.into_iter().map(Value::Object).collect()),
        }
    }
}

/// Hydrates a complete set of rows.
pub fn hydrate<I>(rows: I, plan: &HydrationPlan, mode: HydrationMode) -> Result<HydratedResult, HydrationError>
where
    I: IntoIterator<Item = ResultRow>,
{
    let mut hydrator = Hydrator::new(plan, mode);
    for row in rows {
        hydrator.push_row(&row)?;
    }
    Ok(hydrator.finish())
}
