use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;
use validator::Validate;

use crate::dql_parser::tokenizer::Scanner;
use crate::hydration::HydrationMode;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Parse error for {field}: {value} - {source}")]
    Parse {
        field: String,
        value: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Compiler configuration with validation
#[derive(Clone, Debug, PartialEq, Validate, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Quote every table, alias and column identifier with the dialect's quote characters
    pub quote_identifiers: bool,

    /// Drop LEFT joins no clause reads from
    pub prune_unreferenced_joins: bool,

    /// Maximum nesting of `(SELECT ...)` subqueries inside clause expressions
    #[validate(range(
        min = 1,
        max = 16,
        message = "Max subquery depth must be between 1 and 16"
    ))]
    pub max_subquery_depth: u32,

    /// Column alias of the count statement's result
    #[validate(length(min = 1, message = "Count alias cannot be empty"))]
    pub count_alias: String,

    /// Hydration mode used when a caller does not pick one
    pub default_hydration: HydrationMode,

    /// Treat `\` inside string literals as an escape, as MySQL does by default
    pub backslash_escapes: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            quote_identifiers: false,
            prune_unreferenced_joins: false,
            max_subquery_depth: 4,
            count_alias: "num_results".to_string(),
            default_hydration: HydrationMode::Record,
            backslash_escapes: false,
        }
    }
}

impl CompilerConfig {
    /// Create configuration from environment variables with validation
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            quote_identifiers: parse_env_var("DQL_QUOTE_IDENTIFIERS", "false")?,
            prune_unreferenced_joins: parse_env_var("DQL_PRUNE_JOINS", "false")?,
            max_subquery_depth: parse_env_var("DQL_MAX_SUBQUERY_DEPTH", "4")?,
            count_alias: env::var("DQL_COUNT_ALIAS").unwrap_or_else(|_| "num_results".to_string()),
            default_hydration: parse_env_var("DQL_DEFAULT_HYDRATION", "record")?,
            backslash_escapes: parse_env_var("DQL_BACKSLASH_ESCAPES", "false")?,
        };

        config.validate()?;
        Ok(config)
    }

    /// How DQL string literals are scanned.
    pub fn scanner(&self) -> Scanner {
        Scanner::new(self.backslash_escapes)
    }

    /// Create configuration from YAML file
    pub fn from_yaml_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Parse {
            field: "yaml_file".to_string(),
            value: "file read failed".to_string(),
            source: Box::new(e),
        })?;

        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content).map_err(|e| ConfigError::Parse {
            field: "yaml_content".to_string(),
            value: content.to_string(),
            source: Box::new(e),
        })?;

        config.validate()?;
        Ok(config)
    }
}

/// Parse an environment variable with a default value
fn parse_env_var<T: std::str::FromStr>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = env::var(key).unwrap_or_else(|_| default.to_string());
    value.parse().map_err(|e| ConfigError::Parse {
        field: key.to_string(),
        value,
        source: Box::new(e),
    })
}
