//! The execution boundary. The compiler never talks to a database itself;
//! callers supply a [`Connection`] that runs SQL and streams rows back.

use async_trait::async_trait;
use futures_util::stream::{BoxStream, StreamExt};
use serde_json::Value;
use thiserror::Error;

use crate::compiler::{CompiledCount, CompiledQuery};
use crate::hydration::{HydratedResult, HydrationError, HydrationMode, HydrationPlan, Hydrator, ResultRow};

pub type RowStream<E> = BoxStream<'static, Result<ResultRow, E>>;

#[async_trait]
pub trait Connection: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<RowStream<Self::Error>, Self::Error>;
}

#[derive(Debug, Error)]
pub enum FetchError<E: std::error::Error + 'static> {
    /// Raised by the connection; passed through untouched.
    #[error("Query execution failed: {0}")]
    Connection(#[source] E),
    #[error(transparent)]
    Hydration(#[from] HydrationError),
    #[error("Count query returned no `{alias}` column")]
    MissingCount { alias: String },
}

/// Hydrates rows as they arrive.
pub async fn hydrate_stream<E>(
    mut rows: RowStream<E>,
    plan: &HydrationPlan,
    mode: HydrationMode,
) -> Result<HydratedResult, FetchError<E>>
where
    E: std::error::Error + 'static,
{
    let mut hydrator = Hydrator::new(plan, mode);
    while let Some(row) = rows.next().await {
        let row = row.map_err(FetchError::Connection)?;
        hydrator.push_row(&row)?;
    }
    Ok(hydrator.finish())
}

/// Executes a compiled query and hydrates its rows.
pub async fn fetch<C>(
    connection: &C,
    compiled: &CompiledQuery,
    mode: HydrationMode,
) -> Result<HydratedResult, FetchError<C::Error>>
where
    C: Connection + ?Sized,
{
    log::debug!("Executing: {}", compiled.sql);
    let rows = connection
        .execute(&compiled.sql, &compiled.params)
        .await
        .map_err(FetchError::Connection)?;
    hydrate_stream(rows, &compiled.hydration_plan, mode).await
}

/// Executes a compiled query and hydrates it in the mode it was compiled for.
pub async fn fetch_default<C>(connection: &C, compiled: &CompiledQuery) -> Result<HydratedResult, FetchError<C::Error>>
where
    C: Connection + ?Sized,
{
    fetch(connection, compiled, compiled.hydration_mode).await
}

/// Executes a compiled count statement.
pub async fn fetch_count<C>(connection: &C, compiled: &CompiledCount) -> Result<u64, FetchError<C::Error>>
where
    C: Connection + ?Sized,
{
    log::debug!("Executing count: {}", compiled.sql);
    let mut rows = connection
        .execute(&compiled.sql, &compiled.params)
        .await
        .map_err(FetchError::Connection)?;
    let missing = || FetchError::MissingCount {
        alias: compiled.count_alias.clone(),
    };
    let row = match rows.next().await {
        Some(row) => row.map_err(FetchError::Connection)?,
        None => return Err(missing()),
    };
    // drivers return COUNT(*) as a number or as a numeric string
    match row.get(&compiled.count_alias) {
        Some(Value::Number(n)) => n.as_u64().ok_or_else(missing),
        Some(Value::String(s)) => s.trim().parse().map_err(|_| missing()),
        _ => Err(missing()),
    }
}
