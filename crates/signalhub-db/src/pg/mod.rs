//! Postgres-backed [`crate::Store`] implementation.

mod buckets;
mod partners;
mod queue;
mod signals;

use sqlx::PgPool;

use crate::DbError;

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Parse a TEXT column holding one of the core wire enums.
fn parse_column<T>(column: &'static str, value: &str) -> Result<T, DbError>
where
    T: std::str::FromStr,
{
    value.parse::<T>().map_err(|_| DbError::InvalidValue {
        column,
        value: value.to_string(),
    })
}
