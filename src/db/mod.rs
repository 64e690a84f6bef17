//! Postgres persistence: the append-only journal, the mutable projection and
//! its shadow tables, plus the gas-history reads used by the fan-out.
//!
//! Money columns are NUMERIC(78,0). Values are bound as decimal strings with
//! an explicit `::numeric` cast and read back through `::text`, keeping full
//! precision without a decimal driver type.

pub mod gas;
pub mod journal;
pub mod projection;
pub mod shadow;

use std::str::FromStr;
use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};

use crate::errors::IndexerError;
use crate::models::BigInt;

/// Shared handle on the journal/projection database.
#[derive(Clone)]
pub struct Db {
    pool: PgPool,
}

impl Db {
    pub async fn connect(url: &str) -> Result<Self, IndexerError> {
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(5))
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>, IndexerError> {
        Ok(self.pool.begin().await?)
    }
}

pub(crate) fn money(row: &PgRow, col: &str) -> Result<BigInt, sqlx::Error> {
    let raw: String = row.try_get(col)?;
    raw.parse::<BigInt>().map_err(|e| sqlx::Error::ColumnDecode {
        index: col.to_string(),
        source: Box::new(e),
    })
}

pub(crate) fn money_opt(row: &PgRow, col: &str) -> Result<Option<BigInt>, sqlx::Error> {
    let raw: Option<String> = row.try_get(col)?;
    raw.map(|v| {
        v.parse::<BigInt>().map_err(|e| sqlx::Error::ColumnDecode {
            index: col.to_string(),
            source: Box::new(e),
        })
    })
    .transpose()
}

pub(crate) fn parsed<T>(row: &PgRow, col: &str) -> Result<T, sqlx::Error>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.try_get(col)?;
    raw.parse::<T>().map_err(|e| sqlx::Error::ColumnDecode {
        index: col.to_string(),
        source: e.into(),
    })
}
