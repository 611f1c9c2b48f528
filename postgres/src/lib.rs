//! `PostgreSQL` balance store for the bank-account entity.
//!
//! This crate provides a PostgreSQL-backed [`BalanceStore`]. Committed balances live in
//! one row per entity:
//!
//! ```sql
//! CREATE TABLE account_balances (
//!     entity_id  TEXT PRIMARY KEY,
//!     amount     NUMERIC NOT NULL CHECK (amount >= 0),
//!     updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
//! )
//! ```
//!
//! Staged values are held in process memory until [`commit`](BalanceStore::commit)
//! upserts them, so a crash before commit leaves the row untouched. The `CHECK`
//! constraint rejects a negative balance at commit.
//!
//! # Example
//!
//! ```ignore
//! use account_entity_postgres::PostgresBalanceStore;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresBalanceStore::new("postgres://localhost/accounts").await?;
//!     store.migrate().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use account_entity_core::account::EntityId;
use account_entity_core::balance_store::{BalanceFuture, BalanceStore, BalanceStoreError};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Creates the balance table if it does not exist.
const CREATE_TABLE: &str = r"
    CREATE TABLE IF NOT EXISTS account_balances (
        entity_id TEXT PRIMARY KEY,
        amount NUMERIC NOT NULL CHECK (amount >= 0),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
";

/// `PostgreSQL`-based balance store.
///
/// Cheap to share behind an `Arc`; the pool is internally reference counted.
pub struct PostgresBalanceStore {
    pool: PgPool,
    staged: Mutex<HashMap<EntityId, Decimal>>,
}

impl PostgresBalanceStore {
    /// Connects to `database_url`.
    ///
    /// # Errors
    ///
    /// Returns [`BalanceStoreError::Unavailable`] if the connection cannot be established.
    pub async fn new(database_url: &str) -> Result<Self, BalanceStoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| BalanceStoreError::Unavailable(e.to_string()))?;
        Ok(Self::from_pool(pool))
    }

    /// Wraps an existing pool.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            staged: Mutex::new(HashMap::new()),
        }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the `account_balances` table.
    ///
    /// # Errors
    ///
    /// Returns [`BalanceStoreError::Database`] if the statement fails.
    pub async fn migrate(&self) -> Result<(), BalanceStoreError> {
        sqlx::query(CREATE_TABLE)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        tracing::info!("Balance table ready");
        Ok(())
    }

    fn staged_values(&self) -> MutexGuard<'_, HashMap<EntityId, Decimal>> {
        self.staged.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn load(&self, entity_id: &EntityId) -> Result<Option<Decimal>, BalanceStoreError> {
        let row = sqlx::query("SELECT amount FROM account_balances WHERE entity_id = $1")
            .bind(entity_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(|row| {
            row.try_get::<Decimal, _>("amount")
                .map_err(|e| BalanceStoreError::Serialization(e.to_string()))
        })
        .transpose()
    }

    async fn upsert(&self, entity_id: &EntityId) -> Result<(), BalanceStoreError> {
        let staged = self.staged_values().get(entity_id).copied();
        let Some(amount) = staged else {
            return Ok(());
        };

        sqlx::query(
            r"
            INSERT INTO account_balances (entity_id, amount, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (entity_id)
            DO UPDATE SET amount = EXCLUDED.amount, updated_at = EXCLUDED.updated_at
            ",
        )
        .bind(entity_id.as_str())
        .bind(amount)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            metrics::counter!("balance_store.commit.errors").increment(1);
            map_sqlx_error(e)
        })?;

        // A value staged while the upsert ran stays staged.
        let mut staged = self.staged_values();
        if staged.get(entity_id) == Some(&amount) {
            staged.remove(entity_id);
        }
        drop(staged);

        tracing::debug!(entity_id = %entity_id, amount = %amount, "Balance committed");
        metrics::counter!("balance_store.commits").increment(1);
        Ok(())
    }
}

impl BalanceStore for PostgresBalanceStore {
    fn get<'a>(&'a self, entity_id: &'a EntityId) -> BalanceFuture<'a, Option<Decimal>> {
        Box::pin(self.load(entity_id))
    }

    fn set<'a>(&'a self, entity_id: &'a EntityId, amount: Decimal) -> BalanceFuture<'a, ()> {
        self.staged_values().insert(entity_id.clone(), amount);
        Box::pin(async { Ok(()) })
    }

    fn staged<'a>(&'a self, entity_id: &'a EntityId) -> BalanceFuture<'a, Option<Decimal>> {
        let value = self.staged_values().get(entity_id).copied();
        Box::pin(async move { Ok(value) })
    }

    fn commit<'a>(&'a self, entity_id: &'a EntityId) -> BalanceFuture<'a, ()> {
        Box::pin(self.upsert(entity_id))
    }

    fn discard<'a>(&'a self, entity_id: &'a EntityId) -> BalanceFuture<'a, ()> {
        self.staged_values().remove(entity_id);
        Box::pin(async { Ok(()) })
    }
}

/// Connection-level failures map to `Unavailable`, everything else to `Database`.
fn map_sqlx_error(error: sqlx::Error) -> BalanceStoreError {
    match error {
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => BalanceStoreError::Unavailable(error.to_string()),
        other => BalanceStoreError::Database(other.to_string()),
    }
}
