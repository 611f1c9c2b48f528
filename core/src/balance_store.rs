//! Balance store boundary for entity state.
//!
//! This module defines the contract between the transaction processor and the durable
//! key-value store that owns each entity's balance: one decimal per entity id.
//!
//! # Design
//!
//! Writes are two-phase. [`BalanceStore::set`] stages a value, [`BalanceStore::staged`]
//! reads it back for verification, and [`BalanceStore::commit`] is the durability
//! point. [`BalanceStore::get`] only ever observes committed values, so a staged value
//! that never commits cannot leak into a later call. After a failed persistence
//! attempt-set the processor calls [`BalanceStore::discard`].
//!
//! # Implementations
//!
//! - `PostgresBalanceStore` (in `account-entity-postgres`): production implementation
//! - `InMemoryBalanceStore` (in `account-entity-testing`): fast, deterministic testing
//!
//! # Example
//!
//! ```no_run
//! use account_entity_core::account::EntityId;
//! use account_entity_core::balance_store::{BalanceStore, BalanceStoreError};
//! use rust_decimal::Decimal;
//!
//! async fn example<S: BalanceStore>(store: &S) -> Result<(), BalanceStoreError> {
//!     let id = EntityId::from("acct-1");
//!
//!     // Absence is not an error
//!     let current = store.get(&id).await?.unwrap_or(Decimal::ZERO);
//!
//!     store.set(&id, current + Decimal::ONE).await?;
//!     assert_eq!(store.staged(&id).await?, Some(current + Decimal::ONE));
//!     store.commit(&id).await?;
//!     Ok(())
//! }
//! ```

use crate::account::EntityId;
use rust_decimal::Decimal;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Future returned by [`BalanceStore`] methods.
pub type BalanceFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, BalanceStoreError>> + Send + 'a>>;

/// Errors that can occur during balance store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BalanceStoreError {
    /// Store could not be reached.
    #[error("Balance store unavailable: {0}")]
    Unavailable(String),

    /// Query or transaction failed.
    #[error("Database error: {0}")]
    Database(String),

    /// Stored value could not be decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Staged value read back differs from the value just set.
    #[error("Staged balance mismatch for {entity_id}: expected {expected}, found {found:?}")]
    StagedMismatch {
        /// Entity being written.
        entity_id: EntityId,
        /// Value passed to `set`.
        expected: Decimal,
        /// Value returned by `staged`.
        found: Option<Decimal>,
    },
}

/// Durable key-value storage of one balance per entity.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`. The host guarantees at most one in-flight
/// call per entity id, so implementations need not serialize writes for the same key,
/// but calls for different keys arrive concurrently.
///
/// # Dyn Compatibility
///
/// Methods return boxed futures instead of using `async fn` so the processor can hold
/// an `Arc<dyn BalanceStore>`.
pub trait BalanceStore: Send + Sync {
    /// Last committed balance, or `None` if the entity was never written.
    ///
    /// # Errors
    ///
    /// Returns [`BalanceStoreError`] if the store cannot be read. Absence is not an error.
    fn get<'a>(&'a self, entity_id: &'a EntityId) -> BalanceFuture<'a, Option<Decimal>>;

    /// Stages `amount` as the next balance of `entity_id`.
    ///
    /// # Errors
    ///
    /// Returns [`BalanceStoreError`] if the value cannot be staged.
    fn set<'a>(&'a self, entity_id: &'a EntityId, amount: Decimal) -> BalanceFuture<'a, ()>;

    /// Value staged by [`set`](Self::set) and not yet committed.
    ///
    /// # Errors
    ///
    /// Returns [`BalanceStoreError`] if the staged value cannot be read.
    fn staged<'a>(&'a self, entity_id: &'a EntityId) -> BalanceFuture<'a, Option<Decimal>>;

    /// Makes the staged value durable. No-op if nothing is staged.
    ///
    /// # Errors
    ///
    /// Returns [`BalanceStoreError`] if the value could not be persisted. The staged
    /// value is kept so the commit can be retried.
    fn commit<'a>(&'a self, entity_id: &'a EntityId) -> BalanceFuture<'a, ()>;

    /// Drops any staged value for `entity_id`.
    ///
    /// # Errors
    ///
    /// Returns [`BalanceStoreError`] if the staged value could not be dropped.
    fn discard<'a>(&'a self, entity_id: &'a EntityId) -> BalanceFuture<'a, ()>;
}
