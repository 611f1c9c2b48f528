//! In-memory balance store with fault injection.
//!
//! [`InMemoryBalanceStore`] keeps committed and staged balances in two maps, so tests
//! can tell a durable value from one that was only staged. Faults are injected per
//! operation and consumed one call at a time.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on a poisoned lock

use account_entity_core::account::EntityId;
use account_entity_core::balance_store::{BalanceFuture, BalanceStore, BalanceStoreError};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::future;
use std::sync::{Arc, Mutex};

/// One of the [`BalanceStore`] operations, for fault injection and call counting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    /// `get`
    Get,
    /// `set`
    Set,
    /// `staged`
    Staged,
    /// `commit`
    Commit,
    /// `discard`
    Discard,
}

#[derive(Debug, Default)]
struct State {
    committed: HashMap<EntityId, Decimal>,
    staged: HashMap<EntityId, Decimal>,
    faults: HashMap<StoreOperation, u32>,
    lost_writes: u32,
    calls: HashMap<StoreOperation, u32>,
}

impl State {
    fn enter(&mut self, operation: StoreOperation) -> Result<(), BalanceStoreError> {
        *self.calls.entry(operation).or_default() += 1;

        match self.faults.get_mut(&operation) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(BalanceStoreError::Unavailable(format!(
                    "injected {operation:?} failure"
                )))
            }
            _ => Ok(()),
        }
    }
}

/// In-memory balance store for fast, deterministic testing.
///
/// # Example
///
/// ```
/// use account_entity_testing::{InMemoryBalanceStore, StoreOperation};
/// use account_entity_core::{BalanceStore, EntityId, Decimal};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryBalanceStore::new();
/// let id = EntityId::from("acct-1");
///
/// store.set(&id, Decimal::from(10)).await?;
/// assert_eq!(store.get(&id).await?, None); // staged, not committed
///
/// store.commit(&id).await?;
/// assert_eq!(store.committed(&id), Some(Decimal::from(10)));
///
/// store.fail_next(StoreOperation::Commit, 1);
/// assert!(store.commit(&id).await.is_err());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryBalanceStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryBalanceStore {
    /// Create a new empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a committed balance.
    #[must_use]
    pub fn with_balance(self, entity_id: impl Into<EntityId>, amount: Decimal) -> Self {
        self.state
            .lock()
            .unwrap()
            .committed
            .insert(entity_id.into(), amount);
        self
    }

    /// Make the next `times` calls to `operation` fail with `Unavailable`.
    pub fn fail_next(&self, operation: StoreOperation, times: u32) {
        self.state.lock().unwrap().faults.insert(operation, times);
    }

    /// Make every call to `operation` fail until [`heal`](Self::heal) is called.
    pub fn fail_always(&self, operation: StoreOperation) {
        self.fail_next(operation, u32::MAX);
    }

    /// Clear all injected faults.
    pub fn heal(&self) {
        let mut state = self.state.lock().unwrap();
        state.faults.clear();
        state.lost_writes = 0;
    }

    /// Make the next `times` calls to `set` report success without staging anything.
    pub fn lose_next_writes(&self, times: u32) {
        self.state.lock().unwrap().lost_writes = times;
    }

    /// Committed balance for `entity_id`.
    #[must_use]
    pub fn committed(&self, entity_id: &EntityId) -> Option<Decimal> {
        self.state.lock().unwrap().committed.get(entity_id).copied()
    }

    /// Staged, uncommitted balance for `entity_id`.
    #[must_use]
    pub fn staged_value(&self, entity_id: &EntityId) -> Option<Decimal> {
        self.state.lock().unwrap().staged.get(entity_id).copied()
    }

    /// Number of calls made to `operation`, failed ones included.
    #[must_use]
    pub fn calls(&self, operation: StoreOperation) -> u32 {
        self.state
            .lock()
            .unwrap()
            .calls
            .get(&operation)
            .copied()
            .unwrap_or(0)
    }

    fn run<T: Send + 'static>(
        &self,
        operation: StoreOperation,
        f: impl FnOnce(&mut State) -> T,
    ) -> BalanceFuture<'static, T> {
        let mut state = self.state.lock().unwrap();
        let result = state.enter(operation).map(|()| f(&mut state));
        Box::pin(future::ready(result))
    }
}

impl BalanceStore for InMemoryBalanceStore {
    fn get<'a>(&'a self, entity_id: &'a EntityId) -> BalanceFuture<'a, Option<Decimal>> {
        self.run(StoreOperation::Get, |state| {
            state.committed.get(entity_id).copied()
        })
    }

    fn set<'a>(&'a self, entity_id: &'a EntityId, amount: Decimal) -> BalanceFuture<'a, ()> {
        self.run(StoreOperation::Set, |state| {
            if state.lost_writes > 0 {
                state.lost_writes -= 1;
                return;
            }
            state.staged.insert(entity_id.clone(), amount);
        })
    }

    fn staged<'a>(&'a self, entity_id: &'a EntityId) -> BalanceFuture<'a, Option<Decimal>> {
        self.run(StoreOperation::Staged, |state| {
            state.staged.get(entity_id).copied()
        })
    }

    fn commit<'a>(&'a self, entity_id: &'a EntityId) -> BalanceFuture<'a, ()> {
        self.run(StoreOperation::Commit, |state| {
            if let Some(amount) = state.staged.remove(entity_id) {
                state.committed.insert(entity_id.clone(), amount);
            }
        })
    }

    fn discard<'a>(&'a self, entity_id: &'a EntityId) -> BalanceFuture<'a, ()> {
        self.run(StoreOperation::Discard, |state| {
            state.staged.remove(entity_id);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_commit_moves_staged_value() {
        let store = InMemoryBalanceStore::new();
        let id = EntityId::from("acct-1");

        assert_ok!(store.set(&id, Decimal::from(5)).await);
        assert_eq!(assert_ok!(store.staged(&id).await), Some(Decimal::from(5)));
        assert_eq!(assert_ok!(store.get(&id).await), None);

        assert_ok!(store.commit(&id).await);
        assert_eq!(assert_ok!(store.get(&id).await), Some(Decimal::from(5)));
        assert_eq!(store.staged_value(&id), None);
    }

    #[tokio::test]
    async fn test_commit_without_staged_value_is_noop() {
        let store = InMemoryBalanceStore::new().with_balance("acct-1", Decimal::from(7));
        let id = EntityId::from("acct-1");

        assert_ok!(store.commit(&id).await);
        assert_eq!(store.committed(&id), Some(Decimal::from(7)));
    }

    #[tokio::test]
    async fn test_discard_drops_staged_value() {
        let store = InMemoryBalanceStore::new();
        let id = EntityId::from("acct-1");

        assert_ok!(store.set(&id, Decimal::from(5)).await);
        assert_ok!(store.discard(&id).await);
        assert_ok!(store.commit(&id).await);

        assert_eq!(store.committed(&id), None);
    }

    #[tokio::test]
    async fn test_faults_are_consumed_per_call() {
        let store = InMemoryBalanceStore::new();
        let id = EntityId::from("acct-1");
        store.fail_next(StoreOperation::Get, 2);

        assert_err!(store.get(&id).await);
        assert_err!(store.get(&id).await);
        assert_ok!(store.get(&id).await);
        assert_eq!(store.calls(StoreOperation::Get), 3);
    }

    #[tokio::test]
    async fn test_lost_write_leaves_nothing_staged() {
        let store = InMemoryBalanceStore::new();
        let id = EntityId::from("acct-1");
        store.lose_next_writes(1);

        assert_ok!(store.set(&id, Decimal::from(5)).await);
        assert_eq!(assert_ok!(store.staged(&id).await), None);
    }
}
