//! # Account Entity Testing
//!
//! Testing utilities and helpers for the bank-account entity.
//!
//! This crate provides:
//! - In-memory [`BalanceStore`](account_entity_core::BalanceStore) and
//!   [`EventEmitter`](account_entity_core::EventEmitter) with fault injection
//! - Deterministic clock and id generator
//! - proptest strategies for transaction payloads
//!
//! ## Example
//!
//! ```ignore
//! use account_entity_testing::{InMemoryBalanceStore, InMemoryEventEmitter, SequentialIdGenerator, test_clock};
//!
//! #[tokio::test]
//! async fn test_deposit() {
//!     let store = InMemoryBalanceStore::new();
//!     let emitter = InMemoryEventEmitter::new();
//!     let env = AccountEnvironment::new(Arc::new(store.clone()), Arc::new(emitter.clone()))
//!         .with_clock(Arc::new(test_clock()))
//!         .with_id_generator(Arc::new(SequentialIdGenerator::new()));
//!
//!     let processor = TransactionProcessor::new(env, ProcessorConfig::default());
//!     let result = processor.process(&"acct-1".into(), TransactionDetails::deposit(100.0)).await;
//!
//!     assert!(result.is_success());
//!     assert_eq!(emitter.published_count(), 1);
//! }
//! ```

use account_entity_core::environment::{Clock, IdGenerator};
use chrono::{DateTime, Utc};
use uuid::Uuid;

mod balance_store_mocks;
mod event_emitter_mocks;

pub use balance_store_mocks::{InMemoryBalanceStore, StoreOperation};
pub use event_emitter_mocks::InMemoryEventEmitter;

/// Deterministic implementations of environment traits.
pub mod mocks {
    use super::{Clock, DateTime, IdGenerator, Utc, Uuid};
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use account_entity_testing::mocks::FixedClock;
    /// use account_entity_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone, Copy)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }

        /// The fixed time.
        #[must_use]
        pub const fn time(&self) -> DateTime<Utc> {
            self.time
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(DateTime::from_timestamp(1_735_689_600, 0).unwrap_or_default())
    }

    /// Ids `00000000-0000-0000-0000-000000000001`, `...02`, and so on.
    #[derive(Debug, Default)]
    pub struct SequentialIdGenerator {
        next: AtomicU64,
    }

    impl SequentialIdGenerator {
        /// Create a generator starting at 1.
        #[must_use]
        pub const fn new() -> Self {
            Self {
                next: AtomicU64::new(0),
            }
        }

        /// Number of ids handed out so far.
        #[must_use]
        pub fn issued(&self) -> u64 {
            self.next.load(Ordering::SeqCst)
        }
    }

    impl IdGenerator for SequentialIdGenerator {
        fn next_id(&self) -> Uuid {
            let n = self.next.fetch_add(1, Ordering::SeqCst) + 1;
            Uuid::from_u128(u128::from(n))
        }
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use account_entity_core::account::{EntityId, TransactionDetails};
    use proptest::prelude::*;

    /// Positive amounts with at most two decimal places, up to one million.
    pub fn positive_amount() -> impl Strategy<Value = f64> {
        (1u32..100_000_000).prop_map(|cents| f64::from(cents) / 100.0)
    }

    /// Zero and negative amounts.
    pub fn non_positive_amount() -> impl Strategy<Value = f64> {
        prop_oneof![
            Just(0.0),
            Just(-0.0),
            (1u32..100_000_000).prop_map(|cents| -f64::from(cents) / 100.0),
        ]
    }

    /// Strings that are not a known transaction type.
    pub fn unknown_transaction_type() -> impl Strategy<Value = String> {
        "[A-Za-z_]{0,12}".prop_filter("known transaction type", |s| {
            s != "DEPOSIT" && s != "WITHDRAWAL"
        })
    }

    /// Valid deposits and withdrawals.
    pub fn transaction_details() -> impl Strategy<Value = TransactionDetails> {
        (any::<bool>(), positive_amount()).prop_map(|(deposit, amount)| {
            if deposit {
                TransactionDetails::deposit(amount)
            } else {
                TransactionDetails::withdrawal(amount)
            }
        })
    }

    /// Entity ids of the form `acct-<n>`.
    pub fn entity_id() -> impl Strategy<Value = EntityId> {
        (0u16..1000).prop_map(|n| EntityId::new(format!("acct-{n}")))
    }
}

/// Install a `tracing` subscriber that writes through the test harness.
///
/// Honours `RUST_LOG`; safe to call from every test.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use mocks::{FixedClock, SequentialIdGenerator, test_clock};
