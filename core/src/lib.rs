//! # Account Entity Core
//!
//! Core types and boundary traits for the bank-account entity.
//!
//! One entity owns one balance. It receives serialized deposit and withdrawal requests,
//! validates them, applies them, persists the new balance and emits a transaction
//! record to the event stream. This crate holds everything that needs no I/O:
//!
//! - **Account types**: [`EntityId`], [`TransactionDetails`], [`TransactionRequest`], [`AccountBalance`]
//! - **Records**: [`TransactionRecord`] and its [`CloudEvent`] envelope
//! - **Boundaries**: [`BalanceStore`] and [`EventEmitter`] traits
//! - **Results**: [`TransactionResult`], [`TransactionStatus`], [`TransactionError`]
//! - **Environment**: [`Clock`](environment::Clock) and [`IdGenerator`](environment::IdGenerator)
//!
//! The processing itself (retry, ordering of emission and persistence, per-entity
//! serialization) lives in `account-entity-runtime`.
//!
//! ## Architecture Principles
//!
//! - Result-as-value: every failure is a tagged variant returned to the caller
//! - Dependency injection: stores, emitters, time and ids are traits
//! - No authoritative in-memory state: balances are always re-read from the store

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;

/// Entity ids, inbound payloads and validation
pub mod account;

/// Durable balance storage boundary
pub mod balance_store;

/// CloudEvents envelope for transaction records
pub mod event;

/// Event stream boundary
pub mod event_emitter;

/// Transaction results and error taxonomy
pub mod outcome;

/// Completed-transaction records
pub mod record;

pub use account::{
    AccountBalance, BalanceError, EntityId, TransactionDetails, TransactionRequest,
    TransactionType, ValidationError,
};
pub use balance_store::{BalanceStore, BalanceStoreError};
pub use event::CloudEvent;
pub use event_emitter::{EventDestination, EventEmitter, EventEmitterError};
pub use outcome::{TransactionError, TransactionResult, TransactionStatus};
pub use record::TransactionRecord;

/// Environment module - Dependency injection traits
///
/// Time and identifiers are injected so that records are reproducible in tests and
/// balance arithmetic never depends on the wall clock.
pub mod environment {
    use chrono::{DateTime, Utc};
    use uuid::Uuid;

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use account_entity_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let _now = clock.now();
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    /// Source of record and envelope ids.
    pub trait IdGenerator: Send + Sync {
        /// Next id; never repeats within a process.
        fn next_id(&self) -> Uuid;
    }

    /// Random v4 UUIDs.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct UuidGenerator;

    impl IdGenerator for UuidGenerator {
        fn next_id(&self) -> Uuid {
            Uuid::new_v4()
        }
    }
}
