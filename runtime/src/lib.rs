//! # Account Entity Runtime
//!
//! Runtime for the bank-account entity.
//!
//! This crate turns the types and boundaries of `account-entity-core` into a running
//! system: it applies transactions against a [`BalanceStore`](account_entity_core::BalanceStore),
//! publishes records through an [`EventEmitter`](account_entity_core::EventEmitter), and
//! hosts one serialized worker per entity id.
//!
//! ## Core Components
//!
//! - **Processor**: validate, load, compute, emit and persist one transaction
//! - **Host**: lazy per-entity activation, bounded mailboxes, idle deactivation
//! - **Retry**: fixed-delay retry shared by loads, persistence and emission
//! - **Config**: `BANK_ACCOUNT_*` environment configuration
//! - **Metrics**: Prometheus counters and histograms
//!
//! ## Example
//!
//! ```ignore
//! use account_entity_runtime::{AccountEnvironment, EntityHost, HostConfig, ProcessorConfig, TransactionProcessor};
//! use account_entity_core::TransactionDetails;
//!
//! let env = AccountEnvironment::new(store, emitter);
//! let host = EntityHost::new(
//!     TransactionProcessor::new(env, ProcessorConfig::default()),
//!     HostConfig::default(),
//! );
//!
//! let message = host.transaction("acct-1", TransactionDetails::deposit(100.0)).await;
//! ```

/// Environment-based configuration
pub mod config;

/// Per-entity task hosting
pub mod host;

/// Prometheus metrics for observability
pub mod metrics;

/// Transaction processing
pub mod processor;

/// Fixed-delay retry
pub mod retry;

pub use config::{AppConfig, ConfigError};
pub use host::{EntityHost, HostConfig, HostError};
pub use processor::{AccountEnvironment, EmissionOrder, ProcessorConfig, TransactionProcessor};
pub use retry::{RetryError, RetryPolicy, retry_with_fixed_delay};
