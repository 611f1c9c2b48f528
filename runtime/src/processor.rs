//! The transaction processor: validate, load, compute, emit, persist.
//!
//! A [`TransactionProcessor`] handles one call for one entity at a time. It holds no
//! balance of its own; every call re-reads the committed balance from the
//! [`BalanceStore`], so an entity can be deactivated and reactivated at any point
//! between calls without losing anything.
//!
//! # Ordering of emission and persistence
//!
//! Emission and persistence cannot be made atomic across two independent systems, so
//! their order is an explicit [`EmissionOrder`]:
//!
//! - [`EmissionOrder::EmitThenPersist`] (default): the event reflects intended
//!   completion. If persistence then fails, the stream holds a record the durable
//!   balance does not reflect (phantom event). The result says so.
//! - [`EmissionOrder::PersistThenEmit`]: the balance is durable first. If emission then
//!   fails, downstream consumers never hear about a transaction that did happen (lost
//!   event). The result says so.
//!
//! Either way a retried emission builds a new record with a new id.
//!
//! # Example
//!
//! ```ignore
//! let env = AccountEnvironment::new(Arc::new(store), Arc::new(emitter));
//! let processor = TransactionProcessor::new(env, ProcessorConfig::default());
//!
//! let result = processor
//!     .process(&EntityId::from("acct-1"), TransactionDetails::deposit(100.0))
//!     .await;
//! assert!(result.is_success());
//! ```

use crate::metrics::TransactionMetrics;
use crate::retry::{RetryError, RetryPolicy, retry_with_fixed_delay};
use account_entity_core::account::{
    AccountBalance, BalanceError, EntityId, TransactionDetails, TransactionRequest, ValidationError,
};
use account_entity_core::balance_store::{BalanceStore, BalanceStoreError};
use account_entity_core::environment::{Clock, IdGenerator, SystemClock, UuidGenerator};
use account_entity_core::event_emitter::{EventEmitter, EventEmitterError};
use account_entity_core::outcome::{TransactionError, TransactionResult};
use account_entity_core::record::TransactionRecord;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;
use uuid::Uuid;

/// Which side effect happens first once the new balance is known.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmissionOrder {
    /// Publish the record, then commit the balance.
    #[default]
    EmitThenPersist,
    /// Commit the balance, then publish the record.
    PersistThenEmit,
}

impl EmissionOrder {
    /// Configuration spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EmitThenPersist => "emit-then-persist",
            Self::PersistThenEmit => "persist-then-emit",
        }
    }
}

impl fmt::Display for EmissionOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmissionOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "emit-then-persist" => Ok(Self::EmitThenPersist),
            "persist-then-emit" => Ok(Self::PersistThenEmit),
            other => Err(format!(
                "unknown emission order '{other}' (expected emit-then-persist or persist-then-emit)"
            )),
        }
    }
}

/// Processor settings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProcessorConfig {
    /// Policy shared by balance loads, persistence and emission.
    pub retry: RetryPolicy,
    /// Order of emission and persistence.
    pub order: EmissionOrder,
}

impl ProcessorConfig {
    /// Set the retry policy.
    #[must_use]
    pub const fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the emission order.
    #[must_use]
    pub const fn with_order(mut self, order: EmissionOrder) -> Self {
        self.order = order;
        self
    }
}

/// Environment dependencies for the processor
#[derive(Clone)]
pub struct AccountEnvironment {
    /// Durable balances
    pub store: Arc<dyn BalanceStore>,
    /// Transaction event stream
    pub emitter: Arc<dyn EventEmitter>,
    /// Clock for record timestamps
    pub clock: Arc<dyn Clock>,
    /// Record id source
    pub ids: Arc<dyn IdGenerator>,
}

impl AccountEnvironment {
    /// Creates an environment with the system clock and random ids.
    #[must_use]
    pub fn new(store: Arc<dyn BalanceStore>, emitter: Arc<dyn EventEmitter>) -> Self {
        Self {
            store,
            emitter,
            clock: Arc::new(SystemClock),
            ids: Arc::new(UuidGenerator),
        }
    }

    /// Replace the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the id generator.
    #[must_use]
    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }
}

/// Applies deposits and withdrawals to one entity's durable balance.
///
/// The caller must not run two calls for the same entity concurrently; the
/// [`EntityHost`](crate::host::EntityHost) provides that guarantee.
#[derive(Clone)]
pub struct TransactionProcessor {
    env: AccountEnvironment,
    config: ProcessorConfig,
}

impl TransactionProcessor {
    /// Creates a processor.
    #[must_use]
    pub const fn new(env: AccountEnvironment, config: ProcessorConfig) -> Self {
        Self { env, config }
    }

    /// Processor settings.
    #[must_use]
    pub const fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Validates and applies a raw transaction payload.
    ///
    /// Never fails: every outcome, including infrastructure failures after retries,
    /// is reported in the returned [`TransactionResult`].
    pub async fn process(
        &self,
        entity_id: &EntityId,
        details: TransactionDetails,
    ) -> TransactionResult {
        let span = tracing::info_span!(
            "transaction",
            entity_id = %entity_id,
            r#type = %details.kind,
            amount = details.amount,
            order = %self.config.order,
        );

        async move {
            let request = entity_id
                .validate()
                .and_then(|()| TransactionRequest::try_from(details));

            match request {
                Ok(request) => self.apply(entity_id, &request).await,
                Err(reason) => reject(entity_id, reason),
            }
        }
        .instrument(span)
        .await
    }

    /// Applies an already validated request.
    pub async fn process_request(
        &self,
        entity_id: &EntityId,
        request: TransactionRequest,
    ) -> TransactionResult {
        let span = tracing::info_span!(
            "transaction",
            entity_id = %entity_id,
            r#type = %request.transaction_type,
            amount = %request.amount,
            order = %self.config.order,
        );

        async move {
            match entity_id.validate() {
                Ok(()) => self.apply(entity_id, &request).await,
                Err(reason) => reject(entity_id, reason),
            }
        }
        .instrument(span)
        .await
    }

    async fn apply(&self, entity_id: &EntityId, request: &TransactionRequest) -> TransactionResult {
        let started = Instant::now();
        let result = self.execute(entity_id, request).await;
        TransactionMetrics::record(result.status, started.elapsed());

        match &result.error {
            None => tracing::info!(balance = ?result.balance, "Transaction completed"),
            Some(error) if error.is_inconsistent() => tracing::error!(
                error = %error,
                balance = ?result.balance,
                record_id = ?result.record_id,
                "Event stream and durable balance disagree"
            ),
            Some(error) => {
                tracing::warn!(status = %result.status, error = %error, "Transaction not applied");
            }
        }

        result
    }

    async fn execute(
        &self,
        entity_id: &EntityId,
        request: &TransactionRequest,
    ) -> TransactionResult {
        let current = match self.load_balance(entity_id).await {
            Ok(balance) => balance.amount,
            Err(err) => {
                let error = TransactionError::PersistenceFailed {
                    attempts: err.attempts,
                    reason: err.last_error.to_string(),
                    event_emitted: false,
                };
                return TransactionResult::failed(entity_id.clone(), error, None, None);
            }
        };
        tracing::debug!(balance = %current, "Loaded balance");

        let new_balance = match request.apply_to(current) {
            Ok(balance) => balance,
            Err(BalanceError::InsufficientFunds { balance, requested }) => {
                let error = TransactionError::InsufficientFunds { balance, requested };
                return TransactionResult::failed(entity_id.clone(), error, Some(current), None);
            }
            Err(BalanceError::Overflow) => {
                let error = TransactionError::ValidationFailed(ValidationError::AmountOverflow);
                return TransactionResult::failed(entity_id.clone(), error, Some(current), None);
            }
        };

        match self.config.order {
            EmissionOrder::EmitThenPersist => {
                let record_id = match self.emit(entity_id, request).await {
                    Ok(record_id) => record_id,
                    Err(err) => {
                        let error = TransactionError::EventPublishFailed {
                            attempts: err.attempts,
                            reason: err.last_error.to_string(),
                            balance_persisted: false,
                        };
                        return TransactionResult::failed(
                            entity_id.clone(),
                            error,
                            Some(current),
                            None,
                        );
                    }
                };

                if let Err(err) = self.persist(entity_id, new_balance).await {
                    let error = TransactionError::PersistenceFailed {
                        attempts: err.attempts,
                        reason: err.last_error.to_string(),
                        event_emitted: true,
                    };
                    return TransactionResult::failed(
                        entity_id.clone(),
                        error,
                        Some(current),
                        Some(record_id),
                    );
                }

                TransactionResult::completed(entity_id.clone(), new_balance, record_id)
            }
            EmissionOrder::PersistThenEmit => {
                if let Err(err) = self.persist(entity_id, new_balance).await {
                    let error = TransactionError::PersistenceFailed {
                        attempts: err.attempts,
                        reason: err.last_error.to_string(),
                        event_emitted: false,
                    };
                    return TransactionResult::failed(entity_id.clone(), error, Some(current), None);
                }

                match self.emit(entity_id, request).await {
                    Ok(record_id) => {
                        TransactionResult::completed(entity_id.clone(), new_balance, record_id)
                    }
                    Err(err) => {
                        let error = TransactionError::EventPublishFailed {
                            attempts: err.attempts,
                            reason: err.last_error.to_string(),
                            balance_persisted: true,
                        };
                        TransactionResult::failed(entity_id.clone(), error, Some(new_balance), None)
                    }
                }
            }
        }
    }

    async fn load_balance(
        &self,
        entity_id: &EntityId,
    ) -> Result<AccountBalance, RetryError<BalanceStoreError>> {
        let store = &self.env.store;
        let stored = retry_with_fixed_delay(&self.config.retry, "load_balance", || {
            store.get(entity_id)
        })
        .await?;
        Ok(AccountBalance::from_stored(entity_id.clone(), stored))
    }

    /// Publishes a completed record, building a fresh one (new id, new timestamp) per attempt.
    async fn emit(
        &self,
        entity_id: &EntityId,
        request: &TransactionRequest,
    ) -> Result<Uuid, RetryError<EventEmitterError>> {
        let env = &self.env;
        retry_with_fixed_delay(&self.config.retry, "emit_event", || {
            let id = env.ids.next_id();
            let record = TransactionRecord::completed(id, entity_id, request, env.clock.now());
            async move {
                env.emitter.publish(&record).await?;
                tracing::debug!(
                    record_id = %record.id,
                    topic = %env.emitter.destination().topic,
                    "Published transaction"
                );
                Ok::<_, EventEmitterError>(record.id)
            }
        })
        .await
    }

    /// Stages, verifies and commits `amount`. Discards the staged value if every attempt fails.
    async fn persist(
        &self,
        entity_id: &EntityId,
        amount: Decimal,
    ) -> Result<(), RetryError<BalanceStoreError>> {
        let store = &self.env.store;
        let result = retry_with_fixed_delay(&self.config.retry, "persist_balance", || async move {
            store.set(entity_id, amount).await?;

            let staged = store.staged(entity_id).await?;
            if staged != Some(amount) {
                return Err(BalanceStoreError::StagedMismatch {
                    entity_id: entity_id.clone(),
                    expected: amount,
                    found: staged,
                });
            }

            store.commit(entity_id).await
        })
        .await;

        if result.is_err() {
            if let Err(e) = store.discard(entity_id).await {
                tracing::warn!(
                    entity_id = %entity_id,
                    error = %e,
                    "Failed to discard staged balance"
                );
            }
        }

        result
    }
}

/// Reports a payload that failed validation. Nothing was read or written.
fn reject(entity_id: &EntityId, reason: ValidationError) -> TransactionResult {
    tracing::warn!(error = %reason, "Rejected transaction");
    let result = TransactionResult::failed(entity_id.clone(), reason.into(), None, None);
    TransactionMetrics::record(result.status, Duration::ZERO);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emission_order_parses_config_spelling() {
        assert_eq!("emit-then-persist".parse(), Ok(EmissionOrder::EmitThenPersist));
        assert_eq!("persist-then-emit".parse(), Ok(EmissionOrder::PersistThenEmit));
        assert!("both".parse::<EmissionOrder>().is_err());
    }

    #[test]
    fn default_order_emits_first() {
        let config = ProcessorConfig::default();
        assert_eq!(config.order, EmissionOrder::EmitThenPersist);
        assert_eq!(config.retry, RetryPolicy::default());
    }
}
