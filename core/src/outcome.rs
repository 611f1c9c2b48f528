//! Transaction results and the failure taxonomy.
//!
//! Every call to the processor answers with a [`TransactionResult`]. Failures never
//! escape as faults: each is a [`TransactionError`] variant carried inside the result,
//! along with the balance as far as it is known and a caller-facing message.
//!
//! | Error | State change | Event emitted |
//! |-------|--------------|---------------|
//! | `ValidationFailed` | none | no |
//! | `InsufficientFunds` | none | no |
//! | `EventPublishFailed` | only if `balance_persisted` | no |
//! | `PersistenceFailed` | none | only if `event_emitted` |

use crate::account::{EntityId, ValidationError};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Why a transaction did not complete.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    /// Bad input; nothing was touched.
    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),

    /// Withdrawal larger than the balance; nothing was touched.
    #[error("Insufficient funds: balance {balance} < requested {requested}")]
    InsufficientFunds {
        /// Balance at the time of the request.
        balance: Decimal,
        /// Amount requested.
        requested: Decimal,
    },

    /// The event could not be published after all attempts.
    #[error("Event publish failed after {attempts} attempts: {reason}")]
    EventPublishFailed {
        /// Attempts made.
        attempts: u32,
        /// Last error.
        reason: String,
        /// The new balance was already committed (persist-then-emit ordering).
        balance_persisted: bool,
    },

    /// The balance could not be read or persisted after all attempts.
    #[error("Persistence failed after {attempts} attempts: {reason}")]
    PersistenceFailed {
        /// Attempts made.
        attempts: u32,
        /// Last error.
        reason: String,
        /// A record for this transaction was already published (emit-then-persist ordering).
        event_emitted: bool,
    },
}

impl TransactionError {
    /// Status label for this error.
    #[must_use]
    pub const fn status(&self) -> TransactionStatus {
        match self {
            Self::ValidationFailed(_) => TransactionStatus::ValidationFailed,
            Self::InsufficientFunds { .. } => TransactionStatus::InsufficientFunds,
            Self::EventPublishFailed { .. } => TransactionStatus::EventPublishFailed,
            Self::PersistenceFailed { .. } => TransactionStatus::PersistenceFailed,
        }
    }

    /// Whether the event stream and the durable balance may now disagree.
    #[must_use]
    pub const fn is_inconsistent(&self) -> bool {
        matches!(
            self,
            Self::EventPublishFailed {
                balance_persisted: true,
                ..
            } | Self::PersistenceFailed {
                event_emitted: true,
                ..
            }
        )
    }

    /// Caller-facing message.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::ValidationFailed(reason) => reason.summary().to_string(),
            Self::InsufficientFunds { .. } => "Insufficient funds".to_string(),
            Self::EventPublishFailed {
                balance_persisted: false,
                ..
            } => "Error publishing transaction".to_string(),
            Self::EventPublishFailed {
                balance_persisted: true,
                ..
            } => "Balance updated but error publishing transaction: the event stream does not \
                  reflect this transaction"
                .to_string(),
            Self::PersistenceFailed {
                event_emitted: false,
                ..
            } => "Error saving balance".to_string(),
            Self::PersistenceFailed {
                event_emitted: true,
                ..
            } => "Transaction event published but balance not saved: durable balance unchanged"
                .to_string(),
        }
    }
}

/// Outcome label of a transaction call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Event emitted and balance committed.
    Success,
    /// See [`TransactionError::ValidationFailed`].
    ValidationFailed,
    /// See [`TransactionError::InsufficientFunds`].
    InsufficientFunds,
    /// See [`TransactionError::EventPublishFailed`].
    EventPublishFailed,
    /// See [`TransactionError::PersistenceFailed`].
    PersistenceFailed,
}

impl TransactionStatus {
    /// Stable label, used for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::ValidationFailed => "validation_failed",
            Self::InsufficientFunds => "insufficient_funds",
            Self::EventPublishFailed => "event_publish_failed",
            Self::PersistenceFailed => "persistence_failed",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Answer to one transaction call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionResult {
    /// Entity the call targeted.
    pub entity_id: EntityId,
    /// Outcome label.
    pub status: TransactionStatus,
    /// Durable balance after the call, when known.
    pub balance: Option<Decimal>,
    /// Caller-facing message.
    pub message: String,
    /// Id of the last record published for this call, if any.
    pub record_id: Option<Uuid>,
    /// Failure details; `None` on success.
    pub error: Option<TransactionError>,
}

impl TransactionResult {
    /// Message returned for a completed transaction.
    pub const SUCCESS_MESSAGE: &'static str = "Transaction successful";

    /// A completed transaction.
    #[must_use]
    pub fn completed(entity_id: EntityId, balance: Decimal, record_id: Uuid) -> Self {
        Self {
            entity_id,
            status: TransactionStatus::Success,
            balance: Some(balance),
            message: Self::SUCCESS_MESSAGE.to_string(),
            record_id: Some(record_id),
            error: None,
        }
    }

    /// A failed transaction.
    #[must_use]
    pub fn failed(
        entity_id: EntityId,
        error: TransactionError,
        balance: Option<Decimal>,
        record_id: Option<Uuid>,
    ) -> Self {
        Self {
            entity_id,
            status: error.status(),
            balance,
            message: error.message(),
            record_id,
            error: Some(error),
        }
    }

    /// Whether the transaction completed.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.status, TransactionStatus::Success)
    }
}

impl fmt::Display for TransactionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}
