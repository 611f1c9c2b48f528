//! The immutable fact emitted for every completed transaction.
//!
//! A [`TransactionRecord`] is built only after a request has passed validation and
//! the funds check. Its `id` comes from the injected
//! [`IdGenerator`](crate::environment::IdGenerator) and is generated per emission
//! attempt, and so is its `timestamp`. A retried publish therefore produces a record
//! whose `id` and `timestamp` both differ from the failed attempt, and no field of
//! the record identifies one logical transaction across retries. Consumers see
//! at-least-once delivery with possible duplicates.
//!
//! # Wire format
//!
//! ```json
//! {
//!   "id": "6f1c...",
//!   "accountId": "acct-1",
//!   "amount": 100.0,
//!   "type": "DEPOSIT",
//!   "status": "completed",
//!   "description": "Transaction completed",
//!   "timestamp": "2025-01-01T00:00:00Z",
//!   "schemaVersion": 1
//! }
//! ```

use crate::account::{EntityId, TransactionRequest, TransactionType};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status written on every emitted record.
pub const STATUS_COMPLETED: &str = "completed";

/// Description written on every emitted record.
pub const DESCRIPTION_COMPLETED: &str = "Transaction completed";

/// Current record schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// One completed deposit or withdrawal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    /// Fresh per emission attempt.
    pub id: Uuid,
    /// Entity the transaction applies to.
    pub account_id: String,
    /// Transaction amount (always positive).
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    /// Deposit or withdrawal.
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    /// Always [`STATUS_COMPLETED`] for emitted records.
    pub status: String,
    /// Human-readable description.
    pub description: String,
    /// When the record was built.
    pub timestamp: DateTime<Utc>,
    /// Schema version of this payload.
    pub schema_version: u32,
}

impl TransactionRecord {
    /// Builds the completed-transaction record for `request` on `entity_id`.
    #[must_use]
    pub fn completed(
        id: Uuid,
        entity_id: &EntityId,
        request: &TransactionRequest,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            account_id: entity_id.to_string(),
            amount: request.amount,
            transaction_type: request.transaction_type,
            status: STATUS_COMPLETED.to_string(),
            description: DESCRIPTION_COMPLETED.to_string(),
            timestamp,
            schema_version: SCHEMA_VERSION,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn deposit_record() -> TransactionRecord {
        let request =
            TransactionRequest::new(TransactionType::Deposit, Decimal::from(100)).unwrap();
        TransactionRecord::completed(
            Uuid::from_u128(7),
            &EntityId::from("acct-1"),
            &request,
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn completed_record_carries_request_fields() {
        let record = deposit_record();
        assert_eq!(record.account_id, "acct-1");
        assert_eq!(record.amount, Decimal::from(100));
        assert_eq!(record.transaction_type, TransactionType::Deposit);
        assert_eq!(record.status, "completed");
        assert_eq!(record.schema_version, 1);
    }

    #[test]
    fn json_uses_camel_case_and_numeric_amount() {
        let json: serde_json::Value = serde_json::to_value(deposit_record()).unwrap();
        assert_eq!(json["accountId"], "acct-1");
        assert_eq!(json["type"], "DEPOSIT");
        assert_eq!(json["amount"], 100.0);
        assert_eq!(json["schemaVersion"], 1);
        assert_eq!(json["description"], "Transaction completed");
        assert!(json.get("account_id").is_none());
    }
}
