//! Account identity, inbound transaction payloads and their validation.
//!
//! The host hands the entity a raw [`TransactionDetails`] payload. Nothing downstream
//! of validation ever sees that raw form: [`TransactionRequest`] can only be built
//! through [`TransactionRequest::try_from`] or [`TransactionRequest::new`], both of
//! which enforce the input constraints (finite, strictly positive amount and a known
//! transaction type).
//!
//! # Example
//!
//! ```
//! use account_entity_core::account::{TransactionDetails, TransactionRequest, TransactionType};
//!
//! let details = TransactionDetails::new("DEPOSIT", 100.0);
//! let request = TransactionRequest::try_from(details).unwrap();
//! assert_eq!(request.transaction_type, TransactionType::Deposit);
//!
//! let invalid = TransactionDetails::new("TRANSFER", 100.0);
//! assert!(TransactionRequest::try_from(invalid).is_err());
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Identifier of one bank-account entity.
///
/// The host assigns entity ids; this crate treats them as opaque, non-empty strings.
/// [`EntityId::parse`] enforces the non-empty rule; `new` and the `From` impls do not,
/// so ids built that way are checked with [`EntityId::validate`] before use.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Creates a new `EntityId`.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Creates an `EntityId`, rejecting an empty id.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyEntityId`] if `id` is empty.
    pub fn parse(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = Self(id.into());
        id.validate()?;
        Ok(id)
    }

    /// Checks the id is usable as an entity key.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyEntityId`] if the id is empty.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.0.is_empty() {
            return Err(ValidationError::EmptyEntityId);
        }
        Ok(())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Kind of balance movement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    /// Adds the amount to the balance.
    Deposit,
    /// Subtracts the amount from the balance if funds allow.
    Withdrawal,
}

impl TransactionType {
    /// Wire name of the type (`"DEPOSIT"` or `"WITHDRAWAL"`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Deposit => "DEPOSIT",
            Self::Withdrawal => "WITHDRAWAL",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEPOSIT" => Ok(Self::Deposit),
            "WITHDRAWAL" => Ok(Self::Withdrawal),
            other => Err(ValidationError::InvalidType(other.to_string())),
        }
    }
}

/// Reasons a transaction request is rejected before touching any state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Amount was zero or negative.
    #[error("Invalid amount: {0} must be greater than zero")]
    NonPositiveAmount(String),

    /// Amount was NaN or infinite.
    #[error("Invalid amount: amount must be a finite number")]
    NonFiniteAmount,

    /// Amount is finite but outside the decimal range.
    #[error("Invalid amount: {0} cannot be represented as a decimal")]
    UnrepresentableAmount(String),

    /// Type was neither `DEPOSIT` nor `WITHDRAWAL`.
    #[error("Invalid transaction type: {0}")]
    InvalidType(String),

    /// Applying the amount would overflow the balance.
    #[error("Invalid amount: resulting balance would overflow")]
    AmountOverflow,

    /// Entity id was empty.
    #[error("Invalid entity id: must not be empty")]
    EmptyEntityId,
}

impl ValidationError {
    /// Short caller-facing message for this violation.
    #[must_use]
    pub const fn summary(&self) -> &'static str {
        match self {
            Self::InvalidType(_) => "Invalid transaction type",
            Self::EmptyEntityId => "Invalid entity id",
            Self::NonPositiveAmount(_)
            | Self::NonFiniteAmount
            | Self::UnrepresentableAmount(_)
            | Self::AmountOverflow => "Invalid amount",
        }
    }
}

/// Raw transaction payload as delivered by the host.
///
/// Mirrors the actor method argument `{ "type": ..., "amount": ... }`. Values are
/// unchecked; convert into a [`TransactionRequest`] to validate them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransactionDetails {
    /// Requested transaction type, as sent by the caller.
    #[serde(rename = "type")]
    pub kind: String,
    /// Requested amount, as sent by the caller.
    pub amount: f64,
}

impl TransactionDetails {
    /// Creates a raw payload.
    #[must_use]
    pub fn new(kind: impl Into<String>, amount: f64) -> Self {
        Self {
            kind: kind.into(),
            amount,
        }
    }

    /// Shorthand for a deposit payload.
    #[must_use]
    pub fn deposit(amount: f64) -> Self {
        Self::new(TransactionType::Deposit.as_str(), amount)
    }

    /// Shorthand for a withdrawal payload.
    #[must_use]
    pub fn withdrawal(amount: f64) -> Self {
        Self::new(TransactionType::Withdrawal.as_str(), amount)
    }
}

/// A validated deposit or withdrawal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRequest {
    /// Deposit or withdrawal.
    pub transaction_type: TransactionType,
    /// Strictly positive amount.
    pub amount: Decimal,
}

impl TransactionRequest {
    /// Creates a request from an already-typed amount.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NonPositiveAmount`] if `amount <= 0`.
    pub fn new(
        transaction_type: TransactionType,
        amount: Decimal,
    ) -> Result<Self, ValidationError> {
        if amount <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveAmount(amount.to_string()));
        }

        Ok(Self {
            transaction_type,
            amount,
        })
    }

    /// Computes the balance that results from applying this request to `current`.
    ///
    /// Pure: the result depends only on `current` and the request.
    ///
    /// # Errors
    ///
    /// - [`BalanceError::InsufficientFunds`] if a withdrawal exceeds `current`
    /// - [`BalanceError::Overflow`] if a deposit overflows the decimal range
    pub fn apply_to(&self, current: Decimal) -> Result<Decimal, BalanceError> {
        match self.transaction_type {
            TransactionType::Deposit => current
                .checked_add(self.amount)
                .ok_or(BalanceError::Overflow),
            TransactionType::Withdrawal => {
                if current < self.amount {
                    return Err(BalanceError::InsufficientFunds {
                        balance: current,
                        requested: self.amount,
                    });
                }
                Ok(current - self.amount)
            }
        }
    }
}

impl TryFrom<TransactionDetails> for TransactionRequest {
    type Error = ValidationError;

    fn try_from(details: TransactionDetails) -> Result<Self, Self::Error> {
        // Amount before type.
        if !details.amount.is_finite() {
            return Err(ValidationError::NonFiniteAmount);
        }
        if details.amount <= 0.0 {
            return Err(ValidationError::NonPositiveAmount(details.amount.to_string()));
        }

        let transaction_type = details.kind.parse::<TransactionType>()?;
        let amount = Decimal::try_from(details.amount)
            .map_err(|_| ValidationError::UnrepresentableAmount(details.amount.to_string()))?;

        Self::new(transaction_type, amount)
    }
}

/// Why a validated request could not be applied to the current balance.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceError {
    /// Withdrawal larger than the current balance.
    #[error("Insufficient funds: balance {balance} < requested {requested}")]
    InsufficientFunds {
        /// Balance at the time of the request.
        balance: Decimal,
        /// Amount the caller asked to withdraw.
        requested: Decimal,
    },

    /// Deposit would exceed the representable range.
    #[error("Balance overflow")]
    Overflow,
}

/// Current balance of one entity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalance {
    /// Owning entity.
    pub entity_id: EntityId,
    /// Never negative.
    pub amount: Decimal,
}

impl AccountBalance {
    /// Creates a balance snapshot.
    #[must_use]
    pub const fn new(entity_id: EntityId, amount: Decimal) -> Self {
        Self { entity_id, amount }
    }

    /// Balance of an entity that has never been written.
    #[must_use]
    pub const fn zero(entity_id: EntityId) -> Self {
        Self {
            entity_id,
            amount: Decimal::ZERO,
        }
    }

    /// Builds a balance from a store lookup, treating absence as zero.
    #[must_use]
    pub fn from_stored(entity_id: EntityId, stored: Option<Decimal>) -> Self {
        Self {
            entity_id,
            amount: stored.unwrap_or(Decimal::ZERO),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_known_types_only() {
        assert_eq!("DEPOSIT".parse::<TransactionType>(), Ok(TransactionType::Deposit));
        assert_eq!(
            "WITHDRAWAL".parse::<TransactionType>(),
            Ok(TransactionType::Withdrawal)
        );
        assert_eq!(
            "deposit".parse::<TransactionType>(),
            Err(ValidationError::InvalidType("deposit".to_string()))
        );
    }

    #[test]
    fn entity_id_must_not_be_empty() {
        assert_eq!(EntityId::parse(""), Err(ValidationError::EmptyEntityId));
        assert_eq!(EntityId::from("").validate(), Err(ValidationError::EmptyEntityId));
        assert_eq!(EntityId::parse("acct-1"), Ok(EntityId::from("acct-1")));
        assert_eq!(ValidationError::EmptyEntityId.summary(), "Invalid entity id");
    }

    #[test]
    fn details_deserialize_from_wire_shape() {
        let details: TransactionDetails =
            serde_json::from_str(r#"{"type":"WITHDRAWAL","amount":40.5}"#).unwrap();
        assert_eq!(details, TransactionDetails::withdrawal(40.5));
    }

    #[test]
    fn rejects_non_positive_before_type() {
        let err = TransactionRequest::try_from(TransactionDetails::new("BOGUS", 0.0)).unwrap_err();
        assert!(matches!(err, ValidationError::NonPositiveAmount(_)));
    }

    #[test]
    fn rejects_non_finite_amounts() {
        for amount in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err =
                TransactionRequest::try_from(TransactionDetails::deposit(amount)).unwrap_err();
            assert_eq!(err, ValidationError::NonFiniteAmount);
        }
    }

    #[test]
    fn rejects_unknown_type() {
        let err =
            TransactionRequest::try_from(TransactionDetails::new("TRANSFER", 10.0)).unwrap_err();
        assert_eq!(err, ValidationError::InvalidType("TRANSFER".to_string()));
        assert_eq!(err.summary(), "Invalid transaction type");
    }

    #[test]
    fn converts_float_amount_to_decimal() {
        let request = TransactionRequest::try_from(TransactionDetails::deposit(100.25)).unwrap();
        assert_eq!(request.amount, Decimal::new(10025, 2));
    }

    #[test]
    fn withdrawal_of_exact_balance_leaves_zero() {
        let request =
            TransactionRequest::new(TransactionType::Withdrawal, Decimal::from(60)).unwrap();
        assert_eq!(request.apply_to(Decimal::from(60)), Ok(Decimal::ZERO));
    }

    #[test]
    fn withdrawal_beyond_balance_is_insufficient() {
        let request =
            TransactionRequest::new(TransactionType::Withdrawal, Decimal::from(150)).unwrap();
        assert_eq!(
            request.apply_to(Decimal::from(100)),
            Err(BalanceError::InsufficientFunds {
                balance: Decimal::from(100),
                requested: Decimal::from(150),
            })
        );
    }

    #[test]
    fn deposit_overflow_is_reported() {
        let request = TransactionRequest::new(TransactionType::Deposit, Decimal::MAX).unwrap();
        assert_eq!(request.apply_to(Decimal::ONE), Err(BalanceError::Overflow));
    }

    #[test]
    fn absent_balance_is_zero() {
        let balance = AccountBalance::from_stored(EntityId::from("acct-1"), None);
        assert_eq!(balance, AccountBalance::zero(EntityId::from("acct-1")));
    }

    proptest! {
        #[test]
        fn every_non_positive_amount_is_rejected(amount in -1.0e12f64..=0.0) {
            let result = TransactionRequest::try_from(TransactionDetails::deposit(amount));
            prop_assert!(matches!(result, Err(ValidationError::NonPositiveAmount(_))));
        }

        #[test]
        fn deposit_then_withdraw_restores_balance(
            start in 0i64..1_000_000,
            cents in 1i64..1_000_000,
        ) {
            let start = Decimal::new(start, 2);
            let amount = Decimal::new(cents, 2);
            let deposit = TransactionRequest::new(TransactionType::Deposit, amount).unwrap();
            let withdrawal = TransactionRequest::new(TransactionType::Withdrawal, amount).unwrap();

            let raised = deposit.apply_to(start).unwrap();
            prop_assert_eq!(raised, start + amount);
            prop_assert_eq!(withdrawal.apply_to(raised).unwrap(), start);
        }

        #[test]
        fn withdrawals_never_go_negative(start in 0i64..1_000_000, cents in 1i64..2_000_000) {
            let start = Decimal::new(start, 2);
            let amount = Decimal::new(cents, 2);
            let request = TransactionRequest::new(TransactionType::Withdrawal, amount).unwrap();
            if let Ok(next) = request.apply_to(start) {
                prop_assert!(next >= Decimal::ZERO);
            }
        }
    }
}
