//! CloudEvents envelope used on the event stream.
//!
//! Downstream projections subscribe to the `transactions` topic and filter on
//! `type == "transaction.v1"`. Every [`TransactionRecord`] is therefore wrapped in a
//! [`CloudEvent`] before it leaves the process. The envelope id is independent of the
//! record id and is also fresh per publish.

use crate::record::TransactionRecord;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// CloudEvents `type` attribute for transaction records.
pub const TRANSACTION_EVENT_TYPE: &str = "transaction.v1";

/// CloudEvents spec version written on every envelope.
pub const CLOUD_EVENTS_SPEC_VERSION: &str = "1.0";

/// Content type of the envelope payload.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Content type of the envelope itself.
pub const CLOUD_EVENT_CONTENT_TYPE: &str = "application/cloudevents+json";

/// Default `source` attribute.
pub const DEFAULT_SOURCE: &str = "bankaccount";

/// Errors while building or opening an envelope.
#[derive(Error, Debug)]
pub enum EnvelopeError {
    /// Envelope JSON was malformed.
    #[error("Invalid envelope: {0}")]
    Invalid(#[from] serde_json::Error),

    /// Envelope carried an event type other than [`TRANSACTION_EVENT_TYPE`].
    #[error("Unexpected event type: {0}")]
    UnexpectedType(String),
}

/// Structured-mode CloudEvent carrying one transaction record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudEvent {
    /// Envelope id.
    pub id: Uuid,
    /// Producer identity.
    pub source: String,
    /// Always [`TRANSACTION_EVENT_TYPE`] for records produced here.
    #[serde(rename = "type")]
    pub event_type: String,
    /// CloudEvents spec version.
    pub specversion: String,
    /// Content type of `data`.
    pub datacontenttype: String,
    /// The transaction record.
    pub data: TransactionRecord,
}

impl CloudEvent {
    /// Wraps `record` in a fresh envelope.
    #[must_use]
    pub fn for_record(id: Uuid, source: impl Into<String>, record: TransactionRecord) -> Self {
        Self {
            id,
            source: source.into(),
            event_type: TRANSACTION_EVENT_TYPE.to_string(),
            specversion: CLOUD_EVENTS_SPEC_VERSION.to_string(),
            datacontenttype: JSON_CONTENT_TYPE.to_string(),
            data: record,
        }
    }

    /// Serializes the envelope to JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Invalid`] if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, EnvelopeError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parses an envelope and checks its event type.
    ///
    /// # Errors
    ///
    /// - [`EnvelopeError::Invalid`] for malformed JSON
    /// - [`EnvelopeError::UnexpectedType`] for a foreign event type
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        let event: Self = serde_json::from_slice(bytes)?;
        if event.event_type != TRANSACTION_EVENT_TYPE {
            return Err(EnvelopeError::UnexpectedType(event.event_type));
        }
        Ok(event)
    }
}
