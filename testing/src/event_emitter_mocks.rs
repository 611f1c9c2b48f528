//! In-memory event emitter that captures published records.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on a poisoned lock

use account_entity_core::event_emitter::{EventDestination, EventEmitter, EventEmitterError};
use account_entity_core::record::TransactionRecord;
use std::future::{self, Future};
use std::pin::Pin;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct State {
    published: Vec<TransactionRecord>,
    failures: u32,
    attempts: u32,
}

/// In-memory event emitter for fast, deterministic testing.
///
/// Publishing appends the record to a list; injected failures reject the next calls
/// with [`EventEmitterError::PublishFailed`] without recording anything.
///
/// # Example
///
/// ```
/// use account_entity_testing::InMemoryEventEmitter;
///
/// let emitter = InMemoryEventEmitter::new();
/// emitter.fail_next(2);
/// assert_eq!(emitter.published_count(), 0);
/// ```
#[derive(Clone, Debug)]
pub struct InMemoryEventEmitter {
    destination: EventDestination,
    state: Arc<Mutex<State>>,
}

impl InMemoryEventEmitter {
    /// Create an emitter for the default destination.
    #[must_use]
    pub fn new() -> Self {
        Self::with_destination(EventDestination::default())
    }

    /// Create an emitter for `destination`.
    #[must_use]
    pub fn with_destination(destination: EventDestination) -> Self {
        Self {
            destination,
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// Reject the next `times` publishes.
    pub fn fail_next(&self, times: u32) {
        self.state.lock().unwrap().failures = times;
    }

    /// Reject every publish until [`heal`](Self::heal) is called.
    pub fn fail_always(&self) {
        self.fail_next(u32::MAX);
    }

    /// Clear injected failures.
    pub fn heal(&self) {
        self.state.lock().unwrap().failures = 0;
    }

    /// All successfully published records, oldest first.
    #[must_use]
    pub fn published(&self) -> Vec<TransactionRecord> {
        self.state.lock().unwrap().published.clone()
    }

    /// Number of successfully published records.
    #[must_use]
    pub fn published_count(&self) -> usize {
        self.state.lock().unwrap().published.len()
    }

    /// Publish calls made, failed ones included.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.state.lock().unwrap().attempts
    }
}

impl Default for InMemoryEventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl EventEmitter for InMemoryEventEmitter {
    fn publish<'a>(
        &'a self,
        record: &'a TransactionRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventEmitterError>> + Send + 'a>> {
        let mut state = self.state.lock().unwrap();
        state.attempts += 1;

        let result = if state.failures > 0 {
            state.failures -= 1;
            Err(EventEmitterError::PublishFailed {
                topic: self.destination.topic.clone(),
                reason: "injected publish failure".to_string(),
            })
        } else {
            state.published.push(record.clone());
            Ok(())
        };

        Box::pin(future::ready(result))
    }

    fn destination(&self) -> &EventDestination {
        &self.destination
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use account_entity_core::account::{EntityId, TransactionRequest, TransactionType};
    use account_entity_core::{Decimal, Uuid};
    use tokio_test::{assert_err, assert_ok};

    fn record() -> TransactionRecord {
        let request = TransactionRequest::new(TransactionType::Deposit, Decimal::from(10)).unwrap();
        TransactionRecord::completed(
            Uuid::nil(),
            &EntityId::from("acct-1"),
            &request,
            crate::test_clock().time(),
        )
    }

    #[tokio::test]
    async fn test_records_successful_publishes() {
        let emitter = InMemoryEventEmitter::new();

        assert_ok!(emitter.publish(&record()).await);

        assert_eq!(emitter.published_count(), 1);
        assert_eq!(emitter.published()[0].account_id, "acct-1");
    }

    #[tokio::test]
    async fn test_injected_failures_publish_nothing() {
        let emitter = InMemoryEventEmitter::new();
        emitter.fail_next(1);

        let err = assert_err!(emitter.publish(&record()).await);
        assert!(matches!(
            err,
            EventEmitterError::PublishFailed { ref topic, .. } if topic == "transactions"
        ));

        assert_ok!(emitter.publish(&record()).await);
        assert_eq!(emitter.published_count(), 1);
        assert_eq!(emitter.attempts(), 2);
    }
}
