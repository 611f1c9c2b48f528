//! Event emitter boundary for completed transactions.
//!
//! The [`EventEmitter`] trait publishes one [`TransactionRecord`] to the transaction
//! stream. It is fire-and-acknowledge: a call resolves once the broker has accepted or
//! rejected the message. Implementations do not retry; the processor layers retries on
//! top and logs each attempt.
//!
//! # Delivery
//!
//! - Records are published to a fixed pub/sub name and topic ([`EventDestination`])
//!   with a message time-to-live attached as delivery metadata.
//! - A retried publish carries a new record id, so a broker that acknowledged an
//!   earlier attempt after a client-side timeout can deliver the same transaction twice.
//!   Subscribers must be idempotent.
//!
//! # Implementations
//!
//! - `RedpandaEventEmitter` (in `account-entity-redpanda`): Kafka-compatible production emitter
//! - `InMemoryEventEmitter` (in `account-entity-testing`): records published events for assertions

use crate::record::TransactionRecord;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// Default pub/sub component name.
pub const DEFAULT_PUBSUB_NAME: &str = "eventsource";

/// Default topic for transaction records.
pub const DEFAULT_TOPIC: &str = "transactions";

/// Default message time-to-live.
pub const DEFAULT_MESSAGE_TTL: Duration = Duration::from_secs(3600);

/// Errors that can occur while emitting events.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventEmitterError {
    /// Failed to connect to the broker
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Broker rejected or timed out the publish
    #[error("Publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to subscribe to topics
    #[error("Subscription failed for topics {topics:?}: {reason}")]
    SubscriptionFailed {
        /// The topics that failed to subscribe
        topics: Vec<String>,
        /// The reason for failure
        reason: String,
    },

    /// Record could not be encoded
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Received message could not be decoded
    #[error("Deserialization failed: {0}")]
    Deserialization(String),

    /// Network or transport error
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Where transaction records are published.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventDestination {
    /// Logical pub/sub component name.
    pub pubsub_name: String,
    /// Topic within the component.
    pub topic: String,
    /// Message time-to-live attached as delivery metadata.
    pub ttl: Duration,
}

impl EventDestination {
    /// Creates a destination.
    #[must_use]
    pub fn new(pubsub_name: impl Into<String>, topic: impl Into<String>, ttl: Duration) -> Self {
        Self {
            pubsub_name: pubsub_name.into(),
            topic: topic.into(),
            ttl,
        }
    }

    /// TTL in whole seconds, as sent in message metadata.
    #[must_use]
    pub const fn ttl_seconds(&self) -> u64 {
        self.ttl.as_secs()
    }
}

impl Default for EventDestination {
    fn default() -> Self {
        Self::new(DEFAULT_PUBSUB_NAME, DEFAULT_TOPIC, DEFAULT_MESSAGE_TTL)
    }
}

/// Publishes completed-transaction facts to the event stream.
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync`; different entities publish concurrently.
///
/// # Dyn Compatibility
///
/// Uses explicit `Pin<Box<dyn Future>>` returns so the processor can hold an
/// `Arc<dyn EventEmitter>`.
pub trait EventEmitter: Send + Sync {
    /// Publishes one record.
    ///
    /// # Errors
    ///
    /// Returns [`EventEmitterError::PublishFailed`] (or another variant) if the broker
    /// did not acknowledge the message.
    fn publish<'a>(
        &'a self,
        record: &'a TransactionRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventEmitterError>> + Send + 'a>>;

    /// Destination this emitter publishes to.
    fn destination(&self) -> &EventDestination;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_destination_matches_subscribers() {
        let destination = EventDestination::default();
        assert_eq!(destination.pubsub_name, "eventsource");
        assert_eq!(destination.topic, "transactions");
        assert_eq!(destination.ttl_seconds(), 3600);
    }
}
