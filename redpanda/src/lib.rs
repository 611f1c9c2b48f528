//! Redpanda transaction event emitter for the bank-account entity.
//!
//! This crate provides a Redpanda-based [`EventEmitter`] that publishes every completed
//! transaction to the `transactions` topic. It uses rdkafka for Kafka-compatible
//! event streaming, so any Kafka-compatible broker works.
//!
//! # Wire format
//!
//! - **Key**: the account id, so records for one account land on one partition in order
//! - **Payload**: a structured-mode CloudEvent (`type = "transaction.v1"`) whose `data`
//!   is the [`TransactionRecord`]
//! - **Headers**: `ttlInSeconds`, `pubsubName` and `content-type`
//!
//! # Delivery Semantics
//!
//! **At-least-once delivery** on both sides:
//! - A publish the broker acknowledged after a client-side timeout may be retried by the
//!   processor under a new record id
//! - [`RedpandaEventEmitter::subscribe`] commits offsets only after a record has been handed
//!   to the subscriber; a crash before commit redelivers it
//! - Subscribers MUST be idempotent
//!
//! # Example
//!
//! ```no_run
//! use account_entity_redpanda::RedpandaEventEmitter;
//! use futures::StreamExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let emitter = RedpandaEventEmitter::new("localhost:9092")?;
//!
//! // Follow the transaction stream
//! let mut records = emitter.subscribe("ledger-projection").await?;
//! while let Some(result) = records.next().await {
//!     match result {
//!         Ok(record) => println!("{} {} {}", record.account_id, record.transaction_type, record.amount),
//!         Err(e) => eprintln!("Error: {e}"),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use account_entity_core::event::{CLOUD_EVENT_CONTENT_TYPE, CloudEvent, DEFAULT_SOURCE};
use account_entity_core::event_emitter::{EventDestination, EventEmitter, EventEmitterError};
use account_entity_core::record::TransactionRecord;
use futures::Stream;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::{Header, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use uuid::Uuid;

/// Header carrying the message time-to-live in seconds.
pub const TTL_HEADER: &str = "ttlInSeconds";

/// Header carrying the logical pub/sub component name.
pub const PUBSUB_NAME_HEADER: &str = "pubsubName";

/// Header carrying the payload content type.
pub const CONTENT_TYPE_HEADER: &str = "content-type";

/// Stream of decoded transaction records.
pub type TransactionStream =
    Pin<Box<dyn Stream<Item = Result<TransactionRecord, EventEmitterError>> + Send>>;

/// Redpanda event emitter.
///
/// Publishes with an rdkafka [`FutureProducer`]; every call resolves once the broker has
/// acknowledged or rejected the message, or the producer timeout expired. No retries
/// happen here.
///
/// # Example
///
/// ```no_run
/// use account_entity_redpanda::RedpandaEventEmitter;
/// use account_entity_core::EventDestination;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let emitter = RedpandaEventEmitter::builder()
///     .brokers("localhost:9092,localhost:9093")
///     .destination(EventDestination::new("eventsource", "transactions", Duration::from_secs(3600)))
///     .producer_acks("all")
///     .timeout(Duration::from_secs(10))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct RedpandaEventEmitter {
    /// Kafka producer for publishing records
    producer: FutureProducer,
    /// Broker addresses (for creating consumers)
    brokers: String,
    /// Topic, pub/sub name and TTL
    destination: EventDestination,
    /// CloudEvents `source` attribute
    source: String,
    /// Producer timeout
    timeout: Duration,
    /// Record buffer size for subscribers
    buffer_size: usize,
    /// Auto offset reset policy
    auto_offset_reset: String,
}

impl RedpandaEventEmitter {
    /// Create a new emitter with default configuration.
    ///
    /// # Parameters
    ///
    /// - `brokers`: Comma-separated list of broker addresses (e.g., "localhost:9092")
    ///
    /// # Errors
    ///
    /// Returns [`EventEmitterError::ConnectionFailed`] if the producer cannot be created.
    pub fn new(brokers: &str) -> Result<Self, EventEmitterError> {
        Self::builder().brokers(brokers).build()
    }

    /// Create a new builder for configuring the emitter.
    #[must_use]
    pub fn builder() -> RedpandaEventEmitterBuilder {
        RedpandaEventEmitterBuilder::default()
    }

    /// Get a reference to the brokers string.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }

    /// Subscribe to the transaction topic as a member of consumer group `group`.
    ///
    /// Offsets are committed manually, after each record has been delivered to the
    /// returned stream. Messages that fail to decode are yielded as errors and committed.
    ///
    /// # Errors
    ///
    /// Returns [`EventEmitterError::SubscriptionFailed`] if the consumer cannot be
    /// created or subscribed.
    pub async fn subscribe(&self, group: &str) -> Result<TransactionStream, EventEmitterError> {
        let topics = vec![self.destination.topic.clone()];

        // Manual commit for at-least-once
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", group)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", &self.auto_offset_reset)
            .set("session.timeout.ms", "6000")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| EventEmitterError::SubscriptionFailed {
                topics: topics.clone(),
                reason: format!("Failed to create consumer: {e}"),
            })?;

        consumer
            .subscribe(&[self.destination.topic.as_str()])
            .map_err(|e| EventEmitterError::SubscriptionFailed {
                topics: topics.clone(),
                reason: format!("Failed to subscribe to topics: {e}"),
            })?;

        tracing::info!(
            topics = ?topics,
            consumer_group = %group,
            buffer_size = self.buffer_size,
            auto_offset_reset = %self.auto_offset_reset,
            manual_commit = true,
            "Subscribed to transaction stream"
        );

        let (tx, rx) = tokio::sync::mpsc::channel(self.buffer_size);

        // The task owns the consumer and forwards decoded records.
        tokio::spawn(async move {
            use futures::StreamExt;
            use rdkafka::consumer::CommitMode;

            let mut stream = consumer.stream();

            while let Some(msg_result) = stream.next().await {
                match msg_result {
                    Ok(message) => {
                        let decoded = message.payload().map_or_else(
                            || {
                                Err(EventEmitterError::Deserialization(
                                    "Message has no payload".to_string(),
                                ))
                            },
                            decode_record,
                        );

                        if let Ok(record) = &decoded {
                            tracing::trace!(
                                topic = message.topic(),
                                partition = message.partition(),
                                offset = message.offset(),
                                record_id = %record.id,
                                "Received transaction record"
                            );
                        }

                        // Only commit after the subscriber has the record.
                        if tx.send(decoded).await.is_err() {
                            tracing::debug!("Channel receiver dropped, exiting consumer task");
                            break;
                        }

                        if let Err(e) = consumer.commit_message(&message, CommitMode::Async) {
                            tracing::warn!(
                                topic = message.topic(),
                                partition = message.partition(),
                                offset = message.offset(),
                                error = %e,
                                "Failed to commit offset (message may be redelivered)"
                            );
                        }
                    }
                    Err(e) => {
                        let err = EventEmitterError::Transport(format!(
                            "Failed to receive message: {e}"
                        ));
                        if tx.send(Err(err)).await.is_err() {
                            break;
                        }
                    }
                }
            }

            tracing::debug!("Consumer task exiting");
        });

        let stream = async_stream::stream! {
            let mut rx = rx;
            while let Some(result) = rx.recv().await {
                yield result;
            }
        };

        Ok(Box::pin(stream))
    }
}

/// Builder for configuring a [`RedpandaEventEmitter`].
#[derive(Default)]
pub struct RedpandaEventEmitterBuilder {
    brokers: Option<String>,
    destination: Option<EventDestination>,
    source: Option<String>,
    producer_acks: Option<String>,
    compression: Option<String>,
    timeout: Option<Duration>,
    buffer_size: Option<usize>,
    auto_offset_reset: Option<String>,
}

impl RedpandaEventEmitterBuilder {
    /// Set the broker addresses.
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Set topic, pub/sub name and TTL.
    ///
    /// Default: `eventsource` / `transactions` / 3600 s
    #[must_use]
    pub fn destination(mut self, destination: EventDestination) -> Self {
        self.destination = Some(destination);
        self
    }

    /// Set the CloudEvents `source` attribute.
    ///
    /// Default: `bankaccount`
    #[must_use]
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Set the producer acknowledgment mode.
    ///
    /// # Parameters
    ///
    /// - `acks`: "0" (no acks), "1" (leader ack), "all" (all replicas ack)
    ///
    /// Default: "all"
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Set the compression codec.
    ///
    /// Default: "none"
    #[must_use]
    pub fn compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// Set the producer send timeout.
    ///
    /// Default: 5 seconds
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the record buffer size for subscriptions. Zero is treated as one.
    ///
    /// Default: 1000
    #[must_use]
    pub const fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = Some(buffer_size);
        self
    }

    /// Set the auto offset reset policy for new consumer groups.
    ///
    /// - `"earliest"`: Start from the beginning of the topic
    /// - `"latest"`: Start from the end (only new records)
    ///
    /// Default: "latest"
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// Build the [`RedpandaEventEmitter`].
    ///
    /// # Errors
    ///
    /// Returns [`EventEmitterError::ConnectionFailed`] if:
    /// - Brokers not set
    /// - Cannot create producer
    pub fn build(self) -> Result<RedpandaEventEmitter, EventEmitterError> {
        let brokers = self.brokers.ok_or_else(|| {
            EventEmitterError::ConnectionFailed("Brokers not configured".to_string())
        })?;
        let timeout = self.timeout.unwrap_or(Duration::from_secs(5));
        let acks = self.producer_acks.as_deref().unwrap_or("all");
        let compression = self.compression.as_deref().unwrap_or("none");

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", timeout.as_millis().to_string())
            .set("acks", acks)
            .set("compression.type", compression)
            .create()
            .map_err(|e| {
                EventEmitterError::ConnectionFailed(format!("Failed to create producer: {e}"))
            })?;

        let destination = self.destination.unwrap_or_default();

        tracing::info!(
            brokers = %brokers,
            topic = %destination.topic,
            pubsub_name = %destination.pubsub_name,
            acks,
            compression,
            "RedpandaEventEmitter created successfully"
        );

        Ok(RedpandaEventEmitter {
            producer,
            brokers,
            destination,
            source: self.source.unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
            timeout,
            buffer_size: self.buffer_size.unwrap_or(1000).max(1),
            auto_offset_reset: self.auto_offset_reset.unwrap_or_else(|| "latest".to_string()),
        })
    }
}

impl EventEmitter for RedpandaEventEmitter {
    fn publish<'a>(
        &'a self,
        record: &'a TransactionRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventEmitterError>> + Send + 'a>> {
        Box::pin(async move {
            let topic = &self.destination.topic;
            let payload = encode_record(&self.source, record)?;
            let ttl = self.destination.ttl_seconds().to_string();

            let headers = OwnedHeaders::new()
                .insert(Header {
                    key: TTL_HEADER,
                    value: Some(ttl.as_str()),
                })
                .insert(Header {
                    key: PUBSUB_NAME_HEADER,
                    value: Some(self.destination.pubsub_name.as_str()),
                })
                .insert(Header {
                    key: CONTENT_TYPE_HEADER,
                    value: Some(CLOUD_EVENT_CONTENT_TYPE),
                });

            let message = FutureRecord::to(topic)
                .payload(&payload)
                .key(record.account_id.as_str())
                .headers(headers);

            match self.producer.send(message, Timeout::After(self.timeout)).await {
                Ok((partition, offset)) => {
                    tracing::debug!(
                        topic = %topic,
                        partition,
                        offset,
                        record_id = %record.id,
                        account_id = %record.account_id,
                        "Transaction record published"
                    );
                    Ok(())
                }
                Err((kafka_error, _)) => {
                    tracing::error!(
                        topic = %topic,
                        record_id = %record.id,
                        error = %kafka_error,
                        "Failed to publish transaction record"
                    );
                    Err(EventEmitterError::PublishFailed {
                        topic: topic.clone(),
                        reason: kafka_error.to_string(),
                    })
                }
            }
        })
    }

    fn destination(&self) -> &EventDestination {
        &self.destination
    }
}

/// Wraps `record` in a fresh CloudEvent and serializes it.
fn encode_record(source: &str, record: &TransactionRecord) -> Result<Vec<u8>, EventEmitterError> {
    CloudEvent::for_record(Uuid::new_v4(), source, record.clone())
        .to_bytes()
        .map_err(|e| EventEmitterError::Serialization(e.to_string()))
}

/// Opens a CloudEvent payload and returns its record.
fn decode_record(payload: &[u8]) -> Result<TransactionRecord, EventEmitterError> {
    CloudEvent::from_bytes(payload)
        .map(|event| event.data)
        .map_err(|e| EventEmitterError::Deserialization(e.to_string()))
}
