//! Per-entity hosting: lazy activation, serialized mailboxes, idle deactivation.
//!
//! Each active entity id owns one tokio task and one bounded mailbox. Calls for the
//! same id are handled strictly one at a time, in arrival order; calls for different
//! ids run concurrently. An entity that receives nothing for `idle_timeout` stops and
//! forgets everything; the next call activates it again and the processor reloads the
//! balance from the store.
//!
//! # Registry discipline
//!
//! Every enqueue happens while holding the registry lock (`try_send` never blocks).
//! An idle task takes the same lock, checks its mailbox is still empty and only then
//! removes itself, so no message can be stranded in a mailbox whose task has exited.
//! The lock is never held across an `.await`.

use crate::metrics::EntityMetrics;
use crate::processor::TransactionProcessor;
use account_entity_core::account::{EntityId, TransactionDetails, ValidationError};
use account_entity_core::outcome::TransactionResult;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Default mailbox capacity per entity.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 64;

/// Default idle period before an entity is deactivated.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default time `shutdown` waits for mailboxes to drain.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors returned to callers of the host.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    /// The entity id cannot address an entity.
    #[error("{}", .0.summary())]
    InvalidEntityId(ValidationError),

    /// The entity's mailbox is at capacity.
    #[error("Mailbox full for entity {0}")]
    MailboxFull(EntityId),

    /// The entity task ended without answering.
    #[error("Entity {0} stopped before answering")]
    EntityStopped(EntityId),

    /// No answer within the configured call timeout. The transaction may still complete.
    #[error("Timed out after {after:?} waiting for entity {entity_id}")]
    Timeout {
        /// Entity the call targeted.
        entity_id: EntityId,
        /// Configured call timeout.
        after: Duration,
    },

    /// The host no longer accepts calls.
    #[error("Entity host is shutting down")]
    ShuttingDown,

    /// Shutdown timed out waiting for entity tasks.
    #[error("Shutdown timed out with {0} entities still draining")]
    ShutdownTimeout(usize),
}

/// Host settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HostConfig {
    /// Queued calls per entity before `MailboxFull`. Zero is treated as one.
    pub mailbox_capacity: usize,
    /// Inactivity before an entity is deactivated.
    pub idle_timeout: Duration,
    /// How long a caller waits for an answer; `None` waits indefinitely.
    pub call_timeout: Option<Duration>,
    /// How long `shutdown` waits for entities to drain.
    pub shutdown_timeout: Duration,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            call_timeout: None,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl HostConfig {
    /// Set the mailbox capacity.
    #[must_use]
    pub const fn with_mailbox_capacity(mut self, capacity: usize) -> Self {
        self.mailbox_capacity = capacity;
        self
    }

    /// Set the idle timeout.
    #[must_use]
    pub const fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the caller-side timeout.
    #[must_use]
    pub const fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Set the shutdown timeout.
    #[must_use]
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

struct Envelope {
    details: TransactionDetails,
    reply: oneshot::Sender<TransactionResult>,
}

struct Mailbox {
    generation: u64,
    sender: mpsc::Sender<Envelope>,
    task: JoinHandle<()>,
}

struct Inner {
    processor: TransactionProcessor,
    config: HostConfig,
    registry: Mutex<HashMap<EntityId, Mailbox>>,
    next_generation: AtomicU64,
    shutdown: AtomicBool,
}

impl Inner {
    fn registry(&self) -> MutexGuard<'_, HashMap<EntityId, Mailbox>> {
        // Nothing panics while holding the lock; recover the map if something did.
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Routes calls to per-entity tasks.
///
/// Cheap to clone; clones share the same registry.
///
/// # Example
///
/// ```ignore
/// let host = EntityHost::new(processor, HostConfig::default());
///
/// let message = host.transaction("acct-1", TransactionDetails::deposit(100.0)).await;
/// assert_eq!(message, "Transaction successful");
///
/// host.shutdown().await?;
/// ```
#[derive(Clone)]
pub struct EntityHost {
    inner: Arc<Inner>,
}

impl EntityHost {
    /// Creates a host. Entities are activated on their first call.
    #[must_use]
    pub fn new(processor: TransactionProcessor, config: HostConfig) -> Self {
        let config = config.with_mailbox_capacity(config.mailbox_capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                processor,
                config,
                registry: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
                shutdown: AtomicBool::new(false),
            }),
        }
    }

    /// Host settings.
    #[must_use]
    pub fn config(&self) -> &HostConfig {
        &self.inner.config
    }

    /// Applies a transaction and returns the caller-facing status message.
    ///
    /// Host-level failures (invalid id, full mailbox, timeout, shutdown) are rendered as
    /// messages too.
    pub async fn transaction(&self, entity_id: &str, details: TransactionDetails) -> String {
        let entity_id = match EntityId::parse(entity_id) {
            Ok(entity_id) => entity_id,
            Err(reason) => return HostError::InvalidEntityId(reason).to_string(),
        };

        match self.submit(&entity_id, details).await {
            Ok(result) => result.message,
            Err(e) => e.to_string(),
        }
    }

    /// Applies a transaction and returns the full result.
    ///
    /// # Errors
    ///
    /// - [`HostError::InvalidEntityId`] for an empty id; nothing is activated
    /// - [`HostError::ShuttingDown`] after [`shutdown`](Self::shutdown) has begun
    /// - [`HostError::MailboxFull`] when the entity already has `mailbox_capacity` calls queued
    /// - [`HostError::Timeout`] when `call_timeout` elapses first
    /// - [`HostError::EntityStopped`] if the entity task ended without answering
    pub async fn submit(
        &self,
        entity_id: &EntityId,
        details: TransactionDetails,
    ) -> Result<TransactionResult, HostError> {
        entity_id.validate().map_err(HostError::InvalidEntityId)?;

        let (reply, response) = oneshot::channel();
        self.enqueue(entity_id, Envelope { details, reply })?;

        let answer = async {
            response
                .await
                .map_err(|_| HostError::EntityStopped(entity_id.clone()))
        };

        match self.inner.config.call_timeout {
            None => answer.await,
            Some(after) => tokio::time::timeout(after, answer)
                .await
                .map_err(|_| HostError::Timeout {
                    entity_id: entity_id.clone(),
                    after,
                })?,
        }
    }

    /// Number of currently active entities.
    #[must_use]
    pub fn active_entities(&self) -> usize {
        self.inner.registry().len()
    }

    /// Whether `entity_id` currently has a running task.
    #[must_use]
    pub fn is_active(&self, entity_id: &EntityId) -> bool {
        self.inner.registry().contains_key(entity_id)
    }

    /// Stops accepting calls, lets every mailbox drain and waits for all entity tasks.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::ShutdownTimeout`] if tasks are still running after
    /// `shutdown_timeout`.
    pub async fn shutdown(&self) -> Result<(), HostError> {
        tracing::info!("Initiating entity host shutdown");
        self.inner.shutdown.store(true, Ordering::Release);

        // Dropping the senders closes every mailbox; tasks finish what is queued and exit.
        let tasks: Vec<JoinHandle<()>> = self
            .inner
            .registry()
            .drain()
            .map(|(_, mailbox)| mailbox.task)
            .collect();
        let pending = tasks.len();

        match tokio::time::timeout(
            self.inner.config.shutdown_timeout,
            futures::future::join_all(tasks),
        )
        .await
        {
            Ok(results) => {
                for result in results {
                    if let Err(e) = result {
                        tracing::error!(error = %e, "Entity task failed");
                    }
                }
                tracing::info!(entities = pending, "Entity host shut down");
                Ok(())
            }
            Err(_) => {
                tracing::warn!(entities = pending, "Shutdown timed out");
                Err(HostError::ShutdownTimeout(pending))
            }
        }
    }

    fn enqueue(&self, entity_id: &EntityId, envelope: Envelope) -> Result<(), HostError> {
        let mut registry = self.inner.registry();

        if self.inner.shutdown.load(Ordering::Acquire) {
            return Err(HostError::ShuttingDown);
        }

        let envelope = match registry.get(entity_id) {
            Some(mailbox) => match mailbox.sender.try_send(envelope) {
                Ok(()) => return Ok(()),
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(entity_id = %entity_id, "Mailbox full, rejecting call");
                    return Err(HostError::MailboxFull(entity_id.clone()));
                }
                // The task is gone (it panicked); start a fresh one.
                Err(mpsc::error::TrySendError::Closed(envelope)) => envelope,
            },
            None => envelope,
        };

        let (sender, receiver) = mpsc::channel(self.inner.config.mailbox_capacity);
        if sender.try_send(envelope).is_err() {
            return Err(HostError::MailboxFull(entity_id.clone()));
        }

        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let task = tokio::spawn(run_entity(
            Arc::clone(&self.inner),
            entity_id.clone(),
            generation,
            receiver,
        ));

        registry.insert(
            entity_id.clone(),
            Mailbox {
                generation,
                sender,
                task,
            },
        );
        Ok(())
    }
}

async fn run_entity(
    inner: Arc<Inner>,
    entity_id: EntityId,
    generation: u64,
    mut mailbox: mpsc::Receiver<Envelope>,
) {
    tracing::debug!(entity_id = %entity_id, generation, "Entity activated");
    EntityMetrics::record_activation();

    loop {
        let next = tokio::time::timeout(inner.config.idle_timeout, mailbox.recv()).await;
        let envelope = match next {
            Ok(Some(envelope)) => envelope,
            // Host shut down and the mailbox is drained.
            Ok(None) => break,
            Err(_) => {
                let mut registry = inner.registry();
                match mailbox.try_recv() {
                    Ok(envelope) => {
                        drop(registry);
                        envelope
                    }
                    Err(_) => {
                        if registry
                            .get(&entity_id)
                            .is_some_and(|mailbox| mailbox.generation == generation)
                        {
                            registry.remove(&entity_id);
                        }
                        tracing::debug!(
                            entity_id = %entity_id,
                            generation,
                            "Entity idle, deactivating"
                        );
                        break;
                    }
                }
            }
        };

        let result = inner.processor.process(&entity_id, envelope.details).await;
        if envelope.reply.send(result).is_err() {
            tracing::debug!(entity_id = %entity_id, "Caller stopped waiting before the answer");
        }
    }

    EntityMetrics::record_deactivation();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_runtime_settings() {
        let config = HostConfig::default();
        assert_eq!(config.mailbox_capacity, 64);
        assert_eq!(config.idle_timeout, Duration::from_secs(30));
        assert_eq!(config.call_timeout, None);
    }

    #[test]
    fn host_errors_render_as_messages() {
        assert_eq!(
            HostError::MailboxFull(EntityId::from("acct-1")).to_string(),
            "Mailbox full for entity acct-1"
        );
        assert_eq!(HostError::ShuttingDown.to_string(), "Entity host is shutting down");
        assert_eq!(
            HostError::InvalidEntityId(ValidationError::EmptyEntityId).to_string(),
            "Invalid entity id"
        );
    }
}
