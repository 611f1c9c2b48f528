//! Integration tests for [`RedpandaEventEmitter`] with a real Kafka instance.
//!
//! These tests use testcontainers to spin up Kafka and validate:
//! - Publish/subscribe round-trip of transaction records
//! - Per-account keys and delivery headers
//! - The processor publishing through the emitter
//!
//! # Running These Tests
//!
//! These tests are marked as `#[ignore]` by default because they:
//! - Require Docker to be running (for testcontainers)
//! - Take 15-60 seconds per test to spin up Kafka
//!
//! To run explicitly:
//! ```bash
//! cargo test -p account-entity-redpanda --test integration_tests -- --ignored
//! ```

#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use account_entity_core::account::{
    EntityId, TransactionDetails, TransactionRequest, TransactionType,
};
use account_entity_core::event_emitter::EventEmitter;
use account_entity_core::record::TransactionRecord;
use account_entity_core::{Decimal, Uuid};
use account_entity_redpanda::{RedpandaEventEmitter, TransactionStream};
use account_entity_runtime::{AccountEnvironment, ProcessorConfig, TransactionProcessor};
use account_entity_testing::{InMemoryBalanceStore, test_clock};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::kafka::{KAFKA_PORT, Kafka};
use tokio_test::{assert_err, assert_ok};

/// Helper to build a record without going through the processor
fn test_record(account: &str, kind: TransactionType, amount: i64) -> TransactionRecord {
    let request = TransactionRequest::new(kind, Decimal::from(amount)).expect("valid request");
    let account = EntityId::from(account);
    TransactionRecord::completed(Uuid::new_v4(), &account, &request, test_clock().time())
}

/// Start Kafka and wait until a publish succeeds. Returns the container and broker list.
async fn start_kafka() -> (ContainerAsync<Kafka>, String) {
    let kafka = Kafka::default()
        .with_env_var("KAFKA_AUTO_CREATE_TOPICS_ENABLE", "true")
        .start()
        .await
        .expect("Failed to start Kafka container");

    let host = kafka.get_host().await.expect("Failed to get host");
    let port = kafka
        .get_host_port_ipv4(KAFKA_PORT)
        .await
        .expect("Failed to get port");
    let brokers = format!("{host}:{port}");

    let warmup = test_record("warmup", TransactionType::Deposit, 1);
    for attempt in 1..=60 {
        if let Ok(emitter) = RedpandaEventEmitter::new(&brokers) {
            if emitter.publish(&warmup).await.is_ok() {
                // Give topic metadata time to propagate
                tokio::time::sleep(Duration::from_secs(3)).await;
                return (kafka, brokers);
            }
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(attempt != 60, "Kafka failed to become ready after 60 attempts");
    }
    unreachable!("loop either returns or panics")
}

fn emitter(brokers: &str) -> RedpandaEventEmitter {
    RedpandaEventEmitter::builder()
        .brokers(brokers)
        .auto_offset_reset("earliest")
        .build()
        .expect("Failed to create emitter")
}

/// Collect `count` records, skipping warmup traffic.
async fn collect(stream: &mut TransactionStream, count: usize) -> Vec<TransactionRecord> {
    let mut received = Vec::new();
    tokio::time::timeout(Duration::from_secs(15), async {
        while received.len() < count {
            if let Some(result) = stream.next().await {
                let record = result.expect("Failed to receive record");
                if record.account_id != "warmup" {
                    received.push(record);
                }
            }
        }
    })
    .await
    .expect("Timeout waiting for records");
    received
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_publish_and_subscribe_round_trip() {
    let (_kafka, brokers) = start_kafka().await;
    let emitter = emitter(&brokers);

    let mut stream = emitter.subscribe("round-trip").await.expect("Failed to subscribe");
    tokio::time::sleep(Duration::from_secs(2)).await;

    let deposit = test_record("acct-1", TransactionType::Deposit, 100);
    let withdrawal = test_record("acct-1", TransactionType::Withdrawal, 40);
    assert_ok!(emitter.publish(&deposit).await);
    assert_ok!(emitter.publish(&withdrawal).await);

    // Same key, same partition, same order.
    let received = collect(&mut stream, 2).await;
    assert_eq!(received, vec![deposit, withdrawal]);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_processor_publishes_through_redpanda() {
    let (_kafka, brokers) = start_kafka().await;
    let emitter = Arc::new(emitter(&brokers));
    let store = InMemoryBalanceStore::new();

    let mut stream = emitter.subscribe("processor").await.expect("Failed to subscribe");
    tokio::time::sleep(Duration::from_secs(2)).await;

    let env = AccountEnvironment::new(
        Arc::new(store.clone()),
        Arc::clone(&emitter) as Arc<dyn EventEmitter>,
    );
    let processor = TransactionProcessor::new(env, ProcessorConfig::default());
    let id = EntityId::from("acct-1");

    let deposit = processor.process(&id, TransactionDetails::deposit(100.0)).await;
    let overdraw = processor.process(&id, TransactionDetails::withdrawal(150.0)).await;
    let withdraw = processor.process(&id, TransactionDetails::withdrawal(40.0)).await;

    assert!(deposit.is_success());
    assert!(!overdraw.is_success());
    assert!(withdraw.is_success());

    let received = collect(&mut stream, 2).await;
    assert_eq!(received[0].transaction_type, TransactionType::Deposit);
    assert_eq!(received[1].transaction_type, TransactionType::Withdrawal);
    assert_eq!(received[1].amount, Decimal::from(40));
    assert_eq!(store.committed(&id), Some(Decimal::from(60)));
}

#[tokio::test]
#[ignore = "waits for the producer timeout"]
async fn test_unreachable_broker_fails_publish() {
    let emitter = RedpandaEventEmitter::builder()
        .brokers("127.0.0.1:1")
        .timeout(Duration::from_secs(1))
        .build()
        .expect("Producer creation does not connect");

    let result = emitter
        .publish(&test_record("acct-1", TransactionType::Deposit, 1))
        .await;

    assert_err!(result);
}
