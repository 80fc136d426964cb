//! Redis Streams Broker Integration Tests
//!
//! Need the `redis` feature and a reachable server:
//! `REDIS_URL=redis://127.0.0.1 cargo test --features redis -- --ignored`

#![cfg(feature = "redis")]

use std::time::Duration;

use uuid::Uuid;

use wallet_ledger::bus::{Broker, BrokerConsumer, OutgoingRecord, RedisStreamsBroker};

fn redis_url() -> String {
    dotenvy::dotenv().ok();
    std::env::var("REDIS_URL").expect("REDIS_URL must be set for tests")
}

async fn connected(client_id: &str) -> RedisStreamsBroker {
    let broker = RedisStreamsBroker::new(&redis_url(), client_id).expect("Invalid REDIS_URL");
    broker.connect().await.expect("Failed to connect to Redis");
    broker
}

#[tokio::test]
#[ignore]
async fn test_unacked_record_redelivered_after_restart() {
    let topic = format!("test.{}", Uuid::new_v4());
    let group = "email";

    // First process: reads the record and dies before acknowledging it
    let first = connected("wallet-service").await;
    let mut consumer = first.consumer(&topic, group).await.unwrap();
    first
        .send(
            &topic,
            OutgoingRecord {
                key: Some("k1".to_string()),
                payload: r#"{"id":"k1"}"#.to_string(),
            },
        )
        .await
        .unwrap();

    let delivered = tokio::time::timeout(Duration::from_secs(5), consumer.next())
        .await
        .expect("No delivery")
        .unwrap()
        .expect("Consumer closed");
    drop(consumer);
    first.disconnect().await.unwrap();

    // Same client id after restart: the pending record comes back first
    let second = connected("wallet-service").await;
    let mut consumer = second.consumer(&topic, group).await.unwrap();
    let redelivered = tokio::time::timeout(Duration::from_secs(5), consumer.next())
        .await
        .expect("No redelivery")
        .unwrap()
        .expect("Consumer closed");

    assert_eq!(redelivered.id, delivered.id);
    assert_eq!(redelivered.key.as_deref(), Some("k1"));
    assert_eq!(redelivered.payload, delivered.payload);

    second.ack(&topic, group, &redelivered).await.unwrap();
    second.disconnect().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_acked_record_not_redelivered() {
    let topic = format!("test.{}", Uuid::new_v4());
    let group = "email";

    let first = connected("wallet-service").await;
    let mut consumer = first.consumer(&topic, group).await.unwrap();
    for key in ["a", "b"] {
        first
            .send(
                &topic,
                OutgoingRecord {
                    key: Some(key.to_string()),
                    payload: format!(r#"{{"id":"{key}"}}"#),
                },
            )
            .await
            .unwrap();
    }

    let a = consumer.next().await.unwrap().expect("Consumer closed");
    let b = consumer.next().await.unwrap().expect("Consumer closed");
    first.ack(&topic, group, &a).await.unwrap();
    drop(consumer);
    first.disconnect().await.unwrap();

    let second = connected("wallet-service").await;
    let mut consumer = second.consumer(&topic, group).await.unwrap();
    let replayed = consumer.next().await.unwrap().expect("Consumer closed");
    assert_eq!(replayed.id, b.id);

    second.ack(&topic, group, &replayed).await.unwrap();
    second.disconnect().await.unwrap();
}
