//! Event Bus Adapter
//!
//! Wraps a [`Broker`] with JSON encoding, message keys and long-lived
//! consumer-group subscriptions.
//!
//! Each subscription owns one receive loop. The loop never runs handlers
//! itself: it hashes the record key onto one of N lanes, and each lane is a
//! worker task that handles its records one at a time. Records with the same
//! key therefore stay ordered while unrelated records proceed in parallel.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::broker::{Broker, BrokerConsumer, OutgoingRecord, Record};
use super::BusError;

/// Pause before polling again after a broker read error
const READ_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Error type returned by message handlers
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Receives decoded messages for one subscription.
#[async_trait]
pub trait EventHandler<M>: Send + Sync {
    async fn handle(&self, message: M) -> Result<(), HandlerError>;
}

/// Adapter settings
#[derive(Debug, Clone)]
pub struct BusSettings {
    pub client_id: String,
    /// Lane workers per subscription
    pub lanes: usize,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            client_id: "wallet-service".to_string(),
            lanes: 4,
        }
    }
}

/// Process-wide event bus: one producer plus the registered subscriptions.
pub struct EventBus {
    broker: Arc<dyn Broker>,
    settings: BusSettings,
    subscriptions: Mutex<HashMap<(String, String), JoinHandle<()>>>,
    shutdown: watch::Sender<bool>,
}

impl EventBus {
    /// Connect the producer and return the adapter.
    pub async fn connect(broker: Arc<dyn Broker>, settings: BusSettings) -> Result<Self, BusError> {
        broker.connect().await?;
        info!(client_id = %settings.client_id, lanes = settings.lanes, "Event bus connected");

        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            broker,
            settings,
            subscriptions: Mutex::new(HashMap::new()),
            shutdown,
        })
    }

    /// Serialize `message` and append it to `topic`.
    ///
    /// The record key is the message's top-level `id` field when it has one.
    pub async fn publish<T: Serialize + ?Sized>(
        &self,
        topic: &str,
        message: &T,
    ) -> Result<(), BusError> {
        let value = serde_json::to_value(message)?;
        let key = message_key(&value);
        let payload = serde_json::to_string(&value)?;

        self.broker
            .send(topic, OutgoingRecord { key: key.clone(), payload })
            .await?;

        debug!(topic = %topic, key = ?key, "Message published");
        Ok(())
    }

    /// Register `handler` for `topic` as a member of `group`.
    ///
    /// Returns `false` without doing anything when the pair is already
    /// subscribed.
    pub async fn subscribe<M>(
        &self,
        topic: &str,
        group: &str,
        handler: Arc<dyn EventHandler<M>>,
    ) -> Result<bool, BusError>
    where
        M: DeserializeOwned + Send + 'static,
    {
        let key = (topic.to_string(), group.to_string());
        let mut subscriptions = self.subscriptions.lock().await;
        if subscriptions.contains_key(&key) {
            debug!(topic = %topic, group = %group, "Already subscribed");
            return Ok(false);
        }

        let consumer = self.broker.consumer(topic, group).await?;
        let subscription = Subscription {
            broker: Arc::clone(&self.broker),
            topic: key.0.clone(),
            group: key.1.clone(),
            handler,
        };
        let handle = tokio::spawn(subscription.run(
            consumer,
            self.settings.lanes.max(1),
            self.shutdown.subscribe(),
        ));

        subscriptions.insert(key, handle);
        info!(topic = %topic, group = %group, "Subscribed");
        Ok(true)
    }

    /// Subscribed (topic, group) pairs, sorted.
    pub async fn active_subscriptions(&self) -> Vec<(String, String)> {
        let mut keys: Vec<_> = self.subscriptions.lock().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Stop every receive loop, let lanes drain, then close the producer.
    pub async fn shutdown(&self) -> Result<(), BusError> {
        self.shutdown.send_replace(true);

        let handles: Vec<_> = self.subscriptions.lock().await.drain().collect();
        for ((topic, group), handle) in handles {
            if let Err(e) = handle.await {
                warn!(topic = %topic, group = %group, error = %e, "Receive loop ended abnormally");
            }
        }

        self.broker.disconnect().await?;
        info!("Event bus disconnected");
        Ok(())
    }
}

struct Subscription<M> {
    broker: Arc<dyn Broker>,
    topic: String,
    group: String,
    handler: Arc<dyn EventHandler<M>>,
}

impl<M> Subscription<M>
where
    M: DeserializeOwned + Send + 'static,
{
    async fn run(
        self,
        mut consumer: Box<dyn BrokerConsumer>,
        lanes: usize,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let this = Arc::new(self);

        let mut senders = Vec::with_capacity(lanes);
        let mut workers = Vec::with_capacity(lanes);
        for lane in 0..lanes {
            let (tx, rx) = mpsc::unbounded_channel();
            senders.push(tx);
            workers.push(tokio::spawn(Arc::clone(&this).lane(lane, rx)));
        }

        while !*shutdown.borrow() {
            let next = tokio::select! {
                _ = shutdown.changed() => break,
                next = consumer.next() => next,
            };

            match next {
                Ok(Some(record)) => {
                    let lane = lane_for(&record, lanes);
                    if senders[lane].send(record).is_err() {
                        error!(topic = %this.topic, group = %this.group, lane, "Lane worker gone");
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    error!(topic = %this.topic, group = %this.group, error = %e, "Broker read failed");
                    tokio::time::sleep(READ_ERROR_BACKOFF).await;
                }
            }
        }

        // Closing the lanes lets workers finish what they already hold
        drop(senders);
        for worker in workers {
            let _ = worker.await;
        }
        debug!(topic = %this.topic, group = %this.group, "Receive loop stopped");
    }

    async fn lane(self: Arc<Self>, lane: usize, mut records: mpsc::UnboundedReceiver<Record>) {
        while let Some(record) = records.recv().await {
            match serde_json::from_str::<M>(&record.payload) {
                Ok(message) => {
                    if let Err(e) = self.handler.handle(message).await {
                        error!(
                            topic = %self.topic,
                            group = %self.group,
                            lane,
                            record_id = %record.id,
                            error = %e,
                            "Handler failed"
                        );
                    }
                }
                Err(e) => {
                    error!(
                        topic = %self.topic,
                        group = %self.group,
                        record_id = %record.id,
                        error = %e,
                        "Undecodable message"
                    );
                }
            }

            // Processed either way
            if let Err(e) = self.broker.ack(&self.topic, &self.group, &record).await {
                warn!(record_id = %record.id, error = %e, "Acknowledge failed");
            }
        }
    }
}

/// `id` as a string when it is one, its JSON text otherwise.
fn message_key(value: &serde_json::Value) -> Option<String> {
    match value.get("id")? {
        serde_json::Value::Null => None,
        serde_json::Value::String(id) => Some(id.clone()),
        other => Some(other.to_string()),
    }
}

fn lane_for(record: &Record, lanes: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    record.key.as_deref().unwrap_or(&record.id).hash(&mut hasher);
    (hasher.finish() % lanes as u64) as usize
}
