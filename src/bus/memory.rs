//! In-process broker for tests, local runs and the stress tool.
//!
//! - One unbounded queue per (topic, group)
//! - Consumers of the same group share that queue
//! - Records sent to a topic with no groups are dropped, like a consumer
//!   group that starts at the latest offset

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::broker::{Broker, BrokerConsumer, OutgoingRecord, Record};
use super::BusError;

type GroupKey = (String, String);

struct GroupQueue {
    sender: mpsc::UnboundedSender<Record>,
    receiver: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Record>>>,
}

#[derive(Default)]
struct Inner {
    connected: AtomicBool,
    sequence: AtomicU64,
    groups: Mutex<HashMap<GroupKey, GroupQueue>>,
    unacked: Mutex<HashMap<GroupKey, HashSet<String>>>,
    sent: Mutex<Vec<(String, OutgoingRecord)>>,
    fail_sends: AtomicBool,
}

impl Inner {
    fn groups(&self) -> Result<MutexGuard<'_, HashMap<GroupKey, GroupQueue>>, BusError> {
        self.groups
            .lock()
            .map_err(|_| BusError::Connection("broker state poisoned".to_string()))
    }

    fn unacked(&self) -> Result<MutexGuard<'_, HashMap<GroupKey, HashSet<String>>>, BusError> {
        self.unacked
            .lock()
            .map_err(|_| BusError::Connection("broker state poisoned".to_string()))
    }
}

/// Broker that lives entirely inside the process.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    inner: Arc<Inner>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every send with a connection error.
    pub fn set_send_failure(&self, fail: bool) {
        self.inner.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Every record accepted so far, with its topic.
    pub fn sent(&self) -> Vec<(String, OutgoingRecord)> {
        self.inner
            .sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }

    /// Records delivered to `group` and not acknowledged yet.
    pub fn unacked(&self, topic: &str, group: &str) -> usize {
        self.inner
            .unacked
            .lock()
            .ok()
            .and_then(|unacked| {
                unacked
                    .get(&(topic.to_string(), group.to_string()))
                    .map(HashSet::len)
            })
            .unwrap_or(0)
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn connect(&self) -> Result<(), BusError> {
        self.inner.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&self, topic: &str, record: OutgoingRecord) -> Result<(), BusError> {
        if !self.is_connected() {
            return Err(BusError::NotConnected);
        }
        if self.inner.fail_sends.load(Ordering::SeqCst) {
            return Err(BusError::Connection("broker unreachable".to_string()));
        }

        let offset = self.inner.sequence.fetch_add(1, Ordering::SeqCst);
        let delivered = Record {
            id: format!("{topic}-{offset}"),
            key: record.key.clone(),
            payload: record.payload.clone(),
        };

        {
            let groups = self.inner.groups()?;
            let mut unacked = self.inner.unacked()?;
            for (key, queue) in groups.iter().filter(|(key, _)| key.0 == topic) {
                if queue.sender.send(delivered.clone()).is_ok() {
                    unacked
                        .entry(key.clone())
                        .or_default()
                        .insert(delivered.id.clone());
                }
            }
        }

        if let Ok(mut sent) = self.inner.sent.lock() {
            sent.push((topic.to_string(), record));
        }

        Ok(())
    }

    async fn consumer(
        &self,
        topic: &str,
        group: &str,
    ) -> Result<Box<dyn BrokerConsumer>, BusError> {
        if !self.is_connected() {
            return Err(BusError::NotConnected);
        }

        let mut groups = self.inner.groups()?;
        let queue = groups
            .entry((topic.to_string(), group.to_string()))
            .or_insert_with(|| {
                let (sender, receiver) = mpsc::unbounded_channel();
                GroupQueue {
                    sender,
                    receiver: Arc::new(tokio::sync::Mutex::new(receiver)),
                }
            });

        Ok(Box::new(InMemoryConsumer {
            receiver: Arc::clone(&queue.receiver),
        }))
    }

    async fn ack(&self, topic: &str, group: &str, record: &Record) -> Result<(), BusError> {
        let mut unacked = self.inner.unacked()?;
        if let Some(pending) = unacked.get_mut(&(topic.to_string(), group.to_string())) {
            pending.remove(&record.id);
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), BusError> {
        self.inner.connected.store(false, Ordering::SeqCst);
        // Dropping the senders ends every consumer once its queue drains
        self.inner.groups()?.clear();
        Ok(())
    }
}

struct InMemoryConsumer {
    receiver: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Record>>>,
}

#[async_trait]
impl BrokerConsumer for InMemoryConsumer {
    async fn next(&mut self) -> Result<Option<Record>, BusError> {
        let mut receiver = self.receiver.lock().await;
        Ok(receiver.recv().await)
    }
}
