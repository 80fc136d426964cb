//! Redis Streams broker (durable, at-least-once delivery).
//!
//! - **Topic**: one stream per topic, keyed by the topic name
//! - **Consumer groups**: `XGROUP CREATE ... MKSTREAM`, created on demand
//! - **Records**: `XADD` with `key` and `payload` fields
//! - **Delivery**: `XREADGROUP` with `BLOCK`; `XACK` once handled
//!
//! A process joins every group under its `client_id`, so a restarted process
//! is the same consumer as before. Entries it had read but not acknowledged
//! are still in its pending list; the consumer replays that list (reading
//! from id `0`) before it asks for new entries with `>`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::broker::{Broker, BrokerConsumer, OutgoingRecord, Record};
use super::BusError;

/// How long one XREADGROUP call blocks waiting for new entries
const READ_BLOCK_MS: usize = 1_000;

/// Entries fetched per XREADGROUP call
const READ_BATCH: usize = 16;

pub struct RedisStreamsBroker {
    client: redis::Client,
    client_id: String,
    producer: RwLock<Option<MultiplexedConnection>>,
    closed: Arc<AtomicBool>,
}

impl RedisStreamsBroker {
    /// Create a broker for `redis_url`. Nothing is opened until `connect`.
    pub fn new(redis_url: &str, client_id: impl Into<String>) -> Result<Self, BusError> {
        let client =
            redis::Client::open(redis_url).map_err(|e| BusError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            client_id: client_id.into(),
            producer: RwLock::new(None),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    async fn producer(&self) -> Result<MultiplexedConnection, BusError> {
        self.producer
            .read()
            .await
            .clone()
            .ok_or(BusError::NotConnected)
    }

    /// Ensure a consumer group exists (idempotent).
    async fn ensure_consumer_group(
        conn: &mut MultiplexedConnection,
        topic: &str,
        group: &str,
    ) -> Result<(), BusError> {
        // "$" starts a new group at the tail of the stream
        let created: Result<(), redis::RedisError> =
            conn.xgroup_create_mkstream(topic, group, "$").await;

        match created {
            Ok(()) => Ok(()),
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl Broker for RedisStreamsBroker {
    async fn connect(&self) -> Result<(), BusError> {
        let conn = self.client.get_multiplexed_async_connection().await?;
        *self.producer.write().await = Some(conn);
        self.closed.store(false, Ordering::SeqCst);

        info!(client_id = %self.client_id, "Connected to Redis Streams");
        Ok(())
    }

    async fn send(&self, topic: &str, record: OutgoingRecord) -> Result<(), BusError> {
        let mut conn = self.producer().await?;

        let key = record.key.unwrap_or_default();
        let fields = [("key", key.as_str()), ("payload", record.payload.as_str())];
        let entry_id: String = conn.xadd(topic, "*", &fields).await?;

        debug!(topic = %topic, entry_id = %entry_id, "Record appended");
        Ok(())
    }

    async fn consumer(
        &self,
        topic: &str,
        group: &str,
    ) -> Result<Box<dyn BrokerConsumer>, BusError> {
        // Blocking reads get their own connection so they never stall sends
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        Self::ensure_consumer_group(&mut conn, topic, group).await?;

        let name = self.client_id.clone();
        info!(topic = %topic, group = %group, consumer = %name, "Joined consumer group");

        Ok(Box::new(RedisStreamsConsumer {
            conn,
            topic: topic.to_string(),
            options: StreamReadOptions::default()
                .group(group, name)
                .block(READ_BLOCK_MS)
                .count(READ_BATCH),
            cursor: ReadCursor::Pending("0".to_string()),
            buffered: VecDeque::new(),
            closed: Arc::clone(&self.closed),
        }))
    }

    async fn ack(&self, topic: &str, group: &str, record: &Record) -> Result<(), BusError> {
        let mut conn = self.producer().await?;
        let _: u64 = conn.xack(topic, group, &[record.id.as_str()]).await?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), BusError> {
        self.closed.store(true, Ordering::SeqCst);
        self.producer.write().await.take();
        info!(client_id = %self.client_id, "Disconnected from Redis Streams");
        Ok(())
    }
}

/// Where the next XREADGROUP starts.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ReadCursor {
    /// Replaying this consumer's own pending entries after the given id
    Pending(String),
    /// Only entries never delivered to the group
    New,
}

impl ReadCursor {
    fn id(&self) -> &str {
        match self {
            ReadCursor::Pending(after) => after,
            ReadCursor::New => ">",
        }
    }

    /// Move past a batch. An empty pending batch means the backlog is done.
    fn advance(&mut self, last_id: Option<&str>) {
        if *self == ReadCursor::New {
            return;
        }
        *self = match last_id {
            Some(id) => ReadCursor::Pending(id.to_string()),
            None => ReadCursor::New,
        };
    }
}

struct RedisStreamsConsumer {
    conn: MultiplexedConnection,
    topic: String,
    options: StreamReadOptions,
    cursor: ReadCursor,
    buffered: VecDeque<Record>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl BrokerConsumer for RedisStreamsConsumer {
    async fn next(&mut self) -> Result<Option<Record>, BusError> {
        loop {
            if let Some(record) = self.buffered.pop_front() {
                return Ok(Some(record));
            }
            if self.closed.load(Ordering::SeqCst) {
                return Ok(None);
            }

            // A BLOCK timeout comes back as nil. Reads of the pending list
            // never block.
            let reply: Option<StreamReadReply> = self
                .conn
                .xread_options(&[self.topic.as_str()], &[self.cursor.id()], &self.options)
                .await?;

            let entries: Vec<_> = reply
                .into_iter()
                .flat_map(|reply| reply.keys)
                .flat_map(|stream| stream.ids)
                .collect();

            let replaying = self.cursor != ReadCursor::New;
            self.cursor.advance(entries.last().map(|entry| entry.id.as_str()));
            if replaying && self.cursor == ReadCursor::New {
                debug!(topic = %self.topic, "Pending entries replayed");
            }

            for entry in entries {
                // Pending entries deleted from the stream come back without fields
                let Some(payload) = entry.get::<String>("payload") else {
                    debug!(entry_id = %entry.id, "Skipping entry without payload");
                    continue;
                };
                let key = entry.get::<String>("key").filter(|k| !k.is_empty());
                if replaying {
                    info!(entry_id = %entry.id, "Redelivering unacknowledged entry");
                }
                self.buffered.push_back(Record {
                    id: entry.id,
                    key,
                    payload,
                });
            }
        }
    }
}
