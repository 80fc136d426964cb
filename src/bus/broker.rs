//! Broker transport seam
//!
//! The adapter only needs four things from a broker: append a record to a
//! topic, read a topic as a member of a consumer group, acknowledge a record
//! for that group, and close. Each record goes to exactly one consumer per
//! group and every group sees every record.

use async_trait::async_trait;

use super::BusError;

/// A record to append to a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingRecord {
    /// Partitioning key; records sharing a key keep their relative order.
    pub key: Option<String>,
    /// JSON payload
    pub payload: String,
}

/// A record delivered to a consumer group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Broker-assigned position, used for acknowledgement
    pub id: String,
    pub key: Option<String>,
    pub payload: String,
}

#[async_trait]
pub trait Broker: Send + Sync {
    /// Open the producer connection.
    async fn connect(&self) -> Result<(), BusError>;

    async fn send(&self, topic: &str, record: OutgoingRecord) -> Result<(), BusError>;

    /// Join `group` on `topic`. The group is created if it does not exist.
    async fn consumer(&self, topic: &str, group: &str)
        -> Result<Box<dyn BrokerConsumer>, BusError>;

    /// Mark a record as processed for `group`.
    async fn ack(&self, topic: &str, group: &str, record: &Record) -> Result<(), BusError>;

    /// Close the producer and end every open consumer.
    async fn disconnect(&self) -> Result<(), BusError>;
}

#[async_trait]
pub trait BrokerConsumer: Send {
    /// Wait for the next record. `None` means the broker has been closed.
    ///
    /// Must be cancel-safe: the receive loop races it against shutdown.
    async fn next(&mut self) -> Result<Option<Record>, BusError>;
}
