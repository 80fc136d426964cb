//! Event Bus
//!
//! At-least-once publish/subscribe with consumer groups. [`EventBus`] is the
//! adapter the rest of the crate talks to; brokers sit behind the [`Broker`]
//! trait.

mod adapter;
mod broker;
mod error;
mod memory;
#[cfg(feature = "redis")]
mod redis_streams;

use std::sync::Arc;

pub use adapter::{BusSettings, EventBus, EventHandler, HandlerError};
pub use broker::{Broker, BrokerConsumer, OutgoingRecord, Record};
pub use error::BusError;
pub use memory::InMemoryBroker;
#[cfg(feature = "redis")]
pub use redis_streams::RedisStreamsBroker;

/// Build a broker from the configured broker addresses.
///
/// The first address picks the transport: `memory://` or `redis://` /
/// `rediss://` (the latter needs the `redis` feature).
pub fn broker_from_addresses(
    addresses: &[String],
    client_id: &str,
) -> Result<Arc<dyn Broker>, BusError> {
    let address = addresses
        .first()
        .ok_or_else(|| BusError::UnsupportedBroker("no broker address".to_string()))?;

    if address.starts_with("memory://") {
        return Ok(Arc::new(InMemoryBroker::new()));
    }

    if address.starts_with("redis://") || address.starts_with("rediss://") {
        #[cfg(feature = "redis")]
        {
            return Ok(Arc::new(RedisStreamsBroker::new(address, client_id)?));
        }
        #[cfg(not(feature = "redis"))]
        {
            let _ = client_id;
            return Err(BusError::UnsupportedBroker(format!(
                "{address} (built without the redis feature)"
            )));
        }
    }

    Err(BusError::UnsupportedBroker(address.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_address() {
        let broker = broker_from_addresses(&["memory://local".to_string()], "svc");
        assert!(broker.is_ok());
    }

    #[test]
    fn test_unknown_scheme_rejected() {
        let result = broker_from_addresses(&["kafka://broker:9092".to_string()], "svc");
        assert!(matches!(result, Err(BusError::UnsupportedBroker(_))));
    }

    #[test]
    fn test_empty_addresses_rejected() {
        let result = broker_from_addresses(&[], "svc");
        assert!(matches!(result, Err(BusError::UnsupportedBroker(_))));
    }
}
