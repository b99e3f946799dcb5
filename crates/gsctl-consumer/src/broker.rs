//! Broker abstraction: topic-routed publish, queue subscriptions with
//! manual acknowledgement.

use async_trait::async_trait;

use gsctl_core::Region;

use crate::error::BrokerResult;

/// Exchange all command streams are bound to.
pub const EXCHANGE: &str = "app.events";

const QUEUE_PREFIX: &str = "gsctl";
const LAUNCH_KEY: &str = "LaunchGameServerCommand";
const KILL_KEY: &str = "KillServerRequestedEvent";

/// A queue bound to an exchange by routing key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamBinding {
    pub exchange: String,
    pub routing_key: String,
    pub queue: String,
}

impl StreamBinding {
    pub fn new(exchange: &str, routing_key: impl Into<String>) -> Self {
        let routing_key = routing_key.into();
        Self {
            exchange: exchange.to_string(),
            queue: format!("{QUEUE_PREFIX}.{routing_key}"),
            routing_key,
        }
    }

    /// `LaunchGameServerCommand.{region}`.
    pub fn launch(region: &Region) -> Self {
        Self::new(EXCHANGE, launch_routing_key(region))
    }

    /// `KillServerRequestedEvent`.
    pub fn kill() -> Self {
        Self::new(EXCHANGE, KILL_KEY)
    }
}

pub fn launch_routing_key(region: &Region) -> String {
    format!("{LAUNCH_KEY}.{region}")
}

pub fn kill_routing_key() -> &'static str {
    KILL_KEY
}

/// One message handed to a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub tag: u64,
    pub body: Vec<u8>,
    /// 1 on first delivery, incremented on every redelivery.
    pub delivery_count: u32,
}

#[async_trait]
pub trait Broker: Send + Sync {
    /// Declare the binding's queue and start consuming from it.
    async fn subscribe(&self, binding: &StreamBinding) -> BrokerResult<Box<dyn Subscription>>;

    /// Route a message to every queue bound to `exchange`/`routing_key`.
    async fn publish(&self, exchange: &str, routing_key: &str, body: Vec<u8>) -> BrokerResult<()>;

    fn is_connected(&self) -> bool;
}

/// A live consumer on one queue.
///
/// `next` must be cancellation safe: dropping its future must not lose a
/// message.
#[async_trait]
pub trait Subscription: Send {
    /// Wait for the next delivery. `Ok(None)` means the subscription was
    /// closed by the broker and the caller should resubscribe.
    async fn next(&mut self) -> BrokerResult<Option<Delivery>>;

    async fn ack(&mut self, tag: u64) -> BrokerResult<()>;

    async fn nack(&mut self, tag: u64, requeue: bool) -> BrokerResult<()>;
}
