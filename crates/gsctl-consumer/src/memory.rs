//! In-process broker.
//!
//! Queues with manual ack, exact-match routing on (exchange, routing key)
//! and per-message delivery counting. `disconnect`/`reconnect` simulate a
//! lost connection: open subscriptions close, unacknowledged messages go
//! back to the head of their queue, and publish/subscribe fail until the
//! broker is reconnected.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::debug;

use crate::broker::{Broker, Delivery, StreamBinding, Subscription};
use crate::error::{BrokerError, BrokerResult};

#[derive(Debug, Clone)]
struct Message {
    body: Vec<u8>,
    deliveries: u32,
}

#[derive(Default)]
struct Queue {
    ready: VecDeque<Message>,
    unacked: HashMap<u64, Message>,
    acked: u64,
    dead_letters: Vec<Vec<u8>>,
}

struct Inner {
    queues: HashMap<String, Queue>,
    /// (exchange, routing key) → queues.
    routes: HashMap<(String, String), Vec<String>>,
    next_tag: u64,
    connected: bool,
    /// Bumped on every disconnect; subscriptions from older epochs are closed.
    epoch: u64,
}

#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<Mutex<Inner>>,
    notify: Arc<Notify>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                queues: HashMap::new(),
                routes: HashMap::new(),
                next_tag: 1,
                connected: true,
                epoch: 0,
            })),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Declare a queue and its binding without consuming from it.
    pub fn declare(&self, binding: &StreamBinding) {
        let mut inner = self.inner.lock();
        declare_locked(&mut inner, binding);
    }

    /// Drop the connection.
    pub fn disconnect(&self) {
        {
            let mut inner = self.inner.lock();
            inner.connected = false;
            inner.epoch += 1;
            for queue in inner.queues.values_mut() {
                let mut pending: Vec<_> = queue.unacked.drain().collect();
                // Restore delivery order ahead of messages never delivered.
                pending.sort_by_key(|(tag, _)| std::cmp::Reverse(*tag));
                for (_, msg) in pending {
                    queue.ready.push_front(msg);
                }
            }
        }
        debug!("memory broker disconnected");
        self.notify.notify_waiters();
    }

    pub fn reconnect(&self) {
        self.inner.lock().connected = true;
        debug!("memory broker reconnected");
        self.notify.notify_waiters();
    }

    /// Ready plus unacknowledged messages.
    pub fn depth(&self, queue: &str) -> usize {
        self.inner
            .lock()
            .queues
            .get(queue)
            .map(|q| q.ready.len() + q.unacked.len())
            .unwrap_or(0)
    }

    pub fn acked(&self, queue: &str) -> u64 {
        self.inner
            .lock()
            .queues
            .get(queue)
            .map(|q| q.acked)
            .unwrap_or(0)
    }

    /// Bodies rejected without requeue.
    pub fn dead_letters(&self, queue: &str) -> Vec<Vec<u8>> {
        self.inner
            .lock()
            .queues
            .get(queue)
            .map(|q| q.dead_letters.clone())
            .unwrap_or_default()
    }
}

fn declare_locked(inner: &mut Inner, binding: &StreamBinding) {
    inner.queues.entry(binding.queue.clone()).or_default();
    let queues = inner
        .routes
        .entry((binding.exchange.clone(), binding.routing_key.clone()))
        .or_default();
    if !queues.contains(&binding.queue) {
        queues.push(binding.queue.clone());
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn subscribe(&self, binding: &StreamBinding) -> BrokerResult<Box<dyn Subscription>> {
        let epoch = {
            let mut inner = self.inner.lock();
            if !inner.connected {
                return Err(BrokerError::Disconnected);
            }
            declare_locked(&mut inner, binding);
            inner.epoch
        };
        Ok(Box::new(MemorySubscription {
            broker: self.clone(),
            queue: binding.queue.clone(),
            epoch,
        }))
    }

    async fn publish(&self, exchange: &str, routing_key: &str, body: Vec<u8>) -> BrokerResult<()> {
        {
            let mut inner = self.inner.lock();
            if !inner.connected {
                return Err(BrokerError::Disconnected);
            }
            let targets = inner
                .routes
                .get(&(exchange.to_string(), routing_key.to_string()))
                .cloned()
                .unwrap_or_default();
            if targets.is_empty() {
                return Err(BrokerError::Unroutable {
                    exchange: exchange.to_string(),
                    routing_key: routing_key.to_string(),
                });
            }
            for name in targets {
                inner.queues.entry(name).or_default().ready.push_back(Message {
                    body: body.clone(),
                    deliveries: 0,
                });
            }
        }
        self.notify.notify_waiters();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.inner.lock().connected
    }
}

struct MemorySubscription {
    broker: MemoryBroker,
    queue: String,
    epoch: u64,
}

impl MemorySubscription {
    fn with_queue<T>(
        &self,
        f: impl FnOnce(&mut Queue) -> BrokerResult<T>,
    ) -> BrokerResult<T> {
        let mut inner = self.broker.inner.lock();
        if !inner.connected || inner.epoch != self.epoch {
            return Err(BrokerError::Disconnected);
        }
        let queue = inner.queues.entry(self.queue.clone()).or_default();
        f(queue)
    }
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn next(&mut self) -> BrokerResult<Option<Delivery>> {
        loop {
            // Register for wakeups before checking, so a publish in between
            // is not missed.
            let notified = self.broker.notify.notified();
            {
                let mut inner = self.broker.inner.lock();
                if !inner.connected || inner.epoch != self.epoch {
                    return Ok(None);
                }
                let tag = inner.next_tag;
                let queue = inner.queues.entry(self.queue.clone()).or_default();
                if let Some(mut msg) = queue.ready.pop_front() {
                    msg.deliveries += 1;
                    let delivery = Delivery {
                        tag,
                        body: msg.body.clone(),
                        delivery_count: msg.deliveries,
                    };
                    queue.unacked.insert(tag, msg);
                    inner.next_tag += 1;
                    return Ok(Some(delivery));
                }
            }
            notified.await;
        }
    }

    async fn ack(&mut self, tag: u64) -> BrokerResult<()> {
        self.with_queue(|queue| {
            queue.unacked.remove(&tag).ok_or(BrokerError::UnknownTag(tag))?;
            queue.acked += 1;
            Ok(())
        })
    }

    async fn nack(&mut self, tag: u64, requeue: bool) -> BrokerResult<()> {
        self.with_queue(|queue| {
            let msg = queue.unacked.remove(&tag).ok_or(BrokerError::UnknownTag(tag))?;
            if requeue {
                queue.ready.push_front(msg);
            } else {
                queue.dead_letters.push(msg.body);
            }
            Ok(())
        })?;
        if requeue {
            self.broker.notify.notify_waiters();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use gsctl_core::Region;

    fn binding() -> StreamBinding {
        StreamBinding::launch(&Region::new("eu_czech"))
    }

    async fn publish(broker: &MemoryBroker, body: &[u8]) {
        let b = binding();
        broker
            .publish(&b.exchange, &b.routing_key, body.to_vec())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unbound_routing_key_is_unroutable() {
        let broker = MemoryBroker::new();
        let err = broker.publish("app.events", "nowhere", vec![1]).await.unwrap_err();
        assert!(matches!(err, BrokerError::Unroutable { .. }));
    }

    #[tokio::test]
    async fn deliveries_arrive_in_order_and_ack_removes() {
        let broker = MemoryBroker::new();
        let mut sub = broker.subscribe(&binding()).await.unwrap();
        publish(&broker, b"a").await;
        publish(&broker, b"b").await;

        let first = sub.next().await.unwrap().unwrap();
        assert_eq!(first.body, b"a");
        assert_eq!(first.delivery_count, 1);
        sub.ack(first.tag).await.unwrap();

        let second = sub.next().await.unwrap().unwrap();
        assert_eq!(second.body, b"b");
        sub.ack(second.tag).await.unwrap();

        assert_eq!(broker.depth(&binding().queue), 0);
        assert_eq!(broker.acked(&binding().queue), 2);
        assert!(matches!(sub.ack(first.tag).await, Err(BrokerError::UnknownTag(_))));
    }

    #[tokio::test]
    async fn requeued_message_is_redelivered_first_with_higher_count() {
        let broker = MemoryBroker::new();
        let mut sub = broker.subscribe(&binding()).await.unwrap();
        publish(&broker, b"a").await;
        publish(&broker, b"b").await;

        let d = sub.next().await.unwrap().unwrap();
        sub.nack(d.tag, true).await.unwrap();

        let again = sub.next().await.unwrap().unwrap();
        assert_eq!(again.body, b"a");
        assert_eq!(again.delivery_count, 2);
    }

    #[tokio::test]
    async fn rejected_message_is_dead_lettered() {
        let broker = MemoryBroker::new();
        let mut sub = broker.subscribe(&binding()).await.unwrap();
        publish(&broker, b"x").await;

        let d = sub.next().await.unwrap().unwrap();
        sub.nack(d.tag, false).await.unwrap();

        assert_eq!(broker.depth(&binding().queue), 0);
        assert_eq!(broker.dead_letters(&binding().queue), vec![b"x".to_vec()]);
    }

    #[tokio::test]
    async fn next_waits_for_publish() {
        let broker = MemoryBroker::new();
        let mut sub = broker.subscribe(&binding()).await.unwrap();

        let publisher = broker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            publish(&publisher, b"late").await;
        });

        let d = tokio::time::timeout(Duration::from_secs(2), sub.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(d.body, b"late");
    }

    #[tokio::test]
    async fn disconnect_closes_subscriptions_and_requeues_unacked() {
        let broker = MemoryBroker::new();
        let mut sub = broker.subscribe(&binding()).await.unwrap();
        publish(&broker, b"a").await;
        let d = sub.next().await.unwrap().unwrap();

        broker.disconnect();
        assert!(!broker.is_connected());
        assert!(sub.next().await.unwrap().is_none());
        assert!(matches!(sub.ack(d.tag).await, Err(BrokerError::Disconnected)));
        assert!(broker.subscribe(&binding()).await.is_err());

        broker.reconnect();
        let mut sub = broker.subscribe(&binding()).await.unwrap();
        let again = sub.next().await.unwrap().unwrap();
        assert_eq!(again.body, b"a");
        assert_eq!(again.delivery_count, 2);
    }
}
