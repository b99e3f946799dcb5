//! The decode → dispatch → acknowledge pipeline shared by every stream.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use gsctl_core::decode_maybe_enveloped;

use crate::broker::{Broker, Delivery, StreamBinding, Subscription};
use crate::error::{BrokerResult, HandlerError};
use crate::handlers::MessageHandler;

pub const INITIAL_RECONNECT_DELAY: Duration = Duration::from_secs(1);
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);

/// Bounded redelivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Deliveries allowed before a failing message is rejected for good.
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 5 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Payload could not be decoded.
    Poison,
    /// A server for the match is already running.
    AlreadyRunning,
}

/// What to do with a delivery after handling it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    /// Acknowledge without effect; redelivery cannot help.
    Drop(DropReason),
    /// Negative-acknowledge and put back on the queue.
    Requeue,
    /// Negative-acknowledge without requeue. Terminal.
    Reject,
}

/// Map a handler outcome and the delivery count to a disposition.
pub fn decide(
    outcome: Result<(), &HandlerError>,
    delivery_count: u32,
    policy: RetryPolicy,
) -> Disposition {
    match outcome {
        Ok(()) => Disposition::Ack,
        Err(HandlerError::AlreadyRunning { .. }) => Disposition::Drop(DropReason::AlreadyRunning),
        Err(e) if !e.is_retryable() => Disposition::Drop(DropReason::Poison),
        Err(_) if delivery_count < policy.max_retries => Disposition::Requeue,
        Err(_) => Disposition::Reject,
    }
}

/// Capped exponential reconnect delay.
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
    initial: Duration,
    max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(INITIAL_RECONNECT_DELAY, MAX_RECONNECT_DELAY)
    }
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            current: initial,
            initial,
            max,
        }
    }

    /// Delay to wait now; doubles the next one up to the cap.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Counters for one stream's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub acked: u64,
    pub dropped: u64,
    pub requeued: u64,
    pub rejected: u64,
    pub reconnects: u64,
}

/// Consume one stream until shutdown.
///
/// Messages are processed one at a time in delivery order. A handler that
/// is running when shutdown is signalled finishes and its message is
/// acknowledged before the loop exits.
pub async fn run_stream<T>(
    broker: Arc<dyn Broker>,
    binding: StreamBinding,
    handler: Arc<dyn MessageHandler<T>>,
    policy: RetryPolicy,
    backoff: Backoff,
    mut shutdown: watch::Receiver<bool>,
) -> StreamStats
where
    T: DeserializeOwned + Send + 'static,
{
    let queue = binding.queue.clone();
    let mut backoff = backoff;
    let mut stats = StreamStats::default();

    'connection: loop {
        if *shutdown.borrow() {
            break;
        }

        match broker.subscribe(&binding).await {
            Ok(mut sub) => {
                backoff.reset();
                info!(%queue, "subscribed");

                loop {
                    let next = tokio::select! {
                        biased;
                        _ = shutdown.changed() => break 'connection,
                        next = sub.next() => next,
                    };

                    match next {
                        Ok(Some(delivery)) => {
                            let disposition = process(&queue, &delivery, &*handler, policy).await;
                            if let Err(e) = settle(&mut *sub, &delivery, disposition, &mut stats).await {
                                warn!(%queue, tag = delivery.tag, error = %e, "failed to settle delivery, reconnecting");
                                break;
                            }
                        }
                        Ok(None) => {
                            warn!(%queue, "subscription closed, reconnecting");
                            break;
                        }
                        Err(e) => {
                            warn!(%queue, error = %e, "subscription error, reconnecting");
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                warn!(%queue, error = %e, "subscribe failed");
            }
        }

        stats.reconnects += 1;
        let delay = backoff.next_delay();
        debug!(%queue, ?delay, "waiting before resubscribe");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => break,
        }
    }

    info!(%queue, ?stats, "stream stopped");
    stats
}

async fn process<T: DeserializeOwned>(
    queue: &str,
    delivery: &Delivery,
    handler: &dyn MessageHandler<T>,
    policy: RetryPolicy,
) -> Disposition {
    let message = match decode_maybe_enveloped::<T>(&delivery.body) {
        Ok(m) => m,
        Err(e) => {
            warn!(%queue, tag = delivery.tag, error = %e, "undecodable message dropped");
            return Disposition::Drop(DropReason::Poison);
        }
    };

    let outcome = handler.handle(message).await;
    if let Err(e) = &outcome {
        warn!(
            %queue,
            tag = delivery.tag,
            delivery_count = delivery.delivery_count,
            error = %e,
            "handler failed"
        );
    }
    decide(outcome.as_ref().map(|_| ()), delivery.delivery_count, policy)
}

async fn settle(
    sub: &mut dyn Subscription,
    delivery: &Delivery,
    disposition: Disposition,
    stats: &mut StreamStats,
) -> BrokerResult<()> {
    match disposition {
        Disposition::Ack => {
            sub.ack(delivery.tag).await?;
            stats.acked += 1;
        }
        Disposition::Drop(reason) => {
            sub.ack(delivery.tag).await?;
            debug!(tag = delivery.tag, ?reason, "message dropped");
            stats.dropped += 1;
        }
        Disposition::Requeue => {
            sub.nack(delivery.tag, true).await?;
            stats.requeued += 1;
        }
        Disposition::Reject => {
            sub.nack(delivery.tag, false).await?;
            error!(
                tag = delivery.tag,
                delivery_count = delivery.delivery_count,
                "message rejected after exhausting retries"
            );
            stats.rejected += 1;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use gsctl_core::{KillServerRequestedEvent, Region};
    use gsctl_state::StateError;

    use super::*;
    use crate::memory::MemoryBroker;

    fn policy() -> RetryPolicy {
        RetryPolicy { max_retries: 3 }
    }

    #[test]
    fn success_acks() {
        assert_eq!(decide(Ok(()), 1, policy()), Disposition::Ack);
    }

    #[test]
    fn already_running_is_dropped_on_any_delivery() {
        let e = HandlerError::AlreadyRunning { match_id: 1 };
        assert_eq!(
            decide(Err(&e), 1, policy()),
            Disposition::Drop(DropReason::AlreadyRunning)
        );
        assert_eq!(
            decide(Err(&e), 10, policy()),
            Disposition::Drop(DropReason::AlreadyRunning)
        );
    }

    #[test]
    fn retryable_failure_requeues_until_limit() {
        let e = HandlerError::State(StateError::Write("disk".to_string()));
        assert_eq!(decide(Err(&e), 1, policy()), Disposition::Requeue);
        assert_eq!(decide(Err(&e), 2, policy()), Disposition::Requeue);
        assert_eq!(decide(Err(&e), 3, policy()), Disposition::Reject);
        assert_eq!(decide(Err(&e), 4, policy()), Disposition::Reject);
    }

    #[test]
    fn backoff_doubles_to_cap_and_resets() {
        let mut b = Backoff::default();
        let delays: Vec<_> = (0..7).map(|_| b.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30]);
        b.reset();
        assert_eq!(b.next_delay(), Duration::from_secs(1));
    }

    /// Fails the first `failures` calls, then succeeds.
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl MessageHandler<KillServerRequestedEvent> for Flaky {
        async fn handle(&self, msg: KillServerRequestedEvent) -> Result<(), HandlerError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if msg.match_id < 0 {
                return Err(HandlerError::AlreadyRunning { match_id: msg.match_id });
            }
            if n < self.failures {
                return Err(HandlerError::State(StateError::Write("transient".to_string())));
            }
            Ok(())
        }
    }

    async fn wait_until(mut f: impl FnMut() -> bool) {
        for _ in 0..200 {
            if f() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    fn fast_backoff() -> Backoff {
        Backoff::new(Duration::from_millis(5), Duration::from_millis(20))
    }

    #[tokio::test]
    async fn stream_retries_then_acks() {
        let broker = MemoryBroker::new();
        let binding = StreamBinding::kill();
        broker.declare(&binding);
        let handler = Arc::new(Flaky {
            failures: 2,
            calls: AtomicU32::new(0),
        });
        let (tx, rx) = watch::channel(false);

        let task = tokio::spawn(run_stream::<KillServerRequestedEvent>(
            Arc::new(broker.clone()),
            binding.clone(),
            handler.clone(),
            policy(),
            fast_backoff(),
            rx,
        ));

        broker
            .publish(&binding.exchange, &binding.routing_key, br#"{"matchId": 1}"#.to_vec())
            .await
            .unwrap();
        wait_until(|| broker.acked(&binding.queue) == 1).await;

        tx.send(true).unwrap();
        let stats = task.await.unwrap();
        assert_eq!(stats.requeued, 2);
        assert_eq!(stats.acked, 1);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stream_rejects_after_max_retries() {
        let broker = MemoryBroker::new();
        let binding = StreamBinding::kill();
        broker.declare(&binding);
        let handler = Arc::new(Flaky {
            failures: u32::MAX,
            calls: AtomicU32::new(0),
        });
        let (tx, rx) = watch::channel(false);

        let task = tokio::spawn(run_stream::<KillServerRequestedEvent>(
            Arc::new(broker.clone()),
            binding.clone(),
            handler.clone(),
            policy(),
            fast_backoff(),
            rx,
        ));

        broker
            .publish(&binding.exchange, &binding.routing_key, br#"{"matchId": 2}"#.to_vec())
            .await
            .unwrap();
        wait_until(|| broker.dead_letters(&binding.queue).len() == 1).await;

        tx.send(true).unwrap();
        let stats = task.await.unwrap();
        assert_eq!(stats.rejected, 1);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn poison_and_already_running_are_dropped() {
        let broker = MemoryBroker::new();
        let binding = StreamBinding::kill();
        broker.declare(&binding);
        let handler = Arc::new(Flaky {
            failures: 0,
            calls: AtomicU32::new(0),
        });
        let (tx, rx) = watch::channel(false);

        let task = tokio::spawn(run_stream::<KillServerRequestedEvent>(
            Arc::new(broker.clone()),
            binding.clone(),
            handler.clone(),
            policy(),
            fast_backoff(),
            rx,
        ));

        for body in [&b"garbage"[..], br#"{"matchId": -1}"#] {
            broker
                .publish(&binding.exchange, &binding.routing_key, body.to_vec())
                .await
                .unwrap();
        }
        wait_until(|| broker.acked(&binding.queue) == 2).await;

        tx.send(true).unwrap();
        let stats = task.await.unwrap();
        assert_eq!(stats.dropped, 2);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        assert!(broker.dead_letters(&binding.queue).is_empty());
    }

    #[tokio::test]
    async fn stream_resubscribes_after_disconnect() {
        let broker = MemoryBroker::new();
        let binding = StreamBinding::launch(&Region::new("ru_moscow"));
        broker.declare(&binding);
        let handler = Arc::new(Flaky {
            failures: 0,
            calls: AtomicU32::new(0),
        });
        let (tx, rx) = watch::channel(false);

        let task = tokio::spawn(run_stream::<KillServerRequestedEvent>(
            Arc::new(broker.clone()),
            binding.clone(),
            handler.clone(),
            policy(),
            fast_backoff(),
            rx,
        ));

        broker.disconnect();
        tokio::time::sleep(Duration::from_millis(30)).await;
        broker.reconnect();

        broker
            .publish(&binding.exchange, &binding.routing_key, br#"{"matchId": 9}"#.to_vec())
            .await
            .unwrap();
        wait_until(|| broker.acked(&binding.queue) == 1).await;

        tx.send(true).unwrap();
        let stats = task.await.unwrap();
        assert!(stats.reconnects >= 1);
        assert_eq!(stats.acked, 1);
    }

    #[tokio::test]
    async fn shutdown_stops_idle_stream() {
        let broker = MemoryBroker::new();
        let handler = Arc::new(Flaky {
            failures: 0,
            calls: AtomicU32::new(0),
        });
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(run_stream::<KillServerRequestedEvent>(
            Arc::new(broker),
            StreamBinding::kill(),
            handler,
            policy(),
            fast_backoff(),
            rx,
        ));

        tx.send(true).unwrap();
        let stats = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stats, StreamStats::default());
    }
}
