//! gsctl-consumer — inbound command streams.
//!
//! One stream per region (`LaunchGameServerCommand.{region}`) plus one
//! kill stream (`KillServerRequestedEvent`). Every stream runs the same
//! pipeline:
//!
//! ```text
//! Broker::subscribe ──► Subscription::next ──► decode ──► MessageHandler
//!        ▲                                                    │
//!        │ reconnect (1s → 30s backoff)                       ▼
//!        └──────────── connection lost            decide() → ack / nack
//! ```
//!
//! # Dispositions
//!
//! | Outcome                              | Action                    |
//! |--------------------------------------|---------------------------|
//! | handled                              | ack                       |
//! | undecodable payload                  | ack and drop (poison)     |
//! | server already running               | ack and drop              |
//! | other failure, deliveries < max      | nack, requeue             |
//! | other failure, deliveries >= max     | nack, no requeue (terminal)|

pub mod broker;
pub mod error;
pub mod handlers;
pub mod memory;
pub mod pipeline;

pub use broker::{Broker, Delivery, EXCHANGE, StreamBinding, Subscription};
pub use error::{BrokerError, BrokerResult, HandlerError};
pub use handlers::{KillHandler, LaunchHandler, MessageHandler};
pub use memory::MemoryBroker;
pub use pipeline::{Backoff, Disposition, DropReason, RetryPolicy, StreamStats, decide, run_stream};
