//! gsctl-events — outbound event publication.
//!
//! Events are published on a channel named after the event type
//! (`ServerStatusEvent`, `NoFreeServerEvent`, `MatchStatusChangedEvent`).
//! Sinks are fire-and-report: a failed publish is returned to the caller,
//! which logs it and carries on; no loop stops because a notification
//! could not be delivered.

pub mod error;
pub mod event;
pub mod sink;
pub mod webhook;

pub use error::{EventError, EventResult};
pub use event::ControllerEvent;
pub use sink::{EventSink, LogSink, MemorySink, SharedSink};
pub use webhook::WebhookSink;
