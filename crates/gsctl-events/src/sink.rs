use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::info;

use crate::error::EventResult;
use crate::event::ControllerEvent;

/// Destination for controller events.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: &ControllerEvent) -> EventResult<()>;
}

/// Sink handle shared between loops.
pub type SharedSink = Arc<dyn EventSink>;

/// Writes events to the log. Used when no webhook is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl EventSink for LogSink {
    async fn publish(&self, event: &ControllerEvent) -> EventResult<()> {
        let payload = event.payload()?;
        info!(channel = event.channel(), %payload, "event");
        Ok(())
    }
}

/// Records events in memory.
#[derive(Clone, Default)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<ControllerEvent>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events published so far.
    pub fn events(&self) -> Vec<ControllerEvent> {
        self.events.lock().clone()
    }

    /// Events published on `channel`.
    pub fn on_channel(&self, channel: &str) -> Vec<ControllerEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.channel() == channel)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

#[async_trait]
impl EventSink for MemorySink {
    async fn publish(&self, event: &ControllerEvent) -> EventResult<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}
