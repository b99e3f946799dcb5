//! HTTP webhook sink.
//!
//! Each event is POSTed as JSON to `{base_url}/{channel}`. Transport
//! errors and 5xx responses are retried with a linear backoff
//! (`attempt * base_delay`); any other non-success status is final.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use gsctl_core::JsonClient;

use crate::error::{EventError, EventResult};
use crate::event::ControllerEvent;
use crate::sink::EventSink;

const DEFAULT_ATTEMPTS: u32 = 3;
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
pub struct WebhookSink {
    client: JsonClient,
    max_attempts: u32,
    base_delay: Duration,
}

impl WebhookSink {
    pub fn new(client: JsonClient) -> Self {
        Self {
            client,
            max_attempts: DEFAULT_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }

    /// Total attempts per event, including the first. Clamped to at least 1.
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }
}

#[async_trait]
impl EventSink for WebhookSink {
    async fn publish(&self, event: &ControllerEvent) -> EventResult<()> {
        let channel = event.channel();
        let payload = event.payload()?;
        let path = format!("/{channel}");

        let mut last = String::new();
        for attempt in 1..=self.max_attempts {
            match self.client.post(&path, &payload).await {
                Ok(resp) if resp.status.is_success() => {
                    debug!(channel, attempt, "event delivered");
                    return Ok(());
                }
                Ok(resp) if resp.status.is_server_error() => {
                    last = format!("{}: {}", resp.status, resp.text());
                }
                Ok(resp) => {
                    return Err(EventError::Rejected {
                        channel: channel.to_string(),
                        status: resp.status.as_u16(),
                        body: resp.text(),
                    });
                }
                Err(e) => {
                    last = e.to_string();
                }
            }

            warn!(channel, attempt, max = self.max_attempts, error = %last, "event publish failed");
            if attempt < self.max_attempts {
                tokio::time::sleep(self.base_delay * attempt).await;
            }
        }

        Err(EventError::Exhausted {
            channel: channel.to_string(),
            attempts: self.max_attempts,
            last,
        })
    }
}
