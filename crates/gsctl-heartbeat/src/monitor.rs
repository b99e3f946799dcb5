//! Heartbeat monitor — periodic sweep of server heartbeat records.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use gsctl_core::{ServerStatusEvent, epoch_secs};
use gsctl_events::{ControllerEvent, SharedSink};
use gsctl_state::{ServerHeartbeatRecord, StateResult, StateStore};

use crate::liveness::{Liveness, evaluate};

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(40);

#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    pub interval: Duration,
    /// Age after which a heartbeat means the server is gone.
    pub timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_HEARTBEAT_INTERVAL,
            timeout: DEFAULT_HEARTBEAT_TIMEOUT,
        }
    }
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeartbeatReport {
    pub alive: usize,
    pub dead: usize,
    /// Records that could not be read or decoded. Undecodable ones are removed.
    pub skipped: usize,
    pub publish_errors: usize,
}

#[derive(Clone)]
pub struct HeartbeatMonitor {
    state: StateStore,
    sink: SharedSink,
    config: HeartbeatConfig,
}

impl HeartbeatMonitor {
    pub fn new(state: StateStore, sink: SharedSink, config: HeartbeatConfig) -> Self {
        Self {
            state,
            sink,
            config,
        }
    }

    pub async fn check_once(&self) -> StateResult<HeartbeatReport> {
        self.check_at(epoch_secs()).await
    }

    /// Sweep all heartbeat records as if the current time were `now`.
    pub async fn check_at(&self, now: u64) -> StateResult<HeartbeatReport> {
        let mut report = HeartbeatReport::default();

        for url in self.state.list_heartbeat_keys()? {
            let Some(record) = self.load(&url) else {
                report.skipped += 1;
                continue;
            };

            let liveness = evaluate(record.timestamp, now, self.config.timeout);
            if liveness == Liveness::Dead {
                info!(url = %url, match_id = record.match_id, last_seen = record.timestamp, "gameserver heartbeat expired");
                if let Err(e) = self.state.delete_heartbeat(&url) {
                    error!(url = %url, error = %e, "failed to remove expired heartbeat");
                }
                report.dead += 1;
            } else {
                report.alive += 1;
            }

            let event = ControllerEvent::from(ServerStatusEvent {
                url: url.clone(),
                is_running: liveness.is_running(),
            });
            if let Err(e) = self.sink.publish(&event).await {
                warn!(url = %url, error = %e, "failed to publish server status");
                report.publish_errors += 1;
            }
        }

        debug!(?report, "heartbeat sweep");
        Ok(report)
    }

    fn load(&self, url: &str) -> Option<ServerHeartbeatRecord> {
        let raw = match self.state.get_heartbeat_raw(url) {
            Ok(Some(raw)) => raw,
            // Removed between listing and reading.
            Ok(None) => return None,
            Err(e) => {
                warn!(url = %url, error = %e, "failed to read heartbeat");
                return None;
            }
        };
        match serde_json::from_slice(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(url = %url, error = %e, "undecodable heartbeat record, discarding");
                if let Err(e) = self.state.delete_heartbeat(url) {
                    error!(url = %url, error = %e, "failed to remove undecodable heartbeat");
                }
                None
            }
        }
    }

    /// Sweep every `interval` until `shutdown` changes.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            timeout_secs = self.config.timeout.as_secs(),
            "heartbeat monitor started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {
                    if let Err(e) = self.check_once().await {
                        error!(error = %e, "heartbeat sweep failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("heartbeat monitor shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use gsctl_events::MemorySink;

    use super::*;

    const NOW: u64 = 1_700_000_100;

    fn setup() -> (HeartbeatMonitor, StateStore, MemorySink) {
        let state = StateStore::open_in_memory().unwrap();
        let sink = MemorySink::new();
        let monitor = HeartbeatMonitor::new(
            state.clone(),
            Arc::new(sink.clone()),
            HeartbeatConfig::default(),
        );
        (monitor, state, sink)
    }

    fn heartbeat(url: &str, timestamp: i64) -> ServerHeartbeatRecord {
        ServerHeartbeatRecord {
            url: url.to_string(),
            match_id: 42,
            timestamp,
        }
    }

    fn status_event(url: &str, is_running: bool) -> ControllerEvent {
        ServerStatusEvent {
            url: url.to_string(),
            is_running,
        }
        .into()
    }

    #[tokio::test]
    async fn fresh_heartbeat_reports_running_and_survives() {
        let (monitor, state, sink) = setup();
        state.put_heartbeat(&heartbeat("10.0.0.1:30500", NOW as i64 - 10)).unwrap();

        let report = monitor.check_at(NOW).await.unwrap();
        assert_eq!(report.alive, 1);
        assert_eq!(report.dead, 0);
        assert_eq!(sink.events(), vec![status_event("10.0.0.1:30500", true)]);
        assert!(state.get_heartbeat("10.0.0.1:30500").unwrap().is_some());
    }

    #[tokio::test]
    async fn stale_heartbeat_reports_stopped_once_and_is_removed() {
        let (monitor, state, sink) = setup();
        state.put_heartbeat(&heartbeat("10.0.0.2:30502", NOW as i64 - 41)).unwrap();

        let report = monitor.check_at(NOW).await.unwrap();
        assert_eq!(report.dead, 1);
        assert!(state.get_heartbeat("10.0.0.2:30502").unwrap().is_none());

        monitor.check_at(NOW + 5).await.unwrap();
        assert_eq!(sink.events(), vec![status_event("10.0.0.2:30502", false)]);
    }

    #[tokio::test]
    async fn undecodable_record_is_skipped_and_removed() {
        let (monitor, state, sink) = setup();
        state.put_heartbeat_raw("garbage", b"not json").unwrap();
        state.put_heartbeat(&heartbeat("10.0.0.3:30504", NOW as i64)).unwrap();

        let report = monitor.check_at(NOW).await.unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.alive, 1);
        assert_eq!(sink.events().len(), 1);
        assert!(state.get_heartbeat_raw("garbage").unwrap().is_none());
        assert_eq!(state.list_heartbeat_keys().unwrap(), vec!["10.0.0.3:30504".to_string()]);

        let report = monitor.check_at(NOW).await.unwrap();
        assert_eq!(report.skipped, 0);
    }

    #[tokio::test]
    async fn empty_store_is_quiet() {
        let (monitor, _, sink) = setup();
        let report = monitor.check_at(NOW).await.unwrap();
        assert_eq!(report, HeartbeatReport::default());
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn run_sweeps_until_shutdown() {
        let state = StateStore::open_in_memory().unwrap();
        let sink = MemorySink::new();
        let monitor = HeartbeatMonitor::new(
            state.clone(),
            Arc::new(sink.clone()),
            HeartbeatConfig {
                interval: Duration::from_millis(10),
                timeout: DEFAULT_HEARTBEAT_TIMEOUT,
            },
        );
        // Long expired against the wall clock.
        state.put_heartbeat(&heartbeat("10.0.0.4:30506", 1)).unwrap();

        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(async move { monitor.run(rx).await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();

        assert!(state.get_heartbeat("10.0.0.4:30506").unwrap().is_none());
        assert_eq!(sink.events(), vec![status_event("10.0.0.4:30506", false)]);
    }
}
