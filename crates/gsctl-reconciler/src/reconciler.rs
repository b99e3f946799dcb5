//! Periodic reconciliation of match records against the cluster.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use gsctl_cluster::{ClusterApi, ObjectKind};
use gsctl_core::{MatchStatusChangedEvent, NoFreeServerEvent, epoch_secs};
use gsctl_deployer::{BundleHandles, Deployer, TeardownReport};
use gsctl_events::{ControllerEvent, SharedSink};
use gsctl_state::{MatchResourceRecord, StateResult, StateStore, Status};

use crate::derive::{derive_status, status_from_counters};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_EXPIRATION_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Time between ticks.
    pub interval: Duration,
    /// How long a match may stay `launching` before its bundle is reclaimed.
    pub expiration_timeout: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            expiration_timeout: DEFAULT_EXPIRATION_TIMEOUT,
        }
    }
}

/// What a single tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Records looked at.
    pub examined: usize,
    /// Persisted status changes.
    pub transitions: usize,
    /// Records removed because their job finished or disappeared.
    pub cleaned: usize,
    /// Records removed because they stayed `launching` too long.
    pub expired: usize,
    /// Records left alone this tick because pods could not be listed.
    pub skipped: usize,
    pub errors: usize,
}

impl ReconcileReport {
    fn is_quiet(&self) -> bool {
        self.transitions == 0
            && self.cleaned == 0
            && self.expired == 0
            && self.skipped == 0
            && self.errors == 0
    }
}

/// Drives persisted match status from cluster observations and reclaims
/// bundles that are finished, orphaned or expired.
#[derive(Clone)]
pub struct Reconciler {
    state: StateStore,
    cluster: Arc<dyn ClusterApi>,
    deployer: Deployer,
    sink: SharedSink,
    config: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(
        state: StateStore,
        cluster: Arc<dyn ClusterApi>,
        deployer: Deployer,
        sink: SharedSink,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            state,
            cluster,
            deployer,
            sink,
            config,
        }
    }

    pub async fn reconcile_once(&self) -> StateResult<ReconcileReport> {
        self.reconcile_at(epoch_secs()).await
    }

    /// Run one tick as if the current time were `now` (unix seconds).
    pub async fn reconcile_at(&self, now: u64) -> StateResult<ReconcileReport> {
        let records = self.state.list_matches()?;
        let mut report = ReconcileReport::default();

        for record in &records {
            report.examined += 1;
            self.reconcile_record(record, now, &mut report).await;
        }

        if report.is_quiet() {
            debug!(examined = report.examined, "reconcile tick");
        } else {
            info!(?report, "reconcile tick");
        }
        Ok(report)
    }

    async fn reconcile_record(&self, record: &MatchResourceRecord, now: u64, report: &mut ReconcileReport) {
        let match_id = record.match_id;
        let job_name = &record.job_name;

        let job = match self.cluster.get_job(job_name).await {
            Ok(job) => job,
            Err(e) if e.is_not_found() => {
                info!(match_id, job = %job_name, "job gone, cleaning up bundle");
                let teardown = self.deployer.teardown(&BundleHandles::from(record)).await;
                if self.forget(record, &teardown) {
                    report.cleaned += 1;
                } else {
                    report.errors += 1;
                }
                return;
            }
            Err(e) => {
                warn!(match_id, job = %job_name, error = %e, "failed to read job");
                report.errors += 1;
                return;
            }
        };

        let derived = match status_from_counters(&job.counters) {
            Some(status) => status,
            None => match self.cluster.list_job_pods(job_name).await {
                Ok(pods) => derive_status(&job.counters, &pods),
                Err(e) => {
                    warn!(match_id, job = %job_name, error = %e, "failed to list pods, skipping");
                    report.skipped += 1;
                    return;
                }
            },
        };

        let status = if derived == record.status {
            derived
        } else if record.status.can_advance_to(derived) {
            match self.state.update_match_status(match_id, derived) {
                Ok(true) => {}
                Ok(false) => {
                    debug!(match_id, "record removed during tick");
                    return;
                }
                Err(e) => {
                    error!(match_id, status = %derived, error = %e, "failed to persist status");
                    report.errors += 1;
                    return;
                }
            }
            info!(match_id, job = %job_name, from = %record.status, to = %derived, "match status changed");
            report.transitions += 1;
            self.emit(MatchStatusChangedEvent {
                match_id,
                status: derived.to_string(),
            })
            .await;
            derived
        } else {
            debug!(match_id, current = %record.status, observed = %derived, "ignoring backward status");
            record.status
        };

        match status {
            Status::Launching if record.age_secs(now) > self.config.expiration_timeout.as_secs() => {
                warn!(match_id, job = %job_name, age_secs = record.age_secs(now), "gameserver did not start in time, reclaiming");
                let teardown = self.deployer.teardown(&BundleHandles::from(record)).await;
                // Once the job is gone later ticks take the cleanup path, so
                // the event goes out in this tick or never.
                let job_gone = !teardown.failures.iter().any(|(kind, _)| *kind == ObjectKind::Job);
                // A kill that removed the record meanwhile owns the teardown.
                let killed = matches!(self.state.get_match(match_id), Ok(None));
                if killed {
                    debug!(match_id, "record removed during tick, no expiry event");
                } else if job_gone {
                    self.emit(NoFreeServerEvent {
                        match_id,
                        job_name: job_name.clone(),
                    })
                    .await;
                    report.expired += 1;
                }
                if !self.forget(record, &teardown) {
                    report.errors += 1;
                }
            }
            Status::Done => {
                info!(match_id, job = %job_name, "match finished, reclaiming bundle");
                let teardown = self.deployer.teardown(&BundleHandles::from(record)).await;
                if self.forget(record, &teardown) {
                    report.cleaned += 1;
                } else {
                    report.errors += 1;
                }
            }
            _ => {}
        }
    }

    /// Delete the record once its bundle is fully gone. Returns whether the
    /// record was removed.
    fn forget(&self, record: &MatchResourceRecord, teardown: &TeardownReport) -> bool {
        if !teardown.is_complete() {
            warn!(match_id = record.match_id, failures = ?teardown.failures, "bundle teardown incomplete, keeping record");
            return false;
        }
        match self.state.delete_match(record.match_id) {
            Ok(_) => true,
            Err(e) => {
                error!(match_id = record.match_id, error = %e, "failed to delete match record");
                false
            }
        }
    }

    async fn emit(&self, event: impl Into<ControllerEvent>) {
        let event = event.into();
        if let Err(e) = self.sink.publish(&event).await {
            warn!(channel = event.channel(), error = %e, "failed to publish event");
        }
    }

    /// Tick every `interval` until `shutdown` changes.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            expiration_secs = self.config.expiration_timeout.as_secs(),
            "reconciler started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {
                    if let Err(e) = self.reconcile_once().await {
                        error!(error = %e, "reconcile tick failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("reconciler shutting down");
                    break;
                }
            }
        }
    }
}
