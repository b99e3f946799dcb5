//! Launch and kill command handlers.

use async_trait::async_trait;
use tracing::{error, info, warn};

use gsctl_core::{KillServerRequestedEvent, LaunchGameServerCommand, epoch_secs};
use gsctl_deployer::{BundleHandles, DeployError, Deployer};
use gsctl_state::{MatchResourceRecord, StateError, StateStore, Status};

use crate::error::HandlerError;

/// Handles one decoded message of type `T`.
#[async_trait]
pub trait MessageHandler<T>: Send + Sync {
    async fn handle(&self, msg: T) -> Result<(), HandlerError>;
}

/// Deploys a bundle and records it as `pending`.
#[derive(Clone)]
pub struct LaunchHandler {
    deployer: Deployer,
    state: StateStore,
}

impl LaunchHandler {
    pub fn new(deployer: Deployer, state: StateStore) -> Self {
        Self { deployer, state }
    }
}

#[async_trait]
impl MessageHandler<LaunchGameServerCommand> for LaunchHandler {
    async fn handle(&self, cmd: LaunchGameServerCommand) -> Result<(), HandlerError> {
        let match_id = cmd.match_id;
        info!(match_id, region = %cmd.region, lobby_type = %cmd.lobby_type, "launch requested");

        if self.state.get_match(match_id)?.is_some() {
            info!(match_id, "match already tracked, ignoring launch");
            return Err(HandlerError::AlreadyRunning { match_id });
        }

        let handles = match self.deployer.deploy(&cmd).await {
            Ok(handles) => handles,
            // A bundle with no record: an earlier delivery deployed it but
            // could neither persist nor remove it.
            Err(DeployError::AlreadyRunning { .. }) => {
                return self.adopt(BundleHandles::for_match(match_id));
            }
            Err(e) => return Err(e.into()),
        };

        match self.state.insert_match(&pending_record(&handles)) {
            Ok(()) => {
                info!(match_id, job = %handles.job_name, "match record created");
                Ok(())
            }
            Err(StateError::AlreadyExists(_)) => Err(HandlerError::AlreadyRunning { match_id }),
            Err(e) => {
                error!(match_id, error = %e, "failed to persist match record, rolling back bundle");
                let report = self.deployer.teardown(&handles).await;
                if !report.is_complete() {
                    warn!(match_id, failures = ?report.failures, "rollback incomplete, redelivery will adopt the bundle");
                }
                Err(e.into())
            }
        }
    }
}

impl LaunchHandler {
    /// Record an untracked bundle so the reconciler takes it over.
    fn adopt(&self, handles: BundleHandles) -> Result<(), HandlerError> {
        let match_id = handles.match_id;
        match self.state.insert_match(&pending_record(&handles)) {
            Ok(()) => {
                warn!(match_id, job = %handles.job_name, "adopted untracked gameserver bundle");
                Ok(())
            }
            Err(StateError::AlreadyExists(_)) => Err(HandlerError::AlreadyRunning { match_id }),
            Err(e) => Err(e.into()),
        }
    }
}

fn pending_record(handles: &BundleHandles) -> MatchResourceRecord {
    MatchResourceRecord {
        match_id: handles.match_id,
        job_name: handles.job_name.clone(),
        secret_name: handles.secret_name.clone(),
        config_map_name: handles.config_map_name.clone(),
        created_at: epoch_secs(),
        status: Status::Pending,
    }
}

/// Tears down a match's bundle and deletes its record.
#[derive(Clone)]
pub struct KillHandler {
    deployer: Deployer,
    state: StateStore,
}

impl KillHandler {
    pub fn new(deployer: Deployer, state: StateStore) -> Self {
        Self { deployer, state }
    }
}

#[async_trait]
impl MessageHandler<KillServerRequestedEvent> for KillHandler {
    async fn handle(&self, evt: KillServerRequestedEvent) -> Result<(), HandlerError> {
        let match_id = evt.match_id;
        let Some(record) = self.state.get_match(match_id)? else {
            info!(match_id, "kill requested for unknown match, nothing to do");
            return Ok(());
        };

        let report = self.deployer.teardown(&BundleHandles::from(&record)).await;
        if !report.is_complete() {
            let detail = report
                .failures
                .iter()
                .map(|(kind, e)| format!("{kind}: {e}"))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(HandlerError::Teardown { match_id, detail });
        }

        self.state.delete_match(match_id)?;
        info!(match_id, job = %record.job_name, "gameserver killed");
        Ok(())
    }
}
