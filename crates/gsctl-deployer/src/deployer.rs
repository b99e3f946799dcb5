//! Deployer — creates and removes per-match resource bundles.

use std::sync::Arc;

use tracing::{debug, info, warn};

use gsctl_cluster::{ClusterApi, ClusterError, Manifest, ObjectKind};
use gsctl_core::{LaunchGameServerCommand, MatchId, MatchmakingMode};
use gsctl_state::{GameServerSettings, MatchResourceRecord, StateStore};

use crate::credentials::{FALLBACK_CREDENTIAL, generate_credential};
use crate::error::{DeployError, DeployResult};
use crate::manifests::{self, TemplateData};
use crate::ports::PortAllocator;

const CREDENTIAL_LEN: usize = 12;

/// Settings used when a matchmaking mode has none stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsDefaults {
    pub image: String,
    pub tickrate: u32,
    pub load_timeout: u32,
    pub cpu_affinity: bool,
}

impl Default for SettingsDefaults {
    fn default() -> Self {
        Self {
            image: "dota2classic/gameserver:latest".to_string(),
            tickrate: 30,
            load_timeout: 300,
            cpu_affinity: false,
        }
    }
}

impl SettingsDefaults {
    pub fn for_mode(&self, mode: MatchmakingMode) -> GameServerSettings {
        GameServerSettings {
            matchmaking_mode: mode,
            tickrate: self.tickrate,
            image: self.image.clone(),
            load_timeout: self.load_timeout,
            cpu_affinity: self.cpu_affinity,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeployerConfig {
    /// Host advertised to players in the match document (`host:gamePort`).
    pub public_host: String,
    pub defaults: SettingsDefaults,
}

/// Names of the three objects of a deployed bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleHandles {
    pub match_id: MatchId,
    pub job_name: String,
    pub secret_name: String,
    pub config_map_name: String,
}

impl BundleHandles {
    /// Names every bundle for `match_id` is deployed under.
    pub fn for_match(match_id: MatchId) -> Self {
        Self {
            match_id,
            job_name: manifests::job_name(match_id),
            secret_name: manifests::secret_name(match_id),
            config_map_name: manifests::config_map_name(match_id),
        }
    }
}

impl From<&MatchResourceRecord> for BundleHandles {
    fn from(record: &MatchResourceRecord) -> Self {
        Self {
            match_id: record.match_id,
            job_name: record.job_name.clone(),
            secret_name: record.secret_name.clone(),
            config_map_name: record.config_map_name.clone(),
        }
    }
}

/// Outcome of a bundle teardown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub removed: Vec<ObjectKind>,
    pub already_gone: Vec<ObjectKind>,
    pub failures: Vec<(ObjectKind, String)>,
}

impl TeardownReport {
    /// Every member is gone from the cluster.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Clone)]
pub struct Deployer {
    cluster: Arc<dyn ClusterApi>,
    state: StateStore,
    ports: PortAllocator,
    config: DeployerConfig,
}

impl Deployer {
    pub fn new(
        cluster: Arc<dyn ClusterApi>,
        state: StateStore,
        ports: PortAllocator,
        config: DeployerConfig,
    ) -> Self {
        Self {
            cluster,
            state,
            ports,
            config,
        }
    }

    /// Deploy the bundle for a launch command.
    ///
    /// Submits ConfigMap, Secret and Job in that order. Returns
    /// [`DeployError::AlreadyRunning`] if the job already exists, in which
    /// case nothing is submitted.
    pub async fn deploy(&self, cmd: &LaunchGameServerCommand) -> DeployResult<BundleHandles> {
        let match_id = cmd.match_id;

        let existing = manifests::job_name(match_id);
        match self.cluster.get_job(&existing).await {
            Ok(_) => {
                warn!(match_id, job = %existing, "job already exists");
                return Err(DeployError::AlreadyRunning {
                    match_id,
                    job: existing,
                });
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }

        let password = match generate_credential(CREDENTIAL_LEN) {
            Ok(p) => p,
            Err(e) => {
                warn!(match_id, error = %e, "random source unavailable, using fallback rcon password");
                FALLBACK_CREDENTIAL.to_string()
            }
        };

        let ports = self.ports.allocate()?;
        let settings = self.resolve_settings(cmd.lobby_type);
        let data = TemplateData::new(cmd, &settings, ports, password, &self.config.public_host)?;

        self.ensure(&manifests::config_map(&data)).await?;
        self.ensure(&manifests::secret(&data)).await?;

        let job = manifests::job(&data);
        match self.cluster.create(&job).await {
            Ok(()) => {}
            Err(ClusterError::AlreadyExists { .. }) => {
                warn!(match_id, job = %job.name, "job already exists");
                return Err(DeployError::AlreadyRunning {
                    match_id,
                    job: job.name,
                });
            }
            Err(e) => return Err(e.into()),
        }

        info!(
            match_id,
            job = %job.name,
            region = %cmd.region,
            game_port = ports.game,
            tv_port = ports.tv,
            cpu_affinity = settings.cpu_affinity,
            "gameserver bundle deployed"
        );

        Ok(BundleHandles {
            match_id,
            job_name: job.name,
            secret_name: data.secret_name(),
            config_map_name: data.config_map_name(),
        })
    }

    /// Delete Job, ConfigMap and Secret. Members already gone count as removed.
    pub async fn teardown(&self, handles: &BundleHandles) -> TeardownReport {
        let mut report = TeardownReport::default();
        let members = [
            (ObjectKind::Job, &handles.job_name),
            (ObjectKind::ConfigMap, &handles.config_map_name),
            (ObjectKind::Secret, &handles.secret_name),
        ];

        for (kind, name) in members {
            match self.cluster.delete(kind, name).await {
                Ok(()) => report.removed.push(kind),
                Err(ClusterError::NotFound { .. }) => report.already_gone.push(kind),
                Err(e) => {
                    warn!(match_id = handles.match_id, %kind, name = %name, error = %e, "failed to delete bundle member");
                    report.failures.push((kind, e.to_string()));
                }
            }
        }

        debug!(match_id = handles.match_id, ?report, "bundle teardown finished");
        report
    }

    /// Stored settings for the mode, or defaults when absent or unreadable.
    fn resolve_settings(&self, mode: MatchmakingMode) -> GameServerSettings {
        match self.state.get_settings(mode) {
            Ok(Some(settings)) => settings,
            Ok(None) => {
                warn!(%mode, "no gameserver settings for mode, using defaults");
                self.config.defaults.for_mode(mode)
            }
            Err(e) => {
                warn!(%mode, error = %e, "failed to read gameserver settings, using defaults");
                self.config.defaults.for_mode(mode)
            }
        }
    }

    /// Create, or replace in place if it already exists.
    async fn ensure(&self, manifest: &Manifest) -> DeployResult<()> {
        match self.cluster.create(manifest).await {
            Ok(()) => Ok(()),
            Err(ClusterError::AlreadyExists { .. }) => {
                debug!(kind = %manifest.kind, name = %manifest.name, "already exists, replacing");
                if let Err(e) = self.cluster.replace(manifest).await {
                    warn!(kind = %manifest.kind, name = %manifest.name, error = %e, "replace failed, keeping existing object");
                }
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
