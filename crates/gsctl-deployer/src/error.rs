//! Deployer error types.

use thiserror::Error;

use gsctl_core::MatchId;

#[derive(Debug, Error)]
pub enum DeployError {
    /// The match's job already exists. Never retried.
    #[error("gameserver for match {match_id} already running ({job})")]
    AlreadyRunning { match_id: MatchId, job: String },

    #[error("port allocation failed: {0}")]
    Ports(#[from] gsctl_state::StateError),

    #[error("invalid port range [{base}, {max})")]
    InvalidPortRange { base: u16, max: u16 },

    #[error("cluster error: {0}")]
    Cluster(#[from] gsctl_cluster::ClusterError),

    #[error("failed to render manifests: {0}")]
    Render(String),
}

pub type DeployResult<T> = Result<T, DeployError>;
