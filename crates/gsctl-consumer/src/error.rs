use thiserror::Error;

use gsctl_core::MatchId;
use gsctl_deployer::DeployError;
use gsctl_state::StateError;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker connection lost")]
    Disconnected,

    #[error("no queue bound to {exchange}/{routing_key}")]
    Unroutable {
        exchange: String,
        routing_key: String,
    },

    #[error("unknown delivery tag {0}")]
    UnknownTag(u64),

    #[error("broker transport error: {0}")]
    Transport(String),
}

pub type BrokerResult<T> = Result<T, BrokerError>;

/// Failure of a command handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("gameserver for match {match_id} already running")]
    AlreadyRunning { match_id: MatchId },

    #[error("deploy failed: {0}")]
    Deploy(DeployError),

    #[error("teardown of match {match_id} incomplete: {detail}")]
    Teardown { match_id: MatchId, detail: String },

    #[error("state store error: {0}")]
    State(#[from] StateError),
}

impl HandlerError {
    /// Whether redelivering the message may succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, HandlerError::AlreadyRunning { .. })
    }
}

impl From<DeployError> for HandlerError {
    fn from(e: DeployError) -> Self {
        match e {
            DeployError::AlreadyRunning { match_id, .. } => HandlerError::AlreadyRunning { match_id },
            other => HandlerError::Deploy(other),
        }
    }
}
