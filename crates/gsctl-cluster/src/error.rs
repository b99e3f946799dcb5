use thiserror::Error;

use crate::types::ObjectKind;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("{kind} {name} not found")]
    NotFound { kind: ObjectKind, name: String },

    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: ObjectKind, name: String },

    #[error("cluster transport error: {0}")]
    Transport(String),

    #[error("cluster API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("failed to decode cluster response: {0}")]
    Decode(String),
}

impl ClusterError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, ClusterError::AlreadyExists { .. })
    }
}

impl From<gsctl_core::HttpError> for ClusterError {
    fn from(e: gsctl_core::HttpError) -> Self {
        match e {
            gsctl_core::HttpError::Decode(msg) => ClusterError::Decode(msg),
            other => ClusterError::Transport(other.to_string()),
        }
    }
}

pub type ClusterResult<T> = Result<T, ClusterError>;
