use thiserror::Error;

use gsctl_core::MatchId;

pub type StateResult<T> = Result<T, StateError>;

/// Failures of the persistence gateway.
///
/// Storage-layer variants carry the redb message; callers mostly log them
/// and retry on the next tick or delivery.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("cannot open state database: {0}")]
    Open(String),

    #[error("state transaction failed: {0}")]
    Transaction(String),

    #[error("cannot open state table: {0}")]
    Table(String),

    #[error("state read failed: {0}")]
    Read(String),

    #[error("state write failed: {0}")]
    Write(String),

    #[error("cannot encode record: {0}")]
    Serialize(String),

    #[error("stored record is corrupt: {0}")]
    Deserialize(String),

    /// A record for the match is already tracked.
    #[error("match {0} already has a resource record")]
    AlreadyExists(MatchId),
}
