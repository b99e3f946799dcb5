use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventError {
    #[error("failed to serialize event: {0}")]
    Serialize(String),

    #[error("event transport error: {0}")]
    Transport(String),

    #[error("event endpoint rejected {channel} with {status}: {body}")]
    Rejected {
        channel: String,
        status: u16,
        body: String,
    },

    #[error("publishing {channel} failed after {attempts} attempts: {last}")]
    Exhausted {
        channel: String,
        attempts: u32,
        last: String,
    },
}

pub type EventResult<T> = Result<T, EventError>;
