//! Error types shared by the dispatch and monitoring services

use crate::queue::StoreError;

/// Result type alias for service operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the job queue, registry, dispatcher, monitor and alert manager
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Agent, job, metric series, alert or polling task is absent
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Duplicate job id, or a monitoring start for an agent that is already polling
    #[error("conflict: {0}")]
    Conflict(String),

    /// Queue store unreachable or transaction aborted
    #[error("queue store failure: {0}")]
    StoreFailure(#[from] StoreError),

    /// A stored record could not be encoded or decoded
    #[error("serialization failure: {0}")]
    Serialization(String),

    /// A job lifecycle transition that is not permitted
    #[error("job {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: String,
        to: String,
    },

    /// The collector could not provide telemetry
    #[error("metric collection failed: {0}")]
    Collection(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
