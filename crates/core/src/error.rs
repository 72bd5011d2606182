// Central Error Type for the Engine

use std::time::Duration;
use thiserror::Error;

/// Engine-level error type
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("unable to acquire job lock")]
    UnableToAcquireLock,

    #[error("trigger data missing or undecodable")]
    TriggerDataMissing,

    #[error("variables data missing or undecodable")]
    VariablesDataMissing,

    #[error("may not flush while a flush is in progress")]
    FlushInProgress,

    #[error("executor did not reply within {0:?}")]
    DispatchTimeout(Duration),

    #[error("store error: {0}")]
    Store(String),

    #[error("bus error: {0}")]
    Bus(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// True for the partial-data failures that revoke a job instead of
    /// propagating out of a processing pass.
    pub fn is_data_missing(&self) -> bool {
        matches!(
            self,
            EngineError::TriggerDataMissing | EngineError::VariablesDataMissing
        )
    }
}

/// Result type alias using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

// From implementation for infra crates (to avoid circular dependency);
// transport errors are stringified at the adapter boundary.
impl From<String> for EngineError {
    fn from(err: String) -> Self {
        EngineError::Store(err)
    }
}
