use std::time::Duration;

use thiserror::Error;

use crate::engine::EngineError;
use crate::state_machine::{FailureClass, JobId, JobStatus};
use crate::store::StoreError;
use crate::validation::ValidationError;

#[derive(Debug, Error)]
pub enum ScribeError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("job not found: {0}")]
    NotFound(JobId),

    #[error("dispatch failed: {0}")]
    Dispatch(String),

    #[error("synchronous transcription exceeded {0:?}")]
    SyncTimeout(Duration),

    #[error("transcription service unavailable: {0}")]
    CircuitOpen(String),

    #[error("invalid callback: {0}")]
    CallbackValidation(String),

    #[error("stale callback for job {job_id}: job is {status}")]
    StaleCallback { job_id: JobId, status: JobStatus },

    #[error("transcription failed: {0}")]
    EngineFailure(String),

    #[error("transcript for job {job_id} is not available (status {status})")]
    NotReady { job_id: JobId, status: JobStatus },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ScribeError {
    /// Classification persisted on a job that fails because of this error.
    pub fn failure_class(&self) -> FailureClass {
        match self {
            ScribeError::SyncTimeout(_) => FailureClass::SyncTimeout,
            ScribeError::CircuitOpen(_) => FailureClass::ServiceUnavailable,
            ScribeError::EngineFailure(_) => FailureClass::EngineFailure,
            ScribeError::Dispatch(_) => FailureClass::DispatchFailed,
            _ => FailureClass::Internal,
        }
    }

    /// Stable machine-readable code for responses.
    pub fn code(&self) -> &'static str {
        match self {
            ScribeError::Validation(_) => "VALIDATION_ERROR",
            ScribeError::NotFound(_) => "NOT_FOUND",
            ScribeError::Dispatch(_) => "DISPATCH_ERROR",
            ScribeError::SyncTimeout(_) => "SYNC_TIMEOUT",
            ScribeError::CircuitOpen(_) => "SERVICE_UNAVAILABLE",
            ScribeError::CallbackValidation(_) => "CALLBACK_VALIDATION_ERROR",
            ScribeError::StaleCallback { .. } => "STALE_CALLBACK",
            ScribeError::EngineFailure(_) => "ENGINE_FAILURE",
            ScribeError::NotReady { .. } => "NOT_READY",
            ScribeError::Store(_) | ScribeError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<EngineError> for ScribeError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::CircuitOpen { name } => {
                ScribeError::CircuitOpen(format!("circuit '{name}' is open"))
            }
            EngineError::Reported(message) => ScribeError::EngineFailure(message),
            EngineError::Timeout(limit) => ScribeError::SyncTimeout(limit),
            other => ScribeError::Dispatch(other.to_string()),
        }
    }
}

/// An error together with the correlation id of the operation that produced it.
#[derive(Debug, Error)]
#[error("{error} (correlation id {correlation_id})")]
pub struct CorrelatedError {
    pub correlation_id: String,
    #[source]
    pub error: ScribeError,
}

impl CorrelatedError {
    pub fn new(correlation_id: impl Into<String>, error: impl Into<ScribeError>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            error: error.into(),
        }
    }

    pub fn error(&self) -> &ScribeError {
        &self.error
    }
}
