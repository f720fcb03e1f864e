//! Job persistence with an atomic conditional update.
//!
//! Every status change goes through [`JobStore::update_if_status_equals`]: the update is
//! applied only when the stored status still equals the caller's expectation, so exactly
//! one writer wins any given transition.

mod file;
mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::state_machine::{Job, JobId, JobStatus, StatusUpdate, TransitionError};

pub use file::FileJobStore;
pub use memory::InMemoryJobStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),

    #[error("job already exists: {0}")]
    AlreadyExists(JobId),

    #[error("rejected transition: {0}")]
    Transition(#[from] TransitionError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result of a conditional update.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// The precondition held; carries the job as stored after the update.
    Applied(Job),
    /// Another writer got there first; carries the job as currently stored.
    Conflict(Job),
}

impl UpdateOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, UpdateOutcome::Applied(_))
    }

    pub fn job(&self) -> &Job {
        match self {
            UpdateOutcome::Applied(job) | UpdateOutcome::Conflict(job) => job,
        }
    }

    pub fn into_job(self) -> Job {
        match self {
            UpdateOutcome::Applied(job) | UpdateOutcome::Conflict(job) => job,
        }
    }
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create(&self, job: &Job) -> Result<(), StoreError>;

    async fn get(&self, id: JobId) -> Result<Option<Job>, StoreError>;

    /// Apply `update` only if the job's current status equals `expected`.
    async fn update_if_status_equals(
        &self,
        id: JobId,
        expected: JobStatus,
        update: StatusUpdate,
    ) -> Result<UpdateOutcome, StoreError>;
}
