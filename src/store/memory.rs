use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use super::{JobStore, StoreError, UpdateOutcome};
use crate::state_machine::{Job, JobId, JobStatus, StateMachine, StatusUpdate};

/// Process-local store; the write lock makes each conditional update atomic.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, job: &Job) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write();
        if jobs.contains_key(&job.id) {
            return Err(StoreError::AlreadyExists(job.id));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        Ok(self.jobs.read().get(&id).cloned())
    }

    async fn update_if_status_equals(
        &self,
        id: JobId,
        expected: JobStatus,
        update: StatusUpdate,
    ) -> Result<UpdateOutcome, StoreError> {
        let mut jobs = self.jobs.write();
        let job = jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        if job.status != expected {
            return Ok(UpdateOutcome::Conflict(job.clone()));
        }

        // Apply on a copy so a rejected transition leaves the stored job untouched.
        let mut next = job.clone();
        StateMachine::apply(&mut next, update, Utc::now())?;
        *job = next.clone();
        Ok(UpdateOutcome::Applied(next))
    }
}
