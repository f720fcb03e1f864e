use std::sync::Arc;

use chrono::Utc;

use crate::error::ScribeError;
use crate::events::{self, EventSink, JobEvent};
use crate::state_machine::{AuditRecord, Job, JobFailure, JobId, JobStatus, StatusUpdate};
use crate::store::{JobStore, UpdateOutcome};

/// Job persistence plus lifecycle notifications.
///
/// Every status change made by the orchestrator, the callback handler and the deferred
/// dispatcher goes through [`Lifecycle::transition`], so each applied transition is logged
/// and published exactly once.
#[derive(Clone)]
pub(crate) struct Lifecycle {
    store: Arc<dyn JobStore>,
    events: Option<Arc<dyn EventSink>>,
}

impl Lifecycle {
    pub fn new(store: Arc<dyn JobStore>, events: Option<Arc<dyn EventSink>>) -> Self {
        Self { store, events }
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    fn sink(&self) -> Option<&dyn EventSink> {
        self.events.as_deref()
    }

    pub async fn create(&self, job: &Job, correlation_id: &str) -> Result<(), ScribeError> {
        self.store.create(job).await?;
        tracing::info!(
            job_id = %job.id,
            filename = %job.original_filename,
            size = job.file_size_bytes,
            estimated_seconds = job.estimated_duration_seconds,
            "Job created"
        );
        events::publish(
            self.sink(),
            JobEvent::JobCreated {
                job_id: job.id,
                original_filename: job.original_filename.clone(),
                file_size_bytes: job.file_size_bytes,
                estimated_duration_seconds: job.estimated_duration_seconds,
                correlation_id: correlation_id.to_string(),
                at: job.created_at,
            },
        );
        Ok(())
    }

    pub async fn get(&self, job_id: JobId) -> Result<Job, ScribeError> {
        self.store
            .get(job_id)
            .await?
            .ok_or(ScribeError::NotFound(job_id))
    }

    /// Conditionally apply `update`; only the writer whose `expected` status still holds wins.
    pub async fn transition(
        &self,
        job_id: JobId,
        expected: JobStatus,
        update: StatusUpdate,
        reason: &str,
        correlation_id: &str,
    ) -> Result<UpdateOutcome, ScribeError> {
        let to = update.target();
        let outcome = self
            .store
            .update_if_status_equals(job_id, expected, update)
            .await?;

        match &outcome {
            UpdateOutcome::Applied(job) => {
                if job.status == JobStatus::Failed {
                    tracing::warn!(%job_id, from = %expected, %to, reason, error = ?job.error_message, "Job failed");
                } else {
                    tracing::info!(%job_id, from = %expected, %to, reason, "Job status changed");
                }
                events::publish(
                    self.sink(),
                    JobEvent::StatusChanged {
                        job_id,
                        from: expected,
                        to,
                        reason: reason.to_string(),
                        error: job.error_message.clone(),
                        correlation_id: correlation_id.to_string(),
                        at: Utc::now(),
                    },
                );
                if job.is_terminal() {
                    events::publish(self.sink(), JobEvent::JobFinished(AuditRecord::from_job(job)));
                }
            }
            UpdateOutcome::Conflict(job) => {
                tracing::debug!(
                    %job_id,
                    %expected,
                    actual = %job.status,
                    %to,
                    "Conditional update lost; job already moved"
                );
            }
        }
        Ok(outcome)
    }

    /// Fail a job from whatever non-terminal status it is in now.
    ///
    /// Returns `None` when the job is already terminal.
    pub async fn fail_current(
        &self,
        job_id: JobId,
        failure: JobFailure,
        reason: &str,
        correlation_id: &str,
    ) -> Result<Option<UpdateOutcome>, ScribeError> {
        let mut current = self.get(job_id).await?;
        loop {
            if current.is_terminal() {
                return Ok(None);
            }
            match self
                .transition(
                    job_id,
                    current.status,
                    StatusUpdate::Fail(failure.clone()),
                    reason,
                    correlation_id,
                )
                .await?
            {
                UpdateOutcome::Conflict(job) => current = job,
                applied => return Ok(Some(applied)),
            }
        }
    }
}
