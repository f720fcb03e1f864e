use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::engine::EngineError;
use crate::orchestrator::{JobOrchestrator, submission_failure};
use crate::state_machine::{FailureClass, JobFailure, JobId};

/// A job whose engine submission continues off the request path: a synchronous job
/// parked while the circuit was open, or an asynchronous one whose first submission
/// failed with a retryable error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredJob {
    pub job_id: JobId,
    pub correlation_id: String,
    /// Submissions already tried before the job was queued.
    pub attempts_made: u32,
}

/// Background task that submits deferred jobs once the engine admits calls again.
///
/// Holds only a weak reference to the orchestrator and stops when it is dropped.
pub struct DeferredDispatcher;

enum Round {
    Done,
    Retry {
        failure: JobFailure,
        retry_after: Option<Duration>,
    },
}

impl DeferredDispatcher {
    pub(crate) fn spawn(
        orchestrator: Weak<JobOrchestrator>,
        mut queue: mpsc::UnboundedReceiver<DeferredJob>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(deferred) = queue.recv().await {
                if orchestrator.strong_count() == 0 {
                    break;
                }
                let span = tracing::info_span!(
                    "deferred_dispatch",
                    job_id = %deferred.job_id,
                    correlation_id = %deferred.correlation_id
                );
                tokio::spawn(run(orchestrator.clone(), deferred).instrument(span));
            }
            tracing::debug!("Deferred dispatcher stopped");
        })
    }
}

async fn run(orchestrator: Weak<JobOrchestrator>, deferred: DeferredJob) {
    let Some(policy) = orchestrator.upgrade().map(|o| o.settings().retry.clone()) else {
        return;
    };
    let first = deferred.attempts_made + 1;
    let last = policy.max_attempts.max(first);
    let mut failure = JobFailure::new(FailureClass::ServiceUnavailable, "engine unavailable");
    let mut retry_after = None;

    for round in first..=last {
        let backoff = Duration::from_millis(policy.delay_for_attempt(round - deferred.attempts_made));
        let wait = match orchestrator.upgrade() {
            Some(o) => backoff
                .max(o.breaker().remaining_open_duration())
                .max(retry_after.take().unwrap_or_default()),
            None => return,
        };
        tokio::time::sleep(wait).await;

        let Some(o) = orchestrator.upgrade() else {
            return;
        };
        match attempt(&o, &deferred, round).await {
            Ok(Round::Done) => return,
            Ok(Round::Retry {
                failure: last_failure,
                retry_after: asked,
            }) => {
                failure = last_failure;
                retry_after = asked;
            }
            Err(err) => {
                tracing::error!(error = %err, "Deferred dispatch aborted");
                return;
            }
        }
    }

    let Some(o) = orchestrator.upgrade() else {
        return;
    };
    tracing::warn!(attempts = last, "Giving up on deferred job");
    let failure = JobFailure::new(
        failure.class,
        format!("{} (gave up after {last} attempts)", failure.detail),
    );
    if let Err(err) = o
        .lifecycle()
        .fail_current(deferred.job_id, failure, "deferred dispatch exhausted", &deferred.correlation_id)
        .await
    {
        tracing::error!(error = %err, "Could not fail deferred job");
    }
}

async fn attempt(
    orchestrator: &Arc<JobOrchestrator>,
    deferred: &DeferredJob,
    round: u32,
) -> Result<Round, crate::error::ScribeError> {
    if !orchestrator.breaker().is_available() {
        tracing::debug!(round, "Circuit still open");
        return Ok(Round::Retry {
            failure: JobFailure::new(FailureClass::ServiceUnavailable, "circuit open"),
            retry_after: None,
        });
    }

    let job = orchestrator.lifecycle().get(deferred.job_id).await?;
    if job.is_terminal() {
        tracing::debug!(status = %job.status, "Deferred job already finished");
        return Ok(Round::Done);
    }

    match orchestrator.submit(&job).await {
        Ok(_) => {
            orchestrator
                .mark_submitted(job.id, &deferred.correlation_id)
                .await?;
            tracing::info!(round, "Deferred job submitted");
            Ok(Round::Done)
        }
        Err(err) if err.is_retryable() || matches!(err, EngineError::CircuitOpen { .. }) => {
            tracing::debug!(round, error = %err, "Deferred submission will be retried");
            Ok(Round::Retry {
                failure: submission_failure(&err),
                retry_after: err.retry_after(),
            })
        }
        Err(err) => {
            tracing::warn!(round, error = %err, "Deferred submission failed");
            orchestrator
                .lifecycle()
                .fail_current(
                    job.id,
                    submission_failure(&err),
                    "deferred submission failed",
                    &deferred.correlation_id,
                )
                .await?;
            Ok(Round::Done)
        }
    }
}
