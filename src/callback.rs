//! Asynchronous completion notifications from the transcription engine.
//!
//! A callback is applied at most once: the terminal transition is a conditional update from
//! `Processing`, so a repeated or late notification finds the job already terminal and is
//! acknowledged as a duplicate without touching it.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::{ReportedStatus, ResultBody};
use crate::error::{CorrelatedError, ScribeError};
use crate::lifecycle::Lifecycle;
use crate::state_machine::{FailureClass, JobFailure, JobId, JobStatus, StatusUpdate, TranscriptResult};
use crate::store::UpdateOutcome;

/// Body posted by the engine to the callback address.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallbackPayload {
    /// Optional echo of the job id; must match the addressed job when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(flatten)]
    pub body: ResultBody,
}

impl CallbackPayload {
    pub fn completed(job_id: JobId, transcript: impl Into<String>) -> Self {
        Self {
            job_id: Some(job_id),
            correlation_id: None,
            body: ResultBody::completed(transcript),
        }
    }

    pub fn failed(job_id: JobId, error: impl Into<String>) -> Self {
        Self {
            job_id: Some(job_id),
            correlation_id: None,
            body: ResultBody::failed(error),
        }
    }

    pub fn processing(job_id: JobId) -> Self {
        Self {
            job_id: Some(job_id),
            correlation_id: None,
            body: ResultBody {
                status: Some(ReportedStatus::Processing),
                ..ResultBody::default()
            },
        }
    }
}

/// Response to the engine.
///
/// `Applied` and `Duplicate` are deliberately distinct so a retried notification can be told
/// apart from the one that changed the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CallbackAck {
    Applied { job_id: JobId, status: JobStatus },
    Duplicate { job_id: JobId, status: JobStatus },
}

impl CallbackAck {
    pub fn job_id(&self) -> JobId {
        match self {
            CallbackAck::Applied { job_id, .. } | CallbackAck::Duplicate { job_id, .. } => *job_id,
        }
    }

    pub fn status(&self) -> JobStatus {
        match self {
            CallbackAck::Applied { status, .. } | CallbackAck::Duplicate { status, .. } => *status,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, CallbackAck::Duplicate { .. })
    }
}

enum Report {
    Progress,
    Completed {
        transcript: String,
        result: Option<TranscriptResult>,
    },
    Failed {
        error: String,
    },
}

impl Report {
    fn update(self) -> Option<StatusUpdate> {
        match self {
            Report::Progress => None,
            Report::Completed { transcript, result } => {
                Some(StatusUpdate::Complete { transcript, result })
            }
            Report::Failed { error } => Some(StatusUpdate::Fail(JobFailure::new(
                FailureClass::EngineFailure,
                error,
            ))),
        }
    }
}

fn blank(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(|v| v.trim().is_empty())
}

fn validate(body: ResultBody) -> Result<Report, ScribeError> {
    let invalid = |msg: &str| Err(ScribeError::CallbackValidation(msg.to_string()));
    match body.status {
        None => invalid("status is required"),
        Some(ReportedStatus::Processing) => Ok(Report::Progress),
        Some(ReportedStatus::Completed) => {
            if !blank(&body.error_message) {
                return invalid("a completed callback must not carry error_message");
            }
            let result = body.transcript_result();
            match body.transcript_text {
                Some(transcript) => Ok(Report::Completed { transcript, result }),
                None => invalid("transcript_text is required when status is completed"),
            }
        }
        Some(ReportedStatus::Failed) => {
            if !blank(&body.transcript_text) {
                return invalid("a failed callback must not carry transcript_text");
            }
            match body.error_message {
                Some(error) if !error.trim().is_empty() => Ok(Report::Failed { error }),
                _ => invalid("error_message is required when status is failed"),
            }
        }
    }
}

/// Validates and applies engine callbacks.
#[derive(Clone)]
pub struct CallbackHandler {
    lifecycle: Lifecycle,
}

impl CallbackHandler {
    pub(crate) fn new(lifecycle: Lifecycle) -> Self {
        Self { lifecycle }
    }

    /// Apply a callback addressed to `job_id`.
    ///
    /// Checks, in order: the job exists, the payload is well formed, the job is in a state
    /// that accepts it.
    pub async fn handle(
        &self,
        job_id: JobId,
        payload: CallbackPayload,
    ) -> Result<CallbackAck, CorrelatedError> {
        let correlation_id = payload
            .correlation_id
            .clone()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        self.apply(job_id, payload, &correlation_id)
            .await
            .map_err(|err| {
                tracing::warn!(%job_id, %correlation_id, error = %err, "Callback rejected");
                CorrelatedError::new(correlation_id.clone(), err)
            })
    }

    #[tracing::instrument(skip_all, fields(job_id = %job_id, correlation_id = %correlation_id))]
    async fn apply(
        &self,
        job_id: JobId,
        payload: CallbackPayload,
        correlation_id: &str,
    ) -> Result<CallbackAck, ScribeError> {
        let job = self.lifecycle.get(job_id).await?;

        if let Some(echoed) = payload.job_id
            && echoed != job_id
        {
            return Err(ScribeError::CallbackValidation(format!(
                "payload job_id {echoed} does not match {job_id}"
            )));
        }
        let report = validate(payload.body)?;

        let Some(update) = report.update() else {
            return self.apply_progress(job_id, job.status, correlation_id).await;
        };

        match job.status {
            JobStatus::Processing => {
                let outcome = self
                    .lifecycle
                    .transition(job_id, JobStatus::Processing, update, "engine callback", correlation_id)
                    .await?;
                Ok(match outcome {
                    UpdateOutcome::Applied(job) => CallbackAck::Applied {
                        job_id,
                        status: job.status,
                    },
                    UpdateOutcome::Conflict(job) => {
                        tracing::info!(status = %job.status, "Callback lost the race to another terminal transition");
                        CallbackAck::Duplicate {
                            job_id,
                            status: job.status,
                        }
                    }
                })
            }
            JobStatus::Pending => Err(ScribeError::StaleCallback {
                job_id,
                status: JobStatus::Pending,
            }),
            status @ (JobStatus::Completed | JobStatus::Failed) => {
                tracing::info!(%status, "Ignoring callback for terminal job");
                Ok(CallbackAck::Duplicate { job_id, status })
            }
        }
    }

    async fn apply_progress(
        &self,
        job_id: JobId,
        status: JobStatus,
        correlation_id: &str,
    ) -> Result<CallbackAck, ScribeError> {
        if status != JobStatus::Pending {
            return Ok(CallbackAck::Duplicate { job_id, status });
        }
        let outcome = self
            .lifecycle
            .transition(job_id, JobStatus::Pending, StatusUpdate::Start, "engine started", correlation_id)
            .await?;
        Ok(match outcome {
            UpdateOutcome::Applied(job) => CallbackAck::Applied {
                job_id,
                status: job.status,
            },
            UpdateOutcome::Conflict(job) => CallbackAck::Duplicate {
                job_id,
                status: job.status,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::state_machine::Job;
    use crate::storage::StorageRef;
    use crate::store::{InMemoryJobStore, JobStore};

    struct Fixture {
        store: Arc<InMemoryJobStore>,
        lifecycle: Lifecycle,
        handler: CallbackHandler,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryJobStore::new());
        let lifecycle = Lifecycle::new(store.clone(), None);
        Fixture {
            store,
            handler: CallbackHandler::new(lifecycle.clone()),
            lifecycle,
        }
    }

    impl Fixture {
        async fn job_in(&self, status: JobStatus) -> JobId {
            let job = Job::new("long.mp3".into(), StorageRef::new("s3://b/long.mp3"), 90_000_000, 2812.5);
            self.lifecycle.create(&job, "t").await.unwrap();
            if status != JobStatus::Pending {
                self.lifecycle
                    .transition(job.id, JobStatus::Pending, StatusUpdate::Start, "t", "t")
                    .await
                    .unwrap();
            }
            if status == JobStatus::Completed {
                self.handler
                    .handle(job.id, CallbackPayload::completed(job.id, "earlier"))
                    .await
                    .unwrap();
            }
            job.id
        }

        async fn stored(&self, id: JobId) -> Job {
            self.store.get(id).await.unwrap().unwrap()
        }
    }

    #[tokio::test]
    async fn success_callback_completes_processing_job() {
        let f = fixture();
        let id = f.job_in(JobStatus::Processing).await;

        let mut payload = CallbackPayload::completed(id, "hello world");
        payload.body.processing_duration_ms = Some(4_200);
        let ack = f.handler.handle(id, payload).await.unwrap();

        assert_eq!(
            ack,
            CallbackAck::Applied {
                job_id: id,
                status: JobStatus::Completed
            }
        );
        let job = f.stored(id).await;
        assert_eq!(job.transcript_text.as_deref(), Some("hello world"));
        assert_eq!(job.result.unwrap().processing_duration_ms, Some(4_200));
        assert!(job.error_message.is_none());
        assert!(job.finished_at.is_some());
    }

    #[tokio::test]
    async fn failure_callback_fails_with_engine_class() {
        let f = fixture();
        let id = f.job_in(JobStatus::Processing).await;

        let ack = f
            .handler
            .handle(id, CallbackPayload::failed(id, "decoder crashed"))
            .await
            .unwrap();
        assert_eq!(ack.status(), JobStatus::Failed);

        let job = f.stored(id).await;
        assert_eq!(job.failure_class, Some(FailureClass::EngineFailure));
        assert_eq!(job.error_message.as_deref(), Some("ENGINE_FAILURE: decoder crashed"));
        assert!(job.transcript_text.is_none());
    }

    #[tokio::test]
    async fn duplicate_callback_is_a_distinct_no_op() {
        let f = fixture();
        let id = f.job_in(JobStatus::Processing).await;

        let first = f
            .handler
            .handle(id, CallbackPayload::completed(id, "once"))
            .await
            .unwrap();
        let after_first = f.stored(id).await;

        let second = f
            .handler
            .handle(id, CallbackPayload::completed(id, "once"))
            .await
            .unwrap();

        assert!(!first.is_duplicate());
        assert!(second.is_duplicate());
        assert_ne!(first, second);
        assert_eq!(f.stored(id).await, after_first);
    }

    #[tokio::test]
    async fn late_failure_does_not_override_completed_job() {
        let f = fixture();
        let id = f.job_in(JobStatus::Completed).await;
        let before = f.stored(id).await;

        let ack = f
            .handler
            .handle(id, CallbackPayload::failed(id, "too late"))
            .await
            .unwrap();
        assert_eq!(
            ack,
            CallbackAck::Duplicate {
                job_id: id,
                status: JobStatus::Completed
            }
        );
        assert_eq!(f.stored(id).await, before);
    }

    #[tokio::test]
    async fn terminal_callback_for_pending_job_is_stale() {
        let f = fixture();
        let id = f.job_in(JobStatus::Pending).await;

        let err = f
            .handler
            .handle(id, CallbackPayload::completed(id, "early"))
            .await
            .unwrap_err();
        assert!(matches!(
            err.error(),
            ScribeError::StaleCallback {
                status: JobStatus::Pending,
                ..
            }
        ));
        assert_eq!(f.stored(id).await.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn progress_callback_starts_pending_job_once() {
        let f = fixture();
        let id = f.job_in(JobStatus::Pending).await;

        let first = f.handler.handle(id, CallbackPayload::processing(id)).await.unwrap();
        let second = f.handler.handle(id, CallbackPayload::processing(id)).await.unwrap();

        assert_eq!(
            first,
            CallbackAck::Applied {
                job_id: id,
                status: JobStatus::Processing
            }
        );
        assert!(second.is_duplicate());
        assert!(f.stored(id).await.started_at.is_some());
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let f = fixture();
        let id = JobId::new();
        let err = f
            .handler
            .handle(id, CallbackPayload::completed(id, "x"))
            .await
            .unwrap_err();
        assert!(matches!(err.error(), ScribeError::NotFound(_)));
        assert!(!err.correlation_id.is_empty());
    }

    #[tokio::test]
    async fn malformed_payloads_are_rejected_without_mutation() {
        let f = fixture();
        let id = f.job_in(JobStatus::Processing).await;

        let cases = [
            CallbackPayload {
                job_id: Some(id),
                ..CallbackPayload::default()
            },
            CallbackPayload {
                body: ResultBody {
                    status: Some(ReportedStatus::Completed),
                    ..ResultBody::default()
                },
                ..CallbackPayload::default()
            },
            CallbackPayload::failed(id, "   "),
            CallbackPayload {
                body: ResultBody {
                    error_message: Some("boom".into()),
                    ..ResultBody::completed("text")
                },
                ..CallbackPayload::default()
            },
            CallbackPayload::completed(JobId::new(), "wrong job"),
        ];

        for payload in cases {
            let err = f.handler.handle(id, payload).await.unwrap_err();
            assert!(
                matches!(err.error(), ScribeError::CallbackValidation(_)),
                "unexpected {err}"
            );
        }
        assert_eq!(f.stored(id).await.status, JobStatus::Processing);
    }

    #[tokio::test]
    async fn caller_correlation_id_is_echoed_on_errors() {
        let f = fixture();
        let id = JobId::new();
        let mut payload = CallbackPayload::completed(id, "x");
        payload.correlation_id = Some("engine-req-7".into());

        let err = f.handler.handle(id, payload).await.unwrap_err();
        assert_eq!(err.correlation_id, "engine-req-7");
    }

    #[test]
    fn payload_deserializes_flat_engine_body() {
        let json = r#"{"status": "success", "transcript_text": "hi", "language": "en"}"#;
        let payload: CallbackPayload = serde_json::from_str(json).unwrap();
        assert!(payload.job_id.is_none());
        assert_eq!(payload.body.status, Some(ReportedStatus::Completed));
        assert_eq!(payload.body.language.as_deref(), Some("en"));
    }
}
