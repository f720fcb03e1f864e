use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::Instrument;
use uuid::Uuid;

use crate::breaker::{BreakerMetrics, CircuitBreaker};
use crate::callback::{CallbackAck, CallbackHandler, CallbackPayload};
use crate::config::{ScribeConfig, SyncFallback};
use crate::deferred::{DeferredDispatcher, DeferredJob};
use crate::dispatch::{self, DispatchDecision, DispatchInput, DispatchMode, DispatchOverride};
use crate::engine::{EngineError, ProcessingEngine, SubmitAck, TranscriptionRequest};
use crate::error::{CorrelatedError, ScribeError};
use crate::events::EventSink;
use crate::lifecycle::Lifecycle;
use crate::retry::RetryPolicy;
use crate::state_machine::{FailureClass, Job, JobFailure, JobId, JobStatus, StatusUpdate};
use crate::storage::StorageRef;
use crate::store::{JobStore, UpdateOutcome};
use crate::validation::{UploadValidator, ValidationError};

/// Dispatch tunables of the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorSettings {
    pub sync_threshold_seconds: f64,
    pub sync_timeout: Duration,
    pub sync_fallback: SyncFallback,
    pub callback_base_url: String,
    /// Rounds and backoff of the deferred dispatcher.
    pub retry: RetryPolicy,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&ScribeConfig::default())
    }
}

impl OrchestratorSettings {
    pub fn from_config(config: &ScribeConfig) -> Self {
        Self {
            sync_threshold_seconds: config.sync_threshold_seconds,
            sync_timeout: config.sync_timeout(),
            sync_fallback: config.sync_fallback,
            callback_base_url: config.engine.callback_base_url.clone(),
            retry: config.retry.clone(),
        }
    }

    /// Address the engine posts the result of `job_id` to.
    pub fn callback_url(&self, job_id: JobId) -> String {
        format!(
            "{}/internal/v1/transcriptions/{job_id}/callback",
            self.callback_base_url.trim_end_matches('/')
        )
    }
}

/// Options chosen by the caller of [`JobOrchestrator::create_job`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateOptions {
    pub dispatch: DispatchOverride,
    pub language: Option<String>,
    pub model: Option<String>,
    pub diarize: bool,
    /// Generated when absent.
    pub correlation_id: Option<String>,
}

/// An audio file already placed in object storage.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateJobRequest {
    pub storage_ref: StorageRef,
    pub original_filename: String,
    pub content_type: Option<String>,
    pub file_size_bytes: u64,
    pub options: CreateOptions,
}

/// Inline transcription result: the job, already `Completed`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncResult {
    pub job: Job,
    pub correlation_id: String,
}

impl SyncResult {
    pub fn transcript(&self) -> &str {
        self.job.transcript_text.as_deref().unwrap_or_default()
    }
}

/// Immediate acknowledgement of a job that continues in the background.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AsyncAck {
    pub job_id: JobId,
    pub status: JobStatus,
    /// Where the caller polls for the job.
    pub status_ref: String,
    /// The job is waiting for the engine to become available again.
    pub deferred: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub correlation_id: String,
}

impl AsyncAck {
    fn for_job(job: &Job, deferred: bool, correlation_id: &str) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            status_ref: format!("/v1/transcriptions/{}", job.id),
            deferred,
            error_message: job.error_message.clone(),
            correlation_id: correlation_id.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CreateJobResponse {
    Completed(SyncResult),
    Accepted(AsyncAck),
}

impl CreateJobResponse {
    pub fn job_id(&self) -> JobId {
        match self {
            CreateJobResponse::Completed(result) => result.job.id,
            CreateJobResponse::Accepted(ack) => ack.job_id,
        }
    }

    pub fn status(&self) -> JobStatus {
        match self {
            CreateJobResponse::Completed(result) => result.job.status,
            CreateJobResponse::Accepted(ack) => ack.status,
        }
    }
}

/// Drives jobs from creation through dispatch to a terminal state.
///
/// The engine handed in is expected to be breaker-wrapped;
/// `breaker` is the same instance, used for the fast path check and for status queries.
pub struct JobOrchestrator {
    lifecycle: Lifecycle,
    engine: Arc<dyn ProcessingEngine>,
    breaker: Arc<CircuitBreaker>,
    settings: OrchestratorSettings,
    validator: UploadValidator,
    callbacks: CallbackHandler,
    deferred: Option<mpsc::UnboundedSender<DeferredJob>>,
}

fn correlation_id_or_new(id: Option<&str>) -> String {
    id.map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

impl JobOrchestrator {
    pub fn new(
        store: Arc<dyn JobStore>,
        engine: Arc<dyn ProcessingEngine>,
        breaker: Arc<CircuitBreaker>,
        settings: OrchestratorSettings,
    ) -> Self {
        let lifecycle = Lifecycle::new(store, None);
        Self {
            callbacks: CallbackHandler::new(lifecycle.clone()),
            lifecycle,
            engine,
            breaker,
            settings,
            validator: UploadValidator::default(),
            deferred: None,
        }
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.lifecycle = self.lifecycle.with_events(sink);
        self.callbacks = CallbackHandler::new(self.lifecycle.clone());
        self
    }

    pub fn with_validator(mut self, validator: UploadValidator) -> Self {
        self.validator = validator;
        self
    }

    /// Share the orchestrator and spawn its deferred dispatcher, which carries parked
    /// synchronous jobs and retried submissions. Must be called inside a tokio runtime.
    pub fn start(mut self) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.deferred = Some(tx);
        let orchestrator = Arc::new(self);
        DeferredDispatcher::spawn(Arc::downgrade(&orchestrator), rx);
        orchestrator
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn breaker_metrics(&self) -> BreakerMetrics {
        self.breaker.metrics()
    }

    pub fn reset_breaker(&self) {
        self.breaker.reset();
    }

    pub fn force_breaker_half_open(&self) {
        self.breaker.transition_to_half_open();
    }

    /// Create a job, decide how to dispatch it, and dispatch it.
    ///
    /// Validation errors create no job. Synchronous failures are returned to the caller
    /// after the job has been failed; asynchronous submission failures are absorbed into
    /// the job and reported through the returned ack.
    pub async fn create_job(
        &self,
        request: CreateJobRequest,
    ) -> Result<CreateJobResponse, CorrelatedError> {
        let correlation_id = correlation_id_or_new(request.options.correlation_id.as_deref());
        let span = tracing::info_span!(
            "create_job",
            correlation_id = %correlation_id,
            filename = %request.original_filename
        );
        self.create_job_inner(request, &correlation_id)
            .instrument(span)
            .await
            .map_err(|err| CorrelatedError::new(correlation_id.clone(), err))
    }

    async fn create_job_inner(
        &self,
        request: CreateJobRequest,
        correlation_id: &str,
    ) -> Result<CreateJobResponse, ScribeError> {
        let (job, dispatch_override) = self.build_job(request)?;
        self.lifecycle.create(&job, correlation_id).await?;

        let decision = self.decide(&job, dispatch_override);
        tracing::info!(job_id = %job.id, mode = %decision.mode, reason = ?decision.reason, "Dispatch decided");

        match decision.mode {
            DispatchMode::Sync => self.dispatch_sync(job, correlation_id).await,
            DispatchMode::Async => self
                .dispatch_async(job, correlation_id)
                .await
                .map(CreateJobResponse::Accepted),
        }
    }

    fn build_job(&self, request: CreateJobRequest) -> Result<(Job, DispatchOverride), ScribeError> {
        if request.storage_ref.is_blank() {
            return Err(ValidationError::MissingStorageRef.into());
        }
        let content_type = self.validator.validate_file(
            request.file_size_bytes,
            request.content_type.as_deref(),
            Some(request.original_filename.as_str()),
        )?;
        let options = request.options;
        self.validator.validate_language(options.language.as_deref())?;
        self.validator.validate_model(options.model.as_deref())?;

        let estimate =
            dispatch::estimate_duration_seconds(request.file_size_bytes, Some(&content_type));
        let mut job = Job::new(
            request.original_filename,
            request.storage_ref,
            request.file_size_bytes,
            estimate,
        );
        job.content_type = Some(content_type);
        job.language = options.language.filter(|l| !l.trim().is_empty());
        job.model = options.model.filter(|m| !m.trim().is_empty());
        job.diarize = options.diarize;
        Ok((job, options.dispatch))
    }

    fn decide(&self, job: &Job, dispatch_override: DispatchOverride) -> DispatchDecision {
        dispatch::decide(&DispatchInput {
            file_size_bytes: job.file_size_bytes,
            estimated_duration_seconds: job.estimated_duration_seconds,
            dispatch_override,
            sync_threshold_seconds: self.settings.sync_threshold_seconds,
        })
    }

    async fn dispatch_sync(
        &self,
        job: Job,
        correlation_id: &str,
    ) -> Result<CreateJobResponse, ScribeError> {
        if !self.breaker.is_available() {
            tracing::warn!(job_id = %job.id, breaker = %self.breaker.name(), "Circuit open; synchronous call not attempted");
            let err = ScribeError::CircuitOpen(format!("circuit '{}' is open", self.breaker.name()));
            return self.on_sync_rejected(job, err, correlation_id).await;
        }

        let job = match self
            .lifecycle
            .transition(job.id, JobStatus::Pending, StatusUpdate::Start, "synchronous dispatch", correlation_id)
            .await?
        {
            UpdateOutcome::Applied(job) => job,
            UpdateOutcome::Conflict(current) => {
                return Err(ScribeError::Internal(format!(
                    "job {} moved to {} before dispatch",
                    current.id, current.status
                )));
            }
        };

        let timeout = self.settings.sync_timeout;
        let request = TranscriptionRequest::for_job(&job);
        let outcome =
            tokio::time::timeout(timeout, self.engine.invoke_sync(&request, timeout)).await;

        let err = match outcome {
            Ok(Ok(transcript)) => {
                let update = StatusUpdate::Complete {
                    transcript: transcript.transcript,
                    result: transcript.result,
                };
                let outcome = self
                    .lifecycle
                    .transition(job.id, JobStatus::Processing, update, "synchronous result", correlation_id)
                    .await?;
                return match outcome {
                    UpdateOutcome::Applied(job) => Ok(CreateJobResponse::Completed(SyncResult {
                        job,
                        correlation_id: correlation_id.to_string(),
                    })),
                    UpdateOutcome::Conflict(current) => self.settle_conflict(current, None, correlation_id),
                };
            }
            Ok(Err(err)) => ScribeError::from(err),
            Err(_) => {
                tracing::warn!(job_id = %job.id, ?timeout, "Synchronous transcription timed out");
                ScribeError::SyncTimeout(timeout)
            }
        };

        if matches!(err, ScribeError::CircuitOpen(_)) {
            return self.on_sync_rejected(job, err, correlation_id).await;
        }
        self.fail_sync(job, err, correlation_id).await
    }

    /// The breaker refused a synchronous job: reject it or defer it, per configuration.
    async fn on_sync_rejected(
        &self,
        job: Job,
        err: ScribeError,
        correlation_id: &str,
    ) -> Result<CreateJobResponse, ScribeError> {
        if self.settings.sync_fallback == SyncFallback::Reject {
            return self.fail_sync(job, err, correlation_id).await;
        }
        if self.defer(job.id, 0, correlation_id) {
            tracing::info!(job_id = %job.id, "Synchronous job degraded to deferred asynchronous dispatch");
            return Ok(CreateJobResponse::Accepted(AsyncAck::for_job(
                &job,
                true,
                correlation_id,
            )));
        }
        let err = ScribeError::Internal("deferred dispatcher not running".into());
        self.fail_sync(job, err, correlation_id).await
    }

    /// Hand a Pending job to the deferred dispatcher. False when it is not running.
    fn defer(&self, job_id: JobId, attempts_made: u32, correlation_id: &str) -> bool {
        let Some(queue) = &self.deferred else {
            return false;
        };
        queue
            .send(DeferredJob {
                job_id,
                correlation_id: correlation_id.to_string(),
                attempts_made,
            })
            .is_ok()
    }

    /// Fail a synchronous job and return the error, unless another writer already
    /// finished it.
    async fn fail_sync(
        &self,
        job: Job,
        err: ScribeError,
        correlation_id: &str,
    ) -> Result<CreateJobResponse, ScribeError> {
        let failure = JobFailure::new(err.failure_class(), err.to_string());
        let outcome = self
            .lifecycle
            .transition(job.id, job.status, StatusUpdate::Fail(failure), "synchronous failure", correlation_id)
            .await?;
        match outcome {
            UpdateOutcome::Applied(_) => Err(err),
            UpdateOutcome::Conflict(current) => self.settle_conflict(current, Some(err), correlation_id),
        }
    }

    /// First terminal transition wins: report whatever the job ended up as.
    fn settle_conflict(
        &self,
        current: Job,
        err: Option<ScribeError>,
        correlation_id: &str,
    ) -> Result<CreateJobResponse, ScribeError> {
        match current.status {
            JobStatus::Completed => Ok(CreateJobResponse::Completed(SyncResult {
                job: current,
                correlation_id: correlation_id.to_string(),
            })),
            JobStatus::Failed => Err(err.unwrap_or_else(|| {
                ScribeError::EngineFailure(current.error_message.clone().unwrap_or_default())
            })),
            status => Err(ScribeError::Internal(format!(
                "job {} unexpectedly {status} after synchronous dispatch",
                current.id
            ))),
        }
    }

    /// Submit once inline. A retryable failure leaves the job Pending and hands the
    /// remaining attempts to the deferred dispatcher, so the ack never waits on backoff.
    async fn dispatch_async(&self, job: Job, correlation_id: &str) -> Result<AsyncAck, ScribeError> {
        let err = match self.submit(&job).await {
            Ok(ack) => {
                tracing::debug!(job_id = %job.id, engine_job_id = ?ack.engine_job_id, "Engine accepted job");
                let job = self.mark_submitted(job.id, correlation_id).await?;
                return Ok(AsyncAck::for_job(&job, false, correlation_id));
            }
            Err(err) => err,
        };

        if err.is_retryable() && self.settings.retry.is_enabled() && self.defer(job.id, 1, correlation_id) {
            tracing::info!(job_id = %job.id, error = %err, "Submission failed; retrying in the background");
            return Ok(AsyncAck::for_job(&job, true, correlation_id));
        }

        let failure = submission_failure(&err);
        let job = match self
            .lifecycle
            .transition(job.id, JobStatus::Pending, StatusUpdate::Fail(failure), "submission failed", correlation_id)
            .await?
        {
            UpdateOutcome::Applied(job) | UpdateOutcome::Conflict(job) => job,
        };
        Ok(AsyncAck::for_job(&job, false, correlation_id))
    }

    pub(crate) async fn submit(&self, job: &Job) -> Result<SubmitAck, EngineError> {
        let request = TranscriptionRequest::for_job(job);
        let callback_url = self.settings.callback_url(job.id);
        self.engine.submit_async(&request, &callback_url).await
    }

    /// Pending -> Processing after a successful submission. A callback may already have
    /// moved the job; that is not an error.
    pub(crate) async fn mark_submitted(&self, job_id: JobId, correlation_id: &str) -> Result<Job, ScribeError> {
        let outcome = self
            .lifecycle
            .transition(job_id, JobStatus::Pending, StatusUpdate::Start, "submitted to engine", correlation_id)
            .await?;
        Ok(outcome.into_job())
    }

    pub(crate) fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub async fn get_job(&self, job_id: JobId) -> Result<Job, CorrelatedError> {
        let correlation_id = correlation_id_or_new(None);
        self.lifecycle
            .get(job_id)
            .await
            .map_err(|err| CorrelatedError::new(correlation_id, err))
    }

    /// Transcript text of a completed job.
    pub async fn transcript(&self, job_id: JobId) -> Result<String, CorrelatedError> {
        let correlation_id = correlation_id_or_new(None);
        let job = self.lifecycle.get(job_id).await.map_err(|err| CorrelatedError::new(correlation_id.clone(), err))?;
        match (job.status, job.transcript_text) {
            (JobStatus::Completed, Some(text)) => Ok(text),
            (status, _) => Err(CorrelatedError::new(
                correlation_id,
                ScribeError::NotReady { job_id, status },
            )),
        }
    }

    pub async fn handle_callback(
        &self,
        job_id: JobId,
        payload: CallbackPayload,
    ) -> Result<CallbackAck, CorrelatedError> {
        self.callbacks.handle(job_id, payload).await
    }
}

/// Classify a failed asynchronous submission.
pub(crate) fn submission_failure(err: &EngineError) -> JobFailure {
    let class = match err {
        EngineError::CircuitOpen { .. } => FailureClass::ServiceUnavailable,
        _ => FailureClass::DispatchFailed,
    };
    JobFailure::new(class, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::{BreakerEngine, CircuitBreakerConfig, CircuitState};
    use crate::engine::{SimulatedBehaviour, SimulatedEngine};
    use crate::store::InMemoryJobStore;

    struct Fixture {
        orchestrator: Arc<JobOrchestrator>,
        engine: Arc<SimulatedEngine>,
        store: Arc<InMemoryJobStore>,
    }

    fn fixture(settings: OrchestratorSettings) -> Fixture {
        let engine = Arc::new(SimulatedEngine::succeeding("hello world"));
        let store = Arc::new(InMemoryJobStore::new());
        let breaker = Arc::new(CircuitBreaker::new(
            "engine",
            CircuitBreakerConfig {
                sliding_window_size: 4,
                min_calls: 2,
                ..CircuitBreakerConfig::default()
            },
        ));
        let orchestrator = JobOrchestrator::new(
            store.clone(),
            Arc::new(BreakerEngine::new(engine.clone(), breaker.clone())),
            breaker,
            settings,
        )
        .start();
        Fixture {
            orchestrator,
            engine,
            store,
        }
    }

    fn wav(size: u64) -> CreateJobRequest {
        CreateJobRequest {
            storage_ref: StorageRef::new("file:///data/audio/clip.wav"),
            original_filename: "clip.wav".into(),
            content_type: Some("audio/wav".into()),
            file_size_bytes: size,
            options: CreateOptions::default(),
        }
    }

    const SHORT: u64 = 64_000;
    const LONG: u64 = 50_000_000;

    #[tokio::test]
    async fn short_audio_is_transcribed_inline() {
        let f = fixture(OrchestratorSettings::default());
        let response = f.orchestrator.create_job(wav(SHORT)).await.unwrap();

        let CreateJobResponse::Completed(result) = response else {
            panic!("expected inline result");
        };
        assert_eq!(result.transcript(), "hello world");
        assert_eq!(result.job.status, JobStatus::Completed);
        assert_eq!(f.engine.sync_calls(), 1);
        assert_eq!(f.engine.async_calls(), 0);

        let stored = f.orchestrator.get_job(result.job.id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert_eq!(
            f.orchestrator.transcript(stored.id).await.unwrap(),
            "hello world"
        );
    }

    #[tokio::test]
    async fn long_audio_is_submitted_with_a_callback_address() {
        let f = fixture(OrchestratorSettings {
            callback_base_url: "https://api.example.com/".into(),
            ..OrchestratorSettings::default()
        });
        let response = f.orchestrator.create_job(wav(LONG)).await.unwrap();

        let CreateJobResponse::Accepted(ack) = response else {
            panic!("expected async ack");
        };
        assert_eq!(ack.status, JobStatus::Processing);
        assert!(!ack.deferred);
        assert_eq!(ack.status_ref, format!("/v1/transcriptions/{}", ack.job_id));

        let submissions = f.engine.submissions();
        assert_eq!(submissions.len(), 1);
        assert_eq!(
            submissions[0].1,
            format!(
                "https://api.example.com/internal/v1/transcriptions/{}/callback",
                ack.job_id
            )
        );
        assert_eq!(f.engine.sync_calls(), 0);
    }

    #[tokio::test]
    async fn override_beats_the_threshold() {
        let f = fixture(OrchestratorSettings::default());
        let mut request = wav(SHORT);
        request.options.dispatch = DispatchOverride::ForceAsync;
        let response = f.orchestrator.create_job(request).await.unwrap();
        assert!(matches!(response, CreateJobResponse::Accepted(_)));
        assert_eq!(f.engine.async_calls(), 1);
    }

    #[tokio::test]
    async fn invalid_upload_creates_no_job() {
        let f = fixture(OrchestratorSettings::default());
        let mut request = wav(SHORT);
        request.storage_ref = StorageRef::new(" ");
        let err = f.orchestrator.create_job(request).await.unwrap_err();
        assert!(matches!(
            err.error(),
            ScribeError::Validation(ValidationError::MissingStorageRef)
        ));

        let err = f.orchestrator.create_job(wav(0)).await.unwrap_err();
        assert!(matches!(err.error(), ScribeError::Validation(_)));
        assert!(f.store.is_empty());
        assert_eq!(f.engine.total_calls(), 0);
    }

    #[tokio::test]
    async fn caller_correlation_id_is_kept() {
        let f = fixture(OrchestratorSettings::default());
        let mut request = wav(SHORT);
        request.options.correlation_id = Some("req-42".into());
        let CreateJobResponse::Completed(result) = f.orchestrator.create_job(request).await.unwrap()
        else {
            panic!("expected inline result");
        };
        assert_eq!(result.correlation_id, "req-42");
    }

    #[tokio::test]
    async fn engine_reported_failure_fails_the_sync_job() {
        let f = fixture(OrchestratorSettings::default());
        f.engine.set_behaviour(SimulatedBehaviour::Report {
            error: "no speech detected".into(),
        });
        let err = f.orchestrator.create_job(wav(SHORT)).await.unwrap_err();
        assert!(matches!(err.error(), ScribeError::EngineFailure(_)));
        assert_eq!(f.store.len(), 1);
        assert_eq!(f.orchestrator.breaker().state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn failed_submission_fails_the_job_without_erroring() {
        let f = fixture(OrchestratorSettings::default());
        f.engine
            .set_behaviour(SimulatedBehaviour::Unavailable { status: 502 });
        let response = f.orchestrator.create_job(wav(LONG)).await.unwrap();

        let CreateJobResponse::Accepted(ack) = response else {
            panic!("expected async ack");
        };
        assert_eq!(ack.status, JobStatus::Failed);
        assert!(
            ack.error_message
                .as_deref()
                .unwrap()
                .starts_with("DISPATCH_FAILED:")
        );
        let job = f.orchestrator.get_job(ack.job_id).await.unwrap();
        assert_eq!(job.failure_class, Some(FailureClass::DispatchFailed));
    }

    #[tokio::test]
    async fn open_circuit_rejects_sync_work_without_calling_the_engine() {
        let f = fixture(OrchestratorSettings::default());
        f.orchestrator.breaker().trip();

        let err = f.orchestrator.create_job(wav(SHORT)).await.unwrap_err();
        assert!(matches!(err.error(), ScribeError::CircuitOpen(_)));
        assert_eq!(f.engine.total_calls(), 0);

        // The job exists and carries the classified failure.
        assert_eq!(f.store.len(), 1);
        let metrics = f.orchestrator.breaker_metrics();
        assert_eq!(metrics.state, CircuitState::Open);
    }

    #[tokio::test]
    async fn open_circuit_fails_async_submission_as_unavailable() {
        let f = fixture(OrchestratorSettings::default());
        f.orchestrator.breaker().trip();
        let CreateJobResponse::Accepted(ack) = f.orchestrator.create_job(wav(LONG)).await.unwrap()
        else {
            panic!("expected async ack");
        };
        assert_eq!(ack.status, JobStatus::Failed);
        let job = f.orchestrator.get_job(ack.job_id).await.unwrap();
        assert_eq!(job.failure_class, Some(FailureClass::ServiceUnavailable));
        assert_eq!(f.engine.total_calls(), 0);
    }

    #[tokio::test]
    async fn breaker_admin_operations() {
        let f = fixture(OrchestratorSettings::default());
        f.orchestrator.breaker().trip();
        f.orchestrator.force_breaker_half_open();
        assert_eq!(f.orchestrator.breaker_metrics().state, CircuitState::HalfOpen);
        f.orchestrator.reset_breaker();
        assert_eq!(f.orchestrator.breaker_metrics().state, CircuitState::Closed);
    }

    #[tokio::test]
    async fn transcript_of_unfinished_job_is_not_ready() {
        let f = fixture(OrchestratorSettings::default());
        let response = f.orchestrator.create_job(wav(LONG)).await.unwrap();
        let err = f.orchestrator.transcript(response.job_id()).await.unwrap_err();
        assert!(matches!(
            err.error(),
            ScribeError::NotReady {
                status: JobStatus::Processing,
                ..
            }
        ));

        let err = f.orchestrator.get_job(JobId::new()).await.unwrap_err();
        assert!(matches!(err.error(), ScribeError::NotFound(_)));
    }

    #[tokio::test]
    async fn callback_completes_an_async_job() {
        let f = fixture(OrchestratorSettings::default());
        let response = f.orchestrator.create_job(wav(LONG)).await.unwrap();
        let id = response.job_id();

        let ack = f
            .orchestrator
            .handle_callback(id, CallbackPayload::completed(id, "long transcript"))
            .await
            .unwrap();
        assert!(!ack.is_duplicate());
        assert_eq!(f.orchestrator.transcript(id).await.unwrap(), "long transcript");
    }

    #[test]
    fn callback_url_trims_trailing_slash() {
        let settings = OrchestratorSettings {
            callback_base_url: "http://svc:8080/".into(),
            ..OrchestratorSettings::default()
        };
        let id = JobId::new();
        assert_eq!(
            settings.callback_url(id),
            format!("http://svc:8080/internal/v1/transcriptions/{id}/callback")
        );
    }
}
