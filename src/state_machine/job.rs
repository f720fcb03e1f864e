use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::storage::StorageRef;

/// Opaque unique identifier of a transcription job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Tracks the lifecycle status of a job.
///
/// Transitions only move forward: `Pending → Processing → {Completed, Failed}`,
/// with `Pending → Failed` allowed when dispatch never reached the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(JobStatus::Pending),
            "PROCESSING" => Ok(JobStatus::Processing),
            "COMPLETED" => Ok(JobStatus::Completed),
            "FAILED" => Ok(JobStatus::Failed),
            _ => Err(format!("Invalid job status: {s}")),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classifies why a job ended up `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureClass {
    /// The synchronous call exceeded its bounded wait.
    SyncTimeout,
    /// The engine ran and reported that transcription failed.
    EngineFailure,
    /// The circuit breaker refused the call.
    ServiceUnavailable,
    /// The engine could not be reached or refused the submission.
    DispatchFailed,
    /// Anything else (store conflicts, unexpected states).
    Internal,
}

impl FailureClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureClass::SyncTimeout => "SYNC_TIMEOUT",
            FailureClass::EngineFailure => "ENGINE_FAILURE",
            FailureClass::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            FailureClass::DispatchFailed => "DISPATCH_FAILED",
            FailureClass::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A classified failure, rendered into the job's `error_message`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub class: FailureClass,
    pub detail: String,
}

impl JobFailure {
    pub fn new(class: FailureClass, detail: impl Into<String>) -> Self {
        Self {
            class,
            detail: detail.into(),
        }
    }

    /// `"<CLASS>: <detail>"`, or just the class when the detail is blank.
    pub fn message(&self) -> String {
        let detail = self.detail.trim();
        if detail.is_empty() {
            self.class.to_string()
        } else {
            format!("{}: {detail}", self.class)
        }
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordAlignment {
    pub word: String,
    pub start: f64,
    pub end: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub words: Vec<WordAlignment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakerSegment {
    pub speaker: String,
    pub start: f64,
    pub end: f64,
}

/// Structured output of a transcription: timed segments, word alignment and speakers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscriptResult {
    #[serde(default)]
    pub segments: Vec<Segment>,
    #[serde(default)]
    pub speakers: Vec<SpeakerSegment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_duration_s: Option<f64>,
}

impl TranscriptResult {
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty() && self.speakers.is_empty()
    }
}

/// One audio file's transcription request and its tracked lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub original_filename: String,
    pub storage_ref: StorageRef,
    pub status: JobStatus,
    pub transcript_text: Option<String>,
    pub result: Option<TranscriptResult>,
    pub error_message: Option<String>,
    pub failure_class: Option<FailureClass>,
    pub file_size_bytes: u64,
    pub estimated_duration_seconds: f64,
    pub content_type: Option<String>,
    pub language: Option<String>,
    pub model: Option<String>,
    pub diarize: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(
        original_filename: String,
        storage_ref: StorageRef,
        file_size_bytes: u64,
        estimated_duration_seconds: f64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            original_filename,
            storage_ref,
            status: JobStatus::Pending,
            transcript_text: None,
            result: None,
            error_message: None,
            failure_class: None,
            file_size_bytes,
            estimated_duration_seconds,
            content_type: None,
            language: None,
            model: None,
            diarize: false,
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Structured audit record produced when a job reaches a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub job_id: JobId,
    pub original_filename: String,
    pub status: JobStatus,
    pub failure_class: Option<FailureClass>,
    pub file_size_bytes: u64,
    pub estimated_duration_seconds: f64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Time spent between creation and the engine picking the job up.
    pub queue_ms: Option<i64>,
    /// Time spent between `started_at` and `finished_at`.
    pub processing_ms: Option<i64>,
}

impl AuditRecord {
    pub fn from_job(job: &Job) -> Self {
        let queue_ms = job
            .started_at
            .map(|started| (started - job.created_at).num_milliseconds());
        let processing_ms = match (job.started_at, job.finished_at) {
            (Some(started), Some(finished)) => Some((finished - started).num_milliseconds()),
            _ => None,
        };

        Self {
            job_id: job.id,
            original_filename: job.original_filename.clone(),
            status: job.status,
            failure_class: job.failure_class,
            file_size_bytes: job.file_size_bytes,
            estimated_duration_seconds: job.estimated_duration_seconds,
            created_at: job.created_at,
            started_at: job.started_at,
            finished_at: job.finished_at,
            queue_ms,
            processing_ms,
        }
    }
}
