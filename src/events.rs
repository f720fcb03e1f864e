//! Optional lifecycle notifications.
//!
//! The orchestrator and the callback handler publish a [`JobEvent`] for every job they
//! create or transition. Publishing is best-effort: a sink error is logged and never changes
//! the outcome of the operation that produced the event.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::state_machine::{AuditRecord, JobId, JobStatus};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    JobCreated {
        job_id: JobId,
        original_filename: String,
        file_size_bytes: u64,
        estimated_duration_seconds: f64,
        correlation_id: String,
        at: DateTime<Utc>,
    },
    StatusChanged {
        job_id: JobId,
        from: JobStatus,
        to: JobStatus,
        reason: String,
        error: Option<String>,
        correlation_id: String,
        at: DateTime<Utc>,
    },
    /// Emitted once, when the job reaches a terminal state.
    JobFinished(AuditRecord),
}

impl JobEvent {
    pub fn job_id(&self) -> JobId {
        match self {
            JobEvent::JobCreated { job_id, .. } | JobEvent::StatusChanged { job_id, .. } => *job_id,
            JobEvent::JobFinished(record) => record.job_id,
        }
    }
}

/// Receives job events.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: JobEvent) -> anyhow::Result<()>;
}

/// Writes every event as a structured `tracing` record.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn publish(&self, event: JobEvent) -> anyhow::Result<()> {
        let payload = serde_json::to_string(&event)?;
        tracing::info!(target: "scribeflow::events", job_id = %event.job_id(), %payload, "Job event");
        Ok(())
    }
}

/// In-process fan-out of job events over a tokio broadcast channel.
///
/// Publishing never waits for slow subscribers; a lagging subscriber sees
/// `RecvError::Lagged` instead.
#[derive(Debug, Clone)]
pub struct BroadcastEventSink {
    sender: broadcast::Sender<JobEvent>,
}

impl BroadcastEventSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }
}

impl EventSink for BroadcastEventSink {
    fn publish(&self, event: JobEvent) -> anyhow::Result<()> {
        // No subscribers is not an error.
        let _ = self.sender.send(event);
        Ok(())
    }
}

/// Publish to an optional sink, logging failures.
pub(crate) fn publish(sink: Option<&dyn EventSink>, event: JobEvent) {
    if let Some(sink) = sink {
        let job_id = event.job_id();
        if let Err(err) = sink.publish(event) {
            tracing::warn!(%job_id, error = %err, "Failed to publish job event");
        }
    }
}
