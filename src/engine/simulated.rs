use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::ProcessingEngine;
use super::error::EngineError;
use super::types::{SubmitAck, SyncTranscript, TranscriptionRequest};
use crate::state_machine::JobId;

/// How the simulated engine answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulatedBehaviour {
    /// Every call succeeds with this transcript.
    Succeed { transcript: String },
    /// Every call fails with an HTTP-style status.
    Unavailable { status: u16 },
    /// The engine runs but reports a transcription failure (sync calls only).
    Report { error: String },
    /// Calls never complete.
    Hang,
}

/// In-process stand-in for the transcription engine, used by the demo and tests.
pub struct SimulatedEngine {
    behaviour: Mutex<SimulatedBehaviour>,
    sync_calls: AtomicUsize,
    async_calls: AtomicUsize,
    submissions: Mutex<Vec<(JobId, String)>>,
}

impl SimulatedEngine {
    pub fn new(behaviour: SimulatedBehaviour) -> Self {
        Self {
            behaviour: Mutex::new(behaviour),
            sync_calls: AtomicUsize::new(0),
            async_calls: AtomicUsize::new(0),
            submissions: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding(transcript: impl Into<String>) -> Self {
        Self::new(SimulatedBehaviour::Succeed {
            transcript: transcript.into(),
        })
    }

    pub fn set_behaviour(&self, behaviour: SimulatedBehaviour) {
        *self.behaviour.lock() = behaviour;
    }

    pub fn sync_calls(&self) -> usize {
        self.sync_calls.load(Ordering::SeqCst)
    }

    pub fn async_calls(&self) -> usize {
        self.async_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.sync_calls() + self.async_calls()
    }

    /// Jobs accepted through `submit_async`, with their callback addresses.
    pub fn submissions(&self) -> Vec<(JobId, String)> {
        self.submissions.lock().clone()
    }

    fn behaviour(&self) -> SimulatedBehaviour {
        self.behaviour.lock().clone()
    }
}

#[async_trait]
impl ProcessingEngine for SimulatedEngine {
    async fn invoke_sync(
        &self,
        request: &TranscriptionRequest,
        _timeout: Duration,
    ) -> Result<SyncTranscript, EngineError> {
        self.sync_calls.fetch_add(1, Ordering::SeqCst);
        match self.behaviour() {
            SimulatedBehaviour::Succeed { transcript } => Ok(SyncTranscript {
                transcript,
                result: None,
            }),
            SimulatedBehaviour::Unavailable { status } => Err(EngineError::Api {
                status,
                message: format!("simulated outage for job {}", request.job_id),
            }),
            SimulatedBehaviour::Report { error } => Err(EngineError::Reported(error)),
            SimulatedBehaviour::Hang => std::future::pending().await,
        }
    }

    async fn submit_async(
        &self,
        request: &TranscriptionRequest,
        callback_url: &str,
    ) -> Result<SubmitAck, EngineError> {
        self.async_calls.fetch_add(1, Ordering::SeqCst);
        match self.behaviour() {
            SimulatedBehaviour::Unavailable { status } => Err(EngineError::Api {
                status,
                message: format!("simulated outage for job {}", request.job_id),
            }),
            SimulatedBehaviour::Hang => std::future::pending().await,
            _ => {
                self.submissions
                    .lock()
                    .push((request.job_id, callback_url.to_string()));
                Ok(SubmitAck {
                    engine_job_id: Some(format!("sim-{}", request.job_id)),
                    status: Some("queued".into()),
                })
            }
        }
    }
}
