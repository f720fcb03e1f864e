pub mod client;
pub mod error;
pub mod simulated;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;

pub use client::HttpProcessingEngine;
pub use error::EngineError;
pub use simulated::{SimulatedBehaviour, SimulatedEngine};
pub use types::{ReportedStatus, ResultBody, SubmitAck, SyncTranscript, TranscriptionRequest};

/// The external transcription engine, as seen by the orchestrator.
///
/// Wrappers such as the circuit breaker and the retry layer implement this same trait,
/// so they compose around any concrete engine.
#[async_trait]
pub trait ProcessingEngine: Send + Sync {
    /// Transcribe inline, waiting at most `timeout` for the result.
    async fn invoke_sync(
        &self,
        request: &TranscriptionRequest,
        timeout: Duration,
    ) -> Result<SyncTranscript, EngineError>;

    /// Hand the job over; the engine reports the result to `callback_url` later.
    async fn submit_async(
        &self,
        request: &TranscriptionRequest,
        callback_url: &str,
    ) -> Result<SubmitAck, EngineError>;
}

#[async_trait]
impl<E: ProcessingEngine + ?Sized> ProcessingEngine for std::sync::Arc<E> {
    async fn invoke_sync(
        &self,
        request: &TranscriptionRequest,
        timeout: Duration,
    ) -> Result<SyncTranscript, EngineError> {
        (**self).invoke_sync(request, timeout).await
    }

    async fn submit_async(
        &self,
        request: &TranscriptionRequest,
        callback_url: &str,
    ) -> Result<SubmitAck, EngineError> {
        (**self).submit_async(request, callback_url).await
    }
}
