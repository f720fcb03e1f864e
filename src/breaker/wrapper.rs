use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::CircuitBreaker;
use crate::engine::{EngineError, ProcessingEngine, SubmitAck, SyncTranscript, TranscriptionRequest};

/// A [`ProcessingEngine`] whose calls go through a shared [`CircuitBreaker`].
///
/// Rejected calls never reach the wrapped engine.
pub struct BreakerEngine<E> {
    inner: E,
    breaker: Arc<CircuitBreaker>,
}

impl<E: ProcessingEngine> BreakerEngine<E> {
    pub fn new(inner: E, breaker: Arc<CircuitBreaker>) -> Self {
        Self { inner, breaker }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }
}

#[async_trait]
impl<E: ProcessingEngine> ProcessingEngine for BreakerEngine<E> {
    async fn invoke_sync(
        &self,
        request: &TranscriptionRequest,
        timeout: Duration,
    ) -> Result<SyncTranscript, EngineError> {
        let permit = self.breaker.try_acquire()?;
        let result = self.inner.invoke_sync(request, timeout).await;
        permit.record_result(&result);
        result
    }

    async fn submit_async(
        &self,
        request: &TranscriptionRequest,
        callback_url: &str,
    ) -> Result<SubmitAck, EngineError> {
        let permit = self.breaker.try_acquire()?;
        let result = self.inner.submit_async(request, callback_url).await;
        permit.record_result(&result);
        result
    }
}
