use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};

use super::ProcessingEngine;
use super::error::EngineError;
use super::types::{ResultBody, SubmitAck, SubmitBody, SyncTranscript, TranscriptionRequest};

const SUBMIT_PATH: &str = "/transcribe";
const SYNC_PATH: &str = "/transcribe-sync";
const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP adapter for the transcription engine.
pub struct HttpProcessingEngine {
    client: Client,
    base_url: String,
    submit_timeout: Duration,
}

impl HttpProcessingEngine {
    /// Create a client for the engine at `base_url`.
    pub fn with_base_url(base_url: String, connect_timeout: Duration) -> Result<Self, EngineError> {
        let client = Client::builder().connect_timeout(connect_timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            submit_timeout: DEFAULT_SUBMIT_TIMEOUT,
        })
    }

    /// Bound for the asynchronous hand-over request (not for the transcription itself).
    pub fn with_submit_timeout(mut self, submit_timeout: Duration) -> Self {
        self.submit_timeout = submit_timeout;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Map non-2xx responses onto `EngineError`.
    async fn check_status(response: Response) -> Result<Response, EngineError> {
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs.saturating_mul(1000))
                .unwrap_or(1000);
            return Err(EngineError::RateLimited {
                retry_after_ms: retry_after,
            });
        }

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(EngineError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }

    fn map_transport(err: reqwest::Error, timeout: Option<Duration>) -> EngineError {
        match timeout {
            Some(limit) if err.is_timeout() => EngineError::Timeout(limit),
            _ => EngineError::Network(err),
        }
    }
}

#[async_trait]
impl ProcessingEngine for HttpProcessingEngine {
    async fn invoke_sync(
        &self,
        request: &TranscriptionRequest,
        timeout: Duration,
    ) -> Result<SyncTranscript, EngineError> {
        tracing::debug!(job_id = %request.job_id, ?timeout, "Calling engine synchronously");
        let response = self
            .client
            .post(self.url(SYNC_PATH))
            .timeout(timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| Self::map_transport(e, Some(timeout)))?;

        let response = Self::check_status(response).await?;
        let body = response
            .json::<ResultBody>()
            .await
            .map_err(|e| Self::map_transport(e, Some(timeout)))?;
        SyncTranscript::try_from(body)
    }

    async fn submit_async(
        &self,
        request: &TranscriptionRequest,
        callback_url: &str,
    ) -> Result<SubmitAck, EngineError> {
        tracing::debug!(job_id = %request.job_id, callback_url, "Submitting job to engine");
        let body = SubmitBody {
            request,
            callback_url,
        };
        let response = self
            .client
            .post(self.url(SUBMIT_PATH))
            .timeout(self.submit_timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::map_transport(e, Some(self.submit_timeout)))?;

        let response = Self::check_status(response).await?;
        // The engine may answer with an empty or non-JSON body; the 2xx is what counts.
        let text = response.text().await.unwrap_or_default();
        Ok(serde_json::from_str::<SubmitAck>(&text).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::JobId;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> TranscriptionRequest {
        TranscriptionRequest {
            job_id: JobId::new(),
            audio_url: "s3://bucket/clip.mp3".into(),
            enable_diarization: false,
            enable_alignment: true,
            model: None,
            language: None,
        }
    }

    async fn engine_for(server: &MockServer) -> HttpProcessingEngine {
        HttpProcessingEngine::with_base_url(format!("{}/", server.uri()), Duration::from_secs(2))
            .unwrap()
    }

    #[tokio::test]
    async fn sync_call_returns_transcript() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transcribe-sync"))
            .and(body_partial_json(serde_json::json!({"enable_alignment": true})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "completed",
                "transcript_text": "good morning",
                "processing_duration_ms": 1200
            })))
            .expect(1)
            .mount(&server)
            .await;

        let engine = engine_for(&server).await;
        let result = engine
            .invoke_sync(&request(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(result.transcript, "good morning");
        assert_eq!(result.result.unwrap().processing_duration_ms, Some(1200));
    }

    #[tokio::test]
    async fn sync_call_maps_engine_reported_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transcribe-sync"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "failed",
                "error_message": "no audio stream"
            })))
            .mount(&server)
            .await;

        let engine = engine_for(&server).await;
        let err = engine
            .invoke_sync(&request(), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Reported(ref m) if m == "no audio stream"));
    }

    #[tokio::test]
    async fn sync_call_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transcribe-sync"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"status": "completed", "transcript_text": "late"}))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let engine = engine_for(&server).await;
        let err = engine
            .invoke_sync(&request(), Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Timeout(d) if d == Duration::from_millis(200)));
    }

    #[tokio::test]
    async fn submit_sends_callback_url_and_accepts_empty_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transcribe"))
            .and(body_partial_json(serde_json::json!({
                "callback_url": "http://api/internal/v1/transcriptions/1/callback"
            })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let engine = engine_for(&server).await;
        let ack = engine
            .submit_async(&request(), "http://api/internal/v1/transcriptions/1/callback")
            .await
            .unwrap();
        assert_eq!(ack, SubmitAck::default());
    }

    #[tokio::test]
    async fn submit_parses_ack_body_when_present() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transcribe"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "engine_job_id": "w-17",
                "status": "queued"
            })))
            .mount(&server)
            .await;

        let engine = engine_for(&server).await;
        let ack = engine.submit_async(&request(), "http://cb").await.unwrap();
        assert_eq!(ack.engine_job_id.as_deref(), Some("w-17"));
        assert_eq!(ack.status.as_deref(), Some("queued"));
    }

    #[tokio::test]
    async fn rate_limit_reads_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transcribe"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;

        let engine = engine_for(&server).await;
        let err = engine.submit_async(&request(), "http://cb").await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::RateLimited {
                retry_after_ms: 7000
            }
        ));
    }

    #[tokio::test]
    async fn slow_submission_hits_the_submit_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transcribe"))
            .respond_with(ResponseTemplate::new(202).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let engine = engine_for(&server)
            .await
            .with_submit_timeout(Duration::from_millis(100));
        let err = engine.submit_async(&request(), "http://cb").await.unwrap_err();
        assert!(matches!(err, EngineError::Timeout(limit) if limit == Duration::from_millis(100)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn oversized_retry_after_saturates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transcribe"))
            .respond_with(
                ResponseTemplate::new(429).insert_header("retry-after", u64::MAX.to_string().as_str()),
            )
            .mount(&server)
            .await;

        let engine = engine_for(&server).await;
        let err = engine.submit_async(&request(), "http://cb").await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::RateLimited {
                retry_after_ms: u64::MAX
            }
        ));
    }

    #[tokio::test]
    async fn server_error_carries_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transcribe"))
            .respond_with(ResponseTemplate::new(503).set_body_string("warming up"))
            .mount(&server)
            .await;

        let engine = engine_for(&server).await;
        let err = engine.submit_async(&request(), "http://cb").await.unwrap_err();
        match err {
            EngineError::Api { status, message } => {
                assert_eq!(status, 503);
                assert_eq!(message, "warming up");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_engine_is_a_network_error() {
        let engine = HttpProcessingEngine::with_base_url(
            "http://127.0.0.1:9".to_string(),
            Duration::from_millis(500),
        )
        .unwrap();
        let err = engine.submit_async(&request(), "http://cb").await.unwrap_err();
        assert!(matches!(err, EngineError::Network(_)));
        assert!(err.is_dependency_failure());
    }
}
