//! Tipos de dados trocados com o motor de transcrição externo.
//!
//! As structs derivam `Serialize` e `Deserialize` para conversão JSON
//! conforme o protocolo dos endpoints `/transcribe` e `/transcribe-sync`,
//! e o corpo dos callbacks enviados de volta pelo motor.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::error::EngineError;
use crate::state_machine::{Job, JobId, Segment, SpeakerSegment, TranscriptResult};

/// Corpo comum das requisições de transcrição (síncrona e assíncrona).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionRequest {
    pub job_id: JobId,
    /// Referência opaca para o áudio no armazenamento de objetos.
    pub audio_url: String,
    pub enable_diarization: bool,
    pub enable_alignment: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl TranscriptionRequest {
    /// Build the engine request for a stored job. Alignment is always requested.
    pub fn for_job(job: &Job) -> Self {
        Self {
            job_id: job.id,
            audio_url: job.storage_ref.to_string(),
            enable_diarization: job.diarize,
            enable_alignment: true,
            model: job.model.clone(),
            language: job.language.clone(),
        }
    }
}

/// Corpo do `POST /transcribe`: a requisição mais o endereço de callback.
#[derive(Debug, Serialize)]
pub struct SubmitBody<'a> {
    #[serde(flatten)]
    pub request: &'a TranscriptionRequest,
    pub callback_url: &'a str,
}

/// Status informado pelo motor, tanto na resposta síncrona quanto no callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportedStatus {
    #[serde(alias = "success", alias = "COMPLETED")]
    Completed,
    #[serde(alias = "failure", alias = "error", alias = "FAILED")]
    Failed,
    #[serde(alias = "started", alias = "PROCESSING")]
    Processing,
}

/// Resultado informado pelo motor.
///
/// Todos os campos são opcionais na desserialização; a validação de forma
/// (status obrigatório, transcrição sse sucesso, erro sse falha) fica com quem consome.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultBody {
    #[serde(default)]
    pub status: Option<ReportedStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub segments: Vec<Segment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub speaker_segments: Vec<SpeakerSegment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_duration_s: Option<f64>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ResultBody {
    pub fn completed(transcript: impl Into<String>) -> Self {
        Self {
            status: Some(ReportedStatus::Completed),
            transcript_text: Some(transcript.into()),
            ..Self::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(ReportedStatus::Failed),
            error_message: Some(error.into()),
            ..Self::default()
        }
    }

    /// Structured part of the result, `None` when the engine sent nothing beyond text.
    pub fn transcript_result(&self) -> Option<TranscriptResult> {
        let result = TranscriptResult {
            segments: self.segments.clone(),
            speakers: self.speaker_segments.clone(),
            language: self.language.clone(),
            processing_duration_ms: self.processing_duration_ms,
            audio_duration_s: self.audio_duration_s,
        };
        if result.is_empty()
            && result.language.is_none()
            && result.processing_duration_ms.is_none()
            && result.audio_duration_s.is_none()
        {
            None
        } else {
            Some(result)
        }
    }
}

/// Successful inline transcription.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncTranscript {
    pub transcript: String,
    pub result: Option<TranscriptResult>,
}

impl TryFrom<ResultBody> for SyncTranscript {
    type Error = EngineError;

    fn try_from(body: ResultBody) -> Result<Self, Self::Error> {
        match body.status {
            Some(ReportedStatus::Completed) => {
                let result = body.transcript_result();
                let transcript = body.transcript_text.ok_or_else(|| {
                    EngineError::Malformed("completed result without transcript_text".into())
                })?;
                Ok(Self { transcript, result })
            }
            Some(ReportedStatus::Failed) => Err(EngineError::Reported(
                body.error_message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| "engine reported failure without details".into()),
            )),
            Some(ReportedStatus::Processing) => Err(EngineError::Malformed(
                "synchronous call returned a non-terminal status".into(),
            )),
            None => Err(EngineError::Malformed("result without status".into())),
        }
    }
}

/// Resposta do `POST /transcribe`. O corpo é opcional; apenas o status HTTP decide.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmitAck {
    #[serde(default)]
    pub engine_job_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageRef;

    #[test]
    fn submit_body_flattens_request_and_adds_callback() {
        let job_id = JobId::new();
        let request = TranscriptionRequest {
            job_id,
            audio_url: "s3://audio/a.wav".into(),
            enable_diarization: true,
            enable_alignment: true,
            model: None,
            language: Some("en".into()),
        };
        let body = SubmitBody {
            request: &request,
            callback_url: "http://api:8080/internal/v1/transcriptions/x/callback",
        };
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["job_id"], job_id.to_string());
        assert_eq!(json["audio_url"], "s3://audio/a.wav");
        assert_eq!(json["enable_diarization"], true);
        assert_eq!(json["language"], "en");
        assert!(json.get("model").is_none());
        assert!(json["callback_url"].as_str().unwrap().ends_with("/callback"));
    }

    #[test]
    fn request_for_job_copies_options() {
        let mut job = Job::new(
            "a.m4a".into(),
            StorageRef::new("s3://bucket/a.m4a"),
            1_000,
            10.0,
        );
        job.diarize = true;
        job.model = Some("small".into());

        let request = TranscriptionRequest::for_job(&job);
        assert_eq!(request.job_id, job.id);
        assert_eq!(request.audio_url, "s3://bucket/a.m4a");
        assert!(request.enable_diarization);
        assert!(request.enable_alignment);
        assert_eq!(request.model.as_deref(), Some("small"));
    }

    #[test]
    fn result_body_deserializes_engine_format() {
        let json = r#"{
            "status": "completed",
            "transcript_text": "hello there",
            "segments": [
                {"start": 0.0, "end": 1.2, "text": "hello there",
                 "words": [{"word": "hello", "start": 0.0, "end": 0.5, "score": 0.98}]}
            ],
            "speaker_segments": [{"speaker": "SPEAKER_00", "start": 0.0, "end": 1.2}],
            "processing_duration_ms": 840,
            "audio_duration_s": 1.2,
            "metadata": {"model": "base"}
        }"#;
        let body: ResultBody = serde_json::from_str(json).unwrap();
        assert_eq!(body.status, Some(ReportedStatus::Completed));

        let result = body.transcript_result().unwrap();
        assert_eq!(result.segments.len(), 1);
        assert_eq!(result.segments[0].words.len(), 1);
        assert_eq!(result.speakers[0].speaker, "SPEAKER_00");
        assert_eq!(result.processing_duration_ms, Some(840));
    }

    #[test]
    fn status_aliases_are_accepted() {
        for (raw, expected) in [
            ("\"success\"", ReportedStatus::Completed),
            ("\"COMPLETED\"", ReportedStatus::Completed),
            ("\"failure\"", ReportedStatus::Failed),
            ("\"error\"", ReportedStatus::Failed),
            ("\"processing\"", ReportedStatus::Processing),
        ] {
            let status: ReportedStatus = serde_json::from_str(raw).unwrap();
            assert_eq!(status, expected, "{raw}");
        }
        assert!(serde_json::from_str::<ReportedStatus>("\"queued\"").is_err());
    }

    #[test]
    fn plain_text_result_has_no_structured_part() {
        assert!(ResultBody::completed("hi").transcript_result().is_none());
    }

    #[test]
    fn sync_transcript_conversion() {
        let ok = SyncTranscript::try_from(ResultBody::completed("text")).unwrap();
        assert_eq!(ok.transcript, "text");

        let err = SyncTranscript::try_from(ResultBody::failed("bad audio")).unwrap_err();
        assert!(matches!(err, EngineError::Reported(ref m) if m == "bad audio"));

        let err = SyncTranscript::try_from(ResultBody::failed("  ")).unwrap_err();
        assert!(matches!(err, EngineError::Reported(ref m) if !m.trim().is_empty()));

        let missing = ResultBody {
            status: Some(ReportedStatus::Completed),
            ..ResultBody::default()
        };
        assert!(matches!(
            SyncTranscript::try_from(missing).unwrap_err(),
            EngineError::Malformed(_)
        ));
        assert!(matches!(
            SyncTranscript::try_from(ResultBody::default()).unwrap_err(),
            EngineError::Malformed(_)
        ));
    }
}
