use std::fmt;

use serde::{Deserialize, Serialize};

/// Lower and upper bound of a duration estimate, in seconds.
pub const MIN_ESTIMATE_SECONDS: f64 = 10.0;
pub const MAX_ESTIMATE_SECONDS: f64 = 7200.0;

/// Caller's explicit choice of dispatch mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchOverride {
    #[default]
    Auto,
    ForceSync,
    ForceAsync,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    Sync,
    Async,
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchMode::Sync => write!(f, "sync"),
            DispatchMode::Async => write!(f, "async"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispatchInput {
    pub file_size_bytes: u64,
    pub estimated_duration_seconds: f64,
    pub dispatch_override: DispatchOverride,
    pub sync_threshold_seconds: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionReason {
    Override,
    BelowThreshold,
    AtOrAboveThreshold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchDecision {
    pub mode: DispatchMode,
    pub reason: DecisionReason,
}

/// Choose sync or async.
///
/// An explicit override always wins; otherwise the job runs inline iff its estimated
/// duration is strictly below the threshold.
pub fn decide(input: &DispatchInput) -> DispatchDecision {
    match input.dispatch_override {
        DispatchOverride::ForceSync => DispatchDecision {
            mode: DispatchMode::Sync,
            reason: DecisionReason::Override,
        },
        DispatchOverride::ForceAsync => DispatchDecision {
            mode: DispatchMode::Async,
            reason: DecisionReason::Override,
        },
        DispatchOverride::Auto if input.estimated_duration_seconds < input.sync_threshold_seconds => {
            DispatchDecision {
                mode: DispatchMode::Sync,
                reason: DecisionReason::BelowThreshold,
            }
        }
        DispatchOverride::Auto => DispatchDecision {
            mode: DispatchMode::Async,
            reason: DecisionReason::AtOrAboveThreshold,
        },
    }
}

/// Typical encoded bytes per second of audio for a MIME type.
pub fn bytes_per_second(content_type: Option<&str>) -> f64 {
    let mime = content_type.map(str::to_ascii_lowercase).unwrap_or_default();
    match mime.as_str() {
        "audio/wav" | "audio/wave" | "audio/x-wav" => 176_400.0,
        "audio/flac" | "audio/x-flac" => 100_000.0,
        "audio/mp3" | "audio/mpeg" => 32_000.0,
        "audio/m4a" | "audio/mp4" | "audio/x-m4a" => 24_000.0,
        _ => 50_000.0,
    }
}

/// Estimate audio duration from its encoded size, clamped to `[10, 7200]` seconds.
pub fn estimate_duration_seconds(file_size_bytes: u64, content_type: Option<&str>) -> f64 {
    let seconds = file_size_bytes as f64 / bytes_per_second(content_type);
    seconds.clamp(MIN_ESTIMATE_SECONDS, MAX_ESTIMATE_SECONDS)
}

/// MIME type implied by a filename's extension.
pub fn mime_from_filename(filename: &str) -> Option<&'static str> {
    let (_, ext) = filename.rsplit_once('.')?;
    match ext.to_ascii_lowercase().as_str() {
        "wav" => Some("audio/wav"),
        "mp3" => Some("audio/mpeg"),
        "m4a" => Some("audio/mp4"),
        "flac" => Some("audio/flac"),
        "ogg" => Some("audio/ogg"),
        _ => None,
    }
}
