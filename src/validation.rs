use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dispatch::mime_from_filename;

pub const SUPPORTED_CONTENT_TYPES: &[&str] = &[
    "audio/wav",
    "audio/wave",
    "audio/x-wav",
    "audio/mpeg",
    "audio/mp3",
    "audio/mp4",
    "audio/m4a",
    "audio/x-m4a",
    "audio/flac",
    "audio/x-flac",
    "audio/ogg",
];

pub const SUPPORTED_EXTENSIONS: &[&str] = &["wav", "mp3", "m4a", "flac", "ogg"];

pub const SUPPORTED_LANGUAGES: &[&str] = &[
    "auto", "en", "es", "fr", "de", "it", "pt", "ja", "ko", "zh", "nl", "ru", "ar", "hi",
];

pub const SUPPORTED_MODELS: &[&str] = &[
    "tiny", "base", "small", "medium", "large", "large-v2", "large-v3",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("file is empty")]
    EmptyFile,

    #[error("file is too large: {size} bytes (max {max})")]
    TooLarge { size: u64, max: u64 },

    #[error("file is too small to contain audio: {size} bytes (min {min})")]
    TooSmall { size: u64, min: u64 },

    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("file extension does not match a supported audio format: {0}")]
    ExtensionMismatch(String),

    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("unsupported model: {0}")]
    UnsupportedModel(String),

    #[error("storage reference is missing")]
    MissingStorageRef,
}

/// Limits applied to uploads before a job is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadValidator {
    pub max_file_size_bytes: u64,
    pub min_file_size_bytes: u64,
}

impl Default for UploadValidator {
    fn default() -> Self {
        Self {
            max_file_size_bytes: 100 * 1024 * 1024,
            min_file_size_bytes: 1024,
        }
    }
}

impl UploadValidator {
    /// Check size bounds, MIME type and filename extension.
    ///
    /// Returns the effective content type: the declared one, or the one implied by the
    /// filename when none was declared.
    pub fn validate_file(
        &self,
        file_size_bytes: u64,
        content_type: Option<&str>,
        filename: Option<&str>,
    ) -> Result<String, ValidationError> {
        if file_size_bytes == 0 {
            return Err(ValidationError::EmptyFile);
        }
        if file_size_bytes > self.max_file_size_bytes {
            return Err(ValidationError::TooLarge {
                size: file_size_bytes,
                max: self.max_file_size_bytes,
            });
        }
        if file_size_bytes < self.min_file_size_bytes {
            return Err(ValidationError::TooSmall {
                size: file_size_bytes,
                min: self.min_file_size_bytes,
            });
        }

        let declared = content_type
            .map(|ct| ct.split(';').next().unwrap_or_default().trim().to_ascii_lowercase())
            .filter(|ct| !ct.is_empty());
        let mime = match declared {
            Some(mime) => mime,
            None => filename
                .and_then(mime_from_filename)
                .map(str::to_string)
                .ok_or_else(|| ValidationError::UnsupportedFormat("unknown".into()))?,
        };
        if !SUPPORTED_CONTENT_TYPES.contains(&mime.as_str()) {
            return Err(ValidationError::UnsupportedFormat(mime));
        }

        if let Some(name) = filename.filter(|n| !n.trim().is_empty()) {
            let ext = name
                .rsplit_once('.')
                .map(|(_, ext)| ext.to_ascii_lowercase())
                .unwrap_or_default();
            if !SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
                return Err(ValidationError::ExtensionMismatch(name.to_string()));
            }
        }

        Ok(mime)
    }

    /// `None` or blank means "detect automatically".
    pub fn validate_language(&self, language: Option<&str>) -> Result<(), ValidationError> {
        match language.map(str::trim).filter(|l| !l.is_empty()) {
            Some(lang) if !SUPPORTED_LANGUAGES.contains(&lang.to_ascii_lowercase().as_str()) => {
                Err(ValidationError::UnsupportedLanguage(lang.to_string()))
            }
            _ => Ok(()),
        }
    }

    /// `None` or blank means "use the engine's default model".
    pub fn validate_model(&self, model: Option<&str>) -> Result<(), ValidationError> {
        match model.map(str::trim).filter(|m| !m.is_empty()) {
            Some(m) if !SUPPORTED_MODELS.contains(&m.to_ascii_lowercase().as_str()) => {
                Err(ValidationError::UnsupportedModel(m.to_string()))
            }
            _ => Ok(()),
        }
    }
}
