//! Configuração do scribeflow carregada a partir de `scribeflow.toml`.
//!
//! A struct [`ScribeConfig`] contém todos os parâmetros configuráveis: limiar de despacho,
//! timeout síncrono, política de fallback, limites de upload, motor, circuit breaker,
//! retentativas e armazenamento. Valores não presentes no arquivo usam defaults sensíveis.
//! As variáveis de ambiente `SCRIBEFLOW_ENGINE_URL` e `SCRIBEFLOW_CALLBACK_URL` têm
//! precedência sobre o arquivo.

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::breaker::CircuitBreakerConfig;
use crate::retry::RetryPolicy;
use crate::validation::UploadValidator;

pub const DEFAULT_CONFIG_FILE: &str = "scribeflow.toml";
pub const ENGINE_URL_ENV: &str = "SCRIBEFLOW_ENGINE_URL";
pub const CALLBACK_URL_ENV: &str = "SCRIBEFLOW_CALLBACK_URL";

/// O que fazer com uma requisição síncrona quando o circuit breaker está aberto.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncFallback {
    /// Falha imediata com `ServiceUnavailable`.
    #[default]
    Reject,
    /// Mantém o job pendente e o despacha de forma assíncrona quando o motor voltar.
    DegradeToAsync,
}

/// Configuração de nível superior carregada de `scribeflow.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScribeConfig {
    /// Duração estimada (segundos) abaixo da qual o job é processado de forma síncrona.
    #[serde(default = "default_sync_threshold_seconds")]
    pub sync_threshold_seconds: f64,

    /// Espera máxima (segundos) por uma transcrição síncrona.
    #[serde(default = "default_sync_timeout_seconds")]
    pub sync_timeout_seconds: u64,

    #[serde(default)]
    pub sync_fallback: SyncFallback,

    #[serde(default)]
    pub upload: UploadValidator,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub storage: StorageConfig,
}

/// Endereços e timeouts do motor de transcrição.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub base_url: String,
    /// Base pública deste serviço, usada para montar o endereço de callback.
    pub callback_base_url: String,
    pub connect_timeout_seconds: u64,
    /// Limite da requisição de entrega assíncrona (não da transcrição).
    pub submit_timeout_seconds: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            callback_base_url: "http://localhost:8080".to_string(),
            connect_timeout_seconds: 10,
            submit_timeout_seconds: 30,
        }
    }
}

impl EngineConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    pub fn submit_timeout(&self) -> Duration {
        Duration::from_secs(self.submit_timeout_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Diretório raiz para áudio e jobs persistidos.
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./data"),
        }
    }
}

impl StorageConfig {
    pub fn jobs_dir(&self) -> PathBuf {
        self.root.join("jobs")
    }

    pub fn audio_dir(&self) -> PathBuf {
        self.root.join("audio")
    }
}

// Valor padrão para o limiar síncrono: 60 segundos.
fn default_sync_threshold_seconds() -> f64 {
    60.0
}

// Valor padrão para o timeout síncrono: 120 segundos.
fn default_sync_timeout_seconds() -> u64 {
    120
}

impl Default for ScribeConfig {
    fn default() -> Self {
        Self {
            sync_threshold_seconds: default_sync_threshold_seconds(),
            sync_timeout_seconds: default_sync_timeout_seconds(),
            sync_fallback: SyncFallback::default(),
            upload: UploadValidator::default(),
            engine: EngineConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            retry: RetryPolicy::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl ScribeConfig {
    /// Carrega a configuração de `path`.
    /// Usa valores padrão se o arquivo não existir; variáveis de ambiente vêm por último.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<ScribeConfig>(&contents)?
        } else {
            Self::default()
        };

        config.apply_overrides(
            std::env::var(ENGINE_URL_ENV).ok(),
            std::env::var(CALLBACK_URL_ENV).ok(),
        );
        config.validate()?;
        Ok(config)
    }

    /// Substitui os endereços do motor e de callback quando informados e não vazios.
    pub fn apply_overrides(&mut self, engine_url: Option<String>, callback_url: Option<String>) {
        if let Some(url) = engine_url
            && !url.trim().is_empty()
        {
            self.engine.base_url = url;
        }
        if let Some(url) = callback_url
            && !url.trim().is_empty()
        {
            self.engine.callback_base_url = url;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.sync_threshold_seconds > 0.0) {
            bail!("sync_threshold_seconds must be positive");
        }
        if self.sync_timeout_seconds == 0 {
            bail!("sync_timeout_seconds must be at least 1");
        }
        if self.engine.submit_timeout_seconds == 0 {
            bail!("engine.submit_timeout_seconds must be at least 1");
        }
        if self.upload.min_file_size_bytes > self.upload.max_file_size_bytes {
            bail!("upload.min_file_size_bytes exceeds upload.max_file_size_bytes");
        }

        let cb = &self.circuit_breaker;
        for (name, value) in [
            ("failure_rate_threshold", cb.failure_rate_threshold),
            ("slow_call_rate_threshold", cb.slow_call_rate_threshold),
        ] {
            if !(value > 0.0 && value <= 100.0) {
                bail!("circuit_breaker.{name} must be within (0, 100], got {value}");
            }
        }
        if cb.sliding_window_size == 0 {
            bail!("circuit_breaker.sliding_window_size must be at least 1");
        }
        if cb.min_calls > cb.sliding_window_size {
            bail!(
                "circuit_breaker.min_calls ({}) exceeds sliding_window_size ({})",
                cb.min_calls,
                cb.sliding_window_size
            );
        }
        if cb.half_open_trial_calls == 0 {
            bail!("circuit_breaker.half_open_trial_calls must be at least 1");
        }

        if self.retry.max_attempts == 0 {
            bail!("retry.max_attempts must be at least 1");
        }
        if !(self.retry.backoff_multiplier >= 1.0) {
            bail!("retry.backoff_multiplier must be >= 1.0");
        }
        Ok(())
    }

    pub fn sync_timeout(&self) -> Duration {
        Duration::from_secs(self.sync_timeout_seconds)
    }
}
