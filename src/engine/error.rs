//! Tipos de erro para chamadas ao motor de transcrição externo.
//!
//! Define [`EngineError`] com variantes para rate limiting, erros HTTP,
//! falhas de rede, timeouts, falhas reportadas pelo próprio motor e
//! rejeições do circuit breaker. Usa `thiserror` para derivar `Display` e `Error`.

use std::time::Duration;

use thiserror::Error;

/// Erros que podem ocorrer ao chamar o motor de transcrição.
#[derive(Debug, Error)]
pub enum EngineError {
    /// O motor retornou HTTP 429.
    /// `retry_after_ms` indica quantos milissegundos esperar antes de retentar.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Qualquer outro status HTTP fora da faixa 2xx.
    #[error("engine API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Falha de rede subjacente (DNS, conexão recusada).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// O motor não respondeu dentro do prazo.
    #[error("engine call timed out after {0:?}")]
    Timeout(Duration),

    /// O motor executou e informou que a transcrição falhou.
    #[error("transcription failed: {0}")]
    Reported(String),

    /// Resposta 2xx que não segue o protocolo esperado.
    #[error("malformed engine response: {0}")]
    Malformed(String),

    /// O circuit breaker recusou a chamada; nenhuma tentativa de rede foi feita.
    #[error("circuit '{name}' is open; call not permitted")]
    CircuitOpen { name: String },

    /// O motor não pôde ser alcançado (motores sem HTTP, como o simulado).
    #[error("engine unreachable: {0}")]
    Unreachable(String),
}

impl EngineError {
    /// Whether the error says something about the dependency's health.
    ///
    /// Engine-reported transcription failures and 4xx answers come from a healthy engine
    /// and are not counted against the circuit breaker.
    pub fn is_dependency_failure(&self) -> bool {
        match self {
            EngineError::RateLimited { .. }
            | EngineError::Network(_)
            | EngineError::Timeout(_)
            | EngineError::Unreachable(_)
            | EngineError::Malformed(_) => true,
            EngineError::Api { status, .. } => *status >= 500,
            EngineError::Reported(_) | EngineError::CircuitOpen { .. } => false,
        }
    }

    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::RateLimited { .. }
            | EngineError::Network(_)
            | EngineError::Timeout(_)
            | EngineError::Unreachable(_) => true,
            EngineError::Api { status, .. } => *status >= 500,
            EngineError::Reported(_)
            | EngineError::Malformed(_)
            | EngineError::CircuitOpen { .. } => false,
        }
    }

    /// Minimum wait the engine asked for, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            EngineError::RateLimited { retry_after_ms } => {
                Some(Duration::from_millis(*retry_after_ms))
            }
            _ => None,
        }
    }
}
