//! Interface de linha de comando do scribeflow baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (submit, status, transcript,
//! callback, estimate, demo) e flags globais (--config, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::dispatch::DispatchOverride;

/// scribeflow: orquestração de jobs de transcrição com despacho síncrono ou assíncrono.
#[derive(Debug, Parser)]
#[command(name = "scribeflow", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho do arquivo de configuração.
    #[arg(long, short, global = true, default_value = crate::config::DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

/// Modo de despacho aceito pela CLI, mapeado para [`DispatchOverride`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Decide pelo limiar de duração estimada.
    #[default]
    Auto,
    /// Força o processamento síncrono.
    Sync,
    /// Força o processamento assíncrono com callback.
    Async,
}

impl From<ModeArg> for DispatchOverride {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Auto => DispatchOverride::Auto,
            ModeArg::Sync => DispatchOverride::ForceSync,
            ModeArg::Async => DispatchOverride::ForceAsync,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Envia um arquivo de áudio para transcrição.
    Submit {
        /// Arquivo de áudio local.
        file: PathBuf,

        #[arg(long, value_enum, default_value_t = ModeArg::Auto)]
        mode: ModeArg,

        /// Código de idioma (ex.: `pt`, `en`).
        #[arg(long)]
        language: Option<String>,

        /// Modelo de transcrição.
        #[arg(long)]
        model: Option<String>,

        /// Habilita a separação de locutores.
        #[arg(long, default_value_t = false)]
        diarize: bool,
    },

    /// Mostra o estado de um job.
    Status {
        job_id: String,
    },

    /// Imprime a transcrição de um job concluído.
    Transcript {
        job_id: String,
    },

    /// Aplica um callback do motor a partir de um arquivo JSON.
    Callback {
        job_id: String,

        /// Arquivo JSON com o corpo do callback.
        #[arg(long)]
        payload: PathBuf,
    },

    /// Calcula a duração estimada e a decisão de despacho sem criar job.
    Estimate {
        file: PathBuf,

        #[arg(long, value_enum, default_value_t = ModeArg::Auto)]
        mode: ModeArg,
    },

    /// Executa a demonstração embutida com um motor simulado.
    Demo,
}
