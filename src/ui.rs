//! Interface de terminal do scribeflow: spinners e saída colorida.
//!
//! Usa as crates `indicatif` para spinners de progresso e `console` para
//! estilização com cores. O [`JobProgress`] acompanha visualmente
//! o envio de um job no terminal.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::breaker::{BreakerMetrics, CircuitState};
use crate::orchestrator::CreateJobResponse;
use crate::state_machine::{Job, JobStatus};

/// Indicador visual de progresso para o envio de um job no terminal.
///
/// Exibe um spinner animado enquanto o job é despachado e mensagens
/// coloridas para concluído (verde), falha (vermelho) e pendente (amarelo).
pub struct JobProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
}

impl JobProgress {
    /// Inicia o spinner com o nome do arquivo e retorna a instância de progresso.
    pub fn start(filename: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(format!("Enviando {filename}"));
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    /// Finaliza o spinner e exibe o resultado do envio.
    pub fn finish(&self, response: &CreateJobResponse) {
        self.pb.finish_and_clear();
        match response {
            CreateJobResponse::Completed(result) => {
                println!(
                    "  {} Job {} concluído",
                    self.green.apply_to("✓"),
                    result.job.id
                );
                println!("{}", result.transcript());
            }
            CreateJobResponse::Accepted(ack) if ack.status == JobStatus::Failed => {
                println!(
                    "  {} Job {} falhou: {}",
                    self.red.apply_to("✗"),
                    ack.job_id,
                    ack.error_message.as_deref().unwrap_or("erro desconhecido")
                );
            }
            CreateJobResponse::Accepted(ack) => {
                let note = if ack.deferred { " (adiado)" } else { "" };
                println!(
                    "  {} Job {} aceito{note}, acompanhe em {}",
                    self.yellow.apply_to("↻"),
                    ack.job_id,
                    ack.status_ref
                );
            }
        }
    }

    /// Finaliza o spinner com uma mensagem de erro.
    pub fn fail(&self, message: &str) {
        self.pb.finish_and_clear();
        println!("  {} {message}", self.red.apply_to("✗"));
    }
}

fn status_style(status: JobStatus) -> Style {
    match status {
        JobStatus::Completed => Style::new().green().bold(),
        JobStatus::Failed => Style::new().red().bold(),
        _ => Style::new().yellow(),
    }
}

/// Imprime o job formatado em JSON com um cabeçalho colorido pelo status.
pub fn print_job(job: &Job) {
    println!(
        "{}",
        status_style(job.status).apply_to(format!("─── Job {} ({}) ───", job.id, job.status))
    );
    println!("{}", serde_json::to_string_pretty(job).unwrap_or_default());
}

/// Imprime o estado e as métricas do circuit breaker.
pub fn print_breaker(metrics: &BreakerMetrics) {
    let style = match metrics.state {
        CircuitState::Closed => Style::new().green().bold(),
        CircuitState::Open => Style::new().red().bold(),
        CircuitState::HalfOpen => Style::new().yellow(),
    };
    println!(
        "{}",
        style.apply_to(format!("─── Circuit {} ({}) ───", metrics.name, metrics.state))
    );
    println!("{}", serde_json::to_string_pretty(metrics).unwrap_or_default());
}
