use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use uuid::Uuid;

use scribeflow::breaker::{BreakerEngine, CircuitBreaker};
use scribeflow::cli::{Cli, Command};
use scribeflow::config::ScribeConfig;
use scribeflow::dispatch::{self, DispatchInput};
use scribeflow::engine::{HttpProcessingEngine, ProcessingEngine, SimulatedBehaviour, SimulatedEngine};
use scribeflow::events::TracingEventSink;
use scribeflow::state_machine::{Job, JobId, JobStatus};
use scribeflow::storage::{LocalObjectStore, ObjectStore};
use scribeflow::store::{FileJobStore, InMemoryJobStore, JobStore};
use scribeflow::telemetry::{TracingConfig, init_tracing};
use scribeflow::ui::{self, JobProgress};
use scribeflow::{
    CallbackPayload, CreateJobRequest, CreateJobResponse, CreateOptions, JobOrchestrator,
    OrchestratorSettings,
};

const BREAKER_NAME: &str = "transcription-engine";
const DEFERRED_POLL: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(TracingConfig::from_env(cli.verbose));

    let config = ScribeConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    match cli.command {
        Command::Submit {
            file,
            mode,
            language,
            model,
            diarize,
        } => {
            let orchestrator = build_orchestrator(&config).await?;
            let filename = file_name(&file)?;
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let size = bytes.len() as u64;

            let objects = LocalObjectStore::new(config.storage.audio_dir());
            let storage_ref = objects
                .store(&format!("{}/{filename}", Uuid::new_v4()), bytes)
                .await?;

            let progress = JobProgress::start(&filename);
            let request = CreateJobRequest {
                storage_ref,
                content_type: dispatch::mime_from_filename(&filename).map(str::to_string),
                original_filename: filename,
                file_size_bytes: size,
                options: CreateOptions {
                    dispatch: mode.into(),
                    language,
                    model,
                    diarize,
                    correlation_id: None,
                },
            };
            match orchestrator.create_job(request).await {
                Ok(response) => {
                    progress.finish(&response);
                    if matches!(&response, CreateJobResponse::Accepted(ack) if ack.deferred) {
                        let job = wait_while_pending(&orchestrator, response.job_id()).await?;
                        ui::print_job(&job);
                    }
                }
                Err(err) => {
                    progress.fail(&err.to_string());
                    return Err(err.into());
                }
            }
        }
        Command::Status { job_id } => {
            let orchestrator = build_orchestrator(&config).await?;
            let job = orchestrator.get_job(parse_job_id(&job_id)?).await?;
            ui::print_job(&job);
        }
        Command::Transcript { job_id } => {
            let orchestrator = build_orchestrator(&config).await?;
            let text = orchestrator.transcript(parse_job_id(&job_id)?).await?;
            println!("{text}");
        }
        Command::Callback { job_id, payload } => {
            let orchestrator = build_orchestrator(&config).await?;
            let raw = tokio::fs::read(&payload)
                .await
                .with_context(|| format!("reading {}", payload.display()))?;
            let payload: CallbackPayload =
                serde_json::from_slice(&raw).context("parsing callback payload")?;
            let ack = orchestrator
                .handle_callback(parse_job_id(&job_id)?, payload)
                .await?;
            println!("{}", serde_json::to_string_pretty(&ack)?);
        }
        Command::Estimate { file, mode } => {
            let filename = file_name(&file)?;
            let size = tokio::fs::metadata(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?
                .len();
            let content_type = dispatch::mime_from_filename(&filename);
            let estimate = dispatch::estimate_duration_seconds(size, content_type);
            let decision = dispatch::decide(&DispatchInput {
                file_size_bytes: size,
                estimated_duration_seconds: estimate,
                dispatch_override: mode.into(),
                sync_threshold_seconds: config.sync_threshold_seconds,
            });
            println!(
                "{filename}: {size} bytes, ~{estimate:.1}s estimated, dispatch {} ({:?})",
                decision.mode, decision.reason
            );
        }
        Command::Demo => run_demo(&config).await?,
    }

    Ok(())
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .with_context(|| format!("not a file path: {}", path.display()))
}

fn parse_job_id(raw: &str) -> Result<JobId> {
    raw.parse()
        .with_context(|| format!("invalid job id '{raw}'"))
}

/// Keep the process, and with it the deferred dispatcher, alive until a deferred job
/// leaves Pending.
async fn wait_while_pending(orchestrator: &JobOrchestrator, job_id: JobId) -> Result<Job> {
    loop {
        let job = orchestrator.get_job(job_id).await?;
        if job.status != JobStatus::Pending {
            return Ok(job);
        }
        tokio::time::sleep(DEFERRED_POLL).await;
    }
}

async fn build_orchestrator(config: &ScribeConfig) -> Result<Arc<JobOrchestrator>> {
    let store: Arc<dyn JobStore> = Arc::new(FileJobStore::open(config.storage.jobs_dir()).await?);
    let breaker = Arc::new(CircuitBreaker::new(BREAKER_NAME, config.circuit_breaker.clone()));
    let http = HttpProcessingEngine::with_base_url(
        config.engine.base_url.clone(),
        config.engine.connect_timeout(),
    )?
    .with_submit_timeout(config.engine.submit_timeout());
    let engine = BreakerEngine::new(http, breaker.clone());

    Ok(JobOrchestrator::new(
        store,
        Arc::new(engine),
        breaker,
        OrchestratorSettings::from_config(config),
    )
    .with_event_sink(Arc::new(TracingEventSink))
    .with_validator(config.upload.clone())
    .start())
}

/// Walks through the dispatch paths against a simulated engine.
async fn run_demo(config: &ScribeConfig) -> Result<()> {
    let engine = Arc::new(SimulatedEngine::succeeding("olá, isto é uma demonstração"));
    let breaker = Arc::new(CircuitBreaker::new(BREAKER_NAME, config.circuit_breaker.clone()));
    let wrapped: Arc<dyn ProcessingEngine> =
        Arc::new(BreakerEngine::new(engine.clone(), breaker.clone()));
    let orchestrator = JobOrchestrator::new(
        Arc::new(InMemoryJobStore::new()),
        wrapped,
        breaker,
        OrchestratorSettings::from_config(config),
    )
    .with_event_sink(Arc::new(TracingEventSink))
    .start();

    let request = |name: &str, size: u64| CreateJobRequest {
        storage_ref: scribeflow::storage::StorageRef::new(format!("memory://demo/{name}")),
        original_filename: name.to_string(),
        content_type: dispatch::mime_from_filename(name).map(str::to_string),
        file_size_bytes: size,
        options: CreateOptions::default(),
    };

    println!("1. Short clip, transcribed inline");
    let progress = JobProgress::start("short.mp3");
    let short = orchestrator.create_job(request("short.mp3", 400_000)).await?;
    progress.finish(&short);

    println!("2. Long recording, handed to the engine with a callback");
    let progress = JobProgress::start("meeting.mp3");
    let long = orchestrator.create_job(request("meeting.mp3", 40_000_000)).await?;
    progress.finish(&long);
    let ack = orchestrator
        .handle_callback(
            long.job_id(),
            CallbackPayload::completed(long.job_id(), "transcrição da reunião"),
        )
        .await?;
    println!("   callback: {}", serde_json::to_string(&ack)?);
    let duplicate = orchestrator
        .handle_callback(
            long.job_id(),
            CallbackPayload::completed(long.job_id(), "transcrição da reunião"),
        )
        .await?;
    println!("   redelivered callback: {}", serde_json::to_string(&duplicate)?);

    println!("3. Engine outage");
    engine.set_behaviour(SimulatedBehaviour::Unavailable { status: 503 });
    for attempt in 1..=config.circuit_breaker.min_calls.max(1) {
        let name = format!("outage-{attempt}.mp3");
        let progress = JobProgress::start(&name);
        match orchestrator.create_job(request(&name, 400_000)).await {
            Ok(response) => progress.finish(&response),
            Err(err) => progress.fail(&err.to_string()),
        }
    }
    ui::print_breaker(&orchestrator.breaker_metrics());

    let progress = JobProgress::start("rejected.mp3");
    match orchestrator.create_job(request("rejected.mp3", 400_000)).await {
        Ok(response) => progress.finish(&response),
        Err(err) => progress.fail(&err.to_string()),
    }
    println!("   engine calls so far: {}", engine.total_calls());

    println!("4. Recovery");
    engine.set_behaviour(SimulatedBehaviour::Succeed {
        transcript: "de volta".into(),
    });
    orchestrator.force_breaker_half_open();
    let progress = JobProgress::start("recovered.mp3");
    let recovered = orchestrator.create_job(request("recovered.mp3", 400_000)).await?;
    progress.finish(&recovered);

    // Let deferred work, if any, settle before the runtime stops.
    tokio::time::sleep(Duration::from_millis(50)).await;
    ui::print_breaker(&orchestrator.breaker_metrics());
    Ok(())
}
