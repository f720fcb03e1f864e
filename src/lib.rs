pub mod breaker;
pub mod callback;
pub mod cli;
pub mod config;
pub mod deferred;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod events;
mod lifecycle;
pub mod orchestrator;
pub mod retry;
pub mod state_machine;
pub mod storage;
pub mod store;
pub mod telemetry;
pub mod ui;
pub mod validation;

pub use callback::{CallbackAck, CallbackHandler, CallbackPayload};
pub use config::ScribeConfig;
pub use error::{CorrelatedError, ScribeError};
pub use orchestrator::{
    AsyncAck, CreateJobRequest, CreateJobResponse, CreateOptions, JobOrchestrator,
    OrchestratorSettings, SyncResult,
};
