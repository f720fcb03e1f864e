use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

const DEFAULT_FILTER: &str = "info,scribeflow=debug";
const QUIET_FILTER: &str = "warn,scribeflow=info";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TracingConfig {
    pub json_format: bool,
    /// Without `RUST_LOG`, verbose selects the debug filter; otherwise only warnings and
    /// scribeflow's own info records are shown.
    pub verbose: bool,
}

impl TracingConfig {
    /// `LOG_FORMAT=json` selects JSON output.
    pub fn from_env(verbose: bool) -> Self {
        let json_format = std::env::var("LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        Self {
            json_format,
            verbose,
        }
    }
}

/// Initialize the tracing subscriber. Logs go to stderr so command output stays clean.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing(config: TracingConfig) {
    let default_filter = if config.verbose {
        DEFAULT_FILTER
    } else {
        QUIET_FILTER
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let result = if config.json_format {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
            .try_init()
    };

    if result.is_ok() {
        tracing::debug!(json_format = config.json_format, "Tracing initialized");
    }
}
