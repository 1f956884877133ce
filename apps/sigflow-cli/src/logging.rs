//! Tracing subscriber setup.
//!
//! `RUST_LOG` takes precedence over the default filter. `SIGFLOW_LOG_FORMAT`
//! selects `json` (one object per line, for log shipping) or `pretty`.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Output format of the log layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

impl LogFormat {
    /// Parses `SIGFLOW_LOG_FORMAT`; anything unrecognised falls back to pretty.
    pub fn from_env_str(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Initialize the global subscriber. Logs go to stderr so command output on
/// stdout stays machine-readable.
pub fn init_logging(filter: &str, format: LogFormat) -> anyhow::Result<()> {
    let filter_layer = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(filter))?;

    let registry = tracing_subscriber::registry().with(filter_layer);
    match format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true)
                    .flatten_event(true),
            )
            .try_init()?,
        LogFormat::Pretty => registry
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .try_init()?,
    }

    tracing::debug!(filter = %filter, ?format, "Logging initialized");
    Ok(())
}
