//! Tracing setup for the agent.
//!
//! The level reaching [`init`] comes from one of two places, see
//! [`LevelSource`]. Filter construction is split from installation so the
//! precedence rules can be tested without touching the global subscriber.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::error::AppError;

/// Where the requested level came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelSource {
    /// A `-v` flag. Beats `RUST_LOG`.
    Cli,
    /// `agent.log_level`. `RUST_LOG` overrides it when set and valid.
    Config,
}

/// Validate a level name (`off`, `error` … `trace`, any case).
pub fn parse_level(level: &str) -> Result<LevelFilter, AppError> {
    let trimmed = level.trim();
    if trimmed.is_empty() {
        return Err(AppError::Logger("log level must not be empty".into()));
    }
    trimmed
        .parse::<LevelFilter>()
        .map_err(|_| AppError::Logger(format!("unrecognised log level: '{level}'")))
}

/// Install the global subscriber, writing to stderr so console replies on
/// stdout stay clean.
pub fn init(level: &str, source: LevelSource) -> Result<(), AppError> {
    let level = parse_level(level)?;
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();

    tracing_subscriber::fmt()
        .with_env_filter(filter_for(level, source, rust_log.as_deref()))
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| AppError::Logger(format!("failed to set subscriber: {e}")))
}

/// An unparsable `RUST_LOG` is ignored rather than fatal.
fn filter_for(level: LevelFilter, source: LevelSource, rust_log: Option<&str>) -> EnvFilter {
    let from_env = match (source, rust_log.map(str::trim)) {
        (LevelSource::Config, Some(directives)) if !directives.is_empty() => EnvFilter::try_new(directives).ok(),
        _ => None,
    };
    from_env.unwrap_or_else(|| EnvFilter::builder().with_default_directive(level.into()).parse_lossy(""))
}
