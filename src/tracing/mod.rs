//! Internal code for logging.
//!
//! Logging to stdout is always enabled, at least at the "ERROR"
//! level. Everything is emitted through the [`tracing`] macros; this
//! module only installs the global subscriber.

use tracing::{level_filters::LevelFilter, Subscriber};
use tracing_subscriber::{filter::Targets, layer::SubscriberExt, EnvFilter, Layer, Registry};

use crate::errors::{WorkerError, WorkerResult};

/// Env var holding a full filter directive, e.g.
/// `dataflow_worker=debug`. Takes precedence over the configured
/// level.
pub const LOG_FILTER_VAR: &str = "WORKER_LOG";

/// Target every log line of this crate is recorded under.
pub const LOG_TARGET: &str = "dataflow_worker";

pub(crate) fn get_log_level(level: Option<&str>) -> WorkerResult<LevelFilter> {
    if let Some(level) = level {
        match level.to_lowercase().as_str() {
            "trace" => Ok(LevelFilter::TRACE),
            "debug" => Ok(LevelFilter::DEBUG),
            "info" => Ok(LevelFilter::INFO),
            "warn" => Ok(LevelFilter::WARN),
            "error" => Ok(LevelFilter::ERROR),
            level => Err(WorkerError::Config(format!("wrong log level: {level}"))),
        }
    } else {
        Ok(LevelFilter::ERROR)
    }
}

/// Install the global log subscriber.
///
/// Calling this more than once only logs a warning.
pub fn setup(log_level: Option<&str>) -> WorkerResult<()> {
    let log_level = get_log_level(log_level)?;

    let logs = tracing_subscriber::fmt::Layer::default()
        .compact()
        // Show source file
        .with_file(true)
        // Display source code line numbers
        .with_line_number(true)
        // Display the thread ID an event was recorded on
        .with_thread_ids(true)
        .with_thread_names(true);

    match std::env::var(LOG_FILTER_VAR) {
        Ok(directive) => {
            let filter = EnvFilter::try_new(&directive).map_err(|err| {
                WorkerError::Config(format!("bad {LOG_FILTER_VAR}={directive:?}: {err}"))
            })?;
            set_global_subscriber(Registry::default().with(logs.with_filter(filter)));
        }
        Err(_) => {
            let filter = Targets::new().with_target(LOG_TARGET, log_level);
            set_global_subscriber(Registry::default().with(logs.with_filter(filter)));
        }
    }
    Ok(())
}

// Utility function used to try to set a global default subscriber,
// logging the error without panicking if it was already set
fn set_global_subscriber<S>(subscriber: S)
where
    S: Subscriber + Send + Sync + 'static,
{
    // This can fail if logging was already initialized, which happens
    // when several workers share a process.
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        tracing::warn!("{err}");
    }
}

#[test]
fn log_levels_parse() {
    assert_eq!(get_log_level(None).unwrap(), LevelFilter::ERROR);
    assert_eq!(get_log_level(Some("DEBUG")).unwrap(), LevelFilter::DEBUG);
    assert!(matches!(
        get_log_level(Some("loud")),
        Err(WorkerError::Config(_))
    ));
}
