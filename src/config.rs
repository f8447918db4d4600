//! Worker configuration.
//!
//! A [`WorkerConfig`] is built once at startup and shared by [`Arc`]
//! with everything that needs it.
//!
//! [`Arc`]: std::sync::Arc

use std::str::FromStr;

use serde::Deserialize;

use crate::errors::{WorkerError, WorkerResult};

pub const LOG_LEVEL_VAR: &str = "WORKER_LOG_LEVEL";
pub const METRICS_PORT_VAR: &str = "WORKER_METRICS_PORT";
pub const CONSOLE_FLUSH_THRESHOLD_VAR: &str = "WORKER_CONSOLE_FLUSH_THRESHOLD";
pub const STORAGE_URI_VAR: &str = "WORKER_STORAGE_URI";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerConfig {
    /// One of `trace`, `debug`, `info`, `warn` or `error`.
    pub log_level: Option<String>,
    /// Serve Prometheus metrics on this port when set.
    pub metrics_port: Option<u16>,
    /// Buffered console messages that trigger a flush to the
    /// controller.
    pub console_flush_threshold: usize,
    /// Base URI for output ports that do not name their own storage.
    pub storage_uri: Option<String>,
    pub data_processor_thread_prefix: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            log_level: None,
            metrics_port: None,
            console_flush_threshold: 100,
            storage_uri: None,
            data_processor_thread_prefix: "data-processor-".to_owned(),
        }
    }
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> WorkerResult<T> {
    value
        .parse()
        .map_err(|_| WorkerError::Config(format!("unable to parse {name}={value:?}")))
}

impl WorkerConfig {
    /// Defaults overlaid with the `WORKER_*` environment variables.
    pub fn from_env() -> WorkerResult<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> WorkerResult<Self> {
        let mut config = Self::default();
        if let Some(level) = var(LOG_LEVEL_VAR) {
            config.log_level = Some(level);
        }
        if let Some(port) = var(METRICS_PORT_VAR) {
            config.metrics_port = Some(parse_var(METRICS_PORT_VAR, &port)?);
        }
        if let Some(threshold) = var(CONSOLE_FLUSH_THRESHOLD_VAR) {
            config.console_flush_threshold = parse_var(CONSOLE_FLUSH_THRESHOLD_VAR, &threshold)?;
        }
        if let Some(uri) = var(STORAGE_URI_VAR) {
            config.storage_uri = Some(uri);
        }
        Ok(config)
    }

    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> WorkerResult<Self> {
        serde_json::from_str(json).map_err(|err| WorkerError::Config(err.to_string()))
    }
}

#[test]
fn env_overlays_defaults() {
    let vars = |name: &str| match name {
        METRICS_PORT_VAR => Some("9100".to_owned()),
        CONSOLE_FLUSH_THRESHOLD_VAR => Some("5".to_owned()),
        _ => None,
    };
    let config = WorkerConfig::from_vars(vars).unwrap();
    assert_eq!(config.metrics_port, Some(9100));
    assert_eq!(config.console_flush_threshold, 5);
    assert_eq!(config.log_level, None);
}

#[test]
fn bad_env_value_is_a_config_error() {
    let vars = |name: &str| (name == METRICS_PORT_VAR).then(|| "not-a-port".to_owned());
    assert!(matches!(
        WorkerConfig::from_vars(vars),
        Err(WorkerError::Config(_))
    ));
}

#[test]
fn json_with_defaults() {
    let config = WorkerConfig::from_json(r#"{"storage_uri": "file:///tmp/out"}"#).unwrap();
    assert_eq!(config.storage_uri.as_deref(), Some("file:///tmp/out"));
    assert_eq!(config.console_flush_threshold, 100);
    assert!(WorkerConfig::from_json(r#"{"bogus": 1}"#).is_err());
}
