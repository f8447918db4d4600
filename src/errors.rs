//! Errors raised by the worker core.
//!
//! Protocol and programming errors are [`WorkerError`] values returned
//! from the offending call. Errors that have to cross the control
//! plane are converted into [`ControlError`] values with
//! [`control_error`], which records where the conversion happened.

use std::any::Any;
use std::panic::Location;

use crate::model::messages::{ControlError, ErrorLanguage};
use crate::model::{ChannelIdentity, PortIdentity};

/// Result type used across the crate.
pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(thiserror::Error, Debug)]
pub enum WorkerError {
    /// The state manager was not in the state the caller asserted.
    #[error("invalid state: expected {expected}, currently {actual}")]
    InvalidState { expected: String, actual: String },
    /// The requested transition is not in the transition graph.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
    #[error("unsupported marker alignment type {0}")]
    UnsupportedMarkerType(String),
    #[error("unsupported partitioning {0}")]
    UnsupportedPartitioning(String),
    #[error("unsupported payload {0}")]
    UnsupportedPayload(String),
    #[error("unknown port {0}")]
    UnknownPort(PortIdentity),
    #[error("unknown channel {0}")]
    UnknownChannel(ChannelIdentity),
    #[error("unknown control method {0}")]
    UnknownMethod(String),
    #[error("unknown operator {0}")]
    UnknownOperator(String),
    #[error("operator is not initialized")]
    OperatorNotInitialized,
    /// The request body did not fit the method it was sent to.
    #[error("invalid request for {method}: {reason}")]
    InvalidRequest { method: String, reason: String },
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
    #[error("unable to evaluate expression: {0}")]
    Expression(String),
    #[error("input queue is not drained: {remaining} messages remaining")]
    QueueNotDrained { remaining: usize },
    /// Anything raised by user operator logic.
    #[error("operator error: {0:#}")]
    Operator(#[from] anyhow::Error),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("metrics error: {0}")]
    Metrics(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    /// Helper for a request that does not match its handler.
    pub(crate) fn invalid_request(method: &str, reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            method: method.to_owned(),
            reason: reason.into(),
        }
    }
}

/// Convert anything displayable into a [`ControlError`] that can be
/// sent to another participant.
///
/// The caller location and the current thread name are recorded as
/// the stack trace.
#[track_caller]
pub fn control_error(err: &dyn std::fmt::Display) -> ControlError {
    let caller = Location::caller();
    ControlError {
        error_message: err.to_string(),
        error_details: String::new(),
        stack_trace: prepend_tname(prepend_caller(caller, &err.to_string())),
        language: ErrorLanguage::Rust,
    }
}

/// Try to understand a panic payload caught with
/// [`std::panic::catch_unwind`].
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(err) = payload.downcast_ref::<WorkerError>() {
        err.to_string()
    } else {
        // We could show the debug representation of the payload, but
        // it would just be `Any { .. }`.
        "unknown panic".to_owned()
    }
}

/// Prepend '({caller}) ' to the message
fn prepend_caller(caller: &Location, msg: &str) -> String {
    format!("({caller}) {msg}")
}

/// Prepend the name of the current thread to each line,
/// if present.
pub(crate) fn prepend_tname(msg: String) -> String {
    let tname = std::thread::current()
        .name()
        .unwrap_or("unnamed-thread")
        .to_string();
    msg.lines()
        .map(|line| format!("<{tname}> {line}\n"))
        .collect()
}

#[test]
fn control_error_records_location() {
    let err = WorkerError::UnknownMethod("Foo".to_owned());
    let found = control_error(&err);
    assert_eq!(found.error_message, "unknown control method Foo");
    assert_eq!(found.language, ErrorLanguage::Rust);
    assert!(found.stack_trace.contains("errors.rs"));
}

#[test]
fn panic_message_understands_strings() {
    let payload: Box<dyn Any + Send> = Box::new("boom");
    assert_eq!(panic_message(payload.as_ref()), "boom");

    let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
    assert_eq!(panic_message(payload.as_ref()), "bang");

    let payload: Box<dyn Any + Send> = Box::new(42_u8);
    assert_eq!(panic_message(payload.as_ref()), "unknown panic");
}
