//! An embedded, tuple level debugger.
//!
//! Commands arrive as text through the `DebugCommand` control call.
//! Breakpoints stop the worker (with [`PauseType::DebugPause`])
//! right before a matching tuple is handed to the operator.
//!
//! [`PauseType::DebugPause`]: crate::model::PauseType::DebugPause

use std::fmt;

use crate::errors::{WorkerError, WorkerResult};
use crate::model::tuple::Tuple;

pub mod expression;

pub use expression::{evaluate, ExpressionScope};

/// Break on every tuple, or on tuples where a field has a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    pub condition: Option<(String, String)>,
}

impl Breakpoint {
    fn matches(&self, tuple: &Tuple) -> bool {
        match &self.condition {
            None => true,
            Some((field, value)) => tuple
                .get(field)
                .map_or(false, |found| found.to_string() == *value),
        }
    }
}

impl fmt::Display for Breakpoint {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match &self.condition {
            None => fmt.write_str("every tuple"),
            Some((field, value)) => write!(fmt, "{field}={value}"),
        }
    }
}

/// A parsed debugger command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugCommand {
    Break(Breakpoint),
    Clear,
    Continue,
    Step,
    Print(String),
}

impl DebugCommand {
    pub fn parse(cmd: &str) -> WorkerResult<Self> {
        let cmd = cmd.trim();
        let (verb, rest) = match cmd.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (cmd, ""),
        };
        let invalid = |reason: &str| WorkerError::InvalidRequest {
            method: "DebugCommand".to_owned(),
            reason: format!("{reason}: {cmd:?}"),
        };
        match verb.to_lowercase().as_str() {
            "b" | "break" => {
                let condition = if rest.is_empty() {
                    None
                } else {
                    let (field, value) = rest
                        .split_once('=')
                        .ok_or_else(|| invalid("breakpoint condition must be field=value"))?;
                    Some((field.trim().to_owned(), value.trim().to_owned()))
                };
                Ok(DebugCommand::Break(Breakpoint { condition }))
            }
            "cl" | "clear" => Ok(DebugCommand::Clear),
            "c" | "continue" => Ok(DebugCommand::Continue),
            "n" | "next" | "s" | "step" => Ok(DebugCommand::Step),
            "p" | "print" if !rest.is_empty() => Ok(DebugCommand::Print(rest.to_owned())),
            "p" | "print" => Err(invalid("print needs an expression")),
            _ => Err(invalid("unknown debugger command")),
        }
    }
}

#[derive(Debug, Default)]
pub struct Debugger {
    breakpoints: Vec<Breakpoint>,
    stepping: bool,
    /// The tuple that just hit a breakpoint is let through once.
    release_next: bool,
}

impl Debugger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_breakpoint(&mut self, breakpoint: Breakpoint) {
        if !self.breakpoints.contains(&breakpoint) {
            self.breakpoints.push(breakpoint);
        }
    }

    pub fn clear(&mut self) {
        self.breakpoints.clear();
        self.stepping = false;
    }

    pub fn breakpoints(&self) -> &[Breakpoint] {
        &self.breakpoints
    }

    /// Stop again on the tuple after the current one.
    pub fn step(&mut self) {
        self.stepping = true;
    }

    /// Whether processing should stop before `tuple`.
    pub fn should_break(&mut self, tuple: &Tuple) -> bool {
        if self.release_next {
            self.release_next = false;
            return false;
        }
        let hit = self.stepping || self.breakpoints.iter().any(|bp| bp.matches(tuple));
        if hit {
            self.stepping = false;
            self.release_next = true;
        }
        hit
    }
}

#[test]
fn commands_and_aliases_parse() {
    assert_eq!(DebugCommand::parse("c").unwrap(), DebugCommand::Continue);
    assert_eq!(DebugCommand::parse(" step ").unwrap(), DebugCommand::Step);
    assert_eq!(DebugCommand::parse("cl").unwrap(), DebugCommand::Clear);
    assert_eq!(
        DebugCommand::parse("p tuple.x").unwrap(),
        DebugCommand::Print("tuple.x".to_owned())
    );
    assert_eq!(
        DebugCommand::parse("break name = ada").unwrap(),
        DebugCommand::Break(Breakpoint {
            condition: Some(("name".to_owned(), "ada".to_owned()))
        })
    );
    assert!(DebugCommand::parse("print").is_err());
    assert!(DebugCommand::parse("b nonsense").is_err());
    assert!(DebugCommand::parse("launch").is_err());
}

#[test]
fn breakpoint_stops_once_per_tuple() {
    let mut debugger = Debugger::new();
    debugger.add_breakpoint(Breakpoint {
        condition: Some(("x".to_owned(), "2".to_owned())),
    });
    let one = Tuple::new().with("x", 1);
    let two = Tuple::new().with("x", 2);
    assert!(!debugger.should_break(&one));
    assert!(debugger.should_break(&two));
    // The same tuple is offered again after continuing.
    assert!(!debugger.should_break(&two));
    assert!(!debugger.should_break(&one));
}

#[test]
fn step_stops_on_the_following_tuple() {
    let mut debugger = Debugger::new();
    let tuple = Tuple::new().with("x", 1);
    debugger.step();
    assert!(debugger.should_break(&tuple));
    assert!(!debugger.should_break(&tuple));
    debugger.step();
    assert!(debugger.should_break(&tuple));
}
