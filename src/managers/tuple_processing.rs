//! The hand-off slot between the main loop and the data processor.

use crate::model::tuple::Tuple;
use crate::model::PortIdentity;

/// What the data processor is asked to work on next.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessingInput {
    Tuple(Tuple, PortIdentity),
    /// The port will receive nothing more.
    Finish(PortIdentity),
}

/// A failure raised by operator logic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionInfo {
    pub message: String,
    pub details: String,
}

/// Only ever touched by whichever side holds the baton.
#[derive(Debug, Default)]
pub struct TupleProcessingManager {
    current_input: Option<ProcessingInput>,
    /// Last input handed to the operator, kept for retry and
    /// inspection after it was processed.
    last_input: Option<ProcessingInput>,
    current_output: Option<Tuple>,
    exception: Option<ExceptionInfo>,
    finished: bool,
}

impl TupleProcessingManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Main loop side: give the data processor its next input.
    pub fn set_input(&mut self, input: ProcessingInput) {
        self.last_input = Some(input.clone());
        self.finished = false;
        self.current_input = Some(input);
    }

    /// Data processor side: take the pending input.
    pub fn take_input(&mut self) -> Option<ProcessingInput> {
        self.current_input.take()
    }

    pub fn last_input(&self) -> Option<&ProcessingInput> {
        self.last_input.as_ref()
    }

    pub fn current_input_tuple(&self) -> Option<&Tuple> {
        match &self.last_input {
            Some(ProcessingInput::Tuple(tuple, _)) => Some(tuple),
            _ => None,
        }
    }

    pub fn current_input_port(&self) -> Option<PortIdentity> {
        match self.last_input {
            Some(ProcessingInput::Tuple(_, port)) | Some(ProcessingInput::Finish(port)) => {
                Some(port)
            }
            None => None,
        }
    }

    pub fn set_output(&mut self, output: Tuple) {
        self.current_output = Some(output);
    }

    pub fn take_output(&mut self) -> Option<Tuple> {
        self.current_output.take()
    }

    pub fn set_exception(&mut self, exception: ExceptionInfo) {
        self.exception = Some(exception);
    }

    pub fn take_exception(&mut self) -> Option<ExceptionInfo> {
        self.exception.take()
    }

    /// The data processor has nothing more to produce for the current
    /// input.
    pub fn finish_current(&mut self) {
        self.finished = true;
    }

    pub fn is_current_finished(&self) -> bool {
        self.finished
    }
}

#[test]
fn input_survives_take_for_retry() {
    let mut manager = TupleProcessingManager::new();
    let tuple = Tuple::new().with("x", 1);
    manager.set_input(ProcessingInput::Tuple(tuple.clone(), PortIdentity::new(2)));
    assert_eq!(
        manager.take_input(),
        Some(ProcessingInput::Tuple(tuple.clone(), PortIdentity::new(2)))
    );
    assert_eq!(manager.take_input(), None);
    assert_eq!(manager.current_input_tuple(), Some(&tuple));
    assert_eq!(manager.current_input_port(), Some(PortIdentity::new(2)));
    assert!(!manager.is_current_finished());
    manager.finish_current();
    assert!(manager.is_current_finished());
}

#[test]
fn finish_is_kept_for_retry() {
    let mut manager = TupleProcessingManager::new();
    manager.set_input(ProcessingInput::Tuple(Tuple::new(), PortIdentity::new(0)));
    manager.set_input(ProcessingInput::Finish(PortIdentity::new(1)));
    manager.take_input();
    assert_eq!(
        manager.last_input(),
        Some(&ProcessingInput::Finish(PortIdentity::new(1)))
    );
    assert_eq!(manager.current_input_tuple(), None);
    assert_eq!(manager.current_input_port(), Some(PortIdentity::new(1)));
}
