//! Runs operator logic off the main loop thread.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use opentelemetry::metrics::Histogram;
use opentelemetry::KeyValue;

use super::ContextSwitch;
use crate::errors::panic_message;
use crate::managers::{ExceptionInfo, ExecutorManager, ProcessingInput, TupleProcessingManager};
use crate::model::tuple::{Schema, Tuple};
use crate::model::ActorVirtualIdentity;
use crate::operators::TupleStream;
use crate::with_timer;

/// Executes one input per turn.
///
/// For every input it pulls each output tuple from the operator on its
/// own turn, and then takes one final turn that marks the input as
/// finished. A failure ends the input early with the exception
/// recorded in the [`TupleProcessingManager`].
pub struct DataProcessor {
    worker_id: ActorVirtualIdentity,
    switch: Arc<ContextSwitch>,
    executor: Arc<Mutex<ExecutorManager>>,
    tuple_processing: Arc<Mutex<TupleProcessingManager>>,
    process_duration: Histogram<f64>,
    labels: Vec<KeyValue>,
}

impl DataProcessor {
    pub fn new(
        worker_id: ActorVirtualIdentity,
        switch: Arc<ContextSwitch>,
        executor: Arc<Mutex<ExecutorManager>>,
        tuple_processing: Arc<Mutex<TupleProcessingManager>>,
    ) -> Self {
        let meter = opentelemetry::global::meter("dataflow_worker");
        let process_duration = meter
            .f64_histogram("data_processor.process.duration")
            .with_description("time spent in operator logic per call, in seconds")
            .init();
        let labels = vec![KeyValue::new("worker", worker_id.to_string())];
        Self {
            worker_id,
            switch,
            executor,
            tuple_processing,
            process_duration,
            labels,
        }
    }

    fn tuple_processing(&self) -> MutexGuard<'_, TupleProcessingManager> {
        self.tuple_processing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Serve turns until the switch is shut down.
    pub fn run(self) {
        tracing::debug!("data processor of {} started", self.worker_id);
        if !self.switch.wait_for_turn() {
            return;
        }
        loop {
            let input = self.tuple_processing().take_input();
            if let Some(input) = input {
                if !self.process(input) {
                    return;
                }
            }
            self.tuple_processing().finish_current();
            if !self.switch.hand_back() {
                break;
            }
        }
        tracing::debug!("data processor of {} stopped", self.worker_id);
    }

    /// Pull the outputs of `input` one per turn. Returns `false` once
    /// the switch was shut down.
    fn process(&self, input: ProcessingInput) -> bool {
        let (mut outputs, schema) = match self.start(input) {
            Ok(started) => started,
            Err(exception) => {
                self.tuple_processing().set_exception(exception);
                return true;
            }
        };
        loop {
            match self.next_output(&mut outputs, schema.as_ref()) {
                Ok(Some(output)) => {
                    self.tuple_processing().set_output(output);
                    if !self.switch.hand_back() {
                        return false;
                    }
                }
                Ok(None) => return true,
                Err(exception) => {
                    self.tuple_processing().set_exception(exception);
                    return true;
                }
            }
        }
    }

    /// Hand `input` to the operator. The executor is only locked while
    /// the operator runs, never across a turn.
    fn start(
        &self,
        input: ProcessingInput,
    ) -> Result<(TupleStream, Option<Arc<Schema>>), ExceptionInfo> {
        let mut executor = self.executor.lock().unwrap_or_else(PoisonError::into_inner);
        let schema = executor.output_schema().cloned();
        let result = with_timer!(
            self.process_duration,
            self.labels,
            catch_unwind(AssertUnwindSafe(|| -> anyhow::Result<TupleStream> {
                let (operator, ctx) = executor.operator_mut()?;
                match input {
                    ProcessingInput::Tuple(tuple, port) => {
                        operator.process_tuple(tuple, port.index(), ctx)
                    }
                    ProcessingInput::Finish(port) => operator.on_finish(port.index(), ctx),
                }
            }))
        );
        drop(executor);
        Ok((user_result(result)?, schema))
    }

    /// Pull one output and cast it to the output schema.
    fn next_output(
        &self,
        outputs: &mut TupleStream,
        schema: Option<&Arc<Schema>>,
    ) -> Result<Option<Tuple>, ExceptionInfo> {
        let result = with_timer!(
            self.process_duration,
            self.labels,
            catch_unwind(AssertUnwindSafe(|| outputs.next().transpose()))
        );
        let mut output = match user_result(result)? {
            Some(output) => output,
            None => return Ok(None),
        };
        if let Some(schema) = schema {
            output.finalize(schema).map_err(|err| ExceptionInfo {
                message: err.to_string(),
                details: format!("while casting {output}"),
            })?;
        }
        Ok(Some(output))
    }
}

/// Turn whatever user logic returned or panicked with into an
/// exception.
fn user_result<T>(result: std::thread::Result<anyhow::Result<T>>) -> Result<T, ExceptionInfo> {
    match result {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(ExceptionInfo {
            message: err.to_string(),
            details: format!("{err:?}"),
        }),
        Err(payload) => Err(ExceptionInfo {
            message: panic_message(payload.as_ref()),
            details: "operator logic panicked".to_owned(),
        }),
    }
}
