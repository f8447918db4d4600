//! The scheduler of a worker.
//!
//! Control always wins: before the next data item is touched, every
//! pending control element is handled, and while any pause reason is
//! active the loop handles nothing but control. Operator work happens
//! on the [`DataProcessor`] thread, which the loop hands the baton to
//! once per produced tuple so control can be drained in between.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::{ContextSwitch, DataProcessor};
use crate::context::Context;
use crate::errors::{WorkerError, WorkerResult};
use crate::handlers;
use crate::inputs::InputItem;
use crate::managers::ProcessingInput;
use crate::model::messages::{
    ConsoleMessageType, ControlElement, ControlPayload, ControlRequest, DataElement, DataPayload,
    EmbeddedControlMessage,
};
use crate::model::tuple::Tuple;
use crate::model::{
    ActorVirtualIdentity, ChannelIdentity, InternalMarker, PauseType, PortIdentity, WorkerState,
};
use crate::queue::InternalQueueElement;
use crate::rpc::AsyncRpcServer;

pub struct MainLoop {
    ctx: Context,
    server: AsyncRpcServer<Context>,
    switch: Arc<ContextSwitch>,
    data_processor: Option<JoinHandle<()>>,
    stopped: bool,
    closed: bool,
}

impl MainLoop {
    /// Build the loop and start its data processor thread.
    pub fn new(ctx: Context) -> WorkerResult<Self> {
        let switch = Arc::new(ContextSwitch::new());
        let data_processor = DataProcessor::new(
            ctx.worker_id.clone(),
            switch.clone(),
            ctx.executor_manager.clone(),
            ctx.tuple_processing_manager.clone(),
        );
        let handle = std::thread::Builder::new()
            .name(format!(
                "{}{}",
                ctx.config.data_processor_thread_prefix, ctx.worker_id
            ))
            .spawn(move || data_processor.run())?;
        Ok(Self {
            server: handlers::server(ctx.worker_id.clone()),
            ctx,
            switch,
            data_processor: Some(handle),
            stopped: false,
            closed: false,
        })
    }

    /// Process the input queue until a stop element arrives.
    pub fn run(mut self) {
        let span = tracing::info_span!("main_loop", worker = %self.ctx.worker_id);
        let _guard = span.enter();
        tracing::info!("main loop start");
        while !self.stopped {
            if !self.check_and_process_control() {
                break;
            }
            if let Some(item) = self.ctx.pending_inputs.pop_front() {
                self.process_item(item);
                continue;
            }
            match self.ctx.input_queue.get() {
                InternalQueueElement::Stop => self.stopped = true,
                InternalQueueElement::Control(element) => self.handle_control(element),
                InternalQueueElement::Data(element) => self.handle_data(element),
            }
        }
        self.cleanup();
        tracing::info!("main loop stop");
    }

    /// Handle control until the control lane is empty and nothing
    /// pauses the worker. Returns `false` once a stop was received.
    fn check_and_process_control(&mut self) -> bool {
        while !self.ctx.input_queue.is_control_empty() || self.ctx.pause_manager.is_paused() {
            match self.ctx.input_queue.get_control() {
                InternalQueueElement::Stop => {
                    self.stopped = true;
                    return false;
                }
                InternalQueueElement::Control(element) => self.handle_control(element),
                InternalQueueElement::Data(element) => self.ctx.input_queue.put_data(element),
            }
        }
        true
    }

    fn handle_control(&mut self, element: ControlElement) {
        let started = Instant::now();
        let from = element.tag.from;
        match element.payload {
            ControlPayload::Invocation(invocation) => {
                if let Some(reply) = self.server.receive(&mut self.ctx, &from, invocation) {
                    self.ctx.output_queue.put_control(reply);
                }
            }
            ControlPayload::Return(reply) => self.ctx.rpc_client.receive(&from, reply),
        }
        self.ctx.flush_console(false);
        self.ctx
            .statistics_manager
            .increase_control_processing_time(started.elapsed());
    }

    fn handle_data(&mut self, element: DataElement) {
        let state = self.ctx.state_manager.get_current_state();
        if state == WorkerState::Completed {
            tracing::warn!(
                "dropping {} from {} received after completion",
                element.payload.kind(),
                element.tag
            );
            return;
        }
        if state == WorkerState::Ready {
            if let Err(err) = self.ctx.state_manager.transit_to(WorkerState::Running, false) {
                self.report_error(err);
                return;
            }
            self.ctx.statistics_manager.initialize_worker_start_time();
        }
        match element.payload {
            DataPayload::Embedded(marker) => self.handle_embedded(&element.tag, marker),
            payload => match self
                .ctx
                .input_manager
                .process_data_payload(&element.tag, payload)
            {
                Ok(items) => self.ctx.pending_inputs.extend(items),
                Err(err) => self.report_error(err),
            },
        }
    }

    /// Once aligned, run the command meant for this worker and pass
    /// the message on downstream.
    fn handle_embedded(&mut self, from: &ChannelIdentity, marker: EmbeddedControlMessage) {
        let aligned =
            self.ctx
                .alignment_manager
                .is_aligned(&self.ctx.input_manager, from, &marker);
        match aligned {
            Ok(true) => {
                if let Some(invocation) = marker.command_mapping.get(&self.ctx.worker_id).cloned() {
                    let controller = ActorVirtualIdentity::controller();
                    if let Some(reply) = self.server.receive(&mut self.ctx, &controller, invocation)
                    {
                        self.ctx.output_queue.put_control(reply);
                    }
                }
                let elements = self
                    .ctx
                    .output_manager
                    .emit_marker(&DataPayload::Embedded(marker));
                self.send(elements);
            }
            Ok(false) => {}
            Err(err) => self.report_error(err),
        }
    }

    fn process_item(&mut self, item: InputItem) {
        match item {
            InputItem::Tuple(tuple) => self.process_tuple(tuple),
            InputItem::Marker(marker) => self.process_marker(marker),
        }
    }

    fn process_tuple(&mut self, tuple: Tuple) {
        if self.ctx.debugger.should_break(&tuple) {
            self.ctx.console(
                ConsoleMessageType::Debugger,
                "breakpoint",
                format!("stopped before {tuple}"),
            );
            self.ctx.flush_console(true);
            self.ctx.pending_inputs.push_front(InputItem::Tuple(tuple));
            self.ctx.pause(PauseType::DebugPause);
            return;
        }
        let port = self.ctx.current_port;
        self.ctx.statistics_manager.increase_input_tuple_count(port);
        self.run_data_processor(ProcessingInput::Tuple(tuple, port));
    }

    fn process_marker(&mut self, marker: InternalMarker) {
        match marker {
            InternalMarker::SenderChange(channel) => {
                self.ctx.current_port = self
                    .ctx
                    .input_manager
                    .get_port_id(&channel)
                    .unwrap_or_default();
            }
            InternalMarker::StartOfInputPort(port_id) => {
                tracing::debug!("input port {port_id} started");
            }
            InternalMarker::StartOfOutputPorts => {
                let elements = self
                    .ctx
                    .output_manager
                    .emit_marker(&DataPayload::StartOfUpstream);
                self.send(elements);
            }
            InternalMarker::EndOfInputPort(port_id) => {
                // A failed finish is reported once a retry gets through.
                if self.run_data_processor(ProcessingInput::Finish(port_id)) {
                    self.ctx.notify_controller(ControlRequest::PortCompleted {
                        port_id,
                        input: true,
                    });
                }
            }
            InternalMarker::EndOfOutputPorts => {
                let elements = self
                    .ctx
                    .output_manager
                    .emit_marker(&DataPayload::EndOfUpstream);
                self.send(elements);
                let ports: Vec<PortIdentity> =
                    self.ctx.output_manager.port_ids().copied().collect();
                for port_id in ports {
                    self.ctx.notify_controller(ControlRequest::PortCompleted {
                        port_id,
                        input: false,
                    });
                }
                self.complete();
            }
        }
    }

    /// Drive the data processor through one input, forwarding every
    /// tuple it produces and draining control between hand-offs.
    /// Returns whether the input was processed without a failure.
    fn run_data_processor(&mut self, input: ProcessingInput) -> bool {
        self.ctx.tuple_processing().set_input(input);
        let mut busy = Duration::ZERO;
        let mut failed = false;
        let mut succeeded = false;
        loop {
            let started = Instant::now();
            if !self.switch.switch_to_data_processor() {
                break;
            }
            busy += started.elapsed();

            let (output, exception, finished) = {
                let mut tuple_processing = self.ctx.tuple_processing();
                (
                    tuple_processing.take_output(),
                    tuple_processing.take_exception(),
                    tuple_processing.is_current_finished(),
                )
            };
            if let Some(tuple) = output {
                self.ctx
                    .statistics_manager
                    .increase_output_tuple_count(PortIdentity::default());
                let elements = self.ctx.output_manager.emit(tuple);
                self.send(elements);
            }
            if let Some(exception) = exception {
                tracing::error!("operator failed: {}", exception.message);
                failed = true;
                self.ctx.pause(PauseType::ExceptionPause);
                self.ctx
                    .console(ConsoleMessageType::Error, exception.message, exception.details);
                self.ctx.flush_console(true);
            }
            self.drain_prints();
            if finished {
                succeeded = !failed;
                break;
            }
            if !self.check_and_process_control() {
                break;
            }
        }
        self.ctx
            .statistics_manager
            .increase_data_processing_time(busy);
        succeeded
    }

    fn drain_prints(&mut self) {
        let prints = self.ctx.executor().ctx.take_prints();
        for print in prints {
            self.ctx.console(ConsoleMessageType::Print, "", print);
        }
        self.ctx.flush_console(false);
    }

    fn send(&self, elements: Vec<DataElement>) {
        for element in elements {
            self.ctx.output_queue.put_data(element);
        }
    }

    fn complete(&mut self) {
        self.ctx.flush_console(true);
        let closed = self.ctx.executor().close();
        if let Err(err) = closed {
            self.report_error(err);
        }
        self.closed = true;
        if let Err(err) = self.ctx.state_manager.transit_to(WorkerState::Completed, false) {
            self.report_error(err);
        }
        self.ctx.statistics_manager.update_total_execution_time();
        self.ctx
            .notify_controller(ControlRequest::WorkerExecutionCompleted);
        tracing::info!("{} completed", self.ctx.worker_id);
    }

    /// Errors the loop can not attribute to a caller go to the log and
    /// the user's console.
    fn report_error(&mut self, err: WorkerError) {
        tracing::error!("{}: {err}", self.ctx.worker_id);
        self.ctx
            .console(ConsoleMessageType::Error, "worker error", err.to_string());
        self.ctx.flush_console(true);
    }

    fn cleanup(&mut self) {
        self.ctx.flush_console(true);
        if !self.closed {
            let close = {
                let mut executor = self.ctx.executor();
                executor.is_initialized().then(|| executor.close())
            };
            if let Some(Err(err)) = close {
                tracing::warn!("{} failed to close operator: {err}", self.ctx.worker_id);
            }
            self.closed = true;
        }
        self.switch.shutdown();
        if let Some(handle) = self.data_processor.take() {
            if handle.join().is_err() {
                tracing::error!("data processor of {} panicked", self.ctx.worker_id);
            }
        }
    }
}
