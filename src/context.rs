//! Everything one worker owns, in one place.
//!
//! The [`Context`] is owned by the main loop thread. Control handlers
//! receive it by `&mut`; the data processor only shares the executor
//! and the tuple processing slot, both behind a lock that is never
//! contended because the two sides take turns.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::WorkerConfig;
use crate::debugger::Debugger;
use crate::inputs::{InputItem, InputManager};
use crate::managers::{
    AlignmentManager, ConsoleMessageManager, ExecutorManager, PauseManager, StateManager,
    StatisticsManager, TupleProcessingManager,
};
use crate::model::messages::{ConsoleMessageType, ControlRequest};
use crate::model::{ActorVirtualIdentity, PauseType, PortIdentity, WorkerState};
use crate::operators::OperatorRegistry;
use crate::outputs::OutputManager;
use crate::queue::InternalQueue;
use crate::rpc::AsyncRpcClient;

pub struct Context {
    pub worker_id: ActorVirtualIdentity,
    pub config: Arc<WorkerConfig>,
    pub registry: Arc<OperatorRegistry>,
    pub input_queue: Arc<InternalQueue>,
    pub output_queue: Arc<InternalQueue>,
    pub pause_manager: PauseManager,
    pub state_manager: StateManager<WorkerState>,
    pub statistics_manager: StatisticsManager,
    pub console_message_manager: ConsoleMessageManager,
    pub alignment_manager: AlignmentManager,
    pub input_manager: InputManager,
    pub output_manager: OutputManager,
    pub tuple_processing_manager: Arc<Mutex<TupleProcessingManager>>,
    pub executor_manager: Arc<Mutex<ExecutorManager>>,
    pub rpc_client: AsyncRpcClient,
    pub debugger: Debugger,
    /// Port of the channel the last tuple arrived on.
    pub current_port: PortIdentity,
    /// Items already decoded from the data lane but not yet processed,
    /// in order. Retried tuples are pushed to the front.
    pub pending_inputs: VecDeque<InputItem>,
}

impl Context {
    pub fn new(
        worker_id: ActorVirtualIdentity,
        config: Arc<WorkerConfig>,
        registry: Arc<OperatorRegistry>,
        input_queue: Arc<InternalQueue>,
        output_queue: Arc<InternalQueue>,
    ) -> Self {
        let name = worker_id.to_string();
        Self {
            pause_manager: PauseManager::new(),
            state_manager: StateManager::for_worker(),
            statistics_manager: StatisticsManager::new(&name),
            console_message_manager: ConsoleMessageManager::new(
                name.clone(),
                config.console_flush_threshold,
            ),
            alignment_manager: AlignmentManager::new(worker_id.clone()),
            input_manager: InputManager::new(worker_id.clone()),
            output_manager: OutputManager::new(worker_id.clone()),
            tuple_processing_manager: Arc::new(Mutex::new(TupleProcessingManager::new())),
            executor_manager: Arc::new(Mutex::new(ExecutorManager::new(&name))),
            rpc_client: AsyncRpcClient::new(worker_id.clone(), output_queue.clone()),
            debugger: Debugger::new(),
            current_port: PortIdentity::default(),
            pending_inputs: VecDeque::new(),
            worker_id,
            config,
            registry,
            input_queue,
            output_queue,
        }
    }

    pub fn executor(&self) -> MutexGuard<'_, ExecutorManager> {
        self.executor_manager
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn tuple_processing(&self) -> MutexGuard<'_, TupleProcessingManager> {
        self.tuple_processing_manager
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a pause reason and stop taking data. A ready or running
    /// worker becomes paused.
    pub fn pause(&mut self, reason: PauseType) {
        self.pause_manager.pause(reason);
        self.input_queue.disable_data();
        if self
            .state_manager
            .confirm_state(&[WorkerState::Ready, WorkerState::Running])
        {
            self.transit(WorkerState::Paused);
        }
        tracing::debug!("{} paused by {reason:?}", self.worker_id);
    }

    /// Drop a pause reason. Data flows again, and a paused worker runs
    /// again, only once no reason is left.
    pub fn resume(&mut self, reason: PauseType) {
        self.pause_manager.resume(reason);
        if !self.pause_manager.is_paused() {
            self.input_queue.enable_data();
            if self.state_manager.confirm_state(&[WorkerState::Paused]) {
                self.transit(WorkerState::Running);
            }
            tracing::debug!("{} resumed", self.worker_id);
        }
    }

    fn transit(&mut self, state: WorkerState) {
        if let Err(err) = self.state_manager.transit_to(state, false) {
            tracing::warn!("{}: {err}", self.worker_id);
        }
    }

    pub fn console(
        &mut self,
        msg_type: ConsoleMessageType,
        title: impl Into<String>,
        message: impl Into<String>,
    ) {
        let source = self.worker_id.to_string();
        self.console_message_manager
            .put(msg_type, source, title, message);
    }

    /// Send buffered console messages to the controller.
    pub fn flush_console(&mut self, force: bool) {
        for console_message in self.console_message_manager.flush(force) {
            self.rpc_client.send_one_way(
                &ActorVirtualIdentity::controller(),
                ControlRequest::ConsoleMessageTriggered { console_message },
            );
        }
    }

    /// Tell the controller something without waiting for an answer.
    pub fn notify_controller(&mut self, request: ControlRequest) {
        self.rpc_client
            .send_one_way(&ActorVirtualIdentity::controller(), request);
    }
}

#[cfg(test)]
pub(crate) fn test_context(name: &str) -> Context {
    Context::new(
        name.into(),
        Arc::new(WorkerConfig::default()),
        Arc::new(OperatorRegistry::with_builtins()),
        Arc::new(InternalQueue::new()),
        Arc::new(InternalQueue::new()),
    )
}
