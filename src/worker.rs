//! Public entry point: one running worker.
//!
//! A [`Worker`] owns the two queues that connect it to the network
//! layer. Whatever delivers messages puts them on
//! [`Worker::input_queue`]; whatever sends them takes them off
//! [`Worker::output_queue`].

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::runtime::Runtime;

use crate::config::WorkerConfig;
use crate::context::Context;
use crate::errors::{panic_message, WorkerError, WorkerResult};
use crate::metrics::initialize_metrics;
use crate::model::ActorVirtualIdentity;
use crate::operators::OperatorRegistry;
use crate::queue::{InternalQueue, InternalQueueElement};
use crate::runnables::MainLoop;
use crate::webserver::run_webserver;

/// Start the tokio runtime for the metrics endpoint.
/// Keep a reference to the runtime for as long as you need it running.
fn start_server_runtime(port: u16) -> WorkerResult<Runtime> {
    initialize_metrics()?;
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("webserver-threads")
        .enable_all()
        .build()?;
    rt.spawn(async move {
        if let Err(err) = run_webserver(port).await {
            tracing::error!("metrics endpoint stopped: {err}");
        }
    });
    Ok(rt)
}

pub struct Worker {
    worker_id: ActorVirtualIdentity,
    input_queue: Arc<InternalQueue>,
    output_queue: Arc<InternalQueue>,
    main_loop: Option<JoinHandle<()>>,
    server_rt: Option<Runtime>,
}

impl Worker {
    /// Start a worker on its own thread. It begins UNINITIALIZED and
    /// waits for control messages.
    ///
    /// Logging is set up at the configured level by the first worker
    /// of the process; later workers keep that subscriber.
    pub fn spawn(
        worker_id: ActorVirtualIdentity,
        config: Arc<WorkerConfig>,
        registry: Arc<OperatorRegistry>,
    ) -> WorkerResult<Self> {
        crate::tracing::setup(config.log_level.as_deref())?;
        // Instruments only reach Prometheus if the provider exists
        // before the managers create them.
        let server_rt = config.metrics_port.map(start_server_runtime).transpose()?;

        let input_queue = Arc::new(InternalQueue::new());
        let output_queue = Arc::new(InternalQueue::new());
        let ctx = Context::new(
            worker_id.clone(),
            config,
            registry,
            input_queue.clone(),
            output_queue.clone(),
        );
        let main_loop = MainLoop::new(ctx)?;
        let handle = std::thread::Builder::new()
            .name(format!("main-loop-{worker_id}"))
            .spawn(move || main_loop.run())?;
        tracing::info!("worker {worker_id} spawned");
        Ok(Self {
            worker_id,
            input_queue,
            output_queue,
            main_loop: Some(handle),
            server_rt,
        })
    }

    pub fn worker_id(&self) -> &ActorVirtualIdentity {
        &self.worker_id
    }

    pub fn input_queue(&self) -> &Arc<InternalQueue> {
        &self.input_queue
    }

    pub fn output_queue(&self) -> &Arc<InternalQueue> {
        &self.output_queue
    }

    /// Ask the main loop to exit after the control already queued.
    pub fn stop(&self) {
        self.input_queue.put(InternalQueueElement::Stop);
    }

    /// Wait for the main loop to exit.
    pub fn join(mut self) -> WorkerResult<()> {
        let joined = match self.main_loop.take() {
            Some(handle) => handle.join(),
            None => Ok(()),
        };
        // If we just drop the runtime, it will wait indefinitely
        // that the server stops, so we need to stop it manually.
        if let Some(rt) = self.server_rt.take() {
            rt.shutdown_timeout(Duration::from_secs(0));
        }
        joined.map_err(|payload| {
            WorkerError::Operator(anyhow::anyhow!(
                "main loop of {} panicked: {}",
                self.worker_id,
                panic_message(payload.as_ref())
            ))
        })
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if self.main_loop.is_some() {
            self.stop();
        }
        if let Some(rt) = self.server_rt.take() {
            rt.shutdown_timeout(Duration::from_secs(0));
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::model::messages::{
        AlignmentPolicy, ConsoleMessageType, ControlElement, ControlInvocation, ControlPayload,
        ControlRequest, ControlReturn, ControlReturnValue, DataElement, DataPayload,
        EmbeddedControlMessage, EmbeddedControlMessageIdentity, Partitioning,
    };
    use crate::model::tuple::{AttributeType, DataFrame, Schema, Value};
    use crate::model::{ChannelIdentity, PhysicalLink, PortIdentity, WorkerState};

    const WAIT: Duration = Duration::from_secs(5);

    fn schema() -> Schema {
        Schema::new([("x", AttributeType::Long)])
    }

    fn worker() -> Worker {
        Worker::spawn(
            "W1".into(),
            Arc::new(WorkerConfig::default()),
            Arc::new(OperatorRegistry::with_builtins()),
        )
        .unwrap()
    }

    struct Driver {
        worker: Worker,
        next_id: i64,
    }

    impl Driver {
        fn new() -> Self {
            Self {
                worker: worker(),
                next_id: 0,
            }
        }

        fn send(&mut self, request: ControlRequest) -> i64 {
            let command_id = self.next_id;
            self.next_id += 1;
            self.worker.input_queue().put_control(ControlElement {
                tag: ChannelIdentity::control("CONTROLLER", "W1"),
                payload: ControlPayload::Invocation(ControlInvocation::new(
                    request,
                    ActorVirtualIdentity::controller(),
                    command_id,
                )),
            });
            command_id
        }

        fn data(&self, from: &str, payload: DataPayload) {
            self.worker.input_queue().put_data(DataElement {
                tag: ChannelIdentity::data(from, "W1"),
                payload,
            });
        }

        fn next(&self) -> InternalQueueElement {
            match self.worker.output_queue().get_timeout(WAIT) {
                Some(element) => element,
                None => panic!("worker produced nothing"),
            }
        }

        /// Wait for the reply to `command_id`, skipping notifications.
        fn reply(&mut self, command_id: i64) -> ControlReturn {
            loop {
                if let InternalQueueElement::Control(ControlElement {
                    payload: ControlPayload::Return(reply),
                    ..
                }) = self.next()
                {
                    if reply.command_id == command_id {
                        return reply.return_value;
                    }
                }
            }
        }

        fn call(&mut self, request: ControlRequest) -> ControlReturnValue {
            let command_id = self.send(request);
            match self.reply(command_id) {
                ControlReturn::Value(value) => value,
                ControlReturn::Error(err) => panic!("{}", err.error_message),
            }
        }

        fn setup(&mut self, operator: &str, config: serde_json::Value, is_source: bool) {
            for input in [true, false] {
                self.call(ControlRequest::AssignPort {
                    port_id: PortIdentity::new(0),
                    input,
                    schema: schema(),
                    storage_uri: None,
                });
            }
            self.call(ControlRequest::AddInputChannel {
                channel_id: ChannelIdentity::data("UP", "W1"),
                port_id: PortIdentity::new(0),
            });
            self.call(ControlRequest::AddPartitioning {
                tag: PhysicalLink {
                    from_op: "op".to_owned(),
                    from_port: PortIdentity::new(0),
                    to_op: "down".to_owned(),
                    to_port: PortIdentity::new(0),
                },
                partitioning: Partitioning::OneToOne {
                    batch_size: 10,
                    channels: vec![ChannelIdentity::data("W1", "DOWN")],
                },
            });
            self.call(ControlRequest::InitializeExecutor {
                operator: operator.to_owned(),
                config,
                is_source,
            });
            self.call(ControlRequest::OpenExecutor);
        }

        /// Collect output until the worker reports completion.
        fn until_completed(&mut self) -> (Vec<DataPayload>, Vec<ControlRequest>) {
            let mut data = Vec::new();
            let mut notifications = Vec::new();
            loop {
                match self.next() {
                    InternalQueueElement::Data(element) => {
                        assert_eq!(element.tag.to, ActorVirtualIdentity::from("DOWN"));
                        data.push(element.payload);
                    }
                    InternalQueueElement::Control(ControlElement {
                        payload: ControlPayload::Invocation(invocation),
                        ..
                    }) => {
                        let done =
                            invocation.command == ControlRequest::WorkerExecutionCompleted;
                        notifications.push(invocation.command);
                        if done {
                            break;
                        }
                    }
                    _ => {}
                }
            }
            // Control is taken off the output queue first, so data
            // sent before the notification may still be waiting.
            while let Some(element) = self.worker.output_queue().get_timeout(Duration::ZERO) {
                if let InternalQueueElement::Data(element) = element {
                    data.push(element.payload);
                }
            }
            (data, notifications)
        }

        /// Skip ahead to the console message reporting a failure.
        fn wait_for_error(&self) {
            loop {
                if let InternalQueueElement::Control(ControlElement {
                    payload: ControlPayload::Invocation(invocation),
                    ..
                }) = self.next()
                {
                    if let ControlRequest::ConsoleMessageTriggered { console_message } =
                        invocation.command
                    {
                        if console_message.msg_type == ConsoleMessageType::Error {
                            return;
                        }
                    }
                }
            }
        }

        fn output_count(&mut self) -> u64 {
            match self.call(ControlRequest::QueryStatistics) {
                ControlReturnValue::WorkerMetrics(metrics) => metrics
                    .worker_statistics
                    .output_tuple_count
                    .iter()
                    .map(|count| count.count)
                    .sum(),
                other => panic!("unexpected return {other:?}"),
            }
        }

        fn state(&mut self) -> WorkerState {
            match self.call(ControlRequest::QueryStatistics) {
                ControlReturnValue::WorkerMetrics(metrics) => metrics.worker_state,
                other => panic!("unexpected return {other:?}"),
            }
        }

        fn finish(self) {
            self.worker.stop();
            self.worker.join().unwrap();
        }
    }

    fn frame(values: &[i64]) -> DataPayload {
        DataPayload::DataFrame(DataFrame::from_tuples(
            values
                .iter()
                .map(|v| crate::model::tuple::Tuple::new().with("x", *v))
                .collect(),
        ))
    }

    fn rows(payload: &DataPayload) -> Option<usize> {
        match payload {
            DataPayload::DataFrame(frame) => Some(frame.num_rows()),
            _ => None,
        }
    }

    #[test]
    fn bad_log_level_is_refused() {
        let config = WorkerConfig {
            log_level: Some("loud".to_owned()),
            ..WorkerConfig::default()
        };
        assert!(matches!(
            Worker::spawn(
                "W1".into(),
                Arc::new(config),
                Arc::new(OperatorRegistry::with_builtins()),
            ),
            Err(WorkerError::Config(_))
        ));
    }

    #[test]
    fn echo_worker_lifecycle() {
        let mut driver = Driver::new();
        assert_eq!(driver.state(), WorkerState::Uninitialized);
        driver.setup("echo", json!(null), false);
        assert_eq!(
            driver.call(ControlRequest::StartWorker),
            ControlReturnValue::WorkerState(WorkerState::Ready)
        );

        driver.data("UP", frame(&[7]));
        driver.data("UP", DataPayload::EndOfUpstream);
        let (data, notifications) = driver.until_completed();

        assert_eq!(data.first(), Some(&DataPayload::StartOfUpstream));
        let batches: Vec<_> = data.iter().filter_map(rows).collect();
        assert_eq!(batches, vec![1]);
        assert_eq!(data.last(), Some(&DataPayload::EndOfUpstream));
        assert!(notifications.contains(&ControlRequest::PortCompleted {
            port_id: PortIdentity::new(0),
            input: true,
        }));
        assert!(notifications.contains(&ControlRequest::PortCompleted {
            port_id: PortIdentity::new(0),
            input: false,
        }));

        match driver.call(ControlRequest::QueryStatistics) {
            ControlReturnValue::WorkerMetrics(metrics) => {
                assert_eq!(metrics.worker_state, WorkerState::Completed);
                let stats = metrics.worker_statistics;
                assert_eq!(stats.input_tuple_count[0].count, 1);
                assert_eq!(stats.output_tuple_count[0].count, 1);
            }
            other => panic!("unexpected return {other:?}"),
        }
        driver.finish();
    }

    #[test]
    fn source_worker_runs_on_start() {
        let mut driver = Driver::new();
        driver.setup("range_source", json!({"start": 0, "end": 3, "field": "x"}), true);
        assert_eq!(
            driver.call(ControlRequest::StartWorker),
            ControlReturnValue::WorkerState(WorkerState::Running)
        );
        let (data, _) = driver.until_completed();
        let batches: Vec<_> = data.iter().filter_map(rows).collect();
        assert_eq!(batches, vec![3]);
        assert_eq!(driver.state(), WorkerState::Completed);
        driver.finish();
    }

    #[test]
    fn operator_failure_pauses_until_retried() {
        let mut driver = Driver::new();
        // A range source refuses any input tuple.
        driver.setup("range_source", json!({"start": 0, "end": 0}), false);
        driver.data("UP", frame(&[1]));

        // The failure is reported on the console.
        driver.wait_for_error();
        assert_eq!(driver.state(), WorkerState::Paused);
        driver.data("UP", DataPayload::EndOfUpstream);
        match driver.call(ControlRequest::QuerySelfWorkloadMetrics) {
            ControlReturnValue::WorkloadMetrics(metrics) => {
                assert_eq!(metrics.unprocessed_data_input_queue_size, 1)
            }
            other => panic!("unexpected return {other:?}"),
        }

        driver.call(ControlRequest::ModifyOperatorLogic {
            operator: "echo".to_owned(),
            config: json!(null),
            is_source: false,
        });
        driver.call(ControlRequest::RetryCurrentTuple);
        let (data, _) = driver.until_completed();
        let batches: Vec<_> = data.iter().filter_map(rows).collect();
        assert_eq!(batches, vec![1]);
        driver.finish();
    }

    #[test]
    fn user_pause_holds_data() {
        let mut driver = Driver::new();
        driver.setup("echo", json!(null), false);
        assert_eq!(
            driver.call(ControlRequest::PauseWorker),
            ControlReturnValue::WorkerState(WorkerState::Paused)
        );
        driver.data("UP", frame(&[1, 2]));
        match driver.call(ControlRequest::QuerySelfWorkloadMetrics) {
            ControlReturnValue::WorkloadMetrics(metrics) => {
                assert_eq!(metrics.unprocessed_data_input_queue_size, 1)
            }
            other => panic!("unexpected return {other:?}"),
        }
        assert_eq!(
            driver.call(ControlRequest::ResumeWorker),
            ControlReturnValue::WorkerState(WorkerState::Running)
        );
        driver.data("UP", DataPayload::EndOfUpstream);
        let (data, _) = driver.until_completed();
        let batches: Vec<_> = data.iter().filter_map(rows).collect();
        assert_eq!(batches, vec![2]);
        driver.finish();
    }

    #[test]
    fn embedded_message_runs_mapped_command_and_moves_on() {
        let mut driver = Driver::new();
        driver.setup("echo", json!(null), false);
        let mut command_mapping = std::collections::HashMap::new();
        command_mapping.insert(
            ActorVirtualIdentity::from("W1"),
            ControlInvocation::new(
                ControlRequest::PauseWorker,
                ActorVirtualIdentity::controller(),
                99,
            ),
        );
        driver.data(
            "UP",
            DataPayload::Embedded(EmbeddedControlMessage {
                id: EmbeddedControlMessageIdentity("pause-all".to_owned()),
                alignment: AlignmentPolicy::AllAlignment,
                scope: Vec::new(),
                command_mapping,
            }),
        );
        assert_eq!(
            driver.reply(99),
            ControlReturn::Value(ControlReturnValue::WorkerState(WorkerState::Paused))
        );
        loop {
            if let InternalQueueElement::Data(element) = driver.next() {
                if matches!(element.payload, DataPayload::Embedded(_)) {
                    break;
                }
            }
        }
        assert_eq!(driver.state(), WorkerState::Paused);
        driver.finish();
    }

    #[test]
    fn values_are_cast_to_output_schema() {
        let mut driver = Driver::new();
        driver.setup("echo", json!(null), false);
        driver.data(
            "UP",
            DataPayload::DataFrame(DataFrame::from_tuples(vec![
                crate::model::tuple::Tuple::new().with("x", 5)
            ])),
        );
        driver.data("UP", DataPayload::EndOfUpstream);
        let (data, _) = driver.until_completed();
        let frame = data
            .iter()
            .find_map(|payload| match payload {
                DataPayload::DataFrame(frame) => Some(frame.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(frame.row(0).get("x"), Some(&Value::Long(5)));
        driver.finish();
    }

    #[test]
    fn failed_end_of_port_is_retried_before_completion() {
        let mut driver = Driver::new();
        // The count tuple lacks the field the output schema asks for.
        driver.setup("count", json!(null), false);
        driver.data("UP", frame(&[1, 2]));
        driver.data("UP", DataPayload::EndOfUpstream);
        driver.wait_for_error();

        let command_id = driver.send(ControlRequest::QueryStatistics);
        let mut input_completed = false;
        let state = loop {
            match driver.next() {
                InternalQueueElement::Control(ControlElement {
                    payload: ControlPayload::Invocation(invocation),
                    ..
                }) => {
                    if let ControlRequest::PortCompleted { input: true, .. } = invocation.command {
                        input_completed = true;
                    }
                }
                InternalQueueElement::Control(ControlElement {
                    payload: ControlPayload::Return(reply),
                    ..
                }) if reply.command_id == command_id => match reply.return_value {
                    ControlReturn::Value(ControlReturnValue::WorkerMetrics(metrics)) => {
                        break metrics.worker_state
                    }
                    other => panic!("unexpected return {other:?}"),
                },
                _ => {}
            }
        };
        assert!(!input_completed);
        assert_eq!(state, WorkerState::Paused);

        driver.call(ControlRequest::ModifyOperatorLogic {
            operator: "count".to_owned(),
            config: json!({"field": "x"}),
            is_source: false,
        });
        driver.call(ControlRequest::RetryCurrentTuple);
        let (data, notifications) = driver.until_completed();
        let counts: Vec<_> = data
            .iter()
            .filter_map(|payload| match payload {
                DataPayload::DataFrame(frame) => frame.row(0).get("x").cloned(),
                _ => None,
            })
            .collect();
        assert_eq!(counts, vec![Value::Long(2)]);
        assert!(notifications.contains(&ControlRequest::PortCompleted {
            port_id: PortIdentity::new(0),
            input: true,
        }));
        driver.finish();
    }

    #[test]
    fn control_runs_between_outputs_of_one_call() {
        let mut driver = Driver::new();
        driver.setup(
            "range_source",
            json!({"start": 0, "end": i64::MAX, "field": "x"}),
            true,
        );
        driver.call(ControlRequest::StartWorker);
        // The range never ends, so the source is still inside its one
        // call when the first batch shows up.
        loop {
            if let InternalQueueElement::Data(element) = driver.next() {
                if rows(&element.payload).is_some() {
                    break;
                }
            }
        }
        assert_eq!(
            driver.call(ControlRequest::PauseWorker),
            ControlReturnValue::WorkerState(WorkerState::Paused)
        );
        let produced = driver.output_count();
        assert!(produced >= 10);
        assert_eq!(driver.output_count(), produced);
        assert_eq!(driver.state(), WorkerState::Paused);
        driver.finish();
    }
}
