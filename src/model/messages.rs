//! Messages exchanged with other participants.
//!
//! Every "one-of" payload is a tagged enum decoded once at the queue
//! boundary; nothing downstream of the queue inspects types
//! dynamically.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::Serialize;

use super::tuple::{DataFrame, Schema};
use super::{ActorVirtualIdentity, ChannelIdentity, PhysicalLink, PortIdentity, WorkerState};

/// `command_id` meaning "no reply expected".
pub const NO_REPLY_COMMAND_ID: i64 = -1;

/// Payload of a data channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataPayload {
    /// A batch of records.
    DataFrame(DataFrame),
    /// The sender opened its output to us.
    StartOfUpstream,
    /// The sender will send nothing more on this channel.
    EndOfUpstream,
    /// A barrier-style control message travelling with the data.
    Embedded(EmbeddedControlMessage),
}

impl DataPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            DataPayload::DataFrame(_) => "DataFrame",
            DataPayload::StartOfUpstream => "StartOfUpstream",
            DataPayload::EndOfUpstream => "EndOfUpstream",
            DataPayload::Embedded(_) => "Embedded",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataElement {
    pub tag: ChannelIdentity,
    pub payload: DataPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlElement {
    pub tag: ChannelIdentity,
    pub payload: ControlPayload,
}

/// Either an outbound call or the answer to one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ControlPayload {
    Invocation(ControlInvocation),
    Return(ReturnInvocation),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlContext {
    pub sender: ActorVirtualIdentity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlInvocation {
    pub method_name: String,
    pub command: ControlRequest,
    pub context: ControlContext,
    pub command_id: i64,
}

impl ControlInvocation {
    /// Invocation named after the request's canonical method.
    pub fn new(command: ControlRequest, sender: ActorVirtualIdentity, command_id: i64) -> Self {
        Self {
            method_name: command.method_name().to_owned(),
            command,
            context: ControlContext { sender },
            command_id,
        }
    }

    pub fn expects_reply(&self) -> bool {
        self.command_id != NO_REPLY_COMMAND_ID
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnInvocation {
    pub command_id: i64,
    pub return_value: ControlReturn,
}

/// Exactly one of a success value or a structured error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ControlReturn {
    Value(ControlReturnValue),
    Error(ControlError),
}

impl ControlReturn {
    pub fn into_result(self) -> Result<ControlReturnValue, ControlError> {
        match self {
            ControlReturn::Value(value) => Ok(value),
            ControlReturn::Error(err) => Err(err),
        }
    }
}

impl From<Result<ControlReturnValue, ControlError>> for ControlReturn {
    fn from(result: Result<ControlReturnValue, ControlError>) -> Self {
        match result {
            Ok(value) => ControlReturn::Value(value),
            Err(err) => ControlReturn::Error(err),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorLanguage {
    Rust,
    Scala,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlError {
    pub error_message: String,
    pub error_details: String,
    pub stack_trace: String,
    pub language: ErrorLanguage,
}

/// Control-plane commands.
///
/// The first group is handled by workers, the last group is sent by
/// workers to the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ControlRequest {
    AddInputChannel {
        channel_id: ChannelIdentity,
        port_id: PortIdentity,
    },
    AssignPort {
        port_id: PortIdentity,
        input: bool,
        schema: Schema,
        storage_uri: Option<String>,
    },
    InitializeExecutor {
        operator: String,
        config: serde_json::Value,
        is_source: bool,
    },
    ModifyOperatorLogic {
        operator: String,
        config: serde_json::Value,
        is_source: bool,
    },
    OpenExecutor,
    StartWorker,
    PauseWorker,
    ResumeWorker,
    QueryStatistics,
    QuerySelfWorkloadMetrics,
    EvaluateExpression {
        expression: String,
    },
    DebugCommand {
        cmd: String,
    },
    RetryCurrentTuple,
    AddPartitioning {
        tag: PhysicalLink,
        partitioning: Partitioning,
    },
    UpdateInputLinking {
        identifier: ActorVirtualIdentity,
        input_link: PhysicalLink,
    },
    SchedulerTimeSlotEvent {
        time_slot_expired: bool,
    },
    EndWorker,
    NoOperation,

    PortCompleted {
        port_id: PortIdentity,
        input: bool,
    },
    WorkerExecutionCompleted,
    ConsoleMessageTriggered {
        console_message: ConsoleMessage,
    },
}

impl ControlRequest {
    pub fn method_name(&self) -> &'static str {
        match self {
            ControlRequest::AddInputChannel { .. } => "AddInputChannel",
            ControlRequest::AssignPort { .. } => "AssignPort",
            ControlRequest::InitializeExecutor { .. } => "InitializeExecutor",
            ControlRequest::ModifyOperatorLogic { .. } => "ModifyOperatorLogic",
            ControlRequest::OpenExecutor => "OpenExecutor",
            ControlRequest::StartWorker => "StartWorker",
            ControlRequest::PauseWorker => "PauseWorker",
            ControlRequest::ResumeWorker => "ResumeWorker",
            ControlRequest::QueryStatistics => "QueryStatistics",
            ControlRequest::QuerySelfWorkloadMetrics => "QuerySelfWorkloadMetrics",
            ControlRequest::EvaluateExpression { .. } => "EvaluateExpression",
            ControlRequest::DebugCommand { .. } => "DebugCommand",
            ControlRequest::RetryCurrentTuple => "RetryCurrentTuple",
            ControlRequest::AddPartitioning { .. } => "AddPartitioning",
            ControlRequest::UpdateInputLinking { .. } => "UpdateInputLinking",
            ControlRequest::SchedulerTimeSlotEvent { .. } => "SchedulerTimeSlotEvent",
            ControlRequest::EndWorker => "EndWorker",
            ControlRequest::NoOperation => "NoOperation",
            ControlRequest::PortCompleted { .. } => "PortCompleted",
            ControlRequest::WorkerExecutionCompleted => "WorkerExecutionCompleted",
            ControlRequest::ConsoleMessageTriggered { .. } => "ConsoleMessageTriggered",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ControlReturnValue {
    Empty,
    WorkerState(WorkerState),
    WorkerMetrics(WorkerMetrics),
    WorkloadMetrics(SelfWorkloadMetrics),
    EvaluatedValue(EvaluatedValue),
}

/// How produced records are routed to downstream workers.
///
/// Every variant lists the channels of the link; destinations are the
/// receivers of those channels in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Partitioning {
    OneToOne {
        batch_size: usize,
        channels: Vec<ChannelIdentity>,
    },
    RoundRobin {
        batch_size: usize,
        channels: Vec<ChannelIdentity>,
    },
    HashBased {
        batch_size: usize,
        channels: Vec<ChannelIdentity>,
        hash_attribute_names: Vec<String>,
    },
    RangeBased {
        batch_size: usize,
        channels: Vec<ChannelIdentity>,
        range_attribute_names: Vec<String>,
        range_min: i64,
        range_max: i64,
    },
    Broadcast {
        batch_size: usize,
        channels: Vec<ChannelIdentity>,
    },
    /// Any kind this worker does not know how to build.
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddedControlMessageIdentity(pub String);

/// When an embedded control message counts as arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlignmentPolicy {
    AllAlignment,
    RequireAlignment,
    PortAlignment,
    NoAlignment,
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedControlMessage {
    pub id: EmbeddedControlMessageIdentity,
    pub alignment: AlignmentPolicy,
    /// Channels the message must be seen on. Empty means every data
    /// channel of the receiving worker.
    pub scope: Vec<ChannelIdentity>,
    /// Command each worker runs once the message arrives.
    pub command_mapping: HashMap<ActorVirtualIdentity, ControlInvocation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsoleMessageType {
    Print,
    Error,
    Commands,
    Debugger,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleMessage {
    pub worker_id: String,
    pub timestamp: DateTime<Utc>,
    pub msg_type: ConsoleMessageType,
    pub source: String,
    pub title: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortTupleCount {
    pub port_id: PortIdentity,
    pub count: u64,
}

/// Durations are nanoseconds; `-1` means "could not be computed".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStatistics {
    pub input_tuple_count: Vec<PortTupleCount>,
    pub output_tuple_count: Vec<PortTupleCount>,
    pub data_processing_time: i64,
    pub control_processing_time: i64,
    pub idle_time: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerMetrics {
    pub worker_state: WorkerState,
    pub worker_statistics: WorkerStatistics,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfWorkloadMetrics {
    pub unprocessed_data_input_queue_size: usize,
    pub unprocessed_control_input_queue_size: usize,
    pub pending_data_output_queue_size: usize,
    pub pending_control_output_queue_size: usize,
}

/// One node of an evaluated debug expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedValue {
    pub expression: String,
    pub value_ref: String,
    pub value_str: String,
    pub value_type: String,
    pub expandable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluatedValue {
    pub value: TypedValue,
    pub attributes: Vec<TypedValue>,
}

#[test]
fn unknown_partitioning_kind_decodes_as_unsupported() {
    let found: Partitioning =
        serde_json::from_str(r#"{"type": "SomethingNew", "batch_size": 3}"#).unwrap();
    assert_eq!(found, Partitioning::Unsupported);
}

#[test]
fn unknown_alignment_decodes_as_unsupported() {
    let found: AlignmentPolicy = serde_json::from_str(r#""SOMETIMES_ALIGNMENT""#).unwrap();
    assert_eq!(found, AlignmentPolicy::Unsupported);
}

#[test]
fn invocation_is_named_after_request() {
    let invocation = ControlInvocation::new(
        ControlRequest::QueryStatistics,
        ActorVirtualIdentity::controller(),
        4,
    );
    assert_eq!(invocation.method_name, "QueryStatistics");
    assert!(invocation.expects_reply());
}
