//! Control command handlers.
//!
//! One plain function per command. Each one gets the worker's
//! [`Context`] and the decoded request and returns the value to reply
//! with. [`server`] wires them into an [`AsyncRpcServer`] under their
//! method names, plus the aliases older controllers still send.

use crate::context::Context;
use crate::model::ActorVirtualIdentity;
use crate::rpc::{AsyncRpcServer, Handler};

mod debug;
mod executor;
mod lifecycle;
mod ports;
mod query;

/// Every method name a worker answers to.
pub fn handlers() -> Vec<(&'static str, Handler<Context>)> {
    vec![
        ("AddInputChannel", ports::add_input_channel as Handler<Context>),
        ("AssignPort", ports::assign_port),
        ("AddPartitioning", ports::add_partitioning),
        ("UpdateInputLinking", ports::update_input_linking),
        ("InitializeExecutor", executor::initialize_executor),
        ("InitializeOperatorLogic", executor::initialize_executor),
        ("ModifyOperatorLogic", executor::modify_operator_logic),
        ("OpenExecutor", executor::open_executor),
        ("OpenOperator", executor::open_executor),
        ("StartWorker", lifecycle::start_worker),
        ("PauseWorker", lifecycle::pause_worker),
        ("ResumeWorker", lifecycle::resume_worker),
        ("SchedulerTimeSlotEvent", lifecycle::scheduler_time_slot_event),
        ("EndWorker", lifecycle::end_worker),
        ("NoOperation", lifecycle::no_operation),
        ("NoOp", lifecycle::no_operation),
        ("QueryStatistics", query::query_statistics),
        ("QuerySelfWorkloadMetrics", query::query_self_workload_metrics),
        ("EvaluateExpression", debug::evaluate_expression),
        ("DebugCommand", debug::debug_command),
        ("RetryCurrentTuple", debug::retry_current_tuple),
        ("ReplayCurrentTuple", debug::retry_current_tuple),
    ]
}

pub fn server(worker_id: ActorVirtualIdentity) -> AsyncRpcServer<Context> {
    AsyncRpcServer::new(worker_id, handlers())
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::context::Context;
    use crate::errors::{control_error, WorkerError};
    use crate::model::messages::{
        ControlError, ControlInvocation, ControlRequest, ControlReturnValue,
    };
    use crate::model::ActorVirtualIdentity;

    /// Run one request through the full dispatch path.
    pub(crate) fn call(
        ctx: &mut Context,
        request: ControlRequest,
    ) -> Result<ControlReturnValue, ControlError> {
        let server = super::server(ctx.worker_id.clone());
        server
            .execute(
                ctx,
                ControlInvocation::new(request, ActorVirtualIdentity::controller(), 0),
            )
            .into_result()
    }

    pub(crate) fn ok(ctx: &mut Context, request: ControlRequest) -> ControlReturnValue {
        match call(ctx, request) {
            Ok(value) => value,
            Err(err) => panic!("{}", err.error_message),
        }
    }

    pub(crate) fn message_of(err: &WorkerError) -> String {
        control_error(err).error_message
    }
}

#[test]
fn aliases_share_handlers() {
    let server = server("w0".into());
    for name in ["InitializeOperatorLogic", "openoperator", "NoOp", "ReplayCurrentTuple"] {
        assert!(server.has_method(name), "{name}");
    }
    assert!(!server.has_method("WorkerExecutionCompleted"));
}
