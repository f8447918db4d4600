//! Inspection of a live worker.

use crate::context::Context;
use crate::debugger::{evaluate, DebugCommand, ExpressionScope};
use crate::errors::WorkerResult;
use crate::expect_request;
use crate::inputs::InputItem;
use crate::managers::ProcessingInput;
use crate::model::messages::{ConsoleMessageType, ControlRequest, ControlReturnValue};
use crate::model::{InternalMarker, PauseType};

fn eval(ctx: &Context, expression: &str) -> WorkerResult<ControlReturnValue> {
    let tuple_processing = ctx.tuple_processing();
    let snapshot = ctx
        .executor()
        .operator()
        .map(|operator| operator.snapshot())
        .unwrap_or(serde_json::Value::Null);
    let scope = ExpressionScope {
        tuple: tuple_processing.current_input_tuple(),
        port: tuple_processing.current_input_port(),
        snapshot,
        state: ctx.state_manager.get_current_state(),
    };
    Ok(ControlReturnValue::EvaluatedValue(evaluate(
        expression, &scope,
    )?))
}

pub(super) fn evaluate_expression(
    ctx: &mut Context,
    request: ControlRequest,
) -> WorkerResult<ControlReturnValue> {
    let (expression,) = expect_request!(request, EvaluateExpression { expression });
    eval(ctx, &expression)
}

/// Debugger output goes to the console; the reply only acknowledges
/// the command.
pub(super) fn debug_command(
    ctx: &mut Context,
    request: ControlRequest,
) -> WorkerResult<ControlReturnValue> {
    let (cmd,) = expect_request!(request, DebugCommand { cmd });
    match DebugCommand::parse(&cmd)? {
        DebugCommand::Break(breakpoint) => {
            let message = format!("breakpoint set on {breakpoint}");
            ctx.debugger.add_breakpoint(breakpoint);
            ctx.console(ConsoleMessageType::Debugger, cmd, message);
        }
        DebugCommand::Clear => {
            ctx.debugger.clear();
            ctx.console(ConsoleMessageType::Debugger, cmd, "breakpoints cleared");
        }
        DebugCommand::Continue => {
            ctx.resume(PauseType::DebugPause);
            ctx.resume(PauseType::ExceptionPause);
        }
        DebugCommand::Step => {
            ctx.debugger.step();
            ctx.resume(PauseType::DebugPause);
            ctx.resume(PauseType::ExceptionPause);
        }
        DebugCommand::Print(expression) => {
            let message = match eval(ctx, &expression)? {
                ControlReturnValue::EvaluatedValue(value) => value.value.value_str,
                _ => String::new(),
            };
            ctx.console(ConsoleMessageType::Debugger, cmd, message);
        }
    }
    ctx.flush_console(true);
    Ok(ControlReturnValue::Empty)
}

/// Put the last input handed to the operator back in line and lift the
/// exception pause it caused. A failed end of port is retried as well.
pub(super) fn retry_current_tuple(
    ctx: &mut Context,
    _request: ControlRequest,
) -> WorkerResult<ControlReturnValue> {
    let last = ctx.tuple_processing().last_input().cloned();
    match last {
        Some(ProcessingInput::Tuple(tuple, _)) => {
            tracing::info!("{} retrying {tuple}", ctx.worker_id);
            ctx.pending_inputs.push_front(InputItem::Tuple(tuple));
        }
        Some(ProcessingInput::Finish(port_id)) => {
            tracing::info!("{} retrying end of port {port_id}", ctx.worker_id);
            ctx.pending_inputs
                .push_front(InputItem::Marker(InternalMarker::EndOfInputPort(port_id)));
        }
        None => tracing::warn!("{} has nothing to retry", ctx.worker_id),
    }
    ctx.resume(PauseType::ExceptionPause);
    Ok(ControlReturnValue::Empty)
}
