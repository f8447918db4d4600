//! Installing and opening operator logic.

use crate::context::Context;
use crate::errors::WorkerResult;
use crate::expect_request;
use crate::model::messages::{ControlRequest, ControlReturnValue};
use crate::model::WorkerState;

pub(super) fn initialize_executor(
    ctx: &mut Context,
    request: ControlRequest,
) -> WorkerResult<ControlReturnValue> {
    let (operator, config, is_source) = expect_request!(
        request,
        InitializeExecutor {
            operator,
            config,
            is_source
        }
    );
    ctx.executor()
        .initialize(&ctx.registry, &operator, &config, is_source)?;
    ctx.state_manager.transit_to(WorkerState::Ready, false)?;
    Ok(ControlReturnValue::Empty)
}

/// Replace the running logic, carrying its state over.
pub(super) fn modify_operator_logic(
    ctx: &mut Context,
    request: ControlRequest,
) -> WorkerResult<ControlReturnValue> {
    let (operator, config, is_source) = expect_request!(
        request,
        ModifyOperatorLogic {
            operator,
            config,
            is_source
        }
    );
    ctx.executor()
        .modify(&ctx.registry, &operator, &config, is_source)?;
    Ok(ControlReturnValue::Empty)
}

pub(super) fn open_executor(
    ctx: &mut Context,
    _request: ControlRequest,
) -> WorkerResult<ControlReturnValue> {
    ctx.executor().open()?;
    Ok(ControlReturnValue::Empty)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::super::testing::{call, ok};
    use crate::context::test_context;
    use crate::model::messages::ControlRequest;
    use crate::model::tuple::Tuple;
    use crate::model::WorkerState;

    fn init(operator: &str, config: serde_json::Value) -> ControlRequest {
        ControlRequest::InitializeExecutor {
            operator: operator.to_owned(),
            config,
            is_source: false,
        }
    }

    #[test]
    fn initializing_makes_the_worker_ready() {
        let mut ctx = test_context("me");
        ok(&mut ctx, init("echo", json!(null)));
        ok(&mut ctx, ControlRequest::OpenExecutor);
        assert_eq!(ctx.state_manager.get_current_state(), WorkerState::Ready);
        assert_eq!(ctx.executor().operator_name(), Some("echo"));
    }

    #[test]
    fn unknown_operator_leaves_worker_uninitialized() {
        let mut ctx = test_context("me");
        assert!(call(&mut ctx, init("missing", json!(null))).is_err());
        assert_eq!(
            ctx.state_manager.get_current_state(),
            WorkerState::Uninitialized
        );
        assert!(call(&mut ctx, ControlRequest::OpenExecutor).is_err());
    }

    #[test]
    fn modify_keeps_operator_state() {
        let mut ctx = test_context("me");
        ok(&mut ctx, init("count", json!(null)));
        {
            let mut executor = ctx.executor();
            let (operator, op_ctx) = executor.operator_mut().unwrap();
            operator.process_tuple(Tuple::new(), 0, op_ctx).unwrap();
            operator.process_tuple(Tuple::new(), 0, op_ctx).unwrap();
        }
        ok(
            &mut ctx,
            ControlRequest::ModifyOperatorLogic {
                operator: "count".to_owned(),
                config: json!({"field": "n"}),
                is_source: false,
            },
        );
        let mut executor = ctx.executor();
        let (operator, op_ctx) = executor.operator_mut().unwrap();
        let found = crate::operators::collect(operator.on_finish(0, op_ctx));
        assert_eq!(found, vec![Tuple::new().with("n", 2_i64)]);
    }
}
