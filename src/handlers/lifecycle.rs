//! Starting, pausing and ending a worker.

use crate::context::Context;
use crate::errors::{WorkerError, WorkerResult};
use crate::expect_request;
use crate::model::messages::{ControlRequest, ControlReturnValue, DataElement, DataPayload};
use crate::model::{ActorVirtualIdentity, ChannelIdentity, PauseType, WorkerState};

fn current_state(ctx: &Context) -> ControlReturnValue {
    ControlReturnValue::WorkerState(ctx.state_manager.get_current_state())
}

/// Sources have no upstream, so they are started by a synthetic
/// end-of-upstream from the source starter.
pub(super) fn start_worker(
    ctx: &mut Context,
    _request: ControlRequest,
) -> WorkerResult<ControlReturnValue> {
    if ctx.executor().is_source() {
        ctx.state_manager.assert_state(WorkerState::Ready)?;
        ctx.state_manager.transit_to(WorkerState::Running, false)?;
        ctx.statistics_manager.initialize_worker_start_time();
        ctx.input_queue.put_data(DataElement {
            tag: ChannelIdentity::data(
                ActorVirtualIdentity::source_starter(),
                ctx.worker_id.clone(),
            ),
            payload: DataPayload::EndOfUpstream,
        });
    }
    Ok(current_state(ctx))
}

pub(super) fn pause_worker(
    ctx: &mut Context,
    _request: ControlRequest,
) -> WorkerResult<ControlReturnValue> {
    ctx.pause(PauseType::UserPause);
    Ok(current_state(ctx))
}

pub(super) fn resume_worker(
    ctx: &mut Context,
    _request: ControlRequest,
) -> WorkerResult<ControlReturnValue> {
    ctx.resume(PauseType::UserPause);
    Ok(current_state(ctx))
}

pub(super) fn scheduler_time_slot_event(
    ctx: &mut Context,
    request: ControlRequest,
) -> WorkerResult<ControlReturnValue> {
    let (time_slot_expired,) = expect_request!(request, SchedulerTimeSlotEvent { time_slot_expired });
    if time_slot_expired {
        ctx.pause(PauseType::SchedulerTimeSlotExpiredPause);
    } else {
        ctx.resume(PauseType::SchedulerTimeSlotExpiredPause);
    }
    Ok(ControlReturnValue::Empty)
}

/// Succeeds only once nothing is left to process.
pub(super) fn end_worker(
    ctx: &mut Context,
    _request: ControlRequest,
) -> WorkerResult<ControlReturnValue> {
    let remaining = ctx.input_queue.len() + ctx.pending_inputs.len();
    if remaining > 0 {
        return Err(WorkerError::QueueNotDrained { remaining });
    }
    Ok(ControlReturnValue::Empty)
}

pub(super) fn no_operation(
    _ctx: &mut Context,
    _request: ControlRequest,
) -> WorkerResult<ControlReturnValue> {
    Ok(ControlReturnValue::Empty)
}
