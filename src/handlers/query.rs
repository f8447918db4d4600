use crate::context::Context;
use crate::errors::WorkerResult;
use crate::model::messages::{
    ControlRequest, ControlReturnValue, SelfWorkloadMetrics, WorkerMetrics,
};

pub(super) fn query_statistics(
    ctx: &mut Context,
    _request: ControlRequest,
) -> WorkerResult<ControlReturnValue> {
    Ok(ControlReturnValue::WorkerMetrics(WorkerMetrics {
        worker_state: ctx.state_manager.get_current_state(),
        worker_statistics: ctx.statistics_manager.get_statistics(),
    }))
}

pub(super) fn query_self_workload_metrics(
    ctx: &mut Context,
    _request: ControlRequest,
) -> WorkerResult<ControlReturnValue> {
    Ok(ControlReturnValue::WorkloadMetrics(SelfWorkloadMetrics {
        unprocessed_data_input_queue_size: ctx.input_queue.len_data(),
        unprocessed_control_input_queue_size: ctx.input_queue.len_control(),
        pending_data_output_queue_size: ctx.output_queue.len_data(),
        pending_control_output_queue_size: ctx.output_queue.len_control(),
    }))
}

#[cfg(test)]
mod tests {
    use super::super::testing::ok;
    use crate::context::test_context;
    use crate::managers::statistics::UNKNOWN_DURATION;
    use crate::model::messages::{ControlRequest, ControlReturnValue, DataElement, DataPayload};
    use crate::model::{ChannelIdentity, WorkerState};

    #[test]
    fn statistics_before_start_use_sentinels() {
        let mut ctx = test_context("me");
        match ok(&mut ctx, ControlRequest::QueryStatistics) {
            ControlReturnValue::WorkerMetrics(metrics) => {
                assert_eq!(metrics.worker_state, WorkerState::Uninitialized);
                assert_eq!(metrics.worker_statistics.idle_time, UNKNOWN_DURATION);
                assert!(metrics.worker_statistics.input_tuple_count.is_empty());
            }
            other => panic!("unexpected return {other:?}"),
        }
    }

    #[test]
    fn workload_counts_queued_elements() {
        let mut ctx = test_context("me");
        for _ in 0..2 {
            ctx.input_queue.put_data(DataElement {
                tag: ChannelIdentity::data("up", "me"),
                payload: DataPayload::EndOfUpstream,
            });
        }
        ctx.notify_controller(ControlRequest::WorkerExecutionCompleted);
        match ok(&mut ctx, ControlRequest::QuerySelfWorkloadMetrics) {
            ControlReturnValue::WorkloadMetrics(metrics) => {
                assert_eq!(metrics.unprocessed_data_input_queue_size, 2);
                assert_eq!(metrics.unprocessed_control_input_queue_size, 0);
                assert_eq!(metrics.pending_data_output_queue_size, 0);
                assert_eq!(metrics.pending_control_output_queue_size, 1);
            }
            other => panic!("unexpected return {other:?}"),
        }
    }
}
