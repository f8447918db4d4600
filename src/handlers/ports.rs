//! Wiring of ports, channels and links.

use crate::context::Context;
use crate::errors::WorkerResult;
use crate::expect_request;
use crate::model::messages::{ControlRequest, ControlReturnValue};
use crate::model::ChannelIdentity;

pub(super) fn add_input_channel(
    ctx: &mut Context,
    request: ControlRequest,
) -> WorkerResult<ControlReturnValue> {
    let (channel_id, port_id) = expect_request!(request, AddInputChannel { channel_id, port_id });
    ctx.input_manager.register_input(channel_id, port_id)?;
    Ok(ControlReturnValue::Empty)
}

/// Output ports without their own storage URI use the configured
/// default. The first output port assigned fixes the schema operator
/// output is cast to.
pub(super) fn assign_port(
    ctx: &mut Context,
    request: ControlRequest,
) -> WorkerResult<ControlReturnValue> {
    let (port_id, input, schema, storage_uri) = expect_request!(
        request,
        AssignPort {
            port_id,
            input,
            schema,
            storage_uri
        }
    );
    if input {
        ctx.input_manager.add_input_port(port_id, schema);
    } else {
        let storage_uri = storage_uri.or_else(|| ctx.config.storage_uri.clone());
        let mut executor = ctx.executor();
        if executor.output_schema().is_none() {
            executor.set_output_schema(schema.clone());
        }
        drop(executor);
        ctx.output_manager
            .add_output_port(port_id, schema, storage_uri);
    }
    Ok(ControlReturnValue::Empty)
}

pub(super) fn add_partitioning(
    ctx: &mut Context,
    request: ControlRequest,
) -> WorkerResult<ControlReturnValue> {
    let (tag, partitioning) = expect_request!(request, AddPartitioning { tag, partitioning });
    ctx.output_manager.add_partitioning(tag, &partitioning)?;
    Ok(ControlReturnValue::Empty)
}

/// An upstream worker now feeds one of our input ports.
pub(super) fn update_input_linking(
    ctx: &mut Context,
    request: ControlRequest,
) -> WorkerResult<ControlReturnValue> {
    let (identifier, input_link) =
        expect_request!(request, UpdateInputLinking { identifier, input_link });
    let channel_id = ChannelIdentity::data(identifier, ctx.worker_id.clone());
    ctx.input_manager
        .register_input(channel_id, input_link.to_port)?;
    Ok(ControlReturnValue::Empty)
}
