use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::errors::{control_error, panic_message, WorkerError, WorkerResult};
use crate::model::messages::{
    ControlElement, ControlInvocation, ControlPayload, ControlRequest, ControlReturn,
    ControlReturnValue, ReturnInvocation,
};
use crate::model::{ActorVirtualIdentity, ChannelIdentity};

/// A control command handler.
pub type Handler<C> = fn(&mut C, ControlRequest) -> WorkerResult<ControlReturnValue>;

/// Dispatches inbound invocations to handlers by method name.
///
/// Handler failures, including panics, are turned into
/// [`ControlReturn::Error`] values; nothing raised by a handler
/// escapes [`AsyncRpcServer::receive`].
pub struct AsyncRpcServer<C> {
    worker_id: ActorVirtualIdentity,
    handlers: HashMap<String, Handler<C>>,
}

impl<C> AsyncRpcServer<C> {
    /// Method names are matched case-insensitively.
    pub fn new<'a>(
        worker_id: ActorVirtualIdentity,
        handlers: impl IntoIterator<Item = (&'a str, Handler<C>)>,
    ) -> Self {
        Self {
            worker_id,
            handlers: handlers
                .into_iter()
                .map(|(name, handler)| (name.to_lowercase(), handler))
                .collect(),
        }
    }

    pub fn has_method(&self, method_name: &str) -> bool {
        self.handlers.contains_key(&method_name.to_lowercase())
    }

    /// Run the handler for `invocation` and produce the value or error
    /// it resulted in.
    pub fn execute(&self, ctx: &mut C, invocation: ControlInvocation) -> ControlReturn {
        let method = invocation.method_name.to_lowercase();
        let Some(handler) = self.handlers.get(&method) else {
            let err = WorkerError::UnknownMethod(invocation.method_name);
            tracing::error!("{}: {err}", self.worker_id);
            return ControlReturn::Error(control_error(&err));
        };
        let command = invocation.command;
        match catch_unwind(AssertUnwindSafe(|| handler(ctx, command))) {
            Ok(Ok(value)) => ControlReturn::Value(value),
            Ok(Err(err)) => {
                tracing::warn!(
                    "{} failed to handle {}: {err}",
                    self.worker_id,
                    invocation.method_name
                );
                ControlReturn::Error(control_error(&err))
            }
            Err(payload) => {
                let msg = panic_message(payload.as_ref());
                tracing::error!(
                    "{} panicked handling {}: {msg}",
                    self.worker_id,
                    invocation.method_name
                );
                ControlReturn::Error(control_error(&msg))
            }
        }
    }

    /// Handle an invocation sent by `from`.
    ///
    /// Returns the reply to send back, or [`None`] when the caller
    /// asked for no reply.
    pub fn receive(
        &self,
        ctx: &mut C,
        from: &ActorVirtualIdentity,
        invocation: ControlInvocation,
    ) -> Option<ControlElement> {
        let command_id = invocation.command_id;
        let expects_reply = invocation.expects_reply();
        tracing::trace!(
            "{} received {} #{command_id} from {from}",
            self.worker_id,
            invocation.method_name
        );
        let return_value = self.execute(ctx, invocation);
        expects_reply.then(|| ControlElement {
            tag: ChannelIdentity::control(self.worker_id.clone(), from.clone()),
            payload: ControlPayload::Return(ReturnInvocation {
                command_id,
                return_value,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::messages::NO_REPLY_COMMAND_ID;
    use crate::model::WorkerState;

    #[derive(Default)]
    struct Calls(usize);

    fn noop(calls: &mut Calls, _: ControlRequest) -> WorkerResult<ControlReturnValue> {
        calls.0 += 1;
        Ok(ControlReturnValue::WorkerState(WorkerState::Ready))
    }

    fn failing(_: &mut Calls, _: ControlRequest) -> WorkerResult<ControlReturnValue> {
        Err(WorkerError::OperatorNotInitialized)
    }

    fn panicking(_: &mut Calls, _: ControlRequest) -> WorkerResult<ControlReturnValue> {
        panic!("handler blew up")
    }

    fn server() -> AsyncRpcServer<Calls> {
        AsyncRpcServer::new(
            "W1".into(),
            [
                ("NoOperation", noop as Handler<Calls>),
                ("EndWorker", failing),
                ("PauseWorker", panicking),
            ],
        )
    }

    fn invoke(request: ControlRequest, command_id: i64) -> ControlInvocation {
        ControlInvocation::new(request, ActorVirtualIdentity::controller(), command_id)
    }

    fn reply_of(element: ControlElement) -> ReturnInvocation {
        match element.payload {
            ControlPayload::Return(reply) => reply,
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn success_is_returned_to_sender() {
        let mut calls = Calls::default();
        let element = server()
            .receive(
                &mut calls,
                &ActorVirtualIdentity::controller(),
                invoke(ControlRequest::NoOperation, 7),
            )
            .unwrap();
        assert_eq!(element.tag, ChannelIdentity::control("W1", "CONTROLLER"));
        let reply = reply_of(element);
        assert_eq!(reply.command_id, 7);
        assert_eq!(
            reply.return_value,
            ControlReturn::Value(ControlReturnValue::WorkerState(WorkerState::Ready))
        );
        assert_eq!(calls.0, 1);
    }

    #[test]
    fn method_names_are_case_insensitive() {
        let mut calls = Calls::default();
        let mut invocation = invoke(ControlRequest::NoOperation, 1);
        invocation.method_name = "NOOPERATION".to_owned();
        let reply = reply_of(
            server()
                .receive(&mut calls, &"C".into(), invocation)
                .unwrap(),
        );
        assert!(matches!(reply.return_value, ControlReturn::Value(_)));
    }

    #[test]
    fn errors_and_panics_become_values() {
        let mut calls = Calls::default();
        let server = server();
        for request in [ControlRequest::EndWorker, ControlRequest::PauseWorker] {
            let reply = reply_of(
                server
                    .receive(&mut calls, &"C".into(), invoke(request, 0))
                    .unwrap(),
            );
            assert!(matches!(reply.return_value, ControlReturn::Error(_)));
        }
    }

    #[test]
    fn unknown_method_is_an_error_value() {
        let mut calls = Calls::default();
        let reply = reply_of(
            server()
                .receive(&mut calls, &"C".into(), invoke(ControlRequest::StartWorker, 0))
                .unwrap(),
        );
        match reply.return_value {
            ControlReturn::Error(err) => {
                assert_eq!(err.error_message, "unknown control method StartWorker")
            }
            other => panic!("unexpected return {other:?}"),
        }
    }

    #[test]
    fn no_reply_sentinel_suppresses_reply() {
        let mut calls = Calls::default();
        let found = server().receive(
            &mut calls,
            &"C".into(),
            invoke(ControlRequest::NoOperation, NO_REPLY_COMMAND_ID),
        );
        assert!(found.is_none());
        assert_eq!(calls.0, 1);
    }
}
