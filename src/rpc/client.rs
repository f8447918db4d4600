use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::model::messages::{
    ControlElement, ControlError, ControlInvocation, ControlPayload, ControlRequest,
    ControlReturnValue, ReturnInvocation, NO_REPLY_COMMAND_ID,
};
use crate::model::{ActorVirtualIdentity, ChannelIdentity};
use crate::queue::InternalQueue;

type Reply = Result<ControlReturnValue, ControlError>;

/// The eventual answer to a call made with [`AsyncRpcClient::send`].
#[derive(Debug)]
pub struct ReplyHandle {
    rx: oneshot::Receiver<Reply>,
}

impl ReplyHandle {
    /// The reply if it already arrived.
    pub fn try_result(&mut self) -> Option<Reply> {
        self.rx.try_recv().ok()
    }

    /// Block the current thread until the reply arrives. Returns
    /// [`None`] if the client was dropped first.
    ///
    /// Must not be called from inside an async runtime.
    pub fn wait(self) -> Option<Reply> {
        self.rx.blocking_recv().ok()
    }

    /// Wait for the reply without blocking a thread.
    pub async fn result(self) -> Option<Reply> {
        self.rx.await.ok()
    }
}

/// Correlates outbound calls with their replies.
///
/// Sequence numbers start at 0 and grow independently for every
/// receiver. A call stays pending until its reply arrives; there is
/// no timeout.
pub struct AsyncRpcClient {
    worker_id: ActorVirtualIdentity,
    output_queue: Arc<InternalQueue>,
    next_seq: HashMap<ActorVirtualIdentity, i64>,
    pending: HashMap<(ActorVirtualIdentity, i64), oneshot::Sender<Reply>>,
}

impl AsyncRpcClient {
    pub fn new(worker_id: ActorVirtualIdentity, output_queue: Arc<InternalQueue>) -> Self {
        Self {
            worker_id,
            output_queue,
            next_seq: HashMap::new(),
            pending: HashMap::new(),
        }
    }

    fn enqueue(&self, to: &ActorVirtualIdentity, invocation: ControlInvocation) {
        self.output_queue.put_control(ControlElement {
            tag: ChannelIdentity::control(self.worker_id.clone(), to.clone()),
            payload: ControlPayload::Invocation(invocation),
        });
    }

    /// Send `request` to `to` and return a handle to its reply
    /// immediately.
    pub fn send(&mut self, to: &ActorVirtualIdentity, request: ControlRequest) -> ReplyHandle {
        let seq = self.next_seq.entry(to.clone()).or_insert(0);
        let command_id = *seq;
        *seq += 1;

        let (tx, rx) = oneshot::channel();
        self.pending.insert((to.clone(), command_id), tx);
        tracing::trace!(
            "{} calling {} on {to} as #{command_id}",
            self.worker_id,
            request.method_name()
        );
        self.enqueue(
            to,
            ControlInvocation::new(request, self.worker_id.clone(), command_id),
        );
        ReplyHandle { rx }
    }

    /// Send `request` to `to` without asking for a reply.
    pub fn send_one_way(&mut self, to: &ActorVirtualIdentity, request: ControlRequest) {
        self.enqueue(
            to,
            ControlInvocation::new(request, self.worker_id.clone(), NO_REPLY_COMMAND_ID),
        );
    }

    /// Resolve the call a reply from `from` belongs to.
    ///
    /// Replies that match nothing pending are dropped.
    pub fn receive(&mut self, from: &ActorVirtualIdentity, reply: ReturnInvocation) {
        match self.pending.remove(&(from.clone(), reply.command_id)) {
            Some(tx) => {
                // The caller may have stopped caring about the reply.
                let _ = tx.send(reply.return_value.into_result());
            }
            None => tracing::warn!(
                "{} dropping reply #{} from {from} which matches no pending call",
                self.worker_id,
                reply.command_id
            ),
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::messages::ControlReturn;
    use crate::model::WorkerState;
    use crate::queue::InternalQueueElement;

    fn sent(queue: &InternalQueue) -> ControlInvocation {
        match queue.get_control() {
            InternalQueueElement::Control(ControlElement {
                payload: ControlPayload::Invocation(invocation),
                ..
            }) => invocation,
            other => panic!("unexpected element {other:?}"),
        }
    }

    #[test]
    fn round_trip_resolves_once() {
        let queue = Arc::new(InternalQueue::new());
        let mut client = AsyncRpcClient::new("W1".into(), queue.clone());
        let w2 = ActorVirtualIdentity::from("W2");

        let mut handle = client.send(&w2, ControlRequest::QueryStatistics);
        let invocation = sent(&queue);
        assert_eq!(invocation.command_id, 0);
        assert_eq!(invocation.method_name, "QueryStatistics");
        assert_eq!(invocation.context.sender, ActorVirtualIdentity::from("W1"));
        assert!(handle.try_result().is_none());

        let value = ControlReturnValue::WorkerState(WorkerState::Running);
        let reply = ReturnInvocation {
            command_id: 0,
            return_value: ControlReturn::Value(value.clone()),
        };
        client.receive(&w2, reply.clone());
        assert_eq!(handle.try_result(), Some(Ok(value)));
        assert_eq!(client.pending_len(), 0);

        // A duplicate is a no-op.
        client.receive(&w2, reply);
        assert_eq!(client.pending_len(), 0);
    }

    #[test]
    fn sequences_are_per_receiver() {
        let queue = Arc::new(InternalQueue::new());
        let mut client = AsyncRpcClient::new("W1".into(), queue.clone());
        let _a0 = client.send(&"A".into(), ControlRequest::NoOperation);
        let _a1 = client.send(&"A".into(), ControlRequest::NoOperation);
        let _b0 = client.send(&"B".into(), ControlRequest::NoOperation);
        let ids: Vec<i64> = (0..3).map(|_| sent(&queue).command_id).collect();
        assert_eq!(ids, vec![0, 1, 0]);
        assert_eq!(client.pending_len(), 3);
    }

    #[test]
    fn reply_from_wrong_peer_is_ignored() {
        let queue = Arc::new(InternalQueue::new());
        let mut client = AsyncRpcClient::new("W1".into(), queue);
        let mut handle = client.send(&"A".into(), ControlRequest::NoOperation);
        client.receive(
            &"B".into(),
            ReturnInvocation {
                command_id: 0,
                return_value: ControlReturn::Value(ControlReturnValue::Empty),
            },
        );
        assert!(handle.try_result().is_none());
        assert_eq!(client.pending_len(), 1);
    }

    #[test]
    fn one_way_calls_are_not_tracked() {
        let queue = Arc::new(InternalQueue::new());
        let mut client = AsyncRpcClient::new("W1".into(), queue.clone());
        client.send_one_way(&"CONTROLLER".into(), ControlRequest::WorkerExecutionCompleted);
        let invocation = sent(&queue);
        assert!(!invocation.expects_reply());
        assert_eq!(client.pending_len(), 0);
    }

    #[test]
    fn errors_resolve_as_errors() {
        let queue = Arc::new(InternalQueue::new());
        let mut client = AsyncRpcClient::new("W1".into(), queue);
        let handle = client.send(&"A".into(), ControlRequest::NoOperation);
        let err = crate::errors::control_error(&"boom");
        client.receive(
            &"A".into(),
            ReturnInvocation {
                command_id: 0,
                return_value: ControlReturn::Error(err.clone()),
            },
        );
        assert_eq!(handle.wait(), Some(Err(err)));
    }
}
