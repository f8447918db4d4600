use std::collections::VecDeque;

use chrono::Utc;

use crate::model::messages::{ConsoleMessage, ConsoleMessageType};

/// Buffers console output until it is worth a round trip to the
/// controller.
#[derive(Debug)]
pub struct ConsoleMessageManager {
    worker_id: String,
    flush_threshold: usize,
    buffer: VecDeque<ConsoleMessage>,
}

impl ConsoleMessageManager {
    pub fn new(worker_id: impl Into<String>, flush_threshold: usize) -> Self {
        Self {
            worker_id: worker_id.into(),
            flush_threshold: flush_threshold.max(1),
            buffer: VecDeque::new(),
        }
    }

    /// Buffer a message stamped with the current time.
    pub fn put(
        &mut self,
        msg_type: ConsoleMessageType,
        source: impl Into<String>,
        title: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.put_message(ConsoleMessage {
            worker_id: self.worker_id.clone(),
            timestamp: Utc::now(),
            msg_type,
            source: source.into(),
            title: title.into(),
            message: message.into(),
        });
    }

    pub fn put_message(&mut self, message: ConsoleMessage) {
        self.buffer.push_back(message);
    }

    /// Take every buffered message if `force` is set or the buffer
    /// reached the threshold, otherwise nothing.
    pub fn flush(&mut self, force: bool) -> Vec<ConsoleMessage> {
        if force || self.buffer.len() >= self.flush_threshold {
            self.buffer.drain(..).collect()
        } else {
            Vec::new()
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

#[test]
fn flushes_at_threshold_or_when_forced() {
    let mut console = ConsoleMessageManager::new("w0", 2);
    console.put(ConsoleMessageType::Print, "op", "", "one");
    assert!(console.flush(false).is_empty());

    console.put(ConsoleMessageType::Print, "op", "", "two");
    let flushed = console.flush(false);
    assert_eq!(
        flushed.iter().map(|m| m.message.as_str()).collect::<Vec<_>>(),
        ["one", "two"]
    );
    assert!(flushed.iter().all(|m| m.worker_id == "w0"));
    assert!(console.is_empty());

    console.put(ConsoleMessageType::Error, "op", "oops", "three");
    assert_eq!(console.flush(true).len(), 1);
}
