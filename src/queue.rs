//! The queue shared between the network layer and the main loop.
//!
//! Logically two lanes behind one lock: a higher priority control
//! lane and a lower priority data lane that can be disabled. Any
//! number of producers may [`InternalQueue::put`]; a single consumer
//! takes elements out.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::model::messages::{ControlElement, DataElement};

#[derive(Debug, Clone, PartialEq)]
pub enum InternalQueueElement {
    Data(DataElement),
    Control(ControlElement),
    /// Ask the consumer to exit. Travels on the control lane.
    Stop,
}

#[derive(Default)]
struct Lanes {
    control: VecDeque<InternalQueueElement>,
    data: VecDeque<InternalQueueElement>,
    data_disabled: bool,
}

impl Lanes {
    fn pop(&mut self, control_only: bool) -> Option<InternalQueueElement> {
        if let Some(element) = self.control.pop_front() {
            return Some(element);
        }
        if control_only || self.data_disabled {
            return None;
        }
        self.data.pop_front()
    }
}

#[derive(Default)]
pub struct InternalQueue {
    lanes: Mutex<Lanes>,
    available: Condvar,
}

impl InternalQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Lanes> {
        self.lanes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn put(&self, element: InternalQueueElement) {
        let mut lanes = self.lock();
        match element {
            InternalQueueElement::Data(_) => lanes.data.push_back(element),
            _ => lanes.control.push_back(element),
        }
        self.available.notify_all();
    }

    pub fn put_data(&self, element: DataElement) {
        self.put(InternalQueueElement::Data(element));
    }

    pub fn put_control(&self, element: ControlElement) {
        self.put(InternalQueueElement::Control(element));
    }

    /// Block until a control element, or a data element while the data
    /// lane is enabled, is available. Control always wins.
    pub fn get(&self) -> InternalQueueElement {
        self.blocking_pop(false)
    }

    /// Block until a control element is available, ignoring data.
    pub fn get_control(&self) -> InternalQueueElement {
        self.blocking_pop(true)
    }

    /// Like [`InternalQueue::get`] but gives up after `timeout`.
    pub fn get_timeout(&self, timeout: Duration) -> Option<InternalQueueElement> {
        self.timed_pop(false, timeout)
    }

    fn blocking_pop(&self, control_only: bool) -> InternalQueueElement {
        let mut lanes = self.lock();
        loop {
            if let Some(element) = lanes.pop(control_only) {
                return element;
            }
            lanes = self
                .available
                .wait(lanes)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn timed_pop(&self, control_only: bool, timeout: Duration) -> Option<InternalQueueElement> {
        let deadline = Instant::now() + timeout;
        let mut lanes = self.lock();
        loop {
            if let Some(element) = lanes.pop(control_only) {
                return Some(element);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            lanes = self
                .available
                .wait_timeout(lanes, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    pub fn disable_data(&self) {
        self.lock().data_disabled = true;
    }

    pub fn enable_data(&self) {
        let mut lanes = self.lock();
        lanes.data_disabled = false;
        self.available.notify_all();
    }

    pub fn is_data_enabled(&self) -> bool {
        !self.lock().data_disabled
    }

    pub fn is_control_empty(&self) -> bool {
        self.lock().control.is_empty()
    }

    pub fn is_data_empty(&self) -> bool {
        self.lock().data.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        let lanes = self.lock();
        lanes.control.is_empty() && lanes.data.is_empty()
    }

    pub fn len_control(&self) -> usize {
        self.lock().control.len()
    }

    pub fn len_data(&self) -> usize {
        self.lock().data.len()
    }

    pub fn len(&self) -> usize {
        let lanes = self.lock();
        lanes.control.len() + lanes.data.len()
    }
}
