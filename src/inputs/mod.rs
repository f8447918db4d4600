//! Receiving side of the data plane.
//!
//! Architecture
//! ------------
//!
//! A worker has some number of input ports. Each port is fed by one
//! or more upstream channels and carries a [`Schema`]. The
//! [`InputManager`] turns each `(channel, payload)` unit it is handed
//! into a flat sequence of [`InputItem`]s: tuples annotated with their
//! port's schema, interleaved with [`InternalMarker`]s that tell the
//! main loop about channel and port boundaries.
//!
//! Completion is tracked per channel. A port is complete once all its
//! channels are, and the worker's inputs are exhausted once every port
//! is. Each of those boundaries is reported exactly once.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::{WorkerError, WorkerResult};
use crate::model::messages::DataPayload;
use crate::model::tuple::{Schema, Tuple};
use crate::model::{ActorVirtualIdentity, ChannelIdentity, InternalMarker, PortIdentity};

/// Per-channel state.
#[derive(Debug, Clone)]
pub struct Channel {
    pub port_id: PortIdentity,
    pub completed: bool,
}

#[derive(Debug, Clone)]
pub struct WorkerPort {
    pub schema: Arc<Schema>,
    pub channels: Vec<ChannelIdentity>,
    started: bool,
    exhausted: bool,
}

impl WorkerPort {
    fn new(schema: Schema) -> Self {
        Self {
            schema: Arc::new(schema),
            channels: Vec::new(),
            started: false,
            exhausted: false,
        }
    }
}

/// One unit produced while unpacking a payload.
#[derive(Debug, Clone, PartialEq)]
pub enum InputItem {
    Tuple(Tuple),
    Marker(InternalMarker),
}

pub struct InputManager {
    worker_id: ActorVirtualIdentity,
    ports: BTreeMap<PortIdentity, WorkerPort>,
    channels: HashMap<ChannelIdentity, Channel>,
    current_channel: Option<ChannelIdentity>,
    outputs_started: bool,
    all_exhausted: bool,
}

impl InputManager {
    pub fn new(worker_id: ActorVirtualIdentity) -> Self {
        Self {
            worker_id,
            ports: BTreeMap::new(),
            channels: HashMap::new(),
            current_channel: None,
            outputs_started: false,
            all_exhausted: false,
        }
    }

    /// Create a port. The first registration of a port wins.
    pub fn add_input_port(&mut self, port_id: PortIdentity, schema: Schema) {
        self.ports.entry(port_id).or_insert_with(|| {
            tracing::debug!("worker {} adding input port {port_id}", self.worker_id);
            WorkerPort::new(schema)
        });
    }

    /// Bind a channel to an existing port.
    pub fn register_input(
        &mut self,
        channel_id: ChannelIdentity,
        port_id: PortIdentity,
    ) -> WorkerResult<()> {
        let port = self
            .ports
            .get_mut(&port_id)
            .ok_or(WorkerError::UnknownPort(port_id))?;
        if !port.channels.contains(&channel_id) {
            port.channels.push(channel_id.clone());
        }
        self.channels.entry(channel_id).or_insert(Channel {
            port_id,
            completed: false,
        });
        Ok(())
    }

    pub fn get_port(&self, port_id: &PortIdentity) -> Option<&WorkerPort> {
        self.ports.get(port_id)
    }

    pub fn get_port_id(&self, channel_id: &ChannelIdentity) -> Option<PortIdentity> {
        self.channels.get(channel_id).map(|channel| channel.port_id)
    }

    /// Every channel bound to a port, in registration order.
    pub fn port_channels(&self, port_id: &PortIdentity) -> Vec<ChannelIdentity> {
        self.ports
            .get(port_id)
            .map(|port| port.channels.clone())
            .unwrap_or_default()
    }

    /// Every registered data channel.
    pub fn data_channels(&self) -> Vec<ChannelIdentity> {
        let mut channels: Vec<_> = self
            .channels
            .keys()
            .filter(|channel| !channel.is_control)
            .cloned()
            .collect();
        channels.sort();
        channels
    }

    pub fn current_channel(&self) -> Option<&ChannelIdentity> {
        self.current_channel.as_ref()
    }

    pub fn is_port_completed(&self, port_id: &PortIdentity) -> bool {
        self.ports.get(port_id).map_or(false, |port| {
            port.channels
                .iter()
                .all(|channel| self.channels.get(channel).map_or(false, |c| c.completed))
        })
    }

    fn all_ports_completed(&self) -> bool {
        self.ports.keys().all(|port_id| self.is_port_completed(port_id))
    }

    /// Unpack one payload received on `from`.
    ///
    /// The reserved source starter sender stands for an upstream that
    /// is already exhausted and is how source operators get going.
    ///
    /// A rejected payload leaves the manager untouched.
    pub fn process_data_payload(
        &mut self,
        from: &ChannelIdentity,
        payload: DataPayload,
    ) -> WorkerResult<Vec<InputItem>> {
        if let DataPayload::Embedded(_) = payload {
            return Err(WorkerError::UnsupportedPayload(payload.kind().to_owned()));
        }
        let mut items = Vec::new();

        if from.from.is_source_starter() {
            if !self.outputs_started {
                self.outputs_started = true;
                items.push(InputItem::Marker(InternalMarker::StartOfOutputPorts));
            }
            if !self.all_exhausted {
                self.all_exhausted = true;
                items.push(InputItem::Marker(InternalMarker::EndOfInputPort(
                    PortIdentity::default(),
                )));
                items.push(InputItem::Marker(InternalMarker::EndOfOutputPorts));
            }
            return Ok(items);
        }

        let port_id = self
            .get_port_id(from)
            .ok_or_else(|| WorkerError::UnknownChannel(from.clone()))?;
        if !self.ports.contains_key(&port_id) {
            return Err(WorkerError::UnknownPort(port_id));
        }

        if self.current_channel.as_ref() != Some(from) {
            self.current_channel = Some(from.clone());
            items.push(InputItem::Marker(InternalMarker::SenderChange(from.clone())));
        }
        if !self.outputs_started {
            self.outputs_started = true;
            items.push(InputItem::Marker(InternalMarker::StartOfOutputPorts));
        }
        let port = self
            .ports
            .get_mut(&port_id)
            .ok_or(WorkerError::UnknownPort(port_id))?;
        if !port.started {
            port.started = true;
            items.push(InputItem::Marker(InternalMarker::StartOfInputPort(port_id)));
        }

        match payload {
            DataPayload::DataFrame(frame) => {
                let schema = port.schema.clone();
                items.extend(
                    frame
                        .rows()
                        .map(|tuple| InputItem::Tuple(tuple.with_schema(schema.clone()))),
                );
            }
            DataPayload::StartOfUpstream => {}
            DataPayload::EndOfUpstream => {
                if let Some(channel) = self.channels.get_mut(from) {
                    channel.completed = true;
                }
                let port_done = self.is_port_completed(&port_id);
                if let Some(port) = self.ports.get_mut(&port_id) {
                    if port_done && !port.exhausted {
                        port.exhausted = true;
                        items.push(InputItem::Marker(InternalMarker::EndOfInputPort(port_id)));
                    }
                }
                if !self.all_exhausted && self.all_ports_completed() {
                    self.all_exhausted = true;
                    items.push(InputItem::Marker(InternalMarker::EndOfOutputPorts));
                }
            }
            DataPayload::Embedded(_) => {}
        }
        Ok(items)
    }
}
