//! Sending side of the data plane.
//!
//! Architecture
//! ------------
//!
//! The [`OutputManager`] mirrors [`crate::inputs::InputManager`]. It
//! owns one [`Partitioner`] per downstream link and fans every
//! produced tuple and marker out to all of them. What comes back is a
//! list of [`DataElement`]s ready to be put on the wire, each tagged
//! with the data channel from this worker to its receiver.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::errors::WorkerResult;
use crate::model::messages::{DataElement, DataPayload, Partitioning};
use crate::model::tuple::{DataFrame, Schema, Tuple};
use crate::model::{ActorVirtualIdentity, ChannelIdentity, PhysicalLink, PortIdentity};
use crate::partitioners::{self, Partitioner, PartitionerOutput};

#[derive(Debug, Clone)]
pub struct OutputPort {
    pub schema: Arc<Schema>,
    /// Where results of this port are persisted, if anywhere.
    pub storage_uri: Option<String>,
}

pub struct OutputManager {
    worker_id: ActorVirtualIdentity,
    partitioners: Vec<(PhysicalLink, Box<dyn Partitioner>)>,
    ports: BTreeMap<PortIdentity, OutputPort>,
}

impl OutputManager {
    pub fn new(worker_id: ActorVirtualIdentity) -> Self {
        Self {
            worker_id,
            partitioners: Vec::new(),
            ports: BTreeMap::new(),
        }
    }

    /// Register how tuples are routed over `link`. Registering the
    /// same link again replaces its partitioner.
    pub fn add_partitioning(
        &mut self,
        link: PhysicalLink,
        partitioning: &Partitioning,
    ) -> WorkerResult<()> {
        let partitioner = partitioners::build(&self.worker_id, partitioning)?;
        tracing::debug!(
            "worker {} routes {link} to {:?}",
            self.worker_id,
            partitioner.receivers()
        );
        match self.partitioners.iter_mut().find(|(known, _)| *known == link) {
            Some((_, slot)) => *slot = partitioner,
            None => self.partitioners.push((link, partitioner)),
        }
        Ok(())
    }

    /// Create a port. The first registration of a port wins.
    pub fn add_output_port(
        &mut self,
        port_id: PortIdentity,
        schema: Schema,
        storage_uri: Option<String>,
    ) {
        self.ports.entry(port_id).or_insert_with(|| OutputPort {
            schema: Arc::new(schema),
            storage_uri,
        });
    }

    pub fn get_port(&self, port_id: &PortIdentity) -> Option<&OutputPort> {
        self.ports.get(port_id)
    }

    pub fn port_ids(&self) -> impl Iterator<Item = &PortIdentity> {
        self.ports.keys()
    }

    pub fn has_partitioners(&self) -> bool {
        !self.partitioners.is_empty()
    }

    fn element(&self, receiver: ActorVirtualIdentity, payload: DataPayload) -> DataElement {
        DataElement {
            tag: ChannelIdentity::data(self.worker_id.clone(), receiver),
            payload,
        }
    }

    /// Route one produced tuple. Returns the batches that are ready.
    pub fn emit(&mut self, tuple: Tuple) -> Vec<DataElement> {
        let mut batches = Vec::new();
        let last = self.partitioners.len().saturating_sub(1);
        let mut tuple = Some(tuple);
        for (i, (_, partitioner)) in self.partitioners.iter_mut().enumerate() {
            let item = if i == last {
                tuple.take()
            } else {
                tuple.clone()
            };
            if let Some(item) = item {
                batches.extend(partitioner.add_tuple_to_batch(item));
            }
        }
        batches
            .into_iter()
            .map(|(receiver, batch)| {
                self.element(
                    receiver,
                    DataPayload::DataFrame(DataFrame::from_tuples(batch)),
                )
            })
            .collect()
    }

    /// Flush every partitioner and send `marker` to every receiver.
    pub fn emit_marker(&mut self, marker: &DataPayload) -> Vec<DataElement> {
        let flushed: Vec<_> = self
            .partitioners
            .iter_mut()
            .flat_map(|(_, partitioner)| partitioner.flush(marker))
            .collect();
        flushed
            .into_iter()
            .map(|(receiver, output)| match output {
                PartitionerOutput::Batch(batch) => self.element(
                    receiver,
                    DataPayload::DataFrame(DataFrame::from_tuples(batch)),
                ),
                PartitionerOutput::Marker(marker) => self.element(receiver, marker),
            })
            .collect()
    }
}
