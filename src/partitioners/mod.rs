//! Routing of produced tuples to downstream workers.
//!
//! A partitioner owns one buffer per receiver of a link. Tuples are
//! routed into buffers by a [`Route`] and a buffer is emitted as a
//! batch as soon as it holds `batch_size` tuples. Flushing emits every
//! partial buffer and then the marker to every receiver.

use crate::errors::{WorkerError, WorkerResult};
use crate::model::messages::{DataPayload, Partitioning};
use crate::model::tuple::Tuple;
use crate::model::{ActorVirtualIdentity, ChannelIdentity};

mod broadcast;
mod hash;
mod one_to_one;
mod range;
mod round_robin;

pub use broadcast::BroadcastRoute;
pub use hash::HashRoute;
pub use one_to_one::OneToOneRoute;
pub use range::RangeRoute;
pub use round_robin::RoundRobinRoute;

/// Something a partitioner sends to one receiver.
#[derive(Debug, Clone, PartialEq)]
pub enum PartitionerOutput {
    Batch(Vec<Tuple>),
    Marker(DataPayload),
}

pub trait Partitioner: Send {
    /// Route a tuple. Returns the batches that became full.
    fn add_tuple_to_batch(&mut self, tuple: Tuple) -> Vec<(ActorVirtualIdentity, Vec<Tuple>)>;

    /// Emit every partial batch followed by `marker` to every
    /// receiver.
    fn flush(&mut self, marker: &DataPayload) -> Vec<(ActorVirtualIdentity, PartitionerOutput)>;

    /// Drop buffered tuples and routing state.
    fn reset(&mut self);

    fn receivers(&self) -> &[ActorVirtualIdentity];
}

/// Picks the receivers of a tuple, by index.
pub trait Route: Send {
    fn route(&mut self, tuple: &Tuple, receivers: usize) -> Vec<usize>;

    fn reset(&mut self) {}
}

/// A [`Partitioner`] driven by a [`Route`].
pub struct RoutedPartitioner<R> {
    route: R,
    batch_size: usize,
    receivers: Vec<ActorVirtualIdentity>,
    buffers: Vec<Vec<Tuple>>,
}

impl<R: Route> RoutedPartitioner<R> {
    pub fn new(route: R, batch_size: usize, receivers: Vec<ActorVirtualIdentity>) -> Self {
        let buffers = receivers.iter().map(|_| Vec::new()).collect();
        Self {
            route,
            batch_size: batch_size.max(1),
            receivers,
            buffers,
        }
    }
}

impl<R: Route> Partitioner for RoutedPartitioner<R> {
    fn add_tuple_to_batch(&mut self, tuple: Tuple) -> Vec<(ActorVirtualIdentity, Vec<Tuple>)> {
        let mut full = Vec::new();
        let targets = self.route.route(&tuple, self.receivers.len());
        let last = targets.len().saturating_sub(1);
        let mut tuple = Some(tuple);
        for (i, index) in targets.into_iter().enumerate() {
            let Some(buffer) = self.buffers.get_mut(index) else {
                tracing::warn!("route picked receiver {index} out of {}", self.receivers.len());
                continue;
            };
            // Only clone when more receivers follow.
            let item = if i == last {
                tuple.take()
            } else {
                tuple.clone()
            };
            if let Some(item) = item {
                buffer.push(item);
            }
            if buffer.len() >= self.batch_size {
                full.push((self.receivers[index].clone(), std::mem::take(buffer)));
            }
        }
        full
    }

    fn flush(&mut self, marker: &DataPayload) -> Vec<(ActorVirtualIdentity, PartitionerOutput)> {
        let mut out = Vec::new();
        for (receiver, buffer) in self.receivers.iter().zip(self.buffers.iter_mut()) {
            if !buffer.is_empty() {
                out.push((
                    receiver.clone(),
                    PartitionerOutput::Batch(std::mem::take(buffer)),
                ));
            }
        }
        for receiver in &self.receivers {
            out.push((receiver.clone(), PartitionerOutput::Marker(marker.clone())));
        }
        out
    }

    fn reset(&mut self) {
        self.route.reset();
        for buffer in &mut self.buffers {
            buffer.clear();
        }
    }

    fn receivers(&self) -> &[ActorVirtualIdentity] {
        &self.receivers
    }
}

/// Receivers of a link's channels, deduplicated, in order.
fn receivers_of(channels: &[ChannelIdentity]) -> Vec<ActorVirtualIdentity> {
    let mut receivers: Vec<ActorVirtualIdentity> = Vec::new();
    for channel in channels {
        if !receivers.contains(&channel.to) {
            receivers.push(channel.to.clone());
        }
    }
    receivers
}

fn non_empty(
    kind: &str,
    receivers: Vec<ActorVirtualIdentity>,
) -> WorkerResult<Vec<ActorVirtualIdentity>> {
    if receivers.is_empty() {
        Err(WorkerError::UnsupportedPartitioning(format!(
            "{kind} partitioning without receivers"
        )))
    } else {
        Ok(receivers)
    }
}

/// Build the partitioner for a link out of `worker_id`.
pub fn build(
    worker_id: &ActorVirtualIdentity,
    partitioning: &Partitioning,
) -> WorkerResult<Box<dyn Partitioner>> {
    Ok(match partitioning {
        Partitioning::OneToOne {
            batch_size,
            channels,
        } => {
            let receiver = channels
                .iter()
                .find(|channel| &channel.from == worker_id)
                .map(|channel| channel.to.clone())
                .ok_or_else(|| {
                    WorkerError::UnsupportedPartitioning(format!(
                        "one to one partitioning has no channel from {worker_id}"
                    ))
                })?;
            Box::new(RoutedPartitioner::new(
                OneToOneRoute,
                *batch_size,
                vec![receiver],
            ))
        }
        Partitioning::RoundRobin {
            batch_size,
            channels,
        } => Box::new(RoutedPartitioner::new(
            RoundRobinRoute::default(),
            *batch_size,
            non_empty("round robin", receivers_of(channels))?,
        )),
        Partitioning::HashBased {
            batch_size,
            channels,
            hash_attribute_names,
        } => Box::new(RoutedPartitioner::new(
            HashRoute::new(hash_attribute_names.clone()),
            *batch_size,
            non_empty("hash", receivers_of(channels))?,
        )),
        Partitioning::RangeBased {
            batch_size,
            channels,
            range_attribute_names,
            range_min,
            range_max,
        } => {
            let receivers = non_empty("range", receivers_of(channels))?;
            Box::new(RoutedPartitioner::new(
                RangeRoute::new(
                    range_attribute_names.clone(),
                    *range_min,
                    *range_max,
                    receivers.len(),
                ),
                *batch_size,
                receivers,
            ))
        }
        Partitioning::Broadcast {
            batch_size,
            channels,
        } => Box::new(RoutedPartitioner::new(
            BroadcastRoute,
            *batch_size,
            non_empty("broadcast", receivers_of(channels))?,
        )),
        Partitioning::Unsupported => {
            return Err(WorkerError::UnsupportedPartitioning(
                "unknown partitioning kind".to_owned(),
            ))
        }
    })
}

#[cfg(test)]
pub(crate) fn named(names: &[&str]) -> Vec<Tuple> {
    names
        .iter()
        .map(|name| Tuple::new().with("name", *name))
        .collect()
}

#[cfg(test)]
pub(crate) fn dest(name: &str) -> ActorVirtualIdentity {
    name.into()
}

#[test]
fn unsupported_partitioning_is_rejected() {
    assert!(matches!(
        build(&"me".into(), &Partitioning::Unsupported),
        Err(WorkerError::UnsupportedPartitioning(_))
    ));
    assert!(matches!(
        build(
            &"me".into(),
            &Partitioning::RoundRobin {
                batch_size: 1,
                channels: Vec::new()
            }
        ),
        Err(WorkerError::UnsupportedPartitioning(_))
    ));
}

#[test]
fn receivers_are_deduplicated_in_order() {
    let channels = vec![
        ChannelIdentity::data("me", "b"),
        ChannelIdentity::data("me", "a"),
        ChannelIdentity::data("other", "b"),
    ];
    assert_eq!(
        receivers_of(&channels),
        vec![ActorVirtualIdentity::from("b"), ActorVirtualIdentity::from("a")]
    );
}
