use super::Route;
use crate::model::tuple::Tuple;

/// Every tuple goes to every receiver.
pub struct BroadcastRoute;

impl Route for BroadcastRoute {
    fn route(&mut self, _tuple: &Tuple, receivers: usize) -> Vec<usize> {
        (0..receivers).collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::model::messages::{DataPayload, Partitioning};
    use crate::model::ChannelIdentity;
    use crate::partitioners::{build, dest, named, PartitionerOutput};

    #[test]
    fn same_batch_to_everyone() {
        let mut partitioner = build(
            &"me".into(),
            &Partitioning::Broadcast {
                batch_size: 2,
                channels: vec![
                    ChannelIdentity::data("me", "x"),
                    ChannelIdentity::data("me", "y"),
                ],
            },
        )
        .unwrap();
        let mut tuples = named(&["a", "b", "c"]).into_iter();
        assert!(partitioner
            .add_tuple_to_batch(tuples.next().unwrap())
            .is_empty());
        assert_eq!(
            partitioner.add_tuple_to_batch(tuples.next().unwrap()),
            vec![
                (dest("x"), named(&["a", "b"])),
                (dest("y"), named(&["a", "b"])),
            ]
        );
        partitioner.add_tuple_to_batch(tuples.next().unwrap());
        assert_eq!(
            partitioner.flush(&DataPayload::EndOfUpstream),
            vec![
                (dest("x"), PartitionerOutput::Batch(named(&["c"]))),
                (dest("y"), PartitionerOutput::Batch(named(&["c"]))),
                (dest("x"), PartitionerOutput::Marker(DataPayload::EndOfUpstream)),
                (dest("y"), PartitionerOutput::Marker(DataPayload::EndOfUpstream)),
            ]
        );
    }
}
