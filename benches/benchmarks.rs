use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use dataflow_worker::model::messages::Partitioning;
use dataflow_worker::model::tuple::Tuple;
use dataflow_worker::model::{ActorVirtualIdentity, ChannelIdentity};
use dataflow_worker::partitioners;

const TUPLES: u64 = 10_000;

fn channels(n: usize) -> Vec<ChannelIdentity> {
    (0..n)
        .map(|i| ChannelIdentity::data("bench", format!("down-{i}").as_str()))
        .collect()
}

fn kinds(receivers: usize) -> Vec<(&'static str, Partitioning)> {
    vec![
        (
            "round_robin",
            Partitioning::RoundRobin {
                batch_size: 400,
                channels: channels(receivers),
            },
        ),
        (
            "hash",
            Partitioning::HashBased {
                batch_size: 400,
                channels: channels(receivers),
                hash_attribute_names: vec!["key".to_owned()],
            },
        ),
        (
            "range",
            Partitioning::RangeBased {
                batch_size: 400,
                channels: channels(receivers),
                range_attribute_names: vec!["value".to_owned()],
                range_min: 0,
                range_max: TUPLES as i64,
            },
        ),
        (
            "broadcast",
            Partitioning::Broadcast {
                batch_size: 400,
                channels: channels(receivers),
            },
        ),
    ]
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let tuples: Vec<Tuple> = (0..TUPLES as i64)
        .map(|i| Tuple::new().with("key", format!("k{}", i % 97)).with("value", i))
        .collect();
    let worker = ActorVirtualIdentity::from("bench");

    let mut group = c.benchmark_group("partitioners");
    group.throughput(Throughput::Elements(TUPLES));
    for (name, partitioning) in kinds(8) {
        group.bench_function(BenchmarkId::new(name, 8), |b| {
            b.iter(|| {
                let mut partitioner = partitioners::build(&worker, &partitioning).unwrap();
                let mut batches = 0;
                for tuple in &tuples {
                    batches += partitioner.add_tuple_to_batch(tuple.clone()).len();
                }
                batches
            });
        });
    }
    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
