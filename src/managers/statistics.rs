//! Tuple counts and phase timings of one worker.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use opentelemetry::metrics::Counter;
use opentelemetry::KeyValue;

use crate::model::messages::{PortTupleCount, WorkerStatistics};
use crate::model::PortIdentity;

/// Reported for a duration that can not be computed yet.
pub const UNKNOWN_DURATION: i64 = -1;

pub struct StatisticsManager {
    input_counts: BTreeMap<PortIdentity, u64>,
    output_counts: BTreeMap<PortIdentity, u64>,
    data_processing_time: Duration,
    control_processing_time: Duration,
    started_at: Option<Instant>,
    total_execution_time: Option<Duration>,
    item_inp_count: Counter<u64>,
    item_out_count: Counter<u64>,
    labels: Vec<KeyValue>,
}

impl StatisticsManager {
    pub fn new(worker_id: &str) -> Self {
        let meter = opentelemetry::global::meter("dataflow_worker");
        let item_inp_count = meter
            .u64_counter("item_inp_count")
            .with_description("number of tuples this worker has ingested")
            .init();
        let item_out_count = meter
            .u64_counter("item_out_count")
            .with_description("number of tuples this worker has emitted")
            .init();
        Self {
            input_counts: BTreeMap::new(),
            output_counts: BTreeMap::new(),
            data_processing_time: Duration::ZERO,
            control_processing_time: Duration::ZERO,
            started_at: None,
            total_execution_time: None,
            item_inp_count,
            item_out_count,
            labels: vec![KeyValue::new("worker", worker_id.to_owned())],
        }
    }

    pub fn increase_input_tuple_count(&mut self, port: PortIdentity) {
        *self.input_counts.entry(port).or_default() += 1;
        self.item_inp_count.add(1, &self.labels);
    }

    pub fn increase_output_tuple_count(&mut self, port: PortIdentity) {
        *self.output_counts.entry(port).or_default() += 1;
        self.item_out_count.add(1, &self.labels);
    }

    pub fn increase_data_processing_time(&mut self, elapsed: Duration) {
        self.data_processing_time += elapsed;
    }

    pub fn increase_control_processing_time(&mut self, elapsed: Duration) {
        self.control_processing_time += elapsed;
    }

    /// Start the execution clock. Only the first call counts.
    pub fn initialize_worker_start_time(&mut self) {
        self.started_at.get_or_insert_with(Instant::now);
    }

    /// Freeze the execution clock.
    pub fn update_total_execution_time(&mut self) {
        if let Some(started_at) = self.started_at {
            self.total_execution_time = Some(started_at.elapsed());
        }
    }

    fn total_execution_time(&self) -> Option<Duration> {
        self.total_execution_time
            .or_else(|| self.started_at.map(|started| started.elapsed()))
    }

    /// Snapshot of the counters.
    ///
    /// Durations that can not be derived are reported as
    /// [`UNKNOWN_DURATION`] instead of failing the query.
    pub fn get_statistics(&self) -> WorkerStatistics {
        let to_counts = |counts: &BTreeMap<PortIdentity, u64>| {
            counts
                .iter()
                .map(|(port_id, count)| PortTupleCount {
                    port_id: *port_id,
                    count: *count,
                })
                .collect()
        };
        let idle_time = self
            .total_execution_time()
            .and_then(|total| total.checked_sub(self.data_processing_time))
            .and_then(|rest| rest.checked_sub(self.control_processing_time))
            .map_or(UNKNOWN_DURATION, as_nanos);
        WorkerStatistics {
            input_tuple_count: to_counts(&self.input_counts),
            output_tuple_count: to_counts(&self.output_counts),
            data_processing_time: as_nanos(self.data_processing_time),
            control_processing_time: as_nanos(self.control_processing_time),
            idle_time,
        }
    }
}

fn as_nanos(duration: Duration) -> i64 {
    i64::try_from(duration.as_nanos()).unwrap_or(UNKNOWN_DURATION)
}

#[test]
fn counts_are_per_port() {
    let mut stats = StatisticsManager::new("w0");
    stats.increase_input_tuple_count(PortIdentity::new(0));
    stats.increase_input_tuple_count(PortIdentity::new(0));
    stats.increase_input_tuple_count(PortIdentity::new(1));
    stats.increase_output_tuple_count(PortIdentity::new(0));

    let found = stats.get_statistics();
    assert_eq!(
        found.input_tuple_count,
        vec![
            PortTupleCount {
                port_id: PortIdentity::new(0),
                count: 2
            },
            PortTupleCount {
                port_id: PortIdentity::new(1),
                count: 1
            },
        ]
    );
    assert_eq!(found.output_tuple_count.len(), 1);
}

#[test]
fn idle_time_is_sentinel_before_start() {
    let mut stats = StatisticsManager::new("w0");
    stats.increase_data_processing_time(Duration::from_millis(3));
    let found = stats.get_statistics();
    assert_eq!(found.idle_time, UNKNOWN_DURATION);
    assert_eq!(found.data_processing_time, 3_000_000);

    stats.initialize_worker_start_time();
    std::thread::sleep(Duration::from_millis(5));
    stats.update_total_execution_time();
    assert!(stats.get_statistics().idle_time >= 0);
}
