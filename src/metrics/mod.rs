//! Process wide metrics.
//!
//! Instruments are created through the global OpenTelemetry meter and
//! are no-ops until [`initialize_metrics`] installs a provider backed
//! by the Prometheus default registry.

use opentelemetry::global;
use opentelemetry_sdk::metrics::{new_view, Aggregation, Instrument, MeterProvider, Stream};
use prometheus::{default_registry, Encoder, TextEncoder};

use crate::errors::{WorkerError, WorkerResult};

#[macro_export]
macro_rules! with_timer {
    ($histogram: expr, $labels: expr, $body: expr) => {{
        let now = std::time::Instant::now();
        let res = $body;
        $histogram.record(now.elapsed().as_secs_f64(), &$labels);
        res
    }};
}

/// Initialize the global registry for Prometheus metrics,
/// and create a global MeterProvider.
pub fn initialize_metrics() -> WorkerResult<()> {
    // Initialize the global default registry for prometheus metrics
    // as internally it's a lazy static.
    let registry = default_registry();
    let exporter = opentelemetry_prometheus::exporter()
        .with_registry(registry.clone())
        .with_namespace("dataflow_worker")
        .build()
        .map_err(|err| WorkerError::Metrics(err.to_string()))?;

    // Create a global MeterProvider
    let provider = MeterProvider::builder()
        .with_reader(exporter)
        .with_view(
            new_view(
                Instrument::new().name("*duration*"), // Must match histogram name
                Stream::new().aggregation(Aggregation::ExplicitBucketHistogram {
                    boundaries: vec![
                        0.0, 0.0005, 0.005, 0.01, 0.025, 0.05, 0.075, 0.1, 0.25, 0.5, 0.75, 1.0,
                        2.5, 5.0, 7.5, 10.0,
                    ],
                    record_min_max: true,
                }),
            )
            .map_err(|err| WorkerError::Metrics(err.to_string()))?,
        )
        .build();
    global::set_meter_provider(provider);
    Ok(())
}

/// Everything in the Prometheus default registry, in the text
/// exposition format.
pub fn render() -> WorkerResult<String> {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&default_registry().gather(), &mut buffer)
        .map_err(|err| WorkerError::Metrics(err.to_string()))?;
    String::from_utf8(buffer).map_err(|err| WorkerError::Metrics(err.to_string()))
}

#[test]
fn render_is_text_format() {
    let counter = prometheus::IntCounter::new("render_test_total", "test counter").unwrap();
    // Another test may have registered it already.
    let _ = default_registry().register(Box::new(counter.clone()));
    counter.inc();
    assert!(render().unwrap().contains("render_test_total"));
}
