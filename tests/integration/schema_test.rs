// Schema validation driven the way the scheduler drives it: each sample is
// checked against the stream's last accepted value before landing in the
// store.

use upmon::metric::{FieldSpec, MetricType, Sample, Schema, StreamKey};
use upmon::store::BufferStore;

fn counter_schema() -> Schema {
    Schema::new(vec![FieldSpec::counter("rx_bytes", "bytes")])
}

fn counter_sample(value: f64) -> Sample {
    Sample::new(
        StreamKey::new("network", "rx_bytes"),
        MetricType::Counter,
        value,
        "bytes",
    )
}

/// Push one value through validate-then-store, returning the stored sample.
fn ingest(store: &BufferStore, schema: &Schema, sample: Sample) -> Sample {
    let previous = store.latest(&sample.key);
    let validated = schema.validate(sample, previous.as_ref()).unwrap();
    store.push(validated.clone());
    validated
}

#[test]
fn test_counter_reset_is_tagged_once() {
    let store = BufferStore::new(16);
    let schema = counter_schema();

    let first = ingest(&store, &schema, counter_sample(100.0));
    let second = ingest(&store, &schema, counter_sample(105.0));
    let third = ingest(&store, &schema, counter_sample(3.0));
    let fourth = ingest(&store, &schema, counter_sample(8.0));

    assert!(!first.reset_detected);
    assert!(!second.reset_detected);
    assert!(third.reset_detected, "decrease from 105 to 3 is a reset");
    assert!(!fourth.reset_detected, "growth after the reset is normal");

    // The stored history carries the flags as they were at ingest time.
    let window = store.window(&StreamKey::new("network", "rx_bytes"), 10);
    let flags: Vec<bool> = window.iter().map(|s| s.reset_detected).collect();
    assert_eq!(flags, vec![false, false, true, false]);
}

#[test]
fn test_labelled_counter_resets_are_per_stream() {
    let store = BufferStore::new(16);
    let schema = counter_schema();

    let eth0 = |v: f64| {
        Sample::new(
            StreamKey::with_labels(
                "network",
                "rx_bytes",
                [("interface".to_string(), "eth0".to_string())],
            ),
            MetricType::Counter,
            v,
            "bytes",
        )
    };
    let lo = |v: f64| {
        Sample::new(
            StreamKey::with_labels(
                "network",
                "rx_bytes",
                [("interface".to_string(), "lo".to_string())],
            ),
            MetricType::Counter,
            v,
            "bytes",
        )
    };

    ingest(&store, &schema, eth0(1000.0));
    ingest(&store, &schema, lo(5.0));
    // eth0 resets; lo keeps growing. Only eth0's sample is tagged.
    let tagged = ingest(&store, &schema, eth0(10.0));
    let clean = ingest(&store, &schema, lo(6.0));

    assert!(tagged.reset_detected);
    assert!(!clean.reset_detected);
}

#[test]
fn test_rejected_samples_never_reach_the_store() {
    let store = BufferStore::new(16);
    let schema = Schema::new(vec![
        FieldSpec::gauge("usage", "percent").bounded(0.0, 100.0)
    ]);

    let key = StreamKey::new("cpu", "usage");
    let out_of_bounds = Sample::new(key.clone(), MetricType::Gauge, 250.0, "percent");
    assert!(schema.validate(out_of_bounds, None).is_err());

    let unknown = Sample::new(StreamKey::new("cpu", "temperature"), MetricType::Gauge, 40.0, "celsius");
    assert!(schema.validate(unknown, None).is_err());

    assert_eq!(store.stream_count(), 0);
}
