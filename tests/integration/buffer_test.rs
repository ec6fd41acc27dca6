// Ring buffer history semantics across the shared store

use upmon::metric::{MetricType, Sample, StreamKey};
use upmon::store::BufferStore;

fn gauge(plugin: &str, metric: &str, value: f64) -> Sample {
    Sample::new(
        StreamKey::new(plugin, metric),
        MetricType::Gauge,
        value,
        "percent",
    )
}

#[test]
fn test_window_is_last_capacity_samples_oldest_first() {
    let store = BufferStore::new(60);
    let key = StreamKey::new("cpu", "usage");
    store.create(key.clone(), 5);

    for i in 0..12 {
        store.push(gauge("cpu", "usage", i as f64));
    }

    let window = store.window(&key, 10);
    let values: Vec<f64> = window.iter().map(|s| s.value).collect();
    assert_eq!(values, vec![7.0, 8.0, 9.0, 10.0, 11.0]);
    assert_eq!(store.latest(&key).unwrap().value, 11.0);
}

#[test]
fn test_repeated_identical_values_each_occupy_a_slot() {
    let store = BufferStore::new(60);
    let key = StreamKey::new("mem", "usage");
    store.create(key.clone(), 3);

    for _ in 0..5 {
        store.push(gauge("mem", "usage", 42.0));
    }

    let window = store.window(&key, 10);
    assert_eq!(window.len(), 3);
    assert!(window.iter().all(|s| s.value == 42.0));
}

#[test]
fn test_streams_are_independent() {
    let store = BufferStore::new(4);
    let cpu = StreamKey::new("cpu", "usage");
    let mem = StreamKey::new("mem", "usage");

    for i in 0..10 {
        store.push(gauge("cpu", "usage", i as f64));
    }
    store.push(gauge("mem", "usage", 1.0));

    assert_eq!(store.window(&cpu, 10).len(), 4);
    assert_eq!(store.window(&mem, 10).len(), 1);
    assert_eq!(store.stream_count(), 2);
}

#[test]
fn test_labelled_streams_do_not_collide() {
    let store = BufferStore::new(8);
    let eth0 = StreamKey::with_labels(
        "network",
        "rx_bytes",
        [("interface".to_string(), "eth0".to_string())],
    );
    let lo = StreamKey::with_labels(
        "network",
        "rx_bytes",
        [("interface".to_string(), "lo".to_string())],
    );

    store.push(Sample::new(eth0.clone(), MetricType::Counter, 100.0, "bytes"));
    store.push(Sample::new(lo.clone(), MetricType::Counter, 7.0, "bytes"));

    assert_eq!(store.latest(&eth0).unwrap().value, 100.0);
    assert_eq!(store.latest(&lo).unwrap().value, 7.0);
}

#[test]
fn test_capacity_change_reinitializes_stream() {
    let store = BufferStore::new(60);
    let key = StreamKey::new("cpu", "usage");
    store.create(key.clone(), 4);
    for i in 0..4 {
        store.push(gauge("cpu", "usage", i as f64));
    }

    // Same capacity is idempotent.
    store.create(key.clone(), 4);
    assert_eq!(store.window(&key, 10).len(), 4);

    // A different capacity starts the stream over.
    store.create(key.clone(), 2);
    assert!(store.window(&key, 10).is_empty());
}
