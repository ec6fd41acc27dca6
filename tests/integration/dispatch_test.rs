// Dispatcher fan-out: pull handles, push sinks and backpressure isolation

use std::sync::Arc;

use upmon::dispatch::{Dispatcher, Snapshot};
use upmon::error::Result;
use upmon::format::JsonFormatter;
use upmon::metric::{MetricType, Sample, StreamKey};
use upmon::plugin::Formatter;
use upmon::store::BufferStore;

fn gauge(plugin: &str, metric: &str, value: f64) -> Sample {
    Sample::new(
        StreamKey::new(plugin, metric),
        MetricType::Gauge,
        value,
        "percent",
    )
}

#[tokio::test]
async fn test_stalled_push_sink_never_blocks_publishing() {
    let store = Arc::new(BufferStore::new(8));
    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&store)));

    // A sink nobody drains: its output channel fills after one payload.
    let _stalled = dispatcher.subscribe_push(Box::new(JsonFormatter::default()));
    let pull = dispatcher.subscribe_pull();

    for i in 0..1000 {
        dispatcher.publish(vec![gauge("cpu", "usage", i as f64)]);
    }

    // The publisher never waited on the stalled consumer.
    let snapshot = pull.latest();
    assert_eq!(snapshot.round_id, 1000);
    assert_eq!(
        snapshot.get(&StreamKey::new("cpu", "usage")).unwrap().value,
        999.0
    );
}

#[tokio::test]
async fn test_push_sink_receives_formatted_payloads() {
    let store = Arc::new(BufferStore::new(8));
    let dispatcher = Arc::new(Dispatcher::new(store));

    let mut payloads = dispatcher.subscribe_push(Box::new(JsonFormatter::default()));
    dispatcher.publish(vec![gauge("cpu", "usage", 55.0)]);

    let bytes = payloads.recv().await.expect("push sink payload");
    let doc: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(doc["samples"][0]["plugin"], "cpu");
    assert_eq!(doc["samples"][0]["value"], 55.0);
}

#[tokio::test]
async fn test_lagging_sink_skips_to_newest_snapshot() {
    struct RoundRecorder;
    impl Formatter for RoundRecorder {
        fn on_snapshot(&mut self, snapshot: &Snapshot) -> Result<Vec<u8>> {
            Ok(snapshot.round_id.to_string().into_bytes())
        }
    }

    let store = Arc::new(BufferStore::new(8));
    let dispatcher = Arc::new(Dispatcher::new(store));
    let mut payloads = dispatcher.subscribe_push(Box::new(RoundRecorder));

    for i in 0..50 {
        dispatcher.publish(vec![gauge("cpu", "usage", i as f64)]);
    }

    // The first payload may be any early round, but after draining, the
    // last one seen must be the final round: intermediate snapshots are
    // replaced, never queued.
    let mut last = Vec::new();
    loop {
        match tokio::time::timeout(std::time::Duration::from_millis(200), payloads.recv()).await {
            Ok(Some(bytes)) => last = bytes,
            _ => break,
        }
    }
    assert_eq!(String::from_utf8(last).unwrap(), "50");
}

#[tokio::test]
async fn test_snapshot_merges_across_rounds_and_queries() {
    let store = Arc::new(BufferStore::new(8));
    let dispatcher = Dispatcher::new(store);

    dispatcher.publish(vec![gauge("cpu", "usage", 10.0), gauge("cpu", "load1", 0.3)]);
    let snapshot = dispatcher.publish(vec![gauge("memory", "usage", 70.0)]);

    // Streams from the earlier round are still visible.
    assert_eq!(snapshot.latest.len(), 3);
    assert_eq!(snapshot.query("*.usage").len(), 2);
    assert_eq!(snapshot.query("cpu.*").len(), 2);

    // History windows go through the snapshot to the shared store.
    let history = snapshot.history(&StreamKey::new("cpu", "usage"), 10);
    assert!(history.is_empty(), "publish does not write history itself");
}
