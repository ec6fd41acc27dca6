// Scheduler failure handling: thresholds, backoff, timeouts and isolation.
// All tests run on a paused clock, so backoff delays cost nothing.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;

use upmon::config::MonitorConfig;
use upmon::error::CollectionError;
use upmon::metric::{FieldSpec, MetricType, Sample, Schema, StreamKey};
use upmon::plugin::{
    ApiVersion, CapabilityKind, Collect, PluginDescriptor, PluginInstance, PluginState, Registry,
};
use upmon::scheduler::{CollectionScheduler, RoundUpdate, SchedulerConfig};
use upmon::store::BufferStore;

struct SteadyGauge {
    plugin: &'static str,
}

impl Collect for SteadyGauge {
    fn collect(&mut self) -> BoxFuture<'_, Result<Vec<Sample>, CollectionError>> {
        let plugin = self.plugin;
        Box::pin(async move {
            Ok(vec![Sample::new(
                StreamKey::new(plugin, "usage"),
                MetricType::Gauge,
                42.0,
                "percent",
            )])
        })
    }
}

struct AlwaysFails;

impl Collect for AlwaysFails {
    fn collect(&mut self) -> BoxFuture<'_, Result<Vec<Sample>, CollectionError>> {
        Box::pin(async { Err(CollectionError::failed("probe exploded")) })
    }
}

struct NeverReturns;

impl Collect for NeverReturns {
    fn collect(&mut self) -> BoxFuture<'_, Result<Vec<Sample>, CollectionError>> {
        Box::pin(async {
            std::future::pending::<()>().await;
            unreachable!()
        })
    }
}

fn gauge_schema() -> Schema {
    Schema::new(vec![FieldSpec::gauge("usage", "percent").bounded(0.0, 100.0)])
}

fn register<F>(registry: &Registry, name: &'static str, factory: F)
where
    F: Fn() -> PluginInstance + Send + Sync + 'static,
{
    registry
        .register(
            PluginDescriptor::new(
                name,
                CapabilityKind::Source,
                ApiVersion::new(1, 0),
                Duration::from_secs(1),
                gauge_schema(),
            ),
            Box::new(factory),
        )
        .unwrap();
}

fn scheduler_config() -> SchedulerConfig {
    SchedulerConfig {
        failure_threshold: 3,
        backoff_base: Duration::from_millis(100),
        backoff_cap: Duration::from_secs(2),
        min_timeout: Duration::from_millis(100),
    }
}

fn start(
    registry: &Arc<Registry>,
    store: &Arc<BufferStore>,
) -> (CollectionScheduler, mpsc::Receiver<RoundUpdate>) {
    let mut scheduler =
        CollectionScheduler::new(Arc::clone(registry), Arc::clone(store), scheduler_config());
    let (tx, rx) = mpsc::channel(64);
    scheduler.start(&MonitorConfig::default(), tx);
    (scheduler, rx)
}

#[tokio::test(start_paused = true)]
async fn test_plugin_disabled_after_exact_threshold() {
    let registry = Arc::new(Registry::new());
    register(&registry, "flaky", || {
        PluginInstance::Source(Box::new(AlwaysFails))
    });
    let store = Arc::new(BufferStore::new(8));
    let (scheduler, _rx) = start(&registry, &store);

    // Enough paused time for every backoff step (100ms + 200ms).
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(registry.state("flaky"), Some(PluginState::Disabled));
    let stats = registry.stats("flaky").unwrap();
    assert_eq!(stats.ticks(), 3, "no ticks after the disable");
    assert_eq!(stats.failures(), 3);
    assert!(registry
        .last_error("flaky")
        .unwrap()
        .contains("consecutive failures"));

    scheduler.shutdown(Duration::from_millis(100)).await;
}

#[tokio::test(start_paused = true)]
async fn test_failure_counters_are_per_plugin() {
    let registry = Arc::new(Registry::new());
    register(&registry, "flaky", || {
        PluginInstance::Source(Box::new(AlwaysFails))
    });
    register(&registry, "steady", || {
        PluginInstance::Source(Box::new(SteadyGauge { plugin: "steady" }))
    });
    let store = Arc::new(BufferStore::new(8));
    let (scheduler, mut rx) = start(&registry, &store);

    tokio::time::sleep(Duration::from_secs(10)).await;

    // One plugin's death changes nothing for the other.
    assert_eq!(registry.state("flaky"), Some(PluginState::Disabled));
    assert_eq!(registry.state("steady"), Some(PluginState::Loaded));
    assert!(registry.stats("steady").unwrap().ticks() >= 10);
    assert_eq!(registry.stats("steady").unwrap().failures(), 0);

    let update = rx.recv().await.expect("steady plugin publishes rounds");
    assert_eq!(update.plugin, "steady");
    assert_eq!(update.samples[0].value, 42.0);

    scheduler.shutdown(Duration::from_millis(100)).await;
}

#[tokio::test(start_paused = true)]
async fn test_hung_collect_counts_as_timeout() {
    let registry = Arc::new(Registry::new());
    register(&registry, "hung", || {
        PluginInstance::Source(Box::new(NeverReturns))
    });
    let store = Arc::new(BufferStore::new(8));
    let (scheduler, _rx) = start(&registry, &store);

    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(registry.state("hung"), Some(PluginState::Disabled));
    let stats = registry.stats("hung").unwrap();
    assert_eq!(stats.timeouts(), 3);

    scheduler.shutdown(Duration::from_millis(100)).await;
}

#[tokio::test(start_paused = true)]
async fn test_successful_round_resets_consecutive_failures() {
    // Fails twice, then recovers. Two failures is below the threshold of
    // three, so the recovery must clear the streak for good.
    struct FlakyThenFine {
        calls: u32,
    }
    impl Collect for FlakyThenFine {
        fn collect(&mut self) -> BoxFuture<'_, Result<Vec<Sample>, CollectionError>> {
            self.calls += 1;
            let calls = self.calls;
            Box::pin(async move {
                if calls <= 2 {
                    Err(CollectionError::failed("warming up"))
                } else {
                    Ok(vec![Sample::new(
                        StreamKey::new("recovering", "usage"),
                        MetricType::Gauge,
                        1.0,
                        "percent",
                    )])
                }
            })
        }
    }

    let registry = Arc::new(Registry::new());
    register(&registry, "recovering", || {
        PluginInstance::Source(Box::new(FlakyThenFine { calls: 0 }))
    });
    let store = Arc::new(BufferStore::new(8));
    let (scheduler, _rx) = start(&registry, &store);

    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(registry.state("recovering"), Some(PluginState::Loaded));
    let stats = registry.stats("recovering").unwrap();
    assert_eq!(stats.failures(), 2);
    assert!(stats.ticks() > 10);

    scheduler.shutdown(Duration::from_millis(100)).await;
}

#[tokio::test(start_paused = true)]
async fn test_schema_violations_count_toward_the_threshold() {
    struct OutOfBounds;
    impl Collect for OutOfBounds {
        fn collect(&mut self) -> BoxFuture<'_, Result<Vec<Sample>, CollectionError>> {
            Box::pin(async {
                Ok(vec![Sample::new(
                    StreamKey::new("broken", "usage"),
                    MetricType::Gauge,
                    900.0,
                    "percent",
                )])
            })
        }
    }

    let registry = Arc::new(Registry::new());
    register(&registry, "broken", || {
        PluginInstance::Source(Box::new(OutOfBounds))
    });
    let store = Arc::new(BufferStore::new(8));
    let (scheduler, _rx) = start(&registry, &store);

    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(registry.state("broken"), Some(PluginState::Disabled));
    let stats = registry.stats("broken").unwrap();
    assert_eq!(stats.schema_errors(), 3);
    // Nothing invalid ever landed in the store.
    assert!(store.latest(&StreamKey::new("broken", "usage")).is_none());

    scheduler.shutdown(Duration::from_millis(100)).await;
}

#[tokio::test(start_paused = true)]
async fn test_disabled_plugin_keeps_stale_history() {
    // Succeeds once, then dies. The buffered sample must stay readable
    // after the plugin is disabled.
    struct OneGoodRound {
        calls: u32,
    }
    impl Collect for OneGoodRound {
        fn collect(&mut self) -> BoxFuture<'_, Result<Vec<Sample>, CollectionError>> {
            self.calls += 1;
            let calls = self.calls;
            Box::pin(async move {
                if calls == 1 {
                    Ok(vec![Sample::new(
                        StreamKey::new("dying", "usage"),
                        MetricType::Gauge,
                        73.0,
                        "percent",
                    )])
                } else {
                    Err(CollectionError::unavailable("device detached"))
                }
            })
        }
    }

    let registry = Arc::new(Registry::new());
    register(&registry, "dying", || {
        PluginInstance::Source(Box::new(OneGoodRound { calls: 0 }))
    });
    let store = Arc::new(BufferStore::new(8));
    let (scheduler, _rx) = start(&registry, &store);

    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(registry.state("dying"), Some(PluginState::Disabled));
    let stale = store.latest(&StreamKey::new("dying", "usage")).unwrap();
    assert_eq!(stale.value, 73.0);

    scheduler.shutdown(Duration::from_millis(100)).await;
}
