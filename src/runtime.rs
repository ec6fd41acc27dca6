//! Monitor runtime: wires discovery, the store, the scheduler and the
//! dispatcher together and owns their lifecycles.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;

use crate::config::MonitorConfig;
use crate::dispatch::{Dispatcher, Snapshot, SnapshotHandle};
use crate::error::{Result, UpmonError};
use crate::plugin::{CapabilityKind, Discovery, DiscoveryReport, PluginRecord, PluginState, Registry};
use crate::scheduler::{CollectionScheduler, RoundUpdate, SchedulerConfig};
use crate::store::BufferStore;

const UPDATE_CHANNEL_CAPACITY: usize = 64;
const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// A running monitor. Consumers read through [`SnapshotHandle`]s or push
/// sinks; neither path can block collection.
pub struct Monitor {
    config: MonitorConfig,
    registry: Arc<Registry>,
    store: Arc<BufferStore>,
    dispatcher: Arc<Dispatcher>,
    scheduler: Option<CollectionScheduler>,
    dispatcher_handle: Option<JoinHandle<()>>,
    report: DiscoveryReport,
}

impl Monitor {
    /// Discover plugins and start collection.
    pub async fn start(config: MonitorConfig) -> Result<Self> {
        let (registry, report) = Discovery::from_config(&config).run(&config);
        let store = Arc::new(BufferStore::new(config.default_capacity));
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&store)));

        let mut monitor = Self {
            config,
            registry,
            store,
            dispatcher,
            scheduler: None,
            dispatcher_handle: None,
            report,
        };
        monitor.start_collection();
        Ok(monitor)
    }

    fn start_collection(&mut self) {
        let mut scheduler = CollectionScheduler::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.store),
            SchedulerConfig::from_monitor_config(&self.config),
        );
        let (update_tx, update_rx) = mpsc::channel::<RoundUpdate>(UPDATE_CHANNEL_CAPACITY);
        scheduler.start(&self.config, update_tx);

        let shutdown_rx = scheduler.subscribe_shutdown();
        self.dispatcher_handle = Some(tokio::spawn(
            Arc::clone(&self.dispatcher).run(update_rx, shutdown_rx),
        ));
        self.scheduler = Some(scheduler);
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn report(&self) -> &DiscoveryReport {
        &self.report
    }

    pub fn records(&self) -> Vec<PluginRecord> {
        self.registry.records()
    }

    /// Pull-side access: non-blocking reads of the latest snapshot.
    pub fn subscribe(&self) -> SnapshotHandle {
        self.dispatcher.subscribe_pull()
    }

    pub fn latest(&self) -> Arc<Snapshot> {
        self.dispatcher.subscribe_pull().latest()
    }

    /// Push-side access: route every new snapshot through the named
    /// formatter plugin. A slow consumer of the returned channel only ever
    /// delays itself.
    pub fn subscribe_push(&self, formatter: &str) -> Result<mpsc::Receiver<Vec<u8>>> {
        let sink = self
            .registry
            .take_instance(formatter)
            .and_then(|instance| instance.into_formatter())
            .ok_or_else(|| UpmonError::PluginNotFound(formatter.to_string()))?;
        Ok(self.dispatcher.subscribe_push(sink))
    }

    /// Stop collection, rebuild the registry from a fresh discovery pass
    /// and restart. History buffers and existing pull handles survive; a
    /// live registry is never mutated in place.
    pub async fn reload(&mut self) -> Result<&DiscoveryReport> {
        log::info!("reloading plugins");
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.shutdown(DEFAULT_SHUTDOWN_GRACE).await;
        }
        if let Some(handle) = self.dispatcher_handle.take() {
            let _ = handle.await;
        }

        let (registry, report) = Discovery::from_config(&self.config).run(&self.config);
        self.registry = registry;
        self.report = report;
        self.start_collection();
        Ok(&self.report)
    }

    /// Graceful shutdown: each collection task gets `grace` to finish its
    /// in-flight tick, then is aborted.
    pub async fn shutdown(mut self, grace: Duration) {
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.shutdown(grace).await;
        }
        if let Some(handle) = self.dispatcher_handle.take() {
            let _ = handle.await;
        }
    }
}

/// One synchronous collection pass over every loaded sampling plugin,
/// without starting the scheduler. Used by the one-shot CLI path.
pub async fn collect_once(
    config: &MonitorConfig,
) -> Result<(Arc<Snapshot>, Arc<Registry>, DiscoveryReport)> {
    let (registry, report) = Discovery::from_config(config).run(config);
    let store = Arc::new(BufferStore::new(config.default_capacity));
    let dispatcher = Dispatcher::new(Arc::clone(&store));
    let scheduler_cfg = SchedulerConfig::from_monitor_config(config);

    let mut round = Vec::new();
    let mut descriptors = registry.list(CapabilityKind::Source);
    descriptors.extend(registry.list(CapabilityKind::Collector));

    for descriptor in descriptors {
        if registry.state(&descriptor.name) != Some(PluginState::Loaded) {
            continue;
        }
        let Some(mut collect) = registry
            .take_instance(&descriptor.name)
            .and_then(|instance| instance.into_collect())
        else {
            continue;
        };

        let interval = config.interval_for(&descriptor.name, descriptor.default_interval);
        let timeout = scheduler_cfg.timeout_for(interval);
        let samples = match time::timeout(timeout, collect.collect()).await {
            Ok(Ok(samples)) => samples,
            Ok(Err(e)) => {
                log::warn!("collection failed for '{}': {}", descriptor.name, e);
                continue;
            }
            Err(_) => {
                log::warn!("collection timed out for '{}'", descriptor.name);
                continue;
            }
        };

        for sample in samples {
            store.create(sample.key.clone(), config.capacity_for(&descriptor.name));
            let previous = store.latest(&sample.key);
            match descriptor.schema.validate(sample, previous.as_ref()) {
                Ok(sample) => {
                    store.push(sample.clone());
                    round.push(sample);
                }
                Err(e) => log::warn!("sample rejected for '{}': {}", descriptor.name, e),
            }
        }
    }

    Ok((dispatcher.publish(round), registry, report))
}

/// Build a one-off formatter instance by plugin name.
pub fn formatter_instance(
    registry: &Registry,
    name: &str,
) -> Result<Box<dyn crate::plugin::Formatter>> {
    registry
        .take_instance(name)
        .and_then(|instance| instance.into_formatter())
        .ok_or_else(|| UpmonError::PluginNotFound(name.to_string()))
}
