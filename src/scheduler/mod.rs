//! Per-source collection scheduling.
//!
//! Each Source/Collector plugin runs in its own tokio task at its own
//! interval; no plugin can block another's schedule. A collection call is
//! capped with a timeout derived from the plugin's own interval. Failures
//! back off exponentially (capped) and, past the consecutive-failure
//! threshold, transition the plugin to `Disabled` and end its task. The
//! previous buffer contents stay available (stale) throughout.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::config::MonitorConfig;
use crate::error::CollectionError;
use crate::metric::{Sample, Schema};
use crate::plugin::registry::{PluginState, Registry};
use crate::plugin::{CapabilityKind, Collect};
use crate::store::BufferStore;

/// Samples accepted from one plugin in one round, sent to the dispatcher.
#[derive(Debug, Clone)]
pub struct RoundUpdate {
    pub plugin: String,
    pub samples: Vec<Sample>,
}

/// Tunables for failure handling. The threshold and backoff curve are
/// configuration, not a fixed contract.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub failure_threshold: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    pub min_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            backoff_base: Duration::from_millis(500),
            backoff_cap: Duration::from_secs(30),
            min_timeout: Duration::from_millis(100),
        }
    }
}

impl SchedulerConfig {
    pub fn from_monitor_config(cfg: &MonitorConfig) -> Self {
        Self {
            failure_threshold: cfg.failure_threshold,
            backoff_base: Duration::from_millis(cfg.backoff_base_ms),
            backoff_cap: Duration::from_millis(cfg.backoff_cap_ms),
            ..Self::default()
        }
    }

    /// Collection timeout: half the plugin's own interval, clamped.
    pub fn timeout_for(&self, interval: Duration) -> Duration {
        (interval / 2).max(self.min_timeout)
    }
}

/// Runs one task per sampling plugin until shutdown.
pub struct CollectionScheduler {
    registry: Arc<Registry>,
    store: Arc<BufferStore>,
    config: SchedulerConfig,
    shutdown_tx: broadcast::Sender<()>,
    handles: Vec<JoinHandle<()>>,
}

impl CollectionScheduler {
    pub fn new(registry: Arc<Registry>, store: Arc<BufferStore>, config: SchedulerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            registry,
            store,
            config,
            shutdown_tx,
            handles: Vec::new(),
        }
    }

    /// Spawn a task for every `Loaded` Source/Collector plugin. Interval
    /// and buffer capacity come from the monitor config, falling back to
    /// the descriptor default and the store default.
    pub fn start(&mut self, monitor_cfg: &MonitorConfig, update_tx: mpsc::Sender<RoundUpdate>) {
        let mut descriptors = self.registry.list(CapabilityKind::Source);
        descriptors.extend(self.registry.list(CapabilityKind::Collector));

        for descriptor in descriptors {
            if self.registry.state(&descriptor.name) != Some(PluginState::Loaded) {
                continue;
            }
            let Some(instance) = self.registry.take_instance(&descriptor.name) else {
                continue;
            };
            let Some(collect) = instance.into_collect() else {
                continue;
            };

            let interval = monitor_cfg.interval_for(&descriptor.name, descriptor.default_interval);
            let capacity = monitor_cfg.capacity_for(&descriptor.name);

            let task = SourceTask {
                name: descriptor.name.clone(),
                schema: descriptor.schema.clone(),
                interval,
                timeout: self.config.timeout_for(interval),
                capacity,
                registry: Arc::clone(&self.registry),
                store: Arc::clone(&self.store),
                config: self.config.clone(),
                update_tx: update_tx.clone(),
            };

            log::info!(
                "scheduling '{}' every {:?} (capacity {})",
                descriptor.name,
                interval,
                capacity
            );
            self.handles
                .push(tokio::spawn(task.run(collect, self.shutdown_tx.subscribe())));
        }
    }

    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Signal shutdown and wait up to `grace` per task; tasks that do not
    /// finish in time are aborted and their eventual results discarded.
    pub async fn shutdown(self, grace: Duration) {
        let _ = self.shutdown_tx.send(());
        for mut handle in self.handles {
            if time::timeout(grace, &mut handle).await.is_err() {
                handle.abort();
            }
        }
    }
}

struct SourceTask {
    name: String,
    schema: Schema,
    interval: Duration,
    timeout: Duration,
    capacity: usize,
    registry: Arc<Registry>,
    store: Arc<BufferStore>,
    config: SchedulerConfig,
    update_tx: mpsc::Sender<RoundUpdate>,
}

impl SourceTask {
    async fn run(self, mut plugin: Box<dyn Collect>, mut shutdown: broadcast::Receiver<()>) {
        let stats = match self.registry.stats(&self.name) {
            Some(stats) => stats,
            None => return,
        };

        let mut consecutive_failures: u32 = 0;
        let mut backoff = self.config.backoff_base;
        let mut next_due = Instant::now();

        loop {
            tokio::select! {
                _ = time::sleep_until(next_due) => {
                    stats.record_tick();

                    let outcome = match time::timeout(self.timeout, plugin.collect()).await {
                        Ok(result) => result,
                        Err(_) => {
                            stats.record_timeout();
                            Err(CollectionError::Timeout(self.timeout))
                        }
                    };

                    let failed = match outcome {
                        Ok(samples) => {
                            let (accepted, failed) = self.apply_round(samples, &stats);
                            if !accepted.is_empty() {
                                // Exactly one insertion batch per successful
                                // collection call.
                                let _ = self.update_tx.send(RoundUpdate {
                                    plugin: self.name.clone(),
                                    samples: accepted,
                                }).await;
                            }
                            failed
                        }
                        Err(e) => {
                            stats.record_failure();
                            self.registry.record_error(&self.name, &e.to_string());
                            log::warn!("collection failed for '{}': {}", self.name, e);
                            true
                        }
                    };

                    if failed {
                        consecutive_failures += 1;
                        if consecutive_failures >= self.config.failure_threshold {
                            self.registry.disable(
                                &self.name,
                                &format!("{} consecutive failures", consecutive_failures),
                            );
                            break;
                        }
                        next_due = Instant::now() + backoff;
                        backoff = (backoff * 2).min(self.config.backoff_cap);
                    } else {
                        consecutive_failures = 0;
                        backoff = self.config.backoff_base;
                        next_due = Instant::now() + self.interval;
                    }
                }
                _ = shutdown.recv() => break,
            }
        }
    }

    /// Validate and store one round's samples. Returns the accepted samples
    /// and whether the round counts as failed (any sample rejected by the
    /// schema counts toward the failure threshold).
    fn apply_round(
        &self,
        samples: Vec<Sample>,
        stats: &crate::plugin::registry::PluginStats,
    ) -> (Vec<Sample>, bool) {
        let mut accepted = Vec::with_capacity(samples.len());
        let mut rejected = 0usize;
        let mut last_error = None;

        for sample in samples {
            self.store.create(sample.key.clone(), self.capacity);
            let previous = self.store.latest(&sample.key);
            match self.schema.validate(sample, previous.as_ref()) {
                Ok(sample) => {
                    self.store.push(sample.clone());
                    accepted.push(sample);
                }
                Err(e) => {
                    rejected += 1;
                    stats.record_schema_error();
                    log::warn!("sample rejected for '{}': {}", self.name, e);
                    last_error = Some(e.to_string());
                }
            }
        }

        let failed = if rejected > 0 {
            stats.record_failure();
            if let Some(err) = last_error {
                self.registry.record_error(&self.name, &err);
            }
            true
        } else {
            self.registry.record_success(&self.name);
            false
        };

        (accepted, failed)
    }
}
