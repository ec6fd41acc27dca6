//! Central plugin registry.
//!
//! Owns the live descriptors and their runtime state, keyed by name.
//! Registration is single-writer (discovery at startup, or a full-rebuild
//! reload); the scheduler and dispatcher only read, except for the state
//! transitions on repeated failure. A reload never mutates a live registry
//! in place: it builds a fresh one and the runtime swaps the `Arc`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::LoadError;
use crate::plugin::{
    valid_name, CapabilityKind, PluginDescriptor, PluginFactory, PluginInstance, CORE_API_VERSION,
};

/// Runtime state of a registered plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginState {
    /// Healthy; eligible for scheduling.
    Loaded,
    /// Last collection round failed; still scheduled (with backoff).
    Failed,
    /// Exceeded the consecutive-failure threshold or disabled by
    /// configuration. Excluded from scheduling until a reload.
    Disabled,
}

impl PluginState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginState::Loaded => "loaded",
            PluginState::Failed => "failed",
            PluginState::Disabled => "disabled",
        }
    }
}

/// Per-plugin runtime counters, updated lock-free by the owning scheduler
/// task and read by diagnostics.
#[derive(Debug, Default)]
pub struct PluginStats {
    ticks: AtomicU64,
    failures: AtomicU64,
    timeouts: AtomicU64,
    schema_errors: AtomicU64,
}

impl PluginStats {
    pub fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_schema_error(&self) {
        self.schema_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn timeouts(&self) -> u64 {
        self.timeouts.load(Ordering::Relaxed)
    }

    pub fn schema_errors(&self) -> u64 {
        self.schema_errors.load(Ordering::Relaxed)
    }
}

/// Diagnostic view of one registry entry.
#[derive(Debug, Clone)]
pub struct PluginRecord {
    pub descriptor: PluginDescriptor,
    pub state: PluginState,
    pub last_error: Option<String>,
    pub ticks: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub schema_errors: u64,
}

struct Entry {
    descriptor: PluginDescriptor,
    factory: PluginFactory,
    /// Instance constructed at registration; taken by the scheduler task
    /// that owns the plugin. The factory rebuilds it for a restart.
    instance: Mutex<Option<PluginInstance>>,
    state: PluginState,
    last_error: Option<String>,
    stats: Arc<PluginStats>,
}

/// The set of live plugins. Created once per discovery pass, torn down at
/// shutdown or replaced wholesale on reload.
#[derive(Default)]
pub struct Registry {
    entries: RwLock<BTreeMap<String, Entry>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin. The earlier registration wins on a name clash.
    pub fn register(
        &self,
        descriptor: PluginDescriptor,
        factory: PluginFactory,
    ) -> Result<(), LoadError> {
        if !valid_name(&descriptor.name) {
            return Err(LoadError::InvalidName(descriptor.name.clone()));
        }

        if !descriptor.api_version.compatible_with(CORE_API_VERSION) {
            return Err(LoadError::IncompatibleVersion {
                name: descriptor.name.clone(),
                declared: descriptor.api_version.to_string(),
                supported: CORE_API_VERSION.to_string(),
            });
        }

        let instance = factory();
        if instance.kind() != descriptor.kind {
            return Err(LoadError::KindMismatch {
                name: descriptor.name.clone(),
                declared: descriptor.kind.to_string(),
                actual: instance.kind().to_string(),
            });
        }

        let mut entries = self.entries.write();
        if entries.contains_key(&descriptor.name) {
            return Err(LoadError::DuplicateName(descriptor.name.clone()));
        }

        log::debug!(
            "registered plugin '{}' ({}, api {})",
            descriptor.name,
            descriptor.kind,
            descriptor.api_version
        );

        entries.insert(
            descriptor.name.clone(),
            Entry {
                descriptor,
                factory,
                instance: Mutex::new(Some(instance)),
                state: PluginState::Loaded,
                last_error: None,
                stats: Arc::new(PluginStats::default()),
            },
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<PluginDescriptor> {
        self.entries.read().get(name).map(|e| e.descriptor.clone())
    }

    /// Descriptors of one capability kind, ordered by name.
    pub fn list(&self, kind: CapabilityKind) -> Vec<PluginDescriptor> {
        self.entries
            .read()
            .values()
            .filter(|e| e.descriptor.kind == kind)
            .map(|e| e.descriptor.clone())
            .collect()
    }

    /// All entries with state and counters, for diagnostics. `Disabled`
    /// plugins stay visible here with their last error.
    pub fn records(&self) -> Vec<PluginRecord> {
        self.entries
            .read()
            .values()
            .map(|e| PluginRecord {
                descriptor: e.descriptor.clone(),
                state: e.state,
                last_error: e.last_error.clone(),
                ticks: e.stats.ticks(),
                failures: e.stats.failures(),
                timeouts: e.stats.timeouts(),
                schema_errors: e.stats.schema_errors(),
            })
            .collect()
    }

    pub fn state(&self, name: &str) -> Option<PluginState> {
        self.entries.read().get(name).map(|e| e.state)
    }

    pub fn last_error(&self, name: &str) -> Option<String> {
        self.entries.read().get(name).and_then(|e| e.last_error.clone())
    }

    pub fn stats(&self, name: &str) -> Option<Arc<PluginStats>> {
        self.entries.read().get(name).map(|e| Arc::clone(&e.stats))
    }

    /// Take the plugin's instance for a scheduler task to own. Rebuilds via
    /// the factory if it was already taken (scheduler restart).
    pub fn take_instance(&self, name: &str) -> Option<PluginInstance> {
        let entries = self.entries.read();
        let entry = entries.get(name)?;
        let mut slot = entry.instance.lock();
        Some(slot.take().unwrap_or_else(|| (entry.factory)()))
    }

    /// Transition to `Disabled`. Terminal until a reload re-registers.
    pub fn disable(&self, name: &str, reason: &str) {
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get_mut(name) {
            log::warn!("plugin '{}' disabled: {}", name, reason);
            entry.state = PluginState::Disabled;
            entry.last_error = Some(reason.to_string());
        }
    }

    /// Record a failed round. Keeps the plugin scheduled.
    pub fn record_error(&self, name: &str, error: &str) {
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get_mut(name) {
            if entry.state == PluginState::Loaded {
                entry.state = PluginState::Failed;
            }
            entry.last_error = Some(error.to_string());
        }
    }

    /// Record a clean round; a previously failed plugin recovers.
    pub fn record_success(&self, name: &str) {
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get_mut(name) {
            if entry.state == PluginState::Failed {
                log::info!("plugin '{}' recovered", name);
                entry.state = PluginState::Loaded;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
