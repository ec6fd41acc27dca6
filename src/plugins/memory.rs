//! Memory and swap usage source.

use std::time::Duration;

use futures_util::future::BoxFuture;
use sysinfo::{MemoryRefreshKind, RefreshKind, System};

use crate::error::CollectionError;
use crate::metric::{FieldSpec, MetricType, Sample, Schema, StreamKey};
use crate::plugin::{
    ApiVersion, CapabilityKind, Collect, PluginDeclaration, PluginDescriptor, PluginInstance,
};

const NAME: &str = "memory";

pub fn declaration() -> PluginDeclaration {
    let schema = Schema::new(vec![
        FieldSpec::gauge("usage", "percent").bounded(0.0, 100.0),
        FieldSpec::gauge("used_bytes", "bytes"),
        FieldSpec::gauge("available_bytes", "bytes"),
        FieldSpec::gauge("swap_usage", "percent").bounded(0.0, 100.0),
    ]);
    let descriptor = PluginDescriptor::new(
        NAME,
        CapabilityKind::Source,
        ApiVersion::new(1, 0),
        Duration::from_secs(2),
        schema,
    )
    .with_description("RAM and swap usage");

    PluginDeclaration::new(
        descriptor,
        Box::new(|| PluginInstance::Source(Box::new(MemorySource::new()))),
    )
}

pub struct MemorySource {
    system: System,
}

impl MemorySource {
    pub fn new() -> Self {
        let refresh_kind = RefreshKind::nothing().with_memory(MemoryRefreshKind::everything());
        Self {
            system: System::new_with_specifics(refresh_kind),
        }
    }
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

fn percent(used: u64, total: u64) -> f64 {
    if total > 0 {
        (used as f64 / total as f64) * 100.0
    } else {
        0.0
    }
}

impl Collect for MemorySource {
    fn collect(&mut self) -> BoxFuture<'_, Result<Vec<Sample>, CollectionError>> {
        Box::pin(async move {
            self.system.refresh_memory();

            let total = self.system.total_memory();
            let used = self.system.used_memory();

            Ok(vec![
                Sample::new(
                    StreamKey::new(NAME, "usage"),
                    MetricType::Gauge,
                    percent(used, total),
                    "percent",
                ),
                Sample::new(
                    StreamKey::new(NAME, "used_bytes"),
                    MetricType::Gauge,
                    used as f64,
                    "bytes",
                ),
                Sample::new(
                    StreamKey::new(NAME, "available_bytes"),
                    MetricType::Gauge,
                    self.system.available_memory() as f64,
                    "bytes",
                ),
                Sample::new(
                    StreamKey::new(NAME, "swap_usage"),
                    MetricType::Gauge,
                    percent(self.system.used_swap(), self.system.total_swap()),
                    "percent",
                ),
            ])
        })
    }
}
