//! Per-mount filesystem usage source.

use std::time::Duration;

use futures_util::future::BoxFuture;
use sysinfo::Disks;

use crate::error::CollectionError;
use crate::metric::{FieldSpec, MetricType, Sample, Schema, StreamKey};
use crate::plugin::{
    ApiVersion, CapabilityKind, Collect, PluginDeclaration, PluginDescriptor, PluginInstance,
};

const NAME: &str = "disk";

pub fn declaration() -> PluginDeclaration {
    let schema = Schema::new(vec![
        FieldSpec::gauge("usage", "percent").bounded(0.0, 100.0),
        FieldSpec::gauge("available_bytes", "bytes"),
        FieldSpec::gauge("total_bytes", "bytes"),
    ]);
    let descriptor = PluginDescriptor::new(
        NAME,
        CapabilityKind::Source,
        ApiVersion::new(1, 0),
        Duration::from_secs(5),
        schema,
    )
    .with_description("Filesystem capacity per mount point");

    PluginDeclaration::new(
        descriptor,
        Box::new(|| PluginInstance::Source(Box::new(DiskSource::new()))),
    )
}

pub struct DiskSource {
    disks: Disks,
}

impl DiskSource {
    pub fn new() -> Self {
        Self {
            disks: Disks::new_with_refreshed_list(),
        }
    }
}

impl Default for DiskSource {
    fn default() -> Self {
        Self::new()
    }
}

fn gauge(mount: &str, metric: &str, value: f64, unit: &str) -> Sample {
    let key = StreamKey::with_labels(NAME, metric, [("mount".to_string(), mount.to_string())]);
    Sample::new(key, MetricType::Gauge, value, unit)
}

impl Collect for DiskSource {
    fn collect(&mut self) -> BoxFuture<'_, Result<Vec<Sample>, CollectionError>> {
        Box::pin(async move {
            self.disks.refresh(true);

            let mut samples = Vec::new();
            for disk in self.disks.iter() {
                let mount = disk.mount_point().to_string_lossy().to_string();
                let total = disk.total_space();
                if total == 0 {
                    // Pseudo-filesystems report zero capacity, skip them.
                    continue;
                }
                let available = disk.available_space();
                let used_pct =
                    ((total - available.min(total)) as f64 / total as f64 * 100.0).clamp(0.0, 100.0);

                samples.push(gauge(&mount, "usage", used_pct, "percent"));
                samples.push(gauge(&mount, "available_bytes", available as f64, "bytes"));
                samples.push(gauge(&mount, "total_bytes", total as f64, "bytes"));
            }
            Ok(samples)
        })
    }
}
