//! CPU usage and load average source.

use std::time::Duration;

use futures_util::future::BoxFuture;
use sysinfo::{CpuRefreshKind, RefreshKind, System};

use crate::error::CollectionError;
use crate::metric::{FieldSpec, MetricType, Sample, Schema, StreamKey};
use crate::plugin::{
    ApiVersion, CapabilityKind, Collect, PluginDeclaration, PluginDescriptor, PluginInstance,
};

const NAME: &str = "cpu";

pub fn declaration() -> PluginDeclaration {
    let schema = Schema::new(vec![
        FieldSpec::gauge("usage", "percent").bounded(0.0, 100.0),
        FieldSpec::gauge("core_usage", "percent").bounded(0.0, 100.0),
        FieldSpec::gauge("load1", "load"),
        FieldSpec::gauge("load5", "load"),
        FieldSpec::gauge("load15", "load"),
    ]);
    let descriptor = PluginDescriptor::new(
        NAME,
        CapabilityKind::Source,
        ApiVersion::new(1, 0),
        Duration::from_secs(1),
        schema,
    )
    .with_description("Global and per-core CPU usage plus load averages");

    PluginDeclaration::new(
        descriptor,
        Box::new(|| PluginInstance::Source(Box::new(CpuSource::new()))),
    )
}

pub struct CpuSource {
    system: System,
}

impl CpuSource {
    pub fn new() -> Self {
        let refresh_kind = RefreshKind::nothing().with_cpu(CpuRefreshKind::everything());
        Self {
            system: System::new_with_specifics(refresh_kind),
        }
    }
}

impl Default for CpuSource {
    fn default() -> Self {
        Self::new()
    }
}

impl Collect for CpuSource {
    fn collect(&mut self) -> BoxFuture<'_, Result<Vec<Sample>, CollectionError>> {
        Box::pin(async move {
            self.system.refresh_cpu_usage();

            let mut samples = Vec::new();

            // cpu_usage() can overshoot slightly on some platforms; clamp
            // to keep the declared [0, 100] bounds honest.
            samples.push(Sample::new(
                StreamKey::new(NAME, "usage"),
                MetricType::Gauge,
                (self.system.global_cpu_usage() as f64).clamp(0.0, 100.0),
                "percent",
            ));

            for (i, cpu) in self.system.cpus().iter().enumerate() {
                samples.push(Sample::new(
                    StreamKey::with_labels(
                        NAME,
                        "core_usage",
                        [("core".to_string(), i.to_string())],
                    ),
                    MetricType::Gauge,
                    (cpu.cpu_usage() as f64).clamp(0.0, 100.0),
                    "percent",
                ));
            }

            let load = System::load_average();
            for (metric, value) in [("load1", load.one), ("load5", load.five), ("load15", load.fifteen)]
            {
                samples.push(Sample::new(
                    StreamKey::new(NAME, metric),
                    MetricType::Gauge,
                    value,
                    "load",
                ));
            }

            Ok(samples)
        })
    }
}
