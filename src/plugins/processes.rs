//! Process table summary source.

use std::time::Duration;

use futures_util::future::BoxFuture;
use sysinfo::{ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, RefreshKind, System};

use crate::error::CollectionError;
use crate::metric::{FieldSpec, MetricType, Sample, Schema, StreamKey};
use crate::plugin::{
    ApiVersion, CapabilityKind, Collect, PluginDeclaration, PluginDescriptor, PluginInstance,
};

const NAME: &str = "processes";

pub fn declaration() -> PluginDeclaration {
    let schema = Schema::new(vec![
        FieldSpec::gauge("total_count", "processes"),
        FieldSpec::gauge("running_count", "processes"),
        FieldSpec::gauge("thread_count", "threads"),
    ]);
    let descriptor = PluginDescriptor::new(
        NAME,
        CapabilityKind::Source,
        ApiVersion::new(1, 0),
        Duration::from_secs(2),
        schema,
    )
    .with_description("Process and thread counts");

    PluginDeclaration::new(
        descriptor,
        Box::new(|| PluginInstance::Source(Box::new(ProcessSource::new()))),
    )
}

pub struct ProcessSource {
    system: System,
}

impl ProcessSource {
    pub fn new() -> Self {
        Self {
            system: System::new_with_specifics(RefreshKind::nothing()),
        }
    }
}

impl Default for ProcessSource {
    fn default() -> Self {
        Self::new()
    }
}

fn gauge(metric: &str, value: f64, unit: &str) -> Sample {
    Sample::new(StreamKey::new(NAME, metric), MetricType::Gauge, value, unit)
}

impl Collect for ProcessSource {
    fn collect(&mut self) -> BoxFuture<'_, Result<Vec<Sample>, CollectionError>> {
        Box::pin(async move {
            // Only the task lists beyond the base refresh; per-process cpu
            // and memory are the cpu/memory plugins' concern.
            self.system.refresh_processes_specifics(
                ProcessesToUpdate::All,
                true,
                ProcessRefreshKind::nothing().with_tasks(),
            );

            let mut total = 0u64;
            let mut running = 0u64;
            let mut threads = 0u64;
            for process in self.system.processes().values() {
                total += 1;
                if process.status() == ProcessStatus::Run {
                    running += 1;
                }
                if let Some(tasks) = process.tasks() {
                    threads += tasks.len() as u64;
                }
            }
            // A process with no visible task list still has its main thread.
            threads = threads.max(total);

            Ok(vec![
                gauge("total_count", total as f64, "processes"),
                gauge("running_count", running as f64, "processes"),
                gauge("thread_count", threads as f64, "threads"),
            ])
        })
    }
}
