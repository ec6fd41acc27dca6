//! Directory plugins described by JSON manifests.
//!
//! A manifest declares a sampling plugin backed by an external command. On
//! every tick the command runs to completion and prints a JSON array of
//! readings on stdout:
//!
//! ```json
//! [{"metric": "queue_depth", "value": 12.0, "labels": {"queue": "default"}}]
//! ```
//!
//! Metric type and unit come from the manifest's declared schema, so the
//! command only reports values; everything else is validated like any
//! builtin plugin.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::Deserialize;
use tokio::process::Command;

use crate::config::checked_interval;
use crate::error::{CollectionError, LoadError};
use crate::metric::{FieldSpec, Labels, MetricType, Sample, Schema, StreamKey};
use crate::plugin::{
    ApiVersion, CapabilityKind, Collect, PluginDeclaration, PluginDescriptor, PluginInstance,
};

#[derive(Debug, Deserialize)]
struct ManifestField {
    metric: String,
    #[serde(rename = "type")]
    metric_type: MetricType,
    unit: String,
    #[serde(default)]
    min: Option<f64>,
    #[serde(default)]
    max: Option<f64>,
}

/// On-disk manifest shape (`<plugin_dir>/<name>.json`).
#[derive(Debug, Deserialize)]
pub struct PluginManifest {
    pub name: String,
    pub api_version: ApiVersion,
    pub kind: CapabilityKind,
    #[serde(default)]
    interval_secs: Option<f64>,
    command: Vec<String>,
    #[serde(default)]
    description: String,
    metrics: Vec<ManifestField>,
}

fn bad<P: AsRef<Path>, R: Into<String>>(path: P, reason: R) -> LoadError {
    LoadError::BadManifest {
        path: path.as_ref().display().to_string(),
        reason: reason.into(),
    }
}

/// Parse one manifest file into a registerable plugin declaration.
///
/// `default_interval` applies when the manifest declares no
/// `interval_secs` of its own. Only structural problems are rejected
/// here; name, version and duplicate checks stay in the registry so every
/// plugin source gets the same rules.
pub fn load(path: &Path, default_interval: Duration) -> Result<PluginDeclaration, LoadError> {
    let text = std::fs::read_to_string(path).map_err(|e| bad(path, e.to_string()))?;
    let manifest: PluginManifest =
        serde_json::from_str(&text).map_err(|e| bad(path, e.to_string()))?;

    if !manifest.kind.is_sampling() {
        return Err(bad(
            path,
            format!("exec plugins must be source or collector, got {}", manifest.kind),
        ));
    }
    if manifest.command.is_empty() {
        return Err(bad(path, "empty command"));
    }
    if manifest.metrics.is_empty() {
        return Err(bad(path, "no metrics declared"));
    }
    let interval = match manifest.interval_secs {
        Some(secs) => checked_interval(secs)
            .ok_or_else(|| bad(path, format!("invalid interval_secs {}", secs)))?,
        None => default_interval,
    };

    let fields = manifest
        .metrics
        .iter()
        .map(|f| {
            let mut spec = FieldSpec::new(&f.metric, f.metric_type, &f.unit);
            if let (Some(min), Some(max)) = (f.min, f.max) {
                spec = spec.bounded(min, max);
            }
            spec
        })
        .collect();
    let schema = Schema::new(fields);

    let descriptor = PluginDescriptor::new(
        manifest.name.clone(),
        manifest.kind,
        manifest.api_version,
        interval,
        schema,
    )
    .with_description(manifest.description.clone());

    let spec = Arc::new(ExecSpec {
        plugin: manifest.name,
        command: manifest.command,
        fields: descriptor
            .schema
            .fields()
            .iter()
            .map(|f| (f.metric.clone(), (f.metric_type, f.unit.clone())))
            .collect(),
    });
    let kind = manifest.kind;

    Ok(PluginDeclaration::new(
        descriptor,
        Box::new(move || {
            let source = Box::new(ExecSource::new(Arc::clone(&spec)));
            match kind {
                CapabilityKind::Collector => PluginInstance::Collector(source),
                _ => PluginInstance::Source(source),
            }
        }),
    ))
}

/// Shared, immutable description of how to run and interpret one exec plugin.
struct ExecSpec {
    plugin: String,
    command: Vec<String>,
    fields: BTreeMap<String, (MetricType, String)>,
}

#[derive(Debug, Deserialize)]
struct ExecReading {
    metric: String,
    value: f64,
    #[serde(default)]
    labels: Labels,
}

pub struct ExecSource {
    spec: Arc<ExecSpec>,
}

impl ExecSource {
    fn new(spec: Arc<ExecSpec>) -> Self {
        Self { spec }
    }

    fn parse(&self, stdout: &[u8]) -> Result<Vec<Sample>, CollectionError> {
        let readings: Vec<ExecReading> = serde_json::from_slice(stdout)
            .map_err(|e| CollectionError::failed(format!("bad plugin output: {}", e)))?;

        let mut samples = Vec::with_capacity(readings.len());
        for reading in readings {
            // Unknown metrics pass through; schema validation rejects and
            // counts them like any other contract violation.
            let (metric_type, unit) = self
                .spec
                .fields
                .get(&reading.metric)
                .cloned()
                .unwrap_or((MetricType::Gauge, String::new()));
            let key = StreamKey::with_labels(
                self.spec.plugin.clone(),
                reading.metric,
                reading.labels,
            );
            samples.push(Sample::new(key, metric_type, reading.value, unit));
        }
        Ok(samples)
    }
}

impl Collect for ExecSource {
    fn collect(&mut self) -> BoxFuture<'_, Result<Vec<Sample>, CollectionError>> {
        Box::pin(async move {
            let output = Command::new(&self.spec.command[0])
                .args(&self.spec.command[1..])
                .kill_on_drop(true)
                .output()
                .await
                .map_err(|e| CollectionError::unavailable(e.to_string()))?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(CollectionError::failed(format!(
                    "command exited with {}: {}",
                    output.status,
                    stderr.trim()
                )));
            }
            self.parse(&output.stdout)
        })
    }
}
