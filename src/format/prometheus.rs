//! Prometheus text exposition formatter.
//!
//! Emits one family per `plugin.metric` stream group, prefixed with
//! `upmon_`, with `# HELP` / `# TYPE` headers and escaped label values.

use std::time::Duration;

use crate::dispatch::Snapshot;
use crate::error::Result;
use crate::metric::{MetricType, Sample, Schema};
use crate::plugin::{
    ApiVersion, CapabilityKind, Formatter, PluginDeclaration, PluginDescriptor, PluginInstance,
};

const NAME: &str = "prometheus";
const PREFIX: &str = "upmon";

pub fn declaration() -> PluginDeclaration {
    let descriptor = PluginDescriptor::new(
        NAME,
        CapabilityKind::Formatter,
        ApiVersion::new(1, 0),
        Duration::ZERO,
        Schema::empty(),
    )
    .with_description("Prometheus text exposition format");

    PluginDeclaration::new(
        descriptor,
        Box::new(|| PluginInstance::Formatter(Box::new(PrometheusFormatter))),
    )
}

/// Lowercase the name and replace anything outside `[a-z0-9_]` with `_`.
fn sanitize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
            out.push(c);
        } else {
            out.push('_');
        }
    }
    if out.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

fn escape_label_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

fn family_name(sample: &Sample) -> String {
    format!(
        "{}_{}_{}",
        PREFIX,
        sanitize(&sample.key.plugin),
        sanitize(&sample.key.metric)
    )
}

/// Prometheus has no native histogram/summary point representation for a
/// single pre-aggregated value, so those fall back to gauge.
fn prometheus_type(metric_type: MetricType) -> &'static str {
    match metric_type {
        MetricType::Counter => "counter",
        MetricType::Gauge | MetricType::Histogram | MetricType::Summary => "gauge",
    }
}

#[derive(Debug, Default)]
pub struct PrometheusFormatter;

impl Formatter for PrometheusFormatter {
    fn on_snapshot(&mut self, snapshot: &Snapshot) -> Result<Vec<u8>> {
        let mut out = String::new();
        let mut current_family: Option<String> = None;

        // Snapshot streams are name-ordered, so one pass groups families.
        for sample in snapshot.latest.values() {
            let family = family_name(sample);
            if current_family.as_deref() != Some(&family) {
                out.push_str(&format!(
                    "# HELP {} {} ({})\n",
                    family,
                    sample.key.qualified_name(),
                    sample.unit
                ));
                out.push_str(&format!(
                    "# TYPE {} {}\n",
                    family,
                    prometheus_type(sample.metric_type)
                ));
                current_family = Some(family.clone());
            }

            if sample.key.labels.is_empty() {
                out.push_str(&format!("{} {}\n", family, sample.value));
            } else {
                let labels: Vec<String> = sample
                    .key
                    .labels
                    .iter()
                    .map(|(k, v)| format!("{}=\"{}\"", sanitize(k), escape_label_value(v)))
                    .collect();
                out.push_str(&format!("{}{{{}}} {}\n", family, labels.join(","), sample.value));
            }
        }

        Ok(out.into_bytes())
    }
}
