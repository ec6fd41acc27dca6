//! JSON snapshot formatter.

use std::time::Duration;

use serde::Serialize;

use crate::dispatch::Snapshot;
use crate::error::Result;
use crate::metric::{Labels, Sample};
use crate::plugin::{
    ApiVersion, CapabilityKind, Formatter, PluginDeclaration, PluginDescriptor, PluginInstance,
};
use crate::metric::Schema;

const NAME: &str = "json";

fn labels_empty(labels: &&Labels) -> bool {
    labels.is_empty()
}

pub fn declaration() -> PluginDeclaration {
    let descriptor = PluginDescriptor::new(
        NAME,
        CapabilityKind::Formatter,
        ApiVersion::new(1, 0),
        Duration::ZERO,
        Schema::empty(),
    )
    .with_description("Snapshot as a JSON document");

    PluginDeclaration::new(
        descriptor,
        Box::new(|| PluginInstance::Formatter(Box::new(JsonFormatter::default()))),
    )
}

#[derive(Serialize)]
struct JsonSample<'a> {
    plugin: &'a str,
    metric: &'a str,
    #[serde(skip_serializing_if = "labels_empty")]
    labels: &'a Labels,
    #[serde(rename = "type")]
    metric_type: &'a str,
    value: f64,
    unit: &'a str,
    timestamp: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    reset_detected: bool,
}

impl<'a> From<&'a Sample> for JsonSample<'a> {
    fn from(sample: &'a Sample) -> Self {
        Self {
            plugin: &sample.key.plugin,
            metric: &sample.key.metric,
            labels: &sample.key.labels,
            metric_type: sample.metric_type.as_str(),
            value: sample.value,
            unit: &sample.unit,
            timestamp: sample.timestamp.to_rfc3339(),
            reset_detected: sample.reset_detected,
        }
    }
}

#[derive(Serialize)]
struct JsonSnapshot<'a> {
    round_id: u64,
    timestamp: String,
    samples: Vec<JsonSample<'a>>,
}

#[derive(Debug, Default)]
pub struct JsonFormatter {
    pub pretty: bool,
}

impl JsonFormatter {
    pub fn pretty() -> Self {
        Self { pretty: true }
    }
}

impl Formatter for JsonFormatter {
    fn on_snapshot(&mut self, snapshot: &Snapshot) -> Result<Vec<u8>> {
        let doc = JsonSnapshot {
            round_id: snapshot.round_id,
            timestamp: snapshot.timestamp.to_rfc3339(),
            samples: snapshot.latest.values().map(JsonSample::from).collect(),
        };
        let bytes = if self.pretty {
            serde_json::to_vec_pretty(&doc)?
        } else {
            serde_json::to_vec(&doc)?
        };
        Ok(bytes)
    }
}
