//! Per-interface network throughput source.
//!
//! All streams are cumulative counters, so the validation layer tags
//! decreases (interface resets, driver reloads) on the way in.

use std::time::Duration;

use futures_util::future::BoxFuture;
use sysinfo::Networks;

use crate::error::CollectionError;
use crate::metric::{FieldSpec, MetricType, Sample, StreamKey, Schema};
use crate::plugin::{
    ApiVersion, CapabilityKind, Collect, PluginDeclaration, PluginDescriptor, PluginInstance,
};

const NAME: &str = "network";

pub fn declaration() -> PluginDeclaration {
    let schema = Schema::new(vec![
        FieldSpec::counter("rx_bytes", "bytes"),
        FieldSpec::counter("tx_bytes", "bytes"),
        FieldSpec::counter("rx_packets", "packets"),
        FieldSpec::counter("tx_packets", "packets"),
    ]);
    let descriptor = PluginDescriptor::new(
        NAME,
        CapabilityKind::Source,
        ApiVersion::new(1, 0),
        Duration::from_secs(1),
        schema,
    )
    .with_description("Per-interface traffic counters");

    PluginDeclaration::new(
        descriptor,
        Box::new(|| PluginInstance::Source(Box::new(NetworkSource::new()))),
    )
}

pub struct NetworkSource {
    networks: Networks,
}

impl NetworkSource {
    pub fn new() -> Self {
        Self {
            networks: Networks::new_with_refreshed_list(),
        }
    }
}

impl Default for NetworkSource {
    fn default() -> Self {
        Self::new()
    }
}

fn counter(interface: &str, metric: &str, value: u64, unit: &str) -> Sample {
    let key = StreamKey::with_labels(
        NAME,
        metric,
        [("interface".to_string(), interface.to_string())],
    );
    Sample::new(key, MetricType::Counter, value as f64, unit)
}

impl Collect for NetworkSource {
    fn collect(&mut self) -> BoxFuture<'_, Result<Vec<Sample>, CollectionError>> {
        Box::pin(async move {
            self.networks.refresh(true);

            let mut samples = Vec::new();
            for (interface, data) in self.networks.iter() {
                samples.push(counter(interface, "rx_bytes", data.total_received(), "bytes"));
                samples.push(counter(
                    interface,
                    "tx_bytes",
                    data.total_transmitted(),
                    "bytes",
                ));
                samples.push(counter(
                    interface,
                    "rx_packets",
                    data.total_packets_received(),
                    "packets",
                ));
                samples.push(counter(
                    interface,
                    "tx_packets",
                    data.total_packets_transmitted(),
                    "packets",
                ));
            }
            Ok(samples)
        })
    }
}
