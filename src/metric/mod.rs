//! Core metric data model: typed samples keyed by stream.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

mod schema;

pub use schema::{FieldSpec, Schema};

/// Semantic metric types following Prometheus conventions.
///
/// COUNTER is monotonically non-decreasing within a process lifetime (a
/// decrease marks an external reset). GAUGE may move in any direction.
/// HISTOGRAM and SUMMARY are pre-aggregated distributions the core passes
/// through opaquely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    Counter,
    Gauge,
    Histogram,
    Summary,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
            MetricType::Histogram => "histogram",
            MetricType::Summary => "summary",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered label set distinguishing sub-streams (e.g. `core=0`).
pub type Labels = BTreeMap<String, String>;

/// Unique identity of one metric time series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamKey {
    pub plugin: String,
    pub metric: String,
    #[serde(default)]
    pub labels: Labels,
}

impl StreamKey {
    pub fn new<P: Into<String>, M: Into<String>>(plugin: P, metric: M) -> Self {
        Self {
            plugin: plugin.into(),
            metric: metric.into(),
            labels: Labels::new(),
        }
    }

    pub fn with_labels<P, M, I>(plugin: P, metric: M, labels: I) -> Self
    where
        P: Into<String>,
        M: Into<String>,
        I: IntoIterator<Item = (String, String)>,
    {
        Self {
            plugin: plugin.into(),
            metric: metric.into(),
            labels: labels.into_iter().collect(),
        }
    }

    /// `plugin.metric` name used by stream-pattern queries.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.plugin, self.metric)
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.plugin, self.metric)?;
        if !self.labels.is_empty() {
            let pairs: Vec<String> = self
                .labels
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            write!(f, "{{{}}}", pairs.join(","))?;
        }
        Ok(())
    }
}

/// One collected value. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub key: StreamKey,
    pub metric_type: MetricType,
    pub value: f64,
    pub unit: String,
    pub timestamp: DateTime<Utc>,
    /// Set when a counter stream decreased relative to its last accepted
    /// value. Consumers must not compute a rate across the discontinuity.
    #[serde(default)]
    pub reset_detected: bool,
}

impl Sample {
    pub fn new<U: Into<String>>(key: StreamKey, metric_type: MetricType, value: f64, unit: U) -> Self {
        Self::at(key, metric_type, value, unit, Utc::now())
    }

    pub fn at<U: Into<String>>(
        key: StreamKey,
        metric_type: MetricType,
        value: f64,
        unit: U,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            key,
            metric_type,
            value,
            unit: unit.into(),
            timestamp,
            reset_detected: false,
        }
    }

    pub(crate) fn with_reset(mut self) -> Self {
        self.reset_detected = true;
        self
    }
}
