//! Declared output shape of a plugin and sample validation.
//!
//! Every sample passes validation against its plugin's declared schema
//! before it may enter a ring buffer: the metric must be declared, the
//! metric type and unit must match, and declared numeric bounds must hold.
//! A counter that decreased is still accepted (legitimate resets happen on
//! process restart) but comes back tagged with `reset_detected`.

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::metric::{MetricType, Sample};

/// Declaration of one metric a plugin can emit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub metric: String,
    #[serde(rename = "type")]
    pub metric_type: MetricType,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

impl FieldSpec {
    pub fn gauge<M: Into<String>, U: Into<String>>(metric: M, unit: U) -> Self {
        Self::new(metric, MetricType::Gauge, unit)
    }

    pub fn counter<M: Into<String>, U: Into<String>>(metric: M, unit: U) -> Self {
        Self::new(metric, MetricType::Counter, unit)
    }

    pub fn new<M: Into<String>, U: Into<String>>(metric: M, metric_type: MetricType, unit: U) -> Self {
        Self {
            metric: metric.into(),
            metric_type,
            unit: unit.into(),
            min: None,
            max: None,
        }
    }

    /// Restrict accepted values to `[min, max]`.
    pub fn bounded(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }
}

/// The set of metrics a plugin declares, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<FieldSpec>,
}

impl Schema {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    /// Empty schema, used by capability kinds that emit no samples.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, metric: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.metric == metric)
    }

    /// Validate a sample against this schema.
    ///
    /// `last` is the stream's most recent accepted sample; it drives the
    /// counter-reset check. Returns the sample (tagged when a counter
    /// decreased) or the violation that rejects it.
    pub fn validate(&self, sample: Sample, last: Option<&Sample>) -> Result<Sample, SchemaError> {
        let spec = self
            .field(&sample.key.metric)
            .ok_or_else(|| SchemaError::UnknownMetric(sample.key.metric.clone()))?;

        if spec.metric_type != sample.metric_type {
            return Err(SchemaError::TypeMismatch {
                metric: spec.metric.clone(),
                declared: spec.metric_type,
                actual: sample.metric_type,
            });
        }

        if spec.unit != sample.unit {
            return Err(SchemaError::UnitMismatch {
                metric: spec.metric.clone(),
                declared: spec.unit.clone(),
                actual: sample.unit.clone(),
            });
        }

        if !sample.value.is_finite() {
            return Err(SchemaError::NotFinite {
                metric: spec.metric.clone(),
            });
        }

        if let (Some(min), Some(max)) = (spec.min, spec.max) {
            if sample.value < min || sample.value > max {
                return Err(SchemaError::OutOfBounds {
                    metric: spec.metric.clone(),
                    value: sample.value,
                    min,
                    max,
                });
            }
        }

        if sample.metric_type == MetricType::Counter {
            if let Some(prev) = last {
                if sample.value < prev.value {
                    return Ok(sample.with_reset());
                }
            }
        }

        Ok(sample)
    }
}
