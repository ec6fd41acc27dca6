use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::metric::MetricType;

/// Errors raised while loading or registering a plugin.
///
/// These are reported once, in the discovery report, and are never fatal to
/// the process: one broken plugin must not prevent the rest from loading.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadError {
    #[error("duplicate plugin name '{0}'")]
    DuplicateName(String),

    #[error("plugin '{name}' targets api {declared}, core supports {supported}")]
    IncompatibleVersion {
        name: String,
        declared: String,
        supported: String,
    },

    #[error("invalid plugin name '{0}' (expected [a-z][a-z0-9_]*)")]
    InvalidName(String),

    #[error("plugin '{name}' declares kind {declared} but its implementation is {actual}")]
    KindMismatch {
        name: String,
        declared: String,
        actual: String,
    },

    #[error("bad plugin manifest {path}: {reason}")]
    BadManifest { path: String, reason: String },
}

/// Transient failure of one plugin's sampling call.
///
/// Retried with backoff; surfaced as a stale-data marker on that plugin's
/// streams only.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CollectionError {
    #[error("collection timed out after {0:?}")]
    Timeout(Duration),

    #[error("source unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Failed(String),
}

impl CollectionError {
    pub fn failed<S: Into<String>>(msg: S) -> Self {
        CollectionError::Failed(msg.into())
    }

    pub fn unavailable<S: Into<String>>(msg: S) -> Self {
        CollectionError::Unavailable(msg.into())
    }
}

/// Plugin output violated its own declared schema. The sample is dropped and
/// counted toward the failure threshold.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("metric '{0}' is not declared by the plugin schema")]
    UnknownMetric(String),

    #[error("metric '{metric}' type mismatch: declared {declared}, sample {actual}")]
    TypeMismatch {
        metric: String,
        declared: MetricType,
        actual: MetricType,
    },

    #[error("metric '{metric}' unit mismatch: declared '{declared}', sample '{actual}'")]
    UnitMismatch {
        metric: String,
        declared: String,
        actual: String,
    },

    #[error("metric '{metric}' value {value} outside declared bounds [{min}, {max}]")]
    OutOfBounds {
        metric: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("metric '{metric}' value is not finite")]
    NotFinite { metric: String },
}

/// Top-level error type for the upmon library.
#[derive(Error, Debug)]
pub enum UpmonError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Collection(#[from] CollectionError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Format error: {0}")]
    Format(String),

    #[error("Plugin '{0}' is not registered")]
    PluginNotFound(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for the upmon library.
pub type Result<T> = std::result::Result<T, UpmonError>;

impl UpmonError {
    /// Create a config error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        UpmonError::Config(msg.into())
    }

    /// Create a format error
    pub fn format<S: Into<String>>(msg: S) -> Self {
        UpmonError::Format(msg.into())
    }

    /// Create a generic error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        UpmonError::Other(msg.into())
    }
}
