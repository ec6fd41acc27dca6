// upmon - pluggable system metrics collection core

pub mod error;
pub use error::{Result, UpmonError};

pub mod config;
pub mod dispatch;
pub mod format;
pub mod metric;
pub mod plugin;
pub mod plugins;
pub mod runtime;
pub mod scheduler;
pub mod store;

pub use config::MonitorConfig;
pub use dispatch::{Snapshot, SnapshotHandle};
pub use metric::{Labels, MetricType, Sample, Schema, StreamKey};
pub use plugin::{CapabilityKind, PluginDescriptor, Registry};
pub use runtime::Monitor;

// Initialize logging
pub fn init_logging() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();
}
