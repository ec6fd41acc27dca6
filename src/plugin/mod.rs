//! Plugin capability contracts and descriptors.
//!
//! Every plugin is a value implementing one of four explicit capability
//! interfaces: sources and collectors produce [`Sample`]s, formatters turn
//! snapshots into bytes, actions run user-triggered operations. Discovery
//! produces a closed, typed [`PluginDescriptor`] for each; nothing is probed
//! at runtime.
//!
//! Trust model: the registry validates names, versions and schemas only. It
//! performs no code-level isolation; a registered plugin runs with the
//! process's privileges.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::dispatch::Snapshot;
use crate::error::{CollectionError, Result};
use crate::metric::{Sample, Schema, StreamKey};

pub mod discovery;
pub mod manifest;
pub mod registry;

pub use discovery::{Discovery, DiscoveryReport};
pub use registry::{PluginRecord, PluginState, PluginStats, Registry};

/// The plugin API version this core supports. Plugins with a different
/// major version are rejected at discovery.
pub const CORE_API_VERSION: ApiVersion = ApiVersion { major: 1, minor: 0 };

/// Semantic plugin API version; a major bump is breaking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ApiVersion {
    pub major: u32,
    pub minor: u32,
}

impl ApiVersion {
    pub fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Major-version match, the same rule for both directions.
    pub fn compatible_with(&self, core: ApiVersion) -> bool {
        self.major == core.major
    }
}

impl FromStr for ApiVersion {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (major, minor) = s
            .split_once('.')
            .ok_or_else(|| format!("invalid api version '{}'", s))?;
        let major = major
            .parse::<u32>()
            .map_err(|_| format!("invalid api version '{}'", s))?;
        let minor = minor
            .parse::<u32>()
            .map_err(|_| format!("invalid api version '{}'", s))?;
        Ok(Self { major, minor })
    }
}

impl TryFrom<String> for ApiVersion {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ApiVersion> for String {
    fn from(v: ApiVersion) -> String {
        v.to_string()
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Closed set of plugin capability kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityKind {
    Source,
    Collector,
    Formatter,
    Action,
}

impl CapabilityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CapabilityKind::Source => "source",
            CapabilityKind::Collector => "collector",
            CapabilityKind::Formatter => "formatter",
            CapabilityKind::Action => "action",
        }
    }

    /// Kinds the scheduler runs on a timer.
    pub fn is_sampling(&self) -> bool {
        matches!(self, CapabilityKind::Source | CapabilityKind::Collector)
    }
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the registry knows about a plugin before running it.
#[derive(Debug, Clone)]
pub struct PluginDescriptor {
    pub name: String,
    pub kind: CapabilityKind,
    pub api_version: ApiVersion,
    pub default_interval: Duration,
    pub schema: Schema,
    pub description: String,
}

impl PluginDescriptor {
    pub fn new<N: Into<String>>(
        name: N,
        kind: CapabilityKind,
        api_version: ApiVersion,
        default_interval: Duration,
        schema: Schema,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            api_version,
            default_interval,
            schema,
            description: String::new(),
        }
    }

    pub fn with_description<D: Into<String>>(mut self, description: D) -> Self {
        self.description = description.into();
        self
    }
}

/// Plugin names must match `[a-z][a-z0-9_]*`.
pub fn valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Sampling capability shared by Source and Collector plugins.
///
/// One call produces the samples for one tick; the scheduler caps it with a
/// timeout derived from the plugin's own interval.
pub trait Collect: Send {
    fn collect(&mut self) -> BoxFuture<'_, std::result::Result<Vec<Sample>, CollectionError>>;
}

/// Formatter capability: snapshot in, serialized bytes out.
///
/// Formatters double as push sinks on the dispatcher.
pub trait Formatter: Send {
    fn on_snapshot(&mut self, snapshot: &Snapshot) -> Result<Vec<u8>>;
}

/// Context handed to an action by the display/CLI layer.
#[derive(Debug, Clone, Default)]
pub struct ActionContext {
    pub stream: Option<StreamKey>,
    pub argument: Option<String>,
}

/// Outcome of a triggered action.
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    pub success: bool,
    pub message: String,
}

/// Action capability: user-triggered operations, consumed by the excluded
/// display/CLI layers. The core only registers and lists them.
pub trait Action: Send {
    fn can_execute(&self, context: &ActionContext) -> bool;

    fn execute(&mut self, context: ActionContext) -> BoxFuture<'_, Result<ActionOutcome>>;
}

/// A constructed plugin, typed by capability.
pub enum PluginInstance {
    Source(Box<dyn Collect>),
    Collector(Box<dyn Collect>),
    Formatter(Box<dyn Formatter>),
    Action(Box<dyn Action>),
}

impl PluginInstance {
    pub fn kind(&self) -> CapabilityKind {
        match self {
            PluginInstance::Source(_) => CapabilityKind::Source,
            PluginInstance::Collector(_) => CapabilityKind::Collector,
            PluginInstance::Formatter(_) => CapabilityKind::Formatter,
            PluginInstance::Action(_) => CapabilityKind::Action,
        }
    }

    pub fn into_collect(self) -> Option<Box<dyn Collect>> {
        match self {
            PluginInstance::Source(c) | PluginInstance::Collector(c) => Some(c),
            _ => None,
        }
    }

    pub fn into_formatter(self) -> Option<Box<dyn Formatter>> {
        match self {
            PluginInstance::Formatter(f) => Some(f),
            _ => None,
        }
    }
}

/// Constructs a fresh plugin instance; called at registration (to type-check
/// the capability) and whenever the scheduler needs a new instance.
pub type PluginFactory = Box<dyn Fn() -> PluginInstance + Send + Sync>;

/// A descriptor paired with its factory, as produced by discovery sources.
pub struct PluginDeclaration {
    pub descriptor: PluginDescriptor,
    pub factory: PluginFactory,
}

impl PluginDeclaration {
    pub fn new(descriptor: PluginDescriptor, factory: PluginFactory) -> Self {
        Self {
            descriptor,
            factory,
        }
    }
}
