//! Builtin formatter plugins.
//!
//! Formatters are regular plugins of the `formatter` capability kind; the
//! dispatcher drives them as push sinks, and the CLI uses them directly for
//! one-shot output.

pub mod json;
pub mod prometheus;

pub use json::JsonFormatter;
pub use prometheus::PrometheusFormatter;

use crate::plugin::PluginDeclaration;

pub fn builtin_declarations() -> Vec<PluginDeclaration> {
    vec![json::declaration(), prometheus::declaration()]
}
