//! Plugin discovery.
//!
//! Builds a fresh [`Registry`] from the builtin declaration table plus a
//! non-recursive scan of the user plugin directory for `*.json` manifests.
//! Builtins register first, so a manifest can never shadow a builtin name.
//! Every rejection lands in the [`DiscoveryReport`] instead of aborting the
//! pass; one broken plugin costs only itself.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config::MonitorConfig;
use crate::error::LoadError;
use crate::plugin::{manifest, registry::Registry, PluginDeclaration};

/// What one discovery pass found.
#[derive(Debug, Default)]
pub struct DiscoveryReport {
    /// Names that registered, in registration order.
    pub loaded: Vec<String>,
    /// Rejected candidates: manifest path or plugin name, with the reason.
    pub rejected: Vec<(String, LoadError)>,
}

impl DiscoveryReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

pub struct Discovery {
    plugin_dir: Option<PathBuf>,
}

impl Discovery {
    pub fn new(plugin_dir: Option<PathBuf>) -> Self {
        Self { plugin_dir }
    }

    pub fn from_config(config: &MonitorConfig) -> Self {
        Self::new(Some(config.plugin_dir()))
    }

    /// Run one full pass: builtins, then manifests, then config-level
    /// disables. Returns the new registry and the report.
    pub fn run(&self, config: &MonitorConfig) -> (Arc<Registry>, DiscoveryReport) {
        let registry = Registry::new();
        let mut report = DiscoveryReport::default();

        for declaration in builtin_declarations() {
            register(&registry, declaration, &mut report);
        }
        if let Some(dir) = &self.plugin_dir {
            self.scan_manifests(dir, config.default_interval(), &registry, &mut report);
        }

        for name in &report.loaded {
            if !config.enabled(name) {
                registry.disable(name, "disabled by configuration");
            }
        }

        log::info!(
            "discovery: {} plugin(s) loaded, {} rejected",
            report.loaded.len(),
            report.rejected.len()
        );
        (Arc::new(registry), report)
    }

    /// Non-recursive `*.json` scan, in lexical order so a duplicate-name
    /// conflict always resolves the same way between runs.
    fn scan_manifests(
        &self,
        dir: &Path,
        default_interval: Duration,
        registry: &Registry,
        report: &mut DiscoveryReport,
    ) {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                log::debug!("plugin directory {} not scanned: {}", dir.display(), e);
                return;
            }
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        for path in paths {
            match manifest::load(&path, default_interval) {
                Ok(declaration) => register(registry, declaration, report),
                Err(e) => {
                    log::warn!("skipping manifest {}: {}", path.display(), e);
                    report.rejected.push((manifest_reject_key(&path), e));
                }
            }
        }
    }
}

/// Report key for a rejected manifest: the declared plugin name when the
/// JSON is at least parseable, the file stem otherwise.
fn manifest_reject_key(path: &Path) -> String {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|text| serde_json::from_str::<serde_json::Value>(&text).ok())
        .and_then(|doc| doc.get("name")?.as_str().map(str::to_string))
        .unwrap_or_else(|| {
            path.file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string())
        })
}

fn register(registry: &Registry, declaration: PluginDeclaration, report: &mut DiscoveryReport) {
    let name = declaration.descriptor.name.clone();
    match registry.register(declaration.descriptor, declaration.factory) {
        Ok(()) => report.loaded.push(name),
        Err(e) => {
            log::warn!("plugin '{}' rejected: {}", name, e);
            report.rejected.push((name, e));
        }
    }
}

/// Everything compiled into the binary: the four system sources plus the
/// builtin formatters.
fn builtin_declarations() -> Vec<PluginDeclaration> {
    let mut declarations = crate::plugins::builtin_declarations();
    declarations.extend(crate::format::builtin_declarations());
    declarations
}
