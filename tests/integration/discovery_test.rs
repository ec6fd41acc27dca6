// Manifest discovery against real directories, including running an
// exec-backed plugin end to end.

use std::time::Duration;

use upmon::config::{MonitorConfig, PluginOverrides};
use upmon::error::LoadError;
use upmon::plugin::{CapabilityKind, Discovery, PluginState};

fn write_manifest(dir: &tempfile::TempDir, file: &str, text: &str) {
    std::fs::write(dir.path().join(file), text).unwrap();
}

fn config_with_dir(dir: &tempfile::TempDir) -> MonitorConfig {
    MonitorConfig {
        plugin_dir: Some(dir.path().to_path_buf()),
        ..Default::default()
    }
}

#[test]
fn test_discovery_reports_every_rejection() {
    let dir = tempfile::tempdir().unwrap();
    write_manifest(
        &dir,
        "future.json",
        r#"{
            "name": "future",
            "api_version": "2.0",
            "kind": "source",
            "command": ["probe"],
            "metrics": [{"metric": "v", "type": "gauge", "unit": ""}]
        }"#,
    );
    write_manifest(&dir, "garbage.json", "][ not json");
    write_manifest(
        &dir,
        "shadow.json",
        r#"{
            "name": "memory",
            "api_version": "1.0",
            "kind": "source",
            "command": ["probe"],
            "metrics": [{"metric": "v", "type": "gauge", "unit": ""}]
        }"#,
    );

    let config = config_with_dir(&dir);
    let (registry, report) = Discovery::from_config(&config).run(&config);

    // Builtins all made it; every manifest was rejected for its own reason.
    assert_eq!(registry.state("memory"), Some(PluginState::Loaded));
    assert!(registry.get("future").is_none());
    assert_eq!(report.rejected.len(), 3);
    assert!(report
        .rejected
        .iter()
        .any(|(name, e)| name == "future" && matches!(e, LoadError::IncompatibleVersion { .. })));
    assert!(report
        .rejected
        .iter()
        .any(|(name, e)| name == "garbage" && matches!(e, LoadError::BadManifest { .. })));
    assert!(report
        .rejected
        .iter()
        .any(|(name, e)| name == "memory" && matches!(e, LoadError::DuplicateName(_))));
}

#[tokio::test]
async fn test_exec_plugin_collects_through_its_command() {
    let dir = tempfile::tempdir().unwrap();
    write_manifest(
        &dir,
        "echoed.json",
        r#"{
            "name": "echoed",
            "api_version": "1.0",
            "kind": "source",
            "interval_secs": 2,
            "command": ["echo", "[{\"metric\": \"depth\", \"value\": 12.5}]"],
            "metrics": [{"metric": "depth", "type": "gauge", "unit": "items"}]
        }"#,
    );

    let config = config_with_dir(&dir);
    let (registry, report) = Discovery::from_config(&config).run(&config);
    assert!(report.is_clean());

    let descriptor = registry.get("echoed").unwrap();
    assert_eq!(descriptor.kind, CapabilityKind::Source);
    assert_eq!(descriptor.default_interval, Duration::from_secs(2));

    let mut collect = registry
        .take_instance("echoed")
        .and_then(|instance| instance.into_collect())
        .unwrap();
    let samples = collect.collect().await.unwrap();
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].key.qualified_name(), "echoed.depth");
    assert_eq!(samples[0].value, 12.5);
    assert_eq!(samples[0].unit, "items");
}

#[tokio::test]
async fn test_exec_plugin_failure_modes() {
    let dir = tempfile::tempdir().unwrap();
    write_manifest(
        &dir,
        "missing.json",
        r#"{
            "name": "missing",
            "api_version": "1.0",
            "kind": "source",
            "command": ["/nonexistent/upmon-test-probe"],
            "metrics": [{"metric": "v", "type": "gauge", "unit": ""}]
        }"#,
    );
    write_manifest(
        &dir,
        "noise.json",
        r#"{
            "name": "noise",
            "api_version": "1.0",
            "kind": "source",
            "command": ["echo", "this is not json"],
            "metrics": [{"metric": "v", "type": "gauge", "unit": ""}]
        }"#,
    );

    let config = config_with_dir(&dir);
    let (registry, report) = Discovery::from_config(&config).run(&config);
    assert!(report.is_clean(), "failures happen at collect time, not load time");

    let mut missing = registry
        .take_instance("missing")
        .and_then(|instance| instance.into_collect())
        .unwrap();
    assert!(missing.collect().await.is_err());

    let mut noise = registry
        .take_instance("noise")
        .and_then(|instance| instance.into_collect())
        .unwrap();
    assert!(noise.collect().await.is_err());
}

#[test]
fn test_config_disable_and_reload_semantics() {
    let config = MonitorConfig {
        plugins: [(
            "network".to_string(),
            PluginOverrides {
                enabled: false,
                ..Default::default()
            },
        )]
        .into_iter()
        .collect(),
        plugin_dir: Some(std::env::temp_dir().join("upmon-no-such-dir")),
        ..Default::default()
    };

    let discovery = Discovery::from_config(&config);
    let (registry, _) = discovery.run(&config);
    assert_eq!(registry.state("network"), Some(PluginState::Disabled));

    // A second pass builds a fresh registry; the old one is unaffected.
    let (second, _) = discovery.run(&config);
    second.disable("cpu", "operator request");
    assert_eq!(registry.state("cpu"), Some(PluginState::Loaded));
    assert_eq!(second.state("cpu"), Some(PluginState::Disabled));
}
