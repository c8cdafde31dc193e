use std::fs;
use std::path::Path;

use tempfile::TempDir;

use super::*;

fn write_manifest(dir: &Path, contents: &str) {
    fs::create_dir_all(dir).expect("create package dir");
    fs::write(dir.join("package.json"), contents).expect("write manifest");
}

fn project_with_modules() -> TempDir {
    let project = TempDir::new().expect("project dir");
    let modules = project.path().join("node_modules");
    write_manifest(
        &modules.join("@pulumi/aws"),
        r#"{"name": "@pulumi/aws", "version": "5.1.0", "pulumi": {"resource": true}}"#,
    );
    write_manifest(
        &modules.join("@pulumi/pulumi"),
        r#"{"name": "@pulumi/pulumi", "version": "3.2.1"}"#,
    );
    write_manifest(
        &modules.join("left-pad"),
        r#"{"name": "left-pad", "version": "1.3.0"}"#,
    );
    project
}

#[test]
fn discovers_plugins_under_node_modules() {
    let project = project_with_modules();
    let discovery = discover_plugins(project.path());

    assert!(discovery.errors.is_empty(), "{}", discovery.errors);
    assert_eq!(discovery.plugins.len(), 1);
    let plugin = &discovery.plugins[0];
    assert_eq!(plugin.name, "aws");
    assert_eq!(plugin.kind, "resource");
    assert_eq!(plugin.version, "v5.1.0");
    assert_eq!(plugin.server, "");
}

#[test]
fn records_sdk_versions_by_manifest_path() {
    let project = project_with_modules();
    let discovery = discover_plugins(project.path());

    assert_eq!(discovery.sdk_versions.len(), 1);
    let sdk = &discovery.sdk_versions[0];
    assert_eq!(sdk.version.to_string(), "3.2.1");
    assert!(sdk.manifest_path.ends_with("@pulumi/pulumi/package.json"));
}

#[test]
fn manifest_outside_node_modules_is_ignored() {
    let project = TempDir::new().expect("project dir");
    write_manifest(
        project.path(),
        r#"{"name": "@pulumi/aws", "version": "5.1.0", "pulumi": {"resource": true}}"#,
    );

    let discovery = discover_plugins(project.path());
    assert!(discovery.plugins.is_empty());
}

#[cfg(unix)]
#[test]
fn symlink_cycle_terminates_and_visits_once() {
    let project = TempDir::new().expect("project dir");
    let modules = project.path().join("node_modules");
    write_manifest(
        &modules.join("@pulumi/aws"),
        r#"{"name": "@pulumi/aws", "version": "5.1.0", "pulumi": {"resource": true}}"#,
    );
    // Point a link back at the project root, forming a cycle.
    std::os::unix::fs::symlink(project.path(), modules.join("cycle")).expect("create cycle link");

    let discovery = discover_plugins(project.path());
    assert!(discovery.errors.is_empty(), "{}", discovery.errors);
    assert_eq!(discovery.plugins.len(), 1, "plugin must be seen exactly once");
}

#[cfg(unix)]
#[test]
fn linked_package_is_discovered_through_relative_symlink() {
    let workspace = TempDir::new().expect("workspace dir");
    let real = workspace.path().join("packages/acme");
    write_manifest(
        &real,
        r#"{"name": "x", "version": "0.1.0", "pulumi": {"resource": true, "name": "acme"}}"#,
    );
    let project = workspace.path().join("app");
    let modules = project.join("node_modules");
    fs::create_dir_all(&modules).expect("create node_modules");
    std::os::unix::fs::symlink(Path::new("../../packages/acme"), modules.join("acme"))
        .expect("link package");

    let discovery = discover_plugins(&project);
    assert!(discovery.errors.is_empty(), "{}", discovery.errors);
    assert_eq!(discovery.plugins.len(), 1);
    assert_eq!(discovery.plugins[0].name, "acme");
}

#[test]
fn broken_manifest_is_accumulated_and_walk_continues() {
    let project = project_with_modules();
    let modules = project.path().join("node_modules");
    write_manifest(&modules.join("broken"), "{ not json");

    let discovery = discover_plugins(project.path());
    assert_eq!(discovery.errors.len(), 1);
    assert!(
        discovery.errors.to_string().contains("unmarshaling package.json"),
        "{}",
        discovery.errors
    );
    // The broken package must not hide the healthy one.
    assert_eq!(discovery.plugins.len(), 1);
}

#[test]
fn unparseable_sdk_version_is_accumulated() {
    let project = TempDir::new().expect("project dir");
    let modules = project.path().join("node_modules");
    write_manifest(
        &modules.join("@pulumi/pulumi"),
        r#"{"name": "@pulumi/pulumi", "version": "not-a-version"}"#,
    );

    let discovery = discover_plugins(project.path());
    assert!(discovery.sdk_versions.is_empty());
    assert_eq!(discovery.errors.len(), 1);
    assert!(
        discovery
            .errors
            .to_string()
            .contains("Could not understand version not-a-version"),
        "{}",
        discovery.errors
    );
}

fn sdk(path: &str, version: &str) -> SdkVersion {
    SdkVersion {
        manifest_path: PathBuf::from(path),
        version: SemanticVersion::parse(version).expect("test version"),
    }
}

#[test]
fn warns_once_on_incompatible_sdk_versions() {
    let versions = vec![
        sdk("/a/package.json", "0.16.0"),
        sdk("/b/package.json", "0.17.0"),
        sdk("/c/package.json", "0.18.0"),
    ];
    let mut warning = Vec::new();
    warn_incompatible_versions(&versions, &mut warning);

    let warning = String::from_utf8(warning).expect("utf8");
    assert_eq!(warning.matches("Found incompatible versions").count(), 1);
    assert!(warning.contains("Differing major or minor versions are not supported."));
    assert!(warning.contains("Version 0.16.0 referenced at /a/package.json"));
    assert!(warning.contains("Version 0.17.0 referenced at /b/package.json"));
}

#[test]
fn compatible_sdk_versions_warn_nothing() {
    let versions = vec![
        sdk("/a/package.json", "0.17.5"),
        sdk("/b/package.json", "1.2.0"),
    ];
    let mut warning = Vec::new();
    warn_incompatible_versions(&versions, &mut warning);
    assert!(warning.is_empty());
}
