//! Recursive plugin discovery over a NodeJS module tree.
//!
//! The walk starts at the program directory and descends into every
//! subdirectory, parsing each `package.json` found underneath a
//! `node_modules` directory. Symbolic links are resolved before the
//! visited-set check so linked trees (pnpm layouts, `npm link`) are walked
//! exactly once even when they form cycles. Per-entry failures are
//! accumulated and the walk continues; callers always receive the plugins
//! that could be discovered.

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use nodehost_config::SDK_PACKAGE;

use crate::error::{DiscoveryErrors, WalkError};
use crate::manifest::PackageManifest;
use crate::version::{SemanticVersion, compatible};

/// Tracing target for discovery operations.
const DISCOVERY_TARGET: &str = "nodehost_plugins::discovery";

/// Directory name that marks the installed-package portion of the tree.
const MODULES_DIR: &str = "node_modules";

/// Manifest file name probed inside installed packages.
const MANIFEST_FILE: &str = "package.json";

/// A resource-provider plugin required by the program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginDependency {
    /// Plugin name.
    pub name: String,
    /// Plugin kind; always `resource` for discovered plugins.
    pub kind: String,
    /// Plugin version, always carrying a leading `v`.
    pub version: String,
    /// Download server, empty when the default location should be used.
    pub server: String,
}

/// One observed copy of the runtime SDK.
#[derive(Debug, Clone)]
pub struct SdkVersion {
    /// Absolute path of the manifest that declared the copy.
    pub manifest_path: PathBuf,
    /// The declared version.
    pub version: SemanticVersion,
}

/// Outcome of a discovery walk: partial results plus accumulated errors.
#[derive(Debug, Default)]
pub struct Discovery {
    /// Plugins discovered, in walk order.
    pub plugins: Vec<PluginDependency>,
    /// Runtime-SDK copies observed, in walk order.
    pub sdk_versions: Vec<SdkVersion>,
    /// Failures accumulated along the way.
    pub errors: DiscoveryErrors,
}

/// Walks the module tree rooted at `dir` and collects plugin dependencies.
///
/// The walk never fails as a whole; inspect [`Discovery::errors`] for
/// per-entry failures.
#[must_use]
pub fn discover_plugins(dir: impl AsRef<Path>) -> Discovery {
    let mut discovery = Discovery::default();
    let mut visited = HashSet::new();
    walk(dir.as_ref(), false, &mut visited, &mut discovery);
    debug!(
        target: DISCOVERY_TARGET,
        plugins = discovery.plugins.len(),
        sdk_copies = discovery.sdk_versions.len(),
        errors = discovery.errors.len(),
        "plugin discovery finished"
    );
    discovery
}

fn walk(dir: &Path, in_node_modules: bool, visited: &mut HashSet<PathBuf>, out: &mut Discovery) {
    let dir = match absolutize(dir) {
        Ok(dir) => dir,
        Err(source) => {
            out.errors.push(WalkError::Resolve {
                path: dir.to_path_buf(),
                source,
            });
            return;
        }
    };
    if !visited.insert(dir.clone()) {
        return;
    }

    let entries = match fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(source) => {
            out.errors.push(WalkError::ReadDir { path: dir, source });
            return;
        }
    };

    let child_in_node_modules =
        in_node_modules || dir.file_name().is_some_and(|name| name == MODULES_DIR);

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(source) => {
                out.errors.push(WalkError::ReadDir {
                    path: dir.clone(),
                    source,
                });
                continue;
            }
        };
        let name = entry.file_name();
        let mut current = dir.join(&name);

        let file_type = match entry.file_type() {
            Ok(file_type) => file_type,
            Err(source) => {
                out.errors.push(WalkError::FileType {
                    path: current,
                    source,
                });
                continue;
            }
        };
        let mut is_dir = file_type.is_dir();

        // Resolve links before the visited-set check; a link to an already
        // visited directory must not look unvisited under its link path.
        if file_type.is_symlink() {
            let target = match fs::read_link(&current) {
                Ok(target) => target,
                Err(source) => {
                    out.errors.push(WalkError::ReadLink {
                        path: current,
                        source,
                    });
                    continue;
                }
            };
            current = if target.is_absolute() {
                target
            } else {
                dir.join(target)
            };
            is_dir = match fs::metadata(&current) {
                Ok(metadata) => metadata.is_dir(),
                Err(source) => {
                    out.errors.push(WalkError::Stat {
                        path: current,
                        source,
                    });
                    continue;
                }
            };
        }

        if is_dir {
            walk(&current, child_in_node_modules, visited, out);
        } else if in_node_modules && name == MANIFEST_FILE {
            inspect_manifest(&current, out);
        }
    }
}

/// Parses one manifest, recording SDK versions and plugin dependencies.
fn inspect_manifest(path: &Path, out: &mut Discovery) {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(source) => {
            out.errors.push(WalkError::ReadManifest {
                path: path.to_path_buf(),
                source,
            });
            return;
        }
    };
    let manifest = match PackageManifest::from_json(&bytes) {
        Ok(manifest) => manifest,
        Err(source) => {
            out.errors.push(WalkError::ParseManifest {
                path: path.to_path_buf(),
                source,
            });
            return;
        }
    };

    if manifest.name == SDK_PACKAGE {
        match SemanticVersion::parse(&manifest.version) {
            Ok(version) => out.sdk_versions.push(SdkVersion {
                manifest_path: path.to_path_buf(),
                version,
            }),
            Err(source) => {
                out.errors.push(WalkError::SdkVersion {
                    version: manifest.version.clone(),
                    path: path.to_path_buf(),
                    source,
                });
                return;
            }
        }
    }

    match manifest.plugin_info() {
        Ok(Some(info)) => out.plugins.push(PluginDependency {
            name: info.name,
            kind: "resource".to_string(),
            version: info.version,
            server: info.server,
        }),
        Ok(None) => {}
        Err(source) => out.errors.push(WalkError::PluginMetadata {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Makes a path absolute without touching the filesystem beyond the cwd.
fn absolutize(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Warns once when the observed SDK copies are mutually incompatible.
///
/// Every copy after the first is compared against the first; on the first
/// incompatible pair a single warning naming both versions and both paths is
/// written and checking stops. Compatible trees write nothing.
pub fn warn_incompatible_versions(sdk_versions: &[SdkVersion], mut out: impl Write) {
    let Some(first) = sdk_versions.first() else {
        return;
    };
    for candidate in &sdk_versions[1..] {
        if let Err(mismatch) = compatible(&candidate.version, &first.version) {
            let _ = write!(
                out,
                "Found incompatible versions of {SDK_PACKAGE}. {mismatch}\n  \
                 Version {} referenced at {}\n  \
                 Version {} referenced at {}\n",
                first.version,
                first.manifest_path.display(),
                candidate.version,
                candidate.manifest_path.display(),
            );
            break;
        }
    }
}

#[cfg(test)]
mod tests;
