//! Program dependency enumeration from package-manager lockfiles.
//!
//! Neither `yarn list` nor `npm ls` can say which packages a program
//! *requires* — only which are installed. The enumerator therefore probes
//! the working directory for a lockfile, asks the matching tool for the
//! installed set, and, when only direct dependencies are wanted, intersects
//! that set with the names declared in `package.json`.

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use nodehost_plugins::PackageManifest;

use crate::toolchain::{CommandRunner, SystemCommandRunner};

const DEPS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::deps");

/// Lockfile written by yarn.
const YARN_LOCKFILE: &str = "yarn.lock";

/// Lockfile written by npm.
const NPM_LOCKFILE: &str = "package-lock.json";

/// Declared-dependency manifest consulted for direct-only queries.
const MANIFEST_FILE: &str = "package.json";

/// One enumerated dependency with its installed version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyRecord {
    /// Package name.
    pub name: String,
    /// Installed version from the lockfile tool, not the declared range.
    pub version: String,
}

/// Errors raised while enumerating program dependencies.
#[derive(Debug, Error)]
pub enum DependencyError {
    /// Neither supported lockfile exists in the probed directory.
    #[error("could not find either {} or {}", yarn.display(), npm.display())]
    NoLockfile {
        /// Probed yarn lockfile path.
        yarn: PathBuf,
        /// Probed npm lockfile path.
        npm: PathBuf,
    },

    /// A lockfile probe failed for a reason other than absence.
    #[error("could not get node dependency data: {source}")]
    LockfileProbe {
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A yarn lockfile exists but the yarn binary does not.
    #[error("found {} but no yarn executable", lockfile.display())]
    YarnMissing {
        /// The lockfile that was found.
        lockfile: PathBuf,
    },

    /// An npm lockfile exists but the npm binary does not.
    #[error("found {} but not npm", lockfile.display())]
    NpmMissing {
        /// The lockfile that was found.
        lockfile: PathBuf,
    },

    /// The lockfile tool could not be run or exited unsuccessfully.
    #[error("failed to run \"{command}\"")]
    CommandFailed {
        /// The command line that failed.
        command: String,
    },

    /// The lockfile tool's output was not the expected JSON shape.
    #[error("failed to parse \"{command}\": {source}")]
    ParseOutput {
        /// The command line whose output was unparseable.
        command: String,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A yarn tree entry had no name at all.
    #[error("expected \"name\" in dependency {index}")]
    MissingEntryName {
        /// Zero-based index of the offending tree entry.
        index: usize,
    },

    /// A yarn tree entry was not of the `name@version` form.
    #[error("failed to parse name and version from {entry}")]
    MalformedEntry {
        /// The offending entry.
        entry: String,
    },

    /// Direct-only enumeration needs a manifest that does not exist.
    #[error(
        "could not find {}. Please include this in your report and run \
         pulumi about --transitive to get a list of used packages",
        path.display()
    )]
    ManifestMissing {
        /// The manifest path that was probed.
        path: PathBuf,
    },

    /// The declared-dependency manifest could not be read.
    #[error("could not read {}: {source}", path.display())]
    ManifestRead {
        /// Manifest path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The declared-dependency manifest was not valid JSON.
    #[error("could not parse {}: {source}", path.display())]
    ManifestParse {
        /// Manifest path.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// The shape of `yarn list --json` output.
#[derive(Debug, Default, Deserialize)]
struct YarnList {
    #[serde(default)]
    data: YarnListData,
}

#[derive(Debug, Default, Deserialize)]
struct YarnListData {
    #[serde(default)]
    trees: Vec<YarnTree>,
}

#[derive(Debug, Default, Deserialize)]
struct YarnTree {
    #[serde(default)]
    name: String,
}

/// The shape of `npm ls --json --depth=0` output.
#[derive(Debug, Default, Deserialize)]
struct NpmList {
    #[serde(default)]
    dependencies: BTreeMap<String, NpmPackage>,
}

#[derive(Debug, Default, Deserialize)]
struct NpmPackage {
    #[serde(default)]
    version: String,
}

/// Enumerates the dependencies of the program rooted at `pwd`.
///
/// When `transitive` is false, only packages declared in the program's
/// manifest are returned.
///
/// # Errors
///
/// Returns [`DependencyError`] when no lockfile is present, the matching
/// tool is missing or fails, or the direct-only manifest cannot be read.
pub fn enumerate(pwd: &Path, transitive: bool) -> Result<Vec<DependencyRecord>, DependencyError> {
    enumerate_with(&SystemCommandRunner, pwd, transitive)
}

pub(crate) fn enumerate_with(
    runner: &impl CommandRunner,
    pwd: &Path,
    transitive: bool,
) -> Result<Vec<DependencyRecord>, DependencyError> {
    let yarn_lockfile = pwd.join(YARN_LOCKFILE);
    let npm_lockfile = pwd.join(NPM_LOCKFILE);

    // A yarn lockfile wins when both exist: yarn projects usually carry a
    // stale package-lock.json rather than the reverse.
    let records = if yarn_lockfile.is_file() {
        yarn_dependencies(runner, pwd, &yarn_lockfile)?
    } else {
        match fs::metadata(&npm_lockfile) {
            Ok(_) => npm_dependencies(runner, pwd, &npm_lockfile)?,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                return Err(DependencyError::NoLockfile {
                    yarn: yarn_lockfile,
                    npm: npm_lockfile,
                });
            }
            Err(source) => return Err(DependencyError::LockfileProbe { source }),
        }
    };

    debug!(
        target: DEPS_TARGET,
        installed = records.len(),
        transitive,
        "enumerated installed packages"
    );

    if transitive {
        return Ok(records);
    }
    let manifest_path = pwd.join(MANIFEST_FILE);
    cross_check_manifest(&manifest_path, records)
}

fn yarn_dependencies(
    runner: &impl CommandRunner,
    pwd: &Path,
    lockfile: &Path,
) -> Result<Vec<DependencyRecord>, DependencyError> {
    let yarn = runner.locate("yarn").ok_or_else(|| DependencyError::YarnMissing {
        lockfile: lockfile.to_path_buf(),
    })?;
    let command = "yarn list --json";
    let stdout = capture(runner, &yarn, &["list", "--json"], pwd, command)?;
    let list: YarnList =
        serde_json::from_slice(&stdout).map_err(|source| DependencyError::ParseOutput {
            command: command.to_string(),
            source,
        })?;

    let mut records = Vec::with_capacity(list.data.trees.len());
    for (index, tree) in list.data.trees.iter().enumerate() {
        let (name, version) = split_name_version(index, &tree.name)?;
        records.push(DependencyRecord { name, version });
    }
    Ok(records)
}

fn npm_dependencies(
    runner: &impl CommandRunner,
    pwd: &Path,
    lockfile: &Path,
) -> Result<Vec<DependencyRecord>, DependencyError> {
    let npm = runner.locate("npm").ok_or_else(|| DependencyError::NpmMissing {
        lockfile: lockfile.to_path_buf(),
    })?;
    let command = "npm ls --json --depth=0";
    let stdout = capture(runner, &npm, &["ls", "--json", "--depth=0"], pwd, command)?;
    let list: NpmList =
        serde_json::from_slice(&stdout).map_err(|source| DependencyError::ParseOutput {
            command: command.to_string(),
            source,
        })?;

    Ok(list
        .dependencies
        .into_iter()
        .map(|(name, package)| DependencyRecord {
            name,
            version: package.version,
        })
        .collect())
}

fn capture(
    runner: &impl CommandRunner,
    program: &Path,
    args: &[&str],
    cwd: &Path,
    command: &str,
) -> Result<Vec<u8>, DependencyError> {
    let output = runner
        .capture(program, args, Some(cwd))
        .map_err(|_| DependencyError::CommandFailed {
            command: command.to_string(),
        })?;
    if !output.status.success() {
        return Err(DependencyError::CommandFailed {
            command: command.to_string(),
        });
    }
    Ok(output.stdout)
}

/// Splits a yarn `name@version` entry at its last `@`.
///
/// Scoped packages keep their scope: `@scope/pkg@1.0.0` parses as
/// (`@scope/pkg`, `1.0.0`). Entries with an empty name or version are
/// rejected.
fn split_name_version(index: usize, entry: &str) -> Result<(String, String), DependencyError> {
    if entry.is_empty() {
        return Err(DependencyError::MissingEntryName { index });
    }
    let malformed = || DependencyError::MalformedEntry {
        entry: entry.to_string(),
    };
    let split = entry.rfind('@').ok_or_else(malformed)?;
    if split == 0 || split + 1 == entry.len() {
        return Err(malformed());
    }
    Ok((entry[..split].to_string(), entry[split + 1..].to_string()))
}

/// Intersects enumerated packages with the names declared in the manifest.
///
/// Each declared name consumes at most one enumerated record; some direct
/// dependencies are also transitive and must not be reported twice. Output
/// preserves enumeration order.
fn cross_check_manifest(
    path: &Path,
    packages: Vec<DependencyRecord>,
) -> Result<Vec<DependencyRecord>, DependencyError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            return Err(DependencyError::ManifestMissing {
                path: path.to_path_buf(),
            });
        }
        Err(source) => {
            return Err(DependencyError::ManifestRead {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    let manifest =
        PackageManifest::from_json(&bytes).map_err(|source| DependencyError::ManifestParse {
            path: path.to_path_buf(),
            source,
        })?;

    let mut declared: HashSet<&str> = manifest
        .dependencies
        .keys()
        .chain(manifest.dev_dependencies.keys())
        .map(String::as_str)
        .collect();

    Ok(packages
        .into_iter()
        .filter(|package| declared.remove(package.name.as_str()))
        .collect())
}
