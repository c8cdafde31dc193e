//! Domain errors raised during plugin discovery.
//!
//! Walk errors are accumulated, never short-circuiting: a single unreadable
//! manifest must not hide the plugins found elsewhere in the tree. Callers
//! receive the partial result together with a [`DiscoveryErrors`] composite
//! listing every underlying cause.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::version::VersionParseError;

/// Errors resolving plugin metadata from a package manifest.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ManifestError {
    /// The manifest has no package name at all.
    #[error("missing expected \"name\" property")]
    MissingName,

    /// A third-party package is marked as a plugin without naming it.
    #[error(
        "Missing property \"name\" for the third-party plugin '{package}' \
         inside package.json under the \"pulumi\" section."
    )]
    MissingPluginName {
        /// The package name from the manifest.
        package: String,
    },

    /// Neither the plugin section nor the package declares a version.
    #[error("Missing expected \"version\" property")]
    MissingVersion,
}

/// A single failure encountered while walking a module tree.
#[derive(Debug, Error)]
pub enum WalkError {
    /// The directory path could not be made absolute.
    #[error("getting full path for plugin dir {}: {source}", path.display())]
    Resolve {
        /// Directory being resolved.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The directory could not be listed.
    #[error("reading plugin dir {}: {source}", path.display())]
    ReadDir {
        /// Directory being listed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A directory entry's type could not be determined.
    #[error("inspecting {}: {source}", path.display())]
    FileType {
        /// Entry being inspected.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A symbolic link's target could not be read.
    #[error("resolving link in plugin dir {}: {source}", path.display())]
    ReadLink {
        /// Link being resolved.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A resolved link target could not be re-stat'ed.
    #[error("inspecting link target {}: {source}", path.display())]
    Stat {
        /// Resolved target path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A package manifest could not be read.
    #[error("reading package.json {}: {source}", path.display())]
    ReadManifest {
        /// Manifest path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A package manifest was not valid JSON.
    #[error("unmarshaling package.json {}: {source}", path.display())]
    ParseManifest {
        /// Manifest path.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A runtime-SDK manifest declared an unparseable version.
    #[error("Could not understand version {version} in '{}': {source}", path.display())]
    SdkVersion {
        /// The version string from the manifest.
        version: String,
        /// Manifest path.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: VersionParseError,
    },

    /// A manifest marked itself as a plugin but its metadata was incomplete.
    #[error("unmarshaling package.json {}: {source}", path.display())]
    PluginMetadata {
        /// Manifest path.
        path: PathBuf,
        /// Underlying metadata error.
        #[source]
        source: ManifestError,
    },
}

/// Composite of every failure accumulated during one discovery walk.
///
/// Renders in the multi-error style: a count line followed by one indented
/// line per cause.
#[derive(Debug, Default)]
pub struct DiscoveryErrors {
    errors: Vec<WalkError>,
}

impl DiscoveryErrors {
    /// Records another failure.
    pub fn push(&mut self, error: WalkError) {
        self.errors.push(error);
    }

    /// Returns `true` when the walk completed without failures.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of accumulated failures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Iterates over the accumulated failures.
    pub fn iter(&self) -> impl Iterator<Item = &WalkError> {
        self.errors.iter()
    }
}

impl fmt::Display for DiscoveryErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errors.len() {
            0 => write!(f, "no errors occurred"),
            1 => write!(f, "1 error occurred:\n  * {}", self.errors[0]),
            n => {
                write!(f, "{n} errors occurred:")?;
                for error in &self.errors {
                    write!(f, "\n  * {error}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for DiscoveryErrors {}
