//! Plugin discovery for NodeJS module trees.
//!
//! A user program declares its resource-provider plugins implicitly: any
//! installed package whose manifest carries a `pulumi` section with
//! `resource: true` is one. This crate walks the program's `node_modules`
//! tree (symlink-aware and cycle-safe), parses each package manifest it
//! finds, and produces the plugin dependency records the engine asks the
//! host for. It also reconciles the versions of the runtime SDK pulled in
//! across the tree, warning when incompatible copies coexist.

pub mod discovery;
pub mod error;
pub mod manifest;
pub mod version;

pub use discovery::{
    Discovery, PluginDependency, SdkVersion, discover_plugins, warn_incompatible_versions,
};
pub use error::{DiscoveryErrors, ManifestError, WalkError};
pub use manifest::{PackageManifest, PluginInfo, PluginSection};
pub use version::{SemanticVersion, VersionMismatch, VersionParseError, compatible};
