//! The package-manifest model and plugin metadata extraction.
//!
//! Only the fields the host cares about are modelled; everything else in a
//! `package.json` is ignored. A package advertises a resource-provider
//! plugin through its `pulumi` section, from which the plugin name, version,
//! and optional download server are resolved.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::error::ManifestError;

/// Scope prefix whose packages may derive their plugin name implicitly.
const SDK_SCOPE: &str = "@pulumi/";

/// The subset of a `package.json` document consumed by the host.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageManifest {
    /// Package name, possibly scoped.
    #[serde(default)]
    pub name: String,
    /// Package version.
    #[serde(default)]
    pub version: String,
    /// Entry-point module, when declared.
    #[serde(default)]
    pub main: String,
    /// Declared runtime dependencies, name to version spec.
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    /// Declared development dependencies, name to version spec.
    #[serde(default)]
    pub dev_dependencies: BTreeMap<String, String>,
    /// Plugin marker section.
    #[serde(default)]
    pub pulumi: PluginSection,
}

/// The `pulumi` section of a package manifest.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PluginSection {
    /// Marks the package as a resource-provider plugin.
    #[serde(default)]
    pub resource: bool,
    /// Explicit plugin name, overriding derivation from the package name.
    #[serde(default)]
    pub name: String,
    /// Explicit plugin version, overriding the package version.
    #[serde(default)]
    pub version: String,
    /// Optional server the plugin binary can be downloaded from.
    #[serde(default)]
    pub server: String,
}

/// Plugin metadata resolved from a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginInfo {
    /// Resolved plugin name.
    pub name: String,
    /// Resolved plugin version, always carrying a leading `v`.
    pub version: String,
    /// Download server, empty when the default location should be used.
    pub server: String,
}

impl PackageManifest {
    /// Parses a manifest from raw `package.json` bytes.
    ///
    /// # Errors
    ///
    /// Returns the underlying JSON error when the document is malformed.
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Resolves the plugin metadata advertised by this manifest.
    ///
    /// Returns `Ok(None)` when the package is not a resource-provider
    /// plugin.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError`] when the package is marked as a plugin but
    /// its name or version cannot be resolved.
    pub fn plugin_info(&self) -> Result<Option<PluginInfo>, ManifestError> {
        if !self.pulumi.resource {
            return Ok(None);
        }
        Ok(Some(PluginInfo {
            name: self.plugin_name()?.to_string(),
            version: self.plugin_version()?,
            server: self.pulumi.server.clone(),
        }))
    }

    /// Resolves the plugin name.
    ///
    /// An explicit `pulumi.name` wins. Otherwise the package name must carry
    /// the SDK scope, whose simple name is used; third-party packages must
    /// declare the plugin name explicitly.
    fn plugin_name(&self) -> Result<&str, ManifestError> {
        if !self.pulumi.name.is_empty() {
            return Ok(&self.pulumi.name);
        }
        if self.name.is_empty() {
            return Err(ManifestError::MissingName);
        }
        if let Some(simple) = self.name.strip_prefix(SDK_SCOPE) {
            return Ok(simple);
        }
        Err(ManifestError::MissingPluginName {
            package: self.name.clone(),
        })
    }

    /// Resolves the plugin version, normalised to carry a leading `v`.
    fn plugin_version(&self) -> Result<String, ManifestError> {
        let version = if self.pulumi.version.is_empty() {
            &self.version
        } else {
            &self.pulumi.version
        };
        if version.is_empty() {
            return Err(ManifestError::MissingVersion);
        }
        if version.starts_with('v') {
            Ok(version.clone())
        } else {
            Ok(format!("v{version}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(json: &str) -> PackageManifest {
        PackageManifest::from_json(json.as_bytes()).expect("test manifest")
    }

    #[test]
    fn non_plugin_packages_resolve_to_none() {
        let info = manifest(r#"{"name": "left-pad", "version": "1.3.0"}"#)
            .plugin_info()
            .expect("resolves");
        assert!(info.is_none());
    }

    #[test]
    fn scoped_package_derives_simple_name() {
        let info = manifest(
            r#"{"name": "@pulumi/aws", "version": "5.1.0", "pulumi": {"resource": true}}"#,
        )
        .plugin_info()
        .expect("resolves")
        .expect("is a plugin");
        assert_eq!(info.name, "aws");
        assert_eq!(info.version, "v5.1.0");
        assert_eq!(info.server, "");
    }

    #[test]
    fn explicit_plugin_name_wins_over_package_name() {
        let info = manifest(
            r#"{"name": "@acme/cloud", "version": "0.1.0",
                "pulumi": {"resource": true, "name": "acme", "server": "https://dl.acme.dev"}}"#,
        )
        .plugin_info()
        .expect("resolves")
        .expect("is a plugin");
        assert_eq!(info.name, "acme");
        assert_eq!(info.server, "https://dl.acme.dev");
    }

    #[test]
    fn third_party_package_without_plugin_name_fails() {
        let error = manifest(r#"{"name": "third-party", "pulumi": {"resource": true}}"#)
            .plugin_info()
            .expect_err("must fail");
        let message = error.to_string();
        assert!(message.contains("third-party"), "{message}");
        assert!(message.contains("\"pulumi\" section"), "{message}");
    }

    #[test]
    fn missing_package_name_fails() {
        let error = manifest(r#"{"pulumi": {"resource": true}}"#)
            .plugin_info()
            .expect_err("must fail");
        assert_eq!(error.to_string(), "missing expected \"name\" property");
    }

    #[test]
    fn missing_version_fails() {
        let error = manifest(r#"{"name": "@pulumi/aws", "pulumi": {"resource": true}}"#)
            .plugin_info()
            .expect_err("must fail");
        assert_eq!(error.to_string(), "Missing expected \"version\" property");
    }

    #[test]
    fn plugin_section_version_wins_and_v_prefix_is_idempotent() {
        let info = manifest(
            r#"{"name": "@pulumi/gcp", "version": "9.9.9",
                "pulumi": {"resource": true, "version": "v6.0.0"}}"#,
        )
        .plugin_info()
        .expect("resolves")
        .expect("is a plugin");
        assert_eq!(info.version, "v6.0.0");
    }

    #[test]
    fn dev_dependencies_use_manifest_spelling() {
        let parsed = manifest(
            r#"{"name": "app", "devDependencies": {"typescript": "^4.0.0"}}"#,
        );
        assert!(parsed.dev_dependencies.contains_key("typescript"));
    }
}
