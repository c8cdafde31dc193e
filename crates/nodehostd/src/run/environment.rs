//! Child environment construction.
//!
//! The child runtime reads its configuration from environment variables
//! rather than flags. Config keys are re-emitted in the legacy
//! `<namespace>:config:<name>` spelling so older runtime SDKs keep working;
//! newer SDKs accept both forms.

use std::collections::BTreeMap;

use thiserror::Error;

use nodehost_config::{ConfigKey, ConfigKeyParseError};

/// Errors raised while projecting request config into the environment.
#[derive(Debug, Error)]
pub enum ConfigEnvError {
    /// A request config key did not match the key grammar.
    #[error(transparent)]
    Key(#[from] ConfigKeyParseError),
    /// The transformed map or key list could not be serialized.
    #[error(transparent)]
    Serialize(#[from] serde_json::Error),
}

/// Serializes the request's config map for the child environment.
///
/// Every key is parsed and re-emitted in the legacy spelling; an empty map
/// serializes to `{}`.
///
/// # Errors
///
/// Returns [`ConfigEnvError`] on an unparseable key or a serialization
/// failure.
pub fn construct_config(config: &BTreeMap<String, String>) -> Result<String, ConfigEnvError> {
    let mut transformed = BTreeMap::new();
    for (key, value) in config {
        let parsed: ConfigKey = key.parse()?;
        transformed.insert(
            format!("{}:config:{}", parsed.namespace(), parsed.name()),
            value.clone(),
        );
    }
    Ok(serde_json::to_string(&transformed)?)
}

/// Serializes the request's secret key list for the child environment.
///
/// An absent or empty list serializes to `[]`.
///
/// # Errors
///
/// Returns [`ConfigEnvError`] on a serialization failure.
pub fn construct_config_secret_keys(keys: &[String]) -> Result<String, ConfigEnvError> {
    Ok(serde_json::to_string(keys)?)
}
