//! Configuration-key grammar shared with the deployment engine.
//!
//! Engine config maps are keyed by `<namespace>:<name>` or the legacy
//! `<namespace>:config:<name>` form. Both parse to the same [`ConfigKey`];
//! the host re-emits keys in the legacy form when projecting config into the
//! child environment so older runtime SDKs keep working.

use std::fmt;

use thiserror::Error;

/// A parsed configuration key.
///
/// # Example
///
/// ```
/// use nodehost_config::ConfigKey;
///
/// let key: ConfigKey = "aws:region".parse().expect("valid key");
/// assert_eq!(key.namespace(), "aws");
/// assert_eq!(key.name(), "region");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfigKey {
    namespace: String,
    name: String,
}

impl ConfigKey {
    /// Creates a key from its parts.
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Returns the key namespace (conventionally a package or project name).
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the key name within its namespace.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)
    }
}

impl std::str::FromStr for ConfigKey {
    type Err = ConfigKeyParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = input.split(':').collect();
        let (namespace, name) = match parts.as_slice() {
            [namespace, name] => (*namespace, *name),
            [namespace, "config", name] => (*namespace, *name),
            _ => {
                return Err(ConfigKeyParseError {
                    key: input.to_string(),
                });
            }
        };
        if namespace.is_empty() || name.is_empty() {
            return Err(ConfigKeyParseError {
                key: input.to_string(),
            });
        }
        Ok(Self::new(namespace, name))
    }
}

/// Error raised when a configuration key does not match the expected grammar.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("could not parse '{key}' as a configuration key")]
pub struct ConfigKeyParseError {
    /// The offending input.
    pub key: String,
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::plain("foo:bar", "foo", "bar")]
    #[case::legacy("foo:config:baz", "foo", "baz")]
    #[case::dotted_namespace("my.project:setting", "my.project", "setting")]
    fn parses_valid_keys(#[case] input: &str, #[case] namespace: &str, #[case] name: &str) {
        let key: ConfigKey = input.parse().expect("valid key");
        assert_eq!(key.namespace(), namespace);
        assert_eq!(key.name(), name);
    }

    #[rstest]
    #[case::bare("justaname")]
    #[case::empty("")]
    #[case::too_many_parts("a:b:c:d")]
    #[case::non_config_middle("a:other:c")]
    #[case::empty_namespace(":name")]
    #[case::empty_name("ns:")]
    fn rejects_invalid_keys(#[case] input: &str) {
        let result: Result<ConfigKey, _> = input.parse();
        assert!(result.is_err(), "{input:?} should not parse");
    }

    #[test]
    fn display_uses_plain_form() {
        let key = ConfigKey::new("aws", "region");
        assert_eq!(key.to_string(), "aws:region");
    }
}
