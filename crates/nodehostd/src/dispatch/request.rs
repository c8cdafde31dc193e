//! Request deserialization for the dispatch loop.
//!
//! This module parses JSONL request lines into a typed [`RpcRequest`]
//! envelope plus the per-method parameter structs. The field spelling
//! mirrors the JSON the engine produces, so every struct uses camelCase
//! renaming.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::errors::DispatchError;

/// Parsed request envelope from the engine.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    /// Name of the invoked method.
    pub method: String,
    /// Method parameters, decoded lazily per method.
    #[serde(default)]
    pub params: serde_json::Value,
}

impl RpcRequest {
    /// Parses a JSONL line into a request envelope.
    ///
    /// Trailing whitespace (including the newline delimiter) is trimmed
    /// before parsing.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::MalformedJsonl`] if the line is empty or is
    /// not valid JSON matching the envelope schema.
    pub fn parse(line: &[u8]) -> Result<Self, DispatchError> {
        let trimmed = trim_trailing_whitespace(line);
        if trimmed.is_empty() {
            return Err(DispatchError::malformed("empty request line"));
        }
        serde_json::from_slice(trimmed).map_err(DispatchError::from_json_error)
    }

    /// Validates that the method name is present and non-empty.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidStructure`] when the method field is
    /// empty or whitespace.
    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.method.trim().is_empty() {
            return Err(DispatchError::invalid_structure("method field is empty"));
        }
        Ok(())
    }

    /// Returns the normalised method name.
    #[must_use]
    pub fn method(&self) -> &str {
        self.method.trim()
    }

    /// Decodes the parameters into the given method's parameter type.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidParams`] when the parameters do not
    /// match the expected shape.
    pub fn params<T: DeserializeOwned>(&self) -> Result<T, DispatchError> {
        serde_json::from_value(self.params.clone()).map_err(|source| {
            DispatchError::invalid_params(format!(
                "invalid parameters for '{}': {source}",
                self.method()
            ))
        })
    }
}

/// Parameters of the `run` method.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunParams {
    /// Address of the engine's resource monitor.
    pub monitor_address: String,
    /// Path of the program to execute; empty means the default module.
    pub program: String,
    /// Working directory for the child runtime.
    pub pwd: String,
    /// Organization the stack belongs to.
    pub organization: String,
    /// Project being deployed.
    pub project: String,
    /// Stack being deployed.
    pub stack: String,
    /// Whether this is a preview rather than an update.
    pub dry_run: bool,
    /// Whether the program runs in query mode.
    pub query_mode: bool,
    /// Degree of resource parallelism the engine allows.
    pub parallel: i32,
    /// Configuration values keyed by configuration key.
    pub config: BTreeMap<String, String>,
    /// Configuration keys whose values are secret.
    pub config_secret_keys: Vec<String>,
    /// Free-form trailing arguments for the program.
    pub args: Vec<String>,
}

/// Parameters of the `get-required-plugins` method.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GetRequiredPluginsParams {
    /// Directory of the program whose module tree is walked.
    pub program: String,
}

/// Parameters of the `install-dependencies` method.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InstallDependenciesParams {
    /// Directory to install dependencies in.
    pub directory: String,
    /// Whether the engine renders the stream to an interactive terminal.
    pub is_terminal: bool,
}

/// Parameters of the `get-program-dependencies` method.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GetProgramDependenciesParams {
    /// Directory whose lockfiles are probed.
    pub pwd: String,
    /// Whether transitive dependencies are included.
    pub transitive_dependencies: bool,
}

/// Trims trailing ASCII whitespace from a byte slice.
fn trim_trailing_whitespace(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map(|pos| pos + 1)
        .unwrap_or(0);
    &bytes[..end]
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn parses_minimal_request() {
        let input = br#"{"method":"about"}"#;
        let request = RpcRequest::parse(input).expect("parse minimal");
        assert_eq!(request.method(), "about");
    }

    #[test]
    fn parses_run_params() {
        let input = br#"{"method":"run","params":{"monitorAddress":"127.0.0.1:5000",
            "stack":"dev","dryRun":true,"config":{"foo:bar":"1"}}}"#;
        let request = RpcRequest::parse(input).expect("parse run");
        let params: RunParams = request.params().expect("decode params");
        assert_eq!(params.monitor_address, "127.0.0.1:5000");
        assert_eq!(params.stack, "dev");
        assert!(params.dry_run);
        assert_eq!(params.config.get("foo:bar").map(String::as_str), Some("1"));
        assert_eq!(params.parallel, 0);
    }

    #[test]
    fn trims_trailing_whitespace() {
        let input = b"{\"method\":\"about\"}  \n";
        let request = RpcRequest::parse(input).expect("parse with whitespace");
        assert_eq!(request.method(), "about");
    }

    #[rstest]
    #[case::empty_input(b"" as &[u8])]
    #[case::whitespace_only(b"   \n" as &[u8])]
    #[case::invalid_json(b"not json" as &[u8])]
    fn rejects_malformed_input(#[case] input: &[u8]) {
        let result = RpcRequest::parse(input);
        assert!(matches!(result, Err(DispatchError::MalformedJsonl { .. })));
    }

    #[test]
    fn validates_empty_method() {
        let request = RpcRequest::parse(br#"{"method":"  "}"#).expect("parse");
        assert!(matches!(
            request.validate(),
            Err(DispatchError::InvalidStructure { .. })
        ));
    }

    #[test]
    fn mismatched_params_fail_decoding() {
        let request =
            RpcRequest::parse(br#"{"method":"run","params":{"parallel":"many"}}"#).expect("parse");
        let result: Result<RunParams, _> = request.params();
        assert!(matches!(result, Err(DispatchError::InvalidParams { .. })));
    }
}
