//! Error types for request dispatch failures.
//!
//! This module defines structured errors surfaced during JSONL request
//! parsing and method dispatch. Domain failures (dependency enumeration,
//! toolchain queries, dependency installation) convert into dispatch errors
//! at the routing boundary and travel to the engine as terminal `error`
//! messages.

use std::io;

use thiserror::Error;

use crate::deps::DependencyError;
use crate::toolchain::ToolchainError;

use super::install::InstallError;

/// Errors surfaced during request parsing and dispatch.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Request line could not be parsed as valid JSON.
    #[error("malformed JSONL: {message}")]
    MalformedJsonl {
        /// Description of the parse failure.
        message: String,
        /// Underlying JSON error, when one exists.
        #[source]
        source: Option<serde_json::Error>,
    },

    /// Request JSON structure does not match the envelope schema.
    #[error("invalid request structure: {message}")]
    InvalidStructure {
        /// Description of the violation.
        message: String,
    },

    /// Method field contains an unrecognised value.
    #[error("unknown method: {method}")]
    UnknownMethod {
        /// The offending method name.
        method: String,
    },

    /// Method parameters do not match the expected shape.
    #[error("{message}")]
    InvalidParams {
        /// Description of the mismatch.
        message: String,
    },

    /// IO error during read or write.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Response serialization failed.
    #[error("failed to serialize response: {0}")]
    SerializeResponse(#[from] serde_json::Error),

    /// Program dependency enumeration failed.
    #[error(transparent)]
    Dependencies(#[from] DependencyError),

    /// A toolchain query failed.
    #[error(transparent)]
    Toolchain(#[from] ToolchainError),

    /// Dependency installation failed.
    #[error(transparent)]
    Install(#[from] InstallError),

    /// The operation exists on the surface but is not supported by this host.
    #[error("not supported")]
    Unsupported,
}

impl DispatchError {
    /// Creates a malformed JSONL error from a serde error.
    pub fn from_json_error(source: serde_json::Error) -> Self {
        Self::MalformedJsonl {
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Creates a malformed JSONL error with a custom message.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedJsonl {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an invalid structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }

    /// Creates an unknown method error.
    pub fn unknown_method(method: impl Into<String>) -> Self {
        Self::UnknownMethod {
            method: method.into(),
        }
    }

    /// Creates an invalid parameters error.
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams {
            message: message.into(),
        }
    }
}
