//! Well-known constants shared by the daemon and the child runtime contract.

/// Module resolved through the interpreter to locate the runtime shim that
/// executes the user program. Overridable via [`RUN_PATH_ENV_VAR`].
pub const DEFAULT_RUN_PATH: &str = "@pulumi/pulumi/cmd/run";

/// Environment variable overriding [`DEFAULT_RUN_PATH`], used by test setups.
pub const RUN_PATH_ENV_VAR: &str = "PULUMI_LANGUAGE_NODEJS_RUN_PATH";

/// The child runtime reads its serialized config object from this variable.
pub const CONFIG_ENV_VAR: &str = "PULUMI_CONFIG";

/// The child runtime reads the array of secret config keys from this variable.
pub const CONFIG_SECRET_KEYS_ENV_VAR: &str = "PULUMI_CONFIG_SECRET_KEYS";

/// Set to `true` when the child should run TypeScript sources natively.
pub const TYPESCRIPT_ENV_VAR: &str = "PULUMI_NODEJS_TYPESCRIPT";

/// Points the child at an explicit `tsconfig.json`.
pub const TSCONFIG_PATH_ENV_VAR: &str = "PULUMI_NODEJS_TSCONFIG_PATH";

/// Exit code meaning the child already printed a user-actionable message and
/// the host must not print more.
pub const BAIL_EXIT_CODE: i32 = 32;

/// Package name of the runtime SDK tracked during plugin discovery.
pub const SDK_PACKAGE: &str = "@pulumi/pulumi";

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default log filter expression used by the binaries.
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}
