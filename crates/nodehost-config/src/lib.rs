//! Shared configuration types for the NodeJS language host binaries.
//!
//! Groups the host options parsed from the command line, the configuration-key
//! grammar used when projecting engine config into the child environment, the
//! logging format shared with telemetry initialisation, and the well-known
//! defaults both the daemon and its tests need to agree on.

mod defaults;
mod key;
mod logging;
mod options;

pub use defaults::{
    BAIL_EXIT_CODE, CONFIG_ENV_VAR, CONFIG_SECRET_KEYS_ENV_VAR, DEFAULT_LOG_FILTER,
    DEFAULT_RUN_PATH, RUN_PATH_ENV_VAR, SDK_PACKAGE, TSCONFIG_PATH_ENV_VAR, TYPESCRIPT_ENV_VAR,
    default_log_filter,
};
pub use key::{ConfigKey, ConfigKeyParseError};
pub use logging::{LogFormat, LogFormatParseError};
pub use options::HostOptions;
