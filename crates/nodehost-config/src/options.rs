//! Host-wide options threaded from the command line into the RPC handlers.

use camino::Utf8PathBuf;

use crate::logging::LogFormat;

/// Options the host is launched with.
///
/// These are parsed once in `main` and shared read-only by every RPC handler;
/// they describe how child runtimes are launched rather than any per-request
/// state.
///
/// # Example
///
/// ```
/// use nodehost_config::HostOptions;
///
/// let options = HostOptions::new(Some("127.0.0.1:4000".into()))
///     .with_typescript(false)
///     .with_nodeargs("--max-old-space-size=4096");
/// assert_eq!(options.engine_address(), Some("127.0.0.1:4000"));
/// assert!(!options.typescript());
/// ```
#[derive(Debug, Clone)]
pub struct HostOptions {
    engine_address: Option<String>,
    tracing_endpoint: Option<String>,
    typescript: bool,
    tsconfig_path: Option<Utf8PathBuf>,
    nodeargs: String,
    project_root: Option<Utf8PathBuf>,
    log_format: LogFormat,
    log_filter: String,
}

impl HostOptions {
    /// Creates options pointing at the given engine address.
    #[must_use]
    pub fn new(engine_address: Option<String>) -> Self {
        Self {
            engine_address,
            tracing_endpoint: None,
            typescript: true,
            tsconfig_path: None,
            nodeargs: String::new(),
            project_root: None,
            log_format: LogFormat::default(),
            log_filter: crate::defaults::default_log_filter().to_string(),
        }
    }

    /// Sets the tracing endpoint forwarded to the child runtime.
    #[must_use]
    pub fn with_tracing_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        self.tracing_endpoint = (!endpoint.is_empty()).then_some(endpoint);
        self
    }

    /// Enables or disables native TypeScript execution in the child.
    #[must_use]
    pub const fn with_typescript(mut self, typescript: bool) -> Self {
        self.typescript = typescript;
        self
    }

    /// Points the child at an explicit `tsconfig.json`.
    #[must_use]
    pub fn with_tsconfig_path(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.tsconfig_path = Some(path.into());
        self
    }

    /// Extra interpreter arguments, shell-split and prepended at launch.
    #[must_use]
    pub fn with_nodeargs(mut self, nodeargs: impl Into<String>) -> Self {
        self.nodeargs = nodeargs.into();
        self
    }

    /// Sets the project root path.
    #[must_use]
    pub fn with_project_root(mut self, root: impl Into<Utf8PathBuf>) -> Self {
        self.project_root = Some(root.into());
        self
    }

    /// Sets the logging output format.
    #[must_use]
    pub const fn with_log_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }

    /// Address of the deployment engine, when one was supplied.
    #[must_use]
    pub fn engine_address(&self) -> Option<&str> {
        self.engine_address.as_deref()
    }

    /// Tracing endpoint, when configured.
    #[must_use]
    pub fn tracing_endpoint(&self) -> Option<&str> {
        self.tracing_endpoint.as_deref()
    }

    /// Whether the child runs TypeScript sources natively.
    #[must_use]
    pub const fn typescript(&self) -> bool {
        self.typescript
    }

    /// Explicit `tsconfig.json` path, when configured.
    #[must_use]
    pub fn tsconfig_path(&self) -> Option<&Utf8PathBuf> {
        self.tsconfig_path.as_ref()
    }

    /// Raw extra interpreter arguments as supplied on the command line.
    #[must_use]
    pub fn nodeargs(&self) -> &str {
        &self.nodeargs
    }

    /// Project root path, when configured.
    #[must_use]
    pub fn project_root(&self) -> Option<&Utf8PathBuf> {
        self.project_root.as_ref()
    }

    /// Logging output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Logging filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }
}

impl Default for HostOptions {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_typescript() {
        let options = HostOptions::default();
        assert!(options.typescript());
        assert!(options.engine_address().is_none());
        assert!(options.tracing_endpoint().is_none());
        assert_eq!(options.nodeargs(), "");
    }

    #[test]
    fn empty_tracing_endpoint_is_unset() {
        let options = HostOptions::default().with_tracing_endpoint("");
        assert!(options.tracing_endpoint().is_none());
    }
}
