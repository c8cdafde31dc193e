//! Method routing for the engine-facing RPC surface.

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::debug;

use nodehost_config::HostOptions;
use nodehost_plugins::{PluginDependency, discover_plugins, warn_incompatible_versions};

use crate::deps::{self, DependencyRecord};
use crate::run;
use crate::toolchain::{self, SystemCommandRunner};

use super::DISPATCH_TARGET;
use super::errors::DispatchError;
use super::install;
use super::request::{
    GetProgramDependenciesParams, GetRequiredPluginsParams, InstallDependenciesParams, RpcRequest,
    RunParams,
};
use super::response::ResponseWriter;

/// Methods of the language-host RPC surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Enumerate the plugins a program requires.
    GetRequiredPlugins,
    /// Execute a program against the engine.
    Run,
    /// Report the host's own version.
    GetPluginInfo,
    /// Install program dependencies, streaming installer output.
    InstallDependencies,
    /// Report interpreter identity and version.
    About,
    /// Enumerate the program's installed dependencies.
    GetProgramDependencies,
    /// Execute a plugin packaged for this runtime; unsupported here.
    RunPlugin,
}

impl Method {
    /// Parses a wire method name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "get-required-plugins" => Some(Self::GetRequiredPlugins),
            "run" => Some(Self::Run),
            "get-plugin-info" => Some(Self::GetPluginInfo),
            "install-dependencies" => Some(Self::InstallDependencies),
            "about" => Some(Self::About),
            "get-program-dependencies" => Some(Self::GetProgramDependencies),
            "run-plugin" => Some(Self::RunPlugin),
            _ => None,
        }
    }
}

/// Response body of `get-required-plugins`.
#[derive(Debug, Serialize)]
struct PluginsResponse {
    plugins: Vec<PluginDependency>,
}

/// Response body of `get-plugin-info`.
#[derive(Debug, Serialize)]
struct PluginInfoResponse {
    version: &'static str,
}

/// Response body of `about`.
#[derive(Debug, Serialize)]
struct AboutResponse {
    executable: String,
    version: String,
}

/// Response body of `get-program-dependencies`.
#[derive(Debug, Serialize)]
struct DependenciesResponse {
    dependencies: Vec<DependencyRecord>,
}

/// Routes parsed requests to method implementations.
///
/// Every successful call writes exactly one terminal `response` message;
/// failures propagate for the connection handler to report as a terminal
/// `error` message.
#[derive(Debug)]
pub struct MethodRouter {
    options: HostOptions,
}

impl MethodRouter {
    /// Creates a router over the host options.
    #[must_use]
    pub fn new(options: HostOptions) -> Self {
        Self { options }
    }

    /// Routes a request to its method implementation.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] for unknown methods, bad parameters, and
    /// method failures.
    pub fn route<W: Write>(
        &self,
        request: &RpcRequest,
        writer: &mut ResponseWriter<W>,
    ) -> Result<(), DispatchError> {
        let method = Method::parse(request.method())
            .ok_or_else(|| DispatchError::unknown_method(request.method()))?;

        debug!(
            target: DISPATCH_TARGET,
            method = request.method(),
            "routing request"
        );

        match method {
            Method::GetRequiredPlugins => self.get_required_plugins(request, writer),
            Method::Run => self.run(request, writer),
            Method::GetPluginInfo => writer.write_response(&PluginInfoResponse {
                version: env!("CARGO_PKG_VERSION"),
            }),
            Method::InstallDependencies => self.install_dependencies(request, writer),
            Method::About => self.about(writer),
            Method::GetProgramDependencies => self.get_program_dependencies(request, writer),
            Method::RunPlugin => Err(DispatchError::Unsupported),
        }
    }

    /// Walks the program's module tree for plugin dependencies.
    ///
    /// Discovery failures never fail the call: the engine receives the
    /// partial plugin list and the accumulated errors are logged. The SDK
    /// version warning goes to the host's own stderr.
    fn get_required_plugins<W: Write>(
        &self,
        request: &RpcRequest,
        writer: &mut ResponseWriter<W>,
    ) -> Result<(), DispatchError> {
        let params: GetRequiredPluginsParams = request.params()?;
        let discovery = discover_plugins(Path::new(&params.program));
        warn_incompatible_versions(&discovery.sdk_versions, std::io::stderr().lock());
        if !discovery.errors.is_empty() {
            debug!(
                target: DISPATCH_TARGET,
                errors = %discovery.errors,
                "one or more errors while discovering plugins"
            );
        }
        writer.write_response(&PluginsResponse {
            plugins: discovery.plugins,
        })
    }

    fn run<W: Write>(
        &self,
        request: &RpcRequest,
        writer: &mut ResponseWriter<W>,
    ) -> Result<(), DispatchError> {
        let params: RunParams = request.params()?;
        let result = run::execute(&self.options, params);
        writer.write_response(&result)
    }

    fn install_dependencies<W: Write>(
        &self,
        request: &RpcRequest,
        writer: &mut ResponseWriter<W>,
    ) -> Result<(), DispatchError> {
        let params: InstallDependenciesParams = request.params()?;
        install::install_dependencies(Path::new(&params.directory), writer)?;
        writer.write_response(&serde_json::json!({}))
    }

    fn about<W: Write>(&self, writer: &mut ResponseWriter<W>) -> Result<(), DispatchError> {
        let node = toolchain::node_version(&SystemCommandRunner)?;
        writer.write_response(&AboutResponse {
            executable: node.executable,
            version: node.version,
        })
    }

    fn get_program_dependencies<W: Write>(
        &self,
        request: &RpcRequest,
        writer: &mut ResponseWriter<W>,
    ) -> Result<(), DispatchError> {
        let params: GetProgramDependenciesParams = request.params()?;
        let dependencies =
            deps::enumerate(Path::new(&params.pwd), params.transitive_dependencies)?;
        writer.write_response(&DependenciesResponse { dependencies })
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn route(request_json: &str) -> (Result<(), DispatchError>, String) {
        let router = MethodRouter::new(HostOptions::default());
        let request = RpcRequest::parse(request_json.as_bytes()).expect("test request");
        let mut output = Vec::new();
        let mut writer = ResponseWriter::new(&mut output);
        let result = router.route(&request, &mut writer);
        (result, String::from_utf8(output).expect("utf8"))
    }

    #[test]
    fn rejects_unknown_methods() {
        let (result, output) = route(r#"{"method":"bogus"}"#);
        assert!(matches!(result, Err(DispatchError::UnknownMethod { .. })));
        assert!(output.is_empty());
    }

    #[test]
    fn run_plugin_is_unsupported() {
        let (result, _) = route(r#"{"method":"run-plugin"}"#);
        let error = result.expect_err("must fail");
        assert_eq!(error.to_string(), "not supported");
    }

    #[test]
    fn plugin_info_reports_host_version() {
        let (result, output) = route(r#"{"method":"get-plugin-info"}"#);
        result.expect("routes");
        assert!(output.contains(env!("CARGO_PKG_VERSION")), "{output}");
        assert!(output.contains(r#""kind":"response""#), "{output}");
    }

    #[test]
    fn required_plugins_walk_the_program_tree() {
        let project = tempfile::TempDir::new().expect("project");
        let package = project.path().join("node_modules/@pulumi/aws");
        fs::create_dir_all(&package).expect("package dir");
        fs::write(
            package.join("package.json"),
            r#"{"name": "@pulumi/aws", "version": "5.1.0", "pulumi": {"resource": true}}"#,
        )
        .expect("manifest");

        let request = format!(
            r#"{{"method":"get-required-plugins","params":{{"program":"{}"}}}}"#,
            project.path().display()
        );
        let (result, output) = route(&request);
        result.expect("routes");
        assert!(output.contains(r#""name":"aws""#), "{output}");
        assert!(output.contains(r#""version":"v5.1.0""#), "{output}");
        assert!(output.contains(r#""kind":"resource""#), "{output}");
    }

    #[test]
    fn program_dependencies_fail_without_lockfiles() {
        let project = tempfile::TempDir::new().expect("project");
        let request = format!(
            r#"{{"method":"get-program-dependencies","params":{{"pwd":"{}","transitiveDependencies":true}}}}"#,
            project.path().display()
        );
        let (result, _) = route(&request);
        let error = result.expect_err("must fail");
        assert!(error.to_string().contains("could not find either"), "{error}");
    }
}
