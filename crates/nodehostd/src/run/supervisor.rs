//! Spawning and supervising the child runtime.
//!
//! The supervisor assembles the child's argv and environment, spawns it
//! with inherited stdio, waits for it, and classifies the exit into a
//! [`RunResult`]. It recovers nothing: whatever happens becomes the
//! response for the orchestrator's rendezvous channel.

use std::io::Write;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};

use tracing::debug;

use nodehost_config::{
    BAIL_EXIT_CODE, CONFIG_ENV_VAR, CONFIG_SECRET_KEYS_ENV_VAR, HostOptions,
    TSCONFIG_PATH_ENV_VAR, TYPESCRIPT_ENV_VAR,
};

use crate::dispatch::RunParams;

use super::RUN_TARGET;
use super::RunResult;
use super::arguments::{ArgumentContext, construct_arguments, split_shell_words};
use super::environment::{construct_config, construct_config_secret_keys};

/// Launches the child runtime and classifies its exit.
///
/// Configuration failures surface in the returned [`RunResult`] without the
/// child being launched.
pub(super) fn launch(
    options: &HostOptions,
    params: &RunParams,
    node_bin: &Path,
    run_path: &str,
    monitor_address: &str,
    pipes_directory: &str,
) -> RunResult {
    let mut args = match split_shell_words(options.nodeargs()) {
        Ok(args) => args,
        Err(error) => return RunResult::error(error.to_string()),
    };
    let context = ArgumentContext {
        engine_address: options.engine_address(),
        tracing_endpoint: options.tracing_endpoint(),
        run_path,
        monitor_address,
        pipes_directory,
    };
    args.extend(construct_arguments(params, &context));

    let config = match construct_config(&params.config) {
        Ok(config) => config,
        Err(error) => {
            return RunResult::error(format!("failed to serialize configuration: {error}"));
        }
    };
    let secret_keys = match construct_config_secret_keys(&params.config_secret_keys) {
        Ok(keys) => keys,
        Err(error) => {
            return RunResult::error(format!(
                "failed to serialize configuration secret keys: {error}"
            ));
        }
    };

    let mut command = Command::new(node_bin);
    command
        .args(&args)
        .env(CONFIG_ENV_VAR, config)
        .env(CONFIG_SECRET_KEYS_ENV_VAR, secret_keys)
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());
    if options.typescript() {
        command.env(TYPESCRIPT_ENV_VAR, "true");
    }
    if let Some(tsconfig) = options.tsconfig_path() {
        command.env(TSCONFIG_PATH_ENV_VAR, tsconfig.as_str());
    }

    debug!(
        target: RUN_TARGET,
        interpreter = %node_bin.display(),
        args = args.join(" "),
        "launching child runtime"
    );

    let status = command.status();

    // The child may exit with unflushed asynchronous writes still buffered
    // on our shared stdio; flush so no diagnostic tail is lost before the
    // exit is classified.
    let _ = std::io::stdout().flush();
    let _ = std::io::stderr().flush();

    classify(status)
}

/// Maps the child's exit into the response contract.
fn classify(status: std::io::Result<ExitStatus>) -> RunResult {
    let status = match status {
        Ok(status) => status,
        Err(error) => {
            return RunResult::error(format!(
                "Problem executing program (could not run language executor): {error}"
            ));
        }
    };
    if status.success() {
        return RunResult::default();
    }
    match status.code() {
        // The child already printed a user-actionable message; report
        // nothing more, just the bail marker.
        Some(code) if code == BAIL_EXIT_CODE => RunResult::bail(),
        Some(code) => RunResult::error(format!("Program exited with non-zero exit code: {code}")),
        // Killed by a signal; there is no code to report.
        None => RunResult::error(format!("Program exited unexpectedly: {status}")),
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::process::ExitStatusExt;

    use super::*;

    fn exit_status(code: i32) -> std::io::Result<ExitStatus> {
        Ok(ExitStatus::from_raw(code << 8))
    }

    #[test]
    fn clean_exit_is_success() {
        let result = classify(exit_status(0));
        assert_eq!(result, RunResult::default());
    }

    #[test]
    fn bail_exit_reports_no_error() {
        let result = classify(exit_status(32));
        assert_eq!(result.error, "");
        assert!(result.bail);
    }

    #[test]
    fn nonzero_exit_names_the_code() {
        let result = classify(exit_status(7));
        assert_eq!(result.error, "Program exited with non-zero exit code: 7");
        assert!(!result.bail);
    }

    #[test]
    fn signal_death_is_unexpected() {
        let result = classify(Ok(ExitStatus::from_raw(libc::SIGKILL)));
        assert!(
            result.error.starts_with("Program exited unexpectedly"),
            "{}",
            result.error
        );
    }

    #[test]
    fn spawn_failure_is_an_executor_problem() {
        let result = classify(Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "no such file",
        )));
        assert!(
            result
                .error
                .starts_with("Problem executing program (could not run language executor)"),
            "{}",
            result.error
        );
    }
}
