//! Child command-line construction.
//!
//! The child runtime's argv is a contract with the runtime shim: the shim's
//! own path first, flag/value pairs for everything the request and host
//! options carry (empty values omitted), the program path (or `.` for the
//! default module), and finally the request's free-form trailing arguments.

use thiserror::Error;

use crate::dispatch::RunParams;

/// Error raised when the configured extra interpreter arguments cannot be
/// shell-split.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid interpreter arguments: unterminated quote in '{input}'")]
pub struct ShellSplitError {
    /// The offending argument string.
    pub input: String,
}

/// Everything outside the request that argv construction needs.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArgumentContext<'a> {
    /// Address of the real engine, when one was supplied.
    pub engine_address: Option<&'a str>,
    /// Tracing endpoint forwarded to the child.
    pub tracing_endpoint: Option<&'a str>,
    /// Resolved path of the runtime shim.
    pub run_path: &'a str,
    /// Loopback address of the monitor proxy.
    pub monitor_address: &'a str,
    /// Directory holding the sync-invoke pipe pair.
    pub pipes_directory: &'a str,
}

/// Appends `--key value` when the value is non-empty.
fn maybe_append(args: &mut Vec<String>, key: &str, value: &str) {
    if !value.is_empty() {
        args.push(format!("--{key}"));
        args.push(value.to_string());
    }
}

/// Constructs the child argv from a run request.
#[must_use]
pub fn construct_arguments(params: &RunParams, context: &ArgumentContext<'_>) -> Vec<String> {
    let mut args = vec![context.run_path.to_string()];

    maybe_append(&mut args, "monitor", context.monitor_address);
    maybe_append(&mut args, "engine", context.engine_address.unwrap_or(""));
    maybe_append(&mut args, "sync", context.pipes_directory);
    maybe_append(&mut args, "organization", &params.organization);
    maybe_append(&mut args, "project", &params.project);
    maybe_append(&mut args, "stack", &params.stack);
    maybe_append(&mut args, "pwd", &params.pwd);
    if params.dry_run {
        args.push("--dry-run".to_string());
    }
    maybe_append(&mut args, "query-mode", &params.query_mode.to_string());
    maybe_append(&mut args, "parallel", &params.parallel.to_string());
    maybe_append(&mut args, "tracing", context.tracing_endpoint.unwrap_or(""));

    // An empty program path means the default module: `.` makes the
    // interpreter load ./index.js or whatever `main` in package.json names.
    if params.program.is_empty() {
        args.push(".".to_string());
    } else {
        args.push(params.program.clone());
    }

    args.extend(params.args.iter().cloned());
    args
}

/// Splits a flag string into arguments the way a POSIX shell tokenises.
///
/// Supports single quotes (literal), double quotes (backslash escapes the
/// quote and the backslash), and backslash escapes outside quotes.
///
/// # Errors
///
/// Returns [`ShellSplitError`] on an unterminated quote or trailing escape.
pub fn split_shell_words(input: &str) -> Result<Vec<String>, ShellSplitError> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = input.chars();

    let error = || ShellSplitError {
        input: input.to_string(),
    };

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(inner) => current.push(inner),
                        None => return Err(error()),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(escaped @ ('"' | '\\')) => current.push(escaped),
                            Some(other) => {
                                current.push('\\');
                                current.push(other);
                            }
                            None => return Err(error()),
                        },
                        Some(inner) => current.push(inner),
                        None => return Err(error()),
                    }
                }
            }
            '\\' => {
                in_word = true;
                match chars.next() {
                    Some(escaped) => current.push(escaped),
                    None => return Err(error()),
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}
