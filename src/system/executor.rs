// src/system/executor.rs

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::Path;
use std::process::{Command as StdCommand, Output, Stdio};
use thiserror::Error;

/// Failures to start an external command.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Command could not be parsed: {0}")]
    CommandParse(String),
    #[error("Command '{0}' could not be executed: {1}")]
    CommandFailed(String, std::io::Error),
    #[error("Command '{0}' exited with a non-zero error code.")]
    NonZeroExitStatus(String),
    #[error("Command '{command}' produced output that was not valid UTF-8")]
    InvalidUtf8Output {
        command: String,
        #[source]
        source: std::string::FromUtf8Error,
    },
}

/// Splits a command line. A leading `-` marks a line whose failure is ignored.
fn split_line(command_line: &str) -> Result<Option<(Vec<String>, bool)>, ExecutionError> {
    let trimmed = command_line.trim();
    let (line, ignore_errors) = match trimmed.strip_prefix('-') {
        Some(rest) => (rest.trim(), true),
        None => (trimmed, false),
    };
    if line.is_empty() {
        return Ok(None);
    }
    let parts = shlex::split(line).ok_or_else(|| ExecutionError::CommandParse(line.to_string()))?;
    if parts.is_empty() {
        return Ok(None);
    }
    Ok(Some((parts, ignore_errors)))
}

fn build(parts: &[String], cwd: &Path, env_vars: &BTreeMap<String, String>) -> Option<StdCommand> {
    let (program, args) = parts.split_first()?;
    let mut command = StdCommand::new(program);
    command
        .args(args)
        .current_dir(dunce::simplified(cwd))
        .envs(env_vars);
    Some(command)
}

/// Runs a command line to completion with inherited stdio.
pub fn execute_command(
    command_line: &str,
    cwd: &Path,
    env_vars: &BTreeMap<String, String>,
) -> Result<(), ExecutionError> {
    let Some((parts, ignore_errors)) = split_line(command_line)? else {
        return Ok(()); // An empty command is a success, not an error.
    };
    let display = parts.join(" ");
    let Some(mut command) = build(&parts, cwd, env_vars) else {
        return Ok(());
    };
    command.stdout(Stdio::inherit()).stderr(Stdio::inherit());

    log::debug!("Executing '{}' in '{}'.", display, cwd.display());
    let status = match command.status() {
        Ok(status) => status,
        // Windows built-ins such as `echo` only exist inside `cmd`.
        Err(e) if e.kind() == ErrorKind::NotFound && cfg!(target_os = "windows") => {
            log::debug!("Command '{}' not found. Retrying with cmd /C.", display);
            StdCommand::new("cmd")
                .arg("/C")
                .arg(&display)
                .current_dir(dunce::simplified(cwd))
                .envs(env_vars)
                .status()
                .map_err(|e| ExecutionError::CommandFailed(display.clone(), e))?
        }
        Err(e) => return Err(ExecutionError::CommandFailed(display, e)),
    };

    if !status.success() {
        if ignore_errors {
            log::debug!("Command '{}' failed; failure ignored.", display);
        } else {
            return Err(ExecutionError::NonZeroExitStatus(display));
        }
    }
    Ok(())
}

/// Runs a command line and captures its stdout and stderr.
pub fn execute_and_capture(
    command_line: &str,
    cwd: &Path,
    env_vars: &BTreeMap<String, String>,
) -> Result<Output, ExecutionError> {
    let parts = split_line(command_line)?
        .map(|(parts, _)| parts)
        .ok_or_else(|| ExecutionError::CommandParse(command_line.to_string()))?;
    let display = parts.join(" ");
    let mut command = build(&parts, cwd, env_vars)
        .ok_or_else(|| ExecutionError::CommandParse(command_line.to_string()))?;
    command
        .stdin(Stdio::null())
        .output()
        .map_err(|e| ExecutionError::CommandFailed(display, e))
}

/// Decodes captured output as UTF-8.
pub fn output_text(command_line: &str, bytes: Vec<u8>) -> Result<String, ExecutionError> {
    String::from_utf8(bytes).map_err(|e| ExecutionError::InvalidUtf8Output {
        command: command_line.to_string(),
        source: e,
    })
}
