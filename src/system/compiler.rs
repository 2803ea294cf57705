// src/system/compiler.rs

use crate::constants::{ENV_CLASSPATH, ENV_OUTPUT_DIR};
use crate::core::bootstrap::{CompilationError, Compiler};
use crate::core::cache::{self, CompileStamp};
use crate::core::paths;
use crate::models::{Location, WorkAreas};
use crate::system::executor;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Compiles build-definition sources by running an external command.
///
/// The command receives the compile options as extra arguments, the classpath in
/// `KEEL_CLASSPATH` and the directory to write to in `KEEL_OUTPUT_DIR`. Without a
/// command the source directory itself is loaded as-is. Unchanged inputs reuse the
/// previous outputs.
#[derive(Debug, Clone)]
pub struct CommandCompiler {
    command: Option<String>,
    output_dir: PathBuf,
    stamp_path: PathBuf,
    cwd: PathBuf,
}

impl CommandCompiler {
    pub fn new(command: Option<String>, output_dir: Option<PathBuf>, areas: &WorkAreas, cwd: &Path) -> Self {
        Self {
            command,
            output_dir: output_dir.unwrap_or_else(|| paths::definition_classes_dir(areas)),
            stamp_path: paths::compile_stamp_path(areas),
            cwd: cwd.to_path_buf(),
        }
    }

    fn command_line(&self, command: &str, options: &[String]) -> Result<String, CompilationError> {
        if options.is_empty() {
            return Ok(command.to_string());
        }
        let quoted = shlex::try_join(options.iter().map(String::as_str)).map_err(|e| {
            CompilationError {
                diagnostics: format!("Compile options cannot be quoted: {}", e),
            }
        })?;
        Ok(format!("{} {}", command, quoted))
    }

    fn run(&self, command_line: &str, classpath: &[Location]) -> Result<(), CompilationError> {
        fs::create_dir_all(&self.output_dir).map_err(|e| CompilationError {
            diagnostics: format!(
                "Failed to create output directory '{}': {}",
                self.output_dir.display(),
                e
            ),
        })?;

        let joined = std::env::join_paths(classpath.iter().map(Location::path))
            .map_err(|e| CompilationError {
                diagnostics: format!("Classpath cannot be passed to the compiler: {}", e),
            })?;
        let env: BTreeMap<String, String> = [
            (ENV_CLASSPATH.to_string(), joined.to_string_lossy().into_owned()),
            (
                ENV_OUTPUT_DIR.to_string(),
                self.output_dir.display().to_string(),
            ),
        ]
        .into_iter()
        .collect();

        log::debug!("Compiling with '{}'.", command_line);
        let output = executor::execute_and_capture(command_line, &self.cwd, &env).map_err(|e| {
            CompilationError {
                diagnostics: e.to_string(),
            }
        })?;
        if output.status.success() {
            return Ok(());
        }
        let mut diagnostics = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            if !diagnostics.is_empty() {
                diagnostics.push('\n');
            }
            diagnostics.push_str(stdout.trim());
        }
        if diagnostics.is_empty() {
            diagnostics = format!("'{}' exited with {}", command_line, output.status);
        }
        Err(CompilationError { diagnostics })
    }
}

impl Compiler for CommandCompiler {
    fn compile(
        &mut self,
        source_root: &Path,
        options: &[String],
        classpath: &[Location],
    ) -> Result<Vec<Location>, CompilationError> {
        if !source_root.is_dir() {
            log::debug!(
                "No build-definition sources at '{}'; nothing to compile.",
                source_root.display()
            );
            return Ok(Vec::new());
        }

        let mut inputs = options.to_vec();
        inputs.extend(self.command.iter().cloned());
        let fingerprint = cache::fingerprint(source_root, &inputs, classpath).map_err(|e| {
            CompilationError {
                diagnostics: format!("{:#}", e),
            }
        })?;
        if let Some(outputs) = cache::up_to_date_outputs(&self.stamp_path, &fingerprint) {
            log::debug!("Build definition up to date ({}).", fingerprint);
            return Ok(outputs);
        }

        let outputs = match &self.command {
            Some(command) => {
                let line = self.command_line(command, options)?;
                self.run(&line, classpath)?;
                vec![Location::new(&self.output_dir)]
            }
            None => vec![Location::new(source_root)],
        };

        let stamp = CompileStamp {
            fingerprint,
            outputs: outputs.clone(),
        };
        if let Err(e) = cache::write_stamp(&self.stamp_path, &stamp) {
            log::warn!("Compile stamp not written: {:#}", e);
        }
        Ok(outputs)
    }
}
