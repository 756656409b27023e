//! External commands (program, arguments, working directory) run by the device adapters.

use std::fmt::{self, Display};
use std::path::{Path, PathBuf};
use std::process::Command;

use sweep_core::{ErrorInfo, SweepError};
use tracing::debug;

/// Lines of stderr kept in a device error.
const STDERR_TAIL_LINES: usize = 20;

/// External command run on behalf of a device operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
}

impl CommandSpec {
    /// Starts a command invoking `program`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Runs the command from `dir`.
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Program name.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments in order.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Working directory, if set.
    pub fn cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    /// Runs the command to completion; a non-zero exit status is an error.
    pub fn run(&self) -> Result<(), SweepError> {
        debug!(command = %self, "running device command");
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        if let Some(dir) = &self.cwd {
            command.current_dir(dir);
        }
        let output = command.output().map_err(|err| {
            SweepError::DeviceOperation(
                self.describe(ErrorInfo::new("command_spawn", err.to_string())),
            )
        })?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let lines: Vec<&str> = stderr.lines().collect();
        let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
        let status = output
            .status
            .code()
            .map(|code| code.to_string())
            .unwrap_or_else(|| "signal".to_string());
        Err(SweepError::DeviceOperation(
            self.describe(ErrorInfo::new("command_failed", "device command exited unsuccessfully"))
                .with_context("status", status)
                .with_context("stderr", tail),
        ))
    }

    fn describe(&self, info: ErrorInfo) -> ErrorInfo {
        let info = info.with_context("command", self.to_string());
        match &self.cwd {
            Some(dir) => info.with_context("cwd", dir.display().to_string()),
            None => info,
        }
    }
}

impl Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}
