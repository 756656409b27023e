//! Contiki `make` targets for building, flashing and resetting motes.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use sweep_core::{DeviceRole, ErrorInfo, SweepError};

use crate::command::CommandSpec;
use crate::BuildFlags;

const MAKE: &str = "make";

/// Reads the project name from the `CONTIKI_PROJECT` line of `program`'s Makefile.
///
/// Only the first project is used when the line lists several.
pub fn project_name(program: &Path) -> Result<String, SweepError> {
    let makefile = program.join("Makefile");
    let contents = fs::read_to_string(&makefile).map_err(|err| {
        SweepError::Configuration(
            ErrorInfo::new("makefile_read", err.to_string())
                .with_context("path", makefile.display().to_string()),
        )
    })?;
    contents
        .lines()
        .filter(|line| line.starts_with("CONTIKI_PROJECT"))
        .find_map(|line| {
            let (_, value) = line.split_once('=')?;
            value
                .split(|c: char| c == ',' || c.is_whitespace())
                .find(|name| !name.is_empty())
                .map(str::to_string)
        })
        .ok_or_else(|| {
            SweepError::Configuration(
                ErrorInfo::new("makefile_project", "no CONTIKI_PROJECT in Makefile")
                    .with_context("path", makefile.display().to_string())
                    .with_hint("declare `CONTIKI_PROJECT = <name>` in the program Makefile"),
            )
        })
}

/// Contiki toolchain bound to the motes of one lab setup.
#[derive(Debug, Clone)]
pub struct ContikiMake {
    motes: BTreeMap<DeviceRole, String>,
    reset_dir: PathBuf,
    platform: String,
}

impl ContikiMake {
    /// `motes` maps each role to its tty; resets run from `reset_dir`.
    pub fn new(motes: BTreeMap<DeviceRole, String>, reset_dir: impl Into<PathBuf>) -> Self {
        Self {
            motes,
            reset_dir: reset_dir.into(),
            platform: "sky".to_string(),
        }
    }

    /// Overrides the mote platform used for the reset target.
    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }

    fn mote(&self, role: DeviceRole) -> Result<&str, SweepError> {
        self.motes.get(&role).map(String::as_str).ok_or_else(|| {
            SweepError::Configuration(
                ErrorInfo::new("mote_missing", "no device path configured for role")
                    .with_context("role", role.to_string()),
            )
        })
    }

    /// `make clean` (optional) followed by `make <project> NAME=value...`.
    pub fn build_commands(
        &self,
        program: &Path,
        flags: &BuildFlags,
        clean: bool,
    ) -> Result<Vec<CommandSpec>, SweepError> {
        let project = project_name(program)?;
        let mut commands = Vec::new();
        if clean {
            commands.push(CommandSpec::new(MAKE).arg("clean").current_dir(program));
        }
        let mut build = CommandSpec::new(MAKE).arg(project).current_dir(program);
        for (name, value) in flags.iter() {
            build = build.arg(format!("{name}={value}"));
        }
        commands.push(build);
        Ok(commands)
    }

    /// One `make <project>.upload MOTES=<tty>` per device, in order.
    pub fn upload_commands(
        &self,
        program: &Path,
        devices: &[DeviceRole],
    ) -> Result<Vec<CommandSpec>, SweepError> {
        let project = project_name(program)?;
        devices
            .iter()
            .map(|role| {
                Ok(CommandSpec::new(MAKE)
                    .arg(format!("{project}.upload"))
                    .arg(format!("MOTES={}", self.mote(*role)?))
                    .current_dir(program))
            })
            .collect()
    }

    /// `make <platform>-reset MOTES=<tty>`.
    pub fn reset_command(&self, device: DeviceRole) -> Result<CommandSpec, SweepError> {
        Ok(CommandSpec::new(MAKE)
            .arg(format!("{}-reset", self.platform))
            .arg(format!("MOTES={}", self.mote(device)?))
            .current_dir(&self.reset_dir))
    }
}
