//! YAML sweep configuration and its validation.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sweep_core::{
    map_jammer_channel, Channel, DeviceRole, ErrorInfo, InterferenceType, RdcDriver, SweepError,
};
use sweep_link::{ProtocolTiming, DEFAULT_LINE_CAPACITY};

/// Device paths of the three motes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotePaths {
    /// Mote sending the test traffic.
    #[serde(default)]
    pub sending: String,
    /// Mote receiving the test traffic.
    #[serde(default)]
    pub receiving: String,
    /// Mote running the interference firmware.
    #[serde(default)]
    pub jamlab: String,
}

impl MotePaths {
    /// Paths keyed by role, skipping empty entries.
    pub fn by_role(&self) -> BTreeMap<DeviceRole, String> {
        [
            (DeviceRole::Sending, &self.sending),
            (DeviceRole::Receiving, &self.receiving),
            (DeviceRole::Jamlab, &self.jamlab),
        ]
        .into_iter()
        .filter(|(_, path)| !path.is_empty())
        .map(|(role, path)| (role, path.clone()))
        .collect()
    }
}

/// Firmware source directories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramPaths {
    /// Interference firmware.
    pub jamlab: PathBuf,
    /// Communication firmware; also hosts the progress files.
    pub communication: PathBuf,
}

/// Protocol timers in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Watchdog window.
    #[serde(default = "TimingConfig::default_watchdog_ms")]
    pub watchdog_ms: u64,
    /// Quiescence delay after the terminal record.
    #[serde(default = "TimingConfig::default_quiescence_ms")]
    pub quiescence_ms: u64,
}

impl TimingConfig {
    const fn default_watchdog_ms() -> u64 {
        10_000
    }

    const fn default_quiescence_ms() -> u64 {
        5_000
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            watchdog_ms: Self::default_watchdog_ms(),
            quiescence_ms: Self::default_quiescence_ms(),
        }
    }
}

impl From<TimingConfig> for ProtocolTiming {
    fn from(timing: TimingConfig) -> Self {
        ProtocolTiming {
            watchdog: Duration::from_millis(timing.watchdog_ms),
            quiescence: Duration::from_millis(timing.quiescence_ms),
        }
    }
}

/// Serial port settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Baud rate of every mote.
    #[serde(default = "SerialConfig::default_baud_rate")]
    pub baud_rate: u32,
    /// Read timeout used by the reader threads to notice a close.
    #[serde(default = "SerialConfig::default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Lines buffered per role.
    #[serde(default = "SerialConfig::default_line_capacity")]
    pub line_capacity: usize,
}

impl SerialConfig {
    const fn default_baud_rate() -> u32 {
        115_200
    }

    const fn default_read_timeout_ms() -> u64 {
        200
    }

    const fn default_line_capacity() -> usize {
        DEFAULT_LINE_CAPACITY
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: Self::default_baud_rate(),
            read_timeout_ms: Self::default_read_timeout_ms(),
            line_capacity: Self::default_line_capacity(),
        }
    }
}

/// Verbosity of the log output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Errors only.
    Error,
    /// Warnings and errors.
    Warn,
    /// Sweep progress.
    #[default]
    Info,
    /// Every serial record and device command.
    Debug,
    /// Everything.
    Trace,
}

impl LogLevel {
    /// Directive understood by log filters.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Where and how much to log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Minimum level.
    #[serde(default)]
    pub level: LogLevel,
    /// Log file; stderr when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

/// Complete description of a sweep and the lab it runs in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Device paths.
    #[serde(default)]
    pub motes: MotePaths,
    /// Repetitions per interference type.
    #[serde(default = "SweepConfig::default_repetitions")]
    pub repetitions: u32,
    /// Channels to sweep.
    pub channels: Vec<u16>,
    /// Duty-cycling drivers to sweep.
    pub rdc_drivers: Vec<RdcDriver>,
    /// Interference types to sweep.
    pub interference_types: Vec<u16>,
    /// Firmware directories.
    pub program_paths: ProgramPaths,
    /// Clear channel assessment flag.
    #[serde(default)]
    pub cca: u8,
    /// Protocol timers.
    #[serde(default)]
    pub timing: TimingConfig,
    /// Serial settings.
    #[serde(default)]
    pub serial: SerialConfig,
    /// Log settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SweepConfig {
    const fn default_repetitions() -> u32 {
        1
    }

    /// Reads a YAML configuration file.
    pub fn load(path: &Path) -> Result<Self, SweepError> {
        let contents = fs::read_to_string(path).map_err(|err| {
            SweepError::Configuration(
                ErrorInfo::new("config_read", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        Self::from_yaml(&contents).map_err(|err| match err {
            SweepError::Configuration(info) => {
                SweepError::Configuration(info.with_context("path", path.display().to_string()))
            }
            other => other,
        })
    }

    /// Parses a YAML document.
    pub fn from_yaml(contents: &str) -> Result<Self, SweepError> {
        serde_yaml::from_str(contents).map_err(|err| {
            SweepError::Configuration(ErrorInfo::new("config_yaml", err.to_string()))
        })
    }

    /// Protocol timers as durations.
    pub fn protocol_timing(&self) -> ProtocolTiming {
        self.timing.into()
    }

    /// Validated channels, in configuration order.
    pub fn channel_values(&self) -> Result<Vec<Channel>, SweepError> {
        self.channels.iter().map(|raw| Channel::new(*raw)).collect()
    }

    /// Validated interference types, in configuration order.
    pub fn interference_values(&self) -> Result<Vec<InterferenceType>, SweepError> {
        self.interference_types
            .iter()
            .map(|raw| InterferenceType::new(*raw))
            .collect()
    }

    /// Every problem with the configuration. Only the program directories are
    /// inspected on disk; no device is touched.
    pub fn problems(&self) -> Vec<SweepError> {
        let mut problems = Vec::new();
        if self.repetitions == 0 {
            problems.push(SweepError::configuration(
                "repetitions_zero",
                "at least one repetition is required",
            ));
        }
        if self.rdc_drivers.is_empty() {
            problems.push(SweepError::configuration("axis_empty", "no rdc driver configured"));
        }
        if self.channels.is_empty() {
            problems.push(SweepError::configuration("axis_empty", "no channel configured"));
        }
        if self.interference_types.is_empty() {
            problems.push(SweepError::configuration(
                "axis_empty",
                "no interference type configured",
            ));
        }
        let channels: Vec<Channel> = self
            .channels
            .iter()
            .filter_map(|raw| Channel::new(*raw).map_err(|err| problems.push(err)).ok())
            .collect();
        let types: Vec<InterferenceType> = self
            .interference_types
            .iter()
            .filter_map(|raw| InterferenceType::new(*raw).map_err(|err| problems.push(err)).ok())
            .collect();
        if types.contains(&InterferenceType::EXTERNAL_JAMMER) {
            for channel in &channels {
                if let Err(err) = map_jammer_channel(*channel) {
                    problems.push(err);
                }
            }
        }
        for (name, path) in [
            ("jamlab", &self.program_paths.jamlab),
            ("communication", &self.program_paths.communication),
        ] {
            if !path.is_dir() {
                problems.push(SweepError::Configuration(
                    ErrorInfo::new("program_path", "program path is not an accessible directory")
                        .with_context("program", name)
                        .with_context("path", path.display().to_string()),
                ));
            }
        }
        let motes = self.motes.by_role();
        for role in [DeviceRole::Sending, DeviceRole::Receiving, DeviceRole::Jamlab] {
            if !motes.contains_key(&role) {
                problems.push(SweepError::Configuration(
                    ErrorInfo::new("mote_missing", "no device path configured for role")
                        .with_context("role", role.to_string()),
                ));
            }
        }
        if self.timing.watchdog_ms == 0 {
            problems.push(SweepError::configuration(
                "watchdog_zero",
                "the watchdog window must be positive",
            ));
        }
        problems
    }

    /// Fails with the single problem found, or with a summary of all of them.
    pub fn validate(&self) -> Result<(), SweepError> {
        let mut problems = self.problems();
        match problems.len() {
            0 => Ok(()),
            1 => Err(problems.remove(0)),
            count => {
                let mut info = ErrorInfo::new(
                    "config_invalid",
                    format!("{count} configuration problems"),
                );
                for (idx, problem) in problems.iter().enumerate() {
                    info = info.with_context(format!("problem_{}", idx + 1), problem.to_string());
                }
                Err(SweepError::Configuration(info))
            }
        }
    }
}
