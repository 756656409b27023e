#![deny(missing_docs)]
#![doc = "Device control for radio sweeps: firmware builds, flashing, mote resets and the external jammer."]

pub mod command;
pub mod contiki;
pub mod nexutil;
pub mod simulated;

use std::fmt::{self, Display};
use std::path::Path;

use serde::Serialize;
use sweep_core::{DeviceRole, SweepError};

pub use command::CommandSpec;
pub use contiki::{project_name, ContikiMake};
pub use nexutil::Nexutil;
pub use simulated::{CallLog, DeviceCall, DeviceOp, SimulatedDevices};

/// Ordered `NAME=value` variables handed to a firmware build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct BuildFlags(Vec<(String, String)>);

impl BuildFlags {
    /// Creates an empty flag set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `name` to `value`, replacing an earlier value for the same name.
    pub fn with(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        let name = name.into();
        let value = value.to_string();
        match self.0.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = value,
            None => self.0.push((name, value)),
        }
        self
    }

    /// Looks up the value of `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value.as_str())
    }

    /// Iterates over the flags in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// True when no flag is set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Display for BuildFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, (name, value)) in self.iter().enumerate() {
            if idx > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{name}={value}")?;
        }
        Ok(())
    }
}

/// Operations the sweep needs from the lab hardware.
///
/// Every operation is synchronous and exclusive; a failing operation returns
/// [`SweepError::DeviceOperation`].
pub trait DeviceControl {
    /// Builds the firmware at `program`, optionally cleaning first.
    fn build(&mut self, program: &Path, flags: &BuildFlags, clean: bool) -> Result<(), SweepError>;

    /// Flashes the firmware built at `program` onto each mote in `devices`.
    fn upload(&mut self, program: &Path, devices: &[DeviceRole]) -> Result<(), SweepError>;

    /// Resets one mote so that it restarts its firmware.
    fn reset(&mut self, device: DeviceRole) -> Result<(), SweepError>;

    /// Starts the external jammer on the given WiFi channel.
    fn start_jam(&mut self, channel: u8) -> Result<(), SweepError>;

    /// Stops the external jammer.
    fn stop_jam(&mut self) -> Result<(), SweepError>;
}

impl<T: DeviceControl + ?Sized> DeviceControl for Box<T> {
    fn build(&mut self, program: &Path, flags: &BuildFlags, clean: bool) -> Result<(), SweepError> {
        (**self).build(program, flags, clean)
    }

    fn upload(&mut self, program: &Path, devices: &[DeviceRole]) -> Result<(), SweepError> {
        (**self).upload(program, devices)
    }

    fn reset(&mut self, device: DeviceRole) -> Result<(), SweepError> {
        (**self).reset(device)
    }

    fn start_jam(&mut self, channel: u8) -> Result<(), SweepError> {
        (**self).start_jam(channel)
    }

    fn stop_jam(&mut self) -> Result<(), SweepError> {
        (**self).stop_jam()
    }
}

/// Production adapter: Contiki make targets for the motes and `nexutil` for
/// the external jammer.
#[derive(Debug, Clone)]
pub struct LabDevices {
    contiki: ContikiMake,
    jammer: Nexutil,
}

impl LabDevices {
    /// Combines the mote toolchain with the jammer driver.
    pub fn new(contiki: ContikiMake, jammer: Nexutil) -> Self {
        Self { contiki, jammer }
    }
}

impl DeviceControl for LabDevices {
    fn build(&mut self, program: &Path, flags: &BuildFlags, clean: bool) -> Result<(), SweepError> {
        for command in self.contiki.build_commands(program, flags, clean)? {
            command.run()?;
        }
        Ok(())
    }

    fn upload(&mut self, program: &Path, devices: &[DeviceRole]) -> Result<(), SweepError> {
        for command in self.contiki.upload_commands(program, devices)? {
            command.run()?;
        }
        Ok(())
    }

    fn reset(&mut self, device: DeviceRole) -> Result<(), SweepError> {
        self.contiki.reset_command(device)?.run()
    }

    fn start_jam(&mut self, channel: u8) -> Result<(), SweepError> {
        self.jammer.start(channel)
    }

    fn stop_jam(&mut self) -> Result<(), SweepError> {
        self.jammer.stop()
    }
}
