//! External WiFi jammer driven through `nexutil`.

use sweep_core::SweepError;
use tracing::info;

use crate::command::CommandSpec;

/// Jammer controller. Monitor mode is enabled lazily before a jam starts and
/// released again when it stops.
#[derive(Debug, Clone)]
pub struct Nexutil {
    binary: String,
    monitor: bool,
    jamming: Option<u8>,
}

impl Default for Nexutil {
    fn default() -> Self {
        Self::new("nexutil")
    }
}

impl Nexutil {
    /// Uses the `nexutil` executable found at `binary`.
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            monitor: false,
            jamming: None,
        }
    }

    /// Channel currently being jammed.
    pub fn jamming(&self) -> Option<u8> {
        self.jamming
    }

    /// Commands issued by [`Nexutil::start`] in the current state.
    pub fn start_commands(&self, channel: u8) -> Vec<CommandSpec> {
        let mut commands = Vec::new();
        if !self.monitor {
            commands.push(CommandSpec::new(&self.binary).arg("-m2"));
        }
        commands.push(
            CommandSpec::new(&self.binary)
                .arg("-s0x701")
                .arg("-i")
                .arg("-v")
                .arg(channel.to_string()),
        );
        commands
    }

    /// Commands issued by [`Nexutil::stop`].
    pub fn stop_commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new(&self.binary).arg("-s0x705"),
            CommandSpec::new(&self.binary).arg("-m0"),
        ]
    }

    /// Starts jamming `channel`.
    pub fn start(&mut self, channel: u8) -> Result<(), SweepError> {
        for command in self.start_commands(channel) {
            command.run()?;
            if command.args().first().map(String::as_str) == Some("-m2") {
                self.monitor = true;
            }
        }
        self.jamming = Some(channel);
        info!(channel, "external jammer started");
        Ok(())
    }

    /// Stops jamming and leaves monitor mode.
    pub fn stop(&mut self) -> Result<(), SweepError> {
        for command in self.stop_commands() {
            command.run()?;
        }
        self.monitor = false;
        self.jamming = None;
        info!("external jammer stopped");
        Ok(())
    }
}
