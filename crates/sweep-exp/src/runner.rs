//! Executes one sweep point against the lab hardware.

use std::path::Path;

use sweep_core::{
    map_jammer_channel, DeviceRole, ExperimentSetup, InterferenceKind, InterferenceType,
    SweepError,
};
use sweep_device::{BuildFlags, DeviceControl};
use sweep_link::{await_result, ProtocolOutcome, ProtocolTiming, RecordSink, SerialChannelManager};
use tracing::{debug, info, warn};

use crate::config::ProgramPaths;

const PLATFORM: &str = "sky";

/// Drives the devices and serial links for each sweep point.
///
/// Tracks what the hardware currently runs so that interference is switched
/// only when the sweep moves to another type.
pub struct TestRunner<D> {
    devices: D,
    links: SerialChannelManager,
    programs: ProgramPaths,
    timing: ProtocolTiming,
    jamming: Option<u8>,
    firmware: Option<InterferenceType>,
}

impl<D: DeviceControl> TestRunner<D> {
    /// Creates a runner; nothing is touched until the first point.
    pub fn new(
        devices: D,
        links: SerialChannelManager,
        programs: ProgramPaths,
        timing: ProtocolTiming,
    ) -> Self {
        Self {
            devices,
            links,
            programs,
            timing,
            jamming: None,
            firmware: None,
        }
    }

    /// Device backend.
    pub fn devices(&self) -> &D {
        &self.devices
    }

    /// Channel the external jammer is active on.
    pub fn jamming(&self) -> Option<u8> {
        self.jamming
    }

    /// Directory holding the communication firmware and the progress files.
    pub fn communication_dir(&self) -> &Path {
        &self.programs.communication
    }

    /// Runs the point described by `setup`, feeding every record to `sink`.
    pub async fn run<S>(
        &mut self,
        setup: &ExperimentSetup,
        sink: &mut S,
    ) -> Result<ProtocolOutcome, SweepError>
    where
        S: RecordSink + ?Sized,
    {
        let rebuild = setup.rebuild;
        if setup.repetition == 0 || rebuild.communication || rebuild.interference_firmware {
            self.prepare(setup)?;
        }
        // Streams are attached before the resets so records emitted right
        // after boot are kept.
        let receiving = self.links.connect(DeviceRole::Receiving)?;
        let sending = self.links.connect(DeviceRole::Sending)?;
        let started = self
            .devices
            .reset(DeviceRole::Receiving)
            .and_then(|()| self.devices.reset(DeviceRole::Sending));
        let outcome = match started {
            Ok(()) => {
                debug!("motes reset, awaiting results");
                await_result(receiving, sending, &self.timing, sink).await
            }
            Err(err) => Err(err),
        };
        self.links.close(DeviceRole::Receiving);
        self.links.close(DeviceRole::Sending);
        outcome
    }

    /// Installs interference and firmware for the first repetition of a point.
    fn prepare(&mut self, setup: &ExperimentSetup) -> Result<(), SweepError> {
        match setup.interference_type.kind() {
            InterferenceKind::None | InterferenceKind::Local(_) => {
                if self.jamming.is_some() {
                    self.stop_jammer()?;
                }
                if setup.rebuild.interference_firmware {
                    self.load_interference(setup.interference_type)?;
                }
            }
            InterferenceKind::ExternalJammer => {
                let wifi_channel = map_jammer_channel(setup.channel)?;
                self.load_interference(InterferenceType::NONE)?;
                info!(channel = %setup.channel, wifi_channel, "starting external jammer");
                self.devices.start_jam(wifi_channel)?;
                self.jamming = Some(wifi_channel);
            }
        }
        if setup.rebuild.communication {
            info!(
                channel = %setup.channel,
                driver = %setup.rdc_driver,
                "building communication firmware"
            );
            let flags = BuildFlags::new()
                .with("TARGET", PLATFORM)
                .with("AB_NETSTACK_CONF_RDC", setup.rdc_driver)
                .with("AB_CC2420_CONF_CHANNEL", setup.channel);
            self.devices.build(&self.programs.communication, &flags, true)?;
            self.devices.upload(
                &self.programs.communication,
                &[DeviceRole::Receiving, DeviceRole::Sending],
            )?;
        }
        Ok(())
    }

    fn load_interference(&mut self, interference_type: InterferenceType) -> Result<(), SweepError> {
        info!(%interference_type, "building interference firmware");
        let flags = BuildFlags::new()
            .with("TARGET", PLATFORM)
            .with("JAMLAB_CONF_INTERFERENCE_TYPE", interference_type);
        self.devices.build(&self.programs.jamlab, &flags, true)?;
        self.devices.upload(&self.programs.jamlab, &[DeviceRole::Jamlab])?;
        self.firmware = Some(interference_type);
        Ok(())
    }

    fn stop_jammer(&mut self) -> Result<(), SweepError> {
        info!("stopping external jammer");
        self.devices.stop_jam()?;
        self.jamming = None;
        Ok(())
    }

    /// Closes every link and silences interference. Keeps going after a
    /// failure and reports the first one.
    pub fn teardown(&mut self) -> Result<(), SweepError> {
        self.links.close_all();
        let mut first: Option<SweepError> = None;
        if self.jamming.is_some() {
            if let Err(err) = self.stop_jammer() {
                warn!(error = %err, "failed to stop external jammer");
                first.get_or_insert(err);
            }
        }
        if self.firmware.is_some_and(|loaded| loaded != InterferenceType::NONE) {
            if let Err(err) = self.load_interference(InterferenceType::NONE) {
                warn!(error = %err, "failed to silence interference firmware");
                first.get_or_insert(err);
            }
        }
        match first {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
