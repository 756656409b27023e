//! In-process device backend that records every call.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use sweep_core::{DeviceRole, ErrorInfo, SweepError};
use tracing::debug;

use crate::{BuildFlags, DeviceControl};

/// Kind of device operation, used to inject failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceOp {
    /// [`DeviceControl::build`].
    Build,
    /// [`DeviceControl::upload`].
    Upload,
    /// [`DeviceControl::reset`].
    Reset,
    /// [`DeviceControl::start_jam`].
    StartJam,
    /// [`DeviceControl::stop_jam`].
    StopJam,
}

/// One recorded device call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DeviceCall {
    /// Firmware build.
    Build {
        /// Program directory.
        program: PathBuf,
        /// Build variables.
        flags: BuildFlags,
        /// Whether `make clean` ran first.
        clean: bool,
    },
    /// Firmware flash.
    Upload {
        /// Program directory.
        program: PathBuf,
        /// Target motes in order.
        devices: Vec<DeviceRole>,
    },
    /// Mote reset.
    Reset {
        /// Reset mote.
        device: DeviceRole,
    },
    /// Jammer start.
    StartJam {
        /// WiFi channel.
        channel: u8,
    },
    /// Jammer stop.
    StopJam,
}

impl DeviceCall {
    /// Operation kind of the call.
    pub fn op(&self) -> DeviceOp {
        match self {
            DeviceCall::Build { .. } => DeviceOp::Build,
            DeviceCall::Upload { .. } => DeviceOp::Upload,
            DeviceCall::Reset { .. } => DeviceOp::Reset,
            DeviceCall::StartJam { .. } => DeviceOp::StartJam,
            DeviceCall::StopJam => DeviceOp::StopJam,
        }
    }
}

/// Shared handle on the calls recorded by a [`SimulatedDevices`].
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<DeviceCall>>>);

impl CallLog {
    /// Copy of the calls recorded so far.
    pub fn calls(&self) -> Vec<DeviceCall> {
        match self.0.lock() {
            Ok(calls) => calls.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Number of recorded calls of kind `op`.
    pub fn count(&self, op: DeviceOp) -> usize {
        self.calls().iter().filter(|call| call.op() == op).count()
    }

    /// True when nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.calls().is_empty()
    }

    fn push(&self, call: DeviceCall) {
        match self.0.lock() {
            Ok(mut calls) => calls.push(call),
            Err(poisoned) => poisoned.into_inner().push(call),
        }
    }
}

/// Simulated lab hardware. Every call succeeds unless a failure was injected
/// for its operation kind; failing calls are still recorded.
#[derive(Debug, Clone, Default)]
pub struct SimulatedDevices {
    log: CallLog,
    fail_on: Option<(DeviceOp, usize)>,
}

impl SimulatedDevices {
    /// Creates a backend where every operation succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the `nth` (zero based) call of kind `op` fail.
    pub fn failing(mut self, op: DeviceOp, nth: usize) -> Self {
        self.fail_on = Some((op, nth));
        self
    }

    /// Handle on the recorded calls that stays valid after the backend moves.
    pub fn log(&self) -> CallLog {
        self.log.clone()
    }

    fn record(&mut self, call: DeviceCall) -> Result<(), SweepError> {
        debug!(?call, "simulated device call");
        let op = call.op();
        let seen = self.log.count(op);
        self.log.push(call);
        match self.fail_on {
            Some((fail_op, nth)) if fail_op == op && nth == seen => {
                Err(SweepError::DeviceOperation(
                    ErrorInfo::new("simulated_failure", "injected device failure")
                        .with_context("op", format!("{op:?}"))
                        .with_context("call", seen.to_string()),
                ))
            }
            _ => Ok(()),
        }
    }
}

impl DeviceControl for SimulatedDevices {
    fn build(&mut self, program: &Path, flags: &BuildFlags, clean: bool) -> Result<(), SweepError> {
        self.record(DeviceCall::Build {
            program: program.to_path_buf(),
            flags: flags.clone(),
            clean,
        })
    }

    fn upload(&mut self, program: &Path, devices: &[DeviceRole]) -> Result<(), SweepError> {
        self.record(DeviceCall::Upload {
            program: program.to_path_buf(),
            devices: devices.to_vec(),
        })
    }

    fn reset(&mut self, device: DeviceRole) -> Result<(), SweepError> {
        self.record(DeviceCall::Reset { device })
    }

    fn start_jam(&mut self, channel: u8) -> Result<(), SweepError> {
        self.record(DeviceCall::StartJam { channel })
    }

    fn stop_jam(&mut self) -> Result<(), SweepError> {
        self.record(DeviceCall::StopJam)
    }
}
