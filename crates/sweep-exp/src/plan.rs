//! Sweep enumeration and rebuild policy.

use serde::Serialize;
use sweep_core::{
    stable_hash_string, Channel, ErrorInfo, ExperimentSetup, InterferenceType, RdcDriver,
    RebuildFlags, SweepError, SweepPosition,
};
use sweep_store::{PointOutcome, ProgressSnapshot};

use crate::config::SweepConfig;

/// Ordered sweep axes. Driver is the outermost axis, repetition the innermost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepPlan {
    drivers: Vec<RdcDriver>,
    channels: Vec<Channel>,
    interference_types: Vec<InterferenceType>,
    repetitions: u32,
    cca: u8,
}

/// Where a sweep starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartPoint {
    /// First position to run.
    pub position: SweepPosition,
    /// Rebuild everything at the first point regardless of its position.
    pub force_rebuild: bool,
}

impl SweepPlan {
    /// Builds a plan from already validated axes.
    pub fn new(
        drivers: Vec<RdcDriver>,
        channels: Vec<Channel>,
        interference_types: Vec<InterferenceType>,
        repetitions: u32,
        cca: u8,
    ) -> Self {
        Self {
            drivers,
            channels,
            interference_types,
            repetitions,
            cca,
        }
    }

    /// Validates `config` and builds its plan.
    pub fn from_config(config: &SweepConfig) -> Result<Self, SweepError> {
        config.validate()?;
        Ok(Self::new(
            config.rdc_drivers.clone(),
            config.channel_values()?,
            config.interference_values()?,
            config.repetitions,
            config.cca,
        ))
    }

    /// Interference types in sweep order.
    pub fn interference_types(&self) -> &[InterferenceType] {
        &self.interference_types
    }

    /// Number of sweep points.
    pub fn len(&self) -> usize {
        self.drivers.len()
            * self.channels.len()
            * self.interference_types.len()
            * self.repetitions as usize
    }

    /// True when the plan has no point.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// SHA-256 over the canonical plan; snapshots record it to guard resumes.
    pub fn hash(&self) -> Result<String, SweepError> {
        stable_hash_string(self)
    }

    /// Every position in sweep order.
    pub fn positions(&self) -> Vec<SweepPosition> {
        let mut positions = Vec::with_capacity(self.len());
        for i in 0..self.drivers.len() {
            for j in 0..self.channels.len() {
                for k in 0..self.interference_types.len() {
                    for l in 0..self.repetitions as usize {
                        positions.push(SweepPosition::new(i, j, k, l));
                    }
                }
            }
        }
        positions
    }

    /// Setup of the point at `position`, with the rebuild policy applied.
    pub fn setup_at(&self, position: SweepPosition) -> Result<ExperimentSetup, SweepError> {
        let out_of_plan = || {
            SweepError::Configuration(
                ErrorInfo::new("position_out_of_plan", "sweep position outside the plan")
                    .with_context("position", position.label()),
            )
        };
        if position.l >= self.repetitions as usize {
            return Err(out_of_plan());
        }
        let rdc_driver = *self.drivers.get(position.i).ok_or_else(out_of_plan)?;
        let channel = *self.channels.get(position.j).ok_or_else(out_of_plan)?;
        let interference_type = *self
            .interference_types
            .get(position.k)
            .ok_or_else(out_of_plan)?;
        Ok(ExperimentSetup {
            channel,
            rdc_driver,
            interference_type,
            cca: self.cca,
            repetition: position.l as u32,
            rebuild: RebuildFlags {
                communication: position.k == 0 && position.l == 0,
                interference_firmware: position.l == 0,
                external_jammer: false,
            },
        })
    }

    /// Points from `start` onwards, in sweep order.
    pub fn points_from(
        &self,
        start: StartPoint,
    ) -> Result<Vec<(SweepPosition, ExperimentSetup)>, SweepError> {
        let mut points = Vec::new();
        for position in self.positions().into_iter().filter(|pos| *pos >= start.position) {
            let mut setup = self.setup_at(position)?;
            if start.force_rebuild && points.is_empty() {
                setup.rebuild.communication = true;
                setup.rebuild.interference_firmware = true;
            }
            points.push((position, setup));
        }
        Ok(points)
    }

    /// True when `position` closes its (driver, channel) block.
    pub fn closes_block(&self, position: SweepPosition) -> bool {
        position.k + 1 == self.interference_types.len()
            && position.l + 1 == self.repetitions as usize
    }

    /// Position following `position`, if any.
    pub fn next_position(&self, position: SweepPosition) -> Option<SweepPosition> {
        self.positions().into_iter().find(|pos| *pos > position)
    }

    /// Start point that continues the sweep recorded in `snapshot`; `None`
    /// when the snapshot already covers the whole plan.
    pub fn resume_point(
        &self,
        snapshot: &ProgressSnapshot,
    ) -> Result<Option<StartPoint>, SweepError> {
        let hash = self.hash()?;
        if snapshot.plan_hash != hash {
            return Err(SweepError::Configuration(
                ErrorInfo::new("plan_mismatch", "snapshot was written by a different sweep plan")
                    .with_context("snapshot_plan", snapshot.plan_hash.clone())
                    .with_context("config_plan", hash)
                    .with_hint("resume with the configuration that produced the snapshot"),
            ));
        }
        let position = match snapshot.outcome {
            PointOutcome::Failed => Some(snapshot.position),
            PointOutcome::Completed => self.next_position(snapshot.position),
        };
        Ok(position.map(|position| StartPoint {
            position,
            force_rebuild: true,
        }))
    }
}
