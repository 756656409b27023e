//! Sweep loop: runs every point, persists progress and renders reports.

use std::path::PathBuf;

use sweep_core::{DeviceRole, ExperimentSetup, SweepError, SweepPosition};
use sweep_device::DeviceControl;
use sweep_store::{
    render, render_key, write_metrics_csv, PointOutcome, ProgressSnapshot, ProgressWriter,
    ResultStore, SerialRecord, SlotKey,
};
use tracing::{debug, error, info, warn};

use crate::plan::{StartPoint, SweepPlan};
use crate::runner::TestRunner;

/// File name of the final text report inside the log directory.
pub const REPORT_FILE: &str = "report.txt";
/// File name of the per-run metrics export inside the log directory.
pub const METRICS_FILE: &str = "metrics.csv";

/// State threaded through a sweep run.
#[derive(Debug)]
pub struct SweepContext {
    /// Results collected so far.
    pub store: ResultStore,
    /// Progress file writer.
    pub progress: ProgressWriter,
}

impl SweepContext {
    /// Empty store writing progress under `progress`.
    pub fn new(progress: ProgressWriter) -> Self {
        Self {
            store: ResultStore::new(),
            progress,
        }
    }
}

/// What a finished sweep produced.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepSummary {
    /// Points run by this invocation.
    pub points: usize,
    /// Rendered report over the whole store.
    pub report: String,
    /// Location of the last snapshot, absent when no point ran.
    pub snapshot_path: Option<PathBuf>,
    /// Location of the text report.
    pub report_path: PathBuf,
    /// Location of the CSV export.
    pub metrics_path: PathBuf,
}

/// Runs a [`SweepPlan`] point by point.
pub struct SweepController<D> {
    plan: SweepPlan,
    plan_hash: String,
    runner: TestRunner<D>,
    context: SweepContext,
}

impl<D: DeviceControl> SweepController<D> {
    /// Binds a plan to its runner and context.
    pub fn new(
        plan: SweepPlan,
        runner: TestRunner<D>,
        context: SweepContext,
    ) -> Result<Self, SweepError> {
        let plan_hash = plan.hash()?;
        Ok(Self {
            plan,
            plan_hash,
            runner,
            context,
        })
    }

    /// Sweep plan.
    pub fn plan(&self) -> &SweepPlan {
        &self.plan
    }

    /// Store and progress writer.
    pub fn context(&self) -> &SweepContext {
        &self.context
    }

    /// Test runner, and through it the devices.
    pub fn runner(&self) -> &TestRunner<D> {
        &self.runner
    }

    /// Seeds the store from `snapshot` and returns where to continue, or
    /// `None` when the snapshot already covers the whole plan.
    pub fn resume(&mut self, snapshot: ProgressSnapshot) -> Result<Option<StartPoint>, SweepError> {
        let start = self.plan.resume_point(&snapshot)?;
        let mut store = snapshot.results;
        if let Some(setup) = &snapshot.setup {
            let slot = SlotKey::of(setup);
            let dropped = match snapshot.outcome {
                PointOutcome::Failed => store.remove(&slot).is_some(),
                PointOutcome::Completed => store.discard_unfinalized(&slot),
            };
            if dropped {
                debug!(position = %snapshot.position.label(), "discarded partial run");
            }
        }
        info!(runs = store.len(), start = ?start.map(|s| s.position.label()), "resuming sweep");
        self.context.store = store;
        Ok(start)
    }

    /// Runs the whole plan from the first point.
    pub async fn run(&mut self) -> Result<SweepSummary, SweepError> {
        self.run_from(StartPoint::default()).await
    }

    /// Runs the plan from `start`. On a fatal error the failing point is
    /// recorded in the snapshot, the hardware is torn down best-effort and the
    /// error is returned.
    pub async fn run_from(&mut self, start: StartPoint) -> Result<SweepSummary, SweepError> {
        let points = self.plan.points_from(start)?;
        info!(points = points.len(), plan = %self.plan_hash, "sweep starting");
        let mut snapshot_path = None;
        for (position, setup) in &points {
            match self.run_point(*position, setup).await {
                Ok(path) => snapshot_path = Some(path),
                Err(err) => return Err(self.abort(*position, setup, err)),
            }
            if self.plan.closes_block(*position) {
                let report = render_key(
                    &self.context.store,
                    &setup.result_key(),
                    self.plan.interference_types(),
                );
                info!("\n{report}");
            }
        }
        let report = render(&self.context.store, self.plan.interference_types());
        let report_path = self.context.progress.write_text(REPORT_FILE, &report)?;
        let metrics_path = self.context.progress.log_dir().join(METRICS_FILE);
        write_metrics_csv(&self.context.store, &metrics_path)?;
        // Reports are already on disk if teardown fails.
        self.runner.teardown()?;
        info!(points = points.len(), "sweep finished");
        Ok(SweepSummary {
            points: points.len(),
            report,
            snapshot_path,
            report_path,
            metrics_path,
        })
    }

    async fn run_point(
        &mut self,
        position: SweepPosition,
        setup: &ExperimentSetup,
    ) -> Result<PathBuf, SweepError> {
        info!(
            position = %position.label(),
            driver = %setup.rdc_driver,
            channel = %setup.channel,
            interference_type = %setup.interference_type,
            repetition = setup.repetition,
            "running sweep point"
        );
        let store = &mut self.context.store;
        let mut sink = |role: DeviceRole, record: &SerialRecord| {
            debug!(%role, "record accepted");
            store.accumulate(record, setup);
        };
        let outcome = self.runner.run(setup, &mut sink).await?;
        let metrics = self.context.store.derive(setup)?;
        info!(
            prr = metrics.prr,
            arr = metrics.arr,
            average_rssi = metrics.average_rssi,
            discarded = outcome.discarded,
            "sweep point complete"
        );
        let progress = &self.context.progress;
        progress.write_artifact(&self.context.store, &position)?;
        progress.write_snapshot(
            &self.context.store,
            Some(setup),
            position,
            PointOutcome::Completed,
            None,
            &self.plan_hash,
        )
    }

    fn abort(
        &mut self,
        position: SweepPosition,
        setup: &ExperimentSetup,
        err: SweepError,
    ) -> SweepError {
        error!(position = %position.label(), error = %err, "sweep aborted");
        if let Err(write_err) = self.context.progress.write_snapshot(
            &self.context.store,
            Some(setup),
            position,
            PointOutcome::Failed,
            Some(&err),
            &self.plan_hash,
        ) {
            error!(error = %write_err, "failed to write progress snapshot");
        }
        if let Err(teardown_err) = self.runner.teardown() {
            warn!(error = %teardown_err, "teardown after failure incomplete");
        }
        err
    }
}
