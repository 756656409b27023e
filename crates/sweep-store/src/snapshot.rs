use std::fs;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use sweep_core::{
    from_json_slice, to_canonical_json_bytes, ErrorInfo, ExperimentSetup, SweepError,
    SweepPosition,
};

use crate::store::ResultStore;

fn io_error(code: &str, path: &Path, err: impl ToString) -> SweepError {
    SweepError::Persistence(
        ErrorInfo::new(code, err.to_string()).with_context("path", path.display().to_string()),
    )
}

/// Whether the recorded sweep point finished or aborted the sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PointOutcome {
    /// The point completed and its results are in the store.
    Completed,
    /// The point failed; the sweep stopped there.
    Failed,
}

/// Durable record sufficient to rebuild the next sweep point and every prior result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Every run collected so far.
    pub results: ResultStore,
    /// Last setup attempted, absent if the sweep never dispatched a point.
    pub setup: Option<ExperimentSetup>,
    /// Sweep indices of `setup`.
    pub position: SweepPosition,
    /// Outcome of the point at `position`.
    pub outcome: PointOutcome,
    /// Fatal error that stopped the sweep, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<SweepError>,
    /// Hash of the sweep plan that produced the snapshot.
    pub plan_hash: String,
    /// RFC 3339 time the snapshot was written.
    pub saved_at: String,
}

/// Borrowed form of [`ProgressSnapshot`] used when writing.
#[derive(Debug, Serialize)]
pub struct SnapshotRef<'a> {
    /// Every run collected so far.
    pub results: &'a ResultStore,
    /// Last setup attempted.
    pub setup: Option<&'a ExperimentSetup>,
    /// Sweep indices of `setup`.
    pub position: SweepPosition,
    /// Outcome of the point at `position`.
    pub outcome: PointOutcome,
    /// Fatal error that stopped the sweep, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'a SweepError>,
    /// Hash of the sweep plan.
    pub plan_hash: &'a str,
    /// RFC 3339 time the snapshot was written.
    pub saved_at: String,
}

impl ProgressSnapshot {
    /// Restores a snapshot from disk.
    pub fn load(path: &Path) -> Result<Self, SweepError> {
        let bytes = fs::read(path).map_err(|err| io_error("snapshot_read", path, err))?;
        from_json_slice(&bytes).map_err(|err| match err {
            SweepError::Persistence(info) => SweepError::Persistence(
                info.with_context("path", path.display().to_string()),
            ),
            other => other,
        })
    }
}

/// Writes progress snapshots, per-point artifacts and reports under the
/// communication program's directory.
#[derive(Debug, Clone)]
pub struct ProgressWriter {
    root: PathBuf,
}

impl ProgressWriter {
    /// Creates a writer rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Location of the progress snapshot.
    pub fn snapshot_path(&self) -> PathBuf {
        self.root.join("data.json")
    }

    /// Location of the artifact written after the point at `position`.
    pub fn artifact_path(&self, position: &SweepPosition) -> PathBuf {
        self.log_dir().join(format!("data-{}.json", position.label()))
    }

    /// Directory holding artifacts and reports.
    pub fn log_dir(&self) -> PathBuf {
        self.root.join("log")
    }

    /// Replaces the snapshot on disk. The previous snapshot survives until the
    /// new one is complete.
    pub fn write_snapshot(
        &self,
        results: &ResultStore,
        setup: Option<&ExperimentSetup>,
        position: SweepPosition,
        outcome: PointOutcome,
        error: Option<&SweepError>,
        plan_hash: &str,
    ) -> Result<PathBuf, SweepError> {
        let snapshot = SnapshotRef {
            results,
            setup,
            position,
            outcome,
            error,
            plan_hash,
            saved_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        };
        let path = self.snapshot_path();
        write_atomic(&path, &to_canonical_json_bytes(&snapshot)?)?;
        Ok(path)
    }

    /// Dumps the whole store after the point at `position`.
    pub fn write_artifact(
        &self,
        results: &ResultStore,
        position: &SweepPosition,
    ) -> Result<PathBuf, SweepError> {
        let path = self.artifact_path(position);
        write_atomic(&path, &to_canonical_json_bytes(results)?)?;
        Ok(path)
    }

    /// Writes a text file into the log directory.
    pub fn write_text(&self, name: &str, contents: &str) -> Result<PathBuf, SweepError> {
        let path = self.log_dir().join(name);
        write_atomic(&path, contents.as_bytes())?;
        Ok(path)
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), SweepError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| io_error("snapshot_mkdir", parent, err))?;
    }
    let mut tmp_name = path.file_name().map(|name| name.to_os_string()).unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);
    fs::write(&tmp, bytes).map_err(|err| io_error("snapshot_write", &tmp, err))?;
    fs::rename(&tmp, path).map_err(|err| io_error("snapshot_rename", path, err))
}
