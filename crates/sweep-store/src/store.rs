use std::collections::BTreeMap;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use sweep_core::{ErrorInfo, ExperimentSetup, InterferenceType, ResultKey, SweepError};

use crate::record::SerialRecord;

/// Average RSSI reported when a run received nothing.
pub const NO_RECEPTION_RSSI: f64 = -1.0;

/// Receive-event fields holding the signal strength, in lookup order.
const SIGNAL_FIELDS: [&str; 2] = ["rssi", "signal"];

/// Keys owned by [`RunSummary`] itself; they never go to `extra`.
const SUMMARY_FIELDS: [&str; 7] = [
    "sent",
    "failed",
    "received",
    "prr",
    "arr",
    "average_rssi",
    "rejected",
];

/// Address of one run inside the [`ResultStore`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SlotKey {
    /// Firmware build the run belongs to.
    pub key: ResultKey,
    /// Interference active during the run.
    pub interference_type: InterferenceType,
    /// Repetition index of the run.
    pub repetition: u32,
}

impl SlotKey {
    /// Slot addressed by a sweep point.
    pub fn of(setup: &ExperimentSetup) -> Self {
        Self {
            key: setup.result_key(),
            interference_type: setup.interference_type,
            repetition: setup.repetition,
        }
    }
}

/// Terminal summary of a run plus the metrics derived from its events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Packets the sender attempted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent: Option<u64>,
    /// Packets the sender saw fail (no acknowledgement).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed: Option<u64>,
    /// Receive events observed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received: Option<u64>,
    /// Packet reception ratio.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prr: Option<f64>,
    /// Acknowledgement reception ratio.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arr: Option<f64>,
    /// Mean receive signal strength, or [`NO_RECEPTION_RSSI`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_rssi: Option<f64>,
    /// Summary fields whose value has the wrong type, kept verbatim.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub rejected: BTreeMap<String, Value>,
    /// Fields reported by the firmware that the store does not interpret.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl RunSummary {
    /// Merges `fields` into the summary; fields absent from `fields` keep their value.
    ///
    /// A typed field holding a value of the wrong type lands in `rejected`,
    /// never in `extra`, so the summary always deserializes again.
    pub fn merge<'a>(&mut self, fields: impl IntoIterator<Item = (&'a String, &'a Value)>) {
        for (name, value) in fields {
            let interpreted = match name.as_str() {
                "sent" => value.as_u64().map(|n| self.sent = Some(n)),
                "failed" => value.as_u64().map(|n| self.failed = Some(n)),
                "received" => value.as_u64().map(|n| self.received = Some(n)),
                "prr" => value.as_f64().map(|x| self.prr = Some(x)),
                "arr" => value.as_f64().map(|x| self.arr = Some(x)),
                "average_rssi" => value.as_f64().map(|x| self.average_rssi = Some(x)),
                _ => None,
            };
            if interpreted.is_some() {
                self.rejected.remove(name);
            } else if SUMMARY_FIELDS.contains(&name.as_str()) {
                self.rejected.insert(name.clone(), value.clone());
            } else {
                self.extra.insert(name.clone(), value.clone());
            }
        }
    }
}

/// Metrics derived from a finalized run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    /// Packets sent according to the summary.
    pub sent: u64,
    /// Packets received (receive events).
    pub received: u64,
    /// Packets acknowledged (`sent - failed`).
    pub acknowledged: u64,
    /// `received / sent`.
    pub prr: f64,
    /// `(sent - failed) / sent`.
    pub arr: f64,
    /// Mean signal strength over receive events.
    pub average_rssi: f64,
}

/// Events and summary collected for one (build, interference, repetition) run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    /// Repetition index of the run.
    pub repetition: u32,
    /// Receive events in arrival order.
    pub rx: Vec<Value>,
    /// Transmit events in arrival order.
    pub tx: Vec<Value>,
    /// Terminal summary, merged from summary records.
    pub result: RunSummary,
    /// Set once a terminal record has been merged.
    #[serde(default)]
    pub finalized: bool,
}

impl RunResult {
    fn empty(repetition: u32) -> Self {
        Self {
            repetition,
            ..Self::default()
        }
    }

    /// Computes the derived metrics; requires a finalized run with a sent count.
    pub fn metrics(&self) -> Result<RunMetrics, SweepError> {
        if !self.finalized {
            return Err(SweepError::Protocol(ErrorInfo::new(
                "run_not_finalized",
                "no terminal record has been observed for this run",
            )));
        }
        for field in ["sent", "failed"] {
            if let Some(value) = self.result.rejected.get(field) {
                return Err(SweepError::Protocol(
                    ErrorInfo::new(
                        "summary_field_invalid",
                        "summary count is not an unsigned integer",
                    )
                    .with_context("field", field)
                    .with_context("value", value.to_string()),
                ));
            }
        }
        let sent = self.result.sent.ok_or_else(|| {
            SweepError::Protocol(
                ErrorInfo::new("summary_missing_sent", "terminal record carries no sent count")
                    .with_hint("the sending mote must report {\"result\": {\"sent\": n, ...}}"),
            )
        })?;
        let failed = self.result.failed.unwrap_or(0).min(sent);
        let received = self.rx.len() as u64;
        let (prr, arr) = if sent == 0 {
            (0.0, 0.0)
        } else {
            (
                received as f64 / sent as f64,
                (sent - failed) as f64 / sent as f64,
            )
        };
        Ok(RunMetrics {
            sent,
            received,
            acknowledged: sent - failed,
            prr,
            arr,
            average_rssi: average_signal(&self.rx),
        })
    }
}

fn average_signal(rx: &[Value]) -> f64 {
    let signals: Vec<f64> = rx
        .iter()
        .filter_map(|event| {
            SIGNAL_FIELDS
                .iter()
                .find_map(|field| event.get(field).and_then(Value::as_f64))
        })
        .collect();
    if signals.is_empty() {
        NO_RECEPTION_RSSI
    } else {
        signals.iter().sum::<f64>() / signals.len() as f64
    }
}

/// Arena of runs indexed by [`SlotKey`].
///
/// Slots are created on first access and only ever merged into. Arena order is
/// arrival order, which the report relies on for repetitions.
#[derive(Debug, Clone, Default)]
pub struct ResultStore {
    slots: Vec<(SlotKey, RunResult)>,
    index: BTreeMap<SlotKey, usize>,
}

impl ResultStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of runs held.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when no run has been recorded.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Returns the run at `slot`, creating an empty one if absent.
    pub fn slot_mut(&mut self, slot: &SlotKey) -> &mut RunResult {
        let idx = match self.index.get(slot).copied() {
            Some(idx) => idx,
            None => {
                self.slots
                    .push((slot.clone(), RunResult::empty(slot.repetition)));
                let idx = self.slots.len() - 1;
                self.index.insert(slot.clone(), idx);
                idx
            }
        };
        &mut self.slots[idx].1
    }

    /// Returns the run at `slot` if it exists.
    pub fn get(&self, slot: &SlotKey) -> Option<&RunResult> {
        self.index.get(slot).map(|&idx| &self.slots[idx].1)
    }

    /// Folds one serial record into the run addressed by `setup`.
    pub fn accumulate(&mut self, record: &SerialRecord, setup: &ExperimentSetup) {
        let run = self.slot_mut(&SlotKey::of(setup));
        if record.is_summary() {
            for (name, value) in record.fields() {
                match (name.as_str(), value) {
                    ("result", Value::Object(fields)) => run.result.merge(fields),
                    _ => run.result.merge([(name, value)]),
                }
            }
            if record.is_terminal() {
                run.finalized = true;
            }
            return;
        }
        if let Some(tx) = record.tx() {
            run.tx.push(tx.clone());
        }
        if let Some(rx) = record.rx() {
            run.rx.push(rx.clone());
        }
        // An event record may also close the run.
        if let Some(Value::Object(fields)) = record.result() {
            run.result.merge(fields);
            run.finalized = true;
        }
    }

    /// Computes the metrics of the run addressed by `setup` and writes them
    /// back into its summary.
    pub fn derive(&mut self, setup: &ExperimentSetup) -> Result<RunMetrics, SweepError> {
        let slot = SlotKey::of(setup);
        let Some(idx) = self.index.get(&slot).copied() else {
            return Err(SweepError::Protocol(
                ErrorInfo::new("run_missing", "no records were stored for this run")
                    .with_context("key", slot.key.to_string())
                    .with_context("interference_type", slot.interference_type.to_string())
                    .with_context("repetition", slot.repetition.to_string()),
            ));
        };
        let run = &mut self.slots[idx].1;
        let metrics = run.metrics()?;
        run.result.received = Some(metrics.received);
        run.result.prr = Some(metrics.prr);
        run.result.arr = Some(metrics.arr);
        run.result.average_rssi = Some(metrics.average_rssi);
        Ok(metrics)
    }

    /// Drops the run at `slot` unless it has been finalized. Returns true when
    /// a slot was removed.
    pub fn discard_unfinalized(&mut self, slot: &SlotKey) -> bool {
        match self.index.get(slot).copied() {
            Some(idx) if !self.slots[idx].1.finalized => {
                self.slots.remove(idx);
                self.reindex();
                true
            }
            _ => false,
        }
    }

    /// Removes the run at `slot`, finalized or not.
    pub fn remove(&mut self, slot: &SlotKey) -> Option<RunResult> {
        let idx = self.index.get(slot).copied()?;
        let (_, run) = self.slots.remove(idx);
        self.reindex();
        Some(run)
    }

    /// Distinct result keys in first-seen order.
    pub fn keys(&self) -> Vec<&ResultKey> {
        let mut keys: Vec<&ResultKey> = Vec::new();
        for (slot, _) in &self.slots {
            if !keys.contains(&&slot.key) {
                keys.push(&slot.key);
            }
        }
        keys
    }

    /// Runs of one build and interference type in arrival order.
    pub fn runs(&self, key: &ResultKey, interference_type: InterferenceType) -> Vec<&RunResult> {
        self.slots
            .iter()
            .filter(|(slot, _)| &slot.key == key && slot.interference_type == interference_type)
            .map(|(_, run)| run)
            .collect()
    }

    /// Iterates over every slot in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = (&SlotKey, &RunResult)> {
        self.slots.iter().map(|(slot, run)| (slot, run))
    }

    fn reindex(&mut self) {
        self.index = self
            .slots
            .iter()
            .enumerate()
            .map(|(idx, (slot, _))| (slot.clone(), idx))
            .collect();
    }
}

/// Two stores are equal when they hold the same runs, whatever their arena order.
impl PartialEq for ResultStore {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|(slot, run)| other.get(slot) == Some(run))
    }
}

impl Serialize for ResultStore {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut nested: BTreeMap<&ResultKey, BTreeMap<InterferenceType, Vec<&RunResult>>> =
            BTreeMap::new();
        for (slot, run) in &self.slots {
            nested
                .entry(&slot.key)
                .or_default()
                .entry(slot.interference_type)
                .or_default()
                .push(run);
        }
        nested.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ResultStore {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let nested: BTreeMap<ResultKey, BTreeMap<InterferenceType, Vec<RunResult>>> =
            BTreeMap::deserialize(deserializer)?;
        let mut store = ResultStore::new();
        for (key, by_type) in nested {
            for (interference_type, runs) in by_type {
                for run in runs {
                    let slot = SlotKey {
                        key: key.clone(),
                        interference_type,
                        repetition: run.repetition,
                    };
                    if store.index.contains_key(&slot) {
                        return Err(D::Error::custom(format!(
                            "duplicate run {} / {} / {}",
                            slot.key, slot.interference_type, slot.repetition
                        )));
                    }
                    store.slots.push((slot.clone(), run));
                    store.index.insert(slot, store.slots.len() - 1);
                }
            }
        }
        Ok(store)
    }
}
