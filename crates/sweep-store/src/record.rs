use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use sweep_core::{ErrorInfo, SweepError};

/// One JSON object emitted by a mote on its serial line.
///
/// Recognised shapes are `{"tx": {...}}`, `{"rx": {...}}` and the terminal
/// `{"result": {"sent": n, "failed": n, ...}}`. Any other object is kept as is
/// and treated as summary material by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SerialRecord(Map<String, Value>);

impl SerialRecord {
    /// Parses a single serial line.
    pub fn parse(line: &str) -> Result<Self, SweepError> {
        let trimmed = line.trim();
        match serde_json::from_str::<Value>(trimmed) {
            Ok(Value::Object(map)) => Ok(Self(map)),
            Ok(other) => Err(SweepError::RecordParse(
                ErrorInfo::new("record_not_object", "serial line is not a JSON object")
                    .with_context("kind", json_kind(&other)),
            )),
            Err(err) => Err(SweepError::RecordParse(
                ErrorInfo::new("record_json", err.to_string()).with_context("line", trimmed),
            )),
        }
    }

    /// Wraps an already decoded object.
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Transmit event payload, if present.
    pub fn tx(&self) -> Option<&Value> {
        self.0.get("tx")
    }

    /// Receive event payload, if present.
    pub fn rx(&self) -> Option<&Value> {
        self.0.get("rx")
    }

    /// Terminal summary payload, if present.
    pub fn result(&self) -> Option<&Value> {
        self.0.get("result")
    }

    /// True when the record ends a run.
    pub fn is_terminal(&self) -> bool {
        self.result().is_some()
    }

    /// True when the record carries neither a transmit nor a receive event.
    pub fn is_summary(&self) -> bool {
        self.tx().is_none() && self.rx().is_none()
    }

    /// Borrows the underlying object.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
