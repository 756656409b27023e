//! Scripted in-memory links for demos and tests.

use std::collections::{BTreeMap, VecDeque};
use std::io::{self, ErrorKind, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use sweep_core::{ErrorInfo, SweepError};

use crate::manager::LinkOpener;

/// How long an exhausted script waits before reporting a read timeout.
const IDLE_POLL: Duration = Duration::from_millis(10);

/// One step of a scripted serial stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptStep {
    /// Emit a line; the newline is appended.
    Line(String),
    /// Stay silent for a while.
    Pause(Duration),
}

impl ScriptStep {
    /// Shorthand for [`ScriptStep::Line`].
    pub fn line(line: impl Into<String>) -> Self {
        ScriptStep::Line(line.into())
    }
}

/// Serves one queued script per `open` of a path. Once a script is exhausted
/// the stream stays open and silent, like an idle serial port.
#[derive(Debug, Clone, Default)]
pub struct MemoryOpener {
    scripts: Arc<Mutex<BTreeMap<String, VecDeque<Vec<ScriptStep>>>>>,
    live: Arc<AtomicUsize>,
    opened: Arc<AtomicUsize>,
}

impl MemoryOpener {
    /// Creates an opener with no scripts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a script for the next open of `path`.
    pub fn script(&self, path: &str, steps: impl IntoIterator<Item = ScriptStep>) {
        let mut scripts = match self.scripts.lock() {
            Ok(scripts) => scripts,
            Err(poisoned) => poisoned.into_inner(),
        };
        scripts
            .entry(path.to_string())
            .or_default()
            .push_back(steps.into_iter().collect());
    }

    /// Queues a script made of lines only.
    pub fn lines<I, S>(&self, path: &str, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.script(path, lines.into_iter().map(ScriptStep::line));
    }

    /// Streams opened and not yet dropped.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Streams opened so far.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::Acquire)
    }
}

impl LinkOpener for MemoryOpener {
    fn open(&self, path: &str) -> Result<Box<dyn Read + Send>, SweepError> {
        let steps = {
            let mut scripts = self.scripts.lock().map_err(|_| {
                SweepError::Link(ErrorInfo::new("memory_poisoned", "script table poisoned"))
            })?;
            scripts
                .get_mut(path)
                .and_then(VecDeque::pop_front)
                .unwrap_or_default()
        };
        self.opened.fetch_add(1, Ordering::AcqRel);
        self.live.fetch_add(1, Ordering::AcqRel);
        Ok(Box::new(ScriptedReader {
            steps: steps.into(),
            pending: VecDeque::new(),
            live: Arc::clone(&self.live),
        }))
    }
}

struct ScriptedReader {
    steps: VecDeque<ScriptStep>,
    pending: VecDeque<u8>,
    live: Arc<AtomicUsize>,
}

impl Read for ScriptedReader {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        while self.pending.is_empty() {
            match self.steps.pop_front() {
                Some(ScriptStep::Line(line)) => {
                    self.pending.extend(line.bytes());
                    self.pending.push_back(b'\n');
                }
                Some(ScriptStep::Pause(pause)) => thread::sleep(pause),
                None => {
                    thread::sleep(IDLE_POLL);
                    return Err(io::Error::new(ErrorKind::TimedOut, "no scripted data"));
                }
            }
        }
        let n = out.len().min(self.pending.len());
        for (slot, byte) in out.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Drop for ScriptedReader {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::AcqRel);
    }
}
