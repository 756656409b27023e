//! One serial connection per mote role, each pumped by a reader thread.

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use sweep_core::{DeviceRole, ErrorInfo, SweepError};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

/// Lines buffered per role before the reader thread waits for the consumer.
pub const DEFAULT_LINE_CAPACITY: usize = 256;

/// Longest line forwarded; longer lines are dropped up to their newline.
pub const MAX_LINE_BYTES: usize = 4096;

/// Back-off while the line channel is full.
const FULL_BACKOFF: Duration = Duration::from_millis(5);

/// Opens the byte stream behind a device path.
pub trait LinkOpener: Send + Sync {
    /// Opens `path`. Reads should time out periodically so the reader can
    /// notice that it has been closed.
    fn open(&self, path: &str) -> Result<Box<dyn Read + Send>, SweepError>;
}

/// Opens real serial ports.
#[derive(Debug, Clone)]
pub struct SerialOpener {
    baud_rate: u32,
    read_timeout: Duration,
}

impl SerialOpener {
    /// Ports are opened at `baud_rate` with reads timing out after `read_timeout`.
    pub fn new(baud_rate: u32, read_timeout: Duration) -> Self {
        Self {
            baud_rate,
            read_timeout,
        }
    }
}

impl LinkOpener for SerialOpener {
    fn open(&self, path: &str) -> Result<Box<dyn Read + Send>, SweepError> {
        let port = serialport::new(path, self.baud_rate)
            .timeout(self.read_timeout)
            .flow_control(serialport::FlowControl::None)
            .open()
            .map_err(|err| {
                SweepError::Link(
                    ErrorInfo::new("serial_open", err.to_string())
                        .with_context("path", path)
                        .with_context("baud_rate", self.baud_rate.to_string()),
                )
            })?;
        Ok(Box::new(port))
    }
}

struct Connection {
    path: String,
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Owns the serial connections of the motes.
///
/// At most one connection exists per role: connecting a role that is already
/// connected closes and joins the previous reader first.
pub struct SerialChannelManager {
    opener: Arc<dyn LinkOpener>,
    paths: BTreeMap<DeviceRole, String>,
    line_capacity: usize,
    connections: BTreeMap<DeviceRole, Connection>,
}

impl SerialChannelManager {
    /// `paths` maps each role to its device path.
    pub fn new(opener: Arc<dyn LinkOpener>, paths: BTreeMap<DeviceRole, String>) -> Self {
        Self {
            opener,
            paths,
            line_capacity: DEFAULT_LINE_CAPACITY,
            connections: BTreeMap::new(),
        }
    }

    /// Overrides the per-role line buffer.
    pub fn with_line_capacity(mut self, line_capacity: usize) -> Self {
        self.line_capacity = line_capacity.max(1);
        self
    }

    /// True while a reader for `role` is registered.
    pub fn is_connected(&self, role: DeviceRole) -> bool {
        self.connections.contains_key(&role)
    }

    /// Opens the line stream of `role`.
    pub fn connect(&mut self, role: DeviceRole) -> Result<mpsc::Receiver<String>, SweepError> {
        self.close(role);
        let path = self.paths.get(&role).cloned().ok_or_else(|| {
            SweepError::Link(
                ErrorInfo::new("link_role", "no device path configured for role")
                    .with_context("role", role.to_string()),
            )
        })?;
        let reader = self.opener.open(&path)?;
        let (tx, rx) = mpsc::channel(self.line_capacity);
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let thread_path = path.clone();
        let handle = thread::Builder::new()
            .name(format!("serial-{role}"))
            .spawn(move || pump_lines(reader, tx, thread_stop, role, thread_path))
            .map_err(|err| {
                SweepError::Link(
                    ErrorInfo::new("reader_spawn", err.to_string()).with_context("path", &path),
                )
            })?;
        debug!(%role, %path, "serial connection opened");
        self.connections.insert(role, Connection { path, stop, handle });
        Ok(rx)
    }

    /// Closes the connection of `role`, waiting for its reader to exit.
    /// Returns false when the role was not connected.
    pub fn close(&mut self, role: DeviceRole) -> bool {
        let Some(connection) = self.connections.remove(&role) else {
            return false;
        };
        connection.stop.store(true, Ordering::Release);
        if join_reader(connection.handle).is_err() {
            warn!(%role, path = %connection.path, "serial reader panicked");
        }
        debug!(%role, path = %connection.path, "serial connection closed");
        true
    }

    /// Closes every connection.
    pub fn close_all(&mut self) {
        let roles: Vec<DeviceRole> = self.connections.keys().copied().collect();
        for role in roles {
            self.close(role);
        }
    }
}

impl Drop for SerialChannelManager {
    fn drop(&mut self) {
        self.close_all();
    }
}

/// Waits for a reader thread. On a multi-threaded runtime the worker hands its
/// tasks to another thread while it waits.
fn join_reader(handle: JoinHandle<()>) -> thread::Result<()> {
    match Handle::try_current() {
        Ok(runtime) if runtime.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(|| handle.join())
        }
        _ => handle.join(),
    }
}

fn pump_lines(
    reader: Box<dyn Read + Send>,
    tx: mpsc::Sender<String>,
    stop: Arc<AtomicBool>,
    role: DeviceRole,
    path: String,
) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    // Set while the tail of an overlong line is being skipped.
    let mut skipping = false;
    while !stop.load(Ordering::Acquire) {
        // `buf` never holds more than MAX_LINE_BYTES here, so the limit is at least 1.
        let limit = (MAX_LINE_BYTES + 1 - buf.len()) as u64;
        match reader.by_ref().take(limit).read_until(b'\n', &mut buf) {
            Ok(0) => {
                if !buf.is_empty() && !skipping {
                    forward(&tx, &stop, take_line(&mut buf));
                }
                debug!(%role, %path, "serial stream ended");
                return;
            }
            Ok(_) => {
                if buf.last() != Some(&b'\n') {
                    if buf.len() > MAX_LINE_BYTES {
                        if !skipping {
                            warn!(
                                %role,
                                %path,
                                limit = MAX_LINE_BYTES,
                                "serial line too long, dropped"
                            );
                        }
                        skipping = true;
                        buf.clear();
                    }
                    continue;
                }
                if skipping {
                    skipping = false;
                    buf.clear();
                    continue;
                }
                if !forward(&tx, &stop, take_line(&mut buf)) {
                    return;
                }
            }
            // Partial bytes stay in `buf` until the rest of the line arrives.
            Err(err)
                if matches!(
                    err.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) => {}
            Err(err) => {
                warn!(%role, %path, error = %err, "serial read failed");
                return;
            }
        }
    }
}

fn take_line(buf: &mut Vec<u8>) -> String {
    let line = String::from_utf8_lossy(buf)
        .trim_end_matches(['\r', '\n'])
        .to_string();
    buf.clear();
    line
}

/// Hands `line` to the consumer. Returns false once the consumer is gone or
/// the connection is closing.
fn forward(tx: &mpsc::Sender<String>, stop: &AtomicBool, mut line: String) -> bool {
    loop {
        match tx.try_send(line) {
            Ok(()) => return true,
            Err(TrySendError::Closed(_)) => return false,
            Err(TrySendError::Full(pending)) => {
                if stop.load(Ordering::Acquire) {
                    return false;
                }
                line = pending;
                thread::sleep(FULL_BACKOFF);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_line_strips_line_endings() {
        let mut buf = b"{\"tx\":{}}\r\n".to_vec();
        assert_eq!(take_line(&mut buf), "{\"tx\":{}}");
        assert!(buf.is_empty());
    }
}
