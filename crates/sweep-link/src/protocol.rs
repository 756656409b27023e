//! Watchdog-timed result protocol over the receiving and sending streams.
//!
//! The sending mote reports transmit events and finally a summary carrying a
//! `result` field; the receiving mote reports receive events. Every valid
//! sending-side record rearms the watchdog. The first terminal record moves the
//! coordinator into its quiescence window, during which both streams keep
//! draining into the sink, and the invocation then resolves with that record.

use std::fmt::{self, Display};
use std::time::Duration;

use sweep_core::{DeviceRole, ErrorInfo, SweepError};
use sweep_store::SerialRecord;
use tokio::sync::mpsc::Receiver;
use tokio::time::{self, Instant};
use tracing::debug;

/// Timers of one protocol invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolTiming {
    /// Longest silence tolerated from the sending mote before the terminal record.
    pub watchdog: Duration,
    /// Delay between the terminal record and resolution.
    pub quiescence: Duration,
}

impl Default for ProtocolTiming {
    fn default() -> Self {
        Self {
            watchdog: Duration::from_secs(10),
            quiescence: Duration::from_secs(5),
        }
    }
}

/// Coordinator state, reported in logs and in the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolState {
    /// Streams not yet attached.
    Idle,
    /// Waiting for the terminal record.
    Listening,
    /// Terminal record seen; draining until quiescence elapses.
    Completing,
    /// Resolved with the terminal record.
    Resolved,
    /// Watchdog expired.
    TimedOut,
}

impl Display for ProtocolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProtocolState::Idle => "idle",
            ProtocolState::Listening => "listening",
            ProtocolState::Completing => "completing",
            ProtocolState::Resolved => "resolved",
            ProtocolState::TimedOut => "timed-out",
        };
        f.write_str(name)
    }
}

/// Receives every valid record in arrival order.
pub trait RecordSink {
    /// Accepts one record read from `role`.
    fn accept(&mut self, role: DeviceRole, record: &SerialRecord);
}

impl<F> RecordSink for F
where
    F: FnMut(DeviceRole, &SerialRecord),
{
    fn accept(&mut self, role: DeviceRole, record: &SerialRecord) {
        self(role, record)
    }
}

/// Successful result of [`await_result`].
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolOutcome {
    /// The first terminal record from the sending mote.
    pub terminal: SerialRecord,
    /// Valid records handed to the sink, both roles.
    pub accepted: usize,
    /// Lines that could not be decoded.
    pub discarded: usize,
    /// Final state, always [`ProtocolState::Resolved`].
    pub state: ProtocolState,
}

struct Tally {
    accepted: usize,
    discarded: usize,
}

impl Tally {
    fn decode(&mut self, role: DeviceRole, line: &str) -> Option<SerialRecord> {
        match SerialRecord::parse(line) {
            Ok(record) => {
                self.accepted += 1;
                Some(record)
            }
            Err(err) => {
                self.discarded += 1;
                debug!(%role, %line, error = %err, "ignoring undecodable serial line");
                None
            }
        }
    }
}

/// Runs one protocol invocation over the two streams.
///
/// Resolves exactly once: with the first terminal record after the quiescence
/// delay, or with [`SweepError::ProtocolTimeout`] when the watchdog expires
/// first. The streams are dropped on return.
pub async fn await_result<S>(
    mut receiving: Receiver<String>,
    mut sending: Receiver<String>,
    timing: &ProtocolTiming,
    sink: &mut S,
) -> Result<ProtocolOutcome, SweepError>
where
    S: RecordSink + ?Sized,
{
    let mut state = ProtocolState::Idle;
    let mut tally = Tally {
        accepted: 0,
        discarded: 0,
    };
    let mut terminal: Option<SerialRecord> = None;
    let mut receiving_open = true;
    let mut sending_open = true;

    let watchdog = time::sleep(timing.watchdog);
    tokio::pin!(watchdog);
    let quiescence = time::sleep(timing.quiescence);
    tokio::pin!(quiescence);

    transition(&mut state, ProtocolState::Listening);
    loop {
        tokio::select! {
            line = receiving.recv(), if receiving_open => match line {
                Some(line) => {
                    if let Some(record) = tally.decode(DeviceRole::Receiving, &line) {
                        sink.accept(DeviceRole::Receiving, &record);
                    }
                }
                None => {
                    receiving_open = false;
                    debug!("receiving stream closed");
                }
            },
            line = sending.recv(), if sending_open => match line {
                Some(line) => {
                    let Some(record) = tally.decode(DeviceRole::Sending, &line) else {
                        continue;
                    };
                    sink.accept(DeviceRole::Sending, &record);
                    if terminal.is_none() {
                        watchdog.as_mut().reset(Instant::now() + timing.watchdog);
                        if record.is_terminal() {
                            terminal = Some(record);
                            quiescence.as_mut().reset(Instant::now() + timing.quiescence);
                            transition(&mut state, ProtocolState::Completing);
                        }
                    }
                }
                None => {
                    sending_open = false;
                    debug!("sending stream closed");
                }
            },
            () = &mut watchdog, if terminal.is_none() => {
                transition(&mut state, ProtocolState::TimedOut);
                return Err(SweepError::ProtocolTimeout(
                    ErrorInfo::new("watchdog_expired", "no terminal record from the sending mote")
                        .with_context("watchdog_ms", timing.watchdog.as_millis().to_string())
                        .with_context("accepted", tally.accepted.to_string())
                        .with_context("discarded", tally.discarded.to_string()),
                ));
            },
            () = &mut quiescence, if terminal.is_some() => {
                transition(&mut state, ProtocolState::Resolved);
                if let Some(terminal) = terminal.take() {
                    return Ok(ProtocolOutcome {
                        terminal,
                        accepted: tally.accepted,
                        discarded: tally.discarded,
                        state,
                    });
                }
            },
        }
    }
}

fn transition(state: &mut ProtocolState, next: ProtocolState) {
    debug!(from = %state, to = %next, "protocol state change");
    *state = next;
}
