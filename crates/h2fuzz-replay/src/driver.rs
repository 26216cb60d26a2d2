//! Deterministic replay of a capture log against a live connection.
//!
//! [`ReplayDriver`] reads records front to back and issues exactly one
//! connection write per record, in log order. The connection it drives is
//! held in a driver-local slot with an explicit state machine:
//!
//! ```text
//!   Live ──(fault reported / write failed / timed out)──► Faulted(cause)
//!   Live ──(ResetFrame written)─────────────────────────► Faulted(Reset)
//!   Faulted(cause) ──(connector builds a fresh connection)──► Live
//! ```
//!
//! Network faults are repaired lazily, just before the next record is
//! dispatched. A `ResetFrame` is repaired eagerly, right after it is
//! written, so a reset at the end of a log still leaves a fresh
//! connection behind.

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Instant;

use h2fuzz_core::{Connection, ConnectionError, Connector};
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::codec::decode_record;
use crate::config::{MalformedPolicy, ReplayConfig};
use crate::error::ReplayError;
use crate::reader::{read_all, LogLines};
use crate::types::{FrameRecord, LogLine};

/// Issue the connection write matching `record`, passing its fields
/// through unchanged.
///
/// Used by both the replay driver and the capture decorator, so a
/// recorded frame and its replay go through the same call.
pub fn dispatch<C: Connection + ?Sized>(
    record: &FrameRecord,
    conn: &mut C,
) -> Result<(), ConnectionError> {
    match record {
        FrameRecord::RawFrame {
            frame_type,
            flags,
            stream_id,
            payload,
        } => conn.write_raw_frame(*frame_type, *flags, *stream_id, payload),
        FrameRecord::ResetFrame {
            stream_id,
            error_code,
        } => conn.write_reset_frame(*stream_id, *error_code),
        FrameRecord::WindowUpdateFrame { stream_id, incr } => {
            conn.write_window_update_frame(*stream_id, *incr)
        }
        FrameRecord::PriorityFrame {
            stream_id,
            stream_dep,
            weight,
            exclusive,
        } => conn.write_priority_frame(*stream_id, *stream_dep, *weight, *exclusive),
        FrameRecord::DataFrame {
            stream_id,
            end_stream,
            data,
        } => conn.write_data_frame(*stream_id, *end_stream, data),
        FrameRecord::PushPromiseFrame(promise) => conn.write_push_promise_frame(promise),
        FrameRecord::SettingsFrame { settings } => conn.write_settings_frame(settings),
        FrameRecord::Ping { data } => conn.send_ping(*data),
        FrameRecord::ContinuationFrame {
            stream_id,
            end_stream,
            data,
        } => conn.write_continuation_frame(*stream_id, *end_stream, data),
    }
}

// ── State machine ──────────────────────────────────────────────────

/// Why the current connection must be replaced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaultCause {
    /// The connection reported a fault through [`Connection::fault`].
    Reported,
    /// A write returned an error.
    WriteFailed,
    /// A write failed with, or took longer than, the I/O timeout.
    TimedOut,
    /// A `ResetFrame` was replayed on this stream.
    Reset {
        /// Stream the reset targeted.
        stream_id: u32,
    },
}

impl fmt::Display for FaultCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reported => f.write_str("fault reported"),
            Self::WriteFailed => f.write_str("write failed"),
            Self::TimedOut => f.write_str("timed out"),
            Self::Reset { stream_id } => write!(f, "reset of stream {stream_id}"),
        }
    }
}

/// State of the connection the driver currently holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Usable.
    Live,
    /// Must be rebuilt before the next write.
    Faulted(FaultCause),
}

impl ConnectionState {
    /// Whether the connection is usable.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Live)
    }
}

struct ConnectionSlot<C> {
    conn: C,
    state: ConnectionState,
}

// ── Outcome ────────────────────────────────────────────────────────

/// How a run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunStatus {
    /// Every record in the log was processed.
    Completed,
    /// The run stopped at a cancellation check.
    Cancelled {
        /// Last log line whose record was processed, 0 if none.
        line: u64,
    },
}

/// Counters for one run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Non-blank log lines taken from the log.
    pub lines_read: u64,
    /// Records written to a connection.
    pub dispatched: u64,
    /// Malformed records skipped under [`MalformedPolicy::Skip`].
    pub skipped: u64,
    /// Connections constructed to replace a faulted or reset one.
    pub reconnects: u64,
    /// `ResetFrame` records replayed.
    pub resets: u64,
}

/// Result of a run that did not fail.
#[derive(Debug)]
pub struct RunOutcome<C> {
    /// Completed or cancelled.
    pub status: RunStatus,
    /// Run counters.
    pub stats: ReplayStats,
    /// State of `connection` when the run ended.
    pub state: ConnectionState,
    /// The connection held when the run ended.
    pub connection: C,
}

enum Reconnected {
    Yes,
    Cancelled,
}

// ── ReplayDriver ───────────────────────────────────────────────────

/// Replays capture logs through connections built by `K`.
///
/// # Examples
///
/// ```
/// use h2fuzz_replay::{ReplayConfig, ReplayDriver, RunStatus};
/// use h2fuzz_test_utils::{Journal, MockConnector};
/// use h2fuzz_core::{ConnectionParams, Connector};
///
/// let journal = Journal::new();
/// let mut connector = MockConnector::new(journal.clone());
/// let initial = connector.connect(&ConnectionParams::new("localhost:8443")).unwrap();
/// let mut driver = ReplayDriver::new(connector, ReplayConfig::default()).unwrap();
///
/// let log = concat!(
///     r#"{"FrameMethod":"Ping","Data":[1,2,3,4,5,6,7,8]}"#, "\n",
///     r#"{"FrameMethod":"ResetFrame","StreamID":1,"ErrorCode":8}"#, "\n",
/// );
/// let lines = h2fuzz_replay::LogReader::new(log.as_bytes()).lines();
/// let outcome = driver.replay(initial, lines).unwrap();
///
/// assert_eq!(outcome.status, RunStatus::Completed);
/// assert_eq!(outcome.stats.dispatched, 2);
/// assert_eq!(outcome.stats.reconnects, 1);
/// assert_eq!(journal.connections().len(), 2);
/// ```
pub struct ReplayDriver<K> {
    connector: K,
    config: ReplayConfig,
    cancel: CancelToken,
}

impl<K: Connector> ReplayDriver<K> {
    /// Validate `config` and build a driver.
    pub fn new(connector: K, config: ReplayConfig) -> Result<Self, ReplayError> {
        config.validate()?;
        Ok(Self {
            connector,
            config,
            cancel: CancelToken::new(),
        })
    }

    /// Use `token` for cancellation instead of the driver's own.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// The token checked between records and during backoff.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// The run configuration.
    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    /// The connector used for reconstruction.
    pub fn connector(&self) -> &K {
        &self.connector
    }

    /// Replay the log at `path` starting on `initial`.
    pub fn replay_file(
        &mut self,
        initial: K::Conn,
        path: impl AsRef<Path>,
    ) -> Result<RunOutcome<K::Conn>, ReplayError> {
        let path = path.as_ref();
        info!(path = %path.display(), "replaying capture log");
        let lines: LogLines<BufReader<File>> = read_all(path)?;
        self.replay(initial, lines)
    }

    /// Replay `lines` in order starting on `initial`.
    ///
    /// Stops at the first read error, at the first malformed record
    /// unless [`MalformedPolicy::Skip`] is configured, or when the
    /// connection cannot be rebuilt within the reconnect policy.
    ///
    /// The configured `io_timeout` is only stamped onto connections the
    /// driver builds itself. Build `initial` from
    /// [`ReplayConfig::connection_params`] so its writes are bounded too;
    /// the driver measures each write but cannot interrupt one that never
    /// returns, and cancellation is only checked between records.
    pub fn replay<I>(
        &mut self,
        initial: K::Conn,
        lines: I,
    ) -> Result<RunOutcome<K::Conn>, ReplayError>
    where
        I: IntoIterator<Item = Result<LogLine, ReplayError>>,
    {
        let mut slot = ConnectionSlot {
            conn: initial,
            state: ConnectionState::Live,
        };
        let mut stats = ReplayStats::default();
        let mut last_line = 0;
        info!(host = %slot.conn.params().host, "replay started");
        if self.config.io_timeout.is_some() && slot.conn.params().io_timeout.is_none() {
            warn!(
                limit = ?self.config.io_timeout,
                "initial connection has no I/O bound, a stalled write will block the run"
            );
        }

        for item in lines {
            let line = item?;

            if self.cancel.is_cancelled() {
                return Ok(self.cancelled(slot, stats, last_line));
            }
            stats.lines_read += 1;

            if slot.state.is_live() {
                if let Some(fault) = slot.conn.fault() {
                    warn!(line = line.number, error = %fault, "connection reported a fault");
                    slot.state = ConnectionState::Faulted(FaultCause::Reported);
                }
            }
            if !slot.state.is_live() {
                match self.reconnect(&mut slot, line.number)? {
                    Reconnected::Yes => stats.reconnects += 1,
                    Reconnected::Cancelled => {
                        return Ok(self.cancelled(slot, stats, last_line));
                    }
                }
            }

            let record = match decode_record(line.number, &line.text) {
                Ok(record) => record,
                Err(e) => match self.config.on_malformed {
                    MalformedPolicy::Abort => return Err(e.into()),
                    MalformedPolicy::Skip => {
                        warn!(line = line.number, error = %e, "skipping malformed record");
                        stats.skipped += 1;
                        last_line = line.number;
                        continue;
                    }
                },
            };

            self.dispatch_one(&mut slot, &record, line.number);
            stats.dispatched += 1;
            last_line = line.number;

            if let FrameRecord::ResetFrame { stream_id, .. } = record {
                stats.resets += 1;
                slot.state = ConnectionState::Faulted(FaultCause::Reset { stream_id });
                match self.reconnect(&mut slot, line.number)? {
                    Reconnected::Yes => stats.reconnects += 1,
                    Reconnected::Cancelled => {
                        return Ok(self.cancelled(slot, stats, last_line));
                    }
                }
            }
        }

        info!(
            lines = stats.lines_read,
            dispatched = stats.dispatched,
            skipped = stats.skipped,
            reconnects = stats.reconnects,
            "replay finished"
        );
        Ok(RunOutcome {
            status: RunStatus::Completed,
            stats,
            state: slot.state,
            connection: slot.conn,
        })
    }

    fn dispatch_one(&self, slot: &mut ConnectionSlot<K::Conn>, record: &FrameRecord, line: u64) {
        let method = record.method();
        let started = Instant::now();
        let result = dispatch(record, &mut slot.conn);
        let elapsed = started.elapsed();
        debug!(line, %method, stream_id = ?record.stream_id(), ?elapsed, "dispatched record");

        match result {
            Err(e) => {
                let cause = if e.is_timeout() {
                    FaultCause::TimedOut
                } else {
                    FaultCause::WriteFailed
                };
                warn!(line, %method, error = %e, %cause, "connection write failed");
                slot.state = ConnectionState::Faulted(cause);
            }
            Ok(()) => {
                if let Some(limit) = self.config.io_timeout.filter(|t| elapsed > *t) {
                    warn!(line, %method, ?elapsed, ?limit, "connection write exceeded timeout");
                    slot.state = ConnectionState::Faulted(FaultCause::TimedOut);
                }
            }
        }
    }

    /// Replace the faulted connection in `slot`, retrying per the
    /// reconnect policy. `line` attributes a final failure.
    fn reconnect(
        &mut self,
        slot: &mut ConnectionSlot<K::Conn>,
        line: u64,
    ) -> Result<Reconnected, ReplayError> {
        let cause = match slot.state {
            ConnectionState::Faulted(cause) => cause,
            ConnectionState::Live => return Ok(Reconnected::Yes),
        };
        let params = self.config.connection_params(slot.conn.params());

        let policy = &self.config.reconnect;
        let mut attempt = 0;
        loop {
            attempt += 1;
            warn!(line, attempt, %cause, host = %params.host, "reconnecting");
            match self.connector.connect(&params) {
                Ok(conn) => {
                    slot.conn = conn;
                    slot.state = ConnectionState::Live;
                    return Ok(Reconnected::Yes);
                }
                Err(source) if attempt >= policy.max_attempts => {
                    return Err(ReplayError::Reconnect {
                        line,
                        attempts: attempt,
                        source,
                    });
                }
                Err(e) => {
                    let backoff = policy.backoff_for(attempt - 1);
                    warn!(line, attempt, error = %e, ?backoff, "connect failed");
                    if self.cancel.sleep(backoff) {
                        return Ok(Reconnected::Cancelled);
                    }
                }
            }
        }
    }

    fn cancelled(
        &self,
        slot: ConnectionSlot<K::Conn>,
        stats: ReplayStats,
        line: u64,
    ) -> RunOutcome<K::Conn> {
        info!(line, dispatched = stats.dispatched, "replay cancelled");
        RunOutcome {
            status: RunStatus::Cancelled { line },
            stats,
            state: slot.state,
            connection: slot.conn,
        }
    }
}
