//! Capture log writer.
//!
//! [`ReplayLog`] appends one encoded record per line. Each append is a
//! single write followed by a sync to stable storage, both under the
//! log's lock, so concurrent writers never interleave and a record is
//! durable before `append` returns. Nothing is buffered in memory: a
//! log dropped on any exit path has already persisted every record it
//! accepted. A failed append is cut back to the previous record
//! boundary; if that cut fails too, the log refuses further appends.

use std::fs::{self, File};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, TimeZone};
use tracing::{debug, error, info, warn};

use crate::codec::encode_record;
use crate::error::ReplayError;
use crate::types::FrameRecord;
use crate::LOG_FILE_SUFFIX;

/// A byte sink that can be forced to stable storage and cut back to an
/// earlier length.
pub trait LogSink: Write {
    /// Flush and force written bytes to stable storage.
    fn sync(&mut self) -> io::Result<()>;

    /// Current write position, in bytes from the start.
    fn position(&mut self) -> io::Result<u64>;

    /// Drop everything at or past `len` and move the write position there.
    fn rewind_to(&mut self, len: u64) -> io::Result<()>;

    /// Discard all content and rewind the write position.
    fn reset(&mut self) -> io::Result<()> {
        self.rewind_to(0)?;
        self.sync()
    }
}

impl LogSink for File {
    fn sync(&mut self) -> io::Result<()> {
        self.flush()?;
        self.sync_data()
    }

    fn position(&mut self) -> io::Result<u64> {
        self.stream_position()
    }

    fn rewind_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)?;
        self.seek(SeekFrom::Start(len))?;
        Ok(())
    }
}

impl LogSink for Vec<u8> {
    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn position(&mut self) -> io::Result<u64> {
        Ok(self.len() as u64)
    }

    fn rewind_to(&mut self, len: u64) -> io::Result<()> {
        let len = usize::try_from(len).map_err(io::Error::other)?;
        self.truncate(len);
        Ok(())
    }
}

/// File name for a capture started at `started_at`:
/// `<RFC3339 timestamp>_replay.json`.
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use h2fuzz_replay::writer::capture_file_name;
///
/// let t = Utc.with_ymd_and_hms(2015, 6, 1, 12, 30, 0).unwrap();
/// assert_eq!(capture_file_name(&t), "2015-06-01T12:30:00Z_replay.json");
/// ```
pub fn capture_file_name<Tz>(started_at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!(
        "{}{LOG_FILE_SUFFIX}",
        started_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}

struct LogState<S> {
    sink: S,
    records_written: u64,
    /// Set when a failed append left bytes that could not be cut back.
    failed: bool,
}

fn write_line<S: LogSink>(sink: &mut S, line: &[u8]) -> io::Result<()> {
    sink.write_all(line)?;
    sink.sync()
}

/// Append-only, line-oriented log of captured frame records.
///
/// Generic over `S: LogSink` so tests can use `Vec<u8>` and production
/// code uses `File`. Share it between capture sites with `Arc`; all
/// methods take `&self`.
///
/// # Examples
///
/// ```
/// use h2fuzz_replay::{FrameRecord, LogReader, ReplayLog};
///
/// let log = ReplayLog::new(Vec::new());
/// log.record(&FrameRecord::Ping { data: [1, 2, 3, 4, 5, 6, 7, 8] }).unwrap();
/// log.record(&FrameRecord::ResetFrame { stream_id: 1, error_code: 8 }).unwrap();
/// assert_eq!(log.records_written(), 2);
///
/// let bytes = log.close().unwrap();
/// let lines: Vec<_> = LogReader::new(bytes.as_slice())
///     .lines()
///     .collect::<Result<_, _>>()
///     .unwrap();
/// assert_eq!(lines.len(), 2);
/// assert_eq!(lines[1].text, r#"{"FrameMethod":"ResetFrame","StreamID":1,"ErrorCode":8}"#);
/// ```
pub struct ReplayLog<S = File> {
    state: Mutex<LogState<S>>,
    path: Option<PathBuf>,
}

// Compile-time assertion: a file-backed log can be shared across threads.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<ReplayLog<File>>();
};

impl ReplayLog<File> {
    /// Create (or truncate) the log file at `path`, creating missing
    /// parent directories.
    pub fn open_for_capture(path: impl AsRef<Path>) -> Result<Self, ReplayError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        info!(path = %path.display(), "replay log opened for capture");
        Ok(Self {
            state: Mutex::new(LogState {
                sink: file,
                records_written: 0,
                failed: false,
            }),
            path: Some(path.to_path_buf()),
        })
    }

    /// Open `<dir>/<RFC3339 started_at>_replay.json` for capture.
    ///
    /// The conventional `dir` is [`LOG_DIR`](crate::LOG_DIR).
    pub fn create_timestamped<Tz>(
        dir: impl AsRef<Path>,
        started_at: &DateTime<Tz>,
    ) -> Result<Self, ReplayError>
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        Self::open_for_capture(dir.as_ref().join(capture_file_name(started_at)))
    }
}

impl<S: LogSink> ReplayLog<S> {
    /// Wrap an arbitrary sink.
    pub fn new(sink: S) -> Self {
        Self {
            state: Mutex::new(LogState {
                sink,
                records_written: 0,
                failed: false,
            }),
            path: None,
        }
    }

    /// Append one record line and force it to stable storage.
    ///
    /// `record_text` must be a single non-empty line. A write or sync
    /// failure is returned as [`ReplayError::Io`]; the run should stop,
    /// since replay depends on every emitted frame being recorded.
    ///
    /// On failure the sink is cut back to where this record began, so no
    /// partial line is left for a later append to run into. If that cut
    /// fails as well, this and every later append return
    /// [`ReplayError::LogFailed`] until the log is truncated.
    pub fn append(&self, record_text: &str) -> Result<(), ReplayError> {
        if record_text.contains(['\n', '\r']) {
            return Err(ReplayError::InvalidRecord {
                detail: "record text contains a line break".to_string(),
            });
        }
        if record_text.trim().is_empty() {
            return Err(ReplayError::InvalidRecord {
                detail: "record text is empty".to_string(),
            });
        }

        let mut line = Vec::with_capacity(record_text.len() + 1);
        line.extend_from_slice(record_text.as_bytes());
        line.push(b'\n');

        let mut state = self.lock()?;
        if state.failed {
            return Err(ReplayError::LogFailed);
        }
        let start = state.sink.position()?;
        if let Err(err) = write_line(&mut state.sink, &line) {
            match state.sink.rewind_to(start) {
                Ok(()) => warn!(error = %err, start, "replay append failed, record discarded"),
                Err(rewind) => {
                    state.failed = true;
                    error!(error = %err, %rewind, start, "replay append failed, log left unusable");
                    return Err(ReplayError::LogFailed);
                }
            }
            return Err(err.into());
        }
        state.records_written += 1;
        debug!(
            record = state.records_written,
            bytes = line.len(),
            "appended replay record"
        );
        Ok(())
    }

    /// Encode `record` and [`append`](Self::append) it.
    pub fn record(&self, record: &FrameRecord) -> Result<(), ReplayError> {
        self.append(&encode_record(record))
    }

    /// Discard every record and rewind, leaving an empty log.
    ///
    /// Also clears the failed state left by an unrecoverable append.
    pub fn truncate(&self) -> Result<(), ReplayError> {
        let mut state = self.lock()?;
        state.sink.reset()?;
        state.failed = false;
        let discarded = std::mem::take(&mut state.records_written);
        info!(discarded, "replay log truncated");
        Ok(())
    }

    /// Number of records appended since creation or the last truncate.
    pub fn records_written(&self) -> u64 {
        match self.state.lock() {
            Ok(state) => state.records_written,
            Err(poisoned) => poisoned.into_inner().records_written,
        }
    }

    /// Path of the backing file, if the log was opened from one.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Sync and release the log, returning the sink.
    pub fn close(self) -> Result<S, ReplayError> {
        let mut state = self
            .state
            .into_inner()
            .map_err(|_| ReplayError::LogPoisoned)?;
        state.sink.sync()?;
        info!(
            records = state.records_written,
            path = ?self.path,
            "replay log closed"
        );
        Ok(state.sink)
    }

    fn lock(&self) -> Result<MutexGuard<'_, LogState<S>>, ReplayError> {
        self.state.lock().map_err(|_| ReplayError::LogPoisoned)
    }
}
