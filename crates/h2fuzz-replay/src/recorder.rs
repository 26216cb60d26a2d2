//! Capture side: a connection decorator that logs every frame it sends.
//!
//! Each write is appended to the shared [`ReplayLog`] before it reaches
//! the connection, so the frame that kills a connection is still on disk.

use std::fs::File;
use std::sync::Arc;

use h2fuzz_core::{Connection, ConnectionError, ConnectionParams, PingPayload, PushPromise, Setting};
use thiserror::Error;

use crate::driver::dispatch;
use crate::error::ReplayError;
use crate::types::FrameRecord;
use crate::writer::{LogSink, ReplayLog};

/// Failure of a captured write.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The record could not be logged; the frame was not sent.
    #[error("capture log: {0}")]
    Log(#[from] ReplayError),
    /// The record was logged but the connection write failed.
    #[error("connection: {0}")]
    Connection(#[from] ConnectionError),
}

impl CaptureError {
    /// Whether the run must stop. Connection failures are expected
    /// while fuzzing and are repaired by reconnecting; a log failure
    /// means the capture is no longer replayable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Log(_))
    }
}

/// Wraps a connection so every frame written through it is captured.
///
/// Several decorators (one per connection) may share one log.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use h2fuzz_core::{ConnectionParams, Connector};
/// use h2fuzz_replay::{RecordingConnection, ReplayLog};
/// use h2fuzz_test_utils::{Journal, MockConnector};
///
/// let log = Arc::new(ReplayLog::new(Vec::new()));
/// let mut connector = MockConnector::new(Journal::new());
/// let conn = connector.connect(&ConnectionParams::new("localhost:8443")).unwrap();
///
/// let mut recording = RecordingConnection::new(conn, Arc::clone(&log));
/// recording.send_ping([0; 8]).unwrap();
/// recording.write_reset_frame(1, 8).unwrap();
/// assert_eq!(log.records_written(), 2);
/// ```
pub struct RecordingConnection<C, S = File> {
    inner: C,
    log: Arc<ReplayLog<S>>,
}

impl<C: Connection, S: LogSink> RecordingConnection<C, S> {
    /// Capture writes on `inner` into `log`.
    pub fn new(inner: C, log: Arc<ReplayLog<S>>) -> Self {
        Self { inner, log }
    }

    /// Log `record`, then send it.
    pub fn emit(&mut self, record: &FrameRecord) -> Result<(), CaptureError> {
        self.log.record(record)?;
        dispatch(record, &mut self.inner)?;
        Ok(())
    }

    /// Capture and write an arbitrary frame.
    pub fn write_raw_frame(
        &mut self,
        frame_type: u8,
        flags: u8,
        stream_id: u32,
        payload: &[u8],
    ) -> Result<(), CaptureError> {
        self.emit(&FrameRecord::RawFrame {
            frame_type,
            flags,
            stream_id,
            payload: payload.to_vec(),
        })
    }

    /// Capture and send a PING.
    pub fn send_ping(&mut self, data: PingPayload) -> Result<(), CaptureError> {
        self.emit(&FrameRecord::Ping { data })
    }

    /// Capture and write a SETTINGS frame.
    pub fn write_settings_frame(&mut self, settings: &[Setting]) -> Result<(), CaptureError> {
        self.emit(&FrameRecord::SettingsFrame {
            settings: settings.iter().copied().collect(),
        })
    }

    /// Capture and write a DATA frame.
    pub fn write_data_frame(
        &mut self,
        stream_id: u32,
        end_stream: bool,
        data: &[u8],
    ) -> Result<(), CaptureError> {
        self.emit(&FrameRecord::DataFrame {
            stream_id,
            end_stream,
            data: data.to_vec(),
        })
    }

    /// Capture and write a PUSH_PROMISE frame.
    pub fn write_push_promise_frame(&mut self, promise: &PushPromise) -> Result<(), CaptureError> {
        self.emit(&FrameRecord::PushPromiseFrame(promise.clone()))
    }

    /// Capture and write a CONTINUATION frame.
    pub fn write_continuation_frame(
        &mut self,
        stream_id: u32,
        end_stream: bool,
        data: &[u8],
    ) -> Result<(), CaptureError> {
        self.emit(&FrameRecord::ContinuationFrame {
            stream_id,
            end_stream,
            data: data.to_vec(),
        })
    }

    /// Capture and write a PRIORITY frame.
    pub fn write_priority_frame(
        &mut self,
        stream_id: u32,
        stream_dep: u32,
        weight: u8,
        exclusive: bool,
    ) -> Result<(), CaptureError> {
        self.emit(&FrameRecord::PriorityFrame {
            stream_id,
            stream_dep,
            weight,
            exclusive,
        })
    }

    /// Capture and write a RST_STREAM frame.
    pub fn write_reset_frame(
        &mut self,
        stream_id: u32,
        error_code: u32,
    ) -> Result<(), CaptureError> {
        self.emit(&FrameRecord::ResetFrame {
            stream_id,
            error_code,
        })
    }

    /// Capture and write a WINDOW_UPDATE frame.
    pub fn write_window_update_frame(
        &mut self,
        stream_id: u32,
        incr: u32,
    ) -> Result<(), CaptureError> {
        self.emit(&FrameRecord::WindowUpdateFrame { stream_id, incr })
    }

    /// Parameters of the wrapped connection.
    pub fn params(&self) -> &ConnectionParams {
        self.inner.params()
    }

    /// Fault of the wrapped connection, if any.
    pub fn fault(&self) -> Option<&ConnectionError> {
        self.inner.fault()
    }

    /// The shared capture log.
    pub fn log(&self) -> &Arc<ReplayLog<S>> {
        &self.log
    }

    /// The wrapped connection.
    pub fn get_ref(&self) -> &C {
        &self.inner
    }

    /// Release the wrapped connection.
    pub fn into_inner(self) -> C {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode_record;
    use crate::reader::LogReader;
    use h2fuzz_core::Connector;
    use h2fuzz_test_utils::{Call, Fault, Journal, MockConnector};
    use std::io::{self, Write};

    fn params() -> ConnectionParams {
        ConnectionParams::new("localhost:8443")
    }

    #[test]
    fn failed_write_is_still_logged() {
        let journal = Journal::new();
        let mut connector =
            MockConnector::new(journal.clone()).with_faults(0, [Fault::FailWrite(1)]);
        let log = Arc::new(ReplayLog::new(Vec::new()));
        let conn = connector.connect(&params()).unwrap();
        let mut rec = RecordingConnection::new(conn, Arc::clone(&log));

        let err = rec.write_data_frame(1, true, b"boom").unwrap_err();
        assert!(matches!(err, CaptureError::Connection(_)));
        assert!(!err.is_fatal());
        assert_eq!(log.records_written(), 1);
        assert_eq!(journal.writes().len(), 1);
    }

    struct FullDisk;

    impl Write for FullDisk {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::other("no space left on device"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl LogSink for FullDisk {
        fn sync(&mut self) -> io::Result<()> {
            Ok(())
        }

        fn position(&mut self) -> io::Result<u64> {
            Ok(0)
        }

        fn rewind_to(&mut self, _len: u64) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn log_failure_is_fatal_and_frame_not_sent() {
        let journal = Journal::new();
        let mut connector = MockConnector::new(journal.clone());
        let log = Arc::new(ReplayLog::new(FullDisk));
        let mut rec = RecordingConnection::new(connector.connect(&params()).unwrap(), log);

        let err = rec.send_ping([1; 8]).unwrap_err();
        assert!(err.is_fatal());
        assert!(journal.writes().is_empty());
    }

    #[test]
    fn typed_writes_log_matching_records() {
        let journal = Journal::new();
        let mut connector = MockConnector::new(journal.clone());
        let log = Arc::new(ReplayLog::new(Vec::new()));
        let conn = connector.connect(&params()).unwrap();
        let mut rec = RecordingConnection::new(conn, Arc::clone(&log));

        rec.write_settings_frame(&[Setting::new(3, 100)]).unwrap();
        rec.write_window_update_frame(0, 1).unwrap();
        rec.write_priority_frame(3, 1, 16, false).unwrap();
        assert_eq!(rec.params().host, "localhost:8443");
        assert!(rec.fault().is_none());
        assert_eq!(rec.get_ref().id(), 0);
        drop(rec);

        let bytes = Arc::into_inner(log).unwrap().close().unwrap();
        let records: Vec<FrameRecord> = LogReader::new(bytes.as_slice())
            .lines()
            .map(|l| {
                let l = l.unwrap();
                decode_record(l.number, &l.text).unwrap()
            })
            .collect();
        assert_eq!(records.len(), 3);
        assert_eq!(
            records[1],
            FrameRecord::WindowUpdateFrame {
                stream_id: 0,
                incr: 1
            }
        );
        assert_eq!(
            journal.writes()[2].1,
            Call::Priority {
                stream_id: 3,
                stream_dep: 1,
                weight: 16,
                exclusive: false
            }
        );
    }
}
