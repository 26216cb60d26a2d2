//! Frame capture and deterministic replay for the h2fuzz protocol fuzzer.
//!
//! During a fuzzing run every frame sent on a connection is appended to a
//! line-oriented capture log. Replaying that log issues the same writes,
//! in the same order, against a fresh connection, rebuilding the
//! connection whenever the peer faults it or a stream reset is replayed.
//!
//! # Architecture
//!
//! - [`ReplayLog`] appends records durably, safe to share across threads
//! - [`RecordingConnection`] logs then sends each frame during capture
//! - [`LogReader`] yields numbered log lines front to back
//! - [`codec`] converts between [`FrameRecord`] and its text form
//! - [`ReplayDriver`] replays a log, reconnecting through a
//!   [`Connector`](h2fuzz_core::Connector)
//!
//! # Format
//!
//! ```text
//! {"FrameMethod":"Ping","Data":[1,2,3,4,5,6,7,8]}
//! {"FrameMethod":"ResetFrame","StreamID":1,"ErrorCode":8}
//! ```
//!
//! One JSON object per line. `FrameMethod` selects the frame kind and
//! the remaining keys are that kind's fields. Binary fields are base64.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod cancel;
pub mod codec;
pub mod config;
pub mod driver;
pub mod error;
pub mod reader;
pub mod recorder;
pub mod types;
pub mod writer;

pub use cancel::CancelToken;
pub use codec::{decode_record, encode_record};
pub use config::{ConfigError, MalformedPolicy, ReconnectPolicy, ReplayConfig};
pub use driver::{
    dispatch, ConnectionState, FaultCause, ReplayDriver, ReplayStats, RunOutcome, RunStatus,
};
pub use error::{DecodeError, DecodeReason, ReplayError};
pub use reader::{read_all, LogLines, LogReader};
pub use recorder::{CaptureError, RecordingConnection};
pub use types::{FrameMethod, FrameRecord, LogLine, UnknownFrameMethod};
pub use writer::{capture_file_name, LogSink, ReplayLog};

/// Directory capture logs are written to by convention.
pub const LOG_DIR: &str = "logs";

/// Suffix appended to the start timestamp to form a capture file name.
pub const LOG_FILE_SUFFIX: &str = "_replay.json";
