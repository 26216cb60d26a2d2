//! h2fuzz: capture and deterministic replay of HTTP/2 fuzzing sessions.
//!
//! This is the top-level facade crate that re-exports the public API from
//! the h2fuzz sub-crates.
//!
//! # Quick start
//!
//! ```rust
//! use h2fuzz::prelude::*;
//!
//! // Capture two frames into an in-memory log.
//! let log = ReplayLog::new(Vec::new());
//! log.record(&FrameRecord::Ping { data: [1, 2, 3, 4, 5, 6, 7, 8] }).unwrap();
//! log.record(&FrameRecord::ResetFrame { stream_id: 1, error_code: 8 }).unwrap();
//! let bytes = log.close().unwrap();
//!
//! // Read them back in order.
//! let records: Vec<FrameRecord> = LogReader::new(bytes.as_slice())
//!     .lines()
//!     .map(|line| {
//!         let line = line.unwrap();
//!         decode_record(line.number, &line.text).unwrap()
//!     })
//!     .collect();
//! assert_eq!(records[1].method(), FrameMethod::ResetFrame);
//! ```
//!
//! Replaying against a real peer goes through [`ReplayDriver`](replay::ReplayDriver)
//! with a [`Connector`](types::Connector) that builds protocol connections.
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `h2fuzz-core` | Frame parameters, `Connection` / `Connector` traits |
//! | [`replay`] | `h2fuzz-replay` | Capture log, record codec, replay driver |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Frame parameter types and the connection seam (`h2fuzz-core`).
pub use h2fuzz_core as types;

/// Capture log, record codec, and replay driver (`h2fuzz-replay`).
///
/// Capture with [`replay::RecordingConnection`] into a
/// [`replay::ReplayLog`], replay with [`replay::ReplayDriver`].
pub use h2fuzz_replay as replay;

/// Common imports for typical h2fuzz usage.
pub mod prelude {
    // Core
    pub use h2fuzz_core::{
        Connection, ConnectionError, ConnectionParams, Connector, PushPromise, Setting,
    };

    // Capture and replay
    pub use h2fuzz_replay::{
        decode_record, encode_record, CancelToken, FrameMethod, FrameRecord, LogReader,
        MalformedPolicy, RecordingConnection, ReplayConfig, ReplayDriver, ReplayError, ReplayLog,
        RunOutcome, RunStatus,
    };
}
