//! Error types for the capture log, the record codec, and the replay driver.

use std::io;

use h2fuzz_core::ConnectionError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that end a capture or replay run.
///
/// Connection faults are deliberately absent: the driver recovers from
/// them by reconnecting. Only running out of reconnect attempts surfaces
/// as [`ReplayError::Reconnect`].
#[derive(Debug, Error)]
pub enum ReplayError {
    /// The log file could not be created, opened, written, or synced.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// A log line could not be read (including invalid UTF-8).
    #[error("failed to read log line {line}: {source}")]
    Read {
        /// 1-based line number that failed.
        line: u64,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// A record could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// Record text handed to the log would corrupt its line structure.
    #[error("invalid record: {detail}")]
    InvalidRecord {
        /// What is wrong with the record text.
        detail: String,
    },
    /// A writer panicked while holding the log lock; the last record may be partial.
    #[error("replay log lock poisoned by a panicking writer")]
    LogPoisoned,
    /// A failed append could not be rolled back, so the log may end in a
    /// partial record. Only [`ReplayLog::truncate`](crate::ReplayLog::truncate) recovers it.
    #[error("replay log holds a partial record from a failed append")]
    LogFailed,
    /// The connection could not be rebuilt after a fault.
    #[error("reconnect failed before line {line} after {attempts} attempt(s): {source}")]
    Reconnect {
        /// Line whose record was about to be replayed.
        line: u64,
        /// Number of connect attempts made.
        attempts: u32,
        /// Error from the last attempt.
        #[source]
        source: ConnectionError,
    },
    /// The replay configuration is invalid.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

impl ReplayError {
    /// The log line this error is attributed to, when known.
    pub fn line(&self) -> Option<u64> {
        match self {
            Self::Read { line, .. } | Self::Reconnect { line, .. } => Some(*line),
            Self::Decode(e) => Some(e.line),
            _ => None,
        }
    }
}

/// A record that could not be turned back into a [`FrameRecord`](crate::FrameRecord).
///
/// Carries enough context to locate the problem in the log: the line, the
/// declared tag (once it is known), and the offending field.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("decode error at line {line}{}: {reason}", context(.tag.as_deref(), .field.as_deref()))]
pub struct DecodeError {
    /// 1-based line number of the record.
    pub line: u64,
    /// The `FrameMethod` value, if one was read.
    pub tag: Option<String>,
    /// The offending field (`Settings[2].Val` style for nested fields).
    pub field: Option<String>,
    /// What went wrong.
    #[source]
    pub reason: DecodeReason,
}

/// ` (Tag.Field)` style location suffix for [`DecodeError`] messages.
fn context(tag: Option<&str>, field: Option<&str>) -> String {
    match (tag, field) {
        (Some(tag), Some(field)) => format!(" ({tag}.{field})"),
        (Some(tag), None) | (None, Some(tag)) => format!(" ({tag})"),
        (None, None) => String::new(),
    }
}

/// Why a record failed to decode.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DecodeReason {
    /// The line is not valid JSON (truncated write, garbage).
    #[error("malformed record: {0}")]
    Malformed(String),
    /// The line is valid JSON but not an object.
    #[error("record is not a JSON object")]
    NotAnObject,
    /// The tag is not one of the known frame methods.
    #[error("unknown frame method")]
    UnknownTag,
    /// A field required by the tag is absent.
    #[error("missing field")]
    MissingField,
    /// A field is present that the tag does not define.
    #[error("unexpected field for this frame method")]
    UnexpectedField,
    /// The same key appears more than once in one object.
    #[error("field appears more than once")]
    DuplicateField,
    /// A field has the wrong JSON type.
    #[error("expected {expected}, found {found}")]
    WrongType {
        /// The type the field must have.
        expected: &'static str,
        /// The JSON type actually present.
        found: &'static str,
    },
    /// A number does not fit the field's declared width.
    #[error("value {value} out of range for {width}")]
    OutOfRange {
        /// The offending value, as written.
        value: String,
        /// Declared width (`u8`, `u16`, `u32`).
        width: &'static str,
    },
    /// A binary field is not valid base64.
    #[error("invalid base64: {0}")]
    InvalidBase64(String),
    /// A fixed-size array has the wrong number of elements.
    #[error("expected {expected} elements, found {found}")]
    WrongLength {
        /// Required element count.
        expected: usize,
        /// Element count present.
        found: usize,
    },
}
