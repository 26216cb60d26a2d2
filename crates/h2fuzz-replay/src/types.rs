//! Data types for frame capture and replay.

use std::fmt;
use std::str::FromStr;

use h2fuzz_core::{PingPayload, PushPromise, Settings};
use thiserror::Error;

/// Tag selecting a [`FrameRecord`] variant, stored as the `FrameMethod`
/// field of every log record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameMethod {
    /// Opaque frame with caller-chosen type and flags.
    RawFrame,
    /// RST_STREAM.
    ResetFrame,
    /// WINDOW_UPDATE.
    WindowUpdateFrame,
    /// PRIORITY.
    PriorityFrame,
    /// DATA.
    DataFrame,
    /// PUSH_PROMISE.
    PushPromiseFrame,
    /// SETTINGS.
    SettingsFrame,
    /// PING.
    Ping,
    /// CONTINUATION.
    ContinuationFrame,
}

impl FrameMethod {
    /// Every tag, in declaration order.
    pub const ALL: [FrameMethod; 9] = [
        Self::RawFrame,
        Self::ResetFrame,
        Self::WindowUpdateFrame,
        Self::PriorityFrame,
        Self::DataFrame,
        Self::PushPromiseFrame,
        Self::SettingsFrame,
        Self::Ping,
        Self::ContinuationFrame,
    ];

    /// The tag as written in the log.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RawFrame => "RawFrame",
            Self::ResetFrame => "ResetFrame",
            Self::WindowUpdateFrame => "WindowUpdateFrame",
            Self::PriorityFrame => "PriorityFrame",
            Self::DataFrame => "DataFrame",
            Self::PushPromiseFrame => "PushPromiseFrame",
            Self::SettingsFrame => "SettingsFrame",
            Self::Ping => "Ping",
            Self::ContinuationFrame => "ContinuationFrame",
        }
    }

    /// The record fields this tag requires, in canonical order
    /// (excluding the `FrameMethod` tag itself).
    pub fn fields(self) -> &'static [&'static str] {
        match self {
            Self::RawFrame => &["FrameType", "Flags", "StreamID", "Payload"],
            Self::ResetFrame => &["StreamID", "ErrorCode"],
            Self::WindowUpdateFrame => &["StreamID", "Incr"],
            Self::PriorityFrame => &["StreamID", "StreamDep", "Weight", "Exclusive"],
            Self::DataFrame => &["StreamID", "EndStream", "Data"],
            Self::PushPromiseFrame => &[
                "StreamID",
                "PromiseID",
                "BlockFragment",
                "EndHeaders",
                "PadLength",
            ],
            Self::SettingsFrame => &["Settings"],
            Self::Ping => &["Data"],
            Self::ContinuationFrame => &["StreamID", "EndStream", "Data"],
        }
    }
}

impl fmt::Display for FrameMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned by [`FrameMethod::from_str`] for a tag outside the known set.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("unknown frame method {0:?}")]
pub struct UnknownFrameMethod(pub String);

impl FromStr for FrameMethod {
    type Err = UnknownFrameMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| UnknownFrameMethod(s.to_string()))
    }
}

/// One captured frame: the semantic parameters of a single connection write.
///
/// # Examples
///
/// ```
/// use h2fuzz_replay::{FrameMethod, FrameRecord};
///
/// let reset = FrameRecord::ResetFrame { stream_id: 1, error_code: 8 };
/// assert_eq!(reset.method(), FrameMethod::ResetFrame);
/// assert_eq!(reset.stream_id(), Some(1));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameRecord {
    /// Opaque frame with caller-chosen header fields.
    RawFrame {
        /// Frame type byte.
        frame_type: u8,
        /// Flags byte.
        flags: u8,
        /// Stream identifier.
        stream_id: u32,
        /// Frame payload.
        payload: Vec<u8>,
    },
    /// RST_STREAM. Forces a new connection on replay.
    ResetFrame {
        /// Stream being reset.
        stream_id: u32,
        /// Error code.
        error_code: u32,
    },
    /// WINDOW_UPDATE.
    WindowUpdateFrame {
        /// Stream identifier (0 = connection window).
        stream_id: u32,
        /// Window size increment.
        incr: u32,
    },
    /// PRIORITY.
    PriorityFrame {
        /// Stream identifier.
        stream_id: u32,
        /// Stream dependency.
        stream_dep: u32,
        /// Weight.
        weight: u8,
        /// Exclusive dependency flag.
        exclusive: bool,
    },
    /// DATA.
    DataFrame {
        /// Stream identifier.
        stream_id: u32,
        /// END_STREAM flag.
        end_stream: bool,
        /// Frame payload.
        data: Vec<u8>,
    },
    /// PUSH_PROMISE.
    PushPromiseFrame(PushPromise),
    /// SETTINGS, parameters in emission order.
    SettingsFrame {
        /// Settings parameters.
        settings: Settings,
    },
    /// PING.
    Ping {
        /// Opaque payload.
        data: PingPayload,
    },
    /// CONTINUATION.
    ContinuationFrame {
        /// Stream identifier.
        stream_id: u32,
        /// END_STREAM flag as passed to the connection.
        end_stream: bool,
        /// Header block fragment.
        data: Vec<u8>,
    },
}

impl FrameRecord {
    /// The tag of this record.
    pub fn method(&self) -> FrameMethod {
        match self {
            Self::RawFrame { .. } => FrameMethod::RawFrame,
            Self::ResetFrame { .. } => FrameMethod::ResetFrame,
            Self::WindowUpdateFrame { .. } => FrameMethod::WindowUpdateFrame,
            Self::PriorityFrame { .. } => FrameMethod::PriorityFrame,
            Self::DataFrame { .. } => FrameMethod::DataFrame,
            Self::PushPromiseFrame(_) => FrameMethod::PushPromiseFrame,
            Self::SettingsFrame { .. } => FrameMethod::SettingsFrame,
            Self::Ping { .. } => FrameMethod::Ping,
            Self::ContinuationFrame { .. } => FrameMethod::ContinuationFrame,
        }
    }

    /// The stream this frame targets, for frame kinds that carry one.
    pub fn stream_id(&self) -> Option<u32> {
        match self {
            Self::RawFrame { stream_id, .. }
            | Self::ResetFrame { stream_id, .. }
            | Self::WindowUpdateFrame { stream_id, .. }
            | Self::PriorityFrame { stream_id, .. }
            | Self::DataFrame { stream_id, .. }
            | Self::ContinuationFrame { stream_id, .. } => Some(*stream_id),
            Self::PushPromiseFrame(p) => Some(p.stream_id),
            Self::SettingsFrame { .. } | Self::Ping { .. } => None,
        }
    }
}

/// One non-blank line read from a replay log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogLine {
    /// 1-based physical line number within the log.
    pub number: u64,
    /// Line content without the trailing newline.
    pub text: String,
}
