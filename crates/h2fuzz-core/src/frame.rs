//! Semantic frame parameters shared by capture, replay, and connections.
//!
//! These are the values a fuzzer hands to a connection's write operations.
//! Nothing here validates protocol correctness: a stream ID of zero on a
//! DATA frame or a settings ID nobody defines are valid inputs, because
//! emitting them is the point of fuzzing.

use smallvec::SmallVec;
use std::fmt;

/// Length of a PING frame's opaque payload in bytes.
pub const PING_PAYLOAD_LEN: usize = 8;

/// Opaque PING payload.
pub type PingPayload = [u8; PING_PAYLOAD_LEN];

/// Ordered settings list carried by a SETTINGS frame.
///
/// Six entries inline covers every parameter defined by RFC 9113; longer
/// fuzzed lists spill to the heap.
pub type Settings = SmallVec<[Setting; 6]>;

/// Well-known SETTINGS identifiers (RFC 9113 §6.5.2).
///
/// Provided for convenience when building frames; any `u16` is accepted.
pub mod settings_id {
    /// `SETTINGS_HEADER_TABLE_SIZE`.
    pub const HEADER_TABLE_SIZE: u16 = 0x1;
    /// `SETTINGS_ENABLE_PUSH`.
    pub const ENABLE_PUSH: u16 = 0x2;
    /// `SETTINGS_MAX_CONCURRENT_STREAMS`.
    pub const MAX_CONCURRENT_STREAMS: u16 = 0x3;
    /// `SETTINGS_INITIAL_WINDOW_SIZE`.
    pub const INITIAL_WINDOW_SIZE: u16 = 0x4;
    /// `SETTINGS_MAX_FRAME_SIZE`.
    pub const MAX_FRAME_SIZE: u16 = 0x5;
    /// `SETTINGS_MAX_HEADER_LIST_SIZE`.
    pub const MAX_HEADER_LIST_SIZE: u16 = 0x6;
}

/// A single SETTINGS parameter: identifier and value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Setting {
    /// Setting identifier.
    pub id: u16,
    /// Setting value.
    pub value: u32,
}

impl Setting {
    /// Create a setting from its identifier and value.
    pub fn new(id: u16, value: u32) -> Self {
        Self { id, value }
    }
}

impl fmt::Display for Setting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#06x} = {}]", self.id, self.value)
    }
}

impl From<(u16, u32)> for Setting {
    fn from((id, value): (u16, u32)) -> Self {
        Self { id, value }
    }
}

/// Parameters of a PUSH_PROMISE frame.
///
/// Grouped into one struct because connections take them as a unit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PushPromise {
    /// Stream the promise is sent on.
    pub stream_id: u32,
    /// Stream being promised.
    pub promise_id: u32,
    /// Header block fragment (HPACK-encoded, or arbitrary bytes when fuzzing).
    pub block_fragment: Vec<u8>,
    /// Whether the END_HEADERS flag is set.
    pub end_headers: bool,
    /// Padding length; zero means no PADDED flag.
    pub pad_length: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_stay_inline_up_to_six() {
        let settings: Settings = (1..=6u16).map(|id| Setting::new(id, 0)).collect();
        assert!(!settings.spilled());

        let mut more = settings.clone();
        more.push(Setting::new(0xffff, u32::MAX));
        assert!(more.spilled());
        assert_eq!(more[6], Setting::new(0xffff, u32::MAX));
    }

    #[test]
    fn setting_from_tuple_and_display() {
        let s: Setting = (settings_id::INITIAL_WINDOW_SIZE, 65_535).into();
        assert_eq!(s.id, 4);
        assert_eq!(s.to_string(), "[0x0004 = 65535]");
    }
}
