//! Text encode/decode for replay log records.
//!
//! Each record is one compact JSON object. The `FrameMethod` field comes
//! first and selects the schema; the remaining fields follow in the order
//! listed by [`FrameMethod::fields`]. Binary fields are standard padded
//! base64, the ping payload is an array of eight numbers, and settings are
//! an array of `{"ID": u16, "Val": u32}` objects.
//!
//! Decoding is strict: the field set must match the tag exactly, and every
//! number is narrowed to its declared width with a range check. JSON only
//! knows one number type, so integral floats such as `5.0` are accepted,
//! but negative, fractional, and oversized values are not. Key order is
//! not significant when decoding, but a key may appear only once per
//! object.

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use h2fuzz_core::{PingPayload, PushPromise, Setting, Settings, PING_PAYLOAD_LEN};
use serde::de::{DeserializeSeed, Deserializer, MapAccess, SeqAccess, Visitor};
use serde_json::{json, Map, Number, Value};

use crate::error::{DecodeError, DecodeReason};
use crate::types::{FrameMethod, FrameRecord};

/// Name of the tag field present in every record.
pub const TAG_FIELD: &str = "FrameMethod";

const SETTING_ID_FIELD: &str = "ID";
const SETTING_VALUE_FIELD: &str = "Val";

// ── Encoding ────────────────────────────────────────────────────

/// Encode a record as a single line of JSON (no trailing newline).
///
/// Encoding is total and canonical: equal records always produce
/// byte-identical text.
///
/// ```
/// use h2fuzz_replay::codec::encode_record;
/// use h2fuzz_replay::FrameRecord;
///
/// let text = encode_record(&FrameRecord::ResetFrame { stream_id: 1, error_code: 8 });
/// assert_eq!(text, r#"{"FrameMethod":"ResetFrame","StreamID":1,"ErrorCode":8}"#);
/// ```
pub fn encode_record(record: &FrameRecord) -> String {
    record_to_value(record).to_string()
}

/// Build the JSON object for a record.
pub fn record_to_value(record: &FrameRecord) -> Value {
    let tag = record.method().as_str();
    match record {
        FrameRecord::RawFrame {
            frame_type,
            flags,
            stream_id,
            payload,
        } => json!({
            "FrameMethod": tag,
            "FrameType": frame_type,
            "Flags": flags,
            "StreamID": stream_id,
            "Payload": BASE64.encode(payload),
        }),
        FrameRecord::ResetFrame {
            stream_id,
            error_code,
        } => json!({
            "FrameMethod": tag,
            "StreamID": stream_id,
            "ErrorCode": error_code,
        }),
        FrameRecord::WindowUpdateFrame { stream_id, incr } => json!({
            "FrameMethod": tag,
            "StreamID": stream_id,
            "Incr": incr,
        }),
        FrameRecord::PriorityFrame {
            stream_id,
            stream_dep,
            weight,
            exclusive,
        } => json!({
            "FrameMethod": tag,
            "StreamID": stream_id,
            "StreamDep": stream_dep,
            "Weight": weight,
            "Exclusive": exclusive,
        }),
        FrameRecord::DataFrame {
            stream_id,
            end_stream,
            data,
        } => json!({
            "FrameMethod": tag,
            "StreamID": stream_id,
            "EndStream": end_stream,
            "Data": BASE64.encode(data),
        }),
        FrameRecord::PushPromiseFrame(p) => json!({
            "FrameMethod": tag,
            "StreamID": p.stream_id,
            "PromiseID": p.promise_id,
            "BlockFragment": BASE64.encode(&p.block_fragment),
            "EndHeaders": p.end_headers,
            "PadLength": p.pad_length,
        }),
        FrameRecord::SettingsFrame { settings } => {
            let entries: Vec<Value> = settings
                .iter()
                .map(|s| json!({ "ID": s.id, "Val": s.value }))
                .collect();
            json!({
                "FrameMethod": tag,
                "Settings": entries,
            })
        }
        FrameRecord::Ping { data } => json!({
            "FrameMethod": tag,
            "Data": data,
        }),
        FrameRecord::ContinuationFrame {
            stream_id,
            end_stream,
            data,
        } => json!({
            "FrameMethod": tag,
            "StreamID": stream_id,
            "EndStream": end_stream,
            "Data": BASE64.encode(data),
        }),
    }
}

// ── Decoding ────────────────────────────────────────────────────

/// Decode one log line. `line` is only used to attribute errors.
pub fn decode_record(line: u64, text: &str) -> Result<FrameRecord, DecodeError> {
    let mut duplicate = None;
    let value = parse_strict(text, &mut duplicate).map_err(|e| DecodeError {
        line,
        tag: None,
        field: None,
        reason: DecodeReason::Malformed(e.to_string()),
    })?;
    if let Some(field) = duplicate {
        let tag = match field.as_str() {
            TAG_FIELD => None,
            _ => value.get(TAG_FIELD).and_then(Value::as_str).map(str::to_string),
        };
        return Err(DecodeError {
            line,
            tag,
            field: Some(field),
            reason: DecodeReason::DuplicateField,
        });
    }
    record_from_value(line, &value)
}

/// Parse `text` as one JSON value, noting the first repeated key in
/// `duplicate`. The first occurrence of a repeated key is kept.
fn parse_strict(text: &str, duplicate: &mut Option<String>) -> serde_json::Result<Value> {
    let mut de = serde_json::Deserializer::from_str(text);
    let value = StrictValue {
        path: Path::Root,
        duplicate,
    }
    .deserialize(&mut de)?;
    de.end()?;
    Ok(value)
}

/// Where a value sits inside a record, rendered `Settings[2].Val` style.
enum Path<'a> {
    Root,
    Key(&'a Path<'a>, &'a str),
    Index(&'a Path<'a>, usize),
}

impl fmt::Display for Path<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Path::Root => Ok(()),
            Path::Key(Path::Root, key) => f.write_str(key),
            Path::Key(parent, key) => write!(f, "{parent}.{key}"),
            Path::Index(parent, i) => write!(f, "{parent}[{i}]"),
        }
    }
}

/// Builds a [`Value`] like serde_json does, but records repeated keys
/// instead of letting the last one win.
struct StrictValue<'p, 'd> {
    path: Path<'p>,
    duplicate: &'d mut Option<String>,
}

impl<'de> DeserializeSeed<'de> for StrictValue<'_, '_> {
    type Value = Value;

    fn deserialize<D>(self, deserializer: D) -> Result<Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(self)
    }
}

impl<'de> Visitor<'de> for StrictValue<'_, '_> {
    type Value = Value;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "a JSON value")
    }

    fn visit_bool<E>(self, v: bool) -> Result<Value, E>
    where
        E: serde::de::Error,
    {
        Ok(Value::Bool(v))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Value, E>
    where
        E: serde::de::Error,
    {
        Ok(Value::from(v))
    }

    fn visit_u64<E>(self, v: u64) -> Result<Value, E>
    where
        E: serde::de::Error,
    {
        Ok(Value::from(v))
    }

    fn visit_f64<E>(self, v: f64) -> Result<Value, E>
    where
        E: serde::de::Error,
    {
        Ok(Number::from_f64(v).map_or(Value::Null, Value::Number))
    }

    fn visit_str<E>(self, v: &str) -> Result<Value, E>
    where
        E: serde::de::Error,
    {
        Ok(Value::String(v.to_owned()))
    }

    fn visit_string<E>(self, v: String) -> Result<Value, E>
    where
        E: serde::de::Error,
    {
        Ok(Value::String(v))
    }

    fn visit_unit<E>(self) -> Result<Value, E>
    where
        E: serde::de::Error,
    {
        Ok(Value::Null)
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let StrictValue { path, duplicate } = self;
        let mut items = Vec::new();
        loop {
            let seed = StrictValue {
                path: Path::Index(&path, items.len()),
                duplicate: &mut *duplicate,
            };
            match seq.next_element_seed(seed)? {
                Some(item) => items.push(item),
                None => break,
            }
        }
        Ok(Value::Array(items))
    }

    fn visit_map<A>(self, mut map: A) -> Result<Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let StrictValue { path, duplicate } = self;
        let mut obj = Map::new();
        while let Some(key) = map.next_key::<String>()? {
            let value = map.next_value_seed(StrictValue {
                path: Path::Key(&path, &key),
                duplicate: &mut *duplicate,
            })?;
            if !obj.contains_key(&key) {
                obj.insert(key, value);
            } else if duplicate.is_none() {
                *duplicate = Some(Path::Key(&path, &key).to_string());
            }
        }
        Ok(Value::Object(obj))
    }
}

/// Decode a record from an already-parsed JSON value.
pub fn record_from_value(line: u64, value: &Value) -> Result<FrameRecord, DecodeError> {
    let untagged = |field: Option<&str>, reason| DecodeError {
        line,
        tag: None,
        field: field.map(str::to_string),
        reason,
    };

    let obj = value
        .as_object()
        .ok_or_else(|| untagged(None, DecodeReason::NotAnObject))?;
    let tag_value = obj
        .get(TAG_FIELD)
        .ok_or_else(|| untagged(Some(TAG_FIELD), DecodeReason::MissingField))?;
    let tag = tag_value.as_str().ok_or_else(|| {
        untagged(
            Some(TAG_FIELD),
            DecodeReason::WrongType {
                expected: "string",
                found: json_type(tag_value),
            },
        )
    })?;
    let method: FrameMethod = tag.parse().map_err(|_| DecodeError {
        line,
        tag: Some(tag.to_string()),
        field: Some(TAG_FIELD.to_string()),
        reason: DecodeReason::UnknownTag,
    })?;

    let fields = Fields { line, method, obj };
    fields.reject_unexpected()?;

    let record = match method {
        FrameMethod::RawFrame => FrameRecord::RawFrame {
            frame_type: fields.uint("FrameType")?,
            flags: fields.uint("Flags")?,
            stream_id: fields.uint("StreamID")?,
            payload: fields.bytes("Payload")?,
        },
        FrameMethod::ResetFrame => FrameRecord::ResetFrame {
            stream_id: fields.uint("StreamID")?,
            error_code: fields.uint("ErrorCode")?,
        },
        FrameMethod::WindowUpdateFrame => FrameRecord::WindowUpdateFrame {
            stream_id: fields.uint("StreamID")?,
            incr: fields.uint("Incr")?,
        },
        FrameMethod::PriorityFrame => FrameRecord::PriorityFrame {
            stream_id: fields.uint("StreamID")?,
            stream_dep: fields.uint("StreamDep")?,
            weight: fields.uint("Weight")?,
            exclusive: fields.bool("Exclusive")?,
        },
        FrameMethod::DataFrame => FrameRecord::DataFrame {
            stream_id: fields.uint("StreamID")?,
            end_stream: fields.bool("EndStream")?,
            data: fields.bytes("Data")?,
        },
        FrameMethod::PushPromiseFrame => FrameRecord::PushPromiseFrame(PushPromise {
            stream_id: fields.uint("StreamID")?,
            promise_id: fields.uint("PromiseID")?,
            block_fragment: fields.bytes("BlockFragment")?,
            end_headers: fields.bool("EndHeaders")?,
            pad_length: fields.uint("PadLength")?,
        }),
        FrameMethod::SettingsFrame => FrameRecord::SettingsFrame {
            settings: fields.settings("Settings")?,
        },
        FrameMethod::Ping => FrameRecord::Ping {
            data: fields.ping_payload("Data")?,
        },
        FrameMethod::ContinuationFrame => FrameRecord::ContinuationFrame {
            stream_id: fields.uint("StreamID")?,
            end_stream: fields.bool("EndStream")?,
            data: fields.bytes("Data")?,
        },
    };
    Ok(record)
}

/// Field accessor for one tagged record object.
struct Fields<'a> {
    line: u64,
    method: FrameMethod,
    obj: &'a Map<String, Value>,
}

impl Fields<'_> {
    fn error(&self, field: impl Into<String>, reason: DecodeReason) -> DecodeError {
        DecodeError {
            line: self.line,
            tag: Some(self.method.as_str().to_string()),
            field: Some(field.into()),
            reason,
        }
    }

    fn reject_unexpected(&self) -> Result<(), DecodeError> {
        let allowed = self.method.fields();
        match self
            .obj
            .keys()
            .find(|k| k.as_str() != TAG_FIELD && !allowed.contains(&k.as_str()))
        {
            Some(extra) => Err(self.error(extra.as_str(), DecodeReason::UnexpectedField)),
            None => Ok(()),
        }
    }

    fn get(&self, name: &str) -> Result<&Value, DecodeError> {
        self.obj
            .get(name)
            .ok_or_else(|| self.error(name, DecodeReason::MissingField))
    }

    fn uint<T: Narrow>(&self, name: &str) -> Result<T, DecodeError> {
        narrow(self.get(name)?).map_err(|reason| self.error(name, reason))
    }

    fn bool(&self, name: &str) -> Result<bool, DecodeError> {
        let value = self.get(name)?;
        value.as_bool().ok_or_else(|| {
            self.error(
                name,
                DecodeReason::WrongType {
                    expected: "boolean",
                    found: json_type(value),
                },
            )
        })
    }

    fn bytes(&self, name: &str) -> Result<Vec<u8>, DecodeError> {
        let value = self.get(name)?;
        let text = value.as_str().ok_or_else(|| {
            self.error(
                name,
                DecodeReason::WrongType {
                    expected: "base64 string",
                    found: json_type(value),
                },
            )
        })?;
        BASE64
            .decode(text)
            .map_err(|e| self.error(name, DecodeReason::InvalidBase64(e.to_string())))
    }

    fn array(&self, name: &str) -> Result<&Vec<Value>, DecodeError> {
        let value = self.get(name)?;
        value.as_array().ok_or_else(|| {
            self.error(
                name,
                DecodeReason::WrongType {
                    expected: "array",
                    found: json_type(value),
                },
            )
        })
    }

    fn ping_payload(&self, name: &str) -> Result<PingPayload, DecodeError> {
        let items = self.array(name)?;
        if items.len() != PING_PAYLOAD_LEN {
            return Err(self.error(
                name,
                DecodeReason::WrongLength {
                    expected: PING_PAYLOAD_LEN,
                    found: items.len(),
                },
            ));
        }
        let mut payload = [0u8; PING_PAYLOAD_LEN];
        for (i, (slot, item)) in payload.iter_mut().zip(items).enumerate() {
            *slot = narrow(item).map_err(|reason| self.error(format!("{name}[{i}]"), reason))?;
        }
        Ok(payload)
    }

    fn settings(&self, name: &str) -> Result<Settings, DecodeError> {
        let items = self.array(name)?;
        let mut settings = Settings::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            let path = format!("{name}[{i}]");
            let entry = item.as_object().ok_or_else(|| {
                self.error(
                    path.as_str(),
                    DecodeReason::WrongType {
                        expected: "object",
                        found: json_type(item),
                    },
                )
            })?;
            if let Some(extra) = entry
                .keys()
                .find(|k| *k != SETTING_ID_FIELD && *k != SETTING_VALUE_FIELD)
            {
                return Err(self.error(format!("{path}.{extra}"), DecodeReason::UnexpectedField));
            }
            let id = self.member(entry, &path, SETTING_ID_FIELD)?;
            let value = self.member(entry, &path, SETTING_VALUE_FIELD)?;
            settings.push(Setting { id, value });
        }
        Ok(settings)
    }

    /// Narrow `entry[key]`, attributing errors to `path.key`.
    fn member<T: Narrow>(
        &self,
        entry: &Map<String, Value>,
        path: &str,
        key: &str,
    ) -> Result<T, DecodeError> {
        let value = entry
            .get(key)
            .ok_or_else(|| self.error(format!("{path}.{key}"), DecodeReason::MissingField))?;
        narrow(value).map_err(|reason| self.error(format!("{path}.{key}"), reason))
    }
}

/// Unsigned integer types a record field can be narrowed to.
trait Narrow: TryFrom<u64> {
    const WIDTH: &'static str;
}

impl Narrow for u8 {
    const WIDTH: &'static str = "u8";
}

impl Narrow for u16 {
    const WIDTH: &'static str = "u16";
}

impl Narrow for u32 {
    const WIDTH: &'static str = "u32";
}

/// Read a JSON number as an unsigned integer and narrow it to `T`.
fn narrow<T: Narrow>(value: &Value) -> Result<T, DecodeReason> {
    let out_of_range = |n: &Number| DecodeReason::OutOfRange {
        value: n.to_string(),
        width: T::WIDTH,
    };
    let n = match value {
        Value::Number(n) => n,
        other => {
            return Err(DecodeReason::WrongType {
                expected: "unsigned integer",
                found: json_type(other),
            })
        }
    };
    let wide = if let Some(u) = n.as_u64() {
        u
    } else if n.is_i64() {
        return Err(out_of_range(n));
    } else {
        // 2^64 as f64; anything at or above it cannot be a u64.
        const U64_LIMIT: f64 = 18_446_744_073_709_551_616.0;
        let f = n.as_f64().unwrap_or(f64::NAN);
        if f.fract() != 0.0 || f.is_nan() {
            return Err(DecodeReason::WrongType {
                expected: "unsigned integer",
                found: "fractional number",
            });
        }
        if !(0.0..U64_LIMIT).contains(&f) {
            return Err(out_of_range(n));
        }
        f as u64
    };
    T::try_from(wide).map_err(|_| out_of_range(n))
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // ── Proptest strategies ─────────────────────────────────────

    fn arb_bytes() -> impl Strategy<Value = Vec<u8>> {
        prop::collection::vec(any::<u8>(), 0..64)
    }

    fn arb_record() -> impl Strategy<Value = FrameRecord> {
        prop_oneof![
            (any::<u8>(), any::<u8>(), any::<u32>(), arb_bytes()).prop_map(
                |(frame_type, flags, stream_id, payload)| FrameRecord::RawFrame {
                    frame_type,
                    flags,
                    stream_id,
                    payload,
                }
            ),
            (any::<u32>(), any::<u32>()).prop_map(|(stream_id, error_code)| {
                FrameRecord::ResetFrame {
                    stream_id,
                    error_code,
                }
            }),
            (any::<u32>(), any::<u32>())
                .prop_map(|(stream_id, incr)| FrameRecord::WindowUpdateFrame { stream_id, incr }),
            (any::<u32>(), any::<u32>(), any::<u8>(), any::<bool>()).prop_map(
                |(stream_id, stream_dep, weight, exclusive)| FrameRecord::PriorityFrame {
                    stream_id,
                    stream_dep,
                    weight,
                    exclusive,
                }
            ),
            (any::<u32>(), any::<bool>(), arb_bytes()).prop_map(|(stream_id, end_stream, data)| {
                FrameRecord::DataFrame {
                    stream_id,
                    end_stream,
                    data,
                }
            }),
            (any::<u32>(), any::<u32>(), arb_bytes(), any::<bool>(), any::<u8>()).prop_map(
                |(stream_id, promise_id, block_fragment, end_headers, pad_length)| {
                    FrameRecord::PushPromiseFrame(PushPromise {
                        stream_id,
                        promise_id,
                        block_fragment,
                        end_headers,
                        pad_length,
                    })
                }
            ),
            prop::collection::vec((any::<u16>(), any::<u32>()), 0..10).prop_map(|pairs| {
                FrameRecord::SettingsFrame {
                    settings: pairs.into_iter().map(Setting::from).collect(),
                }
            }),
            any::<[u8; 8]>().prop_map(|data| FrameRecord::Ping { data }),
            (any::<u32>(), any::<bool>(), arb_bytes()).prop_map(|(stream_id, end_stream, data)| {
                FrameRecord::ContinuationFrame {
                    stream_id,
                    end_stream,
                    data,
                }
            }),
        ]
    }

    proptest! {
        #[test]
        fn roundtrip_record(record in arb_record()) {
            let text = encode_record(&record);
            prop_assert!(!text.contains('\n'));
            let got = decode_record(1, &text).unwrap();
            prop_assert_eq!(&record, &got);
            // Canonical: re-encoding the decoded record is byte-identical.
            prop_assert_eq!(text, encode_record(&got));
        }
    }

    // ── Boundaries ──────────────────────────────────────────────

    #[test]
    fn roundtrip_boundary_values() {
        let records = vec![
            FrameRecord::RawFrame {
                frame_type: 0,
                flags: u8::MAX,
                stream_id: u32::MAX,
                payload: vec![],
            },
            FrameRecord::RawFrame {
                frame_type: u8::MAX,
                flags: 0,
                stream_id: 0,
                payload: vec![0, 255],
            },
            FrameRecord::PriorityFrame {
                stream_id: 0,
                stream_dep: u32::MAX,
                weight: u8::MAX,
                exclusive: true,
            },
            FrameRecord::DataFrame {
                stream_id: u32::MAX,
                end_stream: false,
                data: vec![],
            },
            FrameRecord::PushPromiseFrame(PushPromise {
                stream_id: 0,
                promise_id: u32::MAX,
                block_fragment: vec![],
                end_headers: false,
                pad_length: u8::MAX,
            }),
            FrameRecord::SettingsFrame {
                settings: Settings::new(),
            },
            FrameRecord::SettingsFrame {
                settings: [Setting::new(0, 0), Setting::new(u16::MAX, u32::MAX)]
                    .into_iter()
                    .collect(),
            },
            FrameRecord::Ping { data: [255; 8] },
            FrameRecord::Ping {
                data: [0, 1, 2, 3, 252, 253, 254, 255],
            },
        ];
        for record in records {
            let text = encode_record(&record);
            assert_eq!(decode_record(1, &text).unwrap(), record, "{text}");
        }
    }

    // ── Canonical text ──────────────────────────────────────────

    #[test]
    fn canonical_field_order() {
        assert_eq!(
            encode_record(&FrameRecord::Ping {
                data: [1, 2, 3, 4, 5, 6, 7, 8]
            }),
            r#"{"FrameMethod":"Ping","Data":[1,2,3,4,5,6,7,8]}"#
        );
        assert_eq!(
            encode_record(&FrameRecord::DataFrame {
                stream_id: 3,
                end_stream: true,
                data: b"hi".to_vec(),
            }),
            r#"{"FrameMethod":"DataFrame","StreamID":3,"EndStream":true,"Data":"aGk="}"#
        );
        assert_eq!(
            encode_record(&FrameRecord::SettingsFrame {
                settings: [Setting::new(4, 65535)].into_iter().collect(),
            }),
            r#"{"FrameMethod":"SettingsFrame","Settings":[{"ID":4,"Val":65535}]}"#
        );
    }

    #[test]
    fn push_promise_fragment_is_base64() {
        let record = FrameRecord::PushPromiseFrame(PushPromise {
            stream_id: 1,
            promise_id: 2,
            block_fragment: vec![0x82, 0x86],
            end_headers: true,
            pad_length: 0,
        });
        let value = record_to_value(&record);
        assert_eq!(value["BlockFragment"], Value::String("goY=".into()));
    }

    #[test]
    fn encoded_keys_match_declared_fields() {
        let samples = [
            FrameRecord::RawFrame {
                frame_type: 0,
                flags: 0,
                stream_id: 0,
                payload: vec![],
            },
            FrameRecord::ResetFrame {
                stream_id: 0,
                error_code: 0,
            },
            FrameRecord::WindowUpdateFrame {
                stream_id: 0,
                incr: 0,
            },
            FrameRecord::PriorityFrame {
                stream_id: 0,
                stream_dep: 0,
                weight: 0,
                exclusive: false,
            },
            FrameRecord::DataFrame {
                stream_id: 0,
                end_stream: false,
                data: vec![],
            },
            FrameRecord::PushPromiseFrame(PushPromise::default()),
            FrameRecord::SettingsFrame {
                settings: Settings::new(),
            },
            FrameRecord::Ping { data: [0; 8] },
            FrameRecord::ContinuationFrame {
                stream_id: 0,
                end_stream: false,
                data: vec![],
            },
        ];
        for record in samples {
            let value = record_to_value(&record);
            let keys: Vec<&str> = value
                .as_object()
                .unwrap()
                .keys()
                .map(String::as_str)
                .collect();
            let mut expected = vec![TAG_FIELD];
            expected.extend_from_slice(record.method().fields());
            assert_eq!(keys, expected);
        }
    }

    // ── Foreign key order and number forms ──────────────────────

    #[test]
    fn decodes_sorted_key_order() {
        let text = r#"{"Data":[8,7,6,5,4,3,2,1],"FrameMethod":"Ping"}"#;
        assert_eq!(
            decode_record(1, text).unwrap(),
            FrameRecord::Ping {
                data: [8, 7, 6, 5, 4, 3, 2, 1]
            }
        );

        let text = r#"{"BlockFragment":"goY=","EndHeaders":true,"FrameMethod":"PushPromiseFrame","PadLength":0,"PromiseID":2,"StreamID":1}"#;
        assert_eq!(
            decode_record(1, text).unwrap(),
            FrameRecord::PushPromiseFrame(PushPromise {
                stream_id: 1,
                promise_id: 2,
                block_fragment: vec![0x82, 0x86],
                end_headers: true,
                pad_length: 0,
            })
        );
    }

    #[test]
    fn integral_floats_accepted() {
        let text = r#"{"FrameMethod":"WindowUpdateFrame","StreamID":1.0,"Incr":65535.0}"#;
        assert_eq!(
            decode_record(1, text).unwrap(),
            FrameRecord::WindowUpdateFrame {
                stream_id: 1,
                incr: 65535
            }
        );
    }

    // ── Decode errors ───────────────────────────────────────────

    fn decode_err(text: &str) -> DecodeError {
        decode_record(7, text).unwrap_err()
    }

    #[test]
    fn wrong_type_names_the_field() {
        let err = decode_err(r#"{"FrameMethod":"DataFrame","StreamID":"not-a-number"}"#);
        assert_eq!(err.line, 7);
        assert_eq!(err.tag.as_deref(), Some("DataFrame"));
        assert_eq!(err.field.as_deref(), Some("StreamID"));
        assert_eq!(
            err.reason,
            DecodeReason::WrongType {
                expected: "unsigned integer",
                found: "string"
            }
        );
    }

    #[test]
    fn malformed_json_rejected() {
        let err = decode_err(r#"{"FrameMethod":"Ping","Data":[1,2,"#);
        assert!(matches!(err.reason, DecodeReason::Malformed(_)));
        assert_eq!(err.tag, None);
        assert_eq!(err.field, None);

        let err = decode_err("[1,2,3]");
        assert_eq!(err.reason, DecodeReason::NotAnObject);
    }

    #[test]
    fn tag_problems_rejected() {
        let err = decode_err(r#"{"StreamID":1}"#);
        assert_eq!(err.field.as_deref(), Some("FrameMethod"));
        assert_eq!(err.reason, DecodeReason::MissingField);

        let err = decode_err(r#"{"FrameMethod":7}"#);
        assert_eq!(err.field.as_deref(), Some("FrameMethod"));
        assert!(matches!(err.reason, DecodeReason::WrongType { .. }));

        let err = decode_err(r#"{"FrameMethod":"GoAwayFrame","StreamID":1}"#);
        assert_eq!(err.tag.as_deref(), Some("GoAwayFrame"));
        assert_eq!(err.reason, DecodeReason::UnknownTag);
    }

    #[test]
    fn field_set_must_match_tag() {
        let err = decode_err(r#"{"FrameMethod":"ResetFrame","StreamID":1}"#);
        assert_eq!(err.field.as_deref(), Some("ErrorCode"));
        assert_eq!(err.reason, DecodeReason::MissingField);

        // Valid fields for a different tag are still rejected.
        let err = decode_err(r#"{"FrameMethod":"ResetFrame","StreamID":1,"ErrorCode":0,"Incr":5}"#);
        assert_eq!(err.field.as_deref(), Some("Incr"));
        assert_eq!(err.reason, DecodeReason::UnexpectedField);
    }

    #[test]
    fn repeated_keys_rejected() {
        let err = decode_err(
            r#"{"FrameMethod":"ResetFrame","StreamID":1,"ErrorCode":8,"StreamID":99}"#,
        );
        assert_eq!(err.tag.as_deref(), Some("ResetFrame"));
        assert_eq!(err.field.as_deref(), Some("StreamID"));
        assert_eq!(err.reason, DecodeReason::DuplicateField);

        // Two tags in one record name neither.
        let err = decode_err(
            r#"{"FrameMethod":"Ping","StreamID":1,"ErrorCode":8,"FrameMethod":"ResetFrame"}"#,
        );
        assert_eq!(err.tag, None);
        assert_eq!(err.field.as_deref(), Some("FrameMethod"));
        assert_eq!(err.reason, DecodeReason::DuplicateField);

        let err = decode_err(
            r#"{"FrameMethod":"SettingsFrame","Settings":[{"ID":1,"Val":2},{"ID":3,"Val":4,"ID":5}]}"#,
        );
        assert_eq!(err.field.as_deref(), Some("Settings[1].ID"));
        assert_eq!(err.reason, DecodeReason::DuplicateField);
    }

    #[test]
    fn repeated_setting_ids_across_entries_are_kept() {
        let text = r#"{"FrameMethod":"SettingsFrame","Settings":[{"ID":4,"Val":1},{"ID":4,"Val":2}]}"#;
        assert_eq!(
            decode_record(1, text).unwrap(),
            FrameRecord::SettingsFrame {
                settings: [Setting::new(4, 1), Setting::new(4, 2)]
                    .into_iter()
                    .collect(),
            }
        );
    }

    #[test]
    fn trailing_text_is_malformed() {
        let err = decode_err(r#"{"FrameMethod":"Ping","Data":[0,0,0,0,0,0,0,0]} x"#);
        assert!(matches!(err.reason, DecodeReason::Malformed(_)));
    }

    #[test]
    fn narrowing_overflow_rejected() {
        let err = decode_err(
            r#"{"FrameMethod":"RawFrame","FrameType":256,"Flags":0,"StreamID":1,"Payload":""}"#,
        );
        assert_eq!(err.field.as_deref(), Some("FrameType"));
        assert_eq!(
            err.reason,
            DecodeReason::OutOfRange {
                value: "256".into(),
                width: "u8"
            }
        );

        let err = decode_err(r#"{"FrameMethod":"ResetFrame","StreamID":4294967296,"ErrorCode":0}"#);
        assert_eq!(err.field.as_deref(), Some("StreamID"));
        assert!(matches!(err.reason, DecodeReason::OutOfRange { width: "u32", .. }));

        let err = decode_err(r#"{"FrameMethod":"ResetFrame","StreamID":-1,"ErrorCode":0}"#);
        assert!(matches!(err.reason, DecodeReason::OutOfRange { .. }));

        let err = decode_err(r#"{"FrameMethod":"ResetFrame","StreamID":1.5,"ErrorCode":0}"#);
        assert!(matches!(err.reason, DecodeReason::WrongType { .. }));

        let err = decode_err(r#"{"FrameMethod":"ResetFrame","StreamID":1e30,"ErrorCode":0}"#);
        assert!(matches!(err.reason, DecodeReason::OutOfRange { .. }));
    }

    #[test]
    fn settings_errors_are_indexed() {
        let err = decode_err(
            r#"{"FrameMethod":"SettingsFrame","Settings":[{"ID":1,"Val":2},{"ID":65536,"Val":0}]}"#,
        );
        assert_eq!(err.field.as_deref(), Some("Settings[1].ID"));
        assert!(matches!(err.reason, DecodeReason::OutOfRange { width: "u16", .. }));

        let err = decode_err(r#"{"FrameMethod":"SettingsFrame","Settings":[{"ID":1}]}"#);
        assert_eq!(err.field.as_deref(), Some("Settings[0].Val"));
        assert_eq!(err.reason, DecodeReason::MissingField);

        let err = decode_err(r#"{"FrameMethod":"SettingsFrame","Settings":[5]}"#);
        assert_eq!(err.field.as_deref(), Some("Settings[0]"));

        let err = decode_err(
            r#"{"FrameMethod":"SettingsFrame","Settings":[{"ID":1,"Val":2,"Extra":0}]}"#,
        );
        assert_eq!(err.field.as_deref(), Some("Settings[0].Extra"));
        assert_eq!(err.reason, DecodeReason::UnexpectedField);
    }

    #[test]
    fn ping_payload_must_be_eight_bytes() {
        let err = decode_err(r#"{"FrameMethod":"Ping","Data":[1,2,3]}"#);
        assert_eq!(
            err.reason,
            DecodeReason::WrongLength {
                expected: 8,
                found: 3
            }
        );

        let err = decode_err(r#"{"FrameMethod":"Ping","Data":[1,2,3,4,5,6,7,300]}"#);
        assert_eq!(err.field.as_deref(), Some("Data[7]"));
    }

    #[test]
    fn invalid_base64_rejected() {
        let err = decode_err(
            r#"{"FrameMethod":"DataFrame","StreamID":1,"EndStream":false,"Data":"@@@"}"#,
        );
        assert_eq!(err.field.as_deref(), Some("Data"));
        assert!(matches!(err.reason, DecodeReason::InvalidBase64(_)));

        let err = decode_err(
            r#"{"FrameMethod":"DataFrame","StreamID":1,"EndStream":false,"Data":[1]}"#,
        );
        assert!(matches!(
            err.reason,
            DecodeReason::WrongType {
                expected: "base64 string",
                found: "array"
            }
        ));
    }

    #[test]
    fn bool_fields_are_strict() {
        let err = decode_err(r#"{"FrameMethod":"DataFrame","StreamID":1,"EndStream":1,"Data":""}"#);
        assert_eq!(err.field.as_deref(), Some("EndStream"));
        assert!(matches!(
            err.reason,
            DecodeReason::WrongType {
                expected: "boolean",
                ..
            }
        ));
    }
}
