use pairmerge_types::RangeSummary;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ProtocolError, ProtocolResult};
use crate::message::{Message, MessageKind};

/// Longest accepted line, excluding the terminator.
pub const MAX_LINE_BYTES: usize = 64 * 1024;
/// Most entries a `values` array may carry.
pub const MAX_VALUES: usize = 10;
/// Placeholder min/max written for an empty list. Decoders ignore the bounds
/// whenever `count` is 0.
pub const EMPTY_BOUND: i64 = -1;

/// On-wire shape of every message: `{"msg_type":"HEAD","values":[3]}`.
#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct Frame {
    msg_type: String,
    #[serde(default)]
    values: Vec<Value>,
}

/// Codec for the line-oriented JSON encoding of [`Message`]s.
///
/// Every message becomes exactly one line without a trailing newline; the
/// transport adds the terminator.
pub struct LineCodec;

impl LineCodec {
    pub fn encode<V: Serialize>(msg: &Message<V>) -> ProtocolResult<String> {
        let values = match msg {
            Message::Rang(summary) if summary.count == 0 => {
                vec![Value::from(EMPTY_BOUND), Value::from(EMPTY_BOUND), Value::from(0u64)]
            }
            Message::Rang(summary) => vec![
                to_value(&summary.min)?,
                to_value(&summary.max)?,
                Value::from(summary.count),
            ],
            Message::Head(v) => vec![to_value(v)?],
            Message::End | Message::Take => Vec::new(),
        };
        let frame = Frame { msg_type: msg.kind().as_str().to_string(), values };
        let line = serde_json::to_string(&frame).map_err(|e| ProtocolError::Encode(e.to_string()))?;
        if line.len() > MAX_LINE_BYTES {
            return Err(ProtocolError::Encode(format!(
                "line of {} bytes exceeds {MAX_LINE_BYTES}",
                line.len()
            )));
        }
        Ok(line)
    }

    /// Check a raw line read off a transport, terminator already removed.
    ///
    /// Lines over [`MAX_LINE_BYTES`] or not valid UTF-8 are decode errors.
    pub fn line_text(raw: &[u8]) -> ProtocolResult<&str> {
        if raw.len() > MAX_LINE_BYTES {
            return Err(oversized(&String::from_utf8_lossy(&raw[..64]), raw.len()));
        }
        std::str::from_utf8(raw).map_err(|e| {
            ProtocolError::decode(&String::from_utf8_lossy(raw), format!("line is not valid UTF-8: {e}"))
        })
    }

    /// Decode one line. A trailing `\n` or `\r\n` is ignored.
    pub fn decode<V: DeserializeOwned + Ord>(line: &str) -> ProtocolResult<Message<V>> {
        let line = line.trim_end_matches(['\n', '\r']);
        if line.len() > MAX_LINE_BYTES {
            let prefix: String = line.chars().take(64).collect();
            return Err(oversized(&prefix, line.len()));
        }
        let frame: Frame =
            serde_json::from_str(line).map_err(|e| ProtocolError::decode(line, e.to_string()))?;
        let kind: MessageKind = frame.msg_type.parse().map_err(|e| ProtocolError::decode(line, e))?;
        if frame.values.len() > MAX_VALUES {
            return Err(ProtocolError::decode(
                line,
                format!("{} values exceeds limit of {MAX_VALUES}", frame.values.len()),
            ));
        }
        if frame.values.len() != kind.arity() {
            return Err(ProtocolError::decode(
                line,
                format!("{kind} expects {} values, got {}", kind.arity(), frame.values.len()),
            ));
        }

        let mut values = frame.values.into_iter();
        let mut next = || values.next().unwrap_or(Value::Null);
        match kind {
            MessageKind::Rang => {
                let (raw_min, raw_max) = (next(), next());
                let count: u64 = from_value(line, next(), "count")?;
                if count == 0 {
                    // Bounds of an empty list carry no information.
                    return Ok(Message::Rang(RangeSummary::empty()));
                }
                let summary = RangeSummary {
                    min: Some(from_value(line, raw_min, "min")?),
                    max: Some(from_value(line, raw_max, "max")?),
                    count,
                };
                if !summary.is_consistent() {
                    return Err(ProtocolError::decode(line, "RANG requires min <= max"));
                }
                Ok(Message::Rang(summary))
            }
            MessageKind::Head => {
                let raw = next();
                if raw.is_null() {
                    return Err(ProtocolError::decode(line, "HEAD value is null"));
                }
                Ok(Message::Head(from_value(line, raw, "value")?))
            }
            MessageKind::End => Ok(Message::End),
            MessageKind::Take => Ok(Message::Take),
        }
    }
}

fn oversized(prefix: &str, len: usize) -> ProtocolError {
    ProtocolError::decode(prefix, format!("line of {len} bytes exceeds {MAX_LINE_BYTES}"))
}

fn to_value<T: Serialize + ?Sized>(v: &T) -> ProtocolResult<Value> {
    serde_json::to_value(v).map_err(|e| ProtocolError::Encode(e.to_string()))
}

fn from_value<T: DeserializeOwned>(line: &str, raw: Value, field: &str) -> ProtocolResult<T> {
    serde_json::from_value(raw).map_err(|e| ProtocolError::decode(line, format!("bad {field}: {e}")))
}
