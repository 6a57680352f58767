/// Typed values and their bus payload codec.
///
/// A datapoint holds exactly one kind of value for its whole life; the kind
/// fixes the payload layout on the bus. Encoding is total, decoding is
/// checked (length, range, utf-8).
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::LaresError;

/// The kind of value a datapoint holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Bool,
    Uint8,
    Uint16,
    Float32,
    Text,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Bool => "bool",
            ValueKind::Uint8 => "uint8",
            ValueKind::Uint16 => "uint16",
            ValueKind::Float32 => "float32",
            ValueKind::Text => "text",
        }
    }

    /// The value a fresh datapoint of this kind starts with.
    pub fn default_value(&self) -> Value {
        match self {
            ValueKind::Bool => Value::Bool(false),
            ValueKind::Uint8 => Value::Uint8(0),
            ValueKind::Uint16 => Value::Uint16(0),
            ValueKind::Float32 => Value::Float32(0.0),
            ValueKind::Text => Value::Text(String::new()),
        }
    }

    /// Decode a bus payload into a value of this kind.
    pub fn decode(&self, payload: &[u8]) -> Result<Value, LaresError> {
        match self {
            ValueKind::Bool => match payload {
                [0] => Ok(Value::Bool(false)),
                [1] => Ok(Value::Bool(true)),
                [b] => Err(self.bad_payload(format!("byte must be 0 or 1, got {b}"))),
                _ => Err(self.wrong_len(1, payload.len())),
            },
            ValueKind::Uint8 => match payload {
                [b] => Ok(Value::Uint8(*b)),
                _ => Err(self.wrong_len(1, payload.len())),
            },
            ValueKind::Uint16 => match payload {
                [hi, lo] => Ok(Value::Uint16(u16::from_be_bytes([*hi, *lo]))),
                _ => Err(self.wrong_len(2, payload.len())),
            },
            ValueKind::Float32 => match payload {
                [a, b, c, d] => Ok(Value::Float32(f32::from_be_bytes([*a, *b, *c, *d]))),
                _ => Err(self.wrong_len(4, payload.len())),
            },
            ValueKind::Text => String::from_utf8(payload.to_vec())
                .map(Value::Text)
                .map_err(|_| self.bad_payload("payload is not valid utf-8".to_string())),
        }
    }

    fn wrong_len(&self, expected: usize, got: usize) -> LaresError {
        self.bad_payload(format!("expected {expected} bytes, got {got}"))
    }

    fn bad_payload(&self, reason: String) -> LaresError {
        LaresError::Decode {
            kind: *self,
            reason,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed value held by a datapoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Value {
    Bool(bool),
    Uint8(u8),
    Uint16(u16),
    Float32(f32),
    Text(String),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Bool(_) => ValueKind::Bool,
            Value::Uint8(_) => ValueKind::Uint8,
            Value::Uint16(_) => ValueKind::Uint16,
            Value::Float32(_) => ValueKind::Float32,
            Value::Text(_) => ValueKind::Text,
        }
    }

    /// Encode for the bus. Fixed width per kind, big-endian for the
    /// multi-byte kinds, raw utf-8 for text.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Value::Bool(b) => vec![*b as u8],
            Value::Uint8(v) => vec![*v],
            Value::Uint16(v) => v.to_be_bytes().to_vec(),
            Value::Float32(v) => v.to_be_bytes().to_vec(),
            Value::Text(s) => s.as_bytes().to_vec(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Uint8(v) => write!(f, "{v}"),
            Value::Uint16(v) => write!(f, "{v}"),
            Value::Float32(v) => write!(f, "{v}"),
            Value::Text(s) => write!(f, "{s:?}"),
        }
    }
}

/// A committed mutation of one datapoint.
///
/// Handed to subscribers after the new value is stored, and to the
/// transmit gate to decide whether the change goes on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueChange {
    pub datapoint: String,
    pub previous: Value,
    pub current: Value,
}

impl ValueChange {
    /// Whether the committed value differs from the one it replaced.
    ///
    /// Uses the value's own equality. Float32 follows IEEE: NaN is unequal
    /// to itself, so a NaN transition always counts as changed.
    pub fn changed(&self) -> bool {
        self.previous != self.current
    }
}
