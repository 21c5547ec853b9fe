//! Dynamically typed values exchanged with the parser and serializer.

use std::collections::BTreeMap;

/// A value produced when decoding a field, or supplied when encoding one.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    U64(u64),
    I64(i64),
    F32(f32),
    F64(f64),
    /// Raw bytes, usually produced by an encoding transform.
    Bytes(Vec<u8>),
    String(String),
    Array(Vec<Value>),
}

impl Value {
    /// Integer view of the value. Signed values are reinterpreted, not range checked.
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Value::U64(v) => Some(v),
            Value::I64(v) => Some(v as u64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::U64(v) => Some(v as i64),
            Value::I64(v) => Some(v),
            _ => None,
        }
    }

    /// Exact integer view, wide enough to hold both signed and unsigned values.
    pub fn as_i128(&self) -> Option<i128> {
        match *self {
            Value::U64(v) => Some(v as i128),
            Value::I64(v) => Some(v as i128),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::U64(v) => Some(v as f64),
            Value::I64(v) => Some(v as f64),
            Value::F32(v) => Some(v as f64),
            Value::F64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Number of elements when the value is a sequence.
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::Array(values) => Some(values.len()),
            Value::Bytes(bytes) => Some(bytes.len()),
            _ => None,
        }
    }

    /// Collects a byte buffer from `Bytes` or from an array of byte-sized integers.
    pub fn to_bytes(&self) -> Option<Vec<u8>> {
        match self {
            Value::Bytes(bytes) => Some(bytes.clone()),
            Value::Array(values) => values
                .iter()
                .map(|v| v.as_u64().filter(|b| *b <= 0xff).map(|b| b as u8))
                .collect(),
            _ => None,
        }
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::U64(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::I64(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::F32(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::F64(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Bytes(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::Array(value)
    }
}

/// Converts a JSON value into a [Value]. Used for transform parameters read from definitions.
pub fn from_json(value: &serde_json::Value) -> Option<Value> {
    match value {
        serde_json::Value::Number(n) => n
            .as_u64()
            .map(Value::U64)
            .or_else(|| n.as_i64().map(Value::I64))
            .or_else(|| n.as_f64().map(Value::F64)),
        serde_json::Value::String(s) => Some(Value::String(s.clone())),
        serde_json::Value::Array(xs) => xs.iter().map(from_json).collect::<Option<Vec<_>>>().map(Value::Array),
        _ => None,
    }
}

/// The payload handed to a parser's completion callback.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    /// Values in pattern order, used when no field in the pattern is named.
    Positional(Vec<Value>),
    /// Values keyed by field name; anonymous fields are keyed `field<N>`.
    Named(BTreeMap<String, Value>),
}

impl Record {
    pub(crate) fn build(entries: Vec<(Option<String>, Value)>) -> Self {
        if entries.iter().any(|(name, _)| name.is_some()) {
            Record::Named(
                entries
                    .into_iter()
                    .enumerate()
                    .map(|(i, (name, value))| (name.unwrap_or_else(|| positional_name(i)), value))
                    .collect(),
            )
        } else {
            Record::Positional(entries.into_iter().map(|(_, value)| value).collect())
        }
    }

    /// Looks a value up by name, or by its `field<N>` name for positional records.
    pub fn get(&self, name: &str) -> Option<&Value> {
        match self {
            Record::Named(map) => map.get(name),
            Record::Positional(values) => name
                .strip_prefix("field")
                .and_then(|n| n.parse::<usize>().ok())
                .and_then(|n| n.checked_sub(1))
                .and_then(|i| values.get(i)),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Record::Named(map) => map.len(),
            Record::Positional(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Name given to the anonymous entry at zero-based position `index`.
pub(crate) fn positional_name(index: usize) -> String {
    format!("field{}", index + 1)
}
