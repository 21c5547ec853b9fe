//! Field transforms convert between the raw values the engines read and
//! write and the values a caller works with:
//! - **Text encodings**: byte arrays to strings and back (`str`, `ascii`, `utf8`).
//! - **Padding**: left-pad text to a fixed width before writing (`pad`).
//! - **Numeric text**: integers and floats carried as text (`atoi`, `atof`).
//!
//! ## Transform order
//!
//! A field's pipeline runs in declared order when decoding, each step
//! consuming the previous step's output. When encoding the same pipeline runs
//! in reverse order, so that the last step sees a value the engine can write.

use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64_STANDARD};
use thiserror::Error;

use crate::{catalog::Catalog, field::FieldDescriptor, value::Value};

/// Errors that can occur when applying a transform.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    /// The value type does not match what the transform expects.
    #[error("value has the wrong type for transform")]
    InvalidType,
    /// Byte sequence or text is not valid for the chosen encoding.
    #[error("invalid {0} data")]
    InvalidEncoding(String),
    #[error("unknown encoding `{0}`")]
    UnknownEncoding(String),
    /// Text does not parse as a number.
    #[error("invalid number `{0}`")]
    InvalidNumber(String),
    /// A bound parameter is missing or has the wrong type.
    #[error("invalid transform parameter: {0}")]
    InvalidParameter(String),
    #[error("unknown transform `{0}`")]
    UnknownTransform(String),
}

/// Which way a value is travelling through a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Bytes to caller values; pipeline runs front to back.
    Decode,
    /// Caller values to bytes; pipeline runs back to front.
    Encode,
}

/// A transform: `(direction, field, value, bound parameters) -> value`.
pub type TransformFn =
    Arc<dyn Fn(Direction, &FieldDescriptor, Value, &[Value]) -> Result<Value, TransformError> + Send + Sync>;

/// Wraps a closure as a [TransformFn].
pub fn transform_fn<F>(f: F) -> TransformFn
where
    F: Fn(Direction, &FieldDescriptor, Value, &[Value]) -> Result<Value, TransformError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// The root transform layer every registry starts from.
pub fn builtins() -> Catalog<TransformFn> {
    let mut catalog = Catalog::new();
    catalog.insert("str", transform_fn(str_transform));
    catalog.insert(
        "ascii",
        transform_fn(|direction, field, value, _| {
            str_transform(direction, field, value, &[Value::from("ascii")])
        }),
    );
    catalog.insert(
        "utf8",
        transform_fn(|direction, field, value, _| {
            str_transform(direction, field, value, &[Value::from("utf8")])
        }),
    );
    catalog.insert("pad", transform_fn(pad));
    catalog.insert("atoi", transform_fn(atoi));
    catalog.insert("atof", transform_fn(atof));
    catalog
}

/// Runs `field`'s pipeline over `value` in the order `direction` calls for.
pub fn run_pipeline(
    transforms: &Catalog<TransformFn>,
    direction: Direction,
    field: &FieldDescriptor,
    value: Value,
) -> Result<Value, TransformError> {
    let apply = |value: Value, call: &crate::field::TransformCall| {
        let transform = transforms
            .get(&call.name)
            .ok_or_else(|| TransformError::UnknownTransform(call.name.clone()))?;
        transform(direction, field, value, &call.parameters)
    };

    match direction {
        Direction::Decode => field.pipeline.iter().try_fold(value, apply),
        Direction::Encode => field.pipeline.iter().rev().try_fold(value, apply),
    }
}

/// Character encoding understood by the `str` transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    /// Best effort 7-bit clean: high-bit bytes become zero.
    Ascii,
    /// One byte per code point.
    Latin1,
    /// Lowercase hexadecimal digits.
    Hex,
    /// Standard alphabet with padding.
    Base64,
    /// UTF-16 code units, little-endian. A trailing odd byte is ignored.
    Utf16le,
}

impl Encoding {
    pub fn parse(name: &str) -> Result<Self, TransformError> {
        match name.to_ascii_lowercase().as_str() {
            "utf8" | "utf-8" => Ok(Encoding::Utf8),
            "ascii" => Ok(Encoding::Ascii),
            "latin1" | "binary" => Ok(Encoding::Latin1),
            "hex" => Ok(Encoding::Hex),
            "base64" => Ok(Encoding::Base64),
            "ucs2" | "ucs-2" | "utf16le" | "utf-16le" => Ok(Encoding::Utf16le),
            _ => Err(TransformError::UnknownEncoding(name.to_string())),
        }
    }

    pub fn decode(self, mut bytes: Vec<u8>) -> Result<String, TransformError> {
        match self {
            Encoding::Ascii => {
                for b in bytes.iter_mut() {
                    if *b & 0x80 != 0 {
                        *b = 0;
                    }
                }
                String::from_utf8(bytes).map_err(|_| TransformError::InvalidEncoding("ascii".into()))
            }
            Encoding::Utf8 => String::from_utf8(bytes).map_err(|_| TransformError::InvalidEncoding("utf8".into())),
            Encoding::Latin1 => Ok(bytes.into_iter().map(char::from).collect()),
            Encoding::Hex => Ok(hex::encode(bytes)),
            Encoding::Base64 => Ok(BASE64_STANDARD.encode(bytes)),
            Encoding::Utf16le => {
                let units: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                    .collect();
                String::from_utf16(&units).map_err(|_| TransformError::InvalidEncoding("utf16le".into()))
            }
        }
    }

    pub fn encode(self, text: &str) -> Result<Vec<u8>, TransformError> {
        match self {
            Encoding::Ascii => Ok(text.chars().map(|c| if c.is_ascii() { c as u8 } else { 0 }).collect()),
            Encoding::Utf8 => Ok(text.as_bytes().to_vec()),
            Encoding::Latin1 => Ok(text.chars().map(|c| c as u32 as u8).collect()),
            Encoding::Hex => hex::decode(text).map_err(|_| TransformError::InvalidEncoding("hex".into())),
            Encoding::Base64 => BASE64_STANDARD
                .decode(text)
                .map_err(|_| TransformError::InvalidEncoding("base64".into())),
            Encoding::Utf16le => Ok(text.encode_utf16().flat_map(u16::to_le_bytes).collect()),
        }
    }
}

fn str_param<'a>(params: &'a [Value], index: usize, what: &str) -> Result<&'a str, TransformError> {
    params
        .get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| TransformError::InvalidParameter(format!("{what} must be a string")))
}

fn int_param(params: &[Value], index: usize, what: &str) -> Result<u64, TransformError> {
    params
        .get(index)
        .and_then(Value::as_u64)
        .ok_or_else(|| TransformError::InvalidParameter(format!("{what} must be an integer")))
}

fn radix_param(params: &[Value], index: usize) -> Result<u32, TransformError> {
    let base = int_param(params, index, "base")?;
    match u32::try_from(base) {
        Ok(base) if (2..=36).contains(&base) => Ok(base),
        _ => Err(TransformError::InvalidParameter(format!("base {base} is not in 2..=36"))),
    }
}

/// `str(encoding)`: byte arrays to text when decoding, text to bytes when encoding.
fn str_transform(
    direction: Direction,
    _field: &FieldDescriptor,
    value: Value,
    params: &[Value],
) -> Result<Value, TransformError> {
    let encoding = Encoding::parse(str_param(params, 0, "encoding")?)?;
    match direction {
        Direction::Decode => {
            let bytes = value.to_bytes().ok_or(TransformError::InvalidType)?;
            encoding.decode(bytes).map(Value::String)
        }
        Direction::Encode => {
            let text = value.as_str().ok_or(TransformError::InvalidType)?;
            encoding.encode(text).map(Value::Bytes)
        }
    }
}

/// `pad(character, length)`: left-pads text before it is written.
fn pad(direction: Direction, _field: &FieldDescriptor, value: Value, params: &[Value]) -> Result<Value, TransformError> {
    if direction == Direction::Decode {
        return Ok(value);
    }

    let fill = str_param(params, 0, "character")?;
    let length = int_param(params, 1, "length")? as usize;
    let text = value.as_str().ok_or(TransformError::InvalidType)?;

    let missing = length.saturating_sub(text.chars().count());
    let mut padded = String::with_capacity(text.len() + missing * fill.len());
    for _ in 0..missing {
        padded.push_str(fill);
    }
    padded.push_str(text);
    Ok(Value::String(padded))
}

/// `atoi(base)`: integer carried as text in the given base.
fn atoi(direction: Direction, _field: &FieldDescriptor, value: Value, params: &[Value]) -> Result<Value, TransformError> {
    let base = radix_param(params, 0)?;
    match direction {
        Direction::Decode => {
            let text = value.as_str().ok_or(TransformError::InvalidType)?;
            let digits = numeric_text(text);
            u64::from_str_radix(digits, base)
                .map(Value::U64)
                .or_else(|_| i64::from_str_radix(digits, base).map(Value::I64))
                .map_err(|_| TransformError::InvalidNumber(text.to_string()))
        }
        Direction::Encode => {
            let number = value.as_i128().ok_or(TransformError::InvalidType)?;
            Ok(Value::String(to_radix(number, base)))
        }
    }
}

/// `atof()`: float carried as text.
fn atof(direction: Direction, _field: &FieldDescriptor, value: Value, _params: &[Value]) -> Result<Value, TransformError> {
    match direction {
        Direction::Decode => {
            let text = value.as_str().ok_or(TransformError::InvalidType)?;
            numeric_text(text)
                .parse::<f64>()
                .map(Value::F64)
                .map_err(|_| TransformError::InvalidNumber(text.to_string()))
        }
        Direction::Encode => {
            let number = value.as_f64().ok_or(TransformError::InvalidType)?;
            Ok(Value::String(number.to_string()))
        }
    }
}

/// Strips whitespace and NUL fill from fixed-width text fields.
fn numeric_text(text: &str) -> &str {
    text.trim_matches(|c: char| c.is_whitespace() || c == '\0')
}

fn to_radix(number: i128, base: u32) -> String {
    let negative = number < 0;
    let mut magnitude = number.unsigned_abs();
    let mut digits = Vec::new();
    loop {
        let digit = (magnitude % base as u128) as u32;
        digits.push(std::char::from_digit(digit, base).unwrap_or('0'));
        magnitude /= base as u128;
        if magnitude == 0 {
            break;
        }
    }
    if negative {
        digits.push('-');
    }
    digits.iter().rev().collect()
}

#[cfg(test)]
fn apply(name: &str, direction: Direction, value: Value, params: &[Value]) -> Result<Value, TransformError> {
    let catalog = builtins();
    let transform = catalog.get(name).unwrap();
    transform(direction, &FieldDescriptor::default(), value, params)
}

#[cfg(test)]
fn byte_array(bytes: &[u8]) -> Value {
    Value::Array(bytes.iter().map(|b| Value::U64(*b as u64)).collect())
}

#[test]
fn test_utf8_decode_and_encode() {
    assert_eq!(
        apply("utf8", Direction::Decode, byte_array("héllo".as_bytes()), &[]).unwrap(),
        Value::String("héllo".to_string())
    );
    assert_eq!(
        apply("utf8", Direction::Encode, Value::from("hi"), &[]).unwrap(),
        Value::Bytes(b"hi".to_vec())
    );
}

#[test]
fn test_utf8_invalid() {
    assert_eq!(
        apply("utf8", Direction::Decode, byte_array(&[0xff, 0xfe]), &[]),
        Err(TransformError::InvalidEncoding("utf8".to_string()))
    );
}

#[test]
fn test_ascii_zeroes_high_bit() {
    assert_eq!(
        apply("ascii", Direction::Decode, byte_array(&[b'o', 0xe9, b'k']), &[]).unwrap(),
        Value::String("o\0k".to_string())
    );
    assert_eq!(
        apply("ascii", Direction::Encode, Value::from("oék"), &[]).unwrap(),
        Value::Bytes(vec![b'o', 0, b'k'])
    );
}

#[test]
fn test_str_encodings() {
    assert_eq!(
        apply("str", Direction::Decode, byte_array(&[0xde, 0xad]), &[Value::from("hex")]).unwrap(),
        Value::String("dead".to_string())
    );
    assert_eq!(
        apply("str", Direction::Encode, Value::from("beef"), &[Value::from("hex")]).unwrap(),
        Value::Bytes(vec![0xbe, 0xef])
    );
    assert_eq!(
        apply("str", Direction::Decode, byte_array(&[0xe9]), &[Value::from("latin1")]).unwrap(),
        Value::String("é".to_string())
    );
    assert_eq!(
        apply("str", Direction::Decode, byte_array(&[1]), &[Value::from("ebcdic")]),
        Err(TransformError::UnknownEncoding("ebcdic".to_string()))
    );
}

#[test]
fn test_str_base64() {
    assert_eq!(
        apply("str", Direction::Decode, byte_array(b"hi!"), &[Value::from("base64")]).unwrap(),
        Value::String("aGkh".to_string())
    );
    assert_eq!(
        apply("str", Direction::Encode, Value::from("aGk="), &[Value::from("base64")]).unwrap(),
        Value::Bytes(b"hi".to_vec())
    );
    assert_eq!(
        apply("str", Direction::Encode, Value::from("not base64!"), &[Value::from("base64")]),
        Err(TransformError::InvalidEncoding("base64".to_string()))
    );
}

#[test]
fn test_str_utf16le() {
    for name in ["ucs2", "utf16le"] {
        assert_eq!(
            apply("str", Direction::Decode, byte_array(&[b'h', 0, 0xe9, 0, 0x7f]), &[Value::from(name)]).unwrap(),
            Value::String("hé".to_string())
        );
        assert_eq!(
            apply("str", Direction::Encode, Value::from("hé"), &[Value::from(name)]).unwrap(),
            Value::Bytes(vec![b'h', 0, 0xe9, 0])
        );
    }
    assert_eq!(
        apply("str", Direction::Decode, byte_array(&[0x00, 0xd8]), &[Value::from("utf16le")]),
        Err(TransformError::InvalidEncoding("utf16le".to_string()))
    );
}

#[test]
fn test_str_wrong_type() {
    assert_eq!(
        apply("utf8", Direction::Encode, Value::U64(1), &[]),
        Err(TransformError::InvalidType)
    );
}

#[test]
fn test_pad_encode_only() {
    let params = [Value::from("0"), Value::U64(4)];
    assert_eq!(
        apply("pad", Direction::Encode, Value::from("7"), &params).unwrap(),
        Value::String("0007".to_string())
    );
    assert_eq!(
        apply("pad", Direction::Encode, Value::from("12345"), &params).unwrap(),
        Value::String("12345".to_string())
    );
    assert_eq!(
        apply("pad", Direction::Decode, Value::from("7"), &params).unwrap(),
        Value::String("7".to_string())
    );
}

#[test]
fn test_atoi() {
    assert_eq!(
        apply("atoi", Direction::Decode, Value::from("00ff"), &[Value::U64(16)]).unwrap(),
        Value::U64(255)
    );
    assert_eq!(
        apply("atoi", Direction::Decode, Value::from(" -12\0"), &[Value::U64(10)]).unwrap(),
        Value::I64(-12)
    );
    assert_eq!(
        apply("atoi", Direction::Encode, Value::U64(255), &[Value::U64(16)]).unwrap(),
        Value::String("ff".to_string())
    );
    assert_eq!(
        apply("atoi", Direction::Encode, Value::I64(-5), &[Value::U64(2)]).unwrap(),
        Value::String("-101".to_string())
    );
    assert!(apply("atoi", Direction::Decode, Value::from("zz"), &[Value::U64(10)]).is_err());
    assert!(matches!(
        apply("atoi", Direction::Decode, Value::from("1"), &[Value::U64(1)]),
        Err(TransformError::InvalidParameter(_))
    ));
}

#[test]
fn test_atof() {
    assert_eq!(
        apply("atof", Direction::Decode, Value::from("2.5"), &[]).unwrap(),
        Value::F64(2.5)
    );
    assert_eq!(
        apply("atof", Direction::Encode, Value::F64(-0.25), &[]).unwrap(),
        Value::String("-0.25".to_string())
    );
}

#[test]
fn test_pipeline_order() {
    use crate::field::TransformCall;

    let field = FieldDescriptor::new(8)
        .array(crate::field::Repeat::Fixed(4))
        .transform(TransformCall::new("ascii", vec![]))
        .transform(TransformCall::new("pad", vec![Value::from("0"), Value::U64(4)]))
        .transform(TransformCall::new("atoi", vec![Value::U64(10)]));
    let catalog = builtins();

    let decoded = run_pipeline(&catalog, Direction::Decode, &field, byte_array(b"0042")).unwrap();
    assert_eq!(decoded, Value::U64(42));

    let encoded = run_pipeline(&catalog, Direction::Encode, &field, Value::U64(42)).unwrap();
    assert_eq!(encoded, Value::Bytes(b"0042".to_vec()));
}

#[test]
fn test_pipeline_unknown_transform() {
    use crate::field::TransformCall;

    let field = FieldDescriptor::new(8).transform(TransformCall::new("rot13", vec![]));
    assert_eq!(
        run_pipeline(&builtins(), Direction::Decode, &field, Value::U64(1)),
        Err(TransformError::UnknownTransform("rot13".to_string()))
    );
}
