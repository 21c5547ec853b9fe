//! Error types for pattern compilation, catalog lookup, decoding and encoding.

use thiserror::Error;

use crate::transform::TransformError;

/// Errors produced when compiling a pattern definition into a [crate::pattern::Pattern].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// The definition is not valid JSON or does not have the expected shape.
    #[error("malformed pattern definition: {0}")]
    Syntax(String),
    /// Field width is zero, not a whole number of bytes, or too wide for a scalar.
    #[error("invalid size for field `{0}`")]
    InvalidFieldSize(String),
    /// Float fields must be 32 or 64 bits wide.
    #[error("float field `{0}` must be 32 or 64 bits")]
    InvalidFloatWidth(String),
    /// Packed subfields are wider than their parent, or are themselves compound.
    #[error("invalid packing in field `{0}`")]
    InvalidPacking(String),
    /// A terminator was given on a field that is not an array.
    #[error("terminator on non-array field `{0}`")]
    InvalidTerminator(String),
    /// A length-encoded field is not followed by an array field.
    #[error("length-encoded field `{0}` is not followed by an array")]
    InvalidLengthEncoding(String),
    /// An alternation branch is empty or has an inverted range.
    #[error("invalid alternation in field `{0}`")]
    InvalidAlternation(String),
    /// Field name is invalid (e.g. empty).
    #[error("invalid field name")]
    InvalidFieldName,
}

impl From<serde_json::Error> for CompileError {
    fn from(value: serde_json::Error) -> Self {
        CompileError::Syntax(value.to_string())
    }
}

/// A name that could not be found in any layer of a catalog.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("unknown pattern `{0}`")]
    UnknownPattern(String),
    #[error("unknown transform `{0}`")]
    UnknownTransform(String),
}

/// Errors produced when resolving a [crate::registry::PatternRef].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Lookup(#[from] LookupError),
    #[error(transparent)]
    Compile(#[from] CompileError),
}

/// Errors produced while arming or feeding a [crate::parser::Parser].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReadError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Lookup(#[from] LookupError),
    /// No alternation branch accepts the decoded discriminant.
    #[error("no alternation branch matches value {value}")]
    StructuralMismatch { value: u64 },
    #[error(transparent)]
    Transform(#[from] TransformError),
}

/// Errors produced while arming a [crate::serializer::Serializer].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WriteError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Lookup(#[from] LookupError),
    /// No alternation branch accepts the discriminant value.
    #[error("no alternation branch matches value {value}")]
    StructuralMismatch { value: u64 },
    /// A packed subfield value does not fit its declared bit width.
    #[error("value {value} will not fit in {bits} bits")]
    BitWidthOverflow { value: i128, bits: usize },
    #[error(transparent)]
    Transform(#[from] TransformError),
    /// No value was supplied for the named field.
    #[error("missing value for field `{0}`")]
    MissingField(String),
    /// More positional values were supplied than the pattern consumes.
    #[error("{0} values left over after serializing the pattern")]
    TooManyValues(usize),
    /// The value has the wrong shape for the field it is written to.
    #[error("invalid value for field `{0}`")]
    InvalidValue(String),
    /// A fixed-size array was given the wrong number of elements.
    #[error("field `{field}` expects {expected} elements, got {actual}")]
    ArrayLength {
        field: String,
        expected: usize,
        actual: usize,
    },
}
