//! Field descriptors: the steps a [crate::pattern::Pattern] is made of.

use crate::{pattern::Pattern, value::Value};

/// Byte order of a field, or `Skip` for filler bytes that carry no value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endianness {
    Little,
    #[default]
    Big,
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatPrecision {
    Single,
    Double,
}

/// How the bytes of an element are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NumericKind {
    #[default]
    Integer,
    Float(FloatPrecision),
}

/// Number of elements in a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeat {
    Fixed(usize),
    /// Governed by a terminator or by a preceding length-encoded field.
    Unbounded,
}

impl Default for Repeat {
    fn default() -> Self {
        Repeat::Fixed(1)
    }
}

impl Repeat {
    /// Element count used by the engines; `usize::MAX` stands for unbounded.
    pub fn count(self) -> usize {
        match self {
            Repeat::Fixed(n) => n,
            Repeat::Unbounded => usize::MAX,
        }
    }
}

/// A named transform bound to fixed parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformCall {
    pub name: String,
    pub parameters: Vec<Value>,
}

impl TransformCall {
    pub fn new(name: impl Into<String>, parameters: Vec<Value>) -> Self {
        TransformCall {
            name: name.into(),
            parameters,
        }
    }
}

/// Decode-side branch predicate: `min <= value <= max` and `value & mask == mask`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadCondition {
    pub min: u64,
    pub max: u64,
    pub mask: u64,
}

/// Encode-side branch predicate: `min <= value <= max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteCondition {
    pub min: u64,
    pub max: u64,
}

/// One alternative layout selected by the value of an alternation field.
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub read: ReadCondition,
    pub write: WriteCondition,
    pub pattern: Pattern,
}

impl Branch {
    pub fn matches_read(&self, value: u64) -> bool {
        self.read.min <= value && value <= self.read.max && value & self.read.mask == self.read.mask
    }

    pub fn matches_write(&self, value: u64) -> bool {
        self.write.min <= value && value <= self.write.max
    }
}

/// A single step of a pattern.
///
/// Descriptors are produced by a [crate::pattern::Compile] implementation and
/// are never mutated by the engines.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldDescriptor {
    /// Key in a named [crate::value::Record]; anonymous fields get `field<N>`.
    pub name: Option<String>,
    /// Size of one element in bytes. Zero for packed subfields.
    pub byte_width: usize,
    /// Size of one element in bits.
    pub bit_width: usize,
    pub endianness: Endianness,
    /// If true, elements are two's complement.
    pub signed: bool,
    pub kind: NumericKind,
    /// If true, the value is a sequence of elements.
    pub arrayed: bool,
    pub repeat: Repeat,
    /// Element values ending an array.
    pub terminator: Option<Vec<u8>>,
    /// If true, the decoded value is the element count of the next field.
    pub length_encoded: bool,
    /// Subfields packed into this field, most significant first.
    pub packing: Vec<FieldDescriptor>,
    /// Alternative layouts chosen by this field's value.
    pub alternation: Vec<Branch>,
    /// Fill value written for skip fields.
    pub padding: Option<u64>,
    /// Transforms applied to the value, in decode order.
    pub pipeline: Vec<TransformCall>,
}

impl FieldDescriptor {
    /// An unsigned, big-endian scalar of `bits` bits.
    pub fn new(bits: usize) -> Self {
        FieldDescriptor {
            byte_width: bits / 8,
            bit_width: bits,
            ..Default::default()
        }
    }

    /// Filler of `bits` bits that produces no value.
    pub fn skip(bits: usize) -> Self {
        FieldDescriptor::new(bits).with_endianness(Endianness::Skip)
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_endianness(mut self, endianness: Endianness) -> Self {
        self.endianness = endianness;
        self
    }

    pub fn little(self) -> Self {
        self.with_endianness(Endianness::Little)
    }

    pub fn signed(mut self) -> Self {
        self.signed = true;
        self
    }

    pub fn float(mut self) -> Self {
        self.kind = NumericKind::Float(if self.bit_width == 32 {
            FloatPrecision::Single
        } else {
            FloatPrecision::Double
        });
        self
    }

    /// Makes the field an array with the given element count.
    pub fn array(mut self, repeat: Repeat) -> Self {
        self.arrayed = true;
        self.repeat = repeat;
        self
    }

    pub fn terminated(mut self, terminator: Vec<u8>) -> Self {
        self.terminator = Some(terminator);
        self
    }

    pub fn length_encoded(mut self) -> Self {
        self.length_encoded = true;
        self
    }

    pub fn packed(mut self, packing: Vec<FieldDescriptor>) -> Self {
        self.packing = packing;
        self
    }

    pub fn alternate(mut self, branches: Vec<Branch>) -> Self {
        self.alternation = branches;
        self
    }

    pub fn padded(mut self, padding: u64) -> Self {
        self.padding = Some(padding);
        self
    }

    pub fn transform(mut self, call: TransformCall) -> Self {
        self.pipeline.push(call);
        self
    }

    pub fn is_skip(&self) -> bool {
        self.endianness == Endianness::Skip
    }

    /// Whether elements are collected as raw bytes before conversion.
    pub fn exploded(&self) -> bool {
        self.signed || matches!(self.kind, NumericKind::Float(_))
    }

    /// Element count before any length-encoded override.
    pub fn element_count(&self) -> usize {
        self.repeat.count()
    }

    pub(crate) fn label(&self) -> String {
        self.name.clone().unwrap_or_else(|| "<anonymous>".to_string())
    }
}
