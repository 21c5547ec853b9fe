//! JSON‑deserializable pattern description.
//!
//! These types describe the *layout* of a packet. They are intended to be
//! constructed from JSON (for example a pattern file shipped with your
//! application) and then compiled into a [Pattern] by [JsonCompiler], which is
//! the compiler a [crate::registry::Registry] uses unless told otherwise.
//!
//! ```
//! use bitpacket::def::JsonCompiler;
//! use bitpacket::pattern::Compile;
//!
//! let pattern = JsonCompiler
//!     .compile(r#"{ "fields": [
//!         { "name": "type", "bits": 8 },
//!         { "name": "length", "bits": 16, "endianness": "little" }
//!     ] }"#)
//!     .unwrap();
//! assert_eq!(pattern.len(), 2);
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    errors::CompileError,
    field::{
        Branch, Endianness, FieldDescriptor, FloatPrecision, NumericKind, ReadCondition, Repeat, TransformCall,
        WriteCondition,
    },
    pattern::{Compile, Pattern},
    value,
};

/// Byte order of a field; `skip` marks filler.
#[derive(Debug, Deserialize, Serialize, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EndiannessDef {
    Little,
    #[default]
    Big,
    Skip,
}

/// Numeric interpretation of a field.
#[derive(Debug, Deserialize, Serialize, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum KindDef {
    #[default]
    Int,
    Float,
}

/// Top‑level pattern definition consisting of a list of fields.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct PatternDef {
    pub fields: Vec<FieldDef>,
}

/// Description of a single field.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct FieldDef {
    /// Key in the decoded record. Anonymous fields are numbered.
    #[serde(default)]
    pub name: Option<String>,
    /// Width of one element in bits. Must be a whole number of bytes unless packed.
    pub bits: usize,
    #[serde(default)]
    pub endianness: EndiannessDef,
    #[serde(default)]
    pub signed: bool,
    #[serde(default, rename = "type")]
    pub kind: KindDef,
    /// Whether the value is an array.
    #[serde(default)]
    pub arrayed: bool,
    /// Element count. An array without a count is unbounded.
    #[serde(default)]
    pub repeat: Option<usize>,
    /// Element values that end an array.
    #[serde(default)]
    pub terminator: Option<Vec<u8>>,
    /// Whether this field holds the element count of the next field.
    #[serde(default)]
    pub length_encoded: bool,
    /// Subfields packed into this field, most significant first.
    #[serde(default)]
    pub packing: Vec<FieldDef>,
    /// Alternative layouts chosen by this field's value.
    #[serde(default)]
    pub alternation: Vec<BranchDef>,
    /// Fill value written for skip fields.
    #[serde(default)]
    pub padding: Option<u64>,
    /// Transforms applied to the value, in decode order.
    #[serde(default)]
    pub pipeline: Vec<TransformDef>,
}

/// One alternative of an alternation field.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BranchDef {
    pub read: ReadDef,
    /// Encode range; defaults to the read range.
    #[serde(default)]
    pub write: Option<WriteDef>,
    pub fields: Vec<FieldDef>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy)]
pub struct ReadDef {
    pub min: u64,
    pub max: u64,
    #[serde(default)]
    pub mask: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy)]
pub struct WriteDef {
    pub min: u64,
    pub max: u64,
}

/// A transform invocation with its bound parameters.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TransformDef {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<serde_json::Value>,
}

/// A set of named patterns, loaded in one go by
/// [crate::registry::Registry::register_catalog].
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct CatalogDef {
    pub patterns: BTreeMap<String, PatternDef>,
}

/// The default [Compile] implementation: JSON [PatternDef] documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCompiler;

impl Compile for JsonCompiler {
    fn compile(&self, spec: &str) -> Result<Pattern, CompileError> {
        let def: PatternDef = serde_json::from_str(spec)?;
        Pattern::try_from(def)
    }
}

/// Compiles every pattern of a [CatalogDef] document.
pub fn compile_catalog(json: &str) -> Result<Vec<(String, Pattern)>, CompileError> {
    let def: CatalogDef = serde_json::from_str(json)?;
    def.patterns
        .into_iter()
        .map(|(name, pattern)| Ok((name, Pattern::try_from(pattern)?)))
        .collect()
}

impl TryFrom<PatternDef> for Pattern {
    type Error = CompileError;

    fn try_from(def: PatternDef) -> Result<Self, Self::Error> {
        let pattern = Pattern::new(compile_fields(def.fields)?);
        pattern.check_alternation()?;
        Ok(pattern)
    }
}

fn compile_fields(defs: Vec<FieldDef>) -> Result<Vec<FieldDescriptor>, CompileError> {
    let successors_arrayed: Vec<bool> = defs.iter().skip(1).map(|f| f.arrayed).chain([false]).collect();

    let mut out = Vec::with_capacity(defs.len());
    for (def, next_arrayed) in defs.into_iter().zip(successors_arrayed) {
        if def.length_encoded && !next_arrayed {
            return Err(CompileError::InvalidLengthEncoding(label(&def)));
        }
        out.push(field_def_to_descriptor(def)?);
    }

    Ok(out)
}

fn label(def: &FieldDef) -> String {
    def.name.clone().unwrap_or_else(|| "<anonymous>".to_string())
}

fn check_name(def: &FieldDef) -> Result<(), CompileError> {
    match &def.name {
        Some(name) if name.trim().is_empty() => Err(CompileError::InvalidFieldName),
        _ => Ok(()),
    }
}

fn field_def_to_descriptor(def: FieldDef) -> Result<FieldDescriptor, CompileError> {
    check_name(&def)?;
    let name = label(&def);
    let skip = def.endianness == EndiannessDef::Skip;

    if def.bits == 0 || def.bits % 8 != 0 {
        return Err(CompileError::InvalidFieldSize(name));
    }
    if !skip && def.kind == KindDef::Int && def.bits > 64 {
        return Err(CompileError::InvalidFieldSize(name));
    }
    if def.repeat == Some(0) || (!def.arrayed && !skip && def.repeat.is_some_and(|n| n != 1)) {
        return Err(CompileError::InvalidFieldSize(name));
    }

    let kind = match def.kind {
        KindDef::Int => NumericKind::Integer,
        KindDef::Float => match def.bits {
            32 => NumericKind::Float(FloatPrecision::Single),
            64 => NumericKind::Float(FloatPrecision::Double),
            _ => return Err(CompileError::InvalidFloatWidth(name)),
        },
    };

    if def.terminator.is_some() && !def.arrayed {
        return Err(CompileError::InvalidTerminator(name));
    }

    let packing = compile_packing(&def, &name)?;

    let selector = !def.arrayed && !skip && kind == NumericKind::Integer && !def.length_encoded && packing.is_empty();
    if !def.alternation.is_empty() && !selector {
        return Err(CompileError::InvalidAlternation(name));
    }

    let mut alternation = Vec::with_capacity(def.alternation.len());
    for branch in def.alternation {
        let write = branch.write.unwrap_or(WriteDef {
            min: branch.read.min,
            max: branch.read.max,
        });
        if branch.fields.is_empty() || branch.read.min > branch.read.max || write.min > write.max {
            return Err(CompileError::InvalidAlternation(name));
        }
        alternation.push(Branch {
            read: ReadCondition {
                min: branch.read.min,
                max: branch.read.max,
                mask: branch.read.mask,
            },
            write: WriteCondition {
                min: write.min,
                max: write.max,
            },
            pattern: Pattern::new(compile_fields(branch.fields)?),
        });
    }

    let pipeline = def
        .pipeline
        .into_iter()
        .map(transform_def_to_call)
        .collect::<Result<Vec<_>, _>>()?;

    let repeat = match (def.arrayed, def.repeat) {
        (true, Some(n)) => Repeat::Fixed(n),
        (true, None) => Repeat::Unbounded,
        (false, n) => Repeat::Fixed(n.unwrap_or(1)),
    };

    Ok(FieldDescriptor {
        name: def.name,
        byte_width: def.bits / 8,
        bit_width: def.bits,
        endianness: endianness_def_to_core(def.endianness),
        signed: def.signed,
        kind,
        arrayed: def.arrayed,
        repeat,
        terminator: def.terminator,
        length_encoded: def.length_encoded,
        packing,
        alternation,
        padding: def.padding,
        pipeline,
    })
}

fn compile_packing(def: &FieldDef, name: &str) -> Result<Vec<FieldDescriptor>, CompileError> {
    if def.packing.is_empty() {
        return Ok(Vec::new());
    }

    let invalid = || CompileError::InvalidPacking(name.to_string());
    if def.arrayed || def.kind != KindDef::Int || def.endianness == EndiannessDef::Skip || def.bits > 64 {
        return Err(invalid());
    }

    let total: usize = def.packing.iter().map(|p| p.bits).sum();
    if total > def.bits {
        return Err(invalid());
    }

    def.packing
        .iter()
        .map(|pack| {
            check_name(pack)?;
            let compound = pack.arrayed
                || pack.length_encoded
                || pack.kind != KindDef::Int
                || !pack.packing.is_empty()
                || !pack.alternation.is_empty()
                || pack.bits == 0;
            if compound {
                return Err(invalid());
            }
            Ok(FieldDescriptor {
                name: pack.name.clone(),
                byte_width: 0,
                bit_width: pack.bits,
                endianness: endianness_def_to_core(pack.endianness),
                signed: pack.signed,
                padding: pack.padding,
                ..Default::default()
            })
        })
        .collect()
}

fn transform_def_to_call(def: TransformDef) -> Result<TransformCall, CompileError> {
    let parameters = def
        .parameters
        .iter()
        .map(|p| {
            value::from_json(p)
                .ok_or_else(|| CompileError::Syntax(format!("unsupported parameter {p} for transform `{}`", def.name)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(TransformCall::new(def.name, parameters))
}

fn endianness_def_to_core(def: EndiannessDef) -> Endianness {
    match def {
        EndiannessDef::Little => Endianness::Little,
        EndiannessDef::Big => Endianness::Big,
        EndiannessDef::Skip => Endianness::Skip,
    }
}
