//! Resumable encode engine.
//!
//! Arming a [Serializer] does all of the fallible work up front: alternation
//! is resolved, values are collected and run through their pipelines, packed
//! subfields are range checked, and every field is reduced to a list of
//! elements ready for emission. [Serializer::write] then only copies bytes
//! and may be called with spans of any size until the packet is done.

use std::collections::{BTreeMap, VecDeque};

use tracing::{debug, trace};

use crate::{
    bits,
    errors::WriteError,
    field::{Branch, Endianness, FieldDescriptor, FloatPrecision, NumericKind, Repeat},
    ieee754,
    pattern::FieldRef,
    registry::{PatternRef, Registry},
    transform::Direction,
    value::{positional_name, Record, Value},
};

/// Invoked once per encoded packet.
pub type WriteCallback<C> = Box<dyn FnOnce(&mut Serializer<C>) + Send>;

pub struct Serializer<C = ()> {
    registry: Registry<C>,
    session: Option<WriteSession>,
    callback: Option<WriteCallback<C>>,
    bytes_written: usize,
}

/// Emission progress for one armed packet.
#[derive(Debug)]
struct WriteSession {
    plans: Vec<FieldPlan>,
    field_index: usize,
    element_index: usize,
    /// Byte offset within the current element.
    offset: usize,
    done: bool,
}

/// A field reduced to the elements it emits.
#[derive(Debug)]
struct FieldPlan {
    width: usize,
    little: bool,
    elements: Vec<Element>,
}

#[derive(Debug, Clone, PartialEq)]
enum Element {
    /// Bytes to step over without writing.
    Skip(usize),
    /// Unsigned value laid out per the field's endianness.
    Magnitude(u64),
    /// Bytes most significant first, for signed and float elements.
    Raw(Vec<u8>),
}

/// A field paired with what it will emit, before lengths are known.
enum Slot {
    Skip(FieldRef),
    Packed(FieldRef, u64),
    Length(FieldRef),
    Value(FieldRef, Value),
}

/// Caller values, consumed field by field while arming.
struct Values {
    incoming: Incoming,
    taken: usize,
}

enum Incoming {
    Ordered(VecDeque<Value>),
    Named(BTreeMap<String, Value>),
}

impl<C> Serializer<C> {
    pub fn new(registry: Registry<C>) -> Self {
        Serializer {
            registry,
            session: None,
            callback: None,
            bytes_written: 0,
        }
    }

    /// Arms with values in field order. Anonymous and named fields alike
    /// take the next value.
    pub fn arm_ordered<'a, F>(
        &mut self,
        pattern: impl Into<PatternRef<'a>>,
        values: Vec<Value>,
        on_complete: F,
    ) -> Result<(), WriteError>
    where
        F: FnOnce(&mut Serializer<C>) + Send + 'static,
    {
        let values = Values {
            incoming: Incoming::Ordered(values.into()),
            taken: 0,
        };
        self.arm(pattern.into(), values, Box::new(on_complete))
    }

    /// Arms with values keyed by field name; anonymous fields are keyed `field<N>`.
    pub fn arm_named<'a, F>(
        &mut self,
        pattern: impl Into<PatternRef<'a>>,
        values: BTreeMap<String, Value>,
        on_complete: F,
    ) -> Result<(), WriteError>
    where
        F: FnOnce(&mut Serializer<C>) + Send + 'static,
    {
        let values = Values {
            incoming: Incoming::Named(values),
            taken: 0,
        };
        self.arm(pattern.into(), values, Box::new(on_complete))
    }

    /// Arms with a decoded [Record], positional or named.
    pub fn arm_record<'a, F>(&mut self, pattern: impl Into<PatternRef<'a>>, record: Record, on_complete: F) -> Result<(), WriteError>
    where
        F: FnOnce(&mut Serializer<C>) + Send + 'static,
    {
        match record {
            Record::Positional(values) => self.arm_ordered(pattern, values, on_complete),
            Record::Named(values) => self.arm_named(pattern, values, on_complete),
        }
    }

    fn arm(&mut self, pattern: PatternRef<'_>, mut values: Values, callback: WriteCallback<C>) -> Result<(), WriteError> {
        self.session = None;
        self.callback = None;

        let pattern = self.registry.resolve(pattern)?;
        self.registry.check_transforms(&pattern)?;

        let slots = self.collect(pattern.refs().collect(), &mut values)?;
        values.finish()?;

        let mut plans = Vec::with_capacity(slots.len());
        for (index, slot) in slots.iter().enumerate() {
            let follows_length = index > 0 && matches!(slots[index - 1], Slot::Length(_));
            let plan = match slot {
                Slot::Skip(field) => skip_plan(field),
                Slot::Packed(field, packed) => FieldPlan::new(field, vec![Element::Magnitude(*packed)]),
                Slot::Length(field) => {
                    let count = slots.get(index + 1).map_or(0, Slot::element_count);
                    FieldPlan::new(field, vec![encode_element(field, &Value::U64(count as u64))?])
                }
                Slot::Value(field, value) => value_plan(field, value, follows_length)?,
            };
            plans.push(plan);
        }

        let mut session = WriteSession {
            plans,
            field_index: 0,
            element_index: 0,
            offset: 0,
            done: false,
        };
        session.settle();
        debug!(pattern_len = pattern.len(), bytes = session.size(), "serializer armed");

        self.session = Some(session);
        self.callback = Some(callback);
        Ok(())
    }

    /// Resolves alternation and pairs every remaining field with its value.
    fn collect(&self, fields: VecDeque<FieldRef>, values: &mut Values) -> Result<Vec<Slot>, WriteError> {
        let mut pending = fields;
        let mut slots = Vec::with_capacity(pending.len());

        while let Some(field) = pending.pop_front() {
            if !field.alternation.is_empty() {
                let (branch_index, branch, value) = select_branch(&field, values)?;
                debug!(value, branch = branch_index, "alternation branch selected");
                for spliced in branch.pattern.refs().rev() {
                    pending.push_front(spliced);
                }
                continue;
            }

            let slot = if field.is_skip() {
                Slot::Skip(field)
            } else if !field.packing.is_empty() {
                let packed = pack(&field, values)?;
                Slot::Packed(field, packed)
            } else if field.length_encoded {
                Slot::Length(field)
            } else {
                let value = values.take(field.name.as_deref())?;
                let value = self.registry.pipeline(Direction::Encode, &field, value)?;
                trace!(field = %field.label(), "field collected");
                Slot::Value(field, value)
            };
            slots.push(slot);
        }

        Ok(slots)
    }

    /// Copies as much of the armed packet into `buffer` as fits and returns
    /// the number of bytes advanced, skipped bytes included.
    ///
    /// Completing the packet invokes the callback; if it re-arms, the rest of
    /// the buffer receives the next packet.
    pub fn write(&mut self, buffer: &mut [u8]) -> usize {
        let mut offset = 0;

        loop {
            let Some(session) = self.session.as_mut() else {
                break;
            };
            if session.done {
                break;
            }
            if session.exhausted() {
                self.finish();
                continue;
            }
            if offset == buffer.len() {
                break;
            }

            let plan = &session.plans[session.field_index];
            let element = &plan.elements[session.element_index];
            let width = match element {
                Element::Skip(count) => *count,
                _ => plan.width,
            };

            while session.offset < width && offset < buffer.len() {
                match element {
                    Element::Skip(_) => {}
                    Element::Magnitude(magnitude) => {
                        buffer[offset] = bits::byte_at(*magnitude, weight(plan, session.offset));
                    }
                    Element::Raw(bytes) => {
                        let weight = weight(plan, session.offset);
                        buffer[offset] = bytes
                            .len()
                            .checked_sub(weight + 1)
                            .and_then(|index| bytes.get(index))
                            .copied()
                            .unwrap_or(0);
                    }
                }
                offset += 1;
                session.offset += 1;
                self.bytes_written += 1;
            }

            if session.offset < width {
                break;
            }
            session.offset = 0;
            session.element_index += 1;
            session.settle();
        }

        offset
    }

    fn finish(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.done = true;
        }
        debug!(bytes = self.bytes_written, "packet encoded");
        if let Some(callback) = self.callback.take() {
            callback(self);
        }
    }

    /// Total bytes the armed packet occupies, skipped bytes included.
    pub fn size_of(&self) -> usize {
        self.session.as_ref().map_or(0, WriteSession::size)
    }

    /// Zeroes the written byte counter.
    pub fn reset(&mut self) {
        self.bytes_written = 0;
    }

    pub fn bytes_written(&self) -> usize {
        self.bytes_written
    }

    /// True when nothing is armed or the armed packet has been fully written.
    pub fn is_idle(&self) -> bool {
        self.session.as_ref().is_none_or(|session| session.done)
    }

    pub fn registry(&self) -> &Registry<C> {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry<C> {
        &mut self.registry
    }

    pub fn context(&self) -> &C {
        self.registry.context()
    }

    pub fn context_mut(&mut self) -> &mut C {
        self.registry.context_mut()
    }
}

impl WriteSession {
    /// Moves past fields with no elements left.
    fn settle(&mut self) {
        while let Some(plan) = self.plans.get(self.field_index) {
            if self.element_index < plan.elements.len() {
                break;
            }
            self.field_index += 1;
            self.element_index = 0;
        }
    }

    fn exhausted(&self) -> bool {
        self.field_index >= self.plans.len()
    }

    fn size(&self) -> usize {
        self.plans.iter().map(FieldPlan::size).sum()
    }
}

impl FieldPlan {
    fn new(field: &FieldDescriptor, elements: Vec<Element>) -> Self {
        FieldPlan {
            width: field.byte_width,
            little: field.endianness == Endianness::Little,
            elements,
        }
    }

    fn size(&self) -> usize {
        self.elements
            .iter()
            .map(|element| match element {
                Element::Skip(count) => *count,
                _ => self.width,
            })
            .sum()
    }
}

impl Slot {
    /// Element count a preceding length-encoded field reports.
    fn element_count(&self) -> usize {
        match self {
            Slot::Value(_, value) => value.len().unwrap_or(1),
            _ => 1,
        }
    }
}

impl Values {
    fn key(&self, name: Option<&str>) -> String {
        name.map(str::to_string).unwrap_or_else(|| positional_name(self.taken))
    }

    fn peek(&self, name: Option<&str>) -> Option<&Value> {
        match &self.incoming {
            Incoming::Ordered(values) => values.front(),
            Incoming::Named(values) => values.get(&self.key(name)),
        }
    }

    fn take(&mut self, name: Option<&str>) -> Result<Value, WriteError> {
        let key = self.key(name);
        let value = match &mut self.incoming {
            Incoming::Ordered(values) => values.pop_front(),
            Incoming::Named(values) => values.remove(&key),
        };
        self.taken += 1;
        value.ok_or(WriteError::MissingField(key))
    }

    /// Positional values must all be consumed; surplus named values are ignored.
    fn finish(self) -> Result<(), WriteError> {
        match self.incoming {
            Incoming::Ordered(values) if !values.is_empty() => Err(WriteError::TooManyValues(values.len())),
            _ => Ok(()),
        }
    }
}

/// Name of the value that selects `branch`: its first field, or that
/// field's first packed subfield.
fn discriminant_name(branch: &Branch) -> Option<&str> {
    let first = branch.pattern.fields().first()?;
    match first.packing.first() {
        Some(pack) => pack.name.as_deref(),
        None => first.name.as_deref(),
    }
}

/// Picks the first branch whose own discriminant value is present and within
/// its write range. Branches may name their discriminant differently.
fn select_branch<'f>(field: &'f FieldDescriptor, values: &Values) -> Result<(usize, &'f Branch, u64), WriteError> {
    let mut seen = None;

    for (index, branch) in field.alternation.iter().enumerate() {
        let Some(value) = values.peek(discriminant_name(branch)).and_then(Value::as_u64) else {
            continue;
        };
        if branch.matches_write(value) {
            return Ok((index, branch, value));
        }
        seen.get_or_insert(value);
    }

    match seen {
        Some(value) => Err(WriteError::StructuralMismatch { value }),
        None => {
            let first = field.alternation.first().and_then(discriminant_name);
            Err(WriteError::MissingField(values.key(first)))
        }
    }
}

/// Byte weight of wire position `offset`, zero being least significant.
fn weight(plan: &FieldPlan, offset: usize) -> usize {
    if plan.little {
        offset
    } else {
        plan.width.saturating_sub(1 + offset)
    }
}

/// Combines packed subfields, most significant first.
fn pack(field: &FieldDescriptor, values: &mut Values) -> Result<u64, WriteError> {
    let mut packed = 0u64;
    let mut remaining = field.bit_width;

    for pack in &field.packing {
        let bits = pack.bit_width;
        remaining = remaining.saturating_sub(bits);

        if pack.is_skip() {
            packed |= bits::shl(pack.padding.unwrap_or(0) & bits::mask(bits), remaining);
            continue;
        }

        let value = values
            .take(pack.name.as_deref())?
            .as_i128()
            .ok_or_else(|| WriteError::InvalidValue(pack.label()))?;
        check_range(value, bits, pack.signed)?;
        let encoded = value as i64 as u64 & bits::mask(bits);
        packed |= bits::shl(encoded, remaining);
    }

    Ok(packed)
}

/// Rejects integers that do not fit in `bits` two's complement (signed) or
/// binary (unsigned) digits.
fn check_range(value: i128, bits: usize, signed: bool) -> Result<(), WriteError> {
    let fits = match (signed, bits) {
        (_, 0) => false,
        (true, bits) => {
            let bound = 1i128 << (bits.min(64) - 1);
            (-bound..bound).contains(&value)
        }
        (false, bits) => (0..=bits::mask(bits.min(64)) as i128).contains(&value),
    };
    if fits {
        Ok(())
    } else {
        Err(WriteError::BitWidthOverflow { value, bits })
    }
}

fn skip_plan(field: &FieldDescriptor) -> FieldPlan {
    let count = match field.repeat {
        Repeat::Fixed(count) => count,
        Repeat::Unbounded => 1,
    };
    let elements = match field.padding {
        Some(padding) => vec![Element::Magnitude(padding); count],
        None => vec![Element::Skip(field.byte_width * count)],
    };
    FieldPlan::new(field, elements)
}

fn value_plan(field: &FieldDescriptor, value: &Value, follows_length: bool) -> Result<FieldPlan, WriteError> {
    if !field.arrayed {
        return Ok(FieldPlan::new(field, vec![encode_element(field, value)?]));
    }

    let items: Vec<Value> = match value {
        Value::Array(items) => items.clone(),
        Value::Bytes(bytes) => bytes.iter().map(|b| Value::U64(*b as u64)).collect(),
        _ => return Err(WriteError::InvalidValue(field.label())),
    };
    let mut elements = items
        .iter()
        .map(|item| encode_element(field, item))
        .collect::<Result<Vec<_>, _>>()?;

    if let Some(terminator) = &field.terminator {
        for byte in terminator {
            elements.push(encode_element(field, &Value::U64(*byte as u64))?);
        }
    }

    if let (false, Repeat::Fixed(capacity)) = (follows_length, field.repeat) {
        if field.terminator.is_some() {
            if elements.len() > capacity {
                elements.truncate(capacity);
            } else {
                let unused = capacity - elements.len();
                match field.padding {
                    Some(padding) => elements.extend(std::iter::repeat_n(Element::Magnitude(padding), unused)),
                    None if unused > 0 => elements.push(Element::Skip(unused * field.byte_width)),
                    None => {}
                }
            }
        } else if items.len() != capacity {
            return Err(WriteError::ArrayLength {
                field: field.label(),
                expected: capacity,
                actual: items.len(),
            });
        }
    }

    Ok(FieldPlan::new(field, elements))
}

/// Reduces one element to what [Serializer::write] emits.
fn encode_element(field: &FieldDescriptor, value: &Value) -> Result<Element, WriteError> {
    let invalid = || WriteError::InvalidValue(field.label());
    let element = match field.kind {
        NumericKind::Float(FloatPrecision::Single) => {
            let v = value.as_f64().ok_or_else(invalid)?;
            Element::Raw(ieee754::encode_single(v as f32).to_vec())
        }
        NumericKind::Float(FloatPrecision::Double) => {
            let v = value.as_f64().ok_or_else(invalid)?;
            Element::Raw(ieee754::encode_double(v).to_vec())
        }
        NumericKind::Integer => {
            let v = value.as_i128().ok_or_else(invalid)?;
            check_range(v, field.byte_width * 8, field.signed)?;
            if field.signed {
                Element::Raw(bits::twos_complement_bytes(v as i64, field.byte_width))
            } else {
                Element::Magnitude(v as u64)
            }
        }
    };
    Ok(element)
}
