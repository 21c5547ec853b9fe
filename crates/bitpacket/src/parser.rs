//! Resumable decode engine.
//!
//! A [Parser] is armed with a pattern and then fed byte spans of any size.
//! All progress lives in the parser between calls to [Parser::feed], so a
//! packet may arrive one byte at a time. When the last field completes the
//! completion callback receives the decoded [Record]; it may re-arm the
//! parser, in which case the rest of the span is decoded against the new
//! pattern.

use std::mem;

use tracing::{debug, trace};

use crate::{
    bits,
    errors::ReadError,
    field::{Endianness, FieldDescriptor, FloatPrecision, NumericKind},
    ieee754,
    pattern::FieldRef,
    registry::{PatternRef, Registry},
    transform::Direction,
    value::{Record, Value},
};

/// Invoked once per decoded packet.
pub type ParseCallback<C> = Box<dyn FnOnce(&mut Parser<C>, Record) + Send>;

pub struct Parser<C = ()> {
    registry: Registry<C>,
    session: Option<ParseSession>,
    callback: Option<ParseCallback<C>>,
    bytes_consumed: usize,
}

/// Decode progress for one armed pattern.
#[derive(Debug, Default)]
struct ParseSession {
    /// Remaining layout; alternation branches are spliced in place.
    fields: Vec<FieldRef>,
    field_index: usize,
    /// Element count of the current field.
    repeat: usize,
    /// Element index within the current field.
    index: usize,
    /// Bytes left to skip for filler or for array capacity after a terminator.
    skipping: Option<usize>,
    terminated: bool,
    /// Bytes of the current element, wire order, for exploded fields.
    raw: Vec<u8>,
    magnitude: u64,
    /// Byte offset within the current element.
    offset: usize,
    arrayed: Vec<Value>,
    scalar: Option<Value>,
    /// Bytes consumed by an alternation field, replayed against the branch.
    discriminant: Vec<u8>,
    /// Element count set by a length-encoded field for its successor.
    pending_repeat: Option<usize>,
    entries: Vec<(Option<String>, Value)>,
}

impl<C> Parser<C> {
    pub fn new(registry: Registry<C>) -> Self {
        Parser {
            registry,
            session: None,
            callback: None,
            bytes_consumed: 0,
        }
    }

    /// Selects the pattern to decode next, discarding any progress.
    ///
    /// Every transform the pattern names is resolved here, so a pattern that
    /// arms successfully never fails a lookup mid-stream. An empty pattern
    /// completes immediately.
    pub fn arm<'a, F>(&mut self, pattern: impl Into<PatternRef<'a>>, on_complete: F) -> Result<(), ReadError>
    where
        F: FnOnce(&mut Parser<C>, Record) + Send + 'static,
    {
        self.session = None;
        self.callback = None;

        let pattern = self.registry.resolve(pattern.into())?;
        self.registry.check_transforms(&pattern)?;
        debug!(pattern_len = pattern.len(), "parser armed");

        self.session = Some(ParseSession {
            fields: pattern.refs().collect(),
            ..Default::default()
        });
        self.callback = Some(Box::new(on_complete));
        self.begin_or_finish();
        Ok(())
    }

    /// Decodes as much of `bytes` as the armed pattern needs and returns the
    /// number of bytes consumed.
    ///
    /// Fewer than `bytes.len()` are consumed only when the packet completes
    /// and the callback does not re-arm. An error discards the session.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<usize, ReadError> {
        self.decode(bytes, true)
    }

    /// Runs the decode loop over `bytes`. Replayed discriminant bytes were
    /// counted when first fed and pass `counted = false`.
    fn decode(&mut self, bytes: &[u8], counted: bool) -> Result<usize, ReadError> {
        let mut offset = 0;

        while offset < bytes.len() {
            let Some(session) = self.session.as_mut() else {
                break;
            };

            if let Some(remaining) = session.skipping {
                let advance = remaining.min(bytes.len() - offset);
                offset += advance;
                if counted {
                    self.bytes_consumed += advance;
                }
                if advance < remaining {
                    session.skipping = Some(remaining - advance);
                    break;
                }
                session.skipping = None;
            } else {
                let mut complete = false;
                while offset < bytes.len() {
                    let byte = bytes[offset];
                    offset += 1;
                    if counted {
                        self.bytes_consumed += 1;
                    }
                    if session.accept(byte) {
                        complete = true;
                        break;
                    }
                }
                if !complete {
                    break;
                }

                session.store_element();
                if session.match_terminator() {
                    if let Some(padding) = session.terminate() {
                        session.skipping = Some(padding);
                        continue;
                    }
                }
            }

            session.index += 1;
            if session.index < session.repeat {
                session.begin_element();
                continue;
            }

            if let Err(err) = self.complete_field() {
                self.session = None;
                self.callback = None;
                return Err(err);
            }
        }

        Ok(offset)
    }

    fn complete_field(&mut self) -> Result<(), ReadError> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        let field = session.fields[session.field_index].clone();

        if field.is_skip() {
            // filler, nothing to record
        } else if !field.packing.is_empty() {
            let packed = session.take_value().as_u64().unwrap_or(0);
            session.unpack(&field, packed);
        } else if field.length_encoded {
            let count = session.take_value().as_u64().unwrap_or(0) as usize;
            trace!(field = %field.label(), count, "length decoded");
            if count == 0 {
                session.field_index += 1;
                if let Some(next) = session.fields.get(session.field_index).cloned() {
                    let value = self.registry.pipeline(Direction::Decode, &next, Value::Array(Vec::new()))?;
                    session.entries.push((next.name.clone(), value));
                }
            } else {
                session.pending_repeat = Some(count);
            }
        } else if !field.alternation.is_empty() {
            let value = session.take_value().as_u64().unwrap_or(0);
            let Some((branch_index, branch)) = field
                .alternation
                .iter()
                .enumerate()
                .find(|(_, branch)| branch.matches_read(value))
            else {
                return Err(ReadError::StructuralMismatch { value });
            };
            debug!(value, branch = branch_index, "alternation branch selected");

            let replay = mem::take(&mut session.discriminant);
            let index = session.field_index;
            session.fields.splice(index..=index, branch.pattern.refs());
            self.begin_or_finish();
            self.decode(&replay, false)?;
            return Ok(());
        } else {
            let value = session.take_value();
            let value = self.registry.pipeline(Direction::Decode, &field, value)?;
            session.entries.push((field.name.clone(), value));
        }

        trace!(field = %field.label(), "field decoded");
        session.field_index += 1;
        self.begin_or_finish();
        Ok(())
    }

    /// Starts the current field, or hands the record to the callback once no
    /// fields remain.
    fn begin_or_finish(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.field_index < session.fields.len() {
            session.begin_field();
            return;
        }

        let Some(session) = self.session.take() else {
            return;
        };
        let record = Record::build(session.entries);
        debug!(entries = record.len(), bytes = self.bytes_consumed, "packet decoded");
        if let Some(callback) = self.callback.take() {
            callback(self, record);
        }
    }

    /// Zeroes the consumed byte counter.
    pub fn reset(&mut self) {
        self.bytes_consumed = 0;
    }

    /// Bytes consumed since construction or the last [Parser::reset].
    pub fn bytes_consumed(&self) -> usize {
        self.bytes_consumed
    }

    /// True when no pattern is armed or the armed one has completed.
    pub fn is_idle(&self) -> bool {
        self.session.is_none()
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

impl ParseSession {
    fn begin_field(&mut self) {
        let field = &self.fields[self.field_index];
        self.repeat = self.pending_repeat.take().unwrap_or_else(|| field.element_count());
        self.index = 0;
        self.skipping = None;
        self.terminated = field.terminator.is_none();
        self.arrayed.clear();
        self.scalar = None;
        self.discriminant.clear();
        self.begin_element();
    }

    fn begin_element(&mut self) {
        let field = &self.fields[self.field_index];
        if field.is_skip() {
            self.skipping = Some(field.byte_width);
        } else {
            self.raw.clear();
            self.magnitude = 0;
        }
        self.offset = 0;
    }

    /// Takes one byte of the current element; true once the element is complete.
    fn accept(&mut self, byte: u8) -> bool {
        let field = &self.fields[self.field_index];
        if !field.alternation.is_empty() {
            self.discriminant.push(byte);
        }

        if field.exploded() {
            self.raw.push(byte);
        } else {
            let weight = match field.endianness {
                Endianness::Little => self.offset,
                _ => field.byte_width.saturating_sub(1 + self.offset),
            };
            self.magnitude |= bits::shl(byte as u64, weight * 8);
        }

        self.offset += 1;
        self.offset >= field.byte_width
    }

    fn store_element(&mut self) {
        let field = &self.fields[self.field_index];
        let value = if field.exploded() {
            let mut bytes = mem::take(&mut self.raw);
            if field.endianness == Endianness::Little {
                bytes.reverse();
            }
            exploded_value(field, &bytes)
        } else {
            Value::U64(self.magnitude)
        };

        if field.arrayed {
            self.arrayed.push(value);
        } else {
            self.scalar = Some(value);
        }
    }

    /// Strips a terminator from the tail of the array once it appears.
    fn match_terminator(&mut self) -> bool {
        if self.terminated {
            return false;
        }
        let Some(terminator) = self.fields[self.field_index].terminator.as_deref() else {
            return false;
        };
        if terminator.is_empty() || self.arrayed.len() < terminator.len() {
            return false;
        }

        let tail = self.arrayed.len() - terminator.len();
        let matched = self.arrayed[tail..]
            .iter()
            .zip(terminator)
            .all(|(value, byte)| value.as_u64() == Some(*byte as u64));
        if matched {
            self.arrayed.truncate(tail);
            self.terminated = true;
        }
        matched
    }

    /// Ends the array at the current element. Returns the bytes of unused
    /// capacity to skip, if any.
    fn terminate(&mut self) -> Option<usize> {
        let unused = self.repeat.saturating_sub(self.index + 1);
        let width = self.fields[self.field_index].byte_width;
        let bounded = self.repeat != usize::MAX;
        self.repeat = self.index + 1;
        (bounded && unused > 0).then(|| unused * width)
    }

    fn take_value(&mut self) -> Value {
        if self.fields[self.field_index].arrayed {
            Value::Array(mem::take(&mut self.arrayed))
        } else {
            self.scalar.take().unwrap_or(Value::U64(0))
        }
    }

    /// Splits a packed integer into its subfields, most significant first.
    fn unpack(&mut self, field: &FieldDescriptor, packed: u64) {
        let mut remaining = field.bit_width;
        for pack in &field.packing {
            remaining = remaining.saturating_sub(pack.bit_width);
            if pack.is_skip() {
                continue;
            }
            let raw = bits::shr(packed, remaining) & bits::mask(pack.bit_width);
            let value = if pack.signed {
                Value::I64(bits::sign_extend(raw, pack.bit_width))
            } else {
                Value::U64(raw)
            };
            self.entries.push((pack.name.clone(), value));
        }
    }
}

/// Converts the most-significant-first bytes of a float or signed element.
fn exploded_value(field: &FieldDescriptor, bytes: &[u8]) -> Value {
    match field.kind {
        NumericKind::Float(FloatPrecision::Single) => Value::F32(ieee754::decode_single(bytes)),
        NumericKind::Float(FloatPrecision::Double) => Value::F64(ieee754::decode_double(bytes)),
        NumericKind::Integer => Value::I64(bits::sign_extend(bits::fold_be(bytes), bytes.len() * 8)),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::{
        errors::{CompileError, LookupError, RegistryError},
        field::{Branch, ReadCondition, Repeat, TransformCall, WriteCondition},
        pattern::Pattern,
    };

    fn parser() -> Parser<Vec<Record>> {
        Registry::default().parser(Vec::new())
    }

    fn collect(parser: &mut Parser<Vec<Record>>, pattern: impl Into<PatternRef<'static>>) {
        parser
            .arm(pattern, |parser, record| parser.context_mut().push(record))
            .unwrap();
    }

    fn decode(fields: Vec<FieldDescriptor>, bytes: &[u8]) -> (Record, usize) {
        let mut parser = parser();
        collect(&mut parser, Pattern::new(fields));
        let consumed = parser.feed(bytes).unwrap();
        assert_eq!(parser.context().len(), 1, "packet did not complete");
        (parser.context()[0].clone(), consumed)
    }

    fn branch(min: u64, max: u64, fields: Vec<FieldDescriptor>) -> Branch {
        Branch {
            read: ReadCondition { min, max, mask: 0 },
            write: WriteCondition { min, max },
            pattern: Pattern::new(fields),
        }
    }

    #[test]
    fn test_little_endian_unsigned() {
        let (record, consumed) = decode(vec![FieldDescriptor::new(16).little()], &[0x34, 0x12]);
        assert_eq!(record, Record::Positional(vec![Value::U64(0x1234)]));
        assert_eq!(consumed, 2);
    }

    #[test]
    fn test_big_endian_unsigned() {
        let (record, _) = decode(vec![FieldDescriptor::new(32)], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(record, Record::Positional(vec![Value::U64(0x0102_0304)]));
    }

    #[test]
    fn test_signed_byte() {
        let (record, _) = decode(vec![FieldDescriptor::new(8).signed()], &[0xff]);
        assert_eq!(record, Record::Positional(vec![Value::I64(-1)]));
    }

    #[test]
    fn test_signed_little_endian() {
        let (record, _) = decode(vec![FieldDescriptor::new(16).little().signed()], &[0xfe, 0xff]);
        assert_eq!(record, Record::Positional(vec![Value::I64(-2)]));
    }

    #[test]
    fn test_floats() {
        let mut bytes = 1.5f32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&(-0.25f64).to_be_bytes());
        let (record, consumed) = decode(
            vec![FieldDescriptor::new(32).little().float(), FieldDescriptor::new(64).float()],
            &bytes,
        );
        assert_eq!(record, Record::Positional(vec![Value::F32(1.5), Value::F64(-0.25)]));
        assert_eq!(consumed, 12);
    }

    #[test]
    fn test_terminated_array() {
        let field = FieldDescriptor::new(8).array(Repeat::Unbounded).terminated(vec![0]);
        let (record, consumed) = decode(vec![field], &[0x68, 0x69, 0x00, 0x99]);
        assert_eq!(
            record,
            Record::Positional(vec![Value::Array(vec![Value::U64(0x68), Value::U64(0x69)])])
        );
        assert_eq!(consumed, 3);
    }

    #[test]
    fn test_terminated_array_skips_capacity() {
        let fields = vec![
            FieldDescriptor::new(8).array(Repeat::Fixed(5)).terminated(vec![0]),
            FieldDescriptor::new(8),
        ];
        let (record, consumed) = decode(fields, &[0x68, 0x69, 0x00, 0xaa, 0xbb, 0x07]);
        assert_eq!(
            record,
            Record::Positional(vec![
                Value::Array(vec![Value::U64(0x68), Value::U64(0x69)]),
                Value::U64(7),
            ])
        );
        assert_eq!(consumed, 6);
    }

    #[test]
    fn test_multibyte_terminator() {
        let field = FieldDescriptor::new(8).array(Repeat::Unbounded).terminated(vec![0x0d, 0x0a]);
        let (record, consumed) = decode(vec![field], b"ok\r\n");
        assert_eq!(
            record,
            Record::Positional(vec![Value::Array(vec![Value::U64(b'o' as u64), Value::U64(b'k' as u64)])])
        );
        assert_eq!(consumed, 4);
    }

    #[test]
    fn test_length_encoded_array() {
        let fields = vec![
            FieldDescriptor::new(8).length_encoded(),
            FieldDescriptor::new(8).array(Repeat::Unbounded),
        ];
        let (record, consumed) = decode(fields, &[3, 10, 20, 30, 40]);
        assert_eq!(
            record,
            Record::Positional(vec![Value::Array(vec![Value::U64(10), Value::U64(20), Value::U64(30)])])
        );
        assert_eq!(consumed, 4);
    }

    #[test]
    fn test_zero_length_array() {
        let fields = vec![
            FieldDescriptor::new(8).length_encoded(),
            FieldDescriptor::new(8)
                .array(Repeat::Unbounded)
                .named("text")
                .transform(TransformCall::new("ascii", Vec::new())),
            FieldDescriptor::new(8).named("after"),
        ];
        let (record, consumed) = decode(fields, &[0, 9]);

        let mut expected = BTreeMap::new();
        expected.insert("text".to_string(), Value::String(String::new()));
        expected.insert("after".to_string(), Value::U64(9));
        assert_eq!(record, Record::Named(expected));
        assert_eq!(consumed, 2);
    }

    #[test]
    fn test_skip_field() {
        let fields = vec![FieldDescriptor::new(8), FieldDescriptor::skip(24), FieldDescriptor::new(8)];
        let (record, consumed) = decode(fields, &[1, 0xee, 0xee, 0xee, 2]);
        assert_eq!(record, Record::Positional(vec![Value::U64(1), Value::U64(2)]));
        assert_eq!(consumed, 5);
    }

    #[test]
    fn test_packed_fields() {
        let field = FieldDescriptor::new(8).packed(vec![
            FieldDescriptor::new(3).named("a"),
            FieldDescriptor::new(4).named("b"),
            FieldDescriptor::new(1).named("c"),
        ]);
        // 101 0110 1
        let (record, _) = decode(vec![field], &[0b1010_1101]);
        assert_eq!(record.get("a"), Some(&Value::U64(0b101)));
        assert_eq!(record.get("b"), Some(&Value::U64(0b0110)));
        assert_eq!(record.get("c"), Some(&Value::U64(1)));
    }

    #[test]
    fn test_packed_signed_and_skip() {
        let field = FieldDescriptor::new(16).packed(vec![
            FieldDescriptor::new(4).signed(),
            FieldDescriptor::skip(4),
            FieldDescriptor::new(8),
        ]);
        let (record, _) = decode(vec![field], &[0xf5, 0x42]);
        assert_eq!(record, Record::Positional(vec![Value::I64(-1), Value::U64(0x42)]));
    }

    #[test]
    fn test_alternation_selects_branch() {
        let pattern = || {
            vec![FieldDescriptor::new(8).alternate(vec![
                branch(0, 0x7f, vec![FieldDescriptor::new(8).named("short")]),
                branch(0x80, 0xff, vec![FieldDescriptor::new(16).named("long")]),
            ])]
        };

        let (record, consumed) = decode(pattern(), &[0x05]);
        assert_eq!(record.get("short"), Some(&Value::U64(5)));
        assert_eq!(record.get("long"), None);
        assert_eq!(consumed, 1);

        let (record, consumed) = decode(pattern(), &[0x80, 0x01]);
        assert_eq!(record.get("long"), Some(&Value::U64(0x8001)));
        assert_eq!(record.get("short"), None);
        assert_eq!(consumed, 2);
    }

    #[test]
    fn test_alternation_with_mask() {
        let mut flagged = branch(0, 0xff, vec![FieldDescriptor::new(8).named("flagged"), FieldDescriptor::new(8)]);
        flagged.read.mask = 0x80;
        let field = FieldDescriptor::new(8).alternate(vec![
            flagged,
            branch(0, 0xff, vec![FieldDescriptor::new(8).named("plain")]),
        ]);

        let (record, consumed) = decode(vec![field.clone()], &[0x81, 0x02]);
        assert_eq!(record.get("flagged"), Some(&Value::U64(0x81)));
        assert_eq!(record.get("field2"), Some(&Value::U64(2)));
        assert_eq!(consumed, 2);

        let (record, _) = decode(vec![field], &[0x01]);
        assert_eq!(record.get("plain"), Some(&Value::U64(1)));
    }

    #[test]
    fn test_alternation_mismatch_discards_session() {
        let field = FieldDescriptor::new(8).alternate(vec![branch(1, 2, vec![FieldDescriptor::new(8)])]);
        let mut parser = parser();
        collect(&mut parser, Pattern::new(vec![field]));

        assert_eq!(parser.feed(&[9]), Err(ReadError::StructuralMismatch { value: 9 }));
        assert!(parser.is_idle());
        assert!(parser.context().is_empty());
    }

    #[test]
    fn test_named_record_numbers_anonymous_entries() {
        let fields = vec![FieldDescriptor::new(8), FieldDescriptor::new(8).named("b"), FieldDescriptor::new(8)];
        let (record, _) = decode(fields, &[1, 2, 3]);
        let Record::Named(map) = record else {
            panic!("expected a named record");
        };
        assert_eq!(map.get("field1"), Some(&Value::U64(1)));
        assert_eq!(map.get("b"), Some(&Value::U64(2)));
        assert_eq!(map.get("field3"), Some(&Value::U64(3)));
    }

    #[test]
    fn test_pipeline_applied_on_decode() {
        let field = FieldDescriptor::new(8)
            .array(Repeat::Unbounded)
            .terminated(vec![0])
            .transform(TransformCall::new("ascii", Vec::new()))
            .transform(TransformCall::new("atoi", vec![Value::U64(10)]));
        let (record, _) = decode(vec![field], b"1234\0");
        assert_eq!(record, Record::Positional(vec![Value::U64(1234)]));
    }

    #[test]
    fn test_split_feeds_match_single_feed() {
        let fields = vec![
            FieldDescriptor::new(16).little(),
            FieldDescriptor::skip(16),
            FieldDescriptor::new(8).length_encoded(),
            FieldDescriptor::new(16).signed().array(Repeat::Unbounded),
            FieldDescriptor::new(8).array(Repeat::Unbounded).terminated(vec![0]),
            FieldDescriptor::new(32).float(),
        ];
        let mut bytes = vec![0x34, 0x12, 0, 0, 2, 0xff, 0xfe, 0x00, 0x01, b'h', b'i', 0];
        bytes.extend_from_slice(&2.5f32.to_be_bytes());

        let (expected, consumed) = decode(fields.clone(), &bytes);
        assert_eq!(consumed, bytes.len());

        for split in 0..=bytes.len() {
            let mut parser = parser();
            collect(&mut parser, Pattern::new(fields.clone()));
            let (head, tail) = bytes.split_at(split);
            let consumed = parser.feed(head).unwrap() + parser.feed(tail).unwrap();
            assert_eq!(consumed, bytes.len(), "split at {split}");
            assert_eq!(parser.context().as_slice(), [expected.clone()], "split at {split}");
        }

        let mut parser = parser();
        collect(&mut parser, Pattern::new(fields));
        for byte in &bytes {
            parser.feed(std::slice::from_ref(byte)).unwrap();
        }
        assert_eq!(parser.context().as_slice(), [expected]);
    }

    #[test]
    fn test_alternation_split_across_feeds() {
        let field = FieldDescriptor::new(16).alternate(vec![branch(
            0,
            0xffff,
            vec![FieldDescriptor::new(8).named("hi"), FieldDescriptor::new(8).named("lo")],
        )]);
        let mut parser = parser();
        collect(&mut parser, Pattern::new(vec![field]));

        assert_eq!(parser.feed(&[0xab]).unwrap(), 1);
        assert!(parser.context().is_empty());
        assert_eq!(parser.feed(&[0xcd, 0xef]).unwrap(), 1);
        assert_eq!(parser.bytes_consumed(), 2);
        assert_eq!(parser.context()[0].get("hi"), Some(&Value::U64(0xab)));
        assert_eq!(parser.context()[0].get("lo"), Some(&Value::U64(0xcd)));
    }

    #[test]
    fn test_reset_between_discriminant_bytes() {
        let field = FieldDescriptor::new(16).alternate(vec![branch(
            0,
            0xffff,
            vec![FieldDescriptor::new(8).named("hi"), FieldDescriptor::new(8).named("lo")],
        )]);
        let mut parser = parser();
        collect(&mut parser, Pattern::new(vec![field]));

        assert_eq!(parser.feed(&[0xab]).unwrap(), 1);
        parser.reset();
        assert_eq!(parser.feed(&[0xcd]).unwrap(), 1);
        assert_eq!(parser.bytes_consumed(), 1);
        assert_eq!(parser.context()[0].get("hi"), Some(&Value::U64(0xab)));
        assert_eq!(parser.context()[0].get("lo"), Some(&Value::U64(0xcd)));
    }

    #[test]
    fn test_arm_rejects_branch_narrower_than_discriminant() {
        let field = FieldDescriptor::new(16)
            .named("kind")
            .alternate(vec![branch(0, 0xffff, vec![FieldDescriptor::new(8).named("only")])]);
        let mut parser = parser();
        assert_eq!(
            parser.arm(Pattern::new(vec![field]), |_, _| {}),
            Err(ReadError::Registry(RegistryError::Compile(CompileError::InvalidAlternation(
                "kind".to_string()
            ))))
        );
    }

    #[test]
    fn test_stops_after_packet_without_rearm() {
        let mut parser = parser();
        collect(&mut parser, Pattern::new(vec![FieldDescriptor::new(8)]));
        assert_eq!(parser.feed(&[1, 2, 3]).unwrap(), 1);
        assert!(parser.is_idle());
        assert_eq!(parser.feed(&[2, 3]).unwrap(), 0);
    }

    #[test]
    fn test_callback_rearms_within_same_feed() {
        fn rearm(parser: &mut Parser<Vec<Record>>, record: Record) {
            parser.context_mut().push(record);
            if parser.context().len() < 3 {
                parser.arm("byte", rearm).unwrap();
            }
        }

        let mut registry = Registry::default();
        registry.register_compiled("byte", Pattern::new(vec![FieldDescriptor::new(8)]));
        let mut parser = registry.parser(Vec::new());
        parser.arm("byte", rearm).unwrap();

        assert_eq!(parser.feed(&[1, 2, 3, 4]).unwrap(), 3);
        assert_eq!(
            parser.context().as_slice(),
            [
                Record::Positional(vec![Value::U64(1)]),
                Record::Positional(vec![Value::U64(2)]),
                Record::Positional(vec![Value::U64(3)]),
            ]
        );
    }

    #[test]
    fn test_arm_unknown_pattern() {
        let mut parser = parser();
        let result = parser.arm("missing", |_, _| {});
        assert_eq!(
            result,
            Err(ReadError::Registry(RegistryError::Lookup(LookupError::UnknownPattern(
                "missing".to_string()
            ))))
        );
        assert!(parser.is_idle());
    }

    #[test]
    fn test_arm_unknown_transform() {
        let field = FieldDescriptor::new(8).transform(TransformCall::new("rot13", Vec::new()));
        let mut parser = parser();
        let result = parser.arm(Pattern::new(vec![field]), |_, _| {});
        assert_eq!(
            result,
            Err(ReadError::Lookup(LookupError::UnknownTransform("rot13".to_string())))
        );
    }

    #[test]
    fn test_empty_pattern_completes_on_arm() {
        let mut parser = parser();
        collect(&mut parser, Pattern::default());
        assert_eq!(parser.context().as_slice(), [Record::Positional(Vec::new())]);
        assert!(parser.is_idle());
    }

    #[test]
    fn test_reset_counter() {
        let mut parser = parser();
        collect(&mut parser, Pattern::new(vec![FieldDescriptor::new(16)]));
        parser.feed(&[0, 1]).unwrap();
        assert_eq!(parser.bytes_consumed(), 2);
        parser.reset();
        assert_eq!(parser.bytes_consumed(), 0);
    }
}
