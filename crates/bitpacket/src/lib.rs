//! # bitpacket
//!
//! Incremental parsing and serialization of binary packets described by
//! declarative patterns.
//!
//! A pattern is an ordered list of fields: integers and floats of any byte
//! width and either byte order, filler, arrays bounded by a count, a
//! terminator or a preceding length field, bit-packed subfields, and
//! alternations that pick a layout from a discriminant value. Patterns are
//! registered by name in a [Registry], which hands out [Parser]s and
//! [Serializer]s. Both engines can be fed or drained in spans of any size and
//! pick up exactly where they stopped.
//!
//! ## Example
//!
//! ```
//! use bitpacket::{Record, Registry, Value};
//!
//! let mut registry = Registry::default();
//! registry
//!     .register_pattern(
//!         "header",
//!         r#"{ "fields": [
//!             { "name": "kind", "bits": 8 },
//!             { "name": "length", "bits": 16, "endianness": "little" }
//!         ] }"#,
//!     )
//!     .unwrap();
//!
//! let mut parser = registry.parser(Vec::new());
//! parser
//!     .arm("header", |parser, record| parser.context_mut().push(record))
//!     .unwrap();
//!
//! // The packet may arrive in pieces.
//! parser.feed(&[0x01, 0x34]).unwrap();
//! parser.feed(&[0x12]).unwrap();
//!
//! let record: &Record = &parser.context()[0];
//! assert_eq!(record.get("kind"), Some(&Value::U64(1)));
//! assert_eq!(record.get("length"), Some(&Value::U64(0x1234)));
//!
//! let mut serializer = registry.serializer(());
//! serializer
//!     .arm_record("header", record.clone(), |_| {})
//!     .unwrap();
//! let mut buffer = [0u8; 3];
//! assert_eq!(serializer.write(&mut buffer), 3);
//! assert_eq!(buffer, [0x01, 0x34, 0x12]);
//! ```

pub mod bits;
pub mod catalog;
pub mod def;
pub mod errors;
pub mod field;
pub mod ieee754;
pub mod parser;
pub mod pattern;
pub mod registry;
pub mod serializer;
pub mod transform;
pub mod value;

pub use errors::{CompileError, LookupError, ReadError, RegistryError, WriteError};
pub use field::{Branch, Endianness, FieldDescriptor, ReadCondition, Repeat, TransformCall, WriteCondition};
pub use parser::Parser;
pub use pattern::{Compile, Pattern};
pub use registry::{PatternRef, Registry};
pub use serializer::Serializer;
pub use transform::{Direction, TransformError};
pub use value::{Record, Value};
