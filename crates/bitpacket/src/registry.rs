//! Registry: the pattern and transform catalogs a parser or serializer is bound to.
//!
//! A registry owns one layer of each catalog plus a caller-supplied context.
//! [Registry::derive] stacks a fresh layer on top, so names registered on the
//! child never leak into the parent. Every [Parser] and [Serializer] built
//! from a registry gets such a child.

use std::sync::Arc;

use tracing::debug;

use crate::{
    catalog::Catalog,
    def::{self, JsonCompiler},
    errors::{CompileError, LookupError, RegistryError},
    field::FieldDescriptor,
    parser::Parser,
    pattern::{Compile, Pattern},
    serializer::Serializer,
    transform::{self, Direction, TransformError, TransformFn},
    value::Value,
};

/// How a caller names the pattern to decode or encode.
#[derive(Debug, Clone)]
pub enum PatternRef<'a> {
    /// A name registered in this registry or one of its parents.
    Name(&'a str),
    /// An inline definition, compiled on demand.
    Spec(&'a str),
    Compiled(Pattern),
}

impl<'a> From<&'a str> for PatternRef<'a> {
    fn from(name: &'a str) -> Self {
        PatternRef::Name(name)
    }
}

impl From<Pattern> for PatternRef<'_> {
    fn from(pattern: Pattern) -> Self {
        PatternRef::Compiled(pattern)
    }
}

impl From<&Pattern> for PatternRef<'_> {
    fn from(pattern: &Pattern) -> Self {
        PatternRef::Compiled(pattern.clone())
    }
}

pub struct Registry<C = ()> {
    patterns: Arc<Catalog<Pattern>>,
    transforms: Arc<Catalog<TransformFn>>,
    compiler: Arc<dyn Compile>,
    context: C,
}

impl Default for Registry<()> {
    fn default() -> Self {
        Registry::new(())
    }
}

impl<C> Registry<C> {
    /// A root registry with the built-in transforms and the JSON compiler.
    pub fn new(context: C) -> Self {
        Self::with_compiler(context, JsonCompiler)
    }

    pub fn with_compiler(context: C, compiler: impl Compile + 'static) -> Self {
        Registry {
            patterns: Arc::new(Catalog::new()),
            transforms: Arc::new(Catalog::layered(Arc::new(transform::builtins()))),
            compiler: Arc::new(compiler),
            context,
        }
    }

    /// Compiles `spec` with the bound compiler and stores it under `name`.
    pub fn register_pattern(&mut self, name: impl Into<String>, spec: &str) -> Result<(), CompileError> {
        let pattern = self.compiler.compile(spec)?;
        self.register_compiled(name, pattern);
        Ok(())
    }

    pub fn register_compiled(&mut self, name: impl Into<String>, pattern: Pattern) {
        let name = name.into();
        debug!(name = %name, fields = pattern.len(), "registered pattern");
        Arc::make_mut(&mut self.patterns).insert(name, pattern);
    }

    /// Registers every pattern of a JSON catalog document. Nothing is
    /// registered if any pattern fails to compile.
    pub fn register_catalog(&mut self, json: &str) -> Result<usize, CompileError> {
        let patterns = def::compile_catalog(json)?;
        let count = patterns.len();
        for (name, pattern) in patterns {
            self.register_compiled(name, pattern);
        }
        Ok(count)
    }

    pub fn register_transform<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(Direction, &FieldDescriptor, Value, &[Value]) -> Result<Value, TransformError> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(name = %name, "registered transform");
        Arc::make_mut(&mut self.transforms).insert(name, transform::transform_fn(f));
    }

    pub fn has_pattern(&self, name: &str) -> bool {
        self.patterns.contains(name)
    }

    pub fn has_transform(&self, name: &str) -> bool {
        self.transforms.contains(name)
    }

    /// Looks up or compiles a pattern. Alternation widths are checked here as
    /// well, since compiled patterns may come from any [Compile] impl.
    pub fn resolve(&self, pattern: PatternRef<'_>) -> Result<Pattern, RegistryError> {
        let pattern = match pattern {
            PatternRef::Name(name) => self
                .patterns
                .get(name)
                .cloned()
                .ok_or_else(|| LookupError::UnknownPattern(name.to_string()))?,
            PatternRef::Spec(spec) => self.compiler.compile(spec)?,
            PatternRef::Compiled(pattern) => pattern,
        };
        pattern.check_alternation()?;
        Ok(pattern)
    }

    /// Fails on the first transform named by `pattern`, branches included,
    /// that no catalog layer provides.
    pub fn check_transforms(&self, pattern: &Pattern) -> Result<(), LookupError> {
        let mut missing = None;
        pattern.visit(&mut |field| {
            if missing.is_none() {
                missing = field
                    .pipeline
                    .iter()
                    .find(|call| !self.transforms.contains(&call.name))
                    .map(|call| call.name.clone());
            }
        });

        match missing {
            Some(name) => Err(LookupError::UnknownTransform(name)),
            None => Ok(()),
        }
    }

    /// Runs `field`'s pipeline against this registry's transforms.
    pub fn pipeline(&self, direction: Direction, field: &FieldDescriptor, value: Value) -> Result<Value, TransformError> {
        transform::run_pipeline(&self.transforms, direction, field, value)
    }

    /// A child registry layered over this one, carrying its own context.
    pub fn derive<D>(&self, context: D) -> Registry<D> {
        Registry {
            patterns: Arc::new(Catalog::layered(Arc::clone(&self.patterns))),
            transforms: Arc::new(Catalog::layered(Arc::clone(&self.transforms))),
            compiler: Arc::clone(&self.compiler),
            context,
        }
    }

    pub fn parser<D>(&self, context: D) -> Parser<D> {
        Parser::new(self.derive(context))
    }

    pub fn serializer<D>(&self, context: D) -> Serializer<D> {
        Serializer::new(self.derive(context))
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut C {
        &mut self.context
    }

    pub fn into_context(self) -> C {
        self.context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::TransformCall;

    const HEADER: &str = r#"{ "fields": [ { "name": "type", "bits": 8 }, { "name": "length", "bits": 16 } ] }"#;

    #[test]
    fn test_register_and_resolve_by_name() {
        let mut registry = Registry::default();
        registry.register_pattern("header", HEADER).unwrap();

        let pattern = registry.resolve("header".into()).unwrap();
        assert_eq!(pattern.len(), 2);
        assert!(registry.has_pattern("header"));
    }

    #[test]
    fn test_resolve_inline_and_compiled() {
        let registry = Registry::default();
        assert_eq!(registry.resolve(PatternRef::Spec(HEADER)).unwrap().len(), 2);

        let compiled = Pattern::new(vec![FieldDescriptor::new(8)]);
        assert_eq!(registry.resolve((&compiled).into()).unwrap(), compiled);
    }

    #[test]
    fn test_resolve_unknown_name() {
        let registry = Registry::default();
        assert_eq!(
            registry.resolve("nope".into()),
            Err(RegistryError::Lookup(LookupError::UnknownPattern("nope".to_string())))
        );
    }

    #[test]
    fn test_resolve_bad_inline_spec() {
        let registry = Registry::default();
        assert!(matches!(
            registry.resolve(PatternRef::Spec("{ not json")),
            Err(RegistryError::Compile(CompileError::Syntax(_)))
        ));
    }

    #[test]
    fn test_resolve_rejects_narrow_branch() {
        let branch = crate::field::Branch {
            read: crate::field::ReadCondition { min: 0, max: 0xffff, mask: 0 },
            write: crate::field::WriteCondition { min: 0, max: 0xffff },
            pattern: Pattern::new(vec![FieldDescriptor::new(8)]),
        };
        let pattern = Pattern::new(vec![FieldDescriptor::new(16).named("tag").alternate(vec![branch])]);

        let registry = Registry::default();
        assert_eq!(
            registry.resolve(pattern.into()),
            Err(RegistryError::Compile(CompileError::InvalidAlternation("tag".to_string())))
        );
    }

    #[test]
    fn test_derived_registry_does_not_leak_upward() {
        let mut parent = Registry::default();
        parent.register_pattern("header", HEADER).unwrap();

        let mut child = parent.derive("child context");
        child.register_compiled("local", Pattern::new(vec![FieldDescriptor::new(8)]));
        child.register_transform("noop", |_, _, value, _| Ok(value));

        assert!(child.has_pattern("header"));
        assert!(child.has_pattern("local"));
        assert!(child.has_transform("noop"));
        assert!(child.has_transform("ascii"));
        assert!(!parent.has_pattern("local"));
        assert!(!parent.has_transform("noop"));
        assert_eq!(*child.context(), "child context");
    }

    #[test]
    fn test_child_sees_parent_as_of_derivation() {
        let mut parent = Registry::default();
        let child = parent.derive(());
        parent.register_pattern("late", HEADER).unwrap();

        assert!(parent.has_pattern("late"));
        assert!(!child.has_pattern("late"));
    }

    #[test]
    fn test_check_transforms_descends_into_branches() {
        let branch = crate::field::Branch {
            read: crate::field::ReadCondition { min: 0, max: 0, mask: 0 },
            write: crate::field::WriteCondition { min: 0, max: 0 },
            pattern: Pattern::new(vec![
                FieldDescriptor::new(8).transform(TransformCall::new("missing", Vec::new())),
            ]),
        };
        let pattern = Pattern::new(vec![FieldDescriptor::new(8).alternate(vec![branch])]);

        let registry = Registry::default();
        assert_eq!(
            registry.check_transforms(&pattern),
            Err(LookupError::UnknownTransform("missing".to_string()))
        );
    }

    #[test]
    fn test_register_catalog() {
        let mut registry = Registry::default();
        let count = registry
            .register_catalog(
                r#"{ "patterns": {
                    "ping": { "fields": [ { "name": "seq", "bits": 32 } ] },
                    "pong": { "fields": [ { "name": "seq", "bits": 32 }, { "name": "rtt", "bits": 16 } ] }
                } }"#,
            )
            .unwrap();

        assert_eq!(count, 2);
        assert!(registry.has_pattern("ping"));
        assert!(registry.has_pattern("pong"));
    }

    #[test]
    fn test_custom_transform_runs_in_pipeline() {
        let mut registry = Registry::default();
        registry.register_transform("double", |direction, _, value, _| {
            let v = value.as_u64().ok_or(TransformError::InvalidType)?;
            Ok(Value::U64(match direction {
                Direction::Decode => v * 2,
                Direction::Encode => v / 2,
            }))
        });

        let field = FieldDescriptor::new(8).transform(TransformCall::new("double", Vec::new()));
        assert_eq!(registry.pipeline(Direction::Decode, &field, Value::U64(21)), Ok(Value::U64(42)));
        assert_eq!(registry.pipeline(Direction::Encode, &field, Value::U64(42)), Ok(Value::U64(21)));
    }

    #[test]
    fn test_closure_compiler() {
        let registry = Registry::with_compiler((), |spec: &str| -> Result<Pattern, CompileError> {
            let bits: usize = spec.parse().map_err(|_| CompileError::Syntax(spec.to_string()))?;
            Ok(Pattern::new(vec![FieldDescriptor::new(bits)]))
        });

        let pattern = registry.resolve(PatternRef::Spec("16")).unwrap();
        assert_eq!(pattern.fields()[0].byte_width, 2);
    }
}
