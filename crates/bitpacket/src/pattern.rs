//! Pattern: a compiled, immutable sequence of field descriptors.

use std::{ops::Deref, sync::Arc};

use crate::{
    errors::CompileError,
    field::{FieldDescriptor, Repeat},
};

/// A compiled packet layout. Cloning is cheap; the descriptors are shared.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Pattern {
    fields: Arc<[FieldDescriptor]>,
}

impl Pattern {
    pub fn new(fields: Vec<FieldDescriptor>) -> Self {
        Pattern {
            fields: fields.into(),
        }
    }

    /// Fields in definition order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Shared references to every field, for splicing into a session.
    pub(crate) fn refs(&self) -> impl DoubleEndedIterator<Item = FieldRef> + '_ {
        (0..self.fields.len()).map(|index| FieldRef {
            pattern: self.clone(),
            index,
        })
    }

    /// Visits every field reachable from this pattern, including alternation branches.
    pub(crate) fn visit(&self, f: &mut impl FnMut(&FieldDescriptor)) {
        for field in self.fields.iter() {
            f(field);
            for branch in &field.alternation {
                branch.pattern.visit(f);
            }
        }
    }

    /// Every alternation branch, nested ones included, must decode at least
    /// as many bytes as its discriminant before anything of variable length,
    /// so that the discriminant bytes replayed into the branch are all used.
    pub fn check_alternation(&self) -> Result<(), CompileError> {
        let mut narrow = None;
        self.visit(&mut |field| {
            if narrow.is_none()
                && field
                    .alternation
                    .iter()
                    .any(|branch| guaranteed_width(branch.pattern.fields()) < field.byte_width)
            {
                narrow = Some(field.label());
            }
        });

        match narrow {
            Some(name) => Err(CompileError::InvalidAlternation(name)),
            None => Ok(()),
        }
    }
}

/// Bytes any decode of `fields` is certain to consume.
fn guaranteed_width(fields: &[FieldDescriptor]) -> usize {
    let mut width = 0usize;
    let mut after_length = false;

    for field in fields {
        let elements = if after_length {
            0
        } else if let Some(terminator) = &field.terminator {
            terminator.len()
        } else {
            match field.repeat {
                Repeat::Fixed(count) => count,
                Repeat::Unbounded => return usize::MAX,
            }
        };
        width = width.saturating_add(elements.saturating_mul(field.byte_width));
        after_length = field.length_encoded;
    }

    width
}

impl From<Vec<FieldDescriptor>> for Pattern {
    fn from(fields: Vec<FieldDescriptor>) -> Self {
        Pattern::new(fields)
    }
}

impl FromIterator<FieldDescriptor> for Pattern {
    fn from_iter<T: IntoIterator<Item = FieldDescriptor>>(iter: T) -> Self {
        Pattern::new(iter.into_iter().collect())
    }
}

/// A field inside a shared pattern. Sessions hold these instead of copies so
/// that splicing an alternation branch never clones descriptors.
#[derive(Debug, Clone)]
pub(crate) struct FieldRef {
    pattern: Pattern,
    index: usize,
}

impl Deref for FieldRef {
    type Target = FieldDescriptor;

    fn deref(&self) -> &FieldDescriptor {
        &self.pattern.fields[self.index]
    }
}

/// Turns a textual layout description into a [Pattern].
pub trait Compile: Send + Sync {
    fn compile(&self, spec: &str) -> Result<Pattern, CompileError>;
}

impl<F> Compile for F
where
    F: Fn(&str) -> Result<Pattern, CompileError> + Send + Sync,
{
    fn compile(&self, spec: &str) -> Result<Pattern, CompileError> {
        self(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{Branch, ReadCondition, WriteCondition};

    #[test]
    fn test_refs_share_descriptors() {
        let pattern = Pattern::new(vec![FieldDescriptor::new(8).named("a"), FieldDescriptor::new(16)]);
        let refs: Vec<FieldRef> = pattern.refs().collect();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].name.as_deref(), Some("a"));
        assert_eq!(refs[1].byte_width, 2);
    }

    #[test]
    fn test_visit_descends_into_branches() {
        let branch = Branch {
            read: ReadCondition { min: 0, max: 255, mask: 0 },
            write: WriteCondition { min: 0, max: 255 },
            pattern: Pattern::new(vec![FieldDescriptor::new(8).named("inner")]),
        };
        let pattern = Pattern::new(vec![FieldDescriptor::new(8).alternate(vec![branch])]);

        let mut names = Vec::new();
        pattern.visit(&mut |f| names.push(f.name.clone()));
        assert_eq!(names, vec![None, Some("inner".to_string())]);
    }

    fn alternation(bits: usize, branch_fields: Vec<FieldDescriptor>) -> Pattern {
        let branch = Branch {
            read: ReadCondition { min: 0, max: u64::MAX, mask: 0 },
            write: WriteCondition { min: 0, max: u64::MAX },
            pattern: Pattern::new(branch_fields),
        };
        Pattern::new(vec![FieldDescriptor::new(bits).named("kind").alternate(vec![branch])])
    }

    #[test]
    fn test_check_alternation_width() {
        assert!(alternation(16, vec![FieldDescriptor::new(8), FieldDescriptor::new(8)]).check_alternation().is_ok());
        assert!(alternation(16, vec![FieldDescriptor::new(32)]).check_alternation().is_ok());
        assert_eq!(
            alternation(16, vec![FieldDescriptor::new(8)]).check_alternation(),
            Err(CompileError::InvalidAlternation("kind".to_string()))
        );
        // a length field may announce zero elements
        assert!(
            alternation(16, vec![
                FieldDescriptor::new(8).length_encoded(),
                FieldDescriptor::new(8).array(Repeat::Unbounded),
            ])
            .check_alternation()
            .is_err()
        );
        assert!(
            alternation(16, vec![FieldDescriptor::new(8).array(Repeat::Unbounded).terminated(vec![0, 0])])
                .check_alternation()
                .is_ok()
        );
    }

    #[test]
    fn test_check_alternation_nested() {
        let inner = alternation(16, vec![FieldDescriptor::new(8)]).fields()[0].clone();
        let outer = alternation(8, vec![inner]);
        assert_eq!(
            outer.check_alternation(),
            Err(CompileError::InvalidAlternation("kind".to_string()))
        );
    }

    #[test]
    fn test_closure_compiler() {
        let compiler = |_: &str| -> Result<Pattern, CompileError> { Ok(Pattern::new(vec![FieldDescriptor::new(8)])) };
        assert_eq!(compiler.compile("anything").unwrap().len(), 1);
    }
}
