//! Layered name catalogs.
//!
//! A catalog owns its local entries and optionally points at a parent layer.
//! Lookups check the local entries first and then delegate upward; inserting
//! never touches the parent. Layers are shared through [Arc], so a parent that
//! is registered into after a child was derived is copied on write and the
//! child keeps seeing the parent as it was.

use std::{collections::HashMap, sync::Arc};

#[derive(Debug, Clone)]
pub struct Catalog<T> {
    entries: HashMap<String, T>,
    parent: Option<Arc<Catalog<T>>>,
}

impl<T> Default for Catalog<T> {
    fn default() -> Self {
        Catalog {
            entries: HashMap::new(),
            parent: None,
        }
    }
}

impl<T> Catalog<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty layer on top of `parent`.
    pub fn layered(parent: Arc<Catalog<T>>) -> Self {
        Catalog {
            entries: HashMap::new(),
            parent: Some(parent),
        }
    }

    /// Adds or overrides an entry in this layer only.
    pub fn insert(&mut self, name: impl Into<String>, entry: T) {
        self.entries.insert(name.into(), entry);
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.entries
            .get(name)
            .or_else(|| self.parent.as_deref().and_then(|parent| parent.get(name)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Number of layers, this one included.
    pub fn depth(&self) -> usize {
        1 + self.parent.as_deref().map_or(0, Catalog::depth)
    }
}
