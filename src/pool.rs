//! Symbol pool: the per-pass registry of class representations.
//!
//! Classes are loaded from the configured sources the first time a name is
//! resolved and then shared by handle. Each class sits behind its own lock so
//! that one class can be mutated while others are being read. Callers never
//! hold two class locks at once.

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::class::{ClassHeader, CompiledClass, FieldDescriptor};
use crate::error::{WeaveError, WeaveResult};
use crate::source::ClassSource;

pub type ClassHandle = Arc<RwLock<CompiledClass>>;

/// A field found by walking up from the class an access names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedField {
    pub declaring_class: String,
    pub field: FieldDescriptor,
}

#[derive(Default)]
pub struct SymbolPool {
    sources: Vec<Box<dyn ClassSource>>,
    classes: RwLock<HashMap<String, ClassHandle>>,
    missing: RwLock<HashSet<String>>,
}

impl SymbolPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sources are consulted in the order they were added.
    pub fn with_source(mut self, source: impl ClassSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    pub fn add_source(&mut self, source: Box<dyn ClassSource>) {
        self.sources.push(source);
    }

    /// Registers an already materialized class, replacing any earlier entry.
    pub fn insert(&self, class: CompiledClass) -> ClassHandle {
        let name = class.name.clone();
        let handle = Arc::new(RwLock::new(class));
        self.missing.write().remove(&name);
        self.classes.write().insert(name, Arc::clone(&handle));
        handle
    }

    pub fn resolve(&self, name: &str) -> WeaveResult<ClassHandle> {
        if let Some(handle) = self.classes.read().get(name) {
            return Ok(Arc::clone(handle));
        }
        if self.missing.read().contains(name) {
            return Err(WeaveError::unresolvable(name));
        }

        for source in &self.sources {
            if let Some(class) = source.load(name)? {
                let mut classes = self.classes.write();
                let handle = classes
                    .entry(name.to_string())
                    .or_insert_with(|| Arc::new(RwLock::new(class)));
                return Ok(Arc::clone(handle));
            }
        }

        self.missing.write().insert(name.to_string());
        Err(WeaveError::unresolvable(name))
    }

    /// Like [`resolve`](Self::resolve), but any failure reads as "not there".
    pub fn try_resolve(&self, name: &str) -> Option<ClassHandle> {
        match self.resolve(name) {
            Ok(handle) => Some(handle),
            Err(WeaveError::UnresolvableSymbol { .. }) => {
                tracing::debug!(class = name, "class not found in pool");
                None
            }
            Err(err) => {
                tracing::warn!(
                    class = name,
                    error = %err,
                    "failed to load class, treating as unresolved"
                );
                None
            }
        }
    }

    pub fn header(&self, name: &str) -> Option<ClassHeader> {
        self.try_resolve(name).map(|h| h.read().header())
    }

    /// Copy of the current state of a class.
    pub fn snapshot(&self, name: &str) -> WeaveResult<CompiledClass> {
        Ok(self.resolve(name)?.read().clone())
    }

    /// Finds the class that declares `field`, starting at `owner` and walking
    /// up the superclass chain. Unresolvable links and cycles end the walk.
    pub fn find_field(&self, owner: &str, field: &str) -> Option<ResolvedField> {
        let mut visited = HashSet::new();
        let mut current = Some(owner.to_string());

        while let Some(name) = current {
            if !visited.insert(name.clone()) {
                tracing::warn!(class = owner, at = %name, "cyclic superclass chain");
                return None;
            }
            let handle = self.try_resolve(&name)?;
            let class = handle.read();
            if let Some(found) = class.field(field) {
                return Some(ResolvedField {
                    declaring_class: name.clone(),
                    field: found.clone(),
                });
            }
            current = class.super_name.clone();
        }

        None
    }

    pub fn loaded_count(&self) -> usize {
        self.classes.read().len()
    }

    pub fn source_descriptions(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.describe()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::TypeRef;
    use crate::source::MemorySource;

    fn class(name: &str, super_name: Option<&str>, fields: &[&str]) -> CompiledClass {
        let mut c = CompiledClass::new(name);
        c.super_name = super_name.map(str::to_string);
        c.fields = fields
            .iter()
            .map(|f| FieldDescriptor::new(*f, TypeRef::new("int")))
            .collect();
        c
    }

    #[test]
    fn resolve_loads_once_and_shares_handle() -> WeaveResult<()> {
        let pool = SymbolPool::new().with_source(MemorySource::new([class("a.A", None, &[])]));
        assert_eq!(pool.loaded_count(), 0);

        let first = pool.resolve("a.A")?;
        let second = pool.resolve("a.A")?;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(pool.loaded_count(), 1);
        Ok(())
    }

    #[test]
    fn missing_class_is_an_error_for_resolve_and_none_for_try_resolve() {
        let pool = SymbolPool::new();
        assert!(matches!(
            pool.resolve("a.Missing"),
            Err(WeaveError::UnresolvableSymbol { ref name }) if name == "a.Missing"
        ));
        assert!(pool.try_resolve("a.Missing").is_none());
        assert!(pool.header("a.Missing").is_none());
    }

    #[test]
    fn earlier_sources_win() -> WeaveResult<()> {
        let mut shadowed = class("a.A", None, &["old"]);
        shadowed.annotations.push("shadowed".to_string());
        let pool = SymbolPool::new()
            .with_source(MemorySource::new([class("a.A", None, &["new"])]))
            .with_source(MemorySource::new([shadowed]));

        assert!(pool.snapshot("a.A")?.field("new").is_some());
        Ok(())
    }

    #[test]
    fn find_field_walks_to_declaring_superclass() {
        let pool = SymbolPool::new().with_source(MemorySource::new([
            class("a.Base", None, &["id"]),
            class("a.Mid", Some("a.Base"), &[]),
            class("a.Leaf", Some("a.Mid"), &["own"]),
        ]));

        let found = pool.find_field("a.Leaf", "id").unwrap();
        assert_eq!(found.declaring_class, "a.Base");
        assert_eq!(pool.find_field("a.Leaf", "own").unwrap().declaring_class, "a.Leaf");
        assert!(pool.find_field("a.Leaf", "nope").is_none());
    }

    #[test]
    fn find_field_stops_at_unresolvable_or_cyclic_chain() {
        let pool = SymbolPool::new().with_source(MemorySource::new([
            class("a.Orphan", Some("lib.Gone"), &[]),
            class("a.X", Some("a.Y"), &[]),
            class("a.Y", Some("a.X"), &[]),
        ]));

        assert!(pool.find_field("a.Orphan", "id").is_none());
        assert!(pool.find_field("a.X", "id").is_none());
    }

    #[test]
    fn insert_clears_negative_cache() -> WeaveResult<()> {
        let pool = SymbolPool::new();
        assert!(pool.try_resolve("a.Late").is_none());
        pool.insert(class("a.Late", None, &[]));
        assert_eq!(pool.resolve("a.Late")?.read().name, "a.Late");
        Ok(())
    }
}
