//! Model classification.
//!
//! A model class carries the model annotation, directly or through a
//! superclass, and is a proper subtype of the model interface. Ancestors are
//! resolved through the pool; any link that cannot be resolved makes the
//! answer `false` instead of an error.

use std::collections::{HashSet, VecDeque};

use crate::class::{ClassHeader, CompiledClass, FieldDescriptor};
use crate::config::WeaverConfig;
use crate::error::{WeaveError, WeaveResult};
use crate::naming::proxy_interface_name;
use crate::pool::SymbolPool;

/// Persisted iff not static, not transient and not annotated ignore.
pub fn is_persisted_field(field: &FieldDescriptor, config: &WeaverConfig) -> bool {
    !field.is_static() && !field.is_transient() && !field.has_annotation(&config.ignore_annotation)
}

pub fn persisted_fields<'c>(
    class: &'c CompiledClass,
    config: &'c WeaverConfig,
) -> impl Iterator<Item = &'c FieldDescriptor> {
    class
        .fields
        .iter()
        .filter(move |f| is_persisted_field(f, config))
}

/// How a walk over the ancestors of a class ended.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Walk {
    Found,
    Exhausted,
    Unresolved(String),
    Cycle(String),
}

pub struct ModelClassifier<'a> {
    pool: &'a SymbolPool,
    config: &'a WeaverConfig,
}

impl<'a> ModelClassifier<'a> {
    pub fn new(pool: &'a SymbolPool, config: &'a WeaverConfig) -> Self {
        Self { pool, config }
    }

    pub fn is_model_type(&self, class: &CompiledClass) -> bool {
        self.is_model_header(&class.header())
    }

    pub fn is_model_header(&self, header: &ClassHeader) -> bool {
        self.has_model_annotation(header) && self.is_proxy_subtype(header)
    }

    /// Tolerant lookup by name: unknown classes are not model types.
    pub fn is_model_name(&self, name: &str) -> bool {
        self.pool
            .header(name)
            .is_some_and(|h| self.is_model_header(&h))
    }

    pub fn has_model_annotation(&self, header: &ClassHeader) -> bool {
        self.annotation_walk(header) == Walk::Found
    }

    /// Proper subtype of the model interface. The interface itself is not.
    pub fn is_proxy_subtype(&self, header: &ClassHeader) -> bool {
        self.subtype_walk(header) == Walk::Found
    }

    pub fn implements_proxy_interface(&self, class: &CompiledClass) -> bool {
        let expected = proxy_interface_name(&class.name, self.config);
        class.interfaces.iter().any(|i| *i == expected)
    }

    /// Rejects a class that declares the model annotation itself but cannot
    /// be connected to the model interface.
    pub fn verify(&self, header: &ClassHeader) -> WeaveResult<()> {
        if !header.has_annotation(&self.config.model_annotation) {
            return Ok(());
        }

        match self.subtype_walk(header) {
            Walk::Found => Ok(()),
            Walk::Unresolved(link) => Err(WeaveError::invariant(
                &header.name,
                format!(
                    "annotated with {} but its supertype {link} cannot be resolved, so it cannot reach {}",
                    self.config.model_annotation, self.config.model_interface
                ),
            )),
            Walk::Cycle(link) => Err(WeaveError::invariant(
                &header.name,
                format!("supertype chain loops back through {link}"),
            )),
            Walk::Exhausted => Err(WeaveError::invariant(
                &header.name,
                format!(
                    "annotated with {} but does not derive from {}",
                    self.config.model_annotation, self.config.model_interface
                ),
            )),
        }
    }

    fn annotation_walk(&self, header: &ClassHeader) -> Walk {
        if header.has_annotation(&self.config.model_annotation) {
            return Walk::Found;
        }

        let mut visited = HashSet::from([header.name.clone()]);
        let mut next = header.super_name.clone();
        while let Some(name) = next {
            if name == self.config.root_model_type {
                return Walk::Exhausted;
            }
            if !visited.insert(name.clone()) {
                return Walk::Cycle(name);
            }
            let Some(ancestor) = self.pool.header(&name) else {
                return Walk::Unresolved(name);
            };
            if ancestor.has_annotation(&self.config.model_annotation) {
                return Walk::Found;
            }
            next = ancestor.super_name;
        }
        Walk::Exhausted
    }

    fn subtype_walk(&self, header: &ClassHeader) -> Walk {
        if header.name == self.config.model_interface {
            return Walk::Exhausted;
        }

        let mut visited = HashSet::from([header.name.clone()]);
        let mut queue: VecDeque<String> = header
            .super_name
            .iter()
            .chain(header.interfaces.iter())
            .cloned()
            .collect();
        let mut outcome = Walk::Exhausted;

        while let Some(name) = queue.pop_front() {
            if name == self.config.model_interface || name == self.config.root_model_type {
                return Walk::Found;
            }
            if !visited.insert(name.clone()) {
                if name == header.name {
                    outcome = Walk::Cycle(name);
                }
                continue;
            }
            let Some(ancestor) = self.pool.header(&name) else {
                if outcome == Walk::Exhausted {
                    outcome = Walk::Unresolved(name);
                }
                continue;
            };
            queue.extend(ancestor.super_name.into_iter().chain(ancestor.interfaces));
        }
        outcome
    }
}
