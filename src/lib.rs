//! # field-weaver
//!
//! A compile-time pass that redirects field reads and writes on model classes
//! through generated `get$`/`set$` accessors, so a runtime layer can
//! intercept every access.
//!
//! ## Architecture
//!
//! - **class**: Structural compiled-class form (fields, methods, bodies)
//! - **source**: Class sources: directories and jar/zip archives of class files
//! - **pool**: Shared, lazily populated symbol pool with per-class locks
//! - **classify**: Model type and persisted field classification
//! - **accessors**: Getter/setter synthesis as an idempotent upsert
//! - **rewrite**: Field access rewriting across a whole module
//! - **proxy**: Proxy interface and constructor hook injection
//! - **marker**: Transform marker for idempotent re-runs
//! - **weaver**: The phased pass over a target set
//! - **output**: Deterministic class file and archive writing
//! - **lower**: Java source front end built on tree-sitter
//! - **render**: Java-like text rendering for inspection

pub mod accessors;
pub mod class;
pub mod classify;
pub mod cli;
pub mod config;
pub mod error;
pub mod lower;
pub mod marker;
pub mod naming;
pub mod output;
pub mod pool;
pub mod proxy;
pub mod render;
pub mod rewrite;
pub mod source;
pub mod weaver;
