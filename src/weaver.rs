//! The full pass over a set of target classes.
//!
//! Three phases, each run in parallel over the targets and separated by a
//! barrier: wiring (accessors, proxy interface, constructor hook), field
//! access rewriting, marking. A class that fails a phase drops out of the
//! later ones; other classes carry on. A model class whose rewrite fails has
//! its wiring taken back, so it is never left half woven.

use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::time::Instant;

use crate::accessors::ensure_accessors;
use crate::class::CompiledClass;
use crate::classify::ModelClassifier;
use crate::config::WeaverConfig;
use crate::error::{WeaveError, WeaveResult};
use crate::marker::{is_already_transformed, mark_transformed};
use crate::pool::SymbolPool;
use crate::proxy::{add_proxy_interface, inject_context_hook};
use crate::rewrite::{AccessRewriter, ManagedFieldSet};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClassOutcome {
    pub class: String,
    pub model: bool,
    pub already_transformed: bool,
    pub accessors_added: usize,
    pub interface_added: bool,
    pub constructors_instrumented: usize,
    pub reads: usize,
    pub writes: usize,
    pub marked: bool,
}

#[derive(Debug, Serialize)]
pub struct ClassFailure {
    pub class: String,
    #[serde(serialize_with = "display")]
    pub error: WeaveError,
}

fn display<S: serde::Serializer>(error: &WeaveError, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(error)
}

#[derive(Debug, Default, Serialize)]
pub struct PassReport {
    pub classes: Vec<ClassOutcome>,
    pub failures: Vec<ClassFailure>,
    /// Non-target classes that received accessors because a target reads or
    /// writes their fields.
    pub touched_outside_targets: Vec<String>,
    pub loaded_symbols: usize,
    pub duration_ms: u64,
}

impl PassReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// First failure becomes the error for the whole pass.
    pub fn into_result(mut self) -> WeaveResult<Self> {
        if self.failures.is_empty() {
            return Ok(self);
        }
        let first = self.failures.remove(0);
        Err(first.error)
    }
}

pub struct Weaver {
    pool: SymbolPool,
    config: WeaverConfig,
    scope: Option<ManagedFieldSet>,
}

impl Weaver {
    pub fn new(pool: SymbolPool, config: WeaverConfig) -> Self {
        Self {
            pool,
            config,
            scope: None,
        }
    }

    /// Switches the rewrite to scoped mode.
    pub fn with_managed_fields(mut self, fields: ManagedFieldSet) -> Self {
        self.scope = Some(fields);
        self
    }

    pub fn pool(&self) -> &SymbolPool {
        &self.pool
    }

    pub fn config(&self) -> &WeaverConfig {
        &self.config
    }

    pub fn run(&self, targets: &[String]) -> PassReport {
        let start = Instant::now();
        let mut failures = Vec::new();

        let wired: Vec<WeaveResult<(ClassOutcome, Option<CompiledClass>)>> =
            targets.par_iter().map(|name| self.wire(name)).collect();
        let mut outcomes = Vec::with_capacity(targets.len());
        let mut unwired = HashMap::new();
        for (name, result) in targets.iter().zip(wired) {
            match result {
                Ok((outcome, before)) => {
                    if let Some(before) = before {
                        unwired.insert(outcome.class.clone(), before);
                    }
                    outcomes.push(outcome);
                }
                Err(error) => failures.push(failed(name, error)),
            }
        }

        let rewriter = AccessRewriter::new(&self.pool, &self.config);
        let scope = self.scope.as_ref();
        let rewritten: Vec<(ClassOutcome, WeaveResult<BTreeSet<String>>)> = outcomes
            .into_par_iter()
            .map(|mut outcome| {
                if outcome.already_transformed && scope.is_some() {
                    return (outcome, Ok(BTreeSet::new()));
                }
                match rewriter.rewrite(&outcome.class, scope) {
                    Ok(report) => {
                        outcome.reads = report.reads;
                        outcome.writes = report.writes;
                        (outcome, Ok(report.owners))
                    }
                    Err(error) => (outcome, Err(error)),
                }
            })
            .collect();

        let mut outcomes = Vec::new();
        let mut owners = BTreeSet::new();
        let mut rolled_back = Vec::new();
        for (outcome, result) in rewritten {
            match result {
                Ok(touched) => {
                    owners.extend(touched);
                    outcomes.push(outcome);
                }
                Err(error) => {
                    if let Some(before) = unwired.remove(&outcome.class) {
                        rolled_back.push(before);
                    }
                    failures.push(failed(&outcome.class, error));
                }
            }
        }
        for before in rolled_back {
            self.unwire(before, &owners);
        }

        let marked: Vec<(ClassOutcome, WeaveResult<bool>)> = outcomes
            .into_par_iter()
            .map(|outcome| {
                if outcome.already_transformed {
                    return (outcome, Ok(false));
                }
                let result = self
                    .pool
                    .resolve(&outcome.class)
                    .map(|handle| {
                        let mut class = handle.write();
                        mark_transformed(&mut class, &self.config)
                    });
                (outcome, result)
            })
            .collect();

        let mut classes = Vec::new();
        for (mut outcome, result) in marked {
            match result {
                Ok(marked) => {
                    outcome.marked = marked;
                    classes.push(outcome);
                }
                Err(error) => failures.push(failed(&outcome.class, error)),
            }
        }
        classes.sort_by(|a, b| a.class.cmp(&b.class));
        failures.sort_by(|a, b| a.class.cmp(&b.class));

        let target_set: BTreeSet<&str> = targets.iter().map(String::as_str).collect();
        let touched_outside_targets = owners
            .into_iter()
            .filter(|o| !target_set.contains(o.as_str()))
            .collect();

        let report = PassReport {
            classes,
            failures,
            touched_outside_targets,
            loaded_symbols: self.pool.loaded_count(),
            duration_ms: start.elapsed().as_millis() as u64,
        };
        tracing::info!(
            targets = targets.len(),
            failures = report.failures.len(),
            loaded = report.loaded_symbols,
            duration_ms = report.duration_ms,
            "weaving pass finished"
        );
        report
    }

    /// Current state of the targets, sorted by name.
    pub fn emit(&self, targets: &[String]) -> WeaveResult<Vec<CompiledClass>> {
        let mut names: Vec<&String> = targets.iter().collect();
        names.sort();
        names.dedup();
        names.into_iter().map(|n| self.pool.snapshot(n)).collect()
    }

    /// Wires a model class in place. Returns the class as it was before,
    /// so a failed rewrite can take the wiring back.
    fn wire(&self, name: &str) -> WeaveResult<(ClassOutcome, Option<CompiledClass>)> {
        let classifier = ModelClassifier::new(&self.pool, &self.config);
        let handle = self.pool.resolve(name)?;
        let header = handle.read().header();
        classifier.verify(&header)?;

        let mut outcome = ClassOutcome {
            class: name.to_string(),
            model: classifier.is_model_header(&header),
            already_transformed: is_already_transformed(&handle.read(), &self.config),
            ..ClassOutcome::default()
        };
        if !outcome.model || outcome.already_transformed {
            tracing::debug!(
                class = name,
                model = outcome.model,
                already_transformed = outcome.already_transformed,
                "no wiring needed"
            );
            return Ok((outcome, None));
        }

        let mut class = handle.write();
        let before = class.clone();
        outcome.accessors_added = ensure_accessors(&mut class, &self.config);
        if !classifier.implements_proxy_interface(&class) {
            add_proxy_interface(&mut class, &self.config);
            outcome.interface_added = true;
        }
        outcome.constructors_instrumented = inject_context_hook(&mut class, &self.config);
        Ok((outcome, Some(before)))
    }

    /// Puts a class whose rewrite failed back to its state before wiring.
    /// Accessors that other classes now call are synthesized again.
    fn unwire(&self, before: CompiledClass, called: &BTreeSet<String>) {
        let Some(handle) = self.pool.try_resolve(&before.name) else {
            return;
        };
        let keep_accessors = called.contains(&before.name);
        let mut class = handle.write();
        *class = before;
        if keep_accessors {
            ensure_accessors(&mut class, &self.config);
        }
        tracing::debug!(class = %class.name, keep_accessors, "rolled back wiring");
    }
}

fn failed(class: &str, error: WeaveError) -> ClassFailure {
    tracing::warn!(class, %error, "class failed the pass");
    ClassFailure {
        class: class.to_string(),
        error,
    }
}
