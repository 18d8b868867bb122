//! Field access rewriting.
//!
//! Every method and constructor body of a target class is scanned for field
//! reads and writes. A site is replaced with an accessor call when it targets
//! a persisted field of a model class (open mode) or when its owner and name
//! are listed in a [`ManagedFieldSet`] (scoped mode). The owning class gets
//! its accessors synthesized on demand, so rewrite order across classes does
//! not matter.
//!
//! A class is rewritten all-or-nothing: bodies are transformed on a copy.
//! Only when every site in every method succeeded are the owners' accessors
//! synthesized and the bodies written back. A managed field used inside
//! opaque code fails the class, since that access cannot be redirected.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::accessors::ensure_accessors_in_pool;
use crate::class::{Expr, Method, OpaqueCode, Stmt, TypeRef};
use crate::classify::{ModelClassifier, is_persisted_field};
use crate::config::WeaverConfig;
use crate::error::{WeaveError, WeaveResult};
use crate::naming::AccessorPair;
use crate::pool::{ResolvedField, SymbolPool};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FieldKey {
    pub owner: String,
    pub name: String,
}

impl FieldKey {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

/// Fields known up front to be managed. Matching is exact on the owner
/// named at the access site and the field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManagedFieldSet {
    fields: BTreeSet<FieldKey>,
}

impl ManagedFieldSet {
    pub fn new(fields: impl IntoIterator<Item = FieldKey>) -> Self {
        Self {
            fields: fields.into_iter().collect(),
        }
    }

    pub fn contains(&self, owner: &str, name: &str) -> bool {
        self.fields.contains(&FieldKey::new(owner, name))
    }

    pub fn insert(&mut self, key: FieldKey) -> bool {
        self.fields.insert(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldKey> {
        self.fields.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessKind {
    Read,
    Write,
}

/// One field access found while scanning a body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldAccessSite<'e> {
    pub owner: &'e str,
    pub field: &'e str,
    pub ty: &'e TypeRef,
    pub kind: AccessKind,
    /// The written value is consumed by the enclosing expression.
    pub value_used: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RewriteReport {
    pub class: String,
    pub reads: usize,
    pub writes: usize,
    pub methods_changed: usize,
    pub owners: BTreeSet<String>,
}

impl RewriteReport {
    pub fn total(&self) -> usize {
        self.reads + self.writes
    }
}

pub struct AccessRewriter<'a> {
    pool: &'a SymbolPool,
    config: &'a WeaverConfig,
    classifier: ModelClassifier<'a>,
}

impl<'a> AccessRewriter<'a> {
    pub fn new(pool: &'a SymbolPool, config: &'a WeaverConfig) -> Self {
        Self {
            pool,
            config,
            classifier: ModelClassifier::new(pool, config),
        }
    }

    pub fn rewrite(
        &self,
        target: &str,
        managed: Option<&ManagedFieldSet>,
    ) -> WeaveResult<RewriteReport> {
        let handle = self.pool.resolve(target)?;
        let methods: Vec<Method> = handle.read().methods.clone();

        let mut report = RewriteReport {
            class: target.to_string(),
            ..RewriteReport::default()
        };
        let mut decisions: HashMap<(String, String), Option<ResolvedField>> = HashMap::new();
        let mut changed: Vec<(usize, String, Vec<Stmt>)> = Vec::new();

        for (idx, method) in methods.iter().enumerate() {
            if self.config.is_accessor_name(&method.name) {
                continue;
            }
            let Some(body) = method.body.as_ref() else {
                continue;
            };

            let mut scan = MethodScan {
                rewriter: self,
                class: target,
                method: &method.name,
                managed,
                decisions: &mut decisions,
                report: &mut report,
                changed: false,
            };
            let mut body = body.clone();
            for stmt in body.iter_mut() {
                scan.stmt(stmt)?;
            }
            if scan.changed {
                changed.push((idx, method.name.clone(), body));
            }
        }

        if changed.is_empty() {
            return Ok(report);
        }

        for owner in &report.owners {
            ensure_accessors_in_pool(self.pool, owner, self.config)?;
        }

        let mut live = handle.write();
        for (idx, name, body) in changed {
            match live.methods.get_mut(idx) {
                Some(method) if method.name == name => method.body = Some(body),
                _ => {
                    return Err(WeaveError::invariant(
                        target,
                        format!("method {name} moved while its body was being rewritten"),
                    ));
                }
            }
            report.methods_changed += 1;
        }
        drop(live);

        tracing::debug!(
            class = target,
            reads = report.reads,
            writes = report.writes,
            "rewrote field accesses"
        );
        Ok(report)
    }

    /// Decides whether a site is managed. Scoped mode trusts the set; open
    /// mode resolves the declaring class and classifies it.
    fn managed_field(
        &self,
        owner: &str,
        field: &str,
        managed: Option<&ManagedFieldSet>,
    ) -> WeaveResult<Option<ResolvedField>> {
        match managed {
            Some(set) => {
                if !set.contains(owner, field) {
                    return Ok(None);
                }
                let handle = self.pool.resolve(owner)?;
                let class = handle.read();
                let Some(found) = class.field(field) else {
                    return Err(WeaveError::invariant(
                        owner,
                        format!("managed field {field} is not declared on the class"),
                    ));
                };
                Ok(Some(ResolvedField {
                    declaring_class: owner.to_string(),
                    field: found.clone(),
                }))
            }
            None => {
                let Some(resolved) = self.pool.find_field(owner, field) else {
                    return Ok(None);
                };
                if !is_persisted_field(&resolved.field, self.config) {
                    return Ok(None);
                }
                if !self.classifier.is_model_name(&resolved.declaring_class) {
                    return Ok(None);
                }
                Ok(Some(resolved))
            }
        }
    }

    /// Checks that the accessor the call will bind to has the shape the
    /// access site needs.
    fn check_accessor(
        &self,
        resolved: &ResolvedField,
        pair: &AccessorPair,
        kind: AccessKind,
    ) -> Result<(), String> {
        let handle = self
            .pool
            .try_resolve(&resolved.declaring_class)
            .ok_or_else(|| format!("{} is no longer resolvable", resolved.declaring_class))?;
        let owner = handle.read();
        let ty = &resolved.field.ty;

        let name = match kind {
            AccessKind::Read => pair.getter.as_str(),
            AccessKind::Write => pair.setter.as_str(),
        };
        let fits = |m: &Method| match kind {
            AccessKind::Read => !m.is_static() && m.params.is_empty() && m.return_type == *ty,
            AccessKind::Write => {
                !m.is_static()
                    && m.params.len() == 1
                    && m.params[0].ty == *ty
                    && m.return_type.is_void()
            }
        };

        if owner.methods_named(name).any(|m| fits(m)) {
            return Ok(());
        }
        match owner.methods_named(name).next() {
            // Synthesis adds it with the right shape once the class commits.
            None if is_persisted_field(&resolved.field, self.config) => Ok(()),
            Some(existing) => Err(format!(
                "{}.{name} exists with signature ({}) -> {}, which does not fit a field of type {ty}",
                owner.name,
                existing
                    .params
                    .iter()
                    .map(|p| p.ty.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
                existing.return_type
            )),
            None => Err(format!("{}.{name} is missing", owner.name)),
        }
    }
}

/// State for one method body traversal.
struct MethodScan<'r, 'a> {
    rewriter: &'r AccessRewriter<'a>,
    class: &'r str,
    method: &'r str,
    managed: Option<&'r ManagedFieldSet>,
    decisions: &'r mut HashMap<(String, String), Option<ResolvedField>>,
    report: &'r mut RewriteReport,
    changed: bool,
}

impl MethodScan<'_, '_> {
    fn stmt(&mut self, stmt: &mut Stmt) -> WeaveResult<()> {
        match stmt {
            Stmt::Expr(expr) => self.expr(expr, false),
            Stmt::Local { init, .. } => match init {
                Some(expr) => self.expr(expr, true),
                None => Ok(()),
            },
            Stmt::Return(value) => match value {
                Some(expr) => self.expr(expr, true),
                None => Ok(()),
            },
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.expr(cond, true)?;
                for s in then_branch.iter_mut().chain(else_branch.iter_mut()) {
                    self.stmt(s)?;
                }
                Ok(())
            }
            Stmt::While { cond, body } => {
                self.expr(cond, true)?;
                for s in body.iter_mut() {
                    self.stmt(s)?;
                }
                Ok(())
            }
            Stmt::For {
                init,
                cond,
                update,
                body,
            } => {
                for s in init.iter_mut() {
                    self.stmt(s)?;
                }
                if let Some(cond) = cond {
                    self.expr(cond, true)?;
                }
                for e in update.iter_mut() {
                    self.expr(e, false)?;
                }
                self.stmts(body)
            }
            Stmt::ForEach { iterable, body, .. } => {
                self.expr(iterable, true)?;
                self.stmts(body)
            }
            Stmt::Throw(value) => self.expr(value, true),
            Stmt::Try {
                body,
                catches,
                finally,
            } => {
                self.stmts(body)?;
                for catch in catches.iter_mut() {
                    self.stmts(&mut catch.body)?;
                }
                match finally {
                    Some(stmts) => self.stmts(stmts),
                    None => Ok(()),
                }
            }
            Stmt::Block(stmts) => self.stmts(stmts),
            Stmt::Opaque(code) => self.opaque(code),
        }
    }

    fn stmts(&mut self, stmts: &mut [Stmt]) -> WeaveResult<()> {
        for s in stmts.iter_mut() {
            self.stmt(s)?;
        }
        Ok(())
    }

    /// Opaque code passes only if none of the fields it touches is managed.
    fn opaque(&mut self, code: &OpaqueCode) -> WeaveResult<()> {
        for mention in &code.fields {
            let hit = match &mention.owner {
                Some(owner) => self
                    .decision(owner, &mention.field)?
                    .map(|r| format!("{}.{}", r.declaring_class, mention.field)),
                None => self.unresolved_mention(&mention.field)?,
            };
            if let Some(qualified) = hit {
                return Err(self.failure(
                    &qualified,
                    format!("accessed inside code that cannot be rewritten: {}", code.text),
                ));
            }
        }
        Ok(())
    }

    /// A field name whose receiver type is unknown. Scoped mode matches it
    /// against the set by name; open mode against the target's own fields.
    fn unresolved_mention(&mut self, field: &str) -> WeaveResult<Option<String>> {
        match self.managed {
            Some(set) => Ok(set
                .iter()
                .find(|k| k.name == field)
                .map(|k| format!("{}.{}", k.owner, k.name))),
            None => Ok(self
                .decision(self.class, field)?
                .map(|r| format!("{}.{field}", r.declaring_class))),
        }
    }

    /// Cached per (owner, field) for the whole class.
    fn decision(&mut self, owner: &str, field: &str) -> WeaveResult<Option<ResolvedField>> {
        let key = (owner.to_string(), field.to_string());
        if let Some(decision) = self.decisions.get(&key) {
            return Ok(decision.clone());
        }
        let decision = self.rewriter.managed_field(owner, field, self.managed)?;
        self.decisions.insert(key, decision.clone());
        Ok(decision)
    }

    /// Children first, then the node itself. `value_used` is false only for
    /// an expression statement.
    fn expr(&mut self, expr: &mut Expr, value_used: bool) -> WeaveResult<()> {
        match expr {
            Expr::Literal(_) | Expr::This | Expr::Local(_) => {}
            Expr::Opaque(code) => self.opaque(code)?,
            Expr::GetStatic { .. } => {}
            Expr::AssignLocal { value, .. } => self.expr(value, true)?,
            Expr::PutStatic { value, .. } => self.expr(value, true)?,
            Expr::GetField { target, .. } => self.expr(target, true)?,
            Expr::PutField { target, value, .. } => {
                self.expr(target, true)?;
                self.expr(value, true)?;
            }
            Expr::Invoke { target, args, .. } => {
                if let Some(target) = target {
                    self.expr(target, true)?;
                }
                for arg in args.iter_mut() {
                    self.expr(arg, true)?;
                }
            }
            Expr::New { args, .. } => {
                for arg in args.iter_mut() {
                    self.expr(arg, true)?;
                }
            }
            Expr::Binary { lhs, rhs, .. } => {
                self.expr(lhs, true)?;
                self.expr(rhs, true)?;
            }
            Expr::Unary { operand, .. } => self.expr(operand, true)?,
            Expr::InstanceOf { value, .. } | Expr::Cast { value, .. } => self.expr(value, true)?,
            Expr::Conditional {
                cond,
                then_value,
                else_value,
            } => {
                self.expr(cond, true)?;
                self.expr(then_value, true)?;
                self.expr(else_value, true)?;
            }
        }

        let replacement = match site_of(expr, value_used) {
            Some(site) => self.replacement(&site)?,
            None => None,
        };
        if let Some(call) = replacement {
            replace_site(expr, call);
            self.changed = true;
        }
        Ok(())
    }

    /// The accessor call that replaces a site, or `None` to leave it alone.
    fn replacement(&mut self, site: &FieldAccessSite<'_>) -> WeaveResult<Option<Replacement>> {
        let Some(resolved) = self.decision(site.owner, site.field)? else {
            return Ok(None);
        };

        let qualified = format!("{}.{}", resolved.declaring_class, site.field);
        if *site.ty != resolved.field.ty {
            return Err(self.failure(
                &qualified,
                format!(
                    "access site expects type {} but the field is declared as {}",
                    site.ty, resolved.field.ty
                ),
            ));
        }
        if site.kind == AccessKind::Write && site.value_used {
            return Err(self.failure(
                &qualified,
                "assignment result is used as a value but the setter returns void".to_string(),
            ));
        }

        let pair = AccessorPair::for_field(site.field, self.rewriter.config);
        self.rewriter
            .check_accessor(&resolved, &pair, site.kind)
            .map_err(|reason| self.failure(&qualified, reason))?;

        tracing::debug!(
            class = self.class,
            method = self.method,
            field = %qualified,
            kind = ?site.kind,
            "rewriting field access"
        );
        match site.kind {
            AccessKind::Read => self.report.reads += 1,
            AccessKind::Write => self.report.writes += 1,
        }
        self.report.owners.insert(resolved.declaring_class.clone());

        let method = match site.kind {
            AccessKind::Read => pair.getter,
            AccessKind::Write => pair.setter,
        };
        Ok(Some(Replacement {
            owner: resolved.declaring_class,
            method,
            ty: resolved.field.ty,
        }))
    }

    fn failure(&self, field: &str, reason: String) -> WeaveError {
        WeaveError::RewriteCompilationFailure {
            class: self.class.to_string(),
            method: self.method.to_string(),
            field: field.to_string(),
            reason,
        }
    }
}

struct Replacement {
    owner: String,
    method: String,
    ty: TypeRef,
}

fn site_of(expr: &Expr, value_used: bool) -> Option<FieldAccessSite<'_>> {
    match expr {
        Expr::GetField {
            owner, field, ty, ..
        } => Some(FieldAccessSite {
            owner,
            field,
            ty,
            kind: AccessKind::Read,
            value_used,
        }),
        Expr::PutField {
            owner, field, ty, ..
        } => Some(FieldAccessSite {
            owner,
            field,
            ty,
            kind: AccessKind::Write,
            value_used,
        }),
        _ => None,
    }
}

/// `obj.f` -> `obj.get$f()`, `obj.f = v` -> `obj.set$f(v)`.
fn replace_site(expr: &mut Expr, call: Replacement) {
    let placeholder = Expr::Literal(crate::class::Literal::Null);
    match std::mem::replace(expr, placeholder) {
        Expr::GetField { target, .. } => {
            *expr = Expr::Invoke {
                target: Some(target),
                owner: call.owner,
                method: call.method,
                args: Vec::new(),
                return_type: call.ty,
            };
        }
        Expr::PutField { target, value, .. } => {
            *expr = Expr::Invoke {
                target: Some(target),
                owner: call.owner,
                method: call.method,
                args: vec![*value],
                return_type: TypeRef::void(),
            };
        }
        other => *expr = other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{CompiledClass, FieldDescriptor, FieldMention, Modifiers, Param};
    use crate::render::render_expr;
    use crate::source::MemorySource;

    const PERSON: &str = "com.example.Person";
    const GREETER: &str = "com.example.Greeter";

    fn config() -> WeaverConfig {
        WeaverConfig::default()
    }

    fn person() -> CompiledClass {
        let cfg = config();
        let mut person = CompiledClass::new(PERSON);
        person.super_name = Some(cfg.root_model_type.clone());
        person.annotations.push(cfg.model_annotation.clone());
        person.fields = vec![
            FieldDescriptor::new("name", TypeRef::string()),
            FieldDescriptor::new("cache", TypeRef::string()).with_annotation(cfg.ignore_annotation),
            FieldDescriptor::new("age", TypeRef::new("int")),
            FieldDescriptor::new("tmp", TypeRef::new("int")).with_modifiers(Modifiers::TRANSIENT),
        ];
        person
    }

    fn p_name() -> Expr {
        Expr::get_field(Expr::local("p"), PERSON, "name", TypeRef::string())
    }

    fn greeter(body: Vec<Stmt>) -> CompiledClass {
        let mut greeter = CompiledClass::new(GREETER);
        greeter.methods.push(
            Method::new("greet", TypeRef::string(), body).with_params(vec![Param {
                name: "p".to_string(),
                ty: TypeRef::new(PERSON),
            }]),
        );
        greeter
    }

    fn pool(classes: Vec<CompiledClass>) -> SymbolPool {
        SymbolPool::new().with_source(MemorySource::new(classes))
    }

    fn body_of(pool: &SymbolPool, class: &str, method: &str) -> Vec<Stmt> {
        let snapshot = pool.snapshot(class).unwrap();
        snapshot
            .methods_named(method)
            .next()
            .and_then(|m| m.body.clone())
            .unwrap()
    }

    #[test]
    fn open_mode_rewrites_cross_class_read_and_synthesizes_on_owner() -> WeaveResult<()> {
        let cfg = config();
        let greet = vec![Stmt::Return(Some(Expr::binary("+", Expr::str("Hello "), p_name())))];
        let pool = pool(vec![person(), greeter(greet)]);
        let rewriter = AccessRewriter::new(&pool, &cfg);

        let report = rewriter.rewrite(GREETER, None)?;
        assert_eq!(report.reads, 1);
        assert_eq!(report.writes, 0);
        assert_eq!(report.methods_changed, 1);
        assert!(report.owners.contains(PERSON));

        let body = body_of(&pool, GREETER, "greet");
        let Stmt::Return(Some(expr)) = &body[0] else {
            panic!("unexpected body {body:?}");
        };
        assert_eq!(render_expr(expr), r#""Hello " + p.get$name()"#);

        let person = pool.snapshot(PERSON)?;
        assert!(person.has_method_named("get$name"));
        assert!(person.has_method_named("set$name"));
        assert!(!person.has_method_named("get$cache"));
        Ok(())
    }

    #[test]
    fn writes_become_setter_calls_and_compound_assignments_use_both() -> WeaveResult<()> {
        let cfg = config();
        let age = |p: &str| Expr::get_field(Expr::local(p), PERSON, "age", TypeRef::new("int"));
        let body = vec![
            Stmt::Expr(Expr::put_field(
                Expr::local("p"),
                PERSON,
                "name",
                TypeRef::string(),
                Expr::str("Ada"),
            )),
            Stmt::Expr(Expr::put_field(
                Expr::local("p"),
                PERSON,
                "age",
                TypeRef::new("int"),
                Expr::binary("+", age("p"), Expr::Literal(crate::class::Literal::Int(1))),
            )),
            Stmt::Return(Some(p_name())),
        ];
        let pool = pool(vec![person(), greeter(body)]);
        let report = AccessRewriter::new(&pool, &cfg).rewrite(GREETER, None)?;
        assert_eq!((report.reads, report.writes), (2, 2));

        let body = body_of(&pool, GREETER, "greet");
        let rendered: Vec<String> = body
            .iter()
            .map(|s| match s {
                Stmt::Expr(e) | Stmt::Return(Some(e)) => render_expr(e),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(
            rendered,
            vec![
                r#"p.set$name("Ada")"#.to_string(),
                "p.set$age(p.get$age() + 1)".to_string(),
                "p.get$name()".to_string(),
            ]
        );
        Ok(())
    }

    #[test]
    fn ignored_transient_and_non_model_fields_are_left_alone() -> WeaveResult<()> {
        let cfg = config();
        let mut plain = CompiledClass::new("com.example.Plain");
        plain.fields.push(FieldDescriptor::new("name", TypeRef::string()));

        let body = vec![
            Stmt::Expr(Expr::get_field(Expr::local("p"), PERSON, "cache", TypeRef::string())),
            Stmt::Expr(Expr::get_field(Expr::local("p"), PERSON, "tmp", TypeRef::new("int"))),
            Stmt::Expr(Expr::get_field(
                Expr::local("q"),
                "com.example.Plain",
                "name",
                TypeRef::string(),
            )),
            Stmt::Expr(Expr::get_field(
                Expr::local("r"),
                "lib.Unknown",
                "name",
                TypeRef::string(),
            )),
        ];
        let original = body.clone();
        let pool = pool(vec![person(), plain, greeter(body)]);
        let report = AccessRewriter::new(&pool, &cfg).rewrite(GREETER, None)?;

        assert_eq!(report.total(), 0);
        assert_eq!(body_of(&pool, GREETER, "greet"), original);
        assert!(!pool.snapshot(PERSON)?.has_method_named("get$name"));
        Ok(())
    }

    #[test]
    fn inherited_field_resolves_to_declaring_model_class() -> WeaveResult<()> {
        let cfg = config();
        let mut student = CompiledClass::new("com.example.Student");
        student.super_name = Some(PERSON.to_string());

        let body = vec![Stmt::Return(Some(Expr::get_field(
            Expr::local("s"),
            "com.example.Student",
            "name",
            TypeRef::string(),
        )))];
        let pool = pool(vec![person(), student, greeter(body)]);
        AccessRewriter::new(&pool, &cfg).rewrite(GREETER, None)?;

        let body = body_of(&pool, GREETER, "greet");
        assert!(matches!(
            &body[0],
            Stmt::Return(Some(Expr::Invoke { owner, method, .. }))
                if owner == PERSON && method == "get$name"
        ));
        Ok(())
    }

    #[test]
    fn accessor_bodies_are_not_rewritten() -> WeaveResult<()> {
        let cfg = config();
        let pool = pool(vec![person()]);
        crate::accessors::ensure_accessors_in_pool(&pool, PERSON, &cfg)?;
        let before = pool.snapshot(PERSON)?;

        let report = AccessRewriter::new(&pool, &cfg).rewrite(PERSON, None)?;
        assert_eq!(report.total(), 0);
        assert_eq!(pool.snapshot(PERSON)?, before);
        Ok(())
    }

    #[test]
    fn scoped_mode_only_touches_listed_fields() -> WeaveResult<()> {
        let cfg = config();
        let body = vec![
            Stmt::Expr(p_name()),
            Stmt::Expr(Expr::get_field(Expr::local("p"), PERSON, "age", TypeRef::new("int"))),
        ];
        let pool = pool(vec![person(), greeter(body)]);
        let scope = ManagedFieldSet::new([FieldKey::new(PERSON, "age")]);

        let report = AccessRewriter::new(&pool, &cfg).rewrite(GREETER, Some(&scope))?;
        assert_eq!(report.reads, 1);

        let body = body_of(&pool, GREETER, "greet");
        assert_eq!(body[0], Stmt::Expr(p_name()));
        assert!(matches!(
            &body[1],
            Stmt::Expr(Expr::Invoke { method, .. }) if method == "get$age"
        ));
        Ok(())
    }

    #[test]
    fn conflicting_accessor_signature_fails_without_partial_rewrite() {
        let cfg = config();
        let mut person = person();
        person.methods.push(
            Method::new("get$age", TypeRef::string(), vec![Stmt::Return(None)]).with_params(vec![
                Param {
                    name: "radix".to_string(),
                    ty: TypeRef::new("int"),
                },
            ]),
        );

        let mut greeter = greeter(vec![Stmt::Return(Some(p_name()))]);
        greeter.methods.push(Method::new(
            "age",
            TypeRef::new("int"),
            vec![Stmt::Return(Some(Expr::get_field(
                Expr::local("p"),
                PERSON,
                "age",
                TypeRef::new("int"),
            )))],
        ));
        let original = greeter.clone();

        let pool = pool(vec![person, greeter]);
        let err = AccessRewriter::new(&pool, &cfg)
            .rewrite(GREETER, None)
            .unwrap_err();
        match err {
            WeaveError::RewriteCompilationFailure {
                class,
                method,
                field,
                ..
            } => {
                assert_eq!(class, GREETER);
                assert_eq!(method, "age");
                assert_eq!(field, "com.example.Person.age");
            }
            other => panic!("unexpected error {other}"),
        }
        assert_eq!(pool.snapshot(GREETER).unwrap(), original);
    }

    #[test]
    fn failed_target_synthesizes_nothing_on_owners() {
        let cfg = config();
        let body = vec![
            Stmt::Expr(p_name()),
            Stmt::Expr(Expr::get_field(Expr::local("p"), PERSON, "age", TypeRef::new("long"))),
        ];
        let pool = pool(vec![person(), greeter(body)]);
        assert!(AccessRewriter::new(&pool, &cfg).rewrite(GREETER, None).is_err());

        let person = pool.snapshot(PERSON).unwrap();
        assert!(person.methods.is_empty());
    }

    #[test]
    fn accesses_inside_loops_and_try_blocks_are_rewritten() -> WeaveResult<()> {
        let cfg = config();
        let age = || Expr::get_field(Expr::local("p"), PERSON, "age", TypeRef::new("int"));
        let body = vec![
            Stmt::For {
                init: Vec::new(),
                cond: Some(Expr::binary("<", Expr::local("i"), age())),
                update: Vec::new(),
                body: vec![Stmt::Expr(Expr::AssignLocal {
                    name: "t".to_string(),
                    value: Box::new(Expr::binary("+", Expr::local("t"), age())),
                })],
            },
            Stmt::Try {
                body: vec![Stmt::Expr(Expr::put_field(
                    Expr::local("p"),
                    PERSON,
                    "name",
                    TypeRef::string(),
                    Expr::str("x"),
                ))],
                catches: Vec::new(),
                finally: Some(vec![Stmt::Throw(Expr::local("e"))]),
            },
            Stmt::Return(Some(Expr::Conditional {
                cond: Box::new(Expr::local("c")),
                then_value: Box::new(p_name()),
                else_value: Box::new(Expr::str("")),
            })),
        ];
        let pool = pool(vec![person(), greeter(body)]);
        let report = AccessRewriter::new(&pool, &cfg).rewrite(GREETER, None)?;
        assert_eq!((report.reads, report.writes), (3, 1));

        let body = body_of(&pool, GREETER, "greet");
        let Stmt::Return(Some(value)) = &body[2] else {
            panic!("unexpected body {body:?}");
        };
        assert_eq!(render_expr(value), r#"c ? p.get$name() : """#);
        Ok(())
    }

    #[test]
    fn managed_field_inside_opaque_code_fails_the_class() {
        let cfg = config();
        let lambda = OpaqueCode {
            text: "() -> p.name".to_string(),
            fields: vec![FieldMention {
                owner: Some(PERSON.to_string()),
                field: "name".to_string(),
            }],
        };
        let body = vec![Stmt::Expr(Expr::Opaque(lambda))];
        let original = greeter(body.clone());
        let pool = pool(vec![person(), greeter(body)]);

        let err = AccessRewriter::new(&pool, &cfg)
            .rewrite(GREETER, None)
            .unwrap_err();
        match err {
            WeaveError::RewriteCompilationFailure { field, reason, .. } => {
                assert_eq!(field, "com.example.Person.name");
                assert!(reason.contains("() -> p.name"), "{reason}");
            }
            other => panic!("unexpected error {other}"),
        }
        assert_eq!(pool.snapshot(GREETER).unwrap(), original);
    }

    #[test]
    fn opaque_code_with_unmanaged_fields_passes() -> WeaveResult<()> {
        let cfg = config();
        let mut code = OpaqueCode::new("xs.length + p.cache.length()");
        code.fields.push(FieldMention {
            owner: None,
            field: "length".to_string(),
        });
        code.fields.push(FieldMention {
            owner: Some(PERSON.to_string()),
            field: "cache".to_string(),
        });
        let pool = pool(vec![person(), greeter(vec![Stmt::Opaque(code)])]);
        let report = AccessRewriter::new(&pool, &cfg).rewrite(GREETER, None)?;
        assert_eq!(report.total(), 0);
        Ok(())
    }

    #[test]
    fn scoped_mode_matches_unresolved_mentions_by_name() {
        let cfg = config();
        let mut code = OpaqueCode::new("items.forEach(x -> x.age++)");
        code.fields.push(FieldMention {
            owner: None,
            field: "age".to_string(),
        });
        let pool = pool(vec![person(), greeter(vec![Stmt::Opaque(code)])]);
        let scope = ManagedFieldSet::new([FieldKey::new(PERSON, "age")]);
        assert!(matches!(
            AccessRewriter::new(&pool, &cfg).rewrite(GREETER, Some(&scope)),
            Err(WeaveError::RewriteCompilationFailure { .. })
        ));
    }

    #[test]
    fn assignment_used_as_value_cannot_be_rewritten() {
        let cfg = config();
        let body = vec![Stmt::Return(Some(Expr::put_field(
            Expr::local("p"),
            PERSON,
            "name",
            TypeRef::string(),
            Expr::str("x"),
        )))];
        let pool = pool(vec![person(), greeter(body)]);
        let err = AccessRewriter::new(&pool, &cfg)
            .rewrite(GREETER, None)
            .unwrap_err();
        assert!(matches!(err, WeaveError::RewriteCompilationFailure { .. }));
    }

    #[test]
    fn mismatched_site_type_is_a_failure() {
        let cfg = config();
        let body = vec![Stmt::Expr(Expr::get_field(
            Expr::local("p"),
            PERSON,
            "age",
            TypeRef::new("long"),
        ))];
        let pool = pool(vec![person(), greeter(body)]);
        assert!(AccessRewriter::new(&pool, &cfg).rewrite(GREETER, None).is_err());
    }

    #[test]
    fn missing_target_is_unresolvable() {
        let cfg = config();
        let pool = pool(vec![]);
        assert!(matches!(
            AccessRewriter::new(&pool, &cfg).rewrite("com.example.Nope", None),
            Err(WeaveError::UnresolvableSymbol { .. })
        ));
    }
}
