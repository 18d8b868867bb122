//! Java source front end.
//!
//! Parses `.java` files with tree-sitter and lowers top-level classes and
//! interfaces to [`CompiledClass`]. Declarations of every unit are collected
//! before any body is lowered, so an access like `p.name` gets the owner and
//! type a compiler would record even when `p`'s class lives in another file.
//!
//! Like a compiler, lowering adds the implicit `super()` call and the default
//! constructor, and moves instance field initializers into constructors.
//! Constructs outside the supported subset become `Opaque`, carrying the
//! field accesses found inside them.

use anyhow::{Context, Result};
use ignore::WalkBuilder;
use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use tree_sitter::{Node, Parser, Tree};

use crate::class::{
    CONSTRUCTOR_NAME, CatchClause, CompiledClass, Expr, FieldDescriptor, FieldMention, Literal,
    Method, MethodKind, Modifiers, OpaqueCode, Param, Stmt, TypeRef,
};

const OBJECT: &str = "java.lang.Object";

const JAVA_LANG: &[&str] = &[
    "Boolean",
    "Byte",
    "Character",
    "Class",
    "Comparable",
    "Deprecated",
    "Double",
    "Enum",
    "Exception",
    "Float",
    "FunctionalInterface",
    "IllegalArgumentException",
    "IllegalStateException",
    "Integer",
    "Iterable",
    "Long",
    "Math",
    "Number",
    "Object",
    "Override",
    "Runnable",
    "RuntimeException",
    "Short",
    "String",
    "StringBuilder",
    "SuppressWarnings",
    "System",
    "Thread",
    "Throwable",
    "Void",
];

/// Lowers every `.java` file under `dir`.
pub fn lower_directory(dir: &Path) -> Result<Vec<CompiledClass>> {
    let mut paths = Vec::new();
    for entry in WalkBuilder::new(dir)
        .standard_filters(false)
        .hidden(false)
        .follow_links(false)
        .build()
    {
        let entry = entry.with_context(|| format!("failed to walk {}", dir.display()))?;
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|e| e == "java") {
            paths.push(path.to_path_buf());
        }
    }
    paths.sort();

    let mut sources = Vec::with_capacity(paths.len());
    for path in paths {
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        sources.push((path, text));
    }
    lower_sources(sources)
}

/// Lowers a set of sources that may reference each other. Output is sorted
/// by class name.
pub fn lower_sources(sources: Vec<(PathBuf, String)>) -> Result<Vec<CompiledClass>> {
    let units: Vec<ParsedUnit> = sources
        .into_par_iter()
        .map(|(path, text)| ParsedUnit::parse(path, text))
        .collect::<Result<_>>()?;

    let mut known = HashSet::new();
    for unit in &units {
        for decl in unit.declarations() {
            if let Some(name) = decl.child_by_field_name("name") {
                known.insert(qualify(&unit.package, unit.text(name)));
            }
        }
    }

    let mut symbols = Symbols::default();
    for unit in &units {
        let types = TypeResolver::new(&unit.imports, &unit.package, &known);
        for decl in unit.declarations() {
            let class = declare_class(unit, &types, decl);
            symbols.classes.insert(class.name.clone(), class);
        }
    }

    let mut classes = Vec::new();
    for unit in &units {
        let types = TypeResolver::new(&unit.imports, &unit.package, &known);
        for decl in unit.declarations() {
            let Some(name) = decl.child_by_field_name("name") else {
                continue;
            };
            let name = qualify(&unit.package, unit.text(name));
            let Some(skeleton) = symbols.classes.get(&name) else {
                continue;
            };
            classes.push(lower_bodies(unit, &types, &symbols, skeleton.clone(), decl));
        }
    }

    classes.sort_by(|a, b| a.name.cmp(&b.name));
    tracing::info!(units = units.len(), classes = classes.len(), "lowered java sources");
    Ok(classes)
}

/// Convenience for a single compilation unit.
pub fn lower_source(text: &str) -> Result<Vec<CompiledClass>> {
    lower_sources(vec![(PathBuf::from("<memory>"), text.to_string())])
}

struct ParsedUnit {
    path: PathBuf,
    text: String,
    tree: Tree,
    package: String,
    imports: Imports,
}

#[derive(Default)]
struct Imports {
    single: HashMap<String, String>,
    wildcards: Vec<String>,
}

impl ParsedUnit {
    fn parse(path: PathBuf, text: String) -> Result<Self> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_java::LANGUAGE.into())
            .map_err(|e| anyhow::anyhow!("failed to load the Java grammar: {e:?}"))?;
        let tree = parser
            .parse(&text, None)
            .with_context(|| format!("failed to parse {}", path.display()))?;

        let mut package = String::new();
        let mut imports = Imports::default();
        {
            let bytes = text.as_bytes();
            let root = tree.root_node();
            for child in named_children(root) {
                match child.kind() {
                    "package_declaration" => {
                        if let Some(name) = named_children(child)
                            .into_iter()
                            .find(|n| matches!(n.kind(), "scoped_identifier" | "identifier"))
                        {
                            package = node_text(&name, bytes).to_string();
                        }
                    }
                    "import_declaration" => collect_import(&child, bytes, &mut imports),
                    _ => {}
                }
            }
        }

        if tree.root_node().has_error() {
            tracing::warn!(
                path = %path.display(),
                "source has syntax errors; affected code becomes opaque"
            );
        }

        Ok(Self {
            path,
            text,
            tree,
            package,
            imports,
        })
    }

    fn declarations(&self) -> Vec<Node<'_>> {
        named_children(self.tree.root_node())
            .into_iter()
            .filter(|n| match n.kind() {
                "class_declaration" | "interface_declaration" => true,
                "enum_declaration" | "record_declaration" | "annotation_type_declaration" => {
                    tracing::debug!(
                        path = %self.path.display(),
                        kind = n.kind(),
                        "skipping unsupported declaration"
                    );
                    false
                }
                _ => false,
            })
            .collect()
    }

    fn text(&self, node: Node<'_>) -> &str {
        node_text(&node, self.text.as_bytes())
    }
}

fn collect_import(node: &Node<'_>, bytes: &[u8], imports: &mut Imports) {
    let mut is_static = false;
    let mut path = None;
    let mut wildcard = false;
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "static" => is_static = true,
            "scoped_identifier" | "identifier" => path = Some(node_text(&child, bytes).to_string()),
            "asterisk" => wildcard = true,
            _ => {}
        }
    }
    let Some(path) = path else {
        return;
    };
    if is_static {
        return;
    }
    if wildcard {
        imports.wildcards.push(path);
    } else if let Some((_, simple)) = path.rsplit_once('.') {
        imports.single.insert(simple.to_string(), path);
    }
}

/// Resolves type names the way a compiler would for one unit.
struct TypeResolver<'u> {
    imports: &'u Imports,
    package: &'u str,
    known: &'u HashSet<String>,
    type_vars: Vec<String>,
}

impl<'u> TypeResolver<'u> {
    fn new(imports: &'u Imports, package: &'u str, known: &'u HashSet<String>) -> Self {
        Self {
            imports,
            package,
            known,
            type_vars: Vec::new(),
        }
    }

    fn with_type_vars(&self, vars: Vec<String>) -> Self {
        let mut type_vars = self.type_vars.clone();
        type_vars.extend(vars);
        Self {
            imports: self.imports,
            package: self.package,
            known: self.known,
            type_vars,
        }
    }

    fn class_name(&self, raw: &str) -> String {
        if raw.contains('.') {
            return raw.to_string();
        }
        if self.type_vars.iter().any(|v| v == raw) {
            return OBJECT.to_string();
        }
        if let Some(full) = self.imports.single.get(raw) {
            return full.clone();
        }
        let local = qualify(self.package, raw);
        if self.known.contains(&local) {
            return local;
        }
        for prefix in &self.imports.wildcards {
            let candidate = format!("{prefix}.{raw}");
            if self.known.contains(&candidate) {
                return candidate;
            }
        }
        if JAVA_LANG.contains(&raw) {
            return format!("java.lang.{raw}");
        }
        local
    }

    /// Whether a bare identifier in expression position names a class.
    fn is_class_name(&self, raw: &str) -> bool {
        self.imports.single.contains_key(raw)
            || self.known.contains(&qualify(self.package, raw))
            || JAVA_LANG.contains(&raw)
    }

    fn type_of(&self, node: Node<'_>, bytes: &[u8]) -> TypeRef {
        match node.kind() {
            "integral_type" | "floating_point_type" | "boolean_type" | "void_type" => {
                TypeRef::new(node_text(&node, bytes))
            }
            "type_identifier" => TypeRef::new(self.class_name(node_text(&node, bytes))),
            "scoped_type_identifier" => TypeRef::new(normalize_whitespace(node_text(&node, bytes))),
            "generic_type" | "annotated_type" => match named_children(node).into_iter().find(|n| {
                !matches!(
                    n.kind(),
                    "type_arguments" | "marker_annotation" | "annotation"
                )
            }) {
                Some(inner) => self.type_of(inner, bytes),
                None => TypeRef::object(),
            },
            "array_type" => {
                let element = node
                    .child_by_field_name("element")
                    .map(|e| self.type_of(e, bytes))
                    .unwrap_or_else(TypeRef::object);
                let dims = node
                    .child_by_field_name("dimensions")
                    .map(|d| node_text(&d, bytes).matches('[').count())
                    .unwrap_or(1);
                TypeRef::new(format!("{element}{}", "[]".repeat(dims)))
            }
            _ => TypeRef::new(normalize_whitespace(node_text(&node, bytes))),
        }
    }
}

#[derive(Default)]
struct Symbols {
    classes: HashMap<String, CompiledClass>,
}

impl Symbols {
    fn find_field<'s>(&'s self, owner: &'s str, name: &str) -> Option<&'s FieldDescriptor> {
        let mut current = Some(owner);
        let mut hops = 0usize;
        while let Some(class_name) = current {
            let class = self.classes.get(class_name)?;
            if let Some(field) = class.field(name) {
                return Some(field);
            }
            hops += 1;
            if hops > self.classes.len() {
                return None;
            }
            current = class.super_name.as_deref();
        }
        None
    }

    fn find_method<'s>(&'s self, owner: &'s str, name: &str, argc: usize) -> Option<&'s Method> {
        let mut current = Some(owner);
        let mut hops = 0usize;
        while let Some(class_name) = current {
            let class = self.classes.get(class_name)?;
            let mut candidates = class
                .methods_named(name)
                .filter(|m| !m.is_constructor())
                .collect::<Vec<_>>();
            if !candidates.is_empty() {
                candidates.sort_by_key(|m| m.params.len() != argc);
                return candidates.first().copied();
            }
            hops += 1;
            if hops > self.classes.len() {
                return None;
            }
            current = class.super_name.as_deref();
        }
        None
    }
}

/// First pass: everything but bodies.
fn declare_class(unit: &ParsedUnit, types: &TypeResolver<'_>, decl: Node<'_>) -> CompiledClass {
    let bytes = unit.text.as_bytes();
    let is_interface = decl.kind() == "interface_declaration";
    let name = decl
        .child_by_field_name("name")
        .map(|n| unit.text(n))
        .unwrap_or_default();
    let types = types.with_type_vars(type_parameters(decl, bytes));

    let mut class = CompiledClass::new(qualify(&unit.package, name));
    let (modifiers, annotations) = modifiers_of(decl, bytes, &types);
    class.modifiers = modifiers;
    class.annotations = annotations;
    if is_interface {
        class.modifiers |= Modifiers::INTERFACE | Modifiers::ABSTRACT;
    }

    for child in named_children(decl) {
        match child.kind() {
            "superclass" => {
                class.super_name = named_children(child)
                    .into_iter()
                    .next()
                    .map(|t| types.type_of(t, bytes).0);
            }
            "super_interfaces" | "extends_interfaces" => {
                for list in named_children(child) {
                    for ty in named_children(list) {
                        class.interfaces.push(types.type_of(ty, bytes).0);
                    }
                }
            }
            _ => {}
        }
    }

    let Some(body) = decl.child_by_field_name("body") else {
        return class;
    };
    for member in named_children(body) {
        match member.kind() {
            "field_declaration" | "constant_declaration" => {
                let (mut modifiers, annotations) = modifiers_of(member, bytes, &types);
                if is_interface {
                    modifiers |= Modifiers::PUBLIC | Modifiers::STATIC | Modifiers::FINAL;
                }
                let Some(ty_node) = member.child_by_field_name("type") else {
                    continue;
                };
                let base = types.type_of(ty_node, bytes);
                for declarator in field_children(member, "declarator") {
                    let Some(field_name) = declarator.child_by_field_name("name") else {
                        continue;
                    };
                    let ty = with_dimensions(&base, declarator, bytes);
                    let mut field = FieldDescriptor::new(unit.text(field_name), ty)
                        .with_modifiers(modifiers);
                    field.annotations = annotations.clone();
                    class.fields.push(field);
                }
            }
            "method_declaration" => {
                let method_types = types.with_type_vars(type_parameters(member, bytes));
                let (mut modifiers, _) = modifiers_of(member, bytes, &method_types);
                let has_body = member.child_by_field_name("body").is_some();
                if is_interface {
                    modifiers |= Modifiers::PUBLIC;
                    if !has_body && !modifiers.contains(Modifiers::STATIC) {
                        modifiers |= Modifiers::ABSTRACT;
                    }
                }
                let return_type = member
                    .child_by_field_name("type")
                    .map(|t| method_types.type_of(t, bytes))
                    .unwrap_or_else(TypeRef::void);
                class.methods.push(Method {
                    name: member
                        .child_by_field_name("name")
                        .map(|n| unit.text(n).to_string())
                        .unwrap_or_default(),
                    kind: MethodKind::Method,
                    modifiers,
                    params: params_of(member, bytes, &method_types),
                    return_type,
                    body: None,
                });
            }
            "constructor_declaration" => {
                let ctor_types = types.with_type_vars(type_parameters(member, bytes));
                let (modifiers, _) = modifiers_of(member, bytes, &ctor_types);
                let mut ctor =
                    Method::constructor(params_of(member, bytes, &ctor_types), Vec::new());
                ctor.modifiers = modifiers;
                ctor.body = None;
                class.methods.push(ctor);
            }
            _ => {}
        }
    }
    class
}

/// Second pass: bodies, implicit `super()` and field initializers.
fn lower_bodies(
    unit: &ParsedUnit,
    types: &TypeResolver<'_>,
    symbols: &Symbols,
    mut class: CompiledClass,
    decl: Node<'_>,
) -> CompiledClass {
    let bytes = unit.text.as_bytes();
    let types = types.with_type_vars(type_parameters(decl, bytes));
    let is_interface = class.modifiers.contains(Modifiers::INTERFACE);
    let Some(body) = decl.child_by_field_name("body") else {
        return class;
    };

    let class_name = class.name.clone();
    let super_name = class.super_name.clone().unwrap_or_else(|| OBJECT.to_string());

    let mut initializers = Vec::new();
    let mut lowerer = BodyLowerer::new(symbols, &types, bytes, &class_name, &super_name);
    for member in named_children(body) {
        if member.kind() != "field_declaration" || is_interface {
            continue;
        }
        let (modifiers, _) = modifiers_of(member, bytes, &types);
        if modifiers.contains(Modifiers::STATIC) {
            continue;
        }
        for declarator in field_children(member, "declarator") {
            let (Some(name), Some(value)) = (
                declarator.child_by_field_name("name"),
                declarator.child_by_field_name("value"),
            ) else {
                continue;
            };
            let name = unit.text(name);
            let Some(field) = class.field(name).cloned() else {
                continue;
            };
            let (value, _) = lowerer.expr(value);
            initializers.push(Stmt::Expr(Expr::put_field(
                Expr::This,
                &class_name,
                name,
                field.ty,
                value,
            )));
        }
    }

    let mut index = 0usize;
    for member in named_children(body) {
        let is_constructor = match member.kind() {
            "method_declaration" => false,
            "constructor_declaration" => true,
            _ => continue,
        };
        let member_types = types.with_type_vars(type_parameters(member, bytes));
        let mut lowerer = BodyLowerer::new(symbols, &member_types, bytes, &class_name, &super_name);
        let params = class.methods[index].params.clone();
        let block = member.child_by_field_name("body");
        class.methods[index].body = match (is_constructor, block) {
            (true, Some(block)) => Some(lowerer.constructor_body(&params, block, &initializers)),
            (true, None) => Some(Vec::new()),
            (false, Some(block)) => Some(lowerer.method_body(&params, block)),
            (false, None) => None,
        };
        index += 1;
    }

    if !is_interface && !class.methods.iter().any(Method::is_constructor) {
        let lowerer = BodyLowerer::new(symbols, &types, bytes, &class_name, &super_name);
        let mut body = vec![lowerer.super_call(Vec::new())];
        body.extend(initializers);
        let mut ctor = Method::constructor(Vec::new(), body);
        ctor.modifiers =
            class.modifiers & (Modifiers::PUBLIC | Modifiers::PROTECTED | Modifiers::PRIVATE);
        class.methods.push(ctor);
    }
    class
}

/// A field reference resolved against declarations. `target` is `None` for
/// static fields.
struct FieldRef {
    target: Option<Expr>,
    owner: String,
    field: String,
    ty: TypeRef,
}

impl FieldRef {
    fn read(&self) -> Expr {
        match &self.target {
            Some(target) => {
                Expr::get_field(target.clone(), &self.owner, &self.field, self.ty.clone())
            }
            None => Expr::GetStatic {
                owner: self.owner.clone(),
                field: self.field.clone(),
                ty: self.ty.clone(),
            },
        }
    }

    fn write(self, value: Expr) -> Expr {
        match self.target {
            Some(target) => Expr::put_field(target, &self.owner, &self.field, self.ty, value),
            None => Expr::PutStatic {
                owner: self.owner,
                field: self.field,
                ty: self.ty,
                value: Box::new(value),
            },
        }
    }

    /// Reading the target twice is only safe when it has no side effects.
    fn target_is_pure(&self) -> bool {
        matches!(self.target, None | Some(Expr::This) | Some(Expr::Local(_)))
    }
}

enum Receiver {
    Instance(Expr, TypeRef),
    Static(String),
    Super,
}

struct BodyLowerer<'a> {
    symbols: &'a Symbols,
    types: &'a TypeResolver<'a>,
    bytes: &'a [u8],
    class: String,
    super_name: String,
    scopes: Vec<HashMap<String, TypeRef>>,
}

impl<'a> BodyLowerer<'a> {
    fn new(
        symbols: &'a Symbols,
        types: &'a TypeResolver<'a>,
        bytes: &'a [u8],
        class: &str,
        super_name: &str,
    ) -> Self {
        Self {
            symbols,
            types,
            bytes,
            class: class.to_string(),
            super_name: super_name.to_string(),
            scopes: Vec::new(),
        }
    }

    fn method_body(&mut self, params: &[Param], block: Node<'_>) -> Vec<Stmt> {
        self.enter_params(params);
        let body = self.statements(block);
        self.scopes.clear();
        body
    }

    fn constructor_body(
        &mut self,
        params: &[Param],
        block: Node<'_>,
        initializers: &[Stmt],
    ) -> Vec<Stmt> {
        self.enter_params(params);
        let mut children = named_children(block).into_iter().peekable();
        let mut body = Vec::new();

        let explicit = children
            .next_if(|n| n.kind() == "explicit_constructor_invocation")
            .map(|n| self.explicit_invocation(n));
        match explicit {
            Some((call, delegates_to_this)) => {
                body.push(call);
                if !delegates_to_this {
                    body.extend(initializers.iter().cloned());
                }
            }
            None => {
                body.push(self.super_call(Vec::new()));
                body.extend(initializers.iter().cloned());
            }
        }
        for child in children {
            body.extend(self.stmt(child));
        }
        self.scopes.clear();
        body
    }

    fn enter_params(&mut self, params: &[Param]) {
        self.scopes.clear();
        self.scopes.push(
            params
                .iter()
                .map(|p| (p.name.clone(), p.ty.clone()))
                .collect(),
        );
    }

    fn super_call(&self, args: Vec<Expr>) -> Stmt {
        Stmt::Expr(Expr::invoke(
            Some(Expr::This),
            &self.super_name,
            CONSTRUCTOR_NAME,
            args,
            TypeRef::void(),
        ))
    }

    fn explicit_invocation(&mut self, node: Node<'_>) -> (Stmt, bool) {
        let to_this = node
            .child_by_field_name("constructor")
            .is_some_and(|c| c.kind() == "this");
        let args = self.arguments(node);
        if to_this {
            let call = Expr::invoke(
                Some(Expr::This),
                &self.class,
                CONSTRUCTOR_NAME,
                args,
                TypeRef::void(),
            );
            (Stmt::Expr(call), true)
        } else {
            (self.super_call(args), false)
        }
    }

    fn statements(&mut self, block: Node<'_>) -> Vec<Stmt> {
        self.scopes.push(HashMap::new());
        let mut out = Vec::new();
        for child in named_children(block) {
            out.extend(self.stmt(child));
        }
        self.scopes.pop();
        out
    }

    fn branch(&mut self, node: Node<'_>) -> Vec<Stmt> {
        if node.kind() == "block" {
            self.statements(node)
        } else {
            self.scopes.push(HashMap::new());
            let out = self.stmt(node);
            self.scopes.pop();
            out
        }
    }

    fn stmt(&mut self, node: Node<'_>) -> Vec<Stmt> {
        match node.kind() {
            "expression_statement" => {
                let Some(inner) = named_children(node).into_iter().next() else {
                    return Vec::new();
                };
                vec![Stmt::Expr(self.statement_expr(inner))]
            }
            "local_variable_declaration" => {
                let Some(ty_node) = node.child_by_field_name("type") else {
                    return vec![self.opaque_stmt(node)];
                };
                let declared = self.types.type_of(ty_node, self.bytes);
                let mut out = Vec::new();
                for declarator in field_children(node, "declarator") {
                    let Some(name) = declarator.child_by_field_name("name") else {
                        continue;
                    };
                    let name = node_text(&name, self.bytes).to_string();
                    let init = declarator.child_by_field_name("value").map(|v| self.expr(v));
                    let ty = match (&init, declared.as_str()) {
                        (Some((_, inferred)), "var") => inferred.clone(),
                        _ => with_dimensions(&declared, declarator, self.bytes),
                    };
                    self.declare(&name, ty.clone());
                    out.push(Stmt::Local {
                        name,
                        ty,
                        init: init.map(|(e, _)| e),
                    });
                }
                out
            }
            "return_statement" => {
                let value = named_children(node).into_iter().next().map(|v| self.expr(v).0);
                vec![Stmt::Return(value)]
            }
            "if_statement" => {
                let (Some(cond), Some(then_node)) = (
                    node.child_by_field_name("condition"),
                    node.child_by_field_name("consequence"),
                ) else {
                    return vec![self.opaque_stmt(node)];
                };
                let cond = self.expr(cond).0;
                let then_branch = self.branch(then_node);
                let else_branch = node
                    .child_by_field_name("alternative")
                    .map(|n| self.branch(n))
                    .unwrap_or_default();
                vec![Stmt::If {
                    cond,
                    then_branch,
                    else_branch,
                }]
            }
            "while_statement" => {
                let (Some(cond), Some(body)) = (
                    node.child_by_field_name("condition"),
                    node.child_by_field_name("body"),
                ) else {
                    return vec![self.opaque_stmt(node)];
                };
                let cond = self.expr(cond).0;
                let body = self.branch(body);
                vec![Stmt::While { cond, body }]
            }
            "for_statement" => {
                self.scopes.push(HashMap::new());
                let mut init = Vec::new();
                for n in field_children(node, "init") {
                    match n.kind() {
                        "local_variable_declaration" => init.extend(self.stmt(n)),
                        _ => init.push(Stmt::Expr(self.statement_expr(n))),
                    }
                }
                let cond = node.child_by_field_name("condition").map(|c| self.expr(c).0);
                let update = field_children(node, "update")
                    .into_iter()
                    .map(|n| self.statement_expr(n))
                    .collect();
                let body = node
                    .child_by_field_name("body")
                    .map(|b| self.branch(b))
                    .unwrap_or_default();
                self.scopes.pop();
                vec![Stmt::For {
                    init,
                    cond,
                    update,
                    body,
                }]
            }
            "enhanced_for_statement" => self.for_each(node),
            "try_statement" => self.try_statement(node),
            "throw_statement" => match named_children(node).into_iter().next() {
                Some(value) => vec![Stmt::Throw(self.expr(value).0)],
                None => vec![self.opaque_stmt(node)],
            },
            "block" => vec![Stmt::Block(self.statements(node))],
            "line_comment" | "block_comment" => Vec::new(),
            _ => vec![self.opaque_stmt(node)],
        }
    }

    /// An expression in statement position, where `x++` is allowed.
    fn statement_expr(&mut self, node: Node<'_>) -> Expr {
        match node.kind() {
            "update_expression" => self.update(node),
            _ => self.expr(node).0,
        }
    }

    fn for_each(&mut self, node: Node<'_>) -> Vec<Stmt> {
        let (Some(ty_node), Some(name), Some(value), Some(body)) = (
            node.child_by_field_name("type"),
            node.child_by_field_name("name"),
            node.child_by_field_name("value"),
            node.child_by_field_name("body"),
        ) else {
            return vec![self.opaque_stmt(node)];
        };
        let declared = self.types.type_of(ty_node, self.bytes);
        let (iterable, iterable_ty) = self.expr(value);
        let ty = if declared.as_str() == "var" {
            iterable_ty
                .as_str()
                .strip_suffix("[]")
                .map(TypeRef::new)
                .unwrap_or_else(TypeRef::object)
        } else {
            declared
        };

        let name = node_text(&name, self.bytes).to_string();
        self.scopes.push(HashMap::new());
        self.declare(&name, ty.clone());
        let body = self.branch(body);
        self.scopes.pop();
        vec![Stmt::ForEach {
            name,
            ty,
            iterable,
            body,
        }]
    }

    fn try_statement(&mut self, node: Node<'_>) -> Vec<Stmt> {
        let Some(block) = node.child_by_field_name("body") else {
            return vec![self.opaque_stmt(node)];
        };
        let body = self.statements(block);
        let mut catches = Vec::new();
        let mut finally = None;
        for child in named_children(node) {
            match child.kind() {
                "catch_clause" => match self.catch_clause(child) {
                    Some(clause) => catches.push(clause),
                    None => return vec![self.opaque_stmt(node)],
                },
                "finally_clause" => {
                    finally = named_children(child)
                        .into_iter()
                        .find(|n| n.kind() == "block")
                        .map(|b| self.statements(b));
                }
                _ => {}
            }
        }
        vec![Stmt::Try {
            body,
            catches,
            finally,
        }]
    }

    fn catch_clause(&mut self, node: Node<'_>) -> Option<CatchClause> {
        let param = named_children(node)
            .into_iter()
            .find(|n| n.kind() == "catch_formal_parameter")?;
        let name = node_text(&param.child_by_field_name("name")?, self.bytes).to_string();
        let types: Vec<TypeRef> = named_children(param)
            .into_iter()
            .find(|n| n.kind() == "catch_type")
            .map(|t| {
                named_children(t)
                    .into_iter()
                    .map(|ty| self.types.type_of(ty, self.bytes))
                    .collect()
            })
            .unwrap_or_default();
        let declared = match types.as_slice() {
            [] => return None,
            [single] => single.clone(),
            _ => TypeRef::new("java.lang.Throwable"),
        };
        let block = node.child_by_field_name("body")?;

        self.scopes.push(HashMap::new());
        self.declare(&name, declared);
        let body = self.statements(block);
        self.scopes.pop();
        Some(CatchClause { name, types, body })
    }

    fn expr(&mut self, node: Node<'_>) -> (Expr, TypeRef) {
        match node.kind() {
            "parenthesized_expression" => match named_children(node).into_iter().next() {
                Some(inner) => self.expr(inner),
                None => self.opaque(node),
            },
            "this" => (Expr::This, TypeRef::new(self.class.as_str())),
            "null_literal" => (Expr::Literal(Literal::Null), TypeRef::object()),
            "true" => (Expr::Literal(Literal::Bool(true)), TypeRef::boolean()),
            "false" => (Expr::Literal(Literal::Bool(false)), TypeRef::boolean()),
            "decimal_integer_literal" => {
                let raw = node_text(&node, self.bytes).replace('_', "");
                let long = raw.ends_with(['l', 'L']);
                match raw.trim_end_matches(['l', 'L']).parse::<i64>() {
                    Ok(value) => (
                        Expr::Literal(Literal::Int(value)),
                        TypeRef::new(if long { "long" } else { "int" }),
                    ),
                    Err(_) => self.opaque(node),
                }
            }
            "string_literal" => {
                let raw = node_text(&node, self.bytes);
                let inner = raw
                    .strip_prefix('"')
                    .and_then(|s| s.strip_suffix('"'))
                    .unwrap_or(raw);
                (Expr::str(inner), TypeRef::string())
            }
            "identifier" => {
                let name = node_text(&node, self.bytes);
                if let Some(ty) = self.local(name) {
                    return (Expr::local(name), ty);
                }
                match self.implicit_field(name) {
                    Some(field) => {
                        let ty = field.ty.clone();
                        (field.read(), ty)
                    }
                    None => self.opaque(node),
                }
            }
            "field_access" => match self.field_ref(node) {
                Some(field) => {
                    let ty = field.ty.clone();
                    (field.read(), ty)
                }
                None => self.opaque(node),
            },
            "assignment_expression" => self.assignment(node),
            "binary_expression" => {
                let (Some(lhs), Some(op), Some(rhs)) = (
                    node.child_by_field_name("left"),
                    node.child_by_field_name("operator"),
                    node.child_by_field_name("right"),
                ) else {
                    return self.opaque(node);
                };
                let op = op.kind().to_string();
                let (lhs, lty) = self.expr(lhs);
                let (rhs, rty) = self.expr(rhs);
                let ty = binary_type(&op, &lty, &rty);
                (Expr::binary(&op, lhs, rhs), ty)
            }
            "unary_expression" => {
                let (Some(op), Some(operand)) = (
                    node.child_by_field_name("operator"),
                    node.child_by_field_name("operand"),
                ) else {
                    return self.opaque(node);
                };
                let op = op.kind().to_string();
                let (operand, ty) = self.expr(operand);
                let ty = if op == "!" { TypeRef::boolean() } else { ty };
                (
                    Expr::Unary {
                        op,
                        operand: Box::new(operand),
                    },
                    ty,
                )
            }
            "ternary_expression" => {
                let (Some(cond), Some(then_node), Some(else_node)) = (
                    node.child_by_field_name("condition"),
                    node.child_by_field_name("consequence"),
                    node.child_by_field_name("alternative"),
                ) else {
                    return self.opaque(node);
                };
                let (cond, _) = self.expr(cond);
                let (then_value, ty) = self.expr(then_node);
                let (else_value, _) = self.expr(else_node);
                (
                    Expr::Conditional {
                        cond: Box::new(cond),
                        then_value: Box::new(then_value),
                        else_value: Box::new(else_value),
                    },
                    ty,
                )
            }
            "method_invocation" => self.invocation(node),
            "object_creation_expression" => {
                let has_body = named_children(node).iter().any(|n| n.kind() == "class_body");
                let Some(ty_node) = node.child_by_field_name("type") else {
                    return self.opaque(node);
                };
                if has_body {
                    return self.opaque(node);
                }
                let ty = self.types.type_of(ty_node, self.bytes);
                let args = self.arguments(node);
                (
                    Expr::New {
                        class: ty.0.clone(),
                        args,
                    },
                    ty,
                )
            }
            "cast_expression" => {
                let (Some(ty_node), Some(value)) = (
                    node.child_by_field_name("type"),
                    node.child_by_field_name("value"),
                ) else {
                    return self.opaque(node);
                };
                let ty = self.types.type_of(ty_node, self.bytes);
                let (value, _) = self.expr(value);
                (
                    Expr::Cast {
                        ty: ty.clone(),
                        value: Box::new(value),
                    },
                    ty,
                )
            }
            "instanceof_expression" => {
                let (Some(value), Some(class)) = (
                    node.child_by_field_name("left"),
                    node.child_by_field_name("right"),
                ) else {
                    return self.opaque(node);
                };
                if node.child_by_field_name("name").is_some() {
                    return self.opaque(node);
                }
                let class = self.types.type_of(class, self.bytes).0;
                let (value, _) = self.expr(value);
                (
                    Expr::InstanceOf {
                        value: Box::new(value),
                        class,
                    },
                    TypeRef::boolean(),
                )
            }
            _ => self.opaque(node),
        }
    }

    fn assignment(&mut self, node: Node<'_>) -> (Expr, TypeRef) {
        let (Some(left), Some(op), Some(right)) = (
            node.child_by_field_name("left"),
            node.child_by_field_name("operator"),
            node.child_by_field_name("right"),
        ) else {
            return self.opaque(node);
        };
        let op = op.kind();
        let compound = op.strip_suffix('=').filter(|o| !o.is_empty());
        let (rhs, _) = self.expr(right);

        if left.kind() == "identifier" {
            let name = node_text(&left, self.bytes);
            if let Some(ty) = self.local(name) {
                let value = match compound {
                    Some(bin) => Expr::binary(bin, Expr::local(name), rhs),
                    None => rhs,
                };
                return (
                    Expr::AssignLocal {
                        name: name.to_string(),
                        value: Box::new(value),
                    },
                    ty,
                );
            }
        }

        let field = match left.kind() {
            "identifier" => self.implicit_field(node_text(&left, self.bytes)),
            "field_access" => self.field_ref(left),
            _ => None,
        };
        let Some(field) = field else {
            return self.opaque(node);
        };
        let value = match compound {
            Some(_) if !field.target_is_pure() => return self.opaque(node),
            Some(bin) => Expr::binary(bin, field.read(), rhs),
            None => rhs,
        };
        let ty = field.ty.clone();
        (field.write(value), ty)
    }

    /// `x++`, `--p.count` and friends, only as whole statements.
    fn update(&mut self, node: Node<'_>) -> Expr {
        let text = node_text(&node, self.bytes);
        let op = if text.contains("++") { "+" } else { "-" };
        let Some(operand) = named_children(node).into_iter().next() else {
            return self.opaque(node).0;
        };
        let one = Expr::Literal(Literal::Int(1));

        if operand.kind() == "identifier" {
            let name = node_text(&operand, self.bytes);
            if self.local(name).is_some() {
                return Expr::AssignLocal {
                    name: name.to_string(),
                    value: Box::new(Expr::binary(op, Expr::local(name), one)),
                };
            }
        }
        let field = match operand.kind() {
            "identifier" => self.implicit_field(node_text(&operand, self.bytes)),
            "field_access" => self.field_ref(operand),
            _ => None,
        };
        match field {
            Some(field) if field.target_is_pure() => {
                let value = Expr::binary(op, field.read(), one);
                field.write(value)
            }
            _ => self.opaque(node).0,
        }
    }

    fn invocation(&mut self, node: Node<'_>) -> (Expr, TypeRef) {
        let Some(name) = node.child_by_field_name("name") else {
            return self.opaque(node);
        };
        let name = node_text(&name, self.bytes).to_string();
        let args = self.arguments(node);

        let (target, owner) = match node.child_by_field_name("object") {
            None => {
                let is_static = self
                    .symbols
                    .find_method(&self.class, &name, args.len())
                    .is_some_and(Method::is_static);
                let target = (!is_static).then_some(Expr::This);
                (target, self.class.clone())
            }
            Some(object) => match self.receiver(object) {
                Receiver::Super => (Some(Expr::This), self.super_name.clone()),
                Receiver::Static(class) => (None, class),
                Receiver::Instance(expr, ty) => {
                    if ty.is_primitive() || ty.as_str().ends_with("[]") {
                        return self.opaque(node);
                    }
                    (Some(expr), ty.0)
                }
            },
        };

        let return_type = self
            .symbols
            .find_method(&owner, &name, args.len())
            .map(|m| m.return_type.clone())
            .unwrap_or_else(|| well_known_return(&name));
        (
            Expr::invoke(target, &owner, &name, args, return_type.clone()),
            return_type,
        )
    }

    fn receiver(&mut self, node: Node<'_>) -> Receiver {
        match node.kind() {
            "super" => Receiver::Super,
            "identifier" => {
                let name = node_text(&node, self.bytes);
                if self.local(name).is_none()
                    && self.implicit_field(name).is_none()
                    && self.types.is_class_name(name)
                {
                    return Receiver::Static(self.types.class_name(name));
                }
                let (expr, ty) = self.expr(node);
                Receiver::Instance(expr, ty)
            }
            _ => {
                let (expr, ty) = self.expr(node);
                Receiver::Instance(expr, ty)
            }
        }
    }

    fn field_ref(&mut self, node: Node<'_>) -> Option<FieldRef> {
        let object = node.child_by_field_name("object")?;
        let field = node_text(&node.child_by_field_name("field")?, self.bytes).to_string();

        match self.receiver(object) {
            Receiver::Super => {
                let descriptor = self.symbols.find_field(&self.super_name, &field)?;
                Some(FieldRef {
                    target: (!descriptor.is_static()).then_some(Expr::This),
                    owner: self.super_name.clone(),
                    ty: descriptor.ty.clone(),
                    field,
                })
            }
            Receiver::Static(class) => {
                let descriptor = self.symbols.find_field(&class, &field)?;
                Some(FieldRef {
                    target: None,
                    ty: descriptor.ty.clone(),
                    owner: class,
                    field,
                })
            }
            Receiver::Instance(expr, ty) => {
                if matches!(expr, Expr::Opaque(_)) {
                    return None;
                }
                let descriptor = self.symbols.find_field(ty.as_str(), &field)?;
                Some(FieldRef {
                    target: (!descriptor.is_static()).then_some(expr),
                    ty: descriptor.ty.clone(),
                    owner: ty.0,
                    field,
                })
            }
        }
    }

    /// A bare name that is not a local: a field of this class or an ancestor.
    fn implicit_field(&self, name: &str) -> Option<FieldRef> {
        let descriptor = self.symbols.find_field(&self.class, name)?;
        Some(FieldRef {
            target: (!descriptor.is_static()).then_some(Expr::This),
            owner: self.class.clone(),
            field: name.to_string(),
            ty: descriptor.ty.clone(),
        })
    }

    fn arguments(&mut self, node: Node<'_>) -> Vec<Expr> {
        let Some(list) = node.child_by_field_name("arguments") else {
            return Vec::new();
        };
        named_children(list)
            .into_iter()
            .map(|arg| self.expr(arg).0)
            .collect()
    }

    fn local(&self, name: &str) -> Option<TypeRef> {
        self.scopes.iter().rev().find_map(|s| s.get(name).cloned())
    }

    fn declare(&mut self, name: &str, ty: TypeRef) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), ty);
        }
    }

    fn opaque(&mut self, node: Node<'_>) -> (Expr, TypeRef) {
        (Expr::Opaque(self.opaque_code(node)), TypeRef::object())
    }

    fn opaque_stmt(&mut self, node: Node<'_>) -> Stmt {
        Stmt::Opaque(self.opaque_code(node))
    }

    fn opaque_code(&mut self, node: Node<'_>) -> OpaqueCode {
        OpaqueCode {
            text: normalize_whitespace(node_text(&node, self.bytes)),
            fields: self.field_mentions(node),
        }
    }

    /// Field accesses anywhere under `node`, resolved as far as the current
    /// scope allows. Names declared inside the node itself are not in scope,
    /// so a mention may be a false positive but never a miss.
    fn field_mentions(&mut self, node: Node<'_>) -> Vec<FieldMention> {
        let mut found = BTreeSet::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            match current.kind() {
                "field_access" => {
                    let name = current
                        .child_by_field_name("field")
                        .map(|f| node_text(&f, self.bytes).to_string());
                    match (self.field_ref(current), name) {
                        (Some(field), _) => {
                            found.insert(FieldMention {
                                owner: Some(field.owner),
                                field: field.field,
                            });
                        }
                        (None, Some(name)) => {
                            found.insert(FieldMention {
                                owner: None,
                                field: name,
                            });
                        }
                        (None, None) => {}
                    }
                }
                "identifier" if is_value_identifier(current) => {
                    let name = node_text(&current, self.bytes);
                    let field = match self.local(name) {
                        Some(_) => None,
                        None => self.implicit_field(name),
                    };
                    if let Some(field) = field {
                        found.insert(FieldMention {
                            owner: Some(field.owner),
                            field: field.field,
                        });
                    }
                }
                _ => {}
            }
            stack.extend(named_children(current));
        }
        found.into_iter().collect()
    }
}

/// An identifier used as a value, not as a declared or member name.
fn is_value_identifier(node: Node<'_>) -> bool {
    let Some(parent) = node.parent() else {
        return true;
    };
    if ["name", "field", "parameters", "label"]
        .iter()
        .any(|f| parent.child_by_field_name(*f) == Some(node))
    {
        return false;
    }
    !matches!(
        parent.kind(),
        "inferred_parameters"
            | "labeled_statement"
            | "break_statement"
            | "continue_statement"
            | "method_reference"
            | "scoped_identifier"
    )
}

fn binary_type(op: &str, lhs: &TypeRef, rhs: &TypeRef) -> TypeRef {
    match op {
        "==" | "!=" | "<" | ">" | "<=" | ">=" | "&&" | "||" => TypeRef::boolean(),
        "+" if *lhs == TypeRef::string() || *rhs == TypeRef::string() => TypeRef::string(),
        _ => lhs.clone(),
    }
}

fn well_known_return(method: &str) -> TypeRef {
    match method {
        "toString" | "name" | "trim" | "toUpperCase" | "toLowerCase" | "substring" => {
            TypeRef::string()
        }
        "equals" | "isEmpty" | "contains" | "startsWith" | "endsWith" => TypeRef::boolean(),
        "hashCode" | "length" | "size" | "compareTo" | "indexOf" => TypeRef::new("int"),
        _ => TypeRef::object(),
    }
}

fn modifiers_of(
    node: Node<'_>,
    bytes: &[u8],
    types: &TypeResolver<'_>,
) -> (Modifiers, Vec<String>) {
    let mut modifiers = Modifiers::empty();
    let mut annotations = Vec::new();
    let Some(list) = children(node).into_iter().find(|c| c.kind() == "modifiers") else {
        return (modifiers, annotations);
    };
    for m in children(list) {
        match m.kind() {
            "public" => modifiers |= Modifiers::PUBLIC,
            "private" => modifiers |= Modifiers::PRIVATE,
            "protected" => modifiers |= Modifiers::PROTECTED,
            "static" => modifiers |= Modifiers::STATIC,
            "final" => modifiers |= Modifiers::FINAL,
            "abstract" => modifiers |= Modifiers::ABSTRACT,
            "volatile" => modifiers |= Modifiers::VOLATILE,
            "transient" => modifiers |= Modifiers::TRANSIENT,
            "native" => modifiers |= Modifiers::NATIVE,
            "marker_annotation" | "annotation" => {
                if let Some(name) = m.child_by_field_name("name") {
                    annotations.push(types.class_name(node_text(&name, bytes)));
                }
            }
            _ => {}
        }
    }
    (modifiers, annotations)
}

fn params_of(node: Node<'_>, bytes: &[u8], types: &TypeResolver<'_>) -> Vec<Param> {
    let Some(list) = node.child_by_field_name("parameters") else {
        return Vec::new();
    };
    named_children(list)
        .into_iter()
        .filter(|p| matches!(p.kind(), "formal_parameter" | "spread_parameter"))
        .filter_map(|p| {
            let name = p.child_by_field_name("name").or_else(|| {
                named_children(p)
                    .into_iter()
                    .find(|c| c.kind() == "variable_declarator")
                    .and_then(|d| d.child_by_field_name("name"))
            })?;
            let ty_node = p.child_by_field_name("type").or_else(|| {
                named_children(p)
                    .into_iter()
                    .find(|c| !matches!(c.kind(), "modifiers" | "variable_declarator"))
            })?;
            let mut ty = with_dimensions(&types.type_of(ty_node, bytes), p, bytes);
            if p.kind() == "spread_parameter" {
                ty = TypeRef::new(format!("{ty}[]"));
            }
            Some(Param {
                name: node_text(&name, bytes).to_string(),
                ty,
            })
        })
        .collect()
}

fn type_parameters(node: Node<'_>, bytes: &[u8]) -> Vec<String> {
    let Some(list) = children(node).into_iter().find(|c| c.kind() == "type_parameters") else {
        return Vec::new();
    };
    named_children(list)
        .into_iter()
        .filter(|p| p.kind() == "type_parameter")
        .filter_map(|p| {
            named_children(p)
                .into_iter()
                .find(|n| matches!(n.kind(), "type_identifier" | "identifier"))
                .map(|n| node_text(&n, bytes).to_string())
        })
        .collect()
}

/// `int xs[]` declares an array even though the type node says `int`.
fn with_dimensions(base: &TypeRef, declarator: Node<'_>, bytes: &[u8]) -> TypeRef {
    match declarator.child_by_field_name("dimensions") {
        Some(dims) => TypeRef::new(format!(
            "{base}{}",
            "[]".repeat(node_text(&dims, bytes).matches('[').count())
        )),
        None => base.clone(),
    }
}

fn qualify(package: &str, simple: &str) -> String {
    if package.is_empty() {
        simple.to_string()
    } else {
        format!("{package}.{simple}")
    }
}

fn named_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    let nodes = node
        .named_children(&mut cursor)
        .filter(|n| !n.is_extra())
        .collect();
    nodes
}

fn children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    let nodes = node.children(&mut cursor).collect();
    nodes
}

fn field_children<'t>(node: Node<'t>, field: &str) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    let nodes = node.children_by_field_name(field, &mut cursor).collect();
    nodes
}

fn node_text<'a>(node: &Node<'_>, source: &'a [u8]) -> &'a str {
    node.utf8_text(source).unwrap_or("")
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
