//! Structural view of a compiled class.
//!
//! This is the form the pass reads and mutates: a class header, its declared
//! fields and its methods with statement-level bodies. Field instructions keep
//! the apparent owner class and the field type the way bytecode field
//! instructions do, so a body can be rewritten without re-running any type
//! inference.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const CONSTRUCTOR_NAME: &str = "<init>";

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct Modifiers: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const VOLATILE = 0x0040;
        const TRANSIENT = 0x0080;
        const NATIVE = 0x0100;
        const INTERFACE = 0x0200;
        const ABSTRACT = 0x0400;
        const SYNTHETIC = 0x1000;
    }
}

/// A type as written in a descriptor: `int`, `void`, `java.lang.String`,
/// `com.example.Person[]`. Generic arguments are erased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeRef(pub String);

impl TypeRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn void() -> Self {
        Self("void".to_string())
    }

    pub fn boolean() -> Self {
        Self("boolean".to_string())
    }

    pub fn object() -> Self {
        Self("java.lang.Object".to_string())
    }

    pub fn string() -> Self {
        Self("java.lang.String".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_void(&self) -> bool {
        self.0 == "void"
    }

    pub fn is_primitive(&self) -> bool {
        matches!(
            self.0.as_str(),
            "boolean" | "byte" | "char" | "short" | "int" | "long" | "float" | "double" | "void"
        )
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledClass {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub super_name: Option<String>,
    #[serde(default)]
    pub interfaces: Vec<String>,
    #[serde(default)]
    pub annotations: Vec<String>,
    #[serde(default)]
    pub modifiers: Modifiers,
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
    #[serde(default)]
    pub methods: Vec<Method>,
}

impl CompiledClass {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            super_name: None,
            interfaces: Vec::new(),
            annotations: Vec::new(),
            modifiers: Modifiers::PUBLIC,
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn simple_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    pub fn package(&self) -> &str {
        self.name.rsplit_once('.').map(|(p, _)| p).unwrap_or("")
    }

    pub fn has_annotation(&self, annotation: &str) -> bool {
        self.annotations.iter().any(|a| a == annotation)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Name-only lookup; overloads are not distinguished.
    pub fn has_method_named(&self, name: &str) -> bool {
        self.methods.iter().any(|m| m.name == name)
    }

    pub fn methods_named<'a, 'n>(&'a self, name: &'n str) -> impl Iterator<Item = &'a Method> {
        self.methods.iter().filter(move |m| m.name == name)
    }

    pub fn constructors(&self) -> impl Iterator<Item = &Method> {
        self.methods.iter().filter(|m| m.kind == MethodKind::Constructor)
    }

    pub fn header(&self) -> ClassHeader {
        ClassHeader {
            name: self.name.clone(),
            super_name: self.super_name.clone(),
            interfaces: self.interfaces.clone(),
            annotations: self.annotations.clone(),
        }
    }
}

/// The parts of a class that classification looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassHeader {
    pub name: String,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub annotations: Vec<String>,
}

impl ClassHeader {
    pub fn has_annotation(&self, annotation: &str) -> bool {
        self.annotations.iter().any(|a| a == annotation)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub ty: TypeRef,
    #[serde(default)]
    pub modifiers: Modifiers,
    #[serde(default)]
    pub annotations: Vec<String>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
            modifiers: Modifiers::PRIVATE,
            annotations: Vec::new(),
        }
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn with_annotation(mut self, annotation: impl Into<String>) -> Self {
        self.annotations.push(annotation.into());
        self
    }

    pub fn is_static(&self) -> bool {
        self.modifiers.contains(Modifiers::STATIC)
    }

    pub fn is_transient(&self) -> bool {
        self.modifiers.contains(Modifiers::TRANSIENT)
    }

    pub fn has_annotation(&self, annotation: &str) -> bool {
        self.annotations.iter().any(|a| a == annotation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodKind {
    Method,
    Constructor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: TypeRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Method {
    pub name: String,
    pub kind: MethodKind,
    #[serde(default)]
    pub modifiers: Modifiers,
    #[serde(default)]
    pub params: Vec<Param>,
    pub return_type: TypeRef,
    /// `None` for abstract and native methods.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Vec<Stmt>>,
}

impl Method {
    pub fn new(name: impl Into<String>, return_type: TypeRef, body: Vec<Stmt>) -> Self {
        Self {
            name: name.into(),
            kind: MethodKind::Method,
            modifiers: Modifiers::PUBLIC,
            params: Vec::new(),
            return_type,
            body: Some(body),
        }
    }

    pub fn constructor(params: Vec<Param>, body: Vec<Stmt>) -> Self {
        Self {
            name: CONSTRUCTOR_NAME.to_string(),
            kind: MethodKind::Constructor,
            modifiers: Modifiers::PUBLIC,
            params,
            return_type: TypeRef::void(),
            body: Some(body),
        }
    }

    pub fn with_params(mut self, params: Vec<Param>) -> Self {
        self.params = params;
        self
    }

    pub fn is_static(&self) -> bool {
        self.modifiers.contains(Modifiers::STATIC)
    }

    pub fn is_constructor(&self) -> bool {
        self.kind == MethodKind::Constructor
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stmt {
    Expr(Expr),
    Local {
        name: String,
        ty: TypeRef,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        init: Option<Expr>,
    },
    Return(Option<Expr>),
    If {
        cond: Expr,
        then_branch: Vec<Stmt>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        else_branch: Vec<Stmt>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    For {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        init: Vec<Stmt>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cond: Option<Expr>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        update: Vec<Expr>,
        body: Vec<Stmt>,
    },
    ForEach {
        name: String,
        ty: TypeRef,
        iterable: Expr,
        body: Vec<Stmt>,
    },
    Throw(Expr),
    Try {
        body: Vec<Stmt>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        catches: Vec<CatchClause>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        finally: Option<Vec<Stmt>>,
    },
    Block(Vec<Stmt>),
    Opaque(OpaqueCode),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatchClause {
    pub name: String,
    /// More than one for a multi-catch.
    pub types: Vec<TypeRef>,
    pub body: Vec<Stmt>,
}

/// Source text of a construct the pass cannot rewrite.
///
/// `fields` lists the field accesses found inside it. An entry without an
/// owner is a name whose receiver type was not known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpaqueCode {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldMention>,
}

impl OpaqueCode {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            fields: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldMention {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    pub field: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    Literal(Literal),
    This,
    Local(String),
    AssignLocal {
        name: String,
        value: Box<Expr>,
    },
    GetField {
        target: Box<Expr>,
        owner: String,
        field: String,
        ty: TypeRef,
    },
    PutField {
        target: Box<Expr>,
        owner: String,
        field: String,
        ty: TypeRef,
        value: Box<Expr>,
    },
    GetStatic {
        owner: String,
        field: String,
        ty: TypeRef,
    },
    PutStatic {
        owner: String,
        field: String,
        ty: TypeRef,
        value: Box<Expr>,
    },
    /// `target` is `None` for static calls.
    Invoke {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<Box<Expr>>,
        owner: String,
        method: String,
        #[serde(default)]
        args: Vec<Expr>,
        return_type: TypeRef,
    },
    New {
        class: String,
        #[serde(default)]
        args: Vec<Expr>,
    },
    Unary {
        op: String,
        operand: Box<Expr>,
    },
    Binary {
        op: String,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    InstanceOf {
        value: Box<Expr>,
        class: String,
    },
    Cast {
        ty: TypeRef,
        value: Box<Expr>,
    },
    Conditional {
        cond: Box<Expr>,
        then_value: Box<Expr>,
        else_value: Box<Expr>,
    },
    Opaque(OpaqueCode),
}

impl Expr {
    pub fn str(value: impl Into<String>) -> Self {
        Expr::Literal(Literal::Str(value.into()))
    }

    pub fn local(name: impl Into<String>) -> Self {
        Expr::Local(name.into())
    }

    pub fn get_field(target: Expr, owner: &str, field: &str, ty: TypeRef) -> Self {
        Expr::GetField {
            target: Box::new(target),
            owner: owner.to_string(),
            field: field.to_string(),
            ty,
        }
    }

    pub fn put_field(target: Expr, owner: &str, field: &str, ty: TypeRef, value: Expr) -> Self {
        Expr::PutField {
            target: Box::new(target),
            owner: owner.to_string(),
            field: field.to_string(),
            ty,
            value: Box::new(value),
        }
    }

    pub fn invoke(
        target: Option<Expr>,
        owner: &str,
        method: &str,
        args: Vec<Expr>,
        return_type: TypeRef,
    ) -> Self {
        Expr::Invoke {
            target: target.map(Box::new),
            owner: owner.to_string(),
            method: method.to_string(),
            args,
            return_type,
        }
    }

    pub fn binary(op: &str, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op: op.to_string(),
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }
}
