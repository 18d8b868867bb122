//! Java-like text for classes and bodies, used for inspection output.

use crate::class::{CONSTRUCTOR_NAME, CompiledClass, Expr, Literal, Method, Modifiers, Stmt};

const INDENT: &str = "    ";

pub fn render_class(class: &CompiledClass) -> String {
    let mut out = String::new();
    for annotation in &class.annotations {
        out.push_str(&format!("@{}\n", short_type(annotation)));
    }

    let keyword = if class.modifiers.contains(Modifiers::INTERFACE) {
        "interface"
    } else {
        "class"
    };
    let mut header = format!(
        "{}{keyword} {}",
        modifier_prefix(class.modifiers - Modifiers::INTERFACE),
        class.simple_name()
    );
    if let Some(super_name) = &class.super_name {
        header.push_str(&format!(" extends {}", short_type(super_name)));
    }
    if !class.interfaces.is_empty() {
        let list: Vec<&str> = class.interfaces.iter().map(|i| short_type(i)).collect();
        header.push_str(&format!(" implements {}", list.join(", ")));
    }

    if !class.package().is_empty() {
        out.insert_str(0, &format!("package {};\n\n", class.package()));
    }
    out.push_str(&header);
    out.push_str(" {\n");

    for field in &class.fields {
        for annotation in &field.annotations {
            out.push_str(&format!("{INDENT}@{}\n", short_type(annotation)));
        }
        out.push_str(&format!(
            "{INDENT}{}{} {};\n",
            modifier_prefix(field.modifiers),
            short_type(field.ty.as_str()),
            field.name
        ));
    }

    for method in &class.methods {
        out.push('\n');
        render_method(&mut out, class, method);
    }

    out.push_str("}\n");
    out
}

fn render_method(out: &mut String, class: &CompiledClass, method: &Method) {
    let params: Vec<String> = method
        .params
        .iter()
        .map(|p| format!("{} {}", short_type(p.ty.as_str()), p.name))
        .collect();
    let signature = if method.is_constructor() {
        format!("{}({})", class.simple_name(), params.join(", "))
    } else {
        format!(
            "{} {}({})",
            short_type(method.return_type.as_str()),
            method.name,
            params.join(", ")
        )
    };
    out.push_str(&format!(
        "{INDENT}{}{signature}",
        modifier_prefix(method.modifiers)
    ));

    match &method.body {
        None => out.push_str(";\n"),
        Some(body) => {
            out.push_str(" {\n");
            for stmt in body {
                render_stmt(out, stmt, 2);
            }
            out.push_str(&format!("{INDENT}}}\n"));
        }
    }
}

pub fn render_stmt(out: &mut String, stmt: &Stmt, depth: usize) {
    let pad = INDENT.repeat(depth);
    match stmt {
        Stmt::Expr(expr) => out.push_str(&format!("{pad}{};\n", render_expr(expr))),
        Stmt::Local { name, ty, init } => match init {
            Some(init) => out.push_str(&format!(
                "{pad}{} {name} = {};\n",
                short_type(ty.as_str()),
                render_expr(init)
            )),
            None => out.push_str(&format!("{pad}{} {name};\n", short_type(ty.as_str()))),
        },
        Stmt::Return(None) => out.push_str(&format!("{pad}return;\n")),
        Stmt::Return(Some(expr)) => out.push_str(&format!("{pad}return {};\n", render_expr(expr))),
        Stmt::If {
            cond,
            then_branch,
            else_branch,
        } => {
            out.push_str(&format!("{pad}if ({}) {{\n", render_expr(cond)));
            for s in then_branch {
                render_stmt(out, s, depth + 1);
            }
            if else_branch.is_empty() {
                out.push_str(&format!("{pad}}}\n"));
            } else {
                out.push_str(&format!("{pad}}} else {{\n"));
                for s in else_branch {
                    render_stmt(out, s, depth + 1);
                }
                out.push_str(&format!("{pad}}}\n"));
            }
        }
        Stmt::While { cond, body } => {
            out.push_str(&format!("{pad}while ({}) {{\n", render_expr(cond)));
            for s in body {
                render_stmt(out, s, depth + 1);
            }
            out.push_str(&format!("{pad}}}\n"));
        }
        Stmt::For {
            init,
            cond,
            update,
            body,
        } => {
            let init = init.iter().map(for_init).collect::<Vec<_>>().join(", ");
            let cond = cond.as_ref().map(render_expr).unwrap_or_default();
            let update = update.iter().map(render_expr).collect::<Vec<_>>().join(", ");
            out.push_str(&format!("{pad}for ({init}; {cond}; {update}) {{\n"));
            render_body(out, body, depth);
        }
        Stmt::ForEach {
            name,
            ty,
            iterable,
            body,
        } => {
            out.push_str(&format!(
                "{pad}for ({} {name} : {}) {{\n",
                short_type(ty.as_str()),
                render_expr(iterable)
            ));
            render_body(out, body, depth);
        }
        Stmt::Throw(expr) => out.push_str(&format!("{pad}throw {};\n", render_expr(expr))),
        Stmt::Try {
            body,
            catches,
            finally,
        } => {
            out.push_str(&format!("{pad}try {{\n"));
            for s in body {
                render_stmt(out, s, depth + 1);
            }
            for catch in catches {
                let types = catch
                    .types
                    .iter()
                    .map(|t| short_type(t.as_str()))
                    .collect::<Vec<_>>()
                    .join(" | ");
                out.push_str(&format!("{pad}}} catch ({types} {}) {{\n", catch.name));
                for s in &catch.body {
                    render_stmt(out, s, depth + 1);
                }
            }
            if let Some(finally) = finally {
                out.push_str(&format!("{pad}}} finally {{\n"));
                for s in finally {
                    render_stmt(out, s, depth + 1);
                }
            }
            out.push_str(&format!("{pad}}}\n"));
        }
        Stmt::Block(stmts) => {
            out.push_str(&format!("{pad}{{\n"));
            render_body(out, stmts, depth);
        }
        Stmt::Opaque(code) => out.push_str(&format!("{pad}{}\n", code.text)),
    }
}

/// Statements one level deeper, then the closing brace.
fn render_body(out: &mut String, body: &[Stmt], depth: usize) {
    for s in body {
        render_stmt(out, s, depth + 1);
    }
    out.push_str(&format!("{}}}\n", INDENT.repeat(depth)));
}

fn for_init(stmt: &Stmt) -> String {
    match stmt {
        Stmt::Local {
            name,
            ty,
            init: Some(init),
        } => format!("{} {name} = {}", short_type(ty.as_str()), render_expr(init)),
        Stmt::Local { name, ty, init: None } => format!("{} {name}", short_type(ty.as_str())),
        Stmt::Expr(expr) => render_expr(expr),
        other => {
            let mut out = String::new();
            render_stmt(&mut out, other, 0);
            out.trim_end().trim_end_matches(';').to_string()
        }
    }
}

pub fn render_expr(expr: &Expr) -> String {
    match expr {
        Expr::Literal(Literal::Null) => "null".to_string(),
        Expr::Literal(Literal::Bool(b)) => b.to_string(),
        Expr::Literal(Literal::Int(i)) => i.to_string(),
        Expr::Literal(Literal::Str(s)) => format!("\"{s}\""),
        Expr::This => "this".to_string(),
        Expr::Local(name) => name.clone(),
        Expr::AssignLocal { name, value } => format!("{name} = {}", render_expr(value)),
        Expr::GetField { target, field, .. } => format!("{}.{field}", operand(target)),
        Expr::PutField {
            target,
            field,
            value,
            ..
        } => format!("{}.{field} = {}", operand(target), render_expr(value)),
        Expr::GetStatic { owner, field, .. } => format!("{}.{field}", short_type(owner)),
        Expr::PutStatic {
            owner,
            field,
            value,
            ..
        } => format!("{}.{field} = {}", short_type(owner), render_expr(value)),
        Expr::Invoke {
            target,
            owner,
            method,
            args,
            ..
        } => {
            let args = args.iter().map(render_expr).collect::<Vec<_>>().join(", ");
            let callee = if method == CONSTRUCTOR_NAME {
                "super".to_string()
            } else {
                method.clone()
            };
            match target {
                Some(target)
                    if method == CONSTRUCTOR_NAME && matches!(target.as_ref(), Expr::This) =>
                {
                    format!("{callee}({args})")
                }
                Some(target) => format!("{}.{callee}({args})", operand(target)),
                None => format!("{}.{callee}({args})", short_type(owner)),
            }
        }
        Expr::New { class, args } => format!(
            "new {}({})",
            short_type(class),
            args.iter().map(render_expr).collect::<Vec<_>>().join(", ")
        ),
        Expr::Unary { op, operand: inner } => format!("{op}{}", operand(inner)),
        Expr::Binary { op, lhs, rhs } => format!("{} {op} {}", operand(lhs), operand(rhs)),
        Expr::InstanceOf { value, class } => {
            format!("{} instanceof {}", operand(value), short_type(class))
        }
        Expr::Cast { ty, value } => {
            format!("(({}) {})", short_type(ty.as_str()), render_expr(value))
        }
        Expr::Conditional {
            cond,
            then_value,
            else_value,
        } => format!(
            "{} ? {} : {}",
            operand(cond),
            operand(then_value),
            operand(else_value)
        ),
        Expr::Opaque(code) => code.text.clone(),
    }
}

/// Operands that would bind differently without parentheses get them.
fn operand(expr: &Expr) -> String {
    match expr {
        Expr::Binary { .. }
        | Expr::InstanceOf { .. }
        | Expr::AssignLocal { .. }
        | Expr::Conditional { .. }
        | Expr::PutField { .. }
        | Expr::PutStatic { .. } => format!("({})", render_expr(expr)),
        _ => render_expr(expr),
    }
}

/// `java.lang.String` -> `String`; everything else keeps its package.
fn short_type(name: &str) -> &str {
    match name.strip_prefix("java.lang.") {
        Some(rest) if !rest.contains('.') => rest,
        _ => name,
    }
}

fn modifier_prefix(modifiers: Modifiers) -> String {
    let mut words = Vec::new();
    for (flag, word) in [
        (Modifiers::PUBLIC, "public"),
        (Modifiers::PROTECTED, "protected"),
        (Modifiers::PRIVATE, "private"),
        (Modifiers::ABSTRACT, "abstract"),
        (Modifiers::STATIC, "static"),
        (Modifiers::FINAL, "final"),
        (Modifiers::TRANSIENT, "transient"),
        (Modifiers::VOLATILE, "volatile"),
        (Modifiers::NATIVE, "native"),
    ] {
        if modifiers.contains(flag) {
            words.push(word);
        }
    }
    if words.is_empty() {
        String::new()
    } else {
        format!("{} ", words.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{CatchClause, FieldDescriptor, Param, TypeRef};

    #[test]
    fn renders_nested_binary_with_parentheses() {
        let expr = Expr::binary(
            "*",
            Expr::binary("+", Expr::local("a"), Expr::local("b")),
            Expr::Literal(Literal::Int(2)),
        );
        assert_eq!(render_expr(&expr), "(a + b) * 2");
    }

    #[test]
    fn renders_super_call_and_static_call() {
        let super_call = Expr::invoke(
            Some(Expr::This),
            "com.example.Base",
            CONSTRUCTOR_NAME,
            vec![Expr::str("x")],
            TypeRef::void(),
        );
        assert_eq!(render_expr(&super_call), r#"super("x")"#);

        let static_call = Expr::invoke(
            None,
            "java.lang.Math",
            "max",
            vec![Expr::local("a"), Expr::local("b")],
            TypeRef::new("int"),
        );
        assert_eq!(render_expr(&static_call), "Math.max(a, b)");
    }

    #[test]
    fn renders_for_loop_try_and_conditional() {
        let mut out = String::new();
        let counter = Stmt::For {
            init: vec![Stmt::Local {
                name: "i".to_string(),
                ty: TypeRef::new("int"),
                init: Some(Expr::Literal(Literal::Int(0))),
            }],
            cond: Some(Expr::binary("<", Expr::local("i"), Expr::local("n"))),
            update: vec![Expr::AssignLocal {
                name: "i".to_string(),
                value: Box::new(Expr::binary(
                    "+",
                    Expr::local("i"),
                    Expr::Literal(Literal::Int(1)),
                )),
            }],
            body: vec![Stmt::Throw(Expr::New {
                class: "java.lang.IllegalStateException".to_string(),
                args: Vec::new(),
            })],
        };
        render_stmt(&mut out, &counter, 0);
        assert_eq!(
            out,
            "for (int i = 0; i < n; i = i + 1) {\n    throw new IllegalStateException();\n}\n"
        );

        let mut out = String::new();
        let guarded = Stmt::Try {
            body: vec![Stmt::Return(Some(Expr::Conditional {
                cond: Box::new(Expr::local("c")),
                then_value: Box::new(Expr::Literal(Literal::Int(1))),
                else_value: Box::new(Expr::Literal(Literal::Int(0))),
            }))],
            catches: vec![CatchClause {
                name: "e".to_string(),
                types: vec![
                    TypeRef::new("java.lang.IllegalStateException"),
                    TypeRef::new("java.lang.RuntimeException"),
                ],
                body: vec![Stmt::Throw(Expr::local("e"))],
            }],
            finally: None,
        };
        render_stmt(&mut out, &guarded, 0);
        assert_eq!(
            out,
            "try {\n    return c ? 1 : 0;\n} catch (IllegalStateException | RuntimeException e) {\n    throw e;\n}\n"
        );
    }

    #[test]
    fn renders_class_outline() {
        let mut class = CompiledClass::new("com.example.Person");
        class.super_name = Some("io.weaver.ModelObject".to_string());
        class.annotations.push("io.weaver.annotations.ModelClass".to_string());
        class.fields.push(FieldDescriptor::new("name", TypeRef::string()));
        class.methods.push(Method::constructor(
            vec![Param {
                name: "name".to_string(),
                ty: TypeRef::string(),
            }],
            vec![Stmt::Expr(Expr::put_field(
                Expr::This,
                "com.example.Person",
                "name",
                TypeRef::string(),
                Expr::local("name"),
            ))],
        ));

        let text = render_class(&class);
        let expected = "package com.example;\n\n\
@io.weaver.annotations.ModelClass\n\
public class Person extends io.weaver.ModelObject {\n\
\x20   private String name;\n\
\n\
\x20   public Person(String name) {\n\
\x20       this.name = name;\n\
\x20   }\n\
}\n";
        assert_eq!(text, expected);
    }
}
