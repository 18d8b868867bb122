//! Transform marker: a parameterless method returning `true`, used purely as
//! a presence flag so repeated passes leave a class alone.

use crate::class::{CompiledClass, Expr, Literal, Method, Modifiers, Stmt, TypeRef};
use crate::config::WeaverConfig;

pub fn is_already_transformed(class: &CompiledClass, config: &WeaverConfig) -> bool {
    class
        .methods_named(&config.transform_marker)
        .filter(|m| m.params.is_empty())
        .any(reports_applied)
}

/// Adds the marker unless a method with its name exists. Returns whether the
/// class changed.
pub fn mark_transformed(class: &mut CompiledClass, config: &WeaverConfig) -> bool {
    if class.has_method_named(&config.transform_marker) {
        return false;
    }
    let mut marker = Method::new(
        config.transform_marker.as_str(),
        TypeRef::boolean(),
        vec![Stmt::Return(Some(Expr::Literal(Literal::Bool(true))))],
    );
    marker.modifiers = Modifiers::PUBLIC | Modifiers::SYNTHETIC;
    class.methods.push(marker);
    true
}

fn reports_applied(method: &Method) -> bool {
    matches!(
        method.body.as_deref(),
        Some([Stmt::Return(Some(Expr::Literal(Literal::Bool(true))))])
    )
}
