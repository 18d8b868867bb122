//! Proxy wiring: the per-class marker interface and the constructor hook.
//!
//! Neither operation checks whether it already ran on a class; the pipeline
//! only calls them on classes that do not carry the transform marker yet.

use crate::class::{CONSTRUCTOR_NAME, CompiledClass, Expr, Stmt, TypeRef};
use crate::config::WeaverConfig;
use crate::naming::proxy_interface_name;

pub fn add_proxy_interface(class: &mut CompiledClass, config: &WeaverConfig) {
    let interface = proxy_interface_name(&class.name, config);
    tracing::debug!(class = %class.name, %interface, "adding proxy interface");
    class.interfaces.push(interface);
}

/// Prepends the guarded context hook to every constructor body. A leading
/// `super(...)` or `this(...)` call stays first. Returns the number of
/// constructors instrumented.
pub fn inject_context_hook(class: &mut CompiledClass, config: &WeaverConfig) -> usize {
    let mut instrumented = 0usize;
    for method in class.methods.iter_mut().filter(|m| m.is_constructor()) {
        let Some(body) = method.body.as_mut() else {
            continue;
        };
        let at = usize::from(body.first().is_some_and(is_constructor_chain_call));
        body.insert(at, context_hook(config));
        instrumented += 1;
    }
    instrumented
}

/// `if (this instanceof ModelProxy) { ((ModelProxy) this).hook(); }`
pub fn context_hook(config: &WeaverConfig) -> Stmt {
    let supertype = &config.proxy_supertype;
    Stmt::If {
        cond: Expr::InstanceOf {
            value: Box::new(Expr::This),
            class: supertype.clone(),
        },
        then_branch: vec![Stmt::Expr(Expr::invoke(
            Some(Expr::Cast {
                ty: TypeRef::new(supertype.as_str()),
                value: Box::new(Expr::This),
            }),
            supertype,
            &config.context_hook,
            Vec::new(),
            TypeRef::void(),
        ))],
        else_branch: Vec::new(),
    }
}

fn is_constructor_chain_call(stmt: &Stmt) -> bool {
    matches!(
        stmt,
        Stmt::Expr(Expr::Invoke { target: Some(target), method, .. })
            if method == CONSTRUCTOR_NAME && matches!(target.as_ref(), Expr::This)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{Method, Param};

    fn super_call() -> Stmt {
        Stmt::Expr(Expr::invoke(
            Some(Expr::This),
            "io.weaver.ModelObject",
            CONSTRUCTOR_NAME,
            Vec::new(),
            TypeRef::void(),
        ))
    }

    #[test]
    fn interface_is_appended() {
        let config = WeaverConfig::default();
        let mut person = CompiledClass::new("com.example.Person");
        person.interfaces.push("java.io.Serializable".to_string());

        add_proxy_interface(&mut person, &config);
        assert_eq!(
            person.interfaces,
            vec![
                "java.io.Serializable".to_string(),
                "com_example_PersonProxyInterface".to_string()
            ]
        );
    }

    #[test]
    fn hook_goes_first_or_after_explicit_super_call() {
        let config = WeaverConfig::default();
        let mut person = CompiledClass::new("com.example.Person");
        person.methods = vec![
            Method::constructor(Vec::new(), vec![Stmt::Return(None)]),
            Method::constructor(
                vec![Param {
                    name: "name".to_string(),
                    ty: TypeRef::string(),
                }],
                vec![super_call(), Stmt::Return(None)],
            ),
            Method::new("describe", TypeRef::string(), vec![Stmt::Return(None)]),
        ];

        assert_eq!(inject_context_hook(&mut person, &config), 2);

        let first = person.methods[0].body.as_ref().unwrap();
        assert_eq!(first[0], context_hook(&config));
        assert_eq!(first.len(), 2);

        let second = person.methods[1].body.as_ref().unwrap();
        assert_eq!(second[0], super_call());
        assert_eq!(second[1], context_hook(&config));

        let plain = person.methods[2].body.as_ref().unwrap();
        assert_eq!(plain.len(), 1);
    }

    #[test]
    fn hook_calls_configured_method_on_proxy_supertype() {
        let config = WeaverConfig::default();
        let Stmt::If { cond, then_branch, else_branch } = context_hook(&config) else {
            panic!("hook must be a guarded statement");
        };
        assert!(matches!(
            cond,
            Expr::InstanceOf { ref class, .. } if class == "io.weaver.internal.ModelProxy"
        ));
        assert!(else_branch.is_empty());
        assert!(matches!(
            &then_branch[0],
            Stmt::Expr(Expr::Invoke { method, .. }) if method == "weaver$injectObjectContext"
        ));
    }
}
