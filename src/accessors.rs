//! Accessor synthesis for persisted fields.
//!
//! Existing methods are matched by name only. Any method already called
//! `get$name`, whatever its signature, counts as the getter for `name`.

use crate::class::{CompiledClass, Expr, FieldDescriptor, Method, Modifiers, Param, Stmt, TypeRef};
use crate::classify::persisted_fields;
use crate::config::WeaverConfig;
use crate::error::WeaveResult;
use crate::naming::AccessorPair;
use crate::pool::SymbolPool;

/// Adds missing getters and setters for the persisted fields declared on
/// `class`. Returns how many methods were added.
pub fn ensure_accessors(class: &mut CompiledClass, config: &WeaverConfig) -> usize {
    let missing: Vec<(FieldDescriptor, AccessorPair)> = persisted_fields(class, config)
        .map(|f| (f.clone(), AccessorPair::for_field(&f.name, config)))
        .collect();

    let mut added = 0usize;
    for (field, pair) in missing {
        if !class.has_method_named(&pair.getter) {
            class.methods.push(getter(&class.name, &field, &pair.getter));
            added += 1;
        }
        if !class.has_method_named(&pair.setter) {
            class.methods.push(setter(&class.name, &field, &pair.setter));
            added += 1;
        }
    }

    if added > 0 {
        tracing::debug!(class = %class.name, added, "synthesized accessors");
    }
    added
}

/// Upsert through the pool. The class must exist.
pub fn ensure_accessors_in_pool(
    pool: &SymbolPool,
    class_name: &str,
    config: &WeaverConfig,
) -> WeaveResult<usize> {
    let handle = pool.resolve(class_name)?;
    let mut class = handle.write();
    Ok(ensure_accessors(&mut class, config))
}

fn getter(owner: &str, field: &FieldDescriptor, name: &str) -> Method {
    let mut method = Method::new(
        name,
        field.ty.clone(),
        vec![Stmt::Return(Some(Expr::get_field(
            Expr::This,
            owner,
            &field.name,
            field.ty.clone(),
        )))],
    );
    method.modifiers = Modifiers::PUBLIC;
    method
}

fn setter(owner: &str, field: &FieldDescriptor, name: &str) -> Method {
    let mut method = Method::new(
        name,
        TypeRef::void(),
        vec![
            Stmt::Expr(Expr::put_field(
                Expr::This,
                owner,
                &field.name,
                field.ty.clone(),
                Expr::local("value"),
            )),
            Stmt::Return(None),
        ],
    )
    .with_params(vec![Param {
        name: "value".to_string(),
        ty: field.ty.clone(),
    }]);
    method.modifiers = Modifiers::PUBLIC;
    method
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;

    fn person(config: &WeaverConfig) -> CompiledClass {
        let mut person = CompiledClass::new("com.example.Person");
        person.super_name = Some("io.weaver.ModelObject".to_string());
        person.annotations.push(config.model_annotation.clone());
        person.fields = vec![
            FieldDescriptor::new("name", TypeRef::string()),
            FieldDescriptor::new("cache", TypeRef::string())
                .with_annotation(config.ignore_annotation.clone()),
            FieldDescriptor::new("age", TypeRef::new("int")),
        ];
        person
    }

    fn names(class: &CompiledClass) -> Vec<&str> {
        class.methods.iter().map(|m| m.name.as_str()).collect()
    }

    #[test]
    fn generates_pair_for_each_persisted_field_only() {
        let config = WeaverConfig::default();
        let mut person = person(&config);

        assert_eq!(ensure_accessors(&mut person, &config), 4);
        assert_eq!(names(&person), vec!["get$name", "set$name", "get$age", "set$age"]);
        assert!(!person.has_method_named("get$cache"));
        assert!(!person.has_method_named("set$cache"));

        let getter = person.methods_named("get$name").next().unwrap();
        assert_eq!(getter.return_type, TypeRef::string());
        assert!(getter.params.is_empty());

        let setter = person.methods_named("set$age").next().unwrap();
        assert!(setter.return_type.is_void());
        assert_eq!(setter.params[0].ty, TypeRef::new("int"));
    }

    #[test]
    fn second_call_adds_nothing() {
        let config = WeaverConfig::default();
        let mut person = person(&config);
        ensure_accessors(&mut person, &config);
        let before = person.clone();

        assert_eq!(ensure_accessors(&mut person, &config), 0);
        assert_eq!(person, before);
    }

    #[test]
    fn existing_method_with_same_name_blocks_synthesis_regardless_of_signature() {
        let config = WeaverConfig::default();
        let mut person = person(&config);
        person.methods.push(
            Method::new("get$name", TypeRef::new("int"), vec![Stmt::Return(None)]).with_params(vec![
                Param {
                    name: "index".to_string(),
                    ty: TypeRef::new("int"),
                },
            ]),
        );

        assert_eq!(ensure_accessors(&mut person, &config), 3);
        assert_eq!(person.methods_named("get$name").count(), 1);
        assert_eq!(person.methods_named("set$name").count(), 1);
    }

    #[test]
    fn pool_upsert_requires_existing_class() -> WeaveResult<()> {
        let config = WeaverConfig::default();
        let pool = SymbolPool::new().with_source(MemorySource::new([person(&config)]));

        assert_eq!(ensure_accessors_in_pool(&pool, "com.example.Person", &config)?, 4);
        assert_eq!(ensure_accessors_in_pool(&pool, "com.example.Person", &config)?, 0);
        assert!(ensure_accessors_in_pool(&pool, "com.example.Ghost", &config).is_err());
        Ok(())
    }
}
