//! The synthetic `$adt` module
//!
//! Sweeps every compiled interface for constructors and synthesizes one
//! `make_<Type>_<Ctor>` export per constructor: a pure function scheme
//! for non-nullary constructors, the bare result type for nullary ones.
//! At resolve time, non-nullary factories are arity-checking callables;
//! nullary constructors hand out one cached `TaggedValue` per
//! `(module, type, ctor)` triple, so repeated uses are identity-equal.

use crate::iface::{Iface, IfaceCtor, IfaceExport, IfaceRef};
use crate::types::{EffectRow, Scheme, Type};
use crate::value::{CtorFactory, RuntimeError, Value};
use std::cell::OnceCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

/// Digest schema tag for the synthetic ADT module
pub const ADT_SCHEMA: &str = "adt-v1-stable";

struct FactoryEntry {
    factory: Rc<CtorFactory>,
    /// Shared singleton for nullary constructors, filled on first use
    nullary: OnceCell<Value>,
}

/// Registry of constructor factories
pub struct AdtRegistry {
    factories: HashMap<String, FactoryEntry>,
    iface: Iface,
}

impl AdtRegistry {
    /// Build the registry by sweeping module interfaces. Iteration is
    /// over sorted module paths so a (pathological) factory-name
    /// collision resolves deterministically: the first module wins.
    pub fn from_ifaces<'a>(ifaces: impl IntoIterator<Item = &'a Iface>) -> Self {
        let mut sorted: Vec<&Iface> = ifaces.into_iter().collect();
        sorted.sort_by(|a, b| a.module.cmp(&b.module));

        let mut factories: HashMap<String, FactoryEntry> = HashMap::new();
        let mut exports = BTreeMap::new();
        for iface in sorted {
            for ctor in iface.constructors.values() {
                let name = factory_name(ctor);
                if factories.contains_key(&name) {
                    continue;
                }
                factories.insert(
                    name.clone(),
                    FactoryEntry {
                        factory: Rc::new(CtorFactory {
                            module: iface.module.clone(),
                            type_name: ctor.type_name.clone(),
                            ctor: ctor.ctor_name.clone(),
                            arity: ctor.arity,
                        }),
                        nullary: OnceCell::new(),
                    },
                );
                exports.insert(
                    name.clone(),
                    IfaceExport {
                        scheme: factory_scheme(ctor),
                        purity: true,
                        global_ref: IfaceRef {
                            module: "$adt".to_string(),
                            name,
                        },
                    },
                );
            }
        }

        let iface = Iface::new("$adt", ADT_SCHEMA, exports, BTreeMap::new());
        Self { factories, iface }
    }

    /// The synthetic `$adt` interface
    pub fn iface(&self) -> &Iface {
        &self.iface
    }

    /// Resolve a factory export to its runtime value
    pub fn resolve(&self, name: &str) -> Result<Value, RuntimeError> {
        let Some(entry) = self.factories.get(name) else {
            return Err(RuntimeError::UnknownCtor(name.to_string()));
        };
        if entry.factory.arity == 0 {
            let value = entry.nullary.get_or_init(|| {
                crate::eval::make_tagged(
                    &entry.factory.module,
                    &entry.factory.type_name,
                    &entry.factory.ctor,
                    Vec::new(),
                )
            });
            Ok(value.clone())
        } else {
            Ok(Value::CtorFactory(Rc::clone(&entry.factory)))
        }
    }
}

/// `make_<Type>_<Ctor>`
pub fn factory_name(ctor: &IfaceCtor) -> String {
    format!("make_{}_{}", ctor.type_name, ctor.ctor_name)
}

/// The factory's exported scheme
pub fn factory_scheme(ctor: &IfaceCtor) -> Scheme {
    if ctor.arity == 0 {
        Scheme {
            vars: ctor.type_params.clone(),
            constraints: Vec::new(),
            ty: ctor.result_type.clone(),
        }
    } else {
        Scheme {
            vars: ctor.type_params.clone(),
            constraints: Vec::new(),
            ty: Type::Func {
                params: ctor.field_types.clone(),
                ret: Box::new(ctor.result_type.clone()),
                effects: EffectRow::pure(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iface::IFACE_SCHEMA;
    use crate::value::TaggedValue;

    fn option_iface() -> Iface {
        let mut ctors = BTreeMap::new();
        ctors.insert(
            "None".to_string(),
            IfaceCtor {
                type_name: "Option".into(),
                ctor_name: "None".into(),
                arity: 0,
                type_params: vec!["a".into()],
                field_types: vec![],
                result_type: Type::App(
                    Box::new(Type::Con("Option".into())),
                    vec![Type::Var("a".into())],
                ),
            },
        );
        ctors.insert(
            "Some".to_string(),
            IfaceCtor {
                type_name: "Option".into(),
                ctor_name: "Some".into(),
                arity: 1,
                type_params: vec!["a".into()],
                field_types: vec![Type::Var("a".into())],
                result_type: Type::App(
                    Box::new(Type::Con("Option".into())),
                    vec![Type::Var("a".into())],
                ),
            },
        );
        Iface::new("std/option", IFACE_SCHEMA, BTreeMap::new(), ctors)
    }

    #[test]
    fn test_factory_exports_synthesized() {
        let registry = AdtRegistry::from_ifaces([&option_iface()]);
        let iface = registry.iface();
        assert!(iface.exports.contains_key("make_Option_Some"));
        assert!(iface.exports.contains_key("make_Option_None"));
        assert!(iface.exports.values().all(|e| e.purity));
        assert_eq!(iface.schema, ADT_SCHEMA);
    }

    #[test]
    fn test_nullary_factory_is_cached_singleton() {
        let registry = AdtRegistry::from_ifaces([&option_iface()]);
        let a = registry.resolve("make_Option_None").unwrap();
        let b = registry.resolve("make_Option_None").unwrap();
        let (Value::Tagged(ta), Value::Tagged(tb)) = (&a, &b) else {
            panic!("expected tagged values");
        };
        assert!(Rc::ptr_eq(ta, tb));
    }

    #[test]
    fn test_non_nullary_factory_builds_tagged_values() {
        let registry = AdtRegistry::from_ifaces([&option_iface()]);
        let factory = registry.resolve("make_Option_Some").unwrap();
        let Value::CtorFactory(factory) = factory else {
            panic!("expected factory");
        };
        assert_eq!(factory.arity, 1);
        assert_eq!(
            *factory,
            CtorFactory {
                module: "std/option".into(),
                type_name: "Option".into(),
                ctor: "Some".into(),
                arity: 1,
            }
        );
    }

    #[test]
    fn test_unknown_factory_error() {
        let registry = AdtRegistry::from_ifaces([&option_iface()]);
        let err = registry.resolve("make_Option_Nope").unwrap_err();
        assert_eq!(err.code(), "IMP011_UNKNOWN_CTOR");
    }

    #[test]
    fn test_nullary_scheme_is_bare_result_type() {
        let iface = option_iface();
        let none = iface.constructors.get("None").unwrap();
        let scheme = factory_scheme(none);
        assert!(matches!(scheme.ty, Type::App(..)));
        let some = iface.constructors.get("Some").unwrap();
        assert!(matches!(factory_scheme(some).ty, Type::Func { .. }));
    }

    #[test]
    fn test_singleton_identity_across_values() {
        let registry = AdtRegistry::from_ifaces([&option_iface()]);
        let a = registry.resolve("make_Option_None").unwrap();
        let expected = TaggedValue {
            module: "std/option".into(),
            type_name: "Option".into(),
            ctor: "None".into(),
            fields: vec![],
        };
        let Value::Tagged(tagged) = a else {
            panic!("expected tagged");
        };
        assert_eq!(*tagged, expected);
    }
}
