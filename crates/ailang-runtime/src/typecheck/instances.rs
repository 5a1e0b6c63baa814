//! Type-class instance table
//!
//! The compile-time side answers "does `(class, type)` have an
//! instance?" and names the monomorphic builtin implementing a method.
//! The runtime side builds dictionary values for the evaluator: one per
//! concrete instance, plus a `poly` family whose methods dispatch on the
//! operand's runtime type; used when a constraint was generalized into
//! a scheme instead of resolving to one concrete type.

use crate::effects::EffectContext;
use crate::link::builtins;
use crate::types::Type;
use crate::value::{Builtin, DictValue, RuntimeError, Value};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

/// The tag used for runtime-dispatched dictionaries
pub const POLY: &str = "poly";

/// `(class, [instance types])`, sorted
const INSTANCES: &[(&str, &[&str])] = &[
    ("Eq", &["()", "bool", "float", "int", "string"]),
    ("Fractional", &["float"]),
    ("Num", &["float", "int"]),
    ("Ord", &["float", "int", "string"]),
    ("Show", &["bool", "float", "int", "string"]),
];

/// Methods per class
const METHODS: &[(&str, &[&str])] = &[
    ("Eq", &["eq", "ne"]),
    ("Fractional", &["div"]),
    ("Num", &["add", "div", "mul", "neg", "sub"]),
    ("Ord", &["ge", "gt", "le", "lt"]),
    ("Show", &["show"]),
];

/// Whether `(class, ty)` has a registered instance. Only concrete
/// constant types carry instances.
pub fn has_instance(class: &str, ty: &Type) -> bool {
    let Type::Con(name) = ty else {
        return false;
    };
    INSTANCES
        .iter()
        .any(|(c, types)| *c == class && types.contains(&name.as_str()))
}

/// Capitalized builtin suffix for a canonical type name
pub fn suffix(ty_name: &str) -> Option<&'static str> {
    match ty_name {
        "int" => Some("Int"),
        "float" => Some("Float"),
        "string" => Some("String"),
        "bool" => Some("Bool"),
        "()" => Some("Unit"),
        _ => None,
    }
}

/// The `$builtin` name implementing `method` for a concrete instance
/// type, when one exists (e.g. `("Eq", "float", "eq")` -> `eq_Float`)
pub fn method_builtin(ty_name: &str, method: &str) -> Option<String> {
    let suffix = suffix(ty_name)?;
    let name = format!("{}_{}", method, suffix);
    builtins::spec(&name).map(|_| name)
}

// ----------------------------------------------------------------------
// Runtime-dispatched (`poly`) methods
// ----------------------------------------------------------------------

macro_rules! poly_binop {
    ($name:ident, $method:literal, $int:literal, $float:literal) => {
        fn $name(ctx: &EffectContext, args: &[Value]) -> Result<Value, RuntimeError> {
            let target = match (&args[0], &args[1]) {
                (Value::Int(_), Value::Int(_)) => $int,
                (Value::Float(_), Value::Float(_)) => $float,
                // An integer literal meeting a float: the dictionary
                // interprets the literal at float
                (Value::Int(a), Value::Float(b)) => {
                    let spec = builtins::spec($float).expect("registered builtin");
                    return (spec.run)(ctx, &[Value::Float(*a as f64), Value::Float(*b)]);
                }
                (Value::Float(a), Value::Int(b)) => {
                    let spec = builtins::spec($float).expect("registered builtin");
                    return (spec.run)(ctx, &[Value::Float(*a), Value::Float(*b as f64)]);
                }
                (a, b) => {
                    return Err(RuntimeError::TypeMismatch(format!(
                        "`{}` has no numeric instance for {} and {}",
                        $method,
                        a.type_name(),
                        b.type_name()
                    )))
                }
            };
            let spec = builtins::spec(target).expect("registered builtin");
            (spec.run)(ctx, args)
        }
    };
}

poly_binop!(poly_add, "add", "add_Int", "add_Float");
poly_binop!(poly_sub, "sub", "sub_Int", "sub_Float");
poly_binop!(poly_mul, "mul", "mul_Int", "mul_Float");
poly_binop!(poly_div, "div", "div_Int", "div_Float");

fn poly_neg(ctx: &EffectContext, args: &[Value]) -> Result<Value, RuntimeError> {
    let target = match &args[0] {
        Value::Int(_) => "neg_Int",
        Value::Float(_) => "neg_Float",
        other => {
            return Err(RuntimeError::TypeMismatch(format!(
                "`neg` has no numeric instance for {}",
                other.type_name()
            )))
        }
    };
    let spec = builtins::spec(target).expect("registered builtin");
    (spec.run)(ctx, args)
}

fn poly_eq(_ctx: &EffectContext, args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::Bool(args[0].structural_eq(&args[1])))
}

fn poly_ne(_ctx: &EffectContext, args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::Bool(!args[0].structural_eq(&args[1])))
}

macro_rules! poly_ord {
    ($name:ident, $target:literal) => {
        fn $name(ctx: &EffectContext, args: &[Value]) -> Result<Value, RuntimeError> {
            let spec = builtins::spec($target).expect("registered builtin");
            (spec.run)(ctx, args)
        }
    };
}

// The Ord builtins already accept any ordered operand pair
poly_ord!(poly_lt, "lt_Int");
poly_ord!(poly_le, "le_Int");
poly_ord!(poly_gt, "gt_Int");
poly_ord!(poly_ge, "ge_Int");

fn poly_show(ctx: &EffectContext, args: &[Value]) -> Result<Value, RuntimeError> {
    let target = match &args[0] {
        Value::Int(_) => "show_Int",
        Value::Float(_) => "show_Float",
        Value::Bool(_) => "show_Bool",
        other => return Ok(Value::string(other.to_string())),
    };
    let spec = builtins::spec(target).expect("registered builtin");
    (spec.run)(ctx, args)
}

fn poly_method(class: &str, method: &str) -> Option<Value> {
    let run: crate::value::BuiltinFn = match (class, method) {
        ("Num", "add") => poly_add,
        ("Num", "sub") => poly_sub,
        ("Num", "mul") => poly_mul,
        ("Num", "div") | ("Fractional", "div") => poly_div,
        ("Num", "neg") => poly_neg,
        ("Eq", "eq") => poly_eq,
        ("Eq", "ne") => poly_ne,
        ("Ord", "lt") => poly_lt,
        ("Ord", "le") => poly_le,
        ("Ord", "gt") => poly_gt,
        ("Ord", "ge") => poly_ge,
        ("Show", "show") => poly_show,
        _ => return None,
    };
    Some(Value::Builtin(Rc::new(Builtin {
        name: format!("{}_{}", method, POLY),
        arity: if method == "neg" || method == "show" { 1 } else { 2 },
        run,
    })))
}

/// The runtime instance table: `(class, type) -> dictionary value`.
/// Built once per runtime and read-only afterwards.
pub struct InstanceTable {
    dicts: HashMap<(String, String), Value>,
}

impl InstanceTable {
    /// Build every registered dictionary, including the `poly` family
    pub fn new() -> Self {
        let mut dicts = HashMap::new();
        for (class, types) in INSTANCES {
            let methods = METHODS
                .iter()
                .find(|(c, _)| c == class)
                .map(|(_, ms)| *ms)
                .unwrap_or(&[]);
            for ty_name in *types {
                let mut table = BTreeMap::new();
                for method in methods {
                    if let Some(name) = method_builtin(ty_name, method) {
                        if let Some(value) = builtins::value(&name) {
                            table.insert(method.to_string(), value);
                        }
                    }
                }
                if !table.is_empty() {
                    dicts.insert(
                        (class.to_string(), ty_name.to_string()),
                        Value::Dict(Rc::new(DictValue {
                            class: class.to_string(),
                            ty: ty_name.to_string(),
                            methods: table,
                        })),
                    );
                }
            }
            // Runtime-dispatched fallback for generalized constraints
            let mut table = BTreeMap::new();
            for method in methods {
                if let Some(value) = poly_method(class, method) {
                    table.insert(method.to_string(), value);
                }
            }
            if !table.is_empty() {
                dicts.insert(
                    (class.to_string(), POLY.to_string()),
                    Value::Dict(Rc::new(DictValue {
                        class: class.to_string(),
                        ty: POLY.to_string(),
                        methods: table,
                    })),
                );
            }
        }
        Self { dicts }
    }

    /// Look up a dictionary
    pub fn get(&self, class: &str, ty: &str) -> Option<Value> {
        self.dicts.get(&(class.to_string(), ty.to_string())).cloned()
    }
}

impl Default for InstanceTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_instance() {
        assert!(has_instance("Num", &Type::int()));
        assert!(has_instance("Num", &Type::float()));
        assert!(!has_instance("Num", &Type::string()));
        assert!(has_instance("Fractional", &Type::float()));
        assert!(!has_instance("Fractional", &Type::int()));
        assert!(!has_instance("Eq", &Type::Var("a".into())));
    }

    #[test]
    fn test_method_builtin_names() {
        assert_eq!(method_builtin("float", "eq").as_deref(), Some("eq_Float"));
        assert_eq!(method_builtin("int", "add").as_deref(), Some("add_Int"));
        assert_eq!(method_builtin("Color", "eq"), None);
    }

    #[test]
    fn test_table_has_concrete_and_poly_dicts() {
        let table = InstanceTable::new();
        assert!(table.get("Eq", "float").is_some());
        assert!(table.get("Num", "int").is_some());
        assert!(table.get("Num", POLY).is_some());
        assert!(table.get("Eq", "Color").is_none());
    }

    #[test]
    fn test_poly_num_dispatches_on_runtime_type() {
        let ctx = EffectContext::sealed();
        let Value::Dict(dict) = InstanceTable::new().get("Num", POLY).unwrap() else {
            panic!("expected dict");
        };
        let Value::Builtin(add) = dict.methods.get("add").unwrap().clone() else {
            panic!("expected builtin");
        };
        assert_eq!(
            (add.run)(&ctx, &[Value::Int(1), Value::Int(2)]).unwrap(),
            Value::Int(3)
        );
        assert_eq!(
            (add.run)(&ctx, &[Value::Float(1.5), Value::Float(2.5)]).unwrap(),
            Value::Float(4.0)
        );
    }
}
