//! The `$builtin` module
//!
//! A process-wide registry of host functions: effectful primitives the
//! embedded stdlib wraps (`_io_println`, `_fs_read_file`, ...), pure
//! helpers, and the monomorphic operator implementations (`add_Int`,
//! `eq_Float`, ...) that dictionaries and OpLowering dispatch to. Each
//! spec carries its scheme with the effect row intact, so rows survive
//! export through the synthetic interface.

use crate::effects::{self, EffectContext};
use crate::iface::{Iface, IfaceExport, IfaceRef};
use crate::types::{EffectRow, Scheme, Type};
use crate::value::{Builtin, BuiltinFn, RuntimeError, Value};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use std::sync::OnceLock;

/// Digest schema tag for the synthetic builtin module
pub const BUILTIN_SCHEMA: &str = "builtin-v2-stable";

/// One registered builtin
pub struct BuiltinSpec {
    /// Exported name
    pub name: &'static str,
    /// Argument count
    pub arity: usize,
    /// Type scheme, effect row included
    pub scheme: Scheme,
    /// Host implementation
    pub run: BuiltinFn,
}

impl BuiltinSpec {
    /// True iff the scheme's effect row is empty
    pub fn purity(&self) -> bool {
        self.scheme
            .ty
            .effect_row()
            .map(|row| row.is_pure())
            .unwrap_or(true)
    }
}

fn func(params: Vec<Type>, ret: Type, effects: &[&str]) -> Scheme {
    Scheme::mono(Type::Func {
        params,
        ret: Box::new(ret),
        effects: EffectRow::closed(effects.iter().copied()),
    })
}

fn poly(vars: &[&str], params: Vec<Type>, ret: Type) -> Scheme {
    Scheme {
        vars: vars.iter().map(|v| v.to_string()).collect(),
        constraints: Vec::new(),
        ty: Type::Func {
            params,
            ret: Box::new(ret),
            effects: EffectRow::pure(),
        },
    }
}

// ----------------------------------------------------------------------
// Effectful primitives: thin shims over the effect dispatcher
// ----------------------------------------------------------------------

macro_rules! effect_shim {
    ($name:ident, $effect:literal, $op:literal) => {
        fn $name(ctx: &EffectContext, args: &[Value]) -> Result<Value, RuntimeError> {
            effects::call(ctx, $effect, $op, args)
        }
    };
}

effect_shim!(io_println, "IO", "println");
effect_shim!(io_print, "IO", "print");
effect_shim!(io_read_line, "IO", "readLine");
effect_shim!(fs_read_file, "FS", "readFile");
effect_shim!(fs_write_file, "FS", "writeFile");
effect_shim!(fs_exists, "FS", "exists");
effect_shim!(clock_now, "Clock", "now");
effect_shim!(clock_sleep, "Clock", "sleep");
effect_shim!(net_http_get, "Net", "httpGet");
effect_shim!(net_http_post, "Net", "httpPost");
effect_shim!(env_get, "Env", "get");

// ----------------------------------------------------------------------
// Pure helpers
// ----------------------------------------------------------------------

fn str_len(_ctx: &EffectContext, args: &[Value]) -> Result<Value, RuntimeError> {
    match &args[0] {
        Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
        other => Err(type_error("_str_len", "string", other)),
    }
}

fn show_int(_ctx: &EffectContext, args: &[Value]) -> Result<Value, RuntimeError> {
    match &args[0] {
        Value::Int(n) => Ok(Value::string(n.to_string())),
        other => Err(type_error("_show_int", "int", other)),
    }
}

fn show_float(_ctx: &EffectContext, args: &[Value]) -> Result<Value, RuntimeError> {
    match &args[0] {
        v @ Value::Float(_) => Ok(Value::string(v.to_string())),
        other => Err(type_error("_show_float", "float", other)),
    }
}

fn show_bool(_ctx: &EffectContext, args: &[Value]) -> Result<Value, RuntimeError> {
    match &args[0] {
        Value::Bool(b) => Ok(Value::string(b.to_string())),
        other => Err(type_error("_show_bool", "bool", other)),
    }
}

fn list_cons(_ctx: &EffectContext, args: &[Value]) -> Result<Value, RuntimeError> {
    match &args[1] {
        Value::List(items) => {
            let mut out = Vec::with_capacity(items.len() + 1);
            out.push(args[0].clone());
            out.extend(items.iter().cloned());
            Ok(Value::list(out))
        }
        other => Err(type_error("_list_cons", "list", other)),
    }
}

fn type_error(name: &str, expected: &str, got: &Value) -> RuntimeError {
    RuntimeError::TypeMismatch(format!(
        "`{}` expected a {} argument, got {}",
        name,
        expected,
        got.type_name()
    ))
}

// ----------------------------------------------------------------------
// Monomorphic operator implementations
// ----------------------------------------------------------------------

macro_rules! int_arith {
    ($name:ident, $checked:ident, $sym:literal) => {
        fn $name(_ctx: &EffectContext, args: &[Value]) -> Result<Value, RuntimeError> {
            match (&args[0], &args[1]) {
                (Value::Int(a), Value::Int(b)) => a
                    .$checked(*b)
                    .map(Value::Int)
                    .ok_or_else(|| RuntimeError::Overflow($sym.to_string())),
                (a, b) => Err(RuntimeError::TypeMismatch(format!(
                    "`{}` expected ints, got {} and {}",
                    $sym,
                    a.type_name(),
                    b.type_name()
                ))),
            }
        }
    };
}

int_arith!(add_int, checked_add, "+");
int_arith!(sub_int, checked_sub, "-");
int_arith!(mul_int, checked_mul, "*");

fn div_int(_ctx: &EffectContext, args: &[Value]) -> Result<Value, RuntimeError> {
    match (&args[0], &args[1]) {
        (Value::Int(_), Value::Int(0)) => Err(RuntimeError::DivisionByZero),
        (Value::Int(a), Value::Int(b)) => a
            .checked_div(*b)
            .map(Value::Int)
            .ok_or_else(|| RuntimeError::Overflow("/".to_string())),
        (a, b) => Err(RuntimeError::TypeMismatch(format!(
            "`/` expected ints, got {} and {}",
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn neg_int(_ctx: &EffectContext, args: &[Value]) -> Result<Value, RuntimeError> {
    match &args[0] {
        Value::Int(n) => n
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| RuntimeError::Overflow("-".to_string())),
        other => Err(type_error("neg_Int", "int", other)),
    }
}

macro_rules! float_arith {
    ($name:ident, $op:tt) => {
        fn $name(_ctx: &EffectContext, args: &[Value]) -> Result<Value, RuntimeError> {
            match (&args[0], &args[1]) {
                (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a $op b)),
                (a, b) => Err(RuntimeError::TypeMismatch(format!(
                    "float operator expected floats, got {} and {}",
                    a.type_name(),
                    b.type_name()
                ))),
            }
        }
    };
}

float_arith!(add_float, +);
float_arith!(sub_float, -);
float_arith!(mul_float, *);
float_arith!(div_float, /);

fn neg_float(_ctx: &EffectContext, args: &[Value]) -> Result<Value, RuntimeError> {
    match &args[0] {
        Value::Float(x) => Ok(Value::Float(-x)),
        other => Err(type_error("neg_Float", "float", other)),
    }
}

fn eq_any(args: &[Value]) -> bool {
    args[0].structural_eq(&args[1])
}

fn eq_op(_ctx: &EffectContext, args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::Bool(eq_any(args)))
}

fn ne_op(_ctx: &EffectContext, args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::Bool(!eq_any(args)))
}

macro_rules! ord_op {
    ($name:ident, $op:tt) => {
        fn $name(_ctx: &EffectContext, args: &[Value]) -> Result<Value, RuntimeError> {
            match (&args[0], &args[1]) {
                (Value::Int(a), Value::Int(b)) => Ok(Value::Bool(a $op b)),
                (Value::Float(a), Value::Float(b)) => Ok(Value::Bool(a $op b)),
                (Value::Str(a), Value::Str(b)) => Ok(Value::Bool(a $op b)),
                (a, b) => Err(RuntimeError::TypeMismatch(format!(
                    "comparison expected two ordered values of one type, got {} and {}",
                    a.type_name(),
                    b.type_name()
                ))),
            }
        }
    };
}

ord_op!(lt_op, <);
ord_op!(le_op, <=);
ord_op!(gt_op, >);
ord_op!(ge_op, >=);

fn concat_string(_ctx: &EffectContext, args: &[Value]) -> Result<Value, RuntimeError> {
    match (&args[0], &args[1]) {
        (Value::Str(a), Value::Str(b)) => Ok(Value::string(format!("{}{}", a, b))),
        (a, b) => Err(RuntimeError::TypeMismatch(format!(
            "`++` expected strings, got {} and {}",
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn not_bool(_ctx: &EffectContext, args: &[Value]) -> Result<Value, RuntimeError> {
    match &args[0] {
        Value::Bool(b) => Ok(Value::Bool(!b)),
        other => Err(type_error("not_Bool", "bool", other)),
    }
}

// ----------------------------------------------------------------------
// Registry
// ----------------------------------------------------------------------

fn build_specs() -> Vec<BuiltinSpec> {
    let int = Type::int;
    let float = Type::float;
    let string = Type::string;
    let boolean = Type::bool;
    let unit = Type::unit;

    let mut specs = vec![
        // Effectful primitives
        BuiltinSpec {
            name: "_io_println",
            arity: 1,
            scheme: func(vec![string()], unit(), &["IO"]),
            run: io_println,
        },
        BuiltinSpec {
            name: "_io_print",
            arity: 1,
            scheme: func(vec![string()], unit(), &["IO"]),
            run: io_print,
        },
        BuiltinSpec {
            name: "_io_read_line",
            arity: 0,
            scheme: func(vec![], string(), &["IO"]),
            run: io_read_line,
        },
        BuiltinSpec {
            name: "_fs_read_file",
            arity: 1,
            scheme: func(vec![string()], string(), &["FS"]),
            run: fs_read_file,
        },
        BuiltinSpec {
            name: "_fs_write_file",
            arity: 2,
            scheme: func(vec![string(), string()], unit(), &["FS"]),
            run: fs_write_file,
        },
        BuiltinSpec {
            name: "_fs_exists",
            arity: 1,
            scheme: func(vec![string()], boolean(), &["FS"]),
            run: fs_exists,
        },
        BuiltinSpec {
            name: "_clock_now",
            arity: 0,
            scheme: func(vec![], int(), &["Clock"]),
            run: clock_now,
        },
        BuiltinSpec {
            name: "_clock_sleep",
            arity: 1,
            scheme: func(vec![int()], unit(), &["Clock"]),
            run: clock_sleep,
        },
        BuiltinSpec {
            name: "_net_http_get",
            arity: 1,
            scheme: func(vec![string()], string(), &["Net"]),
            run: net_http_get,
        },
        BuiltinSpec {
            name: "_net_http_post",
            arity: 2,
            scheme: func(vec![string(), string()], string(), &["Net"]),
            run: net_http_post,
        },
        BuiltinSpec {
            name: "_env_get",
            arity: 1,
            scheme: func(vec![string()], string(), &["Env"]),
            run: env_get,
        },
        // Pure helpers
        BuiltinSpec {
            name: "_str_len",
            arity: 1,
            scheme: func(vec![string()], int(), &[]),
            run: str_len,
        },
        BuiltinSpec {
            name: "_show_int",
            arity: 1,
            scheme: func(vec![int()], string(), &[]),
            run: show_int,
        },
        BuiltinSpec {
            name: "_show_float",
            arity: 1,
            scheme: func(vec![float()], string(), &[]),
            run: show_float,
        },
        BuiltinSpec {
            name: "_show_bool",
            arity: 1,
            scheme: func(vec![boolean()], string(), &[]),
            run: show_bool,
        },
        BuiltinSpec {
            name: "_list_cons",
            arity: 2,
            scheme: poly(
                &["a"],
                vec![Type::Var("a".into()), Type::List(Box::new(Type::Var("a".into())))],
                Type::List(Box::new(Type::Var("a".into()))),
            ),
            run: list_cons,
        },
    ];

    // Monomorphic operator implementations, dispatched by dictionaries
    // or direct OpLowering rewrites
    let binops: &[(&str, BuiltinFn, fn() -> Type, fn() -> Type)] = &[
        ("add_Int", add_int as BuiltinFn, int, int),
        ("sub_Int", sub_int, int, int),
        ("mul_Int", mul_int, int, int),
        ("div_Int", div_int, int, int),
        ("add_Float", add_float, float, float),
        ("sub_Float", sub_float, float, float),
        ("mul_Float", mul_float, float, float),
        ("div_Float", div_float, float, float),
        ("concat_String", concat_string, string, string),
    ];
    for (name, run, operand, result) in binops {
        specs.push(BuiltinSpec {
            name,
            arity: 2,
            scheme: func(vec![operand(), operand()], result(), &[]),
            run: *run,
        });
    }

    let predicates: &[(&str, BuiltinFn, fn() -> Type)] = &[
        ("eq_Int", eq_op as BuiltinFn, int),
        ("eq_Float", eq_op, float),
        ("eq_String", eq_op, string),
        ("eq_Bool", eq_op, boolean),
        ("eq_Unit", eq_op, unit),
        ("ne_Int", ne_op, int),
        ("ne_Float", ne_op, float),
        ("ne_String", ne_op, string),
        ("ne_Bool", ne_op, boolean),
        ("ne_Unit", ne_op, unit),
        ("lt_Int", lt_op, int),
        ("le_Int", le_op, int),
        ("gt_Int", gt_op, int),
        ("ge_Int", ge_op, int),
        ("lt_Float", lt_op, float),
        ("le_Float", le_op, float),
        ("gt_Float", gt_op, float),
        ("ge_Float", ge_op, float),
        ("lt_String", lt_op, string),
        ("le_String", le_op, string),
        ("gt_String", gt_op, string),
        ("ge_String", ge_op, string),
    ];
    for (name, run, operand) in predicates {
        specs.push(BuiltinSpec {
            name,
            arity: 2,
            scheme: func(vec![operand(), operand()], boolean(), &[]),
            run: *run,
        });
    }

    specs.push(BuiltinSpec {
        name: "neg_Int",
        arity: 1,
        scheme: func(vec![int()], int(), &[]),
        run: neg_int,
    });
    specs.push(BuiltinSpec {
        name: "neg_Float",
        arity: 1,
        scheme: func(vec![float()], float(), &[]),
        run: neg_float,
    });
    specs.push(BuiltinSpec {
        name: "not_Bool",
        arity: 1,
        scheme: func(vec![boolean()], boolean(), &[]),
        run: not_bool,
    });
    specs.push(BuiltinSpec {
        name: "show_Int",
        arity: 1,
        scheme: func(vec![int()], string(), &[]),
        run: show_int,
    });
    specs.push(BuiltinSpec {
        name: "show_Float",
        arity: 1,
        scheme: func(vec![float()], string(), &[]),
        run: show_float,
    });
    specs.push(BuiltinSpec {
        name: "show_Bool",
        arity: 1,
        scheme: func(vec![boolean()], string(), &[]),
        run: show_bool,
    });

    specs.sort_by(|a, b| a.name.cmp(b.name));
    specs
}

fn registry() -> &'static (Vec<BuiltinSpec>, HashMap<&'static str, usize>) {
    static REGISTRY: OnceLock<(Vec<BuiltinSpec>, HashMap<&'static str, usize>)> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let specs = build_specs();
        let index = specs
            .iter()
            .enumerate()
            .map(|(i, spec)| (spec.name, i))
            .collect();
        (specs, index)
    })
}

/// All builtin specs, sorted by name
pub fn specs() -> &'static [BuiltinSpec] {
    &registry().0
}

/// Look up one builtin spec
pub fn spec(name: &str) -> Option<&'static BuiltinSpec> {
    let (specs, index) = registry();
    index.get(name).map(|&i| &specs[i])
}

/// The runtime value for a builtin
pub fn value(name: &str) -> Option<Value> {
    spec(name).map(|s| {
        Value::Builtin(Rc::new(Builtin {
            name: s.name.to_string(),
            arity: s.arity,
            run: s.run,
        }))
    })
}

/// Build the synthetic `$builtin` interface. Effect rows on effectful
/// builtins survive into the exported schemes.
pub fn builtin_iface() -> Iface {
    let mut exports = BTreeMap::new();
    for spec in specs() {
        exports.insert(
            spec.name.to_string(),
            IfaceExport {
                scheme: spec.scheme.clone(),
                purity: spec.purity(),
                global_ref: IfaceRef {
                    module: "$builtin".to_string(),
                    name: spec.name.to_string(),
                },
            },
        );
    }
    Iface::new("$builtin", BUILTIN_SCHEMA, exports, BTreeMap::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_specs_are_sorted_and_unique() {
        let names: Vec<&str> = specs().iter().map(|s| s.name).collect();
        let mut sorted = names.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(names, sorted);
    }

    #[test]
    fn test_effectful_builtin_keeps_row() {
        let spec = spec("_io_println").unwrap();
        assert!(!spec.purity());
        let row = spec.scheme.ty.effect_row().unwrap();
        assert!(row.labels.contains("IO"));
        // The exported interface carries the same row
        let iface = builtin_iface();
        let export = iface.exports.get("_io_println").unwrap();
        assert_eq!(export.scheme, spec.scheme);
        assert!(!export.purity);
    }

    #[test]
    fn test_builtin_digest_stable() {
        assert_eq!(builtin_iface().digest, builtin_iface().digest);
        assert_eq!(builtin_iface().schema, BUILTIN_SCHEMA);
    }

    #[test]
    fn test_int_arithmetic() {
        let ctx = EffectContext::sealed();
        assert_eq!(
            add_int(&ctx, &[Value::Int(2), Value::Int(3)]).unwrap(),
            Value::Int(5)
        );
        assert_eq!(
            div_int(&ctx, &[Value::Int(7), Value::Int(2)]).unwrap(),
            Value::Int(3)
        );
        assert_eq!(
            div_int(&ctx, &[Value::Int(1), Value::Int(0)]).unwrap_err(),
            RuntimeError::DivisionByZero
        );
        assert_eq!(
            add_int(&ctx, &[Value::Int(i64::MAX), Value::Int(1)])
                .unwrap_err()
                .code(),
            "RUN_005"
        );
    }

    #[test]
    fn test_float_equality_dispatch() {
        let ctx = EffectContext::sealed();
        assert_eq!(
            eq_op(&ctx, &[Value::Float(0.0), Value::Float(0.0)]).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_list_cons() {
        let ctx = EffectContext::sealed();
        let out = list_cons(&ctx, &[Value::Int(1), Value::list(vec![Value::Int(2)])]).unwrap();
        assert_eq!(out, Value::list(vec![Value::Int(1), Value::Int(2)]));
    }

    #[test]
    fn test_polymorphic_scheme_quantified() {
        let spec = spec("_list_cons").unwrap();
        assert_eq!(spec.scheme.vars, vec!["a".to_string()]);
    }
}
