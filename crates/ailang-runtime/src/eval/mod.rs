//! Tree-walking Core evaluator
//!
//! ANF-aware: arguments arrive atomic, so evaluation of an `App` never
//! re-enters complex subexpressions. Closures capture their defining
//! environment; `LetRec` pre-allocates mutable slots and fills them so
//! self and mutual references resolve. Effects only happen inside
//! builtin calls, which route through the capability-checked dispatcher.

pub mod env;

use crate::core::{CoreArm, CoreExpr, CoreKind, CorePattern, GlobalRef, Lit};
use crate::effects::EffectContext;
use crate::typecheck::instances::InstanceTable;
use crate::value::{Closure, RuntimeError, TaggedValue, Value};
use env::Env;
use std::cell::Cell;
use std::rc::Rc;

/// Maximum logical evaluation depth before `RUN_002`. Kept low enough
/// that the guard fires before the host stack runs out in debug builds.
pub const MAX_DEPTH: usize = 1024;

/// Resolves `GlobalRef`s to runtime values; implemented by the linker
pub trait ValueResolver {
    /// Resolve one global reference
    fn resolve(&self, global: &GlobalRef) -> Result<Value, RuntimeError>;
}

/// The evaluator for one capability context
pub struct Evaluator<'a> {
    resolver: &'a dyn ValueResolver,
    instances: &'a InstanceTable,
    ctx: &'a EffectContext,
    /// Module whose code is being evaluated, for bare-variable fallback
    module: String,
    depth: Cell<usize>,
}

impl<'a> Evaluator<'a> {
    /// Create an evaluator
    pub fn new(
        resolver: &'a dyn ValueResolver,
        instances: &'a InstanceTable,
        ctx: &'a EffectContext,
        module: impl Into<String>,
    ) -> Self {
        Self {
            resolver,
            instances,
            ctx,
            module: module.into(),
            depth: Cell::new(0),
        }
    }

    /// Evaluate an expression in an environment
    pub fn eval(&self, expr: &CoreExpr, env: &Env) -> Result<Value, RuntimeError> {
        if self.depth.get() >= MAX_DEPTH {
            return Err(RuntimeError::StackOverflow(MAX_DEPTH));
        }
        self.depth.set(self.depth.get() + 1);
        let result = self.eval_inner(expr, env);
        self.depth.set(self.depth.get() - 1);
        result
    }

    fn eval_inner(&self, expr: &CoreExpr, env: &Env) -> Result<Value, RuntimeError> {
        match &expr.kind {
            CoreKind::Var(name) => match env.lookup(name) {
                Some(value) => Ok(value),
                None => self.resolver.resolve(&GlobalRef {
                    module: self.module.clone(),
                    name: name.clone(),
                }),
            },
            CoreKind::Lit(lit) => Ok(lit_value(lit)),
            CoreKind::Lambda { params, body } => Ok(Value::Closure(Rc::new(Closure {
                params: params.clone(),
                body: (**body).clone(),
                env: env.clone(),
            }))),
            CoreKind::Let { name, value, body } => {
                let bound = self.eval(value, env)?;
                let child = env.child();
                child.bind(name.clone(), bound);
                self.eval(body, &child)
            }
            CoreKind::LetRec { bindings, body } => {
                let child = env.child();
                // Placeholder slots first, so every binding sees the others
                for (name, _) in bindings {
                    child.bind(name.clone(), Value::Unit);
                }
                for (name, value) in bindings {
                    let bound = self.eval(value, &child)?;
                    child.fill(name, bound);
                }
                self.eval(body, &child)
            }
            CoreKind::App { func, args } => {
                let callee = self.eval(func, env)?;
                let mut arg_values = Vec::with_capacity(args.len());
                for arg in args {
                    arg_values.push(self.eval(arg, env)?);
                }
                self.apply(callee, arg_values)
            }
            CoreKind::If {
                cond,
                then_branch,
                else_branch,
            } => match self.eval(cond, env)? {
                Value::Bool(true) => self.eval(then_branch, env),
                Value::Bool(false) => self.eval(else_branch, env),
                other => Err(RuntimeError::TypeMismatch(format!(
                    "if condition must be a bool, got {}",
                    other.type_name()
                ))),
            },
            CoreKind::Match { scrutinee, arms } => {
                let value = self.eval(scrutinee, env)?;
                self.eval_match(&value, arms, env)
            }
            CoreKind::Intrinsic { op, .. } => Err(RuntimeError::OpUnresolved(
                op.symbol().to_string(),
            )),
            CoreKind::Record(fields) => {
                let mut map = std::collections::BTreeMap::new();
                for (name, value) in fields {
                    map.insert(name.clone(), self.eval(value, env)?);
                }
                Ok(Value::Record(Rc::new(map)))
            }
            CoreKind::RecordAccess { expr: target, field } => {
                match self.eval(target, env)? {
                    Value::Record(fields) => fields.get(field).cloned().ok_or_else(|| {
                        RuntimeError::TypeMismatch(format!("record has no field `{}`", field))
                    }),
                    other => Err(RuntimeError::TypeMismatch(format!(
                        "cannot access field `{}` on {}",
                        field,
                        other.type_name()
                    ))),
                }
            }
            CoreKind::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item, env)?);
                }
                Ok(Value::list(values))
            }
            CoreKind::Tuple(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item, env)?);
                }
                Ok(Value::Tuple(Rc::new(values)))
            }
            CoreKind::DictAbs { params, body } => Ok(Value::Closure(Rc::new(Closure {
                params: params.clone(),
                body: (**body).clone(),
                env: env.clone(),
            }))),
            CoreKind::DictApp { dict, method, args } => {
                let dict_value = self.eval(dict, env)?;
                let Value::Dict(dict) = dict_value else {
                    return Err(RuntimeError::TypeMismatch(format!(
                        "dictionary application on {}",
                        dict_value.type_name()
                    )));
                };
                let Some(method_value) = dict.methods.get(method).cloned() else {
                    return Err(RuntimeError::TypeMismatch(format!(
                        "dictionary `{} {}` has no method `{}`",
                        dict.class, dict.ty, method
                    )));
                };
                let mut arg_values = Vec::with_capacity(args.len());
                for arg in args {
                    arg_values.push(self.eval(arg, env)?);
                }
                self.apply(method_value, arg_values)
            }
            CoreKind::DictRef { class, ty } => {
                self.instances.get(class, ty).ok_or_else(|| {
                    RuntimeError::OpUnresolved(format!("{} {}", class, ty))
                })
            }
            CoreKind::Global(global) => self.resolver.resolve(global),
        }
    }

    /// Apply a callable to already-evaluated arguments
    pub fn apply(&self, callee: Value, args: Vec<Value>) -> Result<Value, RuntimeError> {
        match callee {
            Value::Closure(closure) => {
                if closure.params.len() != args.len() {
                    return Err(RuntimeError::Arity {
                        expected: closure.params.len(),
                        got: args.len(),
                    });
                }
                let call_env = closure.env.child();
                for (param, arg) in closure.params.iter().zip(args) {
                    call_env.bind(param.clone(), arg);
                }
                self.eval(&closure.body, &call_env)
            }
            Value::Builtin(builtin) => {
                if builtin.arity != args.len() {
                    return Err(RuntimeError::Arity {
                        expected: builtin.arity,
                        got: args.len(),
                    });
                }
                (builtin.run)(self.ctx, &args)
            }
            Value::CtorFactory(factory) => {
                if factory.arity != args.len() {
                    return Err(RuntimeError::Arity {
                        expected: factory.arity,
                        got: args.len(),
                    });
                }
                Ok(make_tagged(
                    &factory.module,
                    &factory.type_name,
                    &factory.ctor,
                    args,
                ))
            }
            other => Err(RuntimeError::TypeMismatch(format!(
                "cannot call a {}",
                other.type_name()
            ))),
        }
    }

    fn eval_match(
        &self,
        value: &Value,
        arms: &[CoreArm],
        env: &Env,
    ) -> Result<Value, RuntimeError> {
        for arm in arms {
            let mut bindings = Vec::new();
            if !try_bind(&arm.pattern, value, &mut bindings) {
                continue;
            }
            let arm_env = env.child();
            for (name, bound) in bindings {
                arm_env.bind(name, bound);
            }
            if let Some(guard) = &arm.guard {
                match self.eval(guard, &arm_env)? {
                    Value::Bool(true) => {}
                    Value::Bool(false) => continue,
                    other => {
                        return Err(RuntimeError::TypeMismatch(format!(
                            "match guard must be a bool, got {}",
                            other.type_name()
                        )))
                    }
                }
            }
            return self.eval(&arm.body, &arm_env);
        }
        Err(RuntimeError::MatchExhausted(value.to_string()))
    }
}

fn lit_value(lit: &Lit) -> Value {
    match lit {
        Lit::Int(n) => Value::Int(*n),
        Lit::Float(x) => Value::Float(*x),
        Lit::Str(s) => Value::string(s.clone()),
        Lit::Bool(b) => Value::Bool(*b),
        Lit::Unit => Value::Unit,
    }
}

/// Attempt to bind a pattern against a value
pub fn try_bind(pattern: &CorePattern, value: &Value, out: &mut Vec<(String, Value)>) -> bool {
    match pattern {
        CorePattern::Wildcard => true,
        CorePattern::Var(name) => {
            out.push((name.clone(), value.clone()));
            true
        }
        CorePattern::Lit(lit) => lit_value(lit).structural_eq(value),
        CorePattern::Tuple(items) => match value {
            Value::Tuple(values) if values.len() == items.len() => items
                .iter()
                .zip(values.iter())
                .all(|(pat, val)| try_bind(pat, val, out)),
            _ => false,
        },
        CorePattern::List { items, rest } => match value {
            Value::List(values) => {
                let matches_len = match rest {
                    Some(_) => values.len() >= items.len(),
                    None => values.len() == items.len(),
                };
                if !matches_len {
                    return false;
                }
                for (pat, val) in items.iter().zip(values.iter()) {
                    if !try_bind(pat, val, out) {
                        return false;
                    }
                }
                match rest {
                    Some(rest) => {
                        let remainder = Value::list(values[items.len()..].to_vec());
                        try_bind(rest, &remainder, out)
                    }
                    None => true,
                }
            }
            _ => false,
        },
        CorePattern::Record { fields, rest } => match value {
            Value::Record(values) => {
                if !rest && values.len() != fields.len() {
                    return false;
                }
                for (name, pat) in fields {
                    match values.get(name) {
                        Some(val) => {
                            if !try_bind(pat, val, out) {
                                return false;
                            }
                        }
                        None => return false,
                    }
                }
                true
            }
            _ => false,
        },
        CorePattern::Ctor {
            module,
            type_name,
            ctor,
            args,
        } => match value {
            Value::Tagged(tagged) => {
                tagged.module == *module
                    && tagged.type_name == *type_name
                    && tagged.ctor == *ctor
                    && tagged.fields.len() == args.len()
                    && args
                        .iter()
                        .zip(tagged.fields.iter())
                        .all(|(pat, val)| try_bind(pat, val, out))
            }
            _ => false,
        },
    }
}

/// Construct a tagged value; used by the `$adt` factories
pub fn make_tagged(
    module: &str,
    type_name: &str,
    ctor: &str,
    fields: Vec<Value>,
) -> Value {
    Value::Tagged(Rc::new(TaggedValue {
        module: module.to_string(),
        type_name: type_name.to_string(),
        ctor: ctor.to_string(),
        fields,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CoreKind, NodeIdGen};
    use crate::span::Span;

    struct NoGlobals;

    impl ValueResolver for NoGlobals {
        fn resolve(&self, global: &GlobalRef) -> Result<Value, RuntimeError> {
            Err(RuntimeError::UnresolvedGlobal {
                module: global.module.clone(),
                name: global.name.clone(),
            })
        }
    }

    fn node(gen: &mut NodeIdGen, kind: CoreKind) -> CoreExpr {
        CoreExpr {
            id: gen.fresh(),
            span: Span::dummy(),
            kind,
        }
    }

    fn eval_with(expr: &CoreExpr) -> Result<Value, RuntimeError> {
        let resolver = NoGlobals;
        let instances = InstanceTable::new();
        let ctx = EffectContext::sealed();
        let evaluator = Evaluator::new(&resolver, &instances, &ctx, "test");
        evaluator.eval(expr, &Env::new())
    }

    #[test]
    fn test_let_and_var() {
        let mut gen = NodeIdGen::new();
        let value = node(&mut gen, CoreKind::Lit(Lit::Int(5)));
        let body = node(&mut gen, CoreKind::Var("x".into()));
        let expr = node(
            &mut gen,
            CoreKind::Let {
                name: "x".into(),
                value: Box::new(value),
                body: Box::new(body),
            },
        );
        assert_eq!(eval_with(&expr).unwrap(), Value::Int(5));
    }

    #[test]
    fn test_letrec_self_reference() {
        // letrec f = \n. match n { 0 => 0, _ => f(0) } in f(3)
        let mut gen = NodeIdGen::new();
        let param = node(&mut gen, CoreKind::Var("n".into()));
        let zero_body = node(&mut gen, CoreKind::Lit(Lit::Int(0)));
        let rec_f = node(&mut gen, CoreKind::Var("f".into()));
        let rec_zero = node(&mut gen, CoreKind::Lit(Lit::Int(0)));
        let rec_call = node(
            &mut gen,
            CoreKind::App {
                func: Box::new(rec_f),
                args: vec![rec_zero],
            },
        );
        let match_expr = node(
            &mut gen,
            CoreKind::Match {
                scrutinee: Box::new(param),
                arms: vec![
                    CoreArm {
                        pattern: CorePattern::Lit(Lit::Int(0)),
                        guard: None,
                        body: zero_body,
                    },
                    CoreArm {
                        pattern: CorePattern::Wildcard,
                        guard: None,
                        body: rec_call,
                    },
                ],
            },
        );
        let lambda = node(
            &mut gen,
            CoreKind::Lambda {
                params: vec!["n".into()],
                body: Box::new(match_expr),
            },
        );
        let call_f = node(&mut gen, CoreKind::Var("f".into()));
        let three = node(&mut gen, CoreKind::Lit(Lit::Int(3)));
        let call = node(
            &mut gen,
            CoreKind::App {
                func: Box::new(call_f),
                args: vec![three],
            },
        );
        let letrec = node(
            &mut gen,
            CoreKind::LetRec {
                bindings: vec![("f".into(), lambda)],
                body: Box::new(call),
            },
        );
        assert_eq!(eval_with(&letrec).unwrap(), Value::Int(0));
    }

    #[test]
    fn test_match_exhaust_reports_value() {
        let mut gen = NodeIdGen::new();
        let scrutinee = node(&mut gen, CoreKind::Lit(Lit::Bool(false)));
        let body = node(&mut gen, CoreKind::Lit(Lit::Int(1)));
        let match_expr = node(
            &mut gen,
            CoreKind::Match {
                scrutinee: Box::new(scrutinee),
                arms: vec![CoreArm {
                    pattern: CorePattern::Lit(Lit::Bool(true)),
                    guard: None,
                    body,
                }],
            },
        );
        let err = eval_with(&match_expr).unwrap_err();
        assert_eq!(err, RuntimeError::MatchExhausted("false".to_string()));
    }

    #[test]
    fn test_intrinsic_refuses_to_run() {
        let mut gen = NodeIdGen::new();
        let a = node(&mut gen, CoreKind::Lit(Lit::Int(1)));
        let b = node(&mut gen, CoreKind::Lit(Lit::Int(2)));
        let add = node(
            &mut gen,
            CoreKind::Intrinsic {
                op: crate::core::IntrinsicOp::Add,
                args: vec![a, b],
            },
        );
        assert_eq!(eval_with(&add).unwrap_err().code(), "TC_OP_UNRESOLVED");
    }

    #[test]
    fn test_dict_app_dispatches() {
        let mut gen = NodeIdGen::new();
        let dict = node(
            &mut gen,
            CoreKind::DictRef {
                class: "Eq".into(),
                ty: "float".into(),
            },
        );
        let a = node(&mut gen, CoreKind::Lit(Lit::Float(0.0)));
        let b = node(&mut gen, CoreKind::Lit(Lit::Float(0.0)));
        let app = node(
            &mut gen,
            CoreKind::DictApp {
                dict: Box::new(dict),
                method: "eq".into(),
                args: vec![a, b],
            },
        );
        assert_eq!(eval_with(&app).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_arity_mismatch() {
        let mut gen = NodeIdGen::new();
        let body = node(&mut gen, CoreKind::Var("x".into()));
        let lambda = node(
            &mut gen,
            CoreKind::Lambda {
                params: vec!["x".into()],
                body: Box::new(body),
            },
        );
        let a = node(&mut gen, CoreKind::Lit(Lit::Int(1)));
        let b = node(&mut gen, CoreKind::Lit(Lit::Int(2)));
        let call = node(
            &mut gen,
            CoreKind::App {
                func: Box::new(lambda),
                args: vec![a, b],
            },
        );
        assert_eq!(
            eval_with(&call).unwrap_err(),
            RuntimeError::Arity {
                expected: 1,
                got: 2
            }
        );
    }

    #[test]
    fn test_guard_falls_through() {
        let mut gen = NodeIdGen::new();
        let scrutinee = node(&mut gen, CoreKind::Lit(Lit::Int(5)));
        let guard = node(&mut gen, CoreKind::Lit(Lit::Bool(false)));
        let first = node(&mut gen, CoreKind::Lit(Lit::Int(1)));
        let second = node(&mut gen, CoreKind::Lit(Lit::Int(2)));
        let match_expr = node(
            &mut gen,
            CoreKind::Match {
                scrutinee: Box::new(scrutinee),
                arms: vec![
                    CoreArm {
                        pattern: CorePattern::Var("n".into()),
                        guard: Some(guard),
                        body: first,
                    },
                    CoreArm {
                        pattern: CorePattern::Wildcard,
                        guard: None,
                        body: second,
                    },
                ],
            },
        );
        assert_eq!(eval_with(&match_expr).unwrap(), Value::Int(2));
    }

    #[test]
    fn test_nested_ctor_pattern_binding() {
        let some_one = make_tagged(
            "std/option",
            "Option",
            "Some",
            vec![Value::Tuple(Rc::new(vec![Value::Int(1), Value::Int(2)]))],
        );
        let pattern = CorePattern::Ctor {
            module: "std/option".into(),
            type_name: "Option".into(),
            ctor: "Some".into(),
            args: vec![CorePattern::Tuple(vec![
                CorePattern::Var("a".into()),
                CorePattern::Var("b".into()),
            ])],
        };
        let mut out = Vec::new();
        assert!(try_bind(&pattern, &some_one, &mut out));
        assert_eq!(out[0], ("a".to_string(), Value::Int(1)));
        assert_eq!(out[1], ("b".to_string(), Value::Int(2)));
    }

    #[test]
    fn test_ctor_pattern_checks_module_path() {
        let value = make_tagged("other/mod", "Option", "Some", vec![Value::Int(1)]);
        let pattern = CorePattern::Ctor {
            module: "std/option".into(),
            type_name: "Option".into(),
            ctor: "Some".into(),
            args: vec![CorePattern::Wildcard],
        };
        let mut out = Vec::new();
        assert!(!try_bind(&pattern, &value, &mut out));
    }

    #[test]
    fn test_list_rest_pattern() {
        let value = Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        let pattern = CorePattern::List {
            items: vec![CorePattern::Var("x".into())],
            rest: Some(Box::new(CorePattern::Var("rest".into()))),
        };
        let mut out = Vec::new();
        assert!(try_bind(&pattern, &value, &mut out));
        assert_eq!(out[0].1, Value::Int(1));
        assert_eq!(out[1].1, Value::list(vec![Value::Int(2), Value::Int(3)]));
    }

    #[test]
    fn test_stack_depth_guard() {
        // letrec f = \n. f(n) in f(0) recurses forever
        let mut gen = NodeIdGen::new();
        let rec_f = node(&mut gen, CoreKind::Var("f".into()));
        let rec_n = node(&mut gen, CoreKind::Var("n".into()));
        let rec_call = node(
            &mut gen,
            CoreKind::App {
                func: Box::new(rec_f),
                args: vec![rec_n],
            },
        );
        let lambda = node(
            &mut gen,
            CoreKind::Lambda {
                params: vec!["n".into()],
                body: Box::new(rec_call),
            },
        );
        let call_f = node(&mut gen, CoreKind::Var("f".into()));
        let zero = node(&mut gen, CoreKind::Lit(Lit::Int(0)));
        let call = node(
            &mut gen,
            CoreKind::App {
                func: Box::new(call_f),
                args: vec![zero],
            },
        );
        let letrec = node(
            &mut gen,
            CoreKind::LetRec {
                bindings: vec![("f".into(), lambda)],
                body: Box::new(call),
            },
        );
        assert_eq!(eval_with(&letrec).unwrap_err().code(), "RUN_002");
    }
}
