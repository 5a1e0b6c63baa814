//! ANF discipline verifier
//!
//! Walks a Core program and reports every position where a non-atomic
//! expression appears in an argument slot. Rewrites over Core (OpLowering
//! in particular) must leave `verify_program` passing.

use super::{BindingGroup, CoreExpr, CoreKind, CoreProgram, NodeId};

/// A single ANF violation
#[derive(Debug, Clone, PartialEq)]
pub struct AnfViolation {
    /// Node at fault
    pub node: NodeId,
    /// Which slot held the non-atomic expression
    pub context: String,
}

/// Verify a full module program
pub fn verify_program(program: &CoreProgram) -> Result<(), Vec<AnfViolation>> {
    let mut violations = Vec::new();
    for group in &program.groups {
        match group {
            BindingGroup::Single(binding) => check(&binding.expr, &mut violations),
            BindingGroup::Rec(bindings) => {
                for binding in bindings {
                    check(&binding.expr, &mut violations);
                }
            }
        }
    }
    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

/// Verify a single expression tree
pub fn verify_expr(expr: &CoreExpr) -> Result<(), Vec<AnfViolation>> {
    let mut violations = Vec::new();
    check(expr, &mut violations);
    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

fn require_atomic(expr: &CoreExpr, context: &str, violations: &mut Vec<AnfViolation>) {
    if !expr.is_atomic() {
        violations.push(AnfViolation {
            node: expr.id,
            context: context.to_string(),
        });
    }
    check(expr, violations);
}

fn check(expr: &CoreExpr, violations: &mut Vec<AnfViolation>) {
    match &expr.kind {
        CoreKind::Var(_) | CoreKind::Lit(_) | CoreKind::DictRef { .. } | CoreKind::Global(_) => {}
        CoreKind::Lambda { body, .. } => check(body, violations),
        CoreKind::Let { value, body, .. } => {
            check(value, violations);
            check(body, violations);
        }
        CoreKind::LetRec { bindings, body } => {
            for (_, value) in bindings {
                check(value, violations);
            }
            check(body, violations);
        }
        CoreKind::App { func, args } => {
            require_atomic(func, "function position", violations);
            for arg in args {
                require_atomic(arg, "argument", violations);
            }
        }
        CoreKind::If {
            cond,
            then_branch,
            else_branch,
        } => {
            require_atomic(cond, "if condition", violations);
            check(then_branch, violations);
            check(else_branch, violations);
        }
        CoreKind::Match { scrutinee, arms } => {
            require_atomic(scrutinee, "match scrutinee", violations);
            for arm in arms {
                if let Some(guard) = &arm.guard {
                    check(guard, violations);
                }
                check(&arm.body, violations);
            }
        }
        CoreKind::Intrinsic { args, .. } => {
            for arg in args {
                require_atomic(arg, "intrinsic operand", violations);
            }
        }
        CoreKind::Record(fields) => {
            for (_, value) in fields {
                require_atomic(value, "record field", violations);
            }
        }
        CoreKind::RecordAccess { expr: target, .. } => {
            require_atomic(target, "record access target", violations);
        }
        CoreKind::List(items) => {
            for item in items {
                require_atomic(item, "list element", violations);
            }
        }
        CoreKind::Tuple(items) => {
            for item in items {
                require_atomic(item, "tuple element", violations);
            }
        }
        CoreKind::DictAbs { body, .. } => check(body, violations),
        CoreKind::DictApp { dict, args, .. } => {
            require_atomic(dict, "dictionary position", violations);
            for arg in args {
                require_atomic(arg, "dictionary argument", violations);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Lit, NodeIdGen};
    use crate::span::Span;

    fn node(gen: &mut NodeIdGen, kind: CoreKind) -> CoreExpr {
        CoreExpr {
            id: gen.fresh(),
            span: Span::dummy(),
            kind,
        }
    }

    #[test]
    fn test_atomic_args_pass() {
        let mut gen = NodeIdGen::new();
        let func = node(&mut gen, CoreKind::Var("f".into()));
        let arg = node(&mut gen, CoreKind::Lit(Lit::Int(1)));
        let app = node(
            &mut gen,
            CoreKind::App {
                func: Box::new(func),
                args: vec![arg],
            },
        );
        assert!(verify_expr(&app).is_ok());
    }

    #[test]
    fn test_nested_app_in_argument_fails() {
        let mut gen = NodeIdGen::new();
        let inner_func = node(&mut gen, CoreKind::Var("g".into()));
        let inner = node(
            &mut gen,
            CoreKind::App {
                func: Box::new(inner_func),
                args: vec![],
            },
        );
        let bad_id = inner.id;
        let func = node(&mut gen, CoreKind::Var("f".into()));
        let app = node(
            &mut gen,
            CoreKind::App {
                func: Box::new(func),
                args: vec![inner],
            },
        );
        let violations = verify_expr(&app).unwrap_err();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].node, bad_id);
        assert_eq!(violations[0].context, "argument");
    }

    #[test]
    fn test_complex_if_condition_fails() {
        let mut gen = NodeIdGen::new();
        let func = node(&mut gen, CoreKind::Var("check".into()));
        let cond = node(
            &mut gen,
            CoreKind::App {
                func: Box::new(func),
                args: vec![],
            },
        );
        let t = node(&mut gen, CoreKind::Lit(Lit::Int(1)));
        let e = node(&mut gen, CoreKind::Lit(Lit::Int(2)));
        let if_expr = node(
            &mut gen,
            CoreKind::If {
                cond: Box::new(cond),
                then_branch: Box::new(t),
                else_branch: Box::new(e),
            },
        );
        assert!(verify_expr(&if_expr).is_err());
    }

    #[test]
    fn test_let_value_may_be_complex() {
        let mut gen = NodeIdGen::new();
        let func = node(&mut gen, CoreKind::Var("f".into()));
        let value = node(
            &mut gen,
            CoreKind::App {
                func: Box::new(func),
                args: vec![],
            },
        );
        let body = node(&mut gen, CoreKind::Var("x".into()));
        let let_expr = node(
            &mut gen,
            CoreKind::Let {
                name: "x".into(),
                value: Box::new(value),
                body: Box::new(body),
            },
        );
        assert!(verify_expr(&let_expr).is_ok());
    }
}
