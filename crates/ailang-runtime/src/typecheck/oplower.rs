//! OpLowering: rewrite `Intrinsic` nodes into dictionary applications
//! or direct builtin references
//!
//! Runs after constraint resolution and before evaluation. Every
//! `Intrinsic` carrying a class constraint must have a
//! `ResolvedConstraint` under its `NodeId`: a concrete resolution
//! becomes a direct `$builtin` call (`eq_Float`), a generalized one
//! becomes a `DictApp` through the runtime-dispatched dictionary.
//! Classless intrinsics (`++`, `!`) always lower to their monomorphic
//! builtins. The pass preserves ANF and is idempotent: a lowered tree
//! contains no `Intrinsic` nodes.

use super::{instances, ResolvedConstraint};
use crate::core::{
    BindingGroup, CoreArm, CoreExpr, CoreKind, CoreProgram, GlobalRef, IntrinsicOp, NodeId,
    NodeIdGen,
};
use crate::diagnostic::{Diagnostic, Phase};
use std::collections::HashMap;

/// Lower every intrinsic in a program
pub fn lower_program(
    program: CoreProgram,
    resolved: &HashMap<NodeId, ResolvedConstraint>,
) -> Result<CoreProgram, Vec<Diagnostic>> {
    // Fresh ids for synthesized nodes continue after the existing ones
    let mut max_id = 0u64;
    for binding in program.bindings() {
        walk_max(&binding.expr, &mut max_id);
    }
    let mut lowerer = Lowerer {
        resolved,
        ids: NodeIdGen::starting_at(max_id + 1),
        errors: Vec::new(),
    };

    let groups = program
        .groups
        .into_iter()
        .map(|group| match group {
            BindingGroup::Single(mut binding) => {
                binding.expr = lowerer.lower(binding.expr);
                BindingGroup::Single(binding)
            }
            BindingGroup::Rec(bindings) => BindingGroup::Rec(
                bindings
                    .into_iter()
                    .map(|mut binding| {
                        binding.expr = lowerer.lower(binding.expr);
                        binding
                    })
                    .collect(),
            ),
        })
        .collect();

    if lowerer.errors.is_empty() {
        Ok(CoreProgram {
            module: program.module,
            groups,
        })
    } else {
        Err(lowerer.errors)
    }
}

fn walk_max(expr: &CoreExpr, max: &mut u64) {
    *max = (*max).max(expr.id.0);
    match &expr.kind {
        CoreKind::Lambda { body, .. } | CoreKind::DictAbs { body, .. } => walk_max(body, max),
        CoreKind::Let { value, body, .. } => {
            walk_max(value, max);
            walk_max(body, max);
        }
        CoreKind::LetRec { bindings, body } => {
            for (_, value) in bindings {
                walk_max(value, max);
            }
            walk_max(body, max);
        }
        CoreKind::App { func, args } => {
            walk_max(func, max);
            for arg in args {
                walk_max(arg, max);
            }
        }
        CoreKind::If {
            cond,
            then_branch,
            else_branch,
        } => {
            walk_max(cond, max);
            walk_max(then_branch, max);
            walk_max(else_branch, max);
        }
        CoreKind::Match { scrutinee, arms } => {
            walk_max(scrutinee, max);
            for arm in arms {
                if let Some(guard) = &arm.guard {
                    walk_max(guard, max);
                }
                walk_max(&arm.body, max);
            }
        }
        CoreKind::Intrinsic { args, .. } => {
            for arg in args {
                walk_max(arg, max);
            }
        }
        CoreKind::Record(fields) => {
            for (_, value) in fields {
                walk_max(value, max);
            }
        }
        CoreKind::RecordAccess { expr: target, .. } => walk_max(target, max),
        CoreKind::List(items) | CoreKind::Tuple(items) => {
            for item in items {
                walk_max(item, max);
            }
        }
        CoreKind::DictApp { dict, args, .. } => {
            walk_max(dict, max);
            for arg in args {
                walk_max(arg, max);
            }
        }
        _ => {}
    }
}

struct Lowerer<'a> {
    resolved: &'a HashMap<NodeId, ResolvedConstraint>,
    ids: NodeIdGen,
    errors: Vec<Diagnostic>,
}

impl Lowerer<'_> {
    fn lower(&mut self, expr: CoreExpr) -> CoreExpr {
        let CoreExpr { id, span, kind } = expr;
        let kind = match kind {
            CoreKind::Intrinsic { op, args } => {
                let args: Vec<CoreExpr> = args.into_iter().map(|a| self.lower(a)).collect();
                return self.lower_intrinsic(op, args, id, span);
            }
            // An integer literal whose Num constraint resolved to float
            // denotes a float value
            CoreKind::Lit(crate::core::Lit::Int(n))
                if self
                    .resolved
                    .get(&id)
                    .is_some_and(|rc| rc.ty == "float") =>
            {
                CoreKind::Lit(crate::core::Lit::Float(n as f64))
            }
            CoreKind::Lambda { params, body } => CoreKind::Lambda {
                params,
                body: Box::new(self.lower(*body)),
            },
            CoreKind::Let { name, value, body } => CoreKind::Let {
                name,
                value: Box::new(self.lower(*value)),
                body: Box::new(self.lower(*body)),
            },
            CoreKind::LetRec { bindings, body } => CoreKind::LetRec {
                bindings: bindings
                    .into_iter()
                    .map(|(name, value)| (name, self.lower(value)))
                    .collect(),
                body: Box::new(self.lower(*body)),
            },
            CoreKind::App { func, args } => CoreKind::App {
                func: Box::new(self.lower(*func)),
                args: args.into_iter().map(|a| self.lower(a)).collect(),
            },
            CoreKind::If {
                cond,
                then_branch,
                else_branch,
            } => CoreKind::If {
                cond: Box::new(self.lower(*cond)),
                then_branch: Box::new(self.lower(*then_branch)),
                else_branch: Box::new(self.lower(*else_branch)),
            },
            CoreKind::Match { scrutinee, arms } => CoreKind::Match {
                scrutinee: Box::new(self.lower(*scrutinee)),
                arms: arms
                    .into_iter()
                    .map(|arm| CoreArm {
                        pattern: arm.pattern,
                        guard: arm.guard.map(|g| self.lower(g)),
                        body: self.lower(arm.body),
                    })
                    .collect(),
            },
            CoreKind::Record(fields) => CoreKind::Record(
                fields
                    .into_iter()
                    .map(|(name, value)| (name, self.lower(value)))
                    .collect(),
            ),
            CoreKind::RecordAccess { expr: target, field } => CoreKind::RecordAccess {
                expr: Box::new(self.lower(*target)),
                field,
            },
            CoreKind::List(items) => {
                CoreKind::List(items.into_iter().map(|i| self.lower(i)).collect())
            }
            CoreKind::Tuple(items) => {
                CoreKind::Tuple(items.into_iter().map(|i| self.lower(i)).collect())
            }
            CoreKind::DictAbs { params, body } => CoreKind::DictAbs {
                params,
                body: Box::new(self.lower(*body)),
            },
            CoreKind::DictApp { dict, method, args } => CoreKind::DictApp {
                dict: Box::new(self.lower(*dict)),
                method,
                args: args.into_iter().map(|a| self.lower(a)).collect(),
            },
            other => other,
        };
        CoreExpr { id, span, kind }
    }

    fn lower_intrinsic(
        &mut self,
        op: IntrinsicOp,
        args: Vec<CoreExpr>,
        id: NodeId,
        span: crate::span::Span,
    ) -> CoreExpr {
        // Classless operators have exactly one monomorphic implementation
        let direct = match op {
            IntrinsicOp::Concat => Some("concat_String"),
            IntrinsicOp::Not => Some("not_Bool"),
            _ => None,
        };
        if let Some(name) = direct {
            return self.builtin_app(name, args, id, span);
        }

        let class = op.class().expect("classful operator");
        let Some(rc) = self.resolved.get(&id) else {
            self.errors.push(
                Diagnostic::error(
                    "TC_OP_UNRESOLVED",
                    Phase::Typecheck,
                    format!(
                        "operator `{}` has no resolved `{}` dictionary",
                        op.symbol(),
                        class
                    ),
                )
                .with_span(span),
            );
            return CoreExpr {
                id,
                span,
                kind: CoreKind::Intrinsic { op, args },
            };
        };

        if rc.ty != instances::POLY {
            // Concrete instance: call the monomorphic builtin directly
            if let Some(name) = instances::method_builtin(&rc.ty, op.method()) {
                return self.builtin_app(&name, args, id, span);
            }
        }

        // Generalized constraint: dispatch through the dictionary
        let dict = CoreExpr {
            id: self.ids.fresh(),
            span,
            kind: CoreKind::DictRef {
                class: rc.class.clone(),
                ty: rc.ty.clone(),
            },
        };
        CoreExpr {
            id,
            span,
            kind: CoreKind::DictApp {
                dict: Box::new(dict),
                method: op.method().to_string(),
                args,
            },
        }
    }

    fn builtin_app(
        &mut self,
        name: &str,
        args: Vec<CoreExpr>,
        id: NodeId,
        span: crate::span::Span,
    ) -> CoreExpr {
        let func = CoreExpr {
            id: self.ids.fresh(),
            span,
            kind: CoreKind::Global(GlobalRef {
                module: "$builtin".to_string(),
                name: name.to_string(),
            }),
        };
        CoreExpr {
            id,
            span,
            kind: CoreKind::App {
                func: Box::new(func),
                args,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CoreBinding, Lit};
    use crate::core::verify::verify_program;
    use crate::span::Span;

    fn node(gen: &mut NodeIdGen, kind: CoreKind) -> CoreExpr {
        CoreExpr {
            id: gen.fresh(),
            span: Span::dummy(),
            kind,
        }
    }

    fn program_with(expr: CoreExpr) -> CoreProgram {
        CoreProgram {
            module: "m".to_string(),
            groups: vec![BindingGroup::Single(CoreBinding {
                name: "f".to_string(),
                expr,
                exported: false,
                span: Span::dummy(),
            })],
        }
    }

    #[test]
    fn test_concrete_resolution_becomes_builtin_call() {
        let mut gen = NodeIdGen::new();
        let a = node(&mut gen, CoreKind::Lit(Lit::Float(0.0)));
        let b = node(&mut gen, CoreKind::Lit(Lit::Float(0.0)));
        let eq = node(
            &mut gen,
            CoreKind::Intrinsic {
                op: IntrinsicOp::Eq,
                args: vec![a, b],
            },
        );
        let eq_id = eq.id;
        let resolved = HashMap::from([(
            eq_id,
            ResolvedConstraint {
                class: "Eq".to_string(),
                ty: "float".to_string(),
                node: eq_id,
            },
        )]);
        let lowered = lower_program(program_with(eq), &resolved).unwrap();
        let binding = lowered.binding("f").unwrap();
        let CoreKind::App { func, .. } = &binding.expr.kind else {
            panic!("expected app, got {:?}", binding.expr.kind);
        };
        let CoreKind::Global(global) = &func.kind else {
            panic!("expected global");
        };
        assert_eq!(global.name, "eq_Float");
        assert!(verify_program(&lowered).is_ok());
    }

    #[test]
    fn test_poly_resolution_becomes_dict_app() {
        let mut gen = NodeIdGen::new();
        let a = node(&mut gen, CoreKind::Var("x".into()));
        let b = node(&mut gen, CoreKind::Var("y".into()));
        let add = node(
            &mut gen,
            CoreKind::Intrinsic {
                op: IntrinsicOp::Add,
                args: vec![a, b],
            },
        );
        let add_id = add.id;
        let resolved = HashMap::from([(
            add_id,
            ResolvedConstraint {
                class: "Num".to_string(),
                ty: instances::POLY.to_string(),
                node: add_id,
            },
        )]);
        let lowered = lower_program(program_with(add), &resolved).unwrap();
        let binding = lowered.binding("f").unwrap();
        let CoreKind::DictApp { dict, method, .. } = &binding.expr.kind else {
            panic!("expected dict app, got {:?}", binding.expr.kind);
        };
        assert_eq!(method, "add");
        let CoreKind::DictRef { class, ty } = &dict.kind else {
            panic!("expected dict ref");
        };
        assert_eq!(class, "Num");
        assert_eq!(ty, instances::POLY);
    }

    #[test]
    fn test_unresolved_intrinsic_is_error() {
        let mut gen = NodeIdGen::new();
        let a = node(&mut gen, CoreKind::Lit(Lit::Int(1)));
        let b = node(&mut gen, CoreKind::Lit(Lit::Int(2)));
        let add = node(
            &mut gen,
            CoreKind::Intrinsic {
                op: IntrinsicOp::Add,
                args: vec![a, b],
            },
        );
        let errs = lower_program(program_with(add), &HashMap::new()).unwrap_err();
        assert_eq!(errs[0].code, "TC_OP_UNRESOLVED");
    }

    #[test]
    fn test_lowering_is_idempotent() {
        let mut gen = NodeIdGen::new();
        let a = node(&mut gen, CoreKind::Lit(Lit::Int(1)));
        let b = node(&mut gen, CoreKind::Lit(Lit::Int(2)));
        let add = node(
            &mut gen,
            CoreKind::Intrinsic {
                op: IntrinsicOp::Add,
                args: vec![a, b],
            },
        );
        let add_id = add.id;
        let resolved = HashMap::from([(
            add_id,
            ResolvedConstraint {
                class: "Num".to_string(),
                ty: "int".to_string(),
                node: add_id,
            },
        )]);
        let once = lower_program(program_with(add), &resolved).unwrap();
        let twice = lower_program(once.clone(), &resolved).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_concat_lowers_without_constraint() {
        let mut gen = NodeIdGen::new();
        let a = node(&mut gen, CoreKind::Lit(Lit::Str("a".into())));
        let b = node(&mut gen, CoreKind::Lit(Lit::Str("b".into())));
        let concat = node(
            &mut gen,
            CoreKind::Intrinsic {
                op: IntrinsicOp::Concat,
                args: vec![a, b],
            },
        );
        let lowered = lower_program(program_with(concat), &HashMap::new()).unwrap();
        let binding = lowered.binding("f").unwrap();
        let CoreKind::App { func, .. } = &binding.expr.kind else {
            panic!("expected app");
        };
        let CoreKind::Global(global) = &func.kind else {
            panic!("expected global");
        };
        assert_eq!(global.name, "concat_String");
    }
}
