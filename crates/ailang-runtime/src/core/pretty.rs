//! Core pretty-printer
//!
//! Renders Core ANF in a stable textual form used by `--trace` output and
//! golden tests. Output is deterministic: record fields print in source
//! order, everything else follows the tree.

use super::{BindingGroup, CoreArm, CoreExpr, CoreKind, CorePattern, CoreProgram};
use std::fmt::Write;

/// Render a whole program
pub fn program(program: &CoreProgram) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "module {}", program.module);
    for group in &program.groups {
        match group {
            BindingGroup::Single(b) => {
                let _ = writeln!(out, "let {} =", b.name);
                let _ = writeln!(out, "{}", indent(&expr(&b.expr), 2));
            }
            BindingGroup::Rec(bs) => {
                let _ = writeln!(out, "letrec");
                for b in bs {
                    let _ = writeln!(out, "  {} =", b.name);
                    let _ = writeln!(out, "{}", indent(&expr(&b.expr), 4));
                }
            }
        }
    }
    out
}

/// Render a single expression
pub fn expr(e: &CoreExpr) -> String {
    match &e.kind {
        CoreKind::Var(name) => name.clone(),
        CoreKind::Lit(lit) => lit.to_string(),
        CoreKind::Lambda { params, body } => {
            format!("\\({}). {}", params.join(", "), expr(body))
        }
        CoreKind::Let { name, value, body } => {
            format!("let {} = {} in\n{}", name, expr(value), expr(body))
        }
        CoreKind::LetRec { bindings, body } => {
            let mut out = String::from("letrec ");
            for (i, (name, value)) in bindings.iter().enumerate() {
                if i > 0 {
                    out.push_str("; ");
                }
                let _ = write!(out, "{} = {}", name, expr(value));
            }
            let _ = write!(out, " in\n{}", expr(body));
            out
        }
        CoreKind::App { func, args } => {
            format!("{}({})", expr(func), comma(args))
        }
        CoreKind::If {
            cond,
            then_branch,
            else_branch,
        } => format!(
            "if {} then {} else {}",
            expr(cond),
            expr(then_branch),
            expr(else_branch)
        ),
        CoreKind::Match { scrutinee, arms } => {
            let mut out = format!("match {} {{\n", expr(scrutinee));
            for arm in arms {
                out.push_str(&indent(&arm_str(arm), 2));
                out.push('\n');
            }
            out.push('}');
            out
        }
        CoreKind::Intrinsic { op, args } => {
            format!("%{}({})", op.method(), comma(args))
        }
        CoreKind::Record(fields) => {
            let inner: Vec<String> = fields
                .iter()
                .map(|(name, value)| format!("{}: {}", name, expr(value)))
                .collect();
            format!("{{{}}}", inner.join(", "))
        }
        CoreKind::RecordAccess { expr: target, field } => {
            format!("{}.{}", expr(target), field)
        }
        CoreKind::List(items) => format!("[{}]", comma(items)),
        CoreKind::Tuple(items) => format!("({})", comma(items)),
        CoreKind::DictAbs { params, body } => {
            format!("/\\({}). {}", params.join(", "), expr(body))
        }
        CoreKind::DictApp { dict, method, args } => {
            format!("{}.{}({})", expr(dict), method, comma(args))
        }
        CoreKind::DictRef { class, ty } => format!("dict[{} {}]", class, ty),
        CoreKind::Global(global) => format!("@{}", global),
    }
}

fn arm_str(arm: &CoreArm) -> String {
    let mut out = pattern(&arm.pattern);
    if let Some(guard) = &arm.guard {
        let _ = write!(out, " if {}", expr(guard));
    }
    let _ = write!(out, " => {}", expr(&arm.body));
    out
}

/// Render a pattern
pub fn pattern(p: &CorePattern) -> String {
    match p {
        CorePattern::Wildcard => "_".to_string(),
        CorePattern::Var(name) => name.clone(),
        CorePattern::Lit(lit) => lit.to_string(),
        CorePattern::Tuple(items) => {
            let inner: Vec<String> = items.iter().map(pattern).collect();
            format!("({})", inner.join(", "))
        }
        CorePattern::List { items, rest } => {
            let mut inner: Vec<String> = items.iter().map(pattern).collect();
            if let Some(rest) = rest {
                inner.push(format!("...{}", pattern(rest)));
            }
            format!("[{}]", inner.join(", "))
        }
        CorePattern::Record { fields, rest } => {
            let mut inner: Vec<String> = fields
                .iter()
                .map(|(name, pat)| format!("{}: {}", name, pattern(pat)))
                .collect();
            if *rest {
                inner.push("...".to_string());
            }
            format!("{{{}}}", inner.join(", "))
        }
        CorePattern::Ctor {
            module, ctor, args, ..
        } => {
            if args.is_empty() {
                format!("{}.{}", module, ctor)
            } else {
                let inner: Vec<String> = args.iter().map(pattern).collect();
                format!("{}.{}({})", module, ctor, inner.join(", "))
            }
        }
    }
}

fn comma(items: &[CoreExpr]) -> String {
    items.iter().map(expr).collect::<Vec<_>>().join(", ")
}

fn indent(text: &str, by: usize) -> String {
    let pad = " ".repeat(by);
    text.lines()
        .map(|line| format!("{}{}", pad, line))
        .collect::<Vec<_>>()
        .join("\n")
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
    fn test_pretty_app() {
        let mut gen = NodeIdGen::new();
        let f = node(&mut gen, CoreKind::Var("f".into()));
        let a = node(&mut gen, CoreKind::Lit(Lit::Int(1)));
        let app = node(
            &mut gen,
            CoreKind::App {
                func: Box::new(f),
                args: vec![a],
            },
        );
        assert_eq!(expr(&app), "f(1)");
    }

    #[test]
    fn test_pretty_dict_ref() {
        let mut gen = NodeIdGen::new();
        let d = node(
            &mut gen,
            CoreKind::DictRef {
                class: "Eq".into(),
                ty: "float".into(),
            },
        );
        assert_eq!(expr(&d), "dict[Eq float]");
    }

    #[test]
    fn test_pretty_ctor_pattern() {
        let p = CorePattern::Ctor {
            module: "data/maybe".into(),
            type_name: "Option".into(),
            ctor: "Some".into(),
            args: vec![CorePattern::Var("x".into())],
        };
        assert_eq!(pattern(&p), "data/maybe.Some(x)");
    }
}
