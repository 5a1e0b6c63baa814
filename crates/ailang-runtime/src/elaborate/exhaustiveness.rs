//! Match exhaustiveness and reachability checking
//!
//! First-level coverage analysis over resolved Core patterns. Guarded
//! arms never count toward coverage. For finite-inhabited scrutinees
//! (bool, ADTs) every constructor must be covered; infinite types (int,
//! float, string) require a catch-all. Non-exhaustiveness is a warning,
//! not an error; evaluation proceeds and an unmatched value raises
//! `RUN_MATCH_EXHAUST`.

use crate::core::{CoreArm, CorePattern, Lit};
use crate::diagnostic::{Diagnostic, Phase};
use crate::span::Span;
use std::collections::{BTreeSet, HashMap};

/// All constructors of each known type: `type name -> [(ctor, arity)]`
pub type TypeUniverse = HashMap<String, Vec<(String, usize)>>;

/// Check one match expression, returning warnings
pub fn check_match(arms: &[CoreArm], universe: &TypeUniverse, span: Span) -> Vec<Diagnostic> {
    let mut warnings = Vec::new();

    // Reachability: everything after an unguarded catch-all is dead
    let catch_all = arms
        .iter()
        .position(|arm| arm.guard.is_none() && is_irrefutable(&arm.pattern));
    if let Some(pos) = catch_all {
        if pos + 1 < arms.len() {
            warnings.push(
                Diagnostic::warning(
                    "ELA_W02",
                    Phase::Elaborate,
                    format!(
                        "{} unreachable match arm(s) after a catch-all pattern",
                        arms.len() - pos - 1
                    ),
                )
                .with_span(span),
            );
        }
        return warnings;
    }

    // No catch-all: coverage depends on the shape of the scrutinee as
    // witnessed by the unguarded patterns
    let covered: Vec<&CorePattern> = arms
        .iter()
        .filter(|arm| arm.guard.is_none())
        .map(|arm| &arm.pattern)
        .collect();

    if let Some(missing) = missing_cases(&covered, universe) {
        warnings.push(
            Diagnostic::warning(
                "ELA_W01",
                Phase::Elaborate,
                format!("non-exhaustive match: missing {}", missing),
            )
            .with_span(span)
            .with_fix("add the missing arms or a catch-all `_` arm", 0.8),
        );
    }

    warnings
}

/// A description of what is uncovered, or `None` when exhaustive
fn missing_cases(covered: &[&CorePattern], universe: &TypeUniverse) -> Option<String> {
    // Booleans
    let bools: BTreeSet<bool> = covered
        .iter()
        .filter_map(|p| match p {
            CorePattern::Lit(Lit::Bool(b)) => Some(*b),
            _ => None,
        })
        .collect();
    if !bools.is_empty() {
        let missing: Vec<&str> = [true, false]
            .iter()
            .filter(|b| !bools.contains(b))
            .map(|b| if *b { "`true`" } else { "`false`" })
            .collect();
        return if missing.is_empty() {
            None
        } else {
            Some(missing.join(", "))
        };
    }

    // Constructors: take the type of the first ctor pattern seen
    let first_ctor = covered.iter().find_map(|p| match p {
        CorePattern::Ctor { type_name, .. } => Some(type_name.clone()),
        _ => None,
    });
    if let Some(type_name) = first_ctor {
        let covered_ctors: BTreeSet<String> = covered
            .iter()
            .filter_map(|p| match p {
                CorePattern::Ctor { ctor, .. } => Some(ctor.clone()),
                _ => None,
            })
            .collect();
        let all = universe.get(&type_name)?;
        let missing: Vec<String> = all
            .iter()
            .filter(|(ctor, _)| !covered_ctors.contains(ctor))
            .map(|(ctor, _)| format!("`{}`", ctor))
            .collect();
        return if missing.is_empty() {
            None
        } else {
            Some(missing.join(", "))
        };
    }

    // Lists: need both nil and cons
    let has_list = covered
        .iter()
        .any(|p| matches!(p, CorePattern::List { .. }));
    if has_list {
        let has_nil = covered.iter().any(|p| {
            matches!(p, CorePattern::List { items, rest } if items.is_empty() && rest.is_none())
        });
        let has_cons = covered.iter().any(|p| {
            matches!(p, CorePattern::List { items, rest } if !items.is_empty() || rest.is_some())
        });
        // A `[...rest]` pattern with no fixed prefix covers everything
        let has_universal_rest = covered.iter().any(|p| {
            matches!(p, CorePattern::List { items, rest: Some(rest) }
                if items.is_empty() && is_irrefutable(rest))
        });
        if has_universal_rest {
            return None;
        }
        let mut missing = Vec::new();
        if !has_nil {
            missing.push("`[]`".to_string());
        }
        if !has_cons {
            missing.push("`[_, ..._]`".to_string());
        }
        // Fixed-length patterns alone never cover arbitrary longer lists
        if missing.is_empty()
            && !covered.iter().any(|p| {
                matches!(p, CorePattern::List { rest: Some(rest), items }
                    if items.iter().all(is_irrefutable_ref) && is_irrefutable(rest))
            })
        {
            missing.push("lists longer than the matched prefixes".to_string());
        }
        return if missing.is_empty() {
            None
        } else {
            Some(missing.join(", "))
        };
    }

    // Unit is fully covered by a `()` literal
    if covered
        .iter()
        .any(|p| matches!(p, CorePattern::Lit(Lit::Unit)))
    {
        return None;
    }

    // Tuples/records without irrefutable coverage: the catch-all check
    // already failed, so some component is refutable
    let has_compound = covered
        .iter()
        .any(|p| matches!(p, CorePattern::Tuple(_) | CorePattern::Record { .. }));
    if has_compound {
        return Some("values not covered by the refutable component patterns".to_string());
    }

    // Infinite scrutinee types (int, float, string) need a catch-all
    Some("a catch-all `_` arm (scrutinee type has infinitely many values)".to_string())
}

/// Whether a pattern matches every value of its type
pub fn is_irrefutable(pattern: &CorePattern) -> bool {
    match pattern {
        CorePattern::Wildcard | CorePattern::Var(_) => true,
        CorePattern::Lit(Lit::Unit) => true,
        CorePattern::Tuple(items) => items.iter().all(is_irrefutable),
        CorePattern::Record { fields, .. } => fields.iter().all(|(_, p)| is_irrefutable(p)),
        _ => false,
    }
}

fn is_irrefutable_ref(pattern: &CorePattern) -> bool {
    is_irrefutable(pattern)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CoreExpr, CoreKind, NodeIdGen};

    fn body() -> CoreExpr {
        CoreExpr {
            id: NodeIdGen::new().fresh(),
            span: Span::dummy(),
            kind: CoreKind::Lit(Lit::Int(0)),
        }
    }

    fn arm(pattern: CorePattern) -> CoreArm {
        CoreArm {
            pattern,
            guard: None,
            body: body(),
        }
    }

    fn guarded(pattern: CorePattern) -> CoreArm {
        CoreArm {
            pattern,
            guard: Some(body()),
            body: body(),
        }
    }

    fn option_universe() -> TypeUniverse {
        let mut u = TypeUniverse::new();
        u.insert(
            "Option".to_string(),
            vec![("None".to_string(), 0), ("Some".to_string(), 1)],
        );
        u
    }

    fn some_pat() -> CorePattern {
        CorePattern::Ctor {
            module: "std/option".into(),
            type_name: "Option".into(),
            ctor: "Some".into(),
            args: vec![CorePattern::Wildcard],
        }
    }

    fn none_pat() -> CorePattern {
        CorePattern::Ctor {
            module: "std/option".into(),
            type_name: "Option".into(),
            ctor: "None".into(),
            args: vec![],
        }
    }

    #[test]
    fn test_missing_bool_arm_warns() {
        let warnings = check_match(
            &[arm(CorePattern::Lit(Lit::Bool(true)))],
            &TypeUniverse::new(),
            Span::dummy(),
        );
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].code, "ELA_W01");
        assert!(warnings[0].message.contains("`false`"));
    }

    #[test]
    fn test_full_bool_coverage_is_clean() {
        let warnings = check_match(
            &[
                arm(CorePattern::Lit(Lit::Bool(true))),
                arm(CorePattern::Lit(Lit::Bool(false))),
            ],
            &TypeUniverse::new(),
            Span::dummy(),
        );
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_guarded_arm_does_not_count() {
        let warnings = check_match(
            &[
                arm(CorePattern::Lit(Lit::Bool(true))),
                guarded(CorePattern::Lit(Lit::Bool(false))),
            ],
            &TypeUniverse::new(),
            Span::dummy(),
        );
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("`false`"));
    }

    #[test]
    fn test_guarded_wildcard_does_not_close_match() {
        let warnings = check_match(
            &[
                arm(CorePattern::Lit(Lit::Bool(true))),
                guarded(CorePattern::Wildcard),
            ],
            &TypeUniverse::new(),
            Span::dummy(),
        );
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_missing_ctor_listed() {
        let warnings = check_match(&[arm(some_pat())], &option_universe(), Span::dummy());
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("`None`"));
    }

    #[test]
    fn test_all_ctors_covered_is_clean() {
        let warnings = check_match(
            &[arm(some_pat()), arm(none_pat())],
            &option_universe(),
            Span::dummy(),
        );
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_int_scrutinee_needs_catch_all() {
        let warnings = check_match(
            &[arm(CorePattern::Lit(Lit::Int(0)))],
            &TypeUniverse::new(),
            Span::dummy(),
        );
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("catch-all"));
    }

    #[test]
    fn test_wildcard_closes_int_match() {
        let warnings = check_match(
            &[arm(CorePattern::Lit(Lit::Int(0))), arm(CorePattern::Wildcard)],
            &TypeUniverse::new(),
            Span::dummy(),
        );
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_unreachable_after_catch_all() {
        let warnings = check_match(
            &[arm(CorePattern::Var("x".into())), arm(CorePattern::Lit(Lit::Int(0)))],
            &TypeUniverse::new(),
            Span::dummy(),
        );
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].code, "ELA_W02");
    }

    #[test]
    fn test_nil_and_cons_cover_lists() {
        let warnings = check_match(
            &[
                arm(CorePattern::List {
                    items: vec![],
                    rest: None,
                }),
                arm(CorePattern::List {
                    items: vec![CorePattern::Var("x".into())],
                    rest: Some(Box::new(CorePattern::Var("rest".into()))),
                }),
            ],
            &TypeUniverse::new(),
            Span::dummy(),
        );
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_missing_nil_listed() {
        let warnings = check_match(
            &[arm(CorePattern::List {
                items: vec![CorePattern::Var("x".into())],
                rest: Some(Box::new(CorePattern::Wildcard)),
            })],
            &TypeUniverse::new(),
            Span::dummy(),
        );
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("`[]`"));
    }
}
