//! Unification for types, effect rows, and record rows
//!
//! Effect rows and record rows unify with the same kernel: closed rows
//! demand identical label sets; open rows split into the common labels
//! plus a fresh residual tail bound through the substitution.

use crate::types::{EffectRow, RecordRow, Subst, Type};
use std::collections::BTreeSet;

/// Error produced during unification
#[derive(Debug, Clone, PartialEq)]
pub enum UnifyError {
    /// Types cannot be unified
    Mismatch {
        expected: Type,
        found: Type,
    },
    /// Occurs check failed: a variable would contain itself
    InfiniteType {
        var: String,
        ty: Type,
    },
    /// Effect rows disagree
    RowMismatch {
        missing: Vec<String>,
        extra: Vec<String>,
        left_closed: bool,
        right_closed: bool,
    },
    /// A record lacks a required field
    MissingField {
        field: String,
        record: Type,
    },
}

impl UnifyError {
    /// Stable diagnostic code for this error
    pub fn code(&self) -> &'static str {
        match self {
            UnifyError::Mismatch { .. } => "TC_TYP_001",
            UnifyError::InfiniteType { .. } => "TC_TYP_002",
            UnifyError::RowMismatch { .. } => "TC_ROW_001",
            UnifyError::MissingField { .. } => "TC_REC_001",
        }
    }

    /// Human-readable message
    pub fn message(&self) -> String {
        match self {
            UnifyError::Mismatch { expected, found } => {
                format!("type mismatch: expected `{}`, found `{}`", expected, found)
            }
            UnifyError::InfiniteType { var, ty } => {
                format!("infinite type: `{}` cannot equal `{}`", var, ty)
            }
            UnifyError::RowMismatch {
                missing,
                extra,
                left_closed,
                right_closed,
            } => {
                let state = |closed: &bool| if *closed { "closed" } else { "open" };
                format!(
                    "effect row mismatch ({} vs {}): missing {{{}}}, extra {{{}}}",
                    state(left_closed),
                    state(right_closed),
                    missing.join(", "),
                    extra.join(", ")
                )
            }
            UnifyError::MissingField { field, record } => {
                format!("record `{}` has no field `{}`", record, field)
            }
        }
    }
}

/// Fresh-variable supply shared by the inference engine
#[derive(Debug, Default)]
pub struct VarSupply {
    next: u64,
}

impl VarSupply {
    /// Create a supply
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh type variable name
    pub fn fresh_ty(&mut self) -> String {
        let name = format!("t{}", self.next);
        self.next += 1;
        name
    }

    /// Fresh row variable name
    pub fn fresh_row(&mut self) -> String {
        let name = format!("r{}", self.next);
        self.next += 1;
        name
    }
}

/// Unify two types under the substitution
pub fn unify(subst: &mut Subst, supply: &mut VarSupply, a: &Type, b: &Type) -> Result<(), UnifyError> {
    let a = subst.apply(a);
    let b = subst.apply(b);
    match (&a, &b) {
        (Type::Var(va), Type::Var(vb)) if va == vb => Ok(()),
        (Type::Var(var), other) => bind(subst, var, other),
        (other, Type::Var(var)) => bind(subst, var, other),
        (Type::Con(ca), Type::Con(cb)) if ca == cb => Ok(()),
        (
            Type::Func {
                params: pa,
                ret: ra,
                effects: ea,
            },
            Type::Func {
                params: pb,
                ret: rb,
                effects: eb,
            },
        ) => {
            if pa.len() != pb.len() {
                return Err(UnifyError::Mismatch {
                    expected: a.clone(),
                    found: b.clone(),
                });
            }
            for (x, y) in pa.iter().zip(pb.iter()) {
                unify(subst, supply, x, y)?;
            }
            unify(subst, supply, ra, rb)?;
            unify_rows(subst, supply, ea, eb)
        }
        (Type::List(ea), Type::List(eb)) => unify(subst, supply, ea, eb),
        (Type::Tuple(ia), Type::Tuple(ib)) if ia.len() == ib.len() => {
            for (x, y) in ia.iter().zip(ib.iter()) {
                unify(subst, supply, x, y)?;
            }
            Ok(())
        }
        (Type::Record(ra), Type::Record(rb)) => unify_records(subst, supply, ra, rb, &a, &b),
        (Type::App(ha, aa), Type::App(hb, ab)) if aa.len() == ab.len() => {
            unify(subst, supply, ha, hb)?;
            for (x, y) in aa.iter().zip(ab.iter()) {
                unify(subst, supply, x, y)?;
            }
            Ok(())
        }
        _ => Err(UnifyError::Mismatch {
            expected: a.clone(),
            found: b.clone(),
        }),
    }
}

fn bind(subst: &mut Subst, var: &str, ty: &Type) -> Result<(), UnifyError> {
    if let Type::Var(name) = ty {
        if name == var {
            return Ok(());
        }
    }
    if ty.free_vars().iter().any(|v| v == var) {
        return Err(UnifyError::InfiniteType {
            var: var.to_string(),
            ty: ty.clone(),
        });
    }
    subst.insert_type(var, ty.clone());
    Ok(())
}

/// Unify two effect rows. Closed rows unify only with identical label
/// sets; open rows split into common labels plus a fresh residual.
pub fn unify_rows(
    subst: &mut Subst,
    supply: &mut VarSupply,
    a: &EffectRow,
    b: &EffectRow,
) -> Result<(), UnifyError> {
    let a = subst.apply_row(a);
    let b = subst.apply_row(b);

    let a_only: BTreeSet<String> = a.labels.difference(&b.labels).cloned().collect();
    let b_only: BTreeSet<String> = b.labels.difference(&a.labels).cloned().collect();

    match (&a.tail, &b.tail) {
        (None, None) => {
            if a_only.is_empty() && b_only.is_empty() {
                Ok(())
            } else {
                Err(row_mismatch(&a_only, &b_only, true, true))
            }
        }
        (Some(ta), None) => {
            if !a_only.is_empty() {
                return Err(row_mismatch(&a_only, &b_only, false, true));
            }
            subst.insert_row(
                ta.clone(),
                EffectRow {
                    labels: b_only,
                    tail: None,
                },
            );
            Ok(())
        }
        (None, Some(tb)) => {
            if !b_only.is_empty() {
                return Err(row_mismatch(&a_only, &b_only, true, false));
            }
            subst.insert_row(
                tb.clone(),
                EffectRow {
                    labels: a_only,
                    tail: None,
                },
            );
            Ok(())
        }
        (Some(ta), Some(tb)) => {
            if ta == tb {
                return if a_only.is_empty() && b_only.is_empty() {
                    Ok(())
                } else {
                    Err(row_mismatch(&a_only, &b_only, false, false))
                };
            }
            let residual = supply.fresh_row();
            subst.insert_row(
                ta.clone(),
                EffectRow {
                    labels: b_only,
                    tail: Some(residual.clone()),
                },
            );
            subst.insert_row(
                tb.clone(),
                EffectRow {
                    labels: a_only,
                    tail: Some(residual),
                },
            );
            Ok(())
        }
    }
}

fn row_mismatch(
    a_only: &BTreeSet<String>,
    b_only: &BTreeSet<String>,
    left_closed: bool,
    right_closed: bool,
) -> UnifyError {
    UnifyError::RowMismatch {
        missing: a_only.iter().cloned().collect(),
        extra: b_only.iter().cloned().collect(),
        left_closed,
        right_closed,
    }
}

fn unify_records(
    subst: &mut Subst,
    supply: &mut VarSupply,
    a: &RecordRow,
    b: &RecordRow,
    a_ty: &Type,
    b_ty: &Type,
) -> Result<(), UnifyError> {
    let a = subst.apply_record_row(a);
    let b = subst.apply_record_row(b);

    for (name, ta) in &a.fields {
        if let Some(tb) = b.fields.get(name) {
            unify(subst, supply, ta, tb)?;
        }
    }

    let a_only: Vec<(String, Type)> = a
        .fields
        .iter()
        .filter(|(name, _)| !b.fields.contains_key(*name))
        .map(|(name, ty)| (name.clone(), ty.clone()))
        .collect();
    let b_only: Vec<(String, Type)> = b
        .fields
        .iter()
        .filter(|(name, _)| !a.fields.contains_key(*name))
        .map(|(name, ty)| (name.clone(), ty.clone()))
        .collect();

    match (&a.tail, &b.tail) {
        (None, None) => {
            if let Some((field, _)) = a_only.first() {
                return Err(UnifyError::MissingField {
                    field: field.clone(),
                    record: b_ty.clone(),
                });
            }
            if let Some((field, _)) = b_only.first() {
                return Err(UnifyError::MissingField {
                    field: field.clone(),
                    record: a_ty.clone(),
                });
            }
            Ok(())
        }
        (Some(ta), None) => {
            if let Some((field, _)) = a_only.first() {
                return Err(UnifyError::MissingField {
                    field: field.clone(),
                    record: b_ty.clone(),
                });
            }
            subst.insert_record_row(
                ta.clone(),
                RecordRow {
                    fields: b_only.into_iter().collect(),
                    tail: None,
                },
            );
            Ok(())
        }
        (None, Some(tb)) => {
            if let Some((field, _)) = b_only.first() {
                return Err(UnifyError::MissingField {
                    field: field.clone(),
                    record: a_ty.clone(),
                });
            }
            subst.insert_record_row(
                tb.clone(),
                RecordRow {
                    fields: a_only.into_iter().collect(),
                    tail: None,
                },
            );
            Ok(())
        }
        (Some(ta), Some(tb)) => {
            if ta == tb {
                return Ok(());
            }
            let residual = supply.fresh_row();
            subst.insert_record_row(
                ta.clone(),
                RecordRow {
                    fields: b_only.into_iter().collect(),
                    tail: Some(residual.clone()),
                },
            );
            subst.insert_record_row(
                tb.clone(),
                RecordRow {
                    fields: a_only.into_iter().collect(),
                    tail: Some(residual),
                },
            );
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn setup() -> (Subst, VarSupply) {
        (Subst::new(), VarSupply::new())
    }

    #[test]
    fn test_unify_binds_vars() {
        let (mut subst, mut supply) = setup();
        unify(&mut subst, &mut supply, &Type::Var("a".into()), &Type::int()).unwrap();
        assert_eq!(subst.apply(&Type::Var("a".into())), Type::int());
    }

    #[test]
    fn test_occurs_check() {
        let (mut subst, mut supply) = setup();
        let err = unify(
            &mut subst,
            &mut supply,
            &Type::Var("a".into()),
            &Type::List(Box::new(Type::Var("a".into()))),
        )
        .unwrap_err();
        assert_eq!(err.code(), "TC_TYP_002");
    }

    #[test]
    fn test_con_mismatch() {
        let (mut subst, mut supply) = setup();
        let err = unify(&mut subst, &mut supply, &Type::int(), &Type::string()).unwrap_err();
        assert_eq!(err.code(), "TC_TYP_001");
    }

    #[test]
    fn test_closed_rows_require_equal_labels() {
        let (mut subst, mut supply) = setup();
        assert!(unify_rows(
            &mut subst,
            &mut supply,
            &EffectRow::closed(["IO"]),
            &EffectRow::closed(["IO"])
        )
        .is_ok());
        let err = unify_rows(
            &mut subst,
            &mut supply,
            &EffectRow::closed(["IO", "FS"]),
            &EffectRow::closed(["IO"]),
        )
        .unwrap_err();
        let UnifyError::RowMismatch { missing, extra, .. } = &err else {
            panic!("expected row mismatch");
        };
        assert_eq!(missing, &vec!["FS".to_string()]);
        assert!(extra.is_empty());
    }

    #[test]
    fn test_open_row_absorbs_residual() {
        let (mut subst, mut supply) = setup();
        let open = EffectRow::open(["IO"], "r0");
        let closed = EffectRow::closed(["FS", "IO"]);
        unify_rows(&mut subst, &mut supply, &open, &closed).unwrap();
        assert_eq!(subst.apply_row(&open), closed);
    }

    #[test]
    fn test_two_open_rows_share_residual() {
        let (mut subst, mut supply) = setup();
        let a = EffectRow::open(["IO"], "ra");
        let b = EffectRow::open(["FS"], "rb");
        unify_rows(&mut subst, &mut supply, &a, &b).unwrap();
        let a_after = subst.apply_row(&a);
        let b_after = subst.apply_row(&b);
        assert_eq!(a_after.labels, b_after.labels);
        assert_eq!(a_after.tail, b_after.tail);
    }

    #[test]
    fn test_record_field_unifies() {
        let (mut subst, mut supply) = setup();
        let mut fields_a = BTreeMap::new();
        fields_a.insert("x".to_string(), Type::Var("a".into()));
        let mut fields_b = BTreeMap::new();
        fields_b.insert("x".to_string(), Type::int());
        unify(
            &mut subst,
            &mut supply,
            &Type::Record(RecordRow {
                fields: fields_a,
                tail: None,
            }),
            &Type::Record(RecordRow {
                fields: fields_b,
                tail: None,
            }),
        )
        .unwrap();
        assert_eq!(subst.apply(&Type::Var("a".into())), Type::int());
    }

    #[test]
    fn test_closed_record_missing_field() {
        let (mut subst, mut supply) = setup();
        let mut fields_a = BTreeMap::new();
        fields_a.insert("x".to_string(), Type::int());
        fields_a.insert("y".to_string(), Type::int());
        let mut fields_b = BTreeMap::new();
        fields_b.insert("x".to_string(), Type::int());
        let err = unify(
            &mut subst,
            &mut supply,
            &Type::Record(RecordRow {
                fields: fields_a,
                tail: None,
            }),
            &Type::Record(RecordRow {
                fields: fields_b,
                tail: None,
            }),
        )
        .unwrap_err();
        assert_eq!(err.code(), "TC_REC_001");
    }

    #[test]
    fn test_open_record_accepts_extra_fields() {
        let (mut subst, mut supply) = setup();
        // {x: int | r} against {x: int, y: string}
        let mut fields_a = BTreeMap::new();
        fields_a.insert("x".to_string(), Type::int());
        let mut fields_b = BTreeMap::new();
        fields_b.insert("x".to_string(), Type::int());
        fields_b.insert("y".to_string(), Type::string());
        unify(
            &mut subst,
            &mut supply,
            &Type::Record(RecordRow {
                fields: fields_a,
                tail: Some("r".to_string()),
            }),
            &Type::Record(RecordRow {
                fields: fields_b.clone(),
                tail: None,
            }),
        )
        .unwrap();
        let applied = subst.apply_record_row(&RecordRow {
            fields: BTreeMap::new(),
            tail: Some("r".to_string()),
        });
        assert_eq!(applied.fields.get("y"), Some(&Type::string()));
    }
}
