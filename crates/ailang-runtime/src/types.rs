//! Semantic types, schemes, and effect rows
//!
//! Effect rows and record rows share the same kernel: a label map plus an
//! optional row-variable tail. A row with no tail is closed and unifies
//! only against an identical label set; an open row unifies by splitting
//! into common labels and a fresh residual.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

/// A row of effect labels, possibly open
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EffectRow {
    /// Effect labels, kept sorted
    pub labels: BTreeSet<String>,
    /// Row variable tail; `None` means the row is closed
    pub tail: Option<String>,
}

impl EffectRow {
    /// The closed empty row (pure)
    pub fn pure() -> Self {
        Self::default()
    }

    /// A closed row over the given labels
    pub fn closed(labels: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
            tail: None,
        }
    }

    /// An open row with the given labels and tail variable
    pub fn open(labels: impl IntoIterator<Item = impl Into<String>>, tail: impl Into<String>) -> Self {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
            tail: Some(tail.into()),
        }
    }

    /// Whether the row is closed and empty
    pub fn is_pure(&self) -> bool {
        self.labels.is_empty() && self.tail.is_none()
    }

    /// Union of two rows' labels; the result is open iff either side is
    pub fn union(&self, other: &EffectRow) -> EffectRow {
        EffectRow {
            labels: self.labels.union(&other.labels).cloned().collect(),
            tail: self.tail.clone().or_else(|| other.tail.clone()),
        }
    }
}

impl fmt::Display for EffectRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, label) in self.labels.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", label)?;
        }
        if let Some(tail) = &self.tail {
            if self.labels.is_empty() {
                write!(f, "{}", tail)?;
            } else {
                write!(f, " | {}", tail)?;
            }
        }
        write!(f, "}}")
    }
}

/// A record row body: fields plus an optional row-variable tail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RecordRow {
    /// Field name to type, kept sorted
    pub fields: BTreeMap<String, Type>,
    /// Row variable tail; `None` means the record is closed
    pub tail: Option<String>,
}

/// Semantic type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Type {
    /// Type constant: `int`, `float`, `string`, `bool`, `()`, or an ADT name
    Con(String),
    /// Type variable
    Var(String),
    /// Function type with effect row
    Func {
        params: Vec<Type>,
        ret: Box<Type>,
        effects: EffectRow,
    },
    /// Homogeneous list
    List(Box<Type>),
    /// Tuple
    Tuple(Vec<Type>),
    /// Record with row polymorphism
    Record(RecordRow),
    /// Applied type constructor: `Option(int)`
    App(Box<Type>, Vec<Type>),
}

impl Type {
    /// The unit type `()`
    pub fn unit() -> Self {
        Type::Con("()".to_string())
    }

    /// `int`
    pub fn int() -> Self {
        Type::Con("int".to_string())
    }

    /// `float`
    pub fn float() -> Self {
        Type::Con("float".to_string())
    }

    /// `string`
    pub fn string() -> Self {
        Type::Con("string".to_string())
    }

    /// `bool`
    pub fn bool() -> Self {
        Type::Con("bool".to_string())
    }

    /// Collect free type variables, in first-occurrence order
    pub fn free_vars(&self) -> Vec<String> {
        let mut vars = Vec::new();
        self.collect_free_vars(&mut vars);
        vars
    }

    fn collect_free_vars(&self, vars: &mut Vec<String>) {
        match self {
            Type::Con(_) => {}
            Type::Var(name) => {
                if !vars.contains(name) {
                    vars.push(name.clone());
                }
            }
            Type::Func { params, ret, .. } => {
                for p in params {
                    p.collect_free_vars(vars);
                }
                ret.collect_free_vars(vars);
            }
            Type::List(elem) => elem.collect_free_vars(vars),
            Type::Tuple(items) => {
                for item in items {
                    item.collect_free_vars(vars);
                }
            }
            Type::Record(row) => {
                for ty in row.fields.values() {
                    ty.collect_free_vars(vars);
                }
            }
            Type::App(head, args) => {
                head.collect_free_vars(vars);
                for arg in args {
                    arg.collect_free_vars(vars);
                }
            }
        }
    }

    /// Collect free effect-row variables
    pub fn free_row_vars(&self) -> Vec<String> {
        let mut vars = Vec::new();
        self.collect_free_row_vars(&mut vars);
        vars
    }

    fn collect_free_row_vars(&self, vars: &mut Vec<String>) {
        match self {
            Type::Func { params, ret, effects } => {
                if let Some(tail) = &effects.tail {
                    if !vars.contains(tail) {
                        vars.push(tail.clone());
                    }
                }
                for p in params {
                    p.collect_free_row_vars(vars);
                }
                ret.collect_free_row_vars(vars);
            }
            Type::List(elem) => elem.collect_free_row_vars(vars),
            Type::Tuple(items) => {
                for item in items {
                    item.collect_free_row_vars(vars);
                }
            }
            Type::Record(row) => {
                for ty in row.fields.values() {
                    ty.collect_free_row_vars(vars);
                }
            }
            Type::App(head, args) => {
                head.collect_free_row_vars(vars);
                for arg in args {
                    arg.collect_free_row_vars(vars);
                }
            }
            _ => {}
        }
    }

    /// The effect row of a function type, if this is one
    pub fn effect_row(&self) -> Option<&EffectRow> {
        match self {
            Type::Func { effects, .. } => Some(effects),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Con(name) => write!(f, "{}", name),
            Type::Var(name) => write!(f, "{}", name),
            Type::Func { params, ret, effects } => {
                write!(f, "(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p)?;
                }
                write!(f, ") -> {}", ret)?;
                if !effects.is_pure() {
                    write!(f, " ! {}", effects)?;
                }
                Ok(())
            }
            Type::List(elem) => write!(f, "[{}]", elem),
            Type::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
            Type::Record(row) => {
                write!(f, "{{")?;
                for (i, (name, ty)) in row.fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", name, ty)?;
                }
                if let Some(tail) = &row.tail {
                    write!(f, " | {}", tail)?;
                }
                write!(f, "}}")
            }
            Type::App(head, args) => {
                write!(f, "{}(", head)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// A class constraint over a type: `Num a`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    /// Class name: `Num`, `Eq`, `Ord`, `Show`, `Fractional`
    pub class: String,
    /// Constrained type
    pub ty: Type,
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.class, self.ty)
    }
}

/// A generalized type: `forall a. Num a => (a, a) -> a`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scheme {
    /// Universally quantified type variables
    pub vars: Vec<String>,
    /// Constraints over the quantified variables
    pub constraints: Vec<Constraint>,
    /// Body type
    pub ty: Type,
}

impl Scheme {
    /// A scheme with no quantified variables
    pub fn mono(ty: Type) -> Self {
        Self {
            vars: Vec::new(),
            constraints: Vec::new(),
            ty,
        }
    }

    /// Canonical string form, used for interface digests
    pub fn canonical(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.vars.is_empty() {
            write!(f, "forall")?;
            for var in &self.vars {
                write!(f, " {}", var)?;
            }
            write!(f, ". ")?;
        }
        if !self.constraints.is_empty() {
            for (i, c) in self.constraints.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", c)?;
            }
            write!(f, " => ")?;
        }
        write!(f, "{}", self.ty)
    }
}

/// A substitution over type variables and row variables
#[derive(Debug, Clone, Default)]
pub struct Subst {
    types: HashMap<String, Type>,
    effect_rows: HashMap<String, EffectRow>,
    record_rows: HashMap<String, RecordRow>,
}

impl Subst {
    /// The empty substitution
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a type variable
    pub fn insert_type(&mut self, var: impl Into<String>, ty: Type) {
        self.types.insert(var.into(), ty);
    }

    /// Bind an effect-row variable
    pub fn insert_row(&mut self, var: impl Into<String>, row: EffectRow) {
        self.effect_rows.insert(var.into(), row);
    }

    /// Bind a record-row variable
    pub fn insert_record_row(&mut self, var: impl Into<String>, row: RecordRow) {
        self.record_rows.insert(var.into(), row);
    }

    /// Look up a type variable binding
    pub fn get_type(&self, var: &str) -> Option<&Type> {
        self.types.get(var)
    }

    /// Whether the substitution binds nothing
    pub fn is_empty(&self) -> bool {
        self.types.is_empty() && self.effect_rows.is_empty()
    }

    /// Apply to a type
    pub fn apply(&self, ty: &Type) -> Type {
        match ty {
            Type::Con(name) => Type::Con(name.clone()),
            Type::Var(name) => match self.types.get(name) {
                // Chase chains so composed substitutions resolve fully
                Some(bound) => self.apply(bound),
                None => Type::Var(name.clone()),
            },
            Type::Func { params, ret, effects } => Type::Func {
                params: params.iter().map(|p| self.apply(p)).collect(),
                ret: Box::new(self.apply(ret)),
                effects: self.apply_row(effects),
            },
            Type::List(elem) => Type::List(Box::new(self.apply(elem))),
            Type::Tuple(items) => Type::Tuple(items.iter().map(|t| self.apply(t)).collect()),
            Type::Record(row) => Type::Record(self.apply_record_row(row)),
            Type::App(head, args) => Type::App(
                Box::new(self.apply(head)),
                args.iter().map(|a| self.apply(a)).collect(),
            ),
        }
    }

    /// Apply to an effect row
    pub fn apply_row(&self, row: &EffectRow) -> EffectRow {
        let mut labels = row.labels.clone();
        let mut tail = row.tail.clone();
        // Chase tail bindings, unioning labels as rows splice in
        while let Some(var) = tail.clone() {
            match self.effect_rows.get(&var) {
                Some(bound) => {
                    labels.extend(bound.labels.iter().cloned());
                    if bound.tail.as_deref() == Some(var.as_str()) {
                        break;
                    }
                    tail = bound.tail.clone();
                }
                None => break,
            }
        }
        EffectRow { labels, tail }
    }

    /// Apply to a record row, splicing bound tails
    pub fn apply_record_row(&self, row: &RecordRow) -> RecordRow {
        let mut fields: BTreeMap<String, Type> = row
            .fields
            .iter()
            .map(|(name, t)| (name.clone(), self.apply(t)))
            .collect();
        let mut tail = row.tail.clone();
        while let Some(var) = tail.clone() {
            match self.record_rows.get(&var) {
                Some(bound) => {
                    for (name, t) in &bound.fields {
                        fields.entry(name.clone()).or_insert_with(|| self.apply(t));
                    }
                    if bound.tail.as_deref() == Some(var.as_str()) {
                        break;
                    }
                    tail = bound.tail.clone();
                }
                None => break,
            }
        }
        RecordRow { fields, tail }
    }

    /// Apply to a scheme (quantified variables are untouched)
    pub fn apply_scheme(&self, scheme: &Scheme) -> Scheme {
        let mut shadowed = self.clone();
        for var in &scheme.vars {
            shadowed.types.remove(var);
            shadowed.effect_rows.remove(var);
        }
        Scheme {
            vars: scheme.vars.clone(),
            constraints: scheme
                .constraints
                .iter()
                .map(|c| Constraint {
                    class: c.class.clone(),
                    ty: shadowed.apply(&c.ty),
                })
                .collect(),
            ty: shadowed.apply(&scheme.ty),
        }
    }

    /// Compose: apply `self` after `earlier`
    pub fn compose(&mut self, other: Subst) {
        for (var, ty) in other.types {
            self.types.entry(var).or_insert(ty);
        }
        for (var, row) in other.effect_rows {
            self.effect_rows.entry(var).or_insert(row);
        }
        for (var, row) in other.record_rows {
            self.record_rows.entry(var).or_insert(row);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_display_func_with_effects() {
        let ty = Type::Func {
            params: vec![Type::string()],
            ret: Box::new(Type::unit()),
            effects: EffectRow::closed(["IO"]),
        };
        assert_eq!(ty.to_string(), "(string) -> () ! {IO}");
    }

    #[test]
    fn test_display_pure_func_omits_row() {
        let ty = Type::Func {
            params: vec![Type::int()],
            ret: Box::new(Type::int()),
            effects: EffectRow::pure(),
        };
        assert_eq!(ty.to_string(), "(int) -> int");
    }

    #[test]
    fn test_display_open_row() {
        let row = EffectRow::open(["FS", "IO"], "r1");
        assert_eq!(row.to_string(), "{FS, IO | r1}");
    }

    #[test]
    fn test_scheme_display() {
        let scheme = Scheme {
            vars: vec!["a".into()],
            constraints: vec![Constraint {
                class: "Num".into(),
                ty: Type::Var("a".into()),
            }],
            ty: Type::Func {
                params: vec![Type::Var("a".into()), Type::Var("a".into())],
                ret: Box::new(Type::Var("a".into())),
                effects: EffectRow::pure(),
            },
        };
        assert_eq!(scheme.to_string(), "forall a. Num a => (a, a) -> a");
    }

    #[test]
    fn test_subst_chases_chains() {
        let mut subst = Subst::new();
        subst.insert_type("a", Type::Var("b".into()));
        subst.insert_type("b", Type::int());
        assert_eq!(subst.apply(&Type::Var("a".into())), Type::int());
    }

    #[test]
    fn test_subst_row_splices_labels() {
        let mut subst = Subst::new();
        subst.insert_row("r1", EffectRow::closed(["FS"]));
        let row = EffectRow::open(["IO"], "r1");
        assert_eq!(subst.apply_row(&row), EffectRow::closed(["IO", "FS"]));
    }

    #[test]
    fn test_free_vars_order() {
        let ty = Type::Func {
            params: vec![Type::Var("b".into()), Type::Var("a".into())],
            ret: Box::new(Type::Var("b".into())),
            effects: EffectRow::pure(),
        };
        assert_eq!(ty.free_vars(), vec!["b".to_string(), "a".to_string()]);
    }
}
