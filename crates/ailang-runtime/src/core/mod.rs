//! Core IR in A-Normal Form
//!
//! Every node carries a unique `NodeId` (assigned at elaboration) and its
//! surface span. The ANF discipline: arguments to applications,
//! intrinsics, and dictionary applications, `if` conditions, `match`
//! scrutinees, and collection elements must be atomic. `verify` checks
//! the discipline; `pretty` renders Core for tracing.

pub mod pretty;
pub mod verify;

use crate::span::Span;
use std::fmt;

/// Unique identity of a Core node, assigned at elaboration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Fresh `NodeId` supply
#[derive(Debug, Default)]
pub struct NodeIdGen {
    next: u64,
}

impl NodeIdGen {
    /// Create a supply starting at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a supply starting at a given id, for passes that extend an
    /// already-numbered tree
    pub fn starting_at(next: u64) -> Self {
        Self { next }
    }

    /// Allocate the next id
    pub fn fresh(&mut self) -> NodeId {
        let id = NodeId(self.next);
        self.next += 1;
        id
    }
}

/// Literal values shared between Core expressions and patterns
#[derive(Debug, Clone, PartialEq)]
pub enum Lit {
    /// Integer literal
    Int(i64),
    /// Float literal
    Float(f64),
    /// String literal
    Str(String),
    /// Boolean literal
    Bool(bool),
    /// `()`
    Unit,
}

impl fmt::Display for Lit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lit::Int(n) => write!(f, "{}", n),
            Lit::Float(x) => write!(f, "{:?}", x),
            Lit::Str(s) => write!(f, "{:?}", s),
            Lit::Bool(b) => write!(f, "{}", b),
            Lit::Unit => write!(f, "()"),
        }
    }
}

/// Primitive operators awaiting dictionary resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntrinsicOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `++`
    Concat,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// unary `-`
    Neg,
    /// unary `!`
    Not,
}

impl IntrinsicOp {
    /// The type class whose dictionary implements this operator, if any.
    /// `Concat` and `Not` dispatch monomorphically and carry no class.
    pub fn class(&self) -> Option<&'static str> {
        match self {
            IntrinsicOp::Add
            | IntrinsicOp::Sub
            | IntrinsicOp::Mul
            | IntrinsicOp::Div
            | IntrinsicOp::Neg => Some("Num"),
            IntrinsicOp::Eq | IntrinsicOp::Ne => Some("Eq"),
            IntrinsicOp::Lt | IntrinsicOp::Le | IntrinsicOp::Gt | IntrinsicOp::Ge => Some("Ord"),
            IntrinsicOp::Concat | IntrinsicOp::Not => None,
        }
    }

    /// Dictionary method name for this operator
    pub fn method(&self) -> &'static str {
        match self {
            IntrinsicOp::Add => "add",
            IntrinsicOp::Sub => "sub",
            IntrinsicOp::Mul => "mul",
            IntrinsicOp::Div => "div",
            IntrinsicOp::Concat => "concat",
            IntrinsicOp::Eq => "eq",
            IntrinsicOp::Ne => "ne",
            IntrinsicOp::Lt => "lt",
            IntrinsicOp::Le => "le",
            IntrinsicOp::Gt => "gt",
            IntrinsicOp::Ge => "ge",
            IntrinsicOp::Neg => "neg",
            IntrinsicOp::Not => "not",
        }
    }

    /// Canonical operator symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            IntrinsicOp::Add => "+",
            IntrinsicOp::Sub => "-",
            IntrinsicOp::Mul => "*",
            IntrinsicOp::Div => "/",
            IntrinsicOp::Concat => "++",
            IntrinsicOp::Eq => "==",
            IntrinsicOp::Ne => "!=",
            IntrinsicOp::Lt => "<",
            IntrinsicOp::Le => "<=",
            IntrinsicOp::Gt => ">",
            IntrinsicOp::Ge => ">=",
            IntrinsicOp::Neg => "-",
            IntrinsicOp::Not => "!",
        }
    }
}

/// A reference to an exported binding: `(module, name)`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GlobalRef {
    /// Owning module path (`$builtin` and `$adt` are synthetic)
    pub module: String,
    /// Exported name
    pub name: String,
}

impl fmt::Display for GlobalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.module, self.name)
    }
}

/// Core expression node
#[derive(Debug, Clone, PartialEq)]
pub struct CoreExpr {
    /// Unique node identity
    pub id: NodeId,
    /// Surface span for diagnostics
    pub span: Span,
    /// Node kind
    pub kind: CoreKind,
}

/// Core expression kinds
#[derive(Debug, Clone, PartialEq)]
pub enum CoreKind {
    /// Local variable reference
    Var(String),
    /// Literal
    Lit(Lit),
    /// Lambda with captured environment semantics
    Lambda {
        params: Vec<String>,
        body: Box<CoreExpr>,
    },
    /// Non-recursive binding
    Let {
        name: String,
        value: Box<CoreExpr>,
        body: Box<CoreExpr>,
    },
    /// Mutually recursive binding group
    LetRec {
        bindings: Vec<(String, CoreExpr)>,
        body: Box<CoreExpr>,
    },
    /// Application; `func` and `args` must be atomic
    App {
        func: Box<CoreExpr>,
        args: Vec<CoreExpr>,
    },
    /// Conditional; `cond` must be atomic
    If {
        cond: Box<CoreExpr>,
        then_branch: Box<CoreExpr>,
        else_branch: Box<CoreExpr>,
    },
    /// Pattern match; scrutinee must be atomic
    Match {
        scrutinee: Box<CoreExpr>,
        arms: Vec<CoreArm>,
    },
    /// Primitive operator placeholder; rewritten away by OpLowering
    Intrinsic {
        op: IntrinsicOp,
        args: Vec<CoreExpr>,
    },
    /// Record construction; field values must be atomic
    Record(Vec<(String, CoreExpr)>),
    /// Field projection; target must be atomic
    RecordAccess {
        expr: Box<CoreExpr>,
        field: String,
    },
    /// List construction; elements must be atomic
    List(Vec<CoreExpr>),
    /// Tuple construction; elements must be atomic
    Tuple(Vec<CoreExpr>),
    /// Dictionary abstraction: binds dictionary parameters
    DictAbs {
        params: Vec<String>,
        body: Box<CoreExpr>,
    },
    /// Dictionary method application; `dict` and `args` must be atomic
    DictApp {
        dict: Box<CoreExpr>,
        method: String,
        args: Vec<CoreExpr>,
    },
    /// Reference to a registered instance dictionary
    DictRef {
        class: String,
        ty: String,
    },
    /// Reference to another module's export
    Global(GlobalRef),
}

/// One arm of a Core `Match`
#[derive(Debug, Clone, PartialEq)]
pub struct CoreArm {
    /// Pattern to bind against the scrutinee
    pub pattern: CorePattern,
    /// Optional guard; evaluated only after the pattern binds
    pub guard: Option<CoreExpr>,
    /// Arm body
    pub body: CoreExpr,
}

/// Core pattern with resolved constructor identity
#[derive(Debug, Clone, PartialEq)]
pub enum CorePattern {
    /// `_`
    Wildcard,
    /// Variable binding
    Var(String),
    /// Literal, matched by structural equality
    Lit(Lit),
    /// Tuple, length-checked
    Tuple(Vec<CorePattern>),
    /// List with optional rest binding
    List {
        items: Vec<CorePattern>,
        rest: Option<Box<CorePattern>>,
    },
    /// Record, field-by-field; `rest` allows extra fields
    Record {
        fields: Vec<(String, CorePattern)>,
        rest: bool,
    },
    /// Constructor with resolved owning module
    Ctor {
        module: String,
        type_name: String,
        ctor: String,
        args: Vec<CorePattern>,
    },
}

impl CorePattern {
    /// Names bound by this pattern, in left-to-right order
    pub fn bound_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_bound(&mut names);
        names
    }

    fn collect_bound(&self, names: &mut Vec<String>) {
        match self {
            CorePattern::Wildcard | CorePattern::Lit(_) => {}
            CorePattern::Var(name) => names.push(name.clone()),
            CorePattern::Tuple(items) => {
                for item in items {
                    item.collect_bound(names);
                }
            }
            CorePattern::List { items, rest } => {
                for item in items {
                    item.collect_bound(names);
                }
                if let Some(rest) = rest {
                    rest.collect_bound(names);
                }
            }
            CorePattern::Record { fields, .. } => {
                for (_, pat) in fields {
                    pat.collect_bound(names);
                }
            }
            CorePattern::Ctor { args, .. } => {
                for arg in args {
                    arg.collect_bound(names);
                }
            }
        }
    }
}

impl CoreExpr {
    /// Whether this expression is atomic (safe as an argument without hoisting)
    pub fn is_atomic(&self) -> bool {
        matches!(
            self.kind,
            CoreKind::Var(_)
                | CoreKind::Lit(_)
                | CoreKind::Lambda { .. }
                | CoreKind::DictRef { .. }
                | CoreKind::Global(_)
        )
    }
}

/// A top-level binding within a module's Core program
#[derive(Debug, Clone, PartialEq)]
pub struct CoreBinding {
    /// Binding name
    pub name: String,
    /// Bound expression
    pub expr: CoreExpr,
    /// Whether the binding is exported
    pub exported: bool,
    /// Declaration span
    pub span: Span,
}

/// A recursion-grouped set of top-level bindings
#[derive(Debug, Clone, PartialEq)]
pub enum BindingGroup {
    /// Non-recursive binding
    Single(CoreBinding),
    /// Mutually (or self-) recursive bindings
    Rec(Vec<CoreBinding>),
}

impl BindingGroup {
    /// Iterate the bindings in this group
    pub fn bindings(&self) -> impl Iterator<Item = &CoreBinding> {
        match self {
            BindingGroup::Single(b) => std::slice::from_ref(b).iter(),
            BindingGroup::Rec(bs) => bs.iter(),
        }
    }
}

/// A module's elaborated Core program
#[derive(Debug, Clone, PartialEq)]
pub struct CoreProgram {
    /// Owning module path
    pub module: String,
    /// Top-level bindings in dependency order, recursion-grouped
    pub groups: Vec<BindingGroup>,
}

impl CoreProgram {
    /// Find a top-level binding by name
    pub fn binding(&self, name: &str) -> Option<&CoreBinding> {
        self.groups
            .iter()
            .flat_map(|g| g.bindings())
            .find(|b| b.name == name)
    }

    /// Iterate all top-level bindings
    pub fn bindings(&self) -> impl Iterator<Item = &CoreBinding> {
        self.groups.iter().flat_map(|g| g.bindings())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_gen_is_sequential() {
        let mut gen = NodeIdGen::new();
        assert_eq!(gen.fresh(), NodeId(0));
        assert_eq!(gen.fresh(), NodeId(1));
    }

    #[test]
    fn test_intrinsic_classes() {
        assert_eq!(IntrinsicOp::Add.class(), Some("Num"));
        assert_eq!(IntrinsicOp::Eq.class(), Some("Eq"));
        assert_eq!(IntrinsicOp::Div.class(), Some("Num"));
        assert_eq!(IntrinsicOp::Concat.class(), None);
    }

    #[test]
    fn test_pattern_bound_names() {
        let pat = CorePattern::Ctor {
            module: "m".into(),
            type_name: "Pair".into(),
            ctor: "MkPair".into(),
            args: vec![
                CorePattern::Var("a".into()),
                CorePattern::Tuple(vec![CorePattern::Wildcard, CorePattern::Var("b".into())]),
            ],
        };
        assert_eq!(pat.bound_names(), vec!["a".to_string(), "b".to_string()]);
    }
}
