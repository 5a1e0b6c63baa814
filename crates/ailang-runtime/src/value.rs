//! Runtime value representation
//!
//! Values are cheap to clone: compound data is reference-counted.
//! `Tagged` values carry their owning module path so constructor identity
//! holds across modules. Nullary constructors are shared singletons
//! handed out by the `$adt` resolver.

use crate::core::CoreExpr;
use crate::effects::EffectContext;
use crate::eval::env::Env;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

/// Host function signature for builtins
pub type BuiltinFn = fn(&EffectContext, &[Value]) -> Result<Value, RuntimeError>;

/// Runtime value
#[derive(Debug, Clone)]
pub enum Value {
    /// 64-bit integer
    Int(i64),
    /// 64-bit float
    Float(f64),
    /// Immutable string
    Str(Rc<str>),
    /// Boolean
    Bool(bool),
    /// `()`
    Unit,
    /// Immutable list
    List(Rc<Vec<Value>>),
    /// Tuple
    Tuple(Rc<Vec<Value>>),
    /// Record with sorted fields
    Record(Rc<BTreeMap<String, Value>>),
    /// ADT constructor application
    Tagged(Rc<TaggedValue>),
    /// User function with captured environment
    Closure(Rc<Closure>),
    /// Host-implemented function
    Builtin(Rc<Builtin>),
    /// `$adt` constructor factory, applied like a function
    CtorFactory(Rc<CtorFactory>),
    /// Type-class instance dictionary
    Dict(Rc<DictValue>),
}

/// An arity-checking factory for one ADT constructor
#[derive(Debug, Clone, PartialEq)]
pub struct CtorFactory {
    /// Module that declared the type
    pub module: String,
    /// Declaring type name
    pub type_name: String,
    /// Constructor name
    pub ctor: String,
    /// Number of fields
    pub arity: usize,
}

/// An ADT value: constructor identity plus fields
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedValue {
    /// Module that declared the type
    pub module: String,
    /// Declaring type name
    pub type_name: String,
    /// Constructor name
    pub ctor: String,
    /// Field values
    pub fields: Vec<Value>,
}

/// A user function value
#[derive(Debug)]
pub struct Closure {
    /// Parameter names
    pub params: Vec<String>,
    /// Function body (Core ANF)
    pub body: CoreExpr,
    /// Captured defining environment
    pub env: Env,
}

/// A host function value
pub struct Builtin {
    /// Registered name (`_io_println`, `eq_Float`, ...)
    pub name: String,
    /// Expected argument count
    pub arity: usize,
    /// Implementation
    pub run: BuiltinFn,
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builtin")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

/// A type-class instance dictionary: method name to implementation
#[derive(Debug)]
pub struct DictValue {
    /// Class name
    pub class: String,
    /// Canonical instance type name (`int`, `float`, `string`, `bool`)
    pub ty: String,
    /// Method implementations
    pub methods: BTreeMap<String, Value>,
}

impl Value {
    /// Construct a string value
    pub fn string(s: impl Into<String>) -> Self {
        Value::Str(Rc::from(s.into()))
    }

    /// Construct a list value
    pub fn list(values: Vec<Value>) -> Self {
        Value::List(Rc::new(values))
    }

    /// Short name of this value's runtime type, used in errors
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Bool(_) => "bool",
            Value::Unit => "()",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Record(_) => "record",
            Value::Tagged(_) => "constructor",
            Value::Closure(_) => "function",
            Value::Builtin(_) => "builtin",
            Value::CtorFactory(_) => "constructor",
            Value::Dict(_) => "dictionary",
        }
    }

    /// Structural equality; functions and dictionaries never compare equal
    pub fn structural_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Unit, Value::Unit) => true,
            (Value::List(a), Value::List(b)) | (Value::Tuple(a), Value::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.structural_eq(y))
            }
            (Value::Record(a), Value::Record(b)) => {
                a.len() == b.len()
                    && a.iter().zip(b.iter()).all(|((ka, va), (kb, vb))| {
                        ka == kb && va.structural_eq(vb)
                    })
            }
            (Value::Tagged(a), Value::Tagged(b)) => {
                a.module == b.module
                    && a.type_name == b.type_name
                    && a.ctor == b.ctor
                    && a.fields.len() == b.fields.len()
                    && a.fields
                        .iter()
                        .zip(b.fields.iter())
                        .all(|(x, y)| x.structural_eq(y))
            }
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.structural_eq(other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => {
                if x.fract() == 0.0 && x.is_finite() {
                    write!(f, "{:.1}", x)
                } else {
                    write!(f, "{}", x)
                }
            }
            Value::Str(s) => write!(f, "{}", s),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Unit => write!(f, "()"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
            Value::Record(fields) => {
                write!(f, "{{")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", name, value)?;
                }
                write!(f, "}}")
            }
            Value::Tagged(tagged) => {
                write!(f, "{}", tagged.ctor)?;
                if !tagged.fields.is_empty() {
                    write!(f, "(")?;
                    for (i, field) in tagged.fields.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", field)?;
                    }
                    write!(f, ")")?;
                }
                Ok(())
            }
            Value::Closure(c) => write!(f, "<function/{}>", c.params.len()),
            Value::Builtin(b) => write!(f, "<builtin {}>", b.name),
            Value::CtorFactory(c) => write!(f, "<constructor {}>", c.ctor),
            Value::Dict(d) => write!(f, "<dict {} {}>", d.class, d.ty),
        }
    }
}

/// Runtime error raised during evaluation or effect dispatch
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuntimeError {
    /// Wrong number of call arguments
    #[error("function expects {expected} argument(s), got {got}")]
    Arity { expected: usize, got: usize },
    /// Evaluation recursion limit hit
    #[error("evaluation exceeded the maximum stack depth of {0}")]
    StackOverflow(usize),
    /// Value of the wrong shape reached the evaluator post-typecheck
    #[error("{0}")]
    TypeMismatch(String),
    /// Integer division by zero
    #[error("division by zero")]
    DivisionByZero,
    /// Integer overflow
    #[error("integer overflow in `{0}`")]
    Overflow(String),
    /// No match arm accepted the scrutinee
    #[error("no match arm matched value `{0}`")]
    MatchExhausted(String),
    /// Entrypoints take zero or one parameter
    #[error("entrypoint `{name}` takes {arity} parameters; only 0 or 1 are supported")]
    MultiArgUnsupported {
        /// Entrypoint name
        name: String,
        /// Declared parameter count
        arity: usize,
    },
    /// Effect used without its capability
    #[error("capability `{0}` is not granted")]
    CapabilityMissing(String),
    /// An `Intrinsic` survived to evaluation without a resolved dictionary
    #[error("unresolved operator `{0}`: no dictionary was attached")]
    OpUnresolved(String),
    /// Global resolution failed
    #[error("module `{module}` has no compiled export `{name}`")]
    UnresolvedGlobal {
        /// Module path
        module: String,
        /// Export name
        name: String,
    },
    /// `$adt` factory missing
    #[error("no constructor factory `{0}` is registered")]
    UnknownCtor(String),
    /// Failure inside an effect operation, with its own code
    #[error("{message}")]
    Effect {
        /// Stable error code (`E_NET_...`, `E_FS_...`)
        code: String,
        /// Human-readable message
        message: String,
    },
    /// JSON argument decoding failed
    #[error("{0}")]
    JsonArgs(String),
}

impl RuntimeError {
    /// Stable error code for structured reports
    pub fn code(&self) -> String {
        match self {
            RuntimeError::Arity { .. } => "RUN_001".to_string(),
            RuntimeError::StackOverflow(_) => "RUN_002".to_string(),
            RuntimeError::TypeMismatch(_) => "RUN_003".to_string(),
            RuntimeError::DivisionByZero => "RUN_004".to_string(),
            RuntimeError::Overflow(_) => "RUN_005".to_string(),
            RuntimeError::MatchExhausted(_) => "RUN_MATCH_EXHAUST".to_string(),
            RuntimeError::MultiArgUnsupported { .. } => "RUN_MULTIARG_UNSUPPORTED".to_string(),
            RuntimeError::CapabilityMissing(_) => "CAP_MISSING".to_string(),
            RuntimeError::OpUnresolved(_) => "TC_OP_UNRESOLVED".to_string(),
            RuntimeError::UnresolvedGlobal { .. } => "EVA002".to_string(),
            RuntimeError::UnknownCtor(_) => "IMP011_UNKNOWN_CTOR".to_string(),
            RuntimeError::Effect { code, .. } => code.clone(),
            RuntimeError::JsonArgs(_) => "E_JSON_001".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_eq_on_tagged() {
        let a = Value::Tagged(Rc::new(TaggedValue {
            module: "m".into(),
            type_name: "Option".into(),
            ctor: "Some".into(),
            fields: vec![Value::Int(1)],
        }));
        let b = Value::Tagged(Rc::new(TaggedValue {
            module: "m".into(),
            type_name: "Option".into(),
            ctor: "Some".into(),
            fields: vec![Value::Int(1)],
        }));
        let c = Value::Tagged(Rc::new(TaggedValue {
            module: "other".into(),
            type_name: "Option".into(),
            ctor: "Some".into(),
            fields: vec![Value::Int(1)],
        }));
        assert!(a.structural_eq(&b));
        // Same ctor name from a different module is a different value
        assert!(!a.structural_eq(&c));
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Int(42).to_string(), "42");
        assert_eq!(Value::Float(2.0).to_string(), "2.0");
        assert_eq!(Value::list(vec![Value::Int(1), Value::Int(2)]).to_string(), "[1, 2]");
        assert_eq!(Value::Unit.to_string(), "()");
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(RuntimeError::DivisionByZero.code(), "RUN_004");
        assert_eq!(RuntimeError::CapabilityMissing("IO".into()).code(), "CAP_MISSING");
        assert_eq!(
            RuntimeError::Effect {
                code: "E_NET_HEADER_BLOCKED".into(),
                message: "blocked".into()
            }
            .code(),
            "E_NET_HEADER_BLOCKED"
        );
    }
}
