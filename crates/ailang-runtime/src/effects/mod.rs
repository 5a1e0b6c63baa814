//! Capability-scoped effect system
//!
//! Every effect invocation flows through [`call`]: the `(effect, op)`
//! pair is looked up in the operation registry, the capability context is
//! checked, and only then does the host implementation run. The registry
//! is built once per runtime and never mutated afterwards.

pub mod clock;
pub mod env_ops;
pub mod fs;
pub mod io;
pub mod net;

use crate::value::{RuntimeError, Value};
use ailang_config::NetworkPolicy;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

/// Host implementation of one effect operation
pub type EffectOp = fn(&EffectContext, &[Value]) -> Result<Value, RuntimeError>;

/// The effects known to the runtime
pub const KNOWN_EFFECTS: &[&str] = &["Clock", "Env", "FS", "IO", "Net"];

/// Operation registry keyed by `(effect, op)`
#[derive(Default)]
pub struct OpRegistry {
    ops: BTreeMap<(String, String), EffectOp>,
}

impl OpRegistry {
    /// Register every standard operation
    pub fn standard() -> Self {
        let mut registry = Self::default();
        io::register(&mut registry);
        fs::register(&mut registry);
        clock::register(&mut registry);
        net::register(&mut registry);
        env_ops::register(&mut registry);
        registry
    }

    /// Register one operation
    pub fn register(&mut self, effect: &str, op: &str, f: EffectOp) {
        self.ops.insert((effect.to_string(), op.to_string()), f);
    }

    /// Look up an operation
    pub fn get(&self, effect: &str, op: &str) -> Option<EffectOp> {
        self.ops
            .get(&(effect.to_string(), op.to_string()))
            .copied()
    }
}

/// Where IO output goes; tests capture into a buffer
#[derive(Clone)]
pub enum OutputSink {
    /// Write to the process stdout
    Stdout,
    /// Capture into a shared buffer
    Buffer(Rc<RefCell<String>>),
}

/// Clock behavior
#[derive(Clone)]
pub enum ClockMode {
    /// Real wall clock; `sleep` actually sleeps
    Real,
    /// Deterministic virtual time in milliseconds; `sleep` advances it
    Virtual(Rc<Cell<i64>>),
}

/// The capability context an evaluation runs under
pub struct EffectContext {
    caps: BTreeSet<String>,
    registry: OpRegistry,
    /// Clock mode, fixed for the lifetime of the context
    pub clock: ClockMode,
    /// Network policy applied by the Net effect
    pub net_policy: NetworkPolicy,
    /// IO output sink
    pub sink: OutputSink,
}

impl EffectContext {
    /// A context granting the given capabilities, real clock, stdout sink
    pub fn new(caps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            caps: caps.into_iter().map(Into::into).collect(),
            registry: OpRegistry::standard(),
            clock: ClockMode::Real,
            net_policy: NetworkPolicy::default(),
            sink: OutputSink::Stdout,
        }
    }

    /// A context with no capabilities
    pub fn sealed() -> Self {
        Self::new(Vec::<String>::new())
    }

    /// Switch to deterministic virtual time starting at 0
    pub fn with_virtual_time(mut self) -> Self {
        self.clock = ClockMode::Virtual(Rc::new(Cell::new(0)));
        self
    }

    /// Capture IO output into the given buffer
    pub fn with_buffer(mut self, buffer: Rc<RefCell<String>>) -> Self {
        self.sink = OutputSink::Buffer(buffer);
        self
    }

    /// Apply a network policy
    pub fn with_net_policy(mut self, policy: NetworkPolicy) -> Self {
        self.net_policy = policy;
        self
    }

    /// Whether a capability is granted
    pub fn has_cap(&self, effect: &str) -> bool {
        self.caps.contains(effect)
    }

    /// The granted capability set, sorted
    pub fn caps(&self) -> &BTreeSet<String> {
        &self.caps
    }

    /// Write to the IO sink
    pub fn write(&self, text: &str) {
        match &self.sink {
            OutputSink::Stdout => print!("{}", text),
            OutputSink::Buffer(buffer) => buffer.borrow_mut().push_str(text),
        }
    }
}

/// Dispatch one effect operation: registry lookup, capability check, run
pub fn call(
    ctx: &EffectContext,
    effect: &str,
    op: &str,
    args: &[Value],
) -> Result<Value, RuntimeError> {
    let Some(f) = ctx.registry.get(effect, op) else {
        return Err(RuntimeError::Effect {
            code: "E_EFFECT_UNKNOWN_OP".to_string(),
            message: format!("no operation `{}` registered for effect `{}`", op, effect),
        });
    };
    if !ctx.has_cap(effect) {
        return Err(RuntimeError::CapabilityMissing(effect.to_string()));
    }
    f(ctx, args)
}

/// Expect a string argument at `index`
pub(crate) fn str_arg(args: &[Value], index: usize) -> Result<&str, RuntimeError> {
    match args.get(index) {
        Some(Value::Str(s)) => Ok(s),
        Some(other) => Err(RuntimeError::TypeMismatch(format!(
            "effect operation expected a string argument, got {}",
            other.type_name()
        ))),
        None => Err(RuntimeError::Arity {
            expected: index + 1,
            got: args.len(),
        }),
    }
}

/// Expect an int argument at `index`
pub(crate) fn int_arg(args: &[Value], index: usize) -> Result<i64, RuntimeError> {
    match args.get(index) {
        Some(Value::Int(n)) => Ok(*n),
        Some(other) => Err(RuntimeError::TypeMismatch(format!(
            "effect operation expected an int argument, got {}",
            other.type_name()
        ))),
        None => Err(RuntimeError::Arity {
            expected: index + 1,
            got: args.len(),
        }),
    }
}
