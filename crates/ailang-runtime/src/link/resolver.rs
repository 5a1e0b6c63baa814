//! Global value resolution with memoization
//!
//! Resolves `GlobalRef`s for the evaluator: `$adt` factories, `$builtin`
//! lookups, and lazy per-module evaluation. Module instantiation is
//! idempotent: a successfully evaluated module's exports are memoized
//! under a read/write lock with the double-checked pattern, so re-entry
//! never re-evaluates a module. Failures are not cached; a REPL host can
//! retry after fixing the world.

use crate::core::{BindingGroup, CoreProgram, GlobalRef};
use crate::effects::EffectContext;
use crate::eval::{env::Env, Evaluator, ValueResolver};
use crate::iface::Iface;
use crate::link::adt::AdtRegistry;
use crate::link::builtins;
use crate::typecheck::instances::InstanceTable;
use crate::value::{RuntimeError, Value};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

/// A compiled module ready for instantiation
#[derive(Debug, Clone)]
pub struct CompiledModule {
    /// Canonical module path
    pub path: String,
    /// Export surface
    pub iface: Iface,
    /// Typed Core, post-OpLowering
    pub core: CoreProgram,
}

/// The runtime resolver shared by every evaluation in one runtime
pub struct Resolver {
    /// Module paths in the order they were compiled (topological)
    order: Vec<String>,
    modules: HashMap<String, CompiledModule>,
    adt: AdtRegistry,
    instances: InstanceTable,
    ctx: EffectContext,
    /// `(module, export) -> value`, double-checked under the lock
    memo: RwLock<HashMap<(String, String), Value>>,
    /// Environments of instantiated modules
    envs: RefCell<HashMap<String, Env>>,
    /// Modules currently instantiating, to catch re-entry
    instantiating: RefCell<HashSet<String>>,
}

impl Resolver {
    /// Build a resolver over compiled modules and a capability context
    pub fn new(modules: Vec<CompiledModule>, ctx: EffectContext) -> Self {
        let adt = AdtRegistry::from_ifaces(modules.iter().map(|m| &m.iface));
        Self {
            order: modules.iter().map(|m| m.path.clone()).collect(),
            modules: modules.into_iter().map(|m| (m.path.clone(), m)).collect(),
            adt,
            instances: InstanceTable::new(),
            ctx,
            memo: RwLock::new(HashMap::new()),
            envs: RefCell::new(HashMap::new()),
            instantiating: RefCell::new(HashSet::new()),
        }
    }

    /// The capability context evaluations run under
    pub fn ctx(&self) -> &EffectContext {
        &self.ctx
    }

    /// The runtime instance table
    pub fn instances(&self) -> &InstanceTable {
        &self.instances
    }

    /// The synthetic `$adt` interface
    pub fn adt_iface(&self) -> &Iface {
        self.adt.iface()
    }

    /// A compiled module's interface
    pub fn iface(&self, module: &str) -> Option<&Iface> {
        self.modules.get(module).map(|m| &m.iface)
    }

    /// Instantiate every module in compilation (topological) order, so
    /// each module's imports are fully evaluated before it begins
    pub fn instantiate_all(&self) -> Result<(), RuntimeError> {
        for path in self.order.clone() {
            self.module_env(&path)?;
        }
        Ok(())
    }

    /// Look up an evaluated export, instantiating the module on demand
    fn module_export(&self, module: &str, name: &str) -> Result<Value, RuntimeError> {
        let key = (module.to_string(), name.to_string());
        {
            let memo = self.memo.read().expect("memo lock");
            if let Some(value) = memo.get(&key) {
                return Ok(value.clone());
            }
        }

        // Evaluate outside the lock; instantiation may recursively
        // resolve other globals
        let env = self.module_env(module)?;
        let value = env
            .lookup(name)
            .ok_or_else(|| RuntimeError::UnresolvedGlobal {
                module: module.to_string(),
                name: name.to_string(),
            })?;

        let mut memo = self.memo.write().expect("memo lock");
        // Double-checked: another path may have filled it meanwhile
        Ok(memo.entry(key).or_insert(value).clone())
    }

    /// The evaluated environment of a module, instantiating it once.
    /// Every top-level binding group is evaluated in order; `LetRec`
    /// groups expose all co-recursive values, so resolving any one of
    /// them works.
    fn module_env(&self, module: &str) -> Result<Env, RuntimeError> {
        if let Some(env) = self.envs.borrow().get(module) {
            return Ok(env.clone());
        }
        if !self.instantiating.borrow_mut().insert(module.to_string()) {
            return Err(RuntimeError::UnresolvedGlobal {
                module: module.to_string(),
                name: "<self during init>".to_string(),
            });
        }

        let result = self.evaluate_module(module);
        self.instantiating.borrow_mut().remove(module);
        let env = result?;
        self.envs
            .borrow_mut()
            .insert(module.to_string(), env.clone());
        Ok(env)
    }

    fn evaluate_module(&self, module: &str) -> Result<Env, RuntimeError> {
        let Some(compiled) = self.modules.get(module) else {
            return Err(RuntimeError::UnresolvedGlobal {
                module: module.to_string(),
                name: "<module>".to_string(),
            });
        };
        let env = Env::new();
        let evaluator = Evaluator::new(self, &self.instances, &self.ctx, module);
        instantiate_groups(&compiled.core, &evaluator, &env)?;
        Ok(env)
    }
}

/// Evaluate a program's binding groups into an environment
fn instantiate_groups(
    core: &CoreProgram,
    evaluator: &Evaluator<'_>,
    env: &Env,
) -> Result<(), RuntimeError> {
    for group in &core.groups {
        match group {
            BindingGroup::Single(binding) => {
                let value = evaluator.eval(&binding.expr, env)?;
                env.bind(binding.name.clone(), value);
            }
            BindingGroup::Rec(bindings) => {
                for binding in bindings {
                    env.bind(binding.name.clone(), Value::Unit);
                }
                for binding in bindings {
                    let value = evaluator.eval(&binding.expr, env)?;
                    env.fill(&binding.name, value);
                }
            }
        }
    }
    Ok(())
}

impl ValueResolver for Resolver {
    fn resolve(&self, global: &GlobalRef) -> Result<Value, RuntimeError> {
        match global.module.as_str() {
            "$adt" => self.adt.resolve(&global.name),
            "$builtin" => {
                builtins::value(&global.name).ok_or_else(|| RuntimeError::UnresolvedGlobal {
                    module: "$builtin".to_string(),
                    name: global.name.clone(),
                })
            }
            _ if global.name.starts_with('_') => {
                builtins::value(&global.name).ok_or_else(|| RuntimeError::UnresolvedGlobal {
                    module: global.module.clone(),
                    name: global.name.clone(),
                })
            }
            _ => self.module_export(&global.module, &global.name),
        }
    }
}
