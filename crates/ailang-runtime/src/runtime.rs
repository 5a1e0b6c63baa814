//! The end-to-end pipeline facade
//!
//! `Ailang` drives source text through load, elaborate, typecheck, link,
//! and evaluate. Phases are fail-fast: the first phase with errors
//! aborts the pipeline; warnings accumulate across phases. A host (CLI,
//! REPL, tests) configures capabilities and clock mode once and reuses
//! the runtime.

use crate::core::verify::verify_program;
use crate::diagnostic::{Diagnostic, Phase};
use crate::effects::EffectContext;
use crate::elaborate::elaborate_module;
use crate::eval::Evaluator;
use crate::iface::Iface;
use crate::link::resolver::{CompiledModule, Resolver};
use crate::link::{build_global_env, builtins};
use crate::loader::ModuleLoader;
use crate::typecheck::typecheck_module;
use crate::types::Type;
use crate::value::{RuntimeError, Value};
use ailang_config::NetworkPolicy;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

/// Runtime configuration for one `Ailang` instance
#[derive(Debug, Clone, Default)]
pub struct RuntimeOptions {
    /// Capabilities granted to evaluations (`IO`, `FS`, `Clock`, `Net`, `Env`)
    pub caps: Vec<String>,
    /// Use the deterministic virtual clock
    pub virtual_time: bool,
    /// Virtual clock start in milliseconds (`--seed`)
    pub seed: Option<i64>,
    /// Network policy for the Net effect
    pub net_policy: NetworkPolicy,
    /// Dump lowered Core to stderr before evaluation
    pub trace: bool,
}

/// A fully checked program: every module compiled, in topological order
#[derive(Debug)]
pub struct CheckedProgram {
    /// Root module path
    pub root: String,
    /// Compiled modules, dependencies first
    pub modules: Vec<CompiledModule>,
    /// Source text by module path, for diagnostic rendering
    pub sources: HashMap<String, String>,
    /// Accumulated warnings from every phase
    pub warnings: Vec<Diagnostic>,
}

impl CheckedProgram {
    /// The root module's interface
    pub fn root_iface(&self) -> &Iface {
        &self
            .modules
            .iter()
            .find(|m| m.path == self.root)
            .expect("root module compiled")
            .iface
    }
}

/// The result of running an entrypoint
#[derive(Debug)]
pub struct RunResult {
    /// The entrypoint's return value
    pub value: Value,
    /// Warnings from compilation
    pub warnings: Vec<Diagnostic>,
    /// Captured IO output (present only when capturing was requested)
    pub output: Option<String>,
}

/// The AILANG runtime facade
pub struct Ailang {
    options: RuntimeOptions,
    capture: Option<Rc<RefCell<String>>>,
}

impl Ailang {
    /// Create a runtime with the given options
    pub fn new(options: RuntimeOptions) -> Self {
        Self {
            options,
            capture: None,
        }
    }

    /// Capture IO output into a buffer instead of stdout (tests)
    pub fn with_captured_output(mut self) -> Self {
        self.capture = Some(Rc::new(RefCell::new(String::new())));
        self
    }

    /// Load, elaborate, and type-check a program from its entry file
    pub fn check_file(&self, entry: &Path) -> Result<CheckedProgram, Vec<Diagnostic>> {
        let (mut loader, root) = ModuleLoader::from_entry(entry)?;
        let loaded = loader.load(&root.path)?;

        let mut warnings = Vec::new();
        let mut ifaces: HashMap<String, Iface> = HashMap::new();
        ifaces.insert("$builtin".to_string(), builtins::builtin_iface());
        let mut modules = Vec::new();
        let mut sources = HashMap::new();

        for module in &loaded {
            sources.insert(module.path.clone(), module.source.clone());
            let file = module
                .file
                .as_ref()
                .map(|f| f.display().to_string())
                .unwrap_or_else(|| format!("<stdlib>/{}", module.path));

            let env = build_global_env(&module.ast.imports, &ifaces)
                .map_err(|errs| with_file(errs, &file))?;

            let elaborated = elaborate_module(module, &env, &ifaces)
                .map_err(|errs| with_file(errs, &file))?;

            // Elaboration must emit well-formed ANF
            if let Err(violations) = verify_program(&elaborated.core) {
                return Err(vec![Diagnostic::error(
                    "ELA_900",
                    Phase::Elaborate,
                    format!(
                        "internal: elaborated Core violates ANF at {} node(s)",
                        violations.len()
                    ),
                )
                .with_file(file)]);
            }

            let checked =
                typecheck_module(elaborated, &ifaces).map_err(|errs| with_file(errs, &file))?;

            warnings.extend(checked.warnings.iter().cloned().map(|w| {
                if w.file.is_none() {
                    w.with_file(file.clone())
                } else {
                    w
                }
            }));
            ifaces.insert(module.path.clone(), checked.iface.clone());
            modules.push(CompiledModule {
                path: module.path.clone(),
                iface: checked.iface,
                core: checked.core,
            });
        }

        Ok(CheckedProgram {
            root: root.path,
            modules,
            sources,
            warnings,
        })
    }

    /// Check and run an entrypoint
    pub fn run_file(
        &self,
        entry_file: &Path,
        entry: &str,
        args_json: Option<&str>,
    ) -> Result<RunResult, Vec<Diagnostic>> {
        let program = self.check_file(entry_file)?;
        let warnings = program.warnings.clone();

        if self.options.trace {
            for module in &program.modules {
                eprintln!("{}", crate::core::pretty::program(&module.core));
            }
        }

        let entry_scheme = program
            .root_iface()
            .exports
            .get(entry)
            .map(|e| e.scheme.clone())
            .ok_or_else(|| {
                vec![Diagnostic::error(
                    "EVA002",
                    Phase::Runtime,
                    format!(
                        "module `{}` does not export an entrypoint `{}`",
                        program.root, entry
                    ),
                )
                .with_data(
                    "available_exports",
                    serde_json::json!(program
                        .root_iface()
                        .exports
                        .keys()
                        .collect::<Vec<_>>()),
                )]
            })?;

        let ctx = self.build_context();
        let root = program.root.clone();
        let resolver = Resolver::new(program.modules, ctx);

        let result = resolver
            .instantiate_all()
            .and_then(|()| invoke_entry(&resolver, &root, entry, &entry_scheme.ty, args_json));
        let output = self.capture.as_ref().map(|buf| buf.borrow().clone());
        match result {
            Ok(value) => Ok(RunResult {
                value,
                warnings,
                output,
            }),
            Err(err) => {
                let mut diags = vec![runtime_diagnostic(&err)];
                diags.extend(warnings);
                Err(diags)
            }
        }
    }

    fn build_context(&self) -> EffectContext {
        let mut ctx = EffectContext::new(self.options.caps.clone())
            .with_net_policy(self.options.net_policy.clone());
        if self.options.virtual_time {
            ctx = ctx.with_virtual_time();
            if let Some(seed) = self.options.seed {
                // A seeded virtual clock starts at the seed millisecond
                if let crate::effects::ClockMode::Virtual(cell) = &ctx.clock {
                    cell.set(seed);
                }
            }
        }
        if let Some(buffer) = &self.capture {
            ctx = ctx.with_buffer(Rc::clone(buffer));
        }
        ctx
    }
}

fn with_file(diags: Vec<Diagnostic>, file: &str) -> Vec<Diagnostic> {
    diags
        .into_iter()
        .map(|d| {
            if d.file.is_none() {
                d.with_file(file.to_string())
            } else {
                d
            }
        })
        .collect()
}

/// Convert a runtime error into a structured diagnostic
pub fn runtime_diagnostic(err: &RuntimeError) -> Diagnostic {
    let phase = match err {
        RuntimeError::CapabilityMissing(_) | RuntimeError::Effect { .. } => Phase::Effect,
        _ => Phase::Runtime,
    };
    let mut diag = Diagnostic::error(err.code(), phase, err.to_string());
    if let RuntimeError::CapabilityMissing(cap) = err {
        diag = diag
            .with_data("capability", serde_json::json!(cap))
            .with_fix(format!("re-run with --caps {}", cap), 0.9);
    }
    if let RuntimeError::MultiArgUnsupported { .. } = err {
        diag = diag.with_fix(
            "wrap the parameters in a single record parameter and pass a JSON object",
            0.8,
        );
    }
    diag
}

/// Resolve and call the entrypoint: 0 or 1 parameters, JSON-decoded
/// against the parameter type
fn invoke_entry(
    resolver: &Resolver,
    root: &str,
    entry: &str,
    entry_ty: &Type,
    args_json: Option<&str>,
) -> Result<Value, RuntimeError> {
    use crate::core::GlobalRef;
    use crate::eval::ValueResolver;

    let callee = resolver.resolve(&GlobalRef {
        module: root.to_string(),
        name: entry.to_string(),
    })?;

    let Value::Closure(ref closure) = callee else {
        return Err(RuntimeError::TypeMismatch(format!(
            "entrypoint `{}` is not a function",
            entry
        )));
    };

    let Type::Func { params, .. } = entry_ty else {
        return Err(RuntimeError::TypeMismatch(format!(
            "entrypoint `{}` has a non-function type",
            entry
        )));
    };

    let evaluator = Evaluator::new(resolver, resolver.instances(), resolver.ctx(), root);
    match closure.params.len() {
        0 => evaluator.apply(callee, Vec::new()),
        1 => {
            let raw = args_json.unwrap_or("null");
            let json: serde_json::Value = serde_json::from_str(raw)
                .map_err(|e| RuntimeError::JsonArgs(format!("invalid --args-json: {}", e)))?;
            let arg = decode_json(&json, &params[0])?;
            evaluator.apply(callee, vec![arg])
        }
        arity => Err(RuntimeError::MultiArgUnsupported {
            name: entry.to_string(),
            arity,
        }),
    }
}

/// Decode a JSON argument against the declared parameter type
pub fn decode_json(json: &serde_json::Value, ty: &Type) -> Result<Value, RuntimeError> {
    let fail = |expected: &str| {
        Err(RuntimeError::JsonArgs(format!(
            "expected {} for parameter type `{}`, got `{}`",
            expected, ty, json
        )))
    };
    match ty {
        Type::Con(name) => match (name.as_str(), json) {
            ("int", serde_json::Value::Number(n)) => match n.as_i64() {
                Some(v) => Ok(Value::Int(v)),
                None => fail("an integer"),
            },
            ("float", serde_json::Value::Number(n)) => match n.as_f64() {
                Some(v) => Ok(Value::Float(v)),
                None => fail("a number"),
            },
            ("string", serde_json::Value::String(s)) => Ok(Value::string(s.clone())),
            ("bool", serde_json::Value::Bool(b)) => Ok(Value::Bool(*b)),
            ("()", serde_json::Value::Null) => Ok(Value::Unit),
            _ => fail("a matching JSON value"),
        },
        Type::List(elem) => match json {
            serde_json::Value::Array(items) => {
                let values: Result<Vec<Value>, RuntimeError> =
                    items.iter().map(|item| decode_json(item, elem)).collect();
                Ok(Value::list(values?))
            }
            _ => fail("an array"),
        },
        Type::Tuple(items) => match json {
            serde_json::Value::Array(values) if values.len() == items.len() => {
                let decoded: Result<Vec<Value>, RuntimeError> = values
                    .iter()
                    .zip(items.iter())
                    .map(|(v, t)| decode_json(v, t))
                    .collect();
                Ok(Value::Tuple(Rc::new(decoded?)))
            }
            _ => fail(&format!("an array of {} elements", items.len())),
        },
        Type::Record(row) => match json {
            serde_json::Value::Object(fields) => {
                let mut out = std::collections::BTreeMap::new();
                for (name, field_ty) in &row.fields {
                    let Some(value) = fields.get(name) else {
                        return Err(RuntimeError::JsonArgs(format!(
                            "missing field `{}` in --args-json object",
                            name
                        )));
                    };
                    out.insert(name.clone(), decode_json(value, field_ty)?);
                }
                Ok(Value::Record(Rc::new(out)))
            }
            _ => fail("an object"),
        },
        _ => Err(RuntimeError::JsonArgs(format!(
            "parameter type `{}` cannot be decoded from JSON",
            ty
        ))),
    }
}
