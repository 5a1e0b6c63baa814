//! Cross-module linking
//!
//! Builds per-module global environments from imports, registers the
//! synthetic `$builtin` and `$adt` modules, and resolves `GlobalRef`s to
//! runtime values with memoization.

pub mod adt;
pub mod builtins;
pub mod resolver;

use crate::ast::ImportDecl;
use crate::core::GlobalRef;
use crate::diagnostic::{Diagnostic, Phase};
use crate::iface::{Iface, IfaceCtor};
use crate::types::Scheme;
use std::collections::{BTreeMap, HashMap, HashSet};

/// An imported value binding
#[derive(Debug, Clone)]
pub struct ImportedValue {
    /// Where the binding lives
    pub global_ref: GlobalRef,
    /// Exported scheme, effect rows intact
    pub scheme: Scheme,
    /// True iff the binding carries no effects
    pub purity: bool,
}

/// An imported constructor
#[derive(Debug, Clone)]
pub struct ImportedCtor {
    /// Owning module path
    pub module: String,
    /// Constructor descriptor
    pub ctor: IfaceCtor,
}

/// Everything a module's imports bring into scope
#[derive(Debug, Clone, Default)]
pub struct GlobalEnv {
    /// Imported values by name
    pub values: HashMap<String, ImportedValue>,
    /// Imported constructors by name
    pub ctors: HashMap<String, ImportedCtor>,
    /// Imported type names
    pub types: HashSet<String>,
}

/// Validate selective imports against dependency interfaces and build the
/// resulting environment. Namespace imports are rejected (`IMP012`);
/// unknown symbols are `IMP010`; a symbol provided by two imports is
/// `IMP011`.
pub fn build_global_env(
    imports: &[ImportDecl],
    ifaces: &HashMap<String, Iface>,
) -> Result<GlobalEnv, Vec<Diagnostic>> {
    let mut env = GlobalEnv::default();
    let mut errors = Vec::new();
    // symbol -> providing modules, for conflict reporting
    let mut providers: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for import in imports {
        if import.namespace {
            errors.push(
                Diagnostic::error(
                    "IMP012",
                    Phase::Link,
                    format!(
                        "namespace import of `{}` is not supported; list the symbols you need",
                        import.module
                    ),
                )
                .with_span(import.span)
                .with_fix(format!("import {} (symbol1, symbol2)", import.module), 0.8),
            );
            continue;
        }

        let Some(iface) = ifaces.get(&import.module) else {
            // The loader already orders dependencies; a missing interface
            // here means the module failed earlier in the pipeline.
            errors.push(
                Diagnostic::error(
                    "EVA002",
                    Phase::Link,
                    format!("module `{}` was not compiled", import.module),
                )
                .with_span(import.span),
            );
            continue;
        };

        for symbol in &import.symbols {
            let name = symbol.name.as_str();
            let mut found = false;

            if let Some(export) = iface.exports.get(name) {
                providers.entry(name.to_string()).or_default().push(import.module.clone());
                env.values.insert(
                    name.to_string(),
                    ImportedValue {
                        global_ref: export.global_ref.clone().into(),
                        scheme: export.scheme.clone(),
                        purity: export.purity,
                    },
                );
                found = true;
            }
            if let Some(ctor) = iface.constructors.get(name) {
                if !found {
                    providers.entry(name.to_string()).or_default().push(import.module.clone());
                }
                env.ctors.insert(
                    name.to_string(),
                    ImportedCtor {
                        module: import.module.clone(),
                        ctor: ctor.clone(),
                    },
                );
                found = true;
            }
            if !found && iface.exports_type(name) {
                providers.entry(name.to_string()).or_default().push(import.module.clone());
                env.types.insert(name.to_string());
                found = true;
            }

            if !found {
                let mut available: Vec<String> = iface.exports.keys().cloned().collect();
                available.extend(iface.constructors.keys().cloned());
                let mut type_names: Vec<String> = iface
                    .constructors
                    .values()
                    .map(|c| c.type_name.clone())
                    .collect();
                type_names.sort();
                type_names.dedup();
                available.extend(type_names);
                available.sort();
                available.dedup();
                errors.push(
                    Diagnostic::error(
                        "IMP010",
                        Phase::Link,
                        format!(
                            "module `{}` does not export `{}`",
                            import.module, name
                        ),
                    )
                    .with_span(symbol.span)
                    .with_data("available_exports", serde_json::json!(available))
                    .with_data("module_id", serde_json::json!(import.module))
                    .with_data(
                        "search_trace",
                        serde_json::json!(["exports", "constructors", "types"]),
                    )
                    .with_data("symbol", serde_json::json!(name)),
                );
            }
        }
    }

    for (symbol, mut modules) in providers {
        modules.sort();
        modules.dedup();
        if modules.len() > 1 {
            let rows: Vec<serde_json::Value> = modules
                .iter()
                .map(|m| serde_json::json!({"export": symbol, "module_id": m}))
                .collect();
            errors.push(
                Diagnostic::error(
                    "IMP011",
                    Phase::Link,
                    format!(
                        "symbol `{}` is provided by multiple modules: {}",
                        symbol,
                        modules.join(", ")
                    ),
                )
                .with_data("conflicts", serde_json::Value::Array(rows)),
            );
        }
    }

    if errors.is_empty() {
        Ok(env)
    } else {
        Err(errors)
    }
}
