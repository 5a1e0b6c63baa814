//! Module loading and dependency resolution
//!
//! Accepts a root module, discovers and parses all transitive
//! dependencies, detects cycles, and returns modules in topological order
//! (dependencies first). Modules resolve against the source root first
//! and the embedded standard library second; the search trace of every
//! attempt is kept for `LDR001` diagnostics.

use crate::ast::Module;
use crate::diagnostic::{Diagnostic, Phase};
use crate::parser::parse_module;
use crate::span::Span;
use crate::stdlib;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

/// A parsed module with its metadata
#[derive(Debug, Clone)]
pub struct LoadedModule {
    /// Canonical module path
    pub path: String,
    /// Imported module paths, in source order, deduplicated
    pub imports: Vec<String>,
    /// Parsed surface AST
    pub ast: Module,
    /// Original source text, kept for diagnostics
    pub source: String,
    /// On-disk file the module came from, if any
    pub file: Option<PathBuf>,
}

/// Validate and normalize a module path: forward slashes, lowercase
/// segments matching `[a-z][a-z0-9_]*`
pub fn canonicalize_module_path(raw: &str) -> Result<String, String> {
    let normalized = raw.replace('\\', "/");
    if normalized.is_empty() {
        return Err("module path is empty".to_string());
    }
    for segment in normalized.split('/') {
        let mut chars = segment.chars();
        let valid = match chars.next() {
            Some(c) if c.is_ascii_lowercase() => {
                chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
            }
            _ => false,
        };
        if !valid {
            return Err(format!(
                "invalid path segment `{}`: segments must match [a-z][a-z0-9_]*",
                segment
            ));
        }
    }
    Ok(normalized)
}

/// Module loader with per-build memoization
#[derive(Debug)]
pub struct ModuleLoader {
    /// Source root directory for on-disk modules
    root: PathBuf,
    /// Cache of loaded modules by canonical path
    cache: HashMap<String, LoadedModule>,
}

impl ModuleLoader {
    /// Create a loader over the given source root
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            cache: HashMap::new(),
        }
    }

    /// Create a loader from an entry file, inferring the source root from
    /// the declared module path. `app/main.ail` declaring `module
    /// app/main` puts the root two levels up.
    pub fn from_entry(entry: &Path) -> Result<(Self, LoadedModule), Vec<Diagnostic>> {
        let source = fs::read_to_string(entry).map_err(|e| {
            vec![Diagnostic::error(
                "LDR001",
                Phase::Load,
                format!("failed to read `{}`: {}", entry.display(), e),
            )]
        })?;
        let module = parse_and_check(&source, entry.display().to_string())?;
        let declared = module.path.clone();

        // The file location must end with the declared path
        let expected_suffix: PathBuf = PathBuf::from(format!("{}.ail", declared));
        let root = match entry.ends_with(&expected_suffix) {
            true => {
                let mut root = entry.to_path_buf();
                for _ in expected_suffix.components() {
                    root.pop();
                }
                root
            }
            false => {
                return Err(vec![declaration_mismatch(
                    &declared,
                    entry,
                    module.path_span,
                    &source,
                )]);
            }
        };

        let loaded = LoadedModule {
            path: declared.clone(),
            imports: dedup_imports(&module),
            ast: module,
            source,
            file: Some(entry.to_path_buf()),
        };
        let mut loader = Self::new(root);
        loader.cache.insert(declared, loaded.clone());
        Ok((loader, loaded))
    }

    /// Load the root module and every transitive dependency, returning
    /// them dependencies-first. A cycle aborts with `LDR002` carrying the
    /// full cycle path.
    pub fn load(&mut self, root_module: &str) -> Result<Vec<LoadedModule>, Vec<Diagnostic>> {
        let mut order: Vec<String> = Vec::new();
        let mut visited: BTreeSet<String> = BTreeSet::new();
        let mut in_path: Vec<String> = Vec::new();
        self.visit(root_module, &mut order, &mut visited, &mut in_path)?;
        Ok(order
            .into_iter()
            .map(|path| {
                self.cache
                    .get(&path)
                    .expect("visited module is cached")
                    .clone()
            })
            .collect())
    }

    /// Depth-first traversal with an explicit in-path stack. Post-order
    /// emission yields the dependencies-first ordering.
    fn visit(
        &mut self,
        module: &str,
        order: &mut Vec<String>,
        visited: &mut BTreeSet<String>,
        in_path: &mut Vec<String>,
    ) -> Result<(), Vec<Diagnostic>> {
        if visited.contains(module) {
            return Ok(());
        }
        if let Some(pos) = in_path.iter().position(|m| m == module) {
            let mut cycle: Vec<String> = in_path[pos..].to_vec();
            cycle.push(module.to_string());
            let rendered = cycle.join(" -> ");
            return Err(vec![Diagnostic::error(
                "LDR002",
                Phase::Load,
                format!("circular module dependency: {}", rendered),
            )
            .with_data("cycle", serde_json::json!(cycle))
            .with_fix("break the cycle by moving shared definitions into a new module", 0.7)]);
        }

        let loaded = self.load_one(module)?;
        let imports = loaded.imports.clone();

        in_path.push(module.to_string());
        for import in &imports {
            self.visit(import, order, visited, in_path)?;
        }
        in_path.pop();

        visited.insert(module.to_string());
        order.push(module.to_string());
        Ok(())
    }

    /// Load and parse a single module, memoized
    fn load_one(&mut self, module: &str) -> Result<LoadedModule, Vec<Diagnostic>> {
        if let Some(cached) = self.cache.get(module) {
            return Ok(cached.clone());
        }

        let canonical = canonicalize_module_path(module).map_err(|reason| {
            vec![Diagnostic::error(
                "LDR001",
                Phase::Load,
                format!("invalid module path `{}`: {}", module, reason),
            )]
        })?;

        let mut search_trace = Vec::new();

        let disk_path = self.root.join(format!("{}.ail", canonical));
        search_trace.push(disk_path.display().to_string());
        let (source, file) = if disk_path.is_file() {
            let source = fs::read_to_string(&disk_path).map_err(|e| {
                vec![Diagnostic::error(
                    "LDR001",
                    Phase::Load,
                    format!("failed to read `{}`: {}", disk_path.display(), e),
                )]
            })?;
            (source, Some(disk_path))
        } else if let Some(embedded) = stdlib::source(&canonical) {
            (embedded.to_string(), None)
        } else {
            search_trace.push(format!("<embedded stdlib>/{}", canonical));
            return Err(vec![self.not_found(&canonical, search_trace)]);
        };

        let file_label = file
            .as_ref()
            .map(|f| f.display().to_string())
            .unwrap_or_else(|| format!("<stdlib>/{}", canonical));
        let ast = parse_and_check(&source, file_label)?;

        if ast.path != canonical {
            return Err(vec![declaration_mismatch(
                &ast.path,
                file.as_deref()
                    .unwrap_or_else(|| Path::new(&canonical)),
                ast.path_span,
                &source,
            )]);
        }

        let loaded = LoadedModule {
            path: canonical.clone(),
            imports: dedup_imports(&ast),
            ast,
            source,
            file,
        };
        self.cache.insert(canonical, loaded.clone());
        Ok(loaded)
    }

    fn not_found(&self, module: &str, search_trace: Vec<String>) -> Diagnostic {
        let mut available: Vec<String> = self.discover_modules();
        available.extend(stdlib::module_names().iter().map(|s| s.to_string()));
        available.sort();
        available.dedup();
        Diagnostic::error(
            "LDR001",
            Phase::Load,
            format!("module `{}` not found", module),
        )
        .with_data("available_modules", serde_json::json!(available))
        .with_data("module_id", serde_json::json!(module))
        .with_data("search_trace", serde_json::json!(search_trace))
    }

    /// Enumerate on-disk `.ail` modules under the source root
    fn discover_modules(&self) -> Vec<String> {
        let mut modules = Vec::new();
        let mut stack = vec![self.root.clone()];
        while let Some(dir) = stack.pop() {
            let Ok(entries) = fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                } else if path.extension().is_some_and(|ext| ext == "ail") {
                    if let Ok(rel) = path.strip_prefix(&self.root) {
                        let module = rel
                            .with_extension("")
                            .components()
                            .map(|c| c.as_os_str().to_string_lossy().into_owned())
                            .collect::<Vec<_>>()
                            .join("/");
                        modules.push(module);
                    }
                }
            }
        }
        modules
    }

    /// The loader's source text for a module, if loaded
    pub fn source(&self, module: &str) -> Option<&str> {
        self.cache.get(module).map(|m| m.source.as_str())
    }
}

fn parse_and_check(source: &str, file: String) -> Result<Module, Vec<Diagnostic>> {
    let (module, diags) = parse_module(source);
    let errors: Vec<Diagnostic> = diags
        .into_iter()
        .map(|d| d.with_file(file.clone()))
        .collect();
    if errors.iter().any(|d| d.is_error()) {
        return Err(errors);
    }
    Ok(module)
}

fn dedup_imports(module: &Module) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut imports = Vec::new();
    for import in &module.imports {
        if seen.insert(import.module.clone()) {
            imports.push(import.module.clone());
        }
    }
    imports
}

fn declaration_mismatch(declared: &str, file: &Path, span: Span, _source: &str) -> Diagnostic {
    Diagnostic::error(
        "LDR003",
        Phase::Load,
        format!(
            "module declares `{}` but lives at `{}`",
            declared,
            file.display()
        ),
    )
    .with_span(span)
    .with_file(file.display().to_string())
    .with_fix(
        format!("rename the file to `{}.ail` or update the module declaration", declared),
        0.8,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_module(root: &Path, path: &str, source: &str) {
        let file = root.join(format!("{}.ail", path));
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(file, source).unwrap();
    }

    #[test]
    fn test_canonicalize_accepts_valid_paths() {
        assert_eq!(canonicalize_module_path("app/main").unwrap(), "app/main");
        assert_eq!(canonicalize_module_path("a1/b_2").unwrap(), "a1/b_2");
    }

    #[test]
    fn test_canonicalize_rejects_bad_segments() {
        assert!(canonicalize_module_path("App/main").is_err());
        assert!(canonicalize_module_path("a//b").is_err());
        assert!(canonicalize_module_path("1a").is_err());
    }

    #[test]
    fn test_load_orders_dependencies_first() {
        let dir = TempDir::new().unwrap();
        write_module(
            dir.path(),
            "app/main",
            "module app/main\nimport app/util (helper)\nfunc f() -> int { helper(1) }\n",
        );
        write_module(
            dir.path(),
            "app/util",
            "module app/util\nexport func helper(x: int) -> int { x }\n",
        );
        let mut loader = ModuleLoader::new(dir.path().to_path_buf());
        let modules = loader.load("app/main").unwrap();
        let order: Vec<&str> = modules.iter().map(|m| m.path.as_str()).collect();
        assert_eq!(order, vec!["app/util", "app/main"]);
    }

    #[test]
    fn test_every_import_precedes_importer() {
        let dir = TempDir::new().unwrap();
        write_module(
            dir.path(),
            "a",
            "module a\nimport b (f)\nimport c (g)\nfunc h() -> int { f(g(1)) }\n",
        );
        write_module(dir.path(), "b", "module b\nimport c (g)\nexport func f(x: int) -> int { g(x) }\n");
        write_module(dir.path(), "c", "module c\nexport func g(x: int) -> int { x }\n");
        let mut loader = ModuleLoader::new(dir.path().to_path_buf());
        let modules = loader.load("a").unwrap();
        let index =
            |p: &str| modules.iter().position(|m| m.path == p).expect("module loaded");
        for module in &modules {
            for import in &module.imports {
                assert!(index(import) < index(&module.path));
            }
        }
    }

    #[test]
    fn test_cycle_reports_full_path() {
        let dir = TempDir::new().unwrap();
        write_module(dir.path(), "a", "module a\nimport b (f)\nexport func g() -> int { f() }\n");
        write_module(dir.path(), "b", "module b\nimport a (g)\nexport func f() -> int { g() }\n");
        let mut loader = ModuleLoader::new(dir.path().to_path_buf());
        let errs = loader.load("a").unwrap_err();
        assert_eq!(errs[0].code, "LDR002");
        assert_eq!(
            errs[0].data["cycle"],
            serde_json::json!(["a", "b", "a"])
        );
    }

    #[test]
    fn test_missing_module_reports_search_trace() {
        let dir = TempDir::new().unwrap();
        write_module(dir.path(), "a", "module a\nimport nope (f)\nfunc g() -> int { 1 }\n");
        let mut loader = ModuleLoader::new(dir.path().to_path_buf());
        let errs = loader.load("a").unwrap_err();
        assert_eq!(errs[0].code, "LDR001");
        assert!(errs[0].data.contains_key("search_trace"));
        let available = errs[0].data["available_modules"].as_array().unwrap();
        assert!(available.iter().any(|m| m == "a"));
    }

    #[test]
    fn test_stdlib_resolves_embedded() {
        let dir = TempDir::new().unwrap();
        write_module(
            dir.path(),
            "m",
            "module m\nimport std/io (println)\nexport func main() -> () ! {IO} { println(\"hi\") }\n",
        );
        let mut loader = ModuleLoader::new(dir.path().to_path_buf());
        let modules = loader.load("m").unwrap();
        assert_eq!(modules[0].path, "std/io");
        assert_eq!(modules[1].path, "m");
    }

    #[test]
    fn test_from_entry_infers_root() {
        let dir = TempDir::new().unwrap();
        write_module(dir.path(), "app/main", "module app/main\nfunc f() -> int { 1 }\n");
        let entry = dir.path().join("app/main.ail");
        let (_, loaded) = ModuleLoader::from_entry(&entry).unwrap();
        assert_eq!(loaded.path, "app/main");
    }

    #[test]
    fn test_from_entry_rejects_mismatched_declaration() {
        let dir = TempDir::new().unwrap();
        write_module(dir.path(), "app/other", "module app/main\nfunc f() -> int { 1 }\n");
        let entry = dir.path().join("app/other.ail");
        let errs = ModuleLoader::from_entry(&entry).unwrap_err();
        assert_eq!(errs[0].code, "LDR003");
    }

    #[test]
    fn test_diamond_loads_once() {
        let dir = TempDir::new().unwrap();
        write_module(dir.path(), "top", "module top\nimport l (f)\nimport r (g)\nfunc h() -> int { f(g(1)) }\n");
        write_module(dir.path(), "l", "module l\nimport base (id)\nexport func f(x: int) -> int { id(x) }\n");
        write_module(dir.path(), "r", "module r\nimport base (id)\nexport func g(x: int) -> int { id(x) }\n");
        write_module(dir.path(), "base", "module base\nexport func id(x: int) -> int { x }\n");
        let mut loader = ModuleLoader::new(dir.path().to_path_buf());
        let modules = loader.load("top").unwrap();
        let bases = modules.iter().filter(|m| m.path == "base").count();
        assert_eq!(bases, 1);
        assert_eq!(modules.last().unwrap().path, "top");
    }
}
