//! `ailang run`: execute a program's entrypoint

use super::emit_diagnostics;
use ailang_config::RuntimePolicy;
use ailang_runtime::{Ailang, RuntimeOptions, Value};
use anyhow::Context;
use std::path::Path;

/// Load `ailang.toml` from the entry file's directory, if present
fn load_policy(entry: &Path) -> anyhow::Result<Option<RuntimePolicy>> {
    let Some(dir) = entry.parent() else {
        return Ok(None);
    };
    let path = dir.join("ailang.toml");
    if !path.is_file() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let policy = RuntimePolicy::from_toml(&text)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(Some(policy))
}

/// Run an entrypoint; returns false on any fatal error
#[allow(clippy::too_many_arguments)]
pub fn run(
    file: &Path,
    entry: &str,
    args_json: Option<&str>,
    caps: Option<&str>,
    trace: bool,
    seed: Option<i64>,
    virtual_time: bool,
    json: bool,
    compact: bool,
) -> bool {
    let policy = match load_policy(file) {
        Ok(policy) => policy.unwrap_or_default(),
        Err(e) => {
            eprintln!("{:#}", e);
            return false;
        }
    };

    // --caps overrides the policy's capability grant
    let caps: Vec<String> = match caps {
        Some(csv) => csv
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect(),
        None => policy.capabilities.clone(),
    };

    let runtime = Ailang::new(RuntimeOptions {
        caps,
        virtual_time,
        seed,
        trace,
        net_policy: policy.network,
    });

    match runtime.run_file(file, entry, args_json) {
        Ok(mut result) => {
            emit_diagnostics(&mut result.warnings, file, json, compact);
            if !matches!(result.value, Value::Unit) {
                println!("{}", result.value);
            }
            true
        }
        Err(mut diagnostics) => {
            emit_diagnostics(&mut diagnostics, file, json, compact);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_missing_file_fails() {
        assert!(!run(
            Path::new("definitely-missing.ail"),
            "main",
            None,
            None,
            false,
            None,
            false,
            false,
            false,
        ));
    }

    #[test]
    fn test_run_pure_entry() {
        // A file named after its module path, in a fresh directory
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("m.ail");
        std::fs::write(&path, "module m\nexport func main() -> int { 41 + 1 }\n").unwrap();
        assert!(run(&path, "main", None, None, false, None, false, false, false));
    }

    #[test]
    fn test_run_without_caps_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("m.ail");
        std::fs::write(
            &path,
            "module m\nimport std/io (println)\nexport func main() -> () ! {IO} { println(\"x\") }\n",
        )
        .unwrap();
        assert!(!run(&path, "main", None, None, false, None, false, false, false));
        // With the capability granted it succeeds
        assert!(run(&path, "main", None, Some("IO"), false, None, false, false, false));
    }

    #[test]
    fn test_policy_file_grants_capabilities() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("m.ail");
        std::fs::write(
            &path,
            "module m\nimport std/io (println)\nexport func main() -> () ! {IO} { println(\"x\") }\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("ailang.toml"), "capabilities = [\"IO\"]\n").unwrap();
        assert!(run(&path, "main", None, None, false, None, false, false, false));
    }
}
