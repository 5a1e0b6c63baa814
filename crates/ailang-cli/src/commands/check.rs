//! `ailang check`: type-check without running

use super::emit_diagnostics;
use ailang_runtime::{Ailang, RuntimeOptions};
use std::path::Path;

/// Check a program; returns false on any fatal error
pub fn check(file: &Path, json: bool, compact: bool) -> bool {
    let runtime = Ailang::new(RuntimeOptions::default());
    match runtime.check_file(file) {
        Ok(mut program) => {
            emit_diagnostics(&mut program.warnings, file, json, compact);
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
    fn test_check_reports_type_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("m.ail");
        std::fs::write(
            &path,
            "module m\nfunc f() -> int { \"not an int\" }\n",
        )
        .unwrap();
        assert!(!check(&path, false, false));
    }

    #[test]
    fn test_check_passes_clean_module() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("m.ail");
        std::fs::write(&path, "module m\nfunc f(x: int) -> int { x * 2 }\n").unwrap();
        assert!(check(&path, false, false));
    }
}
