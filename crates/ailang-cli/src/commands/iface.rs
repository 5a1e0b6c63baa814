//! `ailang iface`: print a module's normalized interface

use super::emit_diagnostics;
use ailang_runtime::{Ailang, RuntimeOptions};
use std::path::Path;

/// Print the root module's interface JSON; returns false on error
pub fn iface(file: &Path, compact: bool) -> bool {
    let runtime = Ailang::new(RuntimeOptions::default());
    match runtime.check_file(file) {
        Ok(program) => {
            let json = program.root_iface().to_normalized_json();
            let rendered = if compact {
                serde_json::to_string(&json)
            } else {
                serde_json::to_string_pretty(&json)
            };
            match rendered {
                Ok(text) => {
                    println!("{}", text);
                    true
                }
                Err(e) => {
                    eprintln!("failed to serialize interface: {}", e);
                    false
                }
            }
        }
        Err(mut diagnostics) => {
            emit_diagnostics(&mut diagnostics, file, false, false);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iface_prints_for_valid_module() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("m.ail");
        std::fs::write(
            &path,
            "module m\nexport func double(x: int) -> int { x * 2 }\n",
        )
        .unwrap();
        assert!(iface(&path, true));
    }

    #[test]
    fn test_iface_fails_on_broken_module() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("m.ail");
        std::fs::write(&path, "module m\nfunc broken( -> int { 1 }\n").unwrap();
        assert!(!iface(&path, true));
    }
}
