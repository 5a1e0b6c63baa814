//! CLI subcommands

pub mod check;
pub mod iface;
pub mod run;

use ailang_runtime::{sort_diagnostics, Diagnostic};
use std::fs;
use std::path::Path;

/// Emit diagnostics: JSON reports go to stdout, human text to stderr.
/// Returns true if none of them was an error.
pub fn emit_diagnostics(
    diagnostics: &mut [Diagnostic],
    entry: &Path,
    json: bool,
    compact: bool,
) -> bool {
    sort_diagnostics(diagnostics);
    let entry_source = fs::read_to_string(entry).ok();
    let entry_name = entry.display().to_string();

    for diag in diagnostics.iter() {
        if json {
            let rendered = if compact {
                diag.to_json_compact()
            } else {
                diag.to_json_string()
            };
            match rendered {
                Ok(text) => println!("{}", text),
                Err(e) => eprintln!("failed to serialize diagnostic: {}", e),
            }
        } else {
            let source = match (&diag.file, &entry_source) {
                (Some(file), Some(source)) if *file == entry_name => Some(source.as_str()),
                _ => None,
            };
            eprint!("{}", diag.to_human_string(source));
        }
    }
    !diagnostics.iter().any(|d| d.is_error())
}
