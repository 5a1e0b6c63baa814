//! Diagnostic system for errors and warnings
//!
//! All errors and warnings flow through the unified Diagnostic type,
//! ensuring consistent formatting across every pipeline phase. Structured
//! (`--json`) reports serialize with deterministic field ordering: the
//! `data` payload is a BTreeMap so keys always come out sorted.

use crate::span::{line_col, Span};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Schema tag carried by every structured report
pub const REPORT_SCHEMA: &str = "ailang-report/1";

/// Severity level of a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    /// Fatal error that aborts the pipeline at the phase boundary
    Error,
    /// Warning that does not block evaluation
    Warning,
}

impl fmt::Display for DiagnosticLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticLevel::Error => write!(f, "error"),
            DiagnosticLevel::Warning => write!(f, "warning"),
        }
    }
}

/// Pipeline phase that produced a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Lexing and parsing
    Parse,
    /// Module loading and dependency resolution
    Load,
    /// Surface-to-Core elaboration
    Elaborate,
    /// Type and effect checking
    Typecheck,
    /// Cross-module linking
    Link,
    /// Core evaluation
    Runtime,
    /// Effect operation dispatch
    Effect,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Parse => "parse",
            Phase::Load => "load",
            Phase::Elaborate => "elaborate",
            Phase::Typecheck => "typecheck",
            Phase::Link => "link",
            Phase::Runtime => "runtime",
            Phase::Effect => "effect",
        };
        write!(f, "{}", name)
    }
}

/// A machine-applicable suggestion attached to a diagnostic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    /// Suggested replacement or action
    pub suggestion: String,
    /// Confidence in the suggestion, 0.0–1.0
    pub confidence: f64,
}

/// A diagnostic message (error or warning)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Report schema tag
    pub schema: String,
    /// Severity level
    pub level: DiagnosticLevel,
    /// Stable code (e.g., "LDR002", "TC_ROW_001")
    pub code: String,
    /// Phase that produced the diagnostic
    pub phase: Phase,
    /// Main diagnostic message
    pub message: String,
    /// File path, when known
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub file: Option<String>,
    /// Source span, when known
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub span: Option<Span>,
    /// Structured payload; keys are canonical and serialize sorted
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub data: BTreeMap<String, serde_json::Value>,
    /// Additional notes
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub notes: Vec<String>,
    /// Suggested fix
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub fix: Option<Fix>,
}

impl Diagnostic {
    /// Create a new error diagnostic
    pub fn error(code: impl Into<String>, phase: Phase, message: impl Into<String>) -> Self {
        Self {
            schema: REPORT_SCHEMA.to_string(),
            level: DiagnosticLevel::Error,
            code: code.into(),
            phase,
            message: message.into(),
            file: None,
            span: None,
            data: BTreeMap::new(),
            notes: Vec::new(),
            fix: None,
        }
    }

    /// Create a new warning diagnostic
    pub fn warning(code: impl Into<String>, phase: Phase, message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Warning,
            ..Self::error(code, phase, message)
        }
    }

    /// Set the source span
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Set the file path
    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    /// Attach a structured data entry
    pub fn with_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Add a note
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Attach a suggested fix
    pub fn with_fix(mut self, suggestion: impl Into<String>, confidence: f64) -> Self {
        self.fix = Some(Fix {
            suggestion: suggestion.into(),
            confidence,
        });
        self
    }

    /// Format as human-readable text, resolving spans against `source` when given
    pub fn to_human_string(&self, source: Option<&str>) -> String {
        let mut out = String::new();

        out.push_str(&format!("{}[{}]: {}\n", self.level, self.code, self.message));

        match (&self.file, self.span, source) {
            (Some(file), Some(span), Some(src)) => {
                let (line, col) = line_col(src, span.start);
                out.push_str(&format!("  --> {}:{}:{}\n", file, line, col));
                if let Some(snippet) = src.lines().nth(line - 1) {
                    out.push_str("   |\n");
                    out.push_str(&format!("{:>2} | {}\n", line, snippet));
                    let carets = "^".repeat(span.len().max(1).min(snippet.len().max(1)));
                    out.push_str(&format!("   | {}{}\n", " ".repeat(col - 1), carets));
                }
            }
            (Some(file), Some(span), None) => {
                out.push_str(&format!("  --> {}:@{}..{}\n", file, span.start, span.end));
            }
            (Some(file), None, _) => {
                out.push_str(&format!("  --> {}\n", file));
            }
            _ => {}
        }

        for (key, value) in &self.data {
            out.push_str(&format!("   = {}: {}\n", key, value));
        }
        for note in &self.notes {
            out.push_str(&format!("   = note: {}\n", note));
        }
        if let Some(fix) = &self.fix {
            out.push_str(&format!("   = help: {}\n", fix.suggestion));
        }

        out
    }

    /// Format as pretty JSON
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Format as compact JSON
    pub fn to_json_compact(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Whether this diagnostic is an error
    pub fn is_error(&self) -> bool {
        self.level == DiagnosticLevel::Error
    }
}

/// Sort diagnostics by level (errors first), then by file and span
pub fn sort_diagnostics(diagnostics: &mut [Diagnostic]) {
    diagnostics.sort_by(|a, b| {
        match (a.level, b.level) {
            (DiagnosticLevel::Error, DiagnosticLevel::Warning) => std::cmp::Ordering::Less,
            (DiagnosticLevel::Warning, DiagnosticLevel::Error) => std::cmp::Ordering::Greater,
            _ => {
                let a_start = a.span.map(|s| s.start).unwrap_or(0);
                let b_start = b.span.map(|s| s.start).unwrap_or(0);
                a.file.cmp(&b.file).then(a_start.cmp(&b_start))
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_data_keys_serialize_sorted() {
        let diag = Diagnostic::error("IMP010", Phase::Link, "symbol not exported")
            .with_data("symbol", serde_json::json!("foo"))
            .with_data("module_id", serde_json::json!("std/io"))
            .with_data("available_exports", serde_json::json!(["print", "println"]));
        let json = diag.to_json_compact().unwrap();
        let available = json.find("available_exports").unwrap();
        let module = json.find("module_id").unwrap();
        let symbol = json.find("symbol").unwrap();
        assert!(available < module && module < symbol);
    }

    #[test]
    fn test_round_trips_through_json() {
        let diag = Diagnostic::warning("ELA_W01", Phase::Elaborate, "non-exhaustive match")
            .with_span(Span::new(4, 9))
            .with_file("m.ail")
            .with_fix("add a `false` arm", 0.9);
        let json = diag.to_json_string().unwrap();
        let back: Diagnostic = serde_json::from_str(&json).unwrap();
        assert_eq!(diag, back);
    }

    #[test]
    fn test_sort_errors_before_warnings() {
        let mut diags = vec![
            Diagnostic::warning("ELA_W01", Phase::Elaborate, "w").with_span(Span::new(0, 1)),
            Diagnostic::error("TC_TYP_001", Phase::Typecheck, "e").with_span(Span::new(9, 10)),
        ];
        sort_diagnostics(&mut diags);
        assert!(diags[0].is_error());
    }

    #[test]
    fn test_human_rendering_includes_caret() {
        let src = "let x = nope;";
        let diag = Diagnostic::error("TC_TYP_001", Phase::Typecheck, "unknown variable")
            .with_file("m.ail")
            .with_span(Span::new(8, 12));
        let text = diag.to_human_string(Some(src));
        assert!(text.contains("m.ail:1:9"));
        assert!(text.contains("^^^^"));
    }
}
