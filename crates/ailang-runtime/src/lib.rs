//! AILANG Runtime - Core language implementation
//!
//! This library provides the complete AILANG pipeline:
//! - Lexical analysis and parsing
//! - Module loading with topological dependency resolution
//! - Surface-to-Core elaboration (ANF, SCC grouping, exhaustiveness)
//! - Hindley–Milner type checking with effect rows and type classes
//! - Cross-module linking with synthetic `$builtin` and `$adt` modules
//! - Capability-scoped Core evaluation

/// AILANG runtime version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Public API modules
pub mod ast;
pub mod core;
pub mod diagnostic;
pub mod effects;
pub mod elaborate;
pub mod eval;
pub mod iface;
pub mod lexer;
pub mod link;
pub mod loader;
pub mod parser;
pub mod runtime;
pub mod span;
pub mod stdlib;
pub mod token;
pub mod typecheck;
pub mod types;
pub mod value;

// Re-export commonly used types
pub use diagnostic::{sort_diagnostics, Diagnostic, DiagnosticLevel, Phase, REPORT_SCHEMA};
pub use iface::Iface;
pub use lexer::Lexer;
pub use loader::ModuleLoader;
pub use parser::Parser;
pub use runtime::{Ailang, CheckedProgram, RunResult, RuntimeOptions};
pub use span::Span;
pub use token::{Token, TokenKind};
pub use types::{EffectRow, Scheme, Type};
pub use value::{RuntimeError, Value};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smoke() {
        assert_eq!(VERSION, "0.4.0");
    }
}
