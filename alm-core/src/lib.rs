//! Core of the ALM compiler front end.
//!
//! The pipeline is:
//!
//!   source .alm
//!     -> lexer        (tokens)
//!     -> parser       (tree, imports spliced in)
//!     -> label_check  (scopes, initialization, returns)
//!     -> typecheck    (types + implicit widening casts)
//!     -> Emitter      (any back end, see `compiler::Emitter`)
//!
//! Every phase reads and writes one `CompilationContext`; user errors are
//! collected as diagnostics, and a phase only runs if the previous ones
//! reported nothing. Higher-level tools (the CLI) should depend on this
//! crate rather than reimplementing the pipeline.

// ---------------------------------------------------------------------
// Error handling and diagnostics
// ---------------------------------------------------------------------

pub mod span;
pub mod diagnostic;
pub mod error;

// ---------------------------------------------------------------------
// Front-end: lexing and parsing
// ---------------------------------------------------------------------

pub mod lexer;
pub mod parser;
pub mod ast;

// ---------------------------------------------------------------------
// Semantic layers: types, symbols, label checking, type checking
// ---------------------------------------------------------------------

pub mod types;
pub mod symbols;
pub mod label_check;
pub mod typecheck;

// ---------------------------------------------------------------------
// Builtins and library modules
// ---------------------------------------------------------------------

pub mod builtins;
pub mod library;

// ---------------------------------------------------------------------
// Compiler orchestration and emitters
// ---------------------------------------------------------------------

pub mod context;
pub mod compiler;
pub mod dump;

// ---------------------------------------------------------------------
// Public API re-exports
// ---------------------------------------------------------------------

pub use compiler::{Compilation, EmitUnit, Emitter, compile_file, compile_source};
pub use context::CompileOptions;
pub use diagnostic::{Diagnostic, ErrorKind};
pub use dump::TreeDump;
pub use error::CoreError;
