use std::path::PathBuf;

use thiserror::Error;

/// Hard failures of the compiler itself.
///
/// Problems in the user's program are never reported through this type;
/// they are collected as [`crate::diagnostic::Diagnostic`]s instead.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to read source {path}: {source}")]
    SourceIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unsupported source file extension: {0} (expected .alm)")]
    UnsupportedExtension(PathBuf),
    #[error("library directory was not found at {0}")]
    MissingLibrary(PathBuf),
    #[error("internal compiler error: {0}")]
    Internal(String),
    #[error("refusing to emit: compilation produced {0} diagnostic(s)")]
    HasDiagnostics(usize),
    #[error("emitter failed: {0}")]
    Emit(String),
}
