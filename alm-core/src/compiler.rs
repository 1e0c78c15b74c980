use std::path::{Path, PathBuf};

use crate::ast::Module;
use crate::context::{CompilationContext, CompileOptions};
use crate::diagnostic::Diagnostics;
use crate::error::CoreError;
use crate::label_check::check_labels;
use crate::library::has_source_extension;
use crate::parser::parse_module;
use crate::span::{FileId, SourceMap, Span};
use crate::symbols::{FunctionSymbol, Scope};
use crate::typecheck::check_types;

/// Result of running the front end over one compilation unit.
///
/// `module` is the annotated tree when every phase ran cleanly, and the
/// tree as far as it got otherwise. Only a compilation without diagnostics
/// can be handed to an [`Emitter`].
#[derive(Debug)]
pub struct Compilation {
    pub module: Module,
    pub globals: Option<Scope>,
    pub entry: Option<FunctionSymbol>,
    pub diagnostics: Diagnostics,
    pub sources: SourceMap,
}

/// Everything a back end receives.
#[derive(Debug, Clone, Copy)]
pub struct EmitUnit<'a> {
    pub module: &'a Module,
    pub globals: &'a Scope,
    pub entry: &'a FunctionSymbol,
}

/// A back end consuming a checked compilation unit.
pub trait Emitter {
    type Output;

    fn emit(&mut self, unit: EmitUnit<'_>) -> Result<Self::Output, CoreError>;
}

impl Compilation {
    pub fn is_ok(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// `path:line:col: kind: message`, syntax errors first.
    pub fn rendered_diagnostics(&self) -> Vec<String> {
        self.diagnostics
            .iter()
            .map(|diag| diag.render(&self.sources))
            .collect()
    }

    pub fn emit<E: Emitter>(&self, emitter: &mut E) -> Result<E::Output, CoreError> {
        if !self.diagnostics.is_empty() {
            return Err(CoreError::HasDiagnostics(self.diagnostics.len()));
        }
        let (Some(globals), Some(entry)) = (&self.globals, &self.entry) else {
            return Err(CoreError::Internal(
                "clean compilation without globals or entry point".into(),
            ));
        };
        emitter.emit(EmitUnit {
            module: &self.module,
            globals,
            entry,
        })
    }
}

/// Compile the `.alm` file at `path` and everything it imports.
pub fn compile_file(path: impl AsRef<Path>, options: &CompileOptions) -> Result<Compilation, CoreError> {
    let path = path.as_ref();
    if !options.lib_dir.is_dir() {
        return Err(CoreError::MissingLibrary(options.lib_dir.clone()));
    }
    if !has_source_extension(path) {
        return Err(CoreError::UnsupportedExtension(path.to_path_buf()));
    }
    let path = path.canonicalize().map_err(|source| CoreError::SourceIo {
        path: path.to_path_buf(),
        source,
    })?;

    let mut ctx = CompilationContext::new(options.clone());
    let file = ctx.load_source(&path)?;
    tracing::info!(path = %path.display(), "compiling");
    compile_unit(ctx, file, &path)
}

/// Compile in-memory source text as if it were the file at `path`.
///
/// Relative imports are resolved against `path`'s directory. The library
/// directory is only consulted when a library import needs it. A `path`
/// that exists on disk is canonicalised so a later import of the same file
/// is recognised as this module.
pub fn compile_source(
    path: impl Into<PathBuf>,
    source: &str,
    options: &CompileOptions,
) -> Result<Compilation, CoreError> {
    let path = path.into();
    let path = path.canonicalize().unwrap_or(path);
    let mut ctx = CompilationContext::new(options.clone());
    let file = ctx.add_source(path.clone(), source);
    compile_unit(ctx, file, &path)
}

fn compile_unit(mut ctx: CompilationContext, file: FileId, path: &Path) -> Result<Compilation, CoreError> {
    ctx.imports.enter(path);
    let module = parse_module(&mut ctx, file);
    ctx.imports.exit();
    tracing::debug!(
        modules = module.modules().len(),
        imports = ctx.imports.edge_count(),
        "parsing finished"
    );

    let module = if ctx.diagnostics.has_syntax_errors() {
        tracing::info!(
            errors = ctx.diagnostics.syntax().len(),
            "syntax errors, skipping semantic analysis"
        );
        module
    } else {
        check_labels(&module, &mut ctx);
        if ctx.diagnostics.has_semantic_errors() {
            tracing::info!(
                errors = ctx.diagnostics.semantic().len(),
                "label errors, skipping type checking"
            );
            module
        } else {
            check_types(module, &mut ctx)?
        }
    };

    let entry = match &ctx.globals {
        Some(globals) => {
            let entry = globals.entry_point().cloned();
            if entry.is_none() {
                ctx.diagnostics.semantic_error(
                    "entry point 'main(): integer' without arguments is not declared",
                    Span::point(module.span.file, module.span.start),
                );
            }
            entry
        }
        None => None,
    };

    Ok(Compilation {
        module,
        globals: ctx.globals,
        entry,
        diagnostics: ctx.diagnostics,
        sources: ctx.sources,
    })
}
