//! Per-compilation state threaded through every phase.
//!
//! One [`CompilationContext`] is created for each top-level compilation and
//! passed by reference into the parser (including nested import parses),
//! the label checker and the type checker. Nothing is process-wide, so two
//! compilations never observe each other.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::diagnostic::Diagnostics;
use crate::error::CoreError;
use crate::library::{default_lib_dir, has_source_extension};
use crate::span::{FileId, SourceMap};
use crate::symbols::Scope;

/// User-tunable compilation settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    /// Directory searched for `import name;` modules.
    pub lib_dir: PathBuf,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            lib_dir: default_lib_dir(),
        }
    }
}

impl CompileOptions {
    pub fn with_lib_dir(lib_dir: impl Into<PathBuf>) -> Self {
        CompileOptions {
            lib_dir: lib_dir.into(),
        }
    }
}

/// Outcome of checking a prospective import edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportCheck {
    /// Never seen; parse it.
    Fresh,
    /// Already parsed through another path; its declarations are in scope.
    AlreadyLoaded,
    SelfImport,
    /// The same file imports this module a second time.
    Duplicate,
    /// Importing would close a cycle.
    Cycle,
}

/// Every import edge of the compilation, keyed by `(importer, imported)`.
#[derive(Debug, Default)]
pub struct ImportGraph {
    edges: HashSet<(PathBuf, PathBuf)>,
    loaded: HashSet<PathBuf>,
    stack: Vec<PathBuf>,
}

impl ImportGraph {
    pub fn check(&self, from: &Path, to: &Path) -> ImportCheck {
        if from == to {
            return ImportCheck::SelfImport;
        }
        if self.edges.contains(&(from.to_path_buf(), to.to_path_buf())) {
            return ImportCheck::Duplicate;
        }
        if self.edges.contains(&(to.to_path_buf(), from.to_path_buf()))
            || self.stack.iter().any(|active| active == to)
        {
            return ImportCheck::Cycle;
        }
        if self.loaded.contains(to) {
            return ImportCheck::AlreadyLoaded;
        }
        ImportCheck::Fresh
    }

    pub fn add_edge(&mut self, from: &Path, to: &Path) {
        self.edges.insert((from.to_path_buf(), to.to_path_buf()));
    }

    /// Mark `path` as being parsed.
    pub fn enter(&mut self, path: &Path) {
        self.loaded.insert(path.to_path_buf());
        self.stack.push(path.to_path_buf());
    }

    pub fn exit(&mut self) {
        self.stack.pop();
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}

#[derive(Debug, Default)]
pub struct CompilationContext {
    pub options: CompileOptions,
    pub sources: SourceMap,
    pub diagnostics: Diagnostics,
    pub imports: ImportGraph,
    /// The global scope, filled in by the label checker.
    pub globals: Option<Scope>,
}

impl CompilationContext {
    pub fn new(options: CompileOptions) -> Self {
        CompilationContext {
            options,
            ..CompilationContext::default()
        }
    }

    /// Read a whole `.alm` file into the source map.
    ///
    /// A path that was already loaded is not read again.
    pub fn load_source(&mut self, path: &Path) -> Result<FileId, CoreError> {
        if !has_source_extension(path) {
            return Err(CoreError::UnsupportedExtension(path.to_path_buf()));
        }
        if let Some(id) = self.sources.find(path) {
            return Ok(id);
        }
        let text = fs::read_to_string(path).map_err(|source| CoreError::SourceIo {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), bytes = text.len(), "loaded source");
        Ok(self.sources.add(path.to_path_buf(), text))
    }

    /// Register in-memory source text under `path`.
    pub fn add_source(&mut self, path: impl Into<PathBuf>, text: impl Into<String>) -> FileId {
        self.sources.add(path.into(), text.into())
    }

    pub fn path_of(&self, file: FileId) -> PathBuf {
        self.sources
            .path(file)
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn import_graph_classifies_edges() {
        let a = Path::new("/p/a.alm");
        let b = Path::new("/p/b.alm");
        let c = Path::new("/p/c.alm");
        let mut graph = ImportGraph::default();
        graph.enter(a);

        assert_eq!(graph.check(a, a), ImportCheck::SelfImport);
        assert_eq!(graph.check(a, b), ImportCheck::Fresh);
        graph.add_edge(a, b);
        assert_eq!(graph.check(a, b), ImportCheck::Duplicate);

        graph.enter(b);
        assert_eq!(graph.check(b, a), ImportCheck::Cycle);
        graph.add_edge(b, c);
        graph.enter(c);
        assert_eq!(graph.check(c, a), ImportCheck::Cycle);
        graph.exit();
        graph.exit();
        graph.exit();

        assert_eq!(graph.check(Path::new("/p/d.alm"), c), ImportCheck::AlreadyLoaded);
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn load_source_rejects_other_extensions() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("main.txt");
        fs::write(&path, "").expect("write");
        let mut ctx = CompilationContext::default();
        let err = ctx.load_source(&path).unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedExtension(_)));
    }

    #[test]
    fn load_source_reads_each_file_once() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("main.alm");
        fs::write(&path, "func main(): integer { return 0; }").expect("write");
        let mut ctx = CompilationContext::default();
        let first = ctx.load_source(&path).expect("load");
        let second = ctx.load_source(&path).expect("load again");
        assert_eq!(first, second);
        assert_eq!(ctx.sources.len(), 1);
    }

    #[test]
    fn missing_files_are_io_errors() {
        let mut ctx = CompilationContext::default();
        let err = ctx.load_source(Path::new("/definitely/not/here.alm")).unwrap_err();
        assert!(matches!(err, CoreError::SourceIo { .. }));
    }
}
