//! Library directory lookup for bare-identifier imports.
//!
//! `import math;` resolves to `<lib_dir>/math.alm`. String imports are
//! resolved relative to the directory of the importing file.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::ast::ImportTarget;

/// File extension of ALM source files.
pub const SOURCE_EXTENSION: &str = "alm";

pub fn default_lib_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../lib")
}

pub fn has_source_extension(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == SOURCE_EXTENSION)
}

/// Names of every module available in `lib_dir`, sorted.
///
/// Modules in sub-directories are listed with `/` separators.
pub fn available_modules(lib_dir: impl AsRef<Path>) -> Vec<String> {
    let lib_dir = lib_dir.as_ref();
    let mut names = Vec::new();
    for entry in WalkDir::new(lib_dir).into_iter().filter_map(Result::ok) {
        let path = entry.path();
        if path.is_file() && has_source_extension(path) {
            let relative = path.strip_prefix(lib_dir).unwrap_or(path).with_extension("");
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            names.push(name);
        }
    }
    names.sort();
    names
}

/// Resolve an import target to an existing `.alm` file.
///
/// `importer_dir` is the directory of the file containing the import.
/// On failure the error is the diagnostic message to report.
pub fn resolve_import(
    target: &ImportTarget,
    importer_dir: &Path,
    lib_dir: &Path,
) -> Result<PathBuf, String> {
    let path = match target {
        ImportTarget::Path(relative) => {
            let path = importer_dir.join(relative);
            if !has_source_extension(&path) {
                return Err(format!(
                    "imported module \"{relative}\" must be a .{SOURCE_EXTENSION} file"
                ));
            }
            if !path.is_file() {
                return Err(format!("imported module \"{relative}\" was not found"));
            }
            path
        }
        ImportTarget::Library(name) => {
            let path = lib_dir.join(format!("{name}.{SOURCE_EXTENSION}"));
            if !path.is_file() {
                let available = available_modules(lib_dir);
                let listing = if available.is_empty() {
                    "none".to_string()
                } else {
                    available.join(", ")
                };
                return Err(format!(
                    "library module '{name}' was not found in {} (available: {listing})",
                    lib_dir.display()
                ));
            }
            path
        }
    };
    Ok(path.canonicalize().unwrap_or(path))
}
