//! Module resolution for import statements.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::runtime::value::Value;

/// Source file extension of Lumo modules.
pub const EXTENSION: &str = "lm";

/// Errors that can occur during module resolution.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Module not found: {0}")]
    NotFound(String),

    #[error("circular import: {}", .0.join(" -> "))]
    CircularImport(Vec<String>),

    #[error("Cannot read module {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Resolves import paths and caches the exports of loaded modules.
#[derive(Debug, Default)]
pub struct ModuleResolver {
    /// Exports of every module loaded so far, by canonical path.
    cache: HashMap<PathBuf, Value>,
    /// Modules currently being loaded (for cycle detection).
    loading: Vec<PathBuf>,
}

impl ModuleResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve an import path relative to the directory of the importing
    /// file, or the working directory when there is none.
    pub fn resolve_path(&self, import_path: &str, from: Option<&Path>) -> Result<PathBuf, ResolveError> {
        let base = from
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        self.find_module_file(&base.join(import_path))
    }

    /// Find the actual module file (handles the `.lm` extension).
    fn find_module_file(&self, path: &Path) -> Result<PathBuf, ResolveError> {
        if path.is_file() {
            return canonicalize(path);
        }

        let with_ext = path.with_extension(EXTENSION);
        if with_ext.is_file() {
            return canonicalize(&with_ext);
        }

        let index = path.join(format!("index.{}", EXTENSION));
        if index.is_file() {
            return canonicalize(&index);
        }

        Err(ResolveError::NotFound(path.display().to_string()))
    }

    /// Exports of an already loaded module.
    pub fn cached(&self, path: &Path) -> Option<Value> {
        self.cache.get(path).cloned()
    }

    /// Mark a module as loading. Fails if it is already being loaded further
    /// up the import chain.
    pub fn enter(&mut self, path: &Path) -> Result<(), ResolveError> {
        if self.loading.iter().any(|p| p == path) {
            let cycle = self
                .loading
                .iter()
                .skip_while(|p| p.as_path() != path)
                .chain(std::iter::once(&path.to_path_buf()))
                .map(|p| p.display().to_string())
                .collect();
            return Err(ResolveError::CircularImport(cycle));
        }
        self.loading.push(path.to_path_buf());
        Ok(())
    }

    /// Stop loading a module, caching its exports when it completed.
    pub fn leave(&mut self, path: &Path, exports: Option<Value>) {
        if let Some(pos) = self.loading.iter().rposition(|p| p == path) {
            self.loading.remove(pos);
        }
        if let Some(exports) = exports {
            self.cache.insert(path.to_path_buf(), exports);
        }
    }

    pub fn read_source(&self, path: &Path) -> Result<String, ResolveError> {
        fs::read_to_string(path).map_err(|source| ResolveError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    /// Number of cached modules.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

/// Canonicalize a path (resolve symlinks, etc.).
pub fn canonicalize(path: &Path) -> Result<PathBuf, ResolveError> {
    path.canonicalize()
        .map_err(|_| ResolveError::NotFound(path.display().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_resolves_relative_to_importing_file() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("lib")).unwrap();
        fs::write(dir.path().join("lib/util.lm"), "let a = 1").unwrap();
        let main = dir.path().join("main.lm");

        let resolver = ModuleResolver::new();
        let by_name = resolver.resolve_path("./lib/util.lm", Some(&main)).unwrap();
        let by_stem = resolver.resolve_path("./lib/util", Some(&main)).unwrap();
        assert_eq!(by_name, by_stem);
        assert!(by_name.is_absolute());
    }

    #[test]
    fn test_missing_module() {
        let dir = tempdir().unwrap();
        let main = dir.path().join("main.lm");
        let err = ModuleResolver::new()
            .resolve_path("./nope.lm", Some(&main))
            .unwrap_err();
        assert!(matches!(err, ResolveError::NotFound(_)));
    }

    #[test]
    fn test_cycle_detection() {
        let mut resolver = ModuleResolver::new();
        let a = PathBuf::from("/m/a.lm");
        let b = PathBuf::from("/m/b.lm");
        resolver.enter(&a).unwrap();
        resolver.enter(&b).unwrap();
        let err = resolver.enter(&a).unwrap_err();
        assert_eq!(err.to_string(), "circular import: /m/a.lm -> /m/b.lm -> /m/a.lm");

        resolver.leave(&b, Some(Value::Null));
        resolver.leave(&a, None);
        assert!(resolver.cached(&b).is_some());
        assert!(resolver.cached(&a).is_none());
        assert!(resolver.enter(&a).is_ok());
    }
}
