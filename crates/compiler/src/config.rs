//! Compiler configuration.
//!
//! Aggregates everything the original design kept in module-level globals:
//! the include-path list, global check suppression, and `.ali` emission. A
//! config value is built by the CLI (or by tests) and threaded through the
//! passes.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Include-path entries, searched in order for with'd units.
    pub include_paths: Vec<PathBuf>,
    /// Write a `.ali` interface stub next to the output after IR emission.
    pub emit_ali: bool,
    /// Directory for emitted `.ali` files; defaults to the source directory.
    pub ali_dir: Option<PathBuf>,
    /// Suppress every runtime check, as if pragma Suppress covered all types.
    pub suppress_all_checks: bool,
}

impl CompilerConfig {
    pub fn new() -> Self {
        CompilerConfig {
            include_paths: Vec::new(),
            emit_ali: false,
            ali_dir: None,
            suppress_all_checks: false,
        }
    }

    pub fn with_include_path(mut self, path: impl AsRef<Path>) -> Self {
        self.include_paths.push(path.as_ref().to_path_buf());
        self
    }

    pub fn with_include_paths(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        self.include_paths.extend(paths);
        self
    }

    pub fn with_ali_output(mut self, dir: Option<PathBuf>) -> Self {
        self.emit_ali = true;
        self.ali_dir = dir;
        self
    }
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = CompilerConfig::new()
            .with_include_path("/usr/share/ada")
            .with_include_path("lib");
        assert_eq!(config.include_paths.len(), 2);
        assert!(!config.emit_ali);
        let config = config.with_ali_output(None);
        assert!(config.emit_ali);
    }
}
