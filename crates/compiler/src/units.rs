//! On-disk discovery of with'd compilation units.
//!
//! For a with'd unit `X.Y` the loader tries, in include-path order, the
//! lower-cased file names `x.y.ads`, `x.y.adb`, `x.y.ada`, and finally
//! `x.y.ali` (a pre-compiled interface stub). A loaded-units set prevents a
//! unit from being parsed twice when it is withed along several paths.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitFile {
    /// `.ads` — package or subprogram specification.
    Spec,
    /// `.adb` — body.
    Body,
    /// `.ada` — either.
    Either,
    /// `.ali` — interface stub.
    Interface,
}

#[derive(Debug)]
pub struct UnitSource {
    pub path: PathBuf,
    pub text: String,
    pub mtime: u64,
    pub kind: UnitFile,
}

fn mtime_of(path: &Path) -> u64 {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Locate a unit's source along the include paths. Preference order is
/// spec, body, either-suffix, interface stub; include paths are searched in
/// the order they were given.
pub fn find_unit(include_paths: &[PathBuf], unit_name: &str) -> Option<UnitSource> {
    let stem = unit_name.to_ascii_lowercase();
    let candidates = [
        (format!("{}.ads", stem), UnitFile::Spec),
        (format!("{}.adb", stem), UnitFile::Body),
        (format!("{}.ada", stem), UnitFile::Either),
        (format!("{}.ali", stem), UnitFile::Interface),
    ];
    for (file_name, kind) in &candidates {
        for dir in include_paths {
            let path = dir.join(file_name);
            if let Ok(text) = fs::read_to_string(&path) {
                tracing::debug!(unit = unit_name, path = %path.display(), "unit found");
                return Some(UnitSource {
                    mtime: mtime_of(&path),
                    path,
                    text,
                    kind: *kind,
                });
            }
        }
    }
    None
}

/// Tracks which units have been loaded into the current compilation, plus
/// the with-list recorded into the emitted `.ali`.
pub struct UnitLoader {
    loaded: HashSet<String>,
    pub withed: Vec<(String, u64)>,
    /// Parent name of the subunit being compiled, when `separate (P)` applies.
    pub separate_parent: Option<String>,
}

impl UnitLoader {
    pub fn new() -> Self {
        UnitLoader {
            loaded: HashSet::new(),
            withed: Vec::new(),
            separate_parent: None,
        }
    }

    /// Returns true the first time a unit name is seen.
    pub fn mark_loaded(&mut self, unit_name: &str) -> bool {
        self.loaded.insert(unit_name.to_ascii_lowercase())
    }

    pub fn record_with(&mut self, unit_name: &str, mtime: u64) {
        let lower = unit_name.to_ascii_lowercase();
        if !self.withed.iter().any(|(n, _)| *n == lower) {
            self.withed.push((lower, mtime));
        }
    }
}

impl Default for UnitLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_find_unit_prefers_spec() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("store.ads"), "package Store is end Store;").unwrap();
        fs::write(dir.path().join("store.adb"), "package body Store is end Store;").unwrap();
        let found = find_unit(&[dir.path().to_path_buf()], "Store").expect("not found");
        assert_eq!(found.kind, UnitFile::Spec);
        assert!(found.text.contains("package Store"));
    }

    #[test]
    fn test_find_unit_lowercases_dotted_names() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("p.q.ads"), "package P.Q is end;").unwrap();
        let found = find_unit(&[dir.path().to_path_buf()], "P.Q").expect("not found");
        assert_eq!(found.kind, UnitFile::Spec);
    }

    #[test]
    fn test_include_path_order_wins() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        fs::write(first.path().join("u.ads"), "-- first").unwrap();
        fs::write(second.path().join("u.ads"), "-- second").unwrap();
        let paths = vec![first.path().to_path_buf(), second.path().to_path_buf()];
        let found = find_unit(&paths, "U").unwrap();
        assert!(found.text.contains("first"));
    }

    #[test]
    fn test_missing_unit() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_unit(&[dir.path().to_path_buf()], "nope").is_none());
    }

    #[test]
    fn test_loader_dedup() {
        let mut loader = UnitLoader::new();
        assert!(loader.mark_loaded("Text_IO"));
        assert!(!loader.mark_loaded("TEXT_IO"));
        loader.record_with("Text_IO", 7);
        loader.record_with("text_io", 8);
        assert_eq!(loader.withed, vec![("text_io".to_string(), 7)]);
    }
}
