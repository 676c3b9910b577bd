use std::collections::HashMap;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::Error;
use crate::scanner;

/// Outcome of a filename-only lookup within the scope.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// Exactly one file in scope carries this name.
    Direct(PathBuf),
    /// Multiple files in scope carry this name; the caller must disambiguate.
    Duplicate(Vec<PathBuf>),
    /// No exact match, but one filename is close enough to be a likely typo.
    Fuzzy(PathBuf),
    /// Nothing in scope matches.
    NotFound,
}

/// Short-name index over every markdown file under a scope directory.
/// Built once per run; consumed by the validator's final resolution strategy.
pub struct FilenameIndex {
    by_name: HashMap<String, Vec<PathBuf>>,
    threshold: f64,
}

impl FilenameIndex {
    /// Walk the scope directory and index markdown files by short name.
    ///
    /// # Errors
    ///
    /// Returns `Error::ScopeNotFound` if the scope directory does not exist,
    /// or `Error::Io` if it cannot be absolutized.
    pub fn build(scope: &Path, threshold: f64) -> Result<Self, Error> {
        if !scope.is_dir() {
            return Err(Error::ScopeNotFound { path: scope.to_path_buf() });
        }
        let scope = std::path::absolute(scope)?;

        let mut by_name: HashMap<String, Vec<PathBuf>> = HashMap::new();
        for entry in WalkDir::new(&scope)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| is_markdown(e.path()))
        {
            let Some(name) = entry.path().file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            by_name
                .entry(name.to_string())
                .or_default()
                .push(scanner::normalize_path(entry.path()));
        }

        // Deterministic candidate ordering for duplicate reports.
        for paths in by_name.values_mut() {
            paths.sort();
        }

        Ok(Self { by_name, threshold })
    }

    /// Resolve a bare filename within the scope.
    pub fn resolve(&self, filename: &str) -> Resolution {
        match self.by_name.get(filename) {
            Some(paths) => match paths.as_slice() {
                [single] => Resolution::Direct(single.clone()),
                _ => Resolution::Duplicate(paths.clone()),
            },
            None => self.fuzzy_match(filename),
        }
    }

    /// Best similarity match above the threshold. Only unambiguous names
    /// qualify; a fuzzy hit on a duplicated name is no help to anyone.
    fn fuzzy_match(&self, filename: &str) -> Resolution {
        let mut best: Option<(f64, &String)> = None;
        for name in self.by_name.keys() {
            let score = strsim::normalized_damerau_levenshtein(filename, name);
            if score < self.threshold {
                continue;
            }
            if best.is_none_or(|(top, _)| score > top) {
                best = Some((score, name));
            }
        }

        let Some((_, name)) = best else {
            return Resolution::NotFound;
        };
        match self.by_name.get(name).map(Vec::as_slice) {
            Some([single]) => Resolution::Fuzzy(single.clone()),
            _ => Resolution::NotFound,
        }
    }
}

fn is_markdown(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext == "md" || ext == "markdown")
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc)]
mod tests {
    use super::*;

    fn scope_with(files: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for file in files {
            let path = dir.path().join(file);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(&path, "# stub\n").unwrap();
        }
        dir
    }

    #[test]
    fn unique_filename_resolves_directly() {
        let dir = scope_with(&["notes/unique.md"]);
        let index = FilenameIndex::build(dir.path(), 0.6).unwrap();
        let Resolution::Direct(path) = index.resolve("unique.md") else {
            panic!("expected direct resolution");
        };
        assert!(path.ends_with("notes/unique.md"));
    }

    #[test]
    fn duplicate_filenames_are_reported_as_ambiguous() {
        let dir = scope_with(&["a/target.md", "b/target.md"]);
        let index = FilenameIndex::build(dir.path(), 0.6).unwrap();
        let Resolution::Duplicate(candidates) = index.resolve("target.md") else {
            panic!("expected duplicate resolution");
        };
        assert_eq!(candidates.len(), 2);
    }

    #[test]
    fn close_typo_resolves_fuzzily() {
        let dir = scope_with(&["notes/architecture.md"]);
        let index = FilenameIndex::build(dir.path(), 0.6).unwrap();
        let Resolution::Fuzzy(path) = index.resolve("architectre.md") else {
            panic!("expected fuzzy resolution");
        };
        assert!(path.ends_with("notes/architecture.md"));
    }

    #[test]
    fn unrelated_name_is_not_found() {
        let dir = scope_with(&["notes/architecture.md"]);
        let index = FilenameIndex::build(dir.path(), 0.6).unwrap();
        assert!(matches!(index.resolve("zzz.md"), Resolution::NotFound));
    }

    #[test]
    fn non_markdown_files_are_not_indexed() {
        let dir = scope_with(&["notes/data.json", "notes/real.md"]);
        let index = FilenameIndex::build(dir.path(), 0.6).unwrap();
        assert!(matches!(index.resolve("data.json"), Resolution::NotFound));
    }

    #[test]
    fn missing_scope_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            FilenameIndex::build(&missing, 0.6),
            Err(Error::ScopeNotFound { .. })
        ));
    }
}
