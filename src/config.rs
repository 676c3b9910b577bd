use std::path::{Path, PathBuf};

use crate::error::Error;

/// Default similarity cutoff for fuzzy anchor and filename suggestions.
const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.6;

/// Project configuration loaded from `.citecheck.toml` next to the source
/// document. Command-line flags override these values.
pub struct Config {
    /// Whether whole-file links are extraction-eligible by default.
    pub extract_full_files: bool,
    /// Vault root for vault-absolute resolution and the filename fallback.
    pub scope: Option<PathBuf>,
    /// Similarity cutoff for fuzzy suggestions.
    pub similarity_threshold: f64,
}

/// Raw TOML structure for `.citecheck.toml`.
#[derive(serde::Deserialize)]
struct CitecheckTomlConfig {
    #[serde(default)]
    extract_full_files: bool,
    #[serde(default)]
    scope: Option<PathBuf>,
    #[serde(default = "default_threshold")]
    similarity_threshold: f64,
}

fn default_threshold() -> f64 {
    DEFAULT_SIMILARITY_THRESHOLD
}

impl Config {
    /// Load config from `.citecheck.toml` in the given directory.
    /// Returns defaults if the file doesn't exist. Returns an error if the
    /// file exists but is malformed — never silently falls back to defaults
    /// when the user wrote a config file.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if reading fails (other than not-found),
    /// or `Error::TomlDe` if the TOML is malformed.
    pub fn load(dir: &Path) -> Result<Self, Error> {
        let path = dir.join(".citecheck.toml");
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::defaults()),
            Err(e) => return Err(Error::Io(e)),
        };

        let raw: CitecheckTomlConfig = toml::from_str(&content)?;
        Ok(Self {
            extract_full_files: raw.extract_full_files,
            scope: raw.scope,
            similarity_threshold: raw.similarity_threshold,
        })
    }

    /// Defaults when no config file is present.
    fn defaults() -> Self {
        Self {
            extract_full_files: false,
            scope: None,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert!(!config.extract_full_files);
        assert!(config.scope.is_none());
        assert!((config.similarity_threshold - 0.6).abs() < f64::EPSILON);
    }

    #[test]
    fn written_values_are_honored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".citecheck.toml"),
            "scope = \"vault\"\nextract_full_files = true\nsimilarity_threshold = 0.8\n",
        )
        .unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert!(config.extract_full_files);
        assert_eq!(config.scope.as_deref(), Some(Path::new("vault")));
        assert!((config.similarity_threshold - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn malformed_config_is_a_hard_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".citecheck.toml"), "scope = [not toml").unwrap();
        assert!(matches!(Config::load(dir.path()), Err(Error::TomlDe(_))));
    }
}
