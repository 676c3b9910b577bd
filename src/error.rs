/// Crate-level error types for citecheck infrastructure failures.
///
/// Only infrastructure problems live here (unreadable files, malformed
/// config). Broken links and missing anchors are business outcomes and are
/// represented as validation status on the link itself, never as errors.
use std::path::PathBuf;
use std::sync::Arc;

#[allow(clippy::error_impl_error, reason = "crate-internal error type in binary")]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A source document does not exist on disk.
    #[error("file not found: {}", path.display())]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// Source document exceeds the configured size limit.
    #[error("file too large ({size_bytes} bytes, max {max_bytes}): {}", file.display())]
    FileTooLarge {
        /// File that exceeded the size limit.
        file: PathBuf,
        /// Maximum allowed file size in bytes.
        max_bytes: u64,
        /// Actual file size in bytes.
        size_bytes: u64,
    },

    /// Underlying I/O error from the filesystem.
    #[error("io: {0}")]
    Io(
        /// The wrapped I/O error.
        #[from]
        std::io::Error,
    ),

    /// JSON serialization of an output record failed.
    #[error("json serialize: {0}")]
    Json(
        /// The wrapped JSON error.
        #[from]
        serde_json::Error,
    ),

    /// The configured scope directory does not exist.
    #[error("scope directory not found: {}", path.display())]
    ScopeNotFound {
        /// Path to the missing scope directory.
        path: PathBuf,
    },

    /// A parse failure observed through the shared in-flight computation.
    /// Concurrent waiters on the same document all receive the same
    /// underlying error.
    #[error("{0}")]
    Shared(Arc<Error>),

    /// TOML deserialization failed.
    #[error("toml deserialize: {0}")]
    TomlDe(
        /// The wrapped TOML deserialization error.
        #[from]
        toml::de::Error,
    ),
}
