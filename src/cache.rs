//! Memoized parse cache. Stores the in-flight computation itself, not just
//! its eventual result, so N concurrent requests for one path trigger
//! exactly one parse.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::FutureExt as _;
use futures_util::future::{BoxFuture, Shared};

use crate::document::Document;
use crate::error::Error;
use crate::scanner;

/// A shared handle to an in-progress or completed parse.
type ParseFuture = Shared<BoxFuture<'static, Result<Arc<Document>, Arc<Error>>>>;

/// Per-run document cache. Cloning shares the underlying map; all state
/// lives for one invocation only, so no eviction policy is needed beyond
/// the failure rule below.
#[derive(Clone, Default)]
pub struct DocumentCache {
    entries: Arc<Mutex<HashMap<PathBuf, ParseFuture>>>,
}

impl DocumentCache {
    pub fn new() -> Self {
        return Self::default();
    }

    /// Resolve a document, parsing it at most once per run. Keys are
    /// absolutized and lexically normalized, never symlink-dereferenced.
    ///
    /// # Errors
    ///
    /// Returns scanner errors (`FileNotFound`, `FileTooLarge`, `Io`),
    /// wrapped in `Error::Shared` when observed through a shared parse.
    pub async fn resolve(&self, path: &Path) -> Result<Arc<Document>, Error> {
        let key = cache_key(path)?;
        let future = self.in_flight_or_spawn(key);
        return future.await.map_err(Error::Shared);
    }

    /// Return the in-flight computation for a key, starting one if absent.
    fn in_flight_or_spawn(&self, key: PathBuf) -> ParseFuture {
        let mut entries = lock(&self.entries);
        if let Some(existing) = entries.get(&key) {
            return existing.clone();
        }

        let map = Arc::clone(&self.entries);
        let parse_key = key.clone();
        let future = async move {
            let parsed = scanner::parse(&parse_key).await;
            if parsed.is_err() {
                // Evict before any waiter can observe the failure. A later
                // retry must perform a fresh parse, not replay this error.
                lock(&map).remove(&parse_key);
            }
            return parsed.map(Arc::new).map_err(Arc::new);
        }
        .boxed()
        .shared();

        entries.insert(key, future.clone());
        return future;
    }
}

/// Lock the entry map, recovering the guard if a panicking thread poisoned it.
fn lock<'a>(
    map: &'a Mutex<HashMap<PathBuf, ParseFuture>>,
) -> MutexGuard<'a, HashMap<PathBuf, ParseFuture>> {
    return match map.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
}

/// Build the normalized cache key for a path.
///
/// # Errors
///
/// Returns `Error::Io` if the current directory is unavailable while
/// absolutizing a relative path.
fn cache_key(path: &Path) -> Result<PathBuf, Error> {
    let absolute = std::path::absolute(path)?;
    return Ok(scanner::normalize_path(&absolute));
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc)]
mod tests {
    use std::path::Path;

    use futures_util::future::join_all;

    use super::*;

    #[tokio::test]
    async fn same_path_parses_once() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("doc.md");
        std::fs::write(&file, "# One\n").unwrap();

        let cache = DocumentCache::new();
        let first = cache.resolve(&file).await.unwrap();

        // A second resolve must return the memoized parse, not re-read
        // the (now changed) file.
        std::fs::write(&file, "# Two\n").unwrap();
        let second = cache.resolve(&file).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert!(second.has_anchor("One"));
        assert!(!second.has_anchor("Two"));
    }

    #[tokio::test]
    async fn concurrent_resolves_share_one_parse() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("doc.md");
        std::fs::write(&file, "# Shared\n").unwrap();

        let cache = DocumentCache::new();
        let resolved = join_all((0..8).map(|_| cache.resolve(&file))).await;

        let mut documents = resolved.into_iter().map(Result::unwrap);
        let first = documents.next().unwrap();
        for other in documents {
            assert!(Arc::ptr_eq(&first, &other));
        }
    }

    #[tokio::test]
    async fn normalized_keys_hit_the_same_entry() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let file = dir.path().join("sub").join("doc.md");
        std::fs::write(&file, "# N\n").unwrap();

        let cache = DocumentCache::new();
        let direct = cache.resolve(&file).await.unwrap();
        let dotted = dir.path().join("sub").join("..").join("sub").join("doc.md");
        let via_dots = cache.resolve(&dotted).await.unwrap();

        assert!(Arc::ptr_eq(&direct, &via_dots));
    }

    #[tokio::test]
    async fn failed_parse_is_evicted_so_retry_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("late.md");

        let cache = DocumentCache::new();
        let missing = cache.resolve(&file).await;
        assert!(missing.is_err());

        // The transient condition is fixed; a poisoned entry would replay
        // the old failure here.
        std::fs::write(&file, "# Late\n").unwrap();
        let retried = cache.resolve(&file).await.unwrap();
        assert!(retried.has_anchor("Late"));
    }

    #[tokio::test]
    async fn concurrent_waiters_all_observe_the_failure_then_retry_works() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("late.md");

        let cache = DocumentCache::new();
        let results = join_all((0..4).map(|_| cache.resolve(&file))).await;
        assert!(results.iter().all(Result::is_err));

        std::fs::write(&file, "# Late\n").unwrap();
        assert!(cache.resolve(&file).await.is_ok());
    }

    #[tokio::test]
    async fn oversized_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("big.md");
        std::fs::write(&file, "x".repeat(17 * 1024 * 1024)).unwrap();

        let cache = DocumentCache::new();
        let message = cache
            .resolve(Path::new(&file))
            .await
            .unwrap_err()
            .to_string();
        assert!(message.contains("file too large"), "got: {message}");
    }
}
