//! Citation validation: the file resolution strategy chain and status
//! assignment. Validation enriches links in place and folds the summary
//! from the enriched list, so counts can never drift from the links.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::future::join_all;
use serde::Serialize;

use crate::cache::DocumentCache;
use crate::document::Document;
use crate::error::Error;
use crate::resolver::{FilenameIndex, Resolution};
use crate::scanner;
use crate::types::{
    AnchorKind, Link, LinkKind, LinkScope, PathConversion, Validation, ValidationSummary,
};

/// Validation result for one source document.
#[derive(Serialize)]
pub struct DocumentValidation {
    /// Every link of the document, enriched with its validation status.
    pub links: Vec<Link>,
    /// Counts folded from `links`.
    pub summary: ValidationSummary,
}

/// Validates every citation in a document against the corpus.
pub struct Validator {
    cache: DocumentCache,
    fallback: Option<FilenameIndex>,
    scope: Option<PathBuf>,
    similarity_threshold: f64,
}

/// How a cross-document target file was (or was not) located.
enum FileResolution {
    /// Strategy 4 matched a duplicated filename.
    Ambiguous(Vec<PathBuf>),
    /// Found only through the filename fallback.
    Fallback(PathBuf),
    /// Found by literal, symlink-aware, or vault-absolute resolution.
    Found(PathBuf),
    /// No strategy succeeded; `fuzzy` carries a likely-typo candidate.
    NotFound { fuzzy: Option<PathBuf> },
}

impl Validator {
    pub fn new(
        cache: DocumentCache,
        scope: Option<PathBuf>,
        fallback: Option<FilenameIndex>,
        similarity_threshold: f64,
    ) -> Self {
        return Self { cache, fallback, scope, similarity_threshold };
    }

    /// Validate every citation in the document at `path`. Link checks for
    /// one document are issued concurrently and awaited together; the
    /// cache's single-parse guarantee keeps that safe.
    ///
    /// # Errors
    ///
    /// Returns cache errors for the source document itself. Broken links
    /// and missing anchors are statuses on the links, never errors.
    pub async fn validate(&self, path: &Path) -> Result<DocumentValidation, Error> {
        let source = self.cache.resolve(path).await?;

        let checks = source
            .links()
            .iter()
            .cloned()
            .map(|link| self.validate_link(Arc::clone(&source), link));
        let links = join_all(checks).await;

        let summary = ValidationSummary::from_links(&links);
        return Ok(DocumentValidation { links, summary });
    }

    /// Enrich one link with its validation status and, for resolved
    /// cross-document links, the path the target was actually found at.
    async fn validate_link(&self, source: Arc<Document>, mut link: Link) -> Link {
        match link.scope {
            LinkScope::Internal => {
                link.validation = Some(self.validate_internal(&source, &link));
            },
            LinkScope::CrossDocument => {
                let (validation, resolved) = self.validate_cross_document(&source, &link).await;
                if let Some(path) = resolved {
                    // Extraction fetches through this path; for fallback
                    // hits it differs from the naive literal one.
                    link.target_abs = Some(path);
                }
                link.validation = Some(validation);
            },
        }
        return link;
    }

    /// Internal links only need their anchor to exist in the source itself.
    fn validate_internal(&self, source: &Document, link: &Link) -> Validation {
        let Some(query) = anchor_query(link) else {
            return Validation::Valid;
        };
        if source.has_anchor(&query) {
            return Validation::Valid;
        }
        return missing_anchor(source, &query, self.similarity_threshold);
    }

    /// Resolve the target file through the strategy chain, then check the
    /// anchor through the same facade the file came from. Returns the
    /// resolved path alongside the status when a file was found.
    async fn validate_cross_document(
        &self,
        source: &Document,
        link: &Link,
    ) -> (Validation, Option<PathBuf>) {
        return match self.resolve_target_file(source, link) {
            FileResolution::Found(path) => {
                let validation = self.check_anchor(&path, link, None).await;
                (validation, Some(path))
            },
            FileResolution::Fallback(path) => {
                let conversion = conversion_for(source, link, &path);
                let validation = self.check_anchor(&path, link, conversion).await;
                (validation, Some(path))
            },
            FileResolution::Ambiguous(candidates) => (ambiguous_error(link, &candidates), None),
            FileResolution::NotFound { fuzzy } => (not_found_error(source, link, fuzzy), None),
        };
    }

    /// The resolution strategy chain. Order is a contract: literal path,
    /// symlink-aware variant, vault-absolute convention, filename fallback.
    fn resolve_target_file(&self, source: &Document, link: &Link) -> FileResolution {
        // 1. Literal path as written, resolved against the source directory.
        if let Some(abs) = &link.target_abs {
            if abs.is_file() {
                return FileResolution::Found(abs.clone());
            }
        }

        // 2. Symlink-aware variant: canonicalize the unnormalized join, so
        //    `..` segments that cross a symlink still resolve.
        if let (Some(dir), Some(written)) = (source.path().parent(), written_target(link)) {
            if let Ok(real) = std::fs::canonicalize(dir.join(written)) {
                if real.is_file() {
                    return FileResolution::Found(real);
                }
            }
        }

        // 3. Vault-absolute: the written path taken from the scope root.
        if let (Some(scope), Some(rel)) = (&self.scope, &link.target_rel) {
            let candidate = scanner::normalize_path(&scope.join(rel));
            if candidate.is_file() {
                return FileResolution::Found(candidate);
            }
        }

        // 4. Filename-only fallback through the injected index.
        let Some(index) = &self.fallback else {
            return FileResolution::NotFound { fuzzy: None };
        };
        let Some(name) = link
            .target_rel
            .as_deref()
            .and_then(Path::file_name)
            .and_then(|n| n.to_str())
        else {
            return FileResolution::NotFound { fuzzy: None };
        };
        return match index.resolve(name) {
            Resolution::Direct(path) => FileResolution::Fallback(path),
            Resolution::Duplicate(candidates) => FileResolution::Ambiguous(candidates),
            Resolution::Fuzzy(path) => FileResolution::NotFound { fuzzy: Some(path) },
            Resolution::NotFound => FileResolution::NotFound { fuzzy: None },
        };
    }

    /// Check the link's anchor against the resolved target, then settle on
    /// valid or warning depending on how the file was found.
    async fn check_anchor(
        &self,
        target: &Path,
        link: &Link,
        conversion: Option<PathConversion>,
    ) -> Validation {
        let document = match self.cache.resolve(target).await {
            Ok(d) => d,
            Err(e) => {
                return Validation::Error {
                    message: format!("target `{}` could not be parsed: {e}", target.display()),
                    suggestion: None,
                };
            },
        };

        if let Some(query) = anchor_query(link) {
            if !document.has_anchor(&query) {
                return missing_anchor(&document, &query, self.similarity_threshold);
            }
        }

        return match conversion {
            Some(path_conversion) => Validation::Warning { path_conversion },
            None => Validation::Valid,
        };
    }
}

/// The anchor id to query the facade with: block fragments keep their caret
/// so they only match block anchors.
fn anchor_query(link: &Link) -> Option<String> {
    let anchor = link.anchor.as_deref()?;
    return match link.anchor_kind {
        Some(AnchorKind::Block) => Some(format!("^{anchor}")),
        _ => Some(anchor.to_string()),
    };
}

/// The target path a fallback hit was naively expected at, compared by
/// parent directory. A match means the fallback merely confirmed the
/// literal path and the link is stable.
fn conversion_for(source: &Document, link: &Link, resolved: &Path) -> Option<PathConversion> {
    let expected_dir = link.target_abs.as_deref().and_then(Path::parent);
    if expected_dir == resolved.parent() {
        return None;
    }

    let source_dir = source.path().parent()?;
    let relative = relative_path_between(source_dir, resolved);
    let mut recommended = relative.display().to_string();
    if let Some(query) = anchor_query(link) {
        recommended = format!("{recommended}#{query}");
    }
    return Some(PathConversion { recommended });
}

/// Error status for a fragment that exists nowhere in the target, with the
/// closest known anchor as a suggestion.
fn missing_anchor(document: &Document, query: &str, threshold: f64) -> Validation {
    let similar = document.find_similar_anchors(query, threshold);
    let file = document
        .path()
        .file_name()
        .map_or_else(|| document.path().display().to_string(), |n| {
            return n.to_string_lossy().into_owned();
        });
    return Validation::Error {
        message: format!("anchor `{query}` not found in {file}"),
        suggestion: similar.into_iter().next(),
    };
}

/// Error status for a duplicated filename the fallback cannot disambiguate.
fn ambiguous_error(link: &Link, candidates: &[PathBuf]) -> Validation {
    let listed = candidates
        .iter()
        .map(|p| return p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ");
    return Validation::Error {
        message: format!(
            "filename `{}` is ambiguous within scope: {listed}",
            link.describe_target()
        ),
        suggestion: None,
    };
}

/// Error status for a target no strategy could find. A fuzzy filename hit
/// becomes a best-guess corrected path.
fn not_found_error(source: &Document, link: &Link, fuzzy: Option<PathBuf>) -> Validation {
    let suggestion = fuzzy.and_then(|path| {
        let dir = source.path().parent()?;
        return Some(relative_path_between(dir, &path).display().to_string());
    });
    let target = link
        .target_rel
        .as_deref()
        .map_or_else(String::new, |p| return p.display().to_string());
    return Validation::Error {
        message: format!("target file `{target}` not found"),
        suggestion,
    };
}

/// The written target in resolvable form. Wiki targets address markdown
/// files even when the extension is omitted.
fn written_target(link: &Link) -> Option<String> {
    let raw = link.target_raw.as_deref()?;
    return match link.kind {
        LinkKind::Wiki => Some(scanner::with_markdown_extension(raw)),
        _ => Some(raw.to_string()),
    };
}

/// Lexical relative path from one directory to a target file.
fn relative_path_between(from_dir: &Path, to: &Path) -> PathBuf {
    let from: Vec<std::path::Component<'_>> = from_dir.components().collect();
    let to_components: Vec<std::path::Component<'_>> = to.components().collect();
    let common = from
        .iter()
        .zip(to_components.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut relative = PathBuf::new();
    for _ in common..from.len() {
        relative.push("..");
    }
    for component in to_components.iter().skip(common) {
        relative.push(component);
    }
    if relative.as_os_str().is_empty() {
        relative.push(".");
    }
    return relative;
}
