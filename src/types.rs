/// Core domain types for citecheck links, anchors, and validation results.
use std::path::PathBuf;

use serde::Serialize;

/// An addressable point inside a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorKind {
    /// A trailing `^id` paragraph marker.
    Block,
    /// A markdown heading.
    Header,
}

/// An anchor exposed by a document. Header anchors carry a second,
/// encoding-normalized id so a heading is addressable both by its raw
/// text and by the colon-stripped, space-encoded convention.
#[derive(Debug, Clone, Serialize)]
pub struct Anchor {
    /// Encoding-normalized id. Present for header anchors only.
    pub encoded: Option<String>,
    /// The raw anchor id as authored (heading text or block id without caret).
    pub id: String,
    /// Whether this anchor is a heading or a block marker.
    pub kind: AnchorKind,
}

/// A markdown heading, as found by the scanner.
#[derive(Debug, Clone, Serialize)]
pub struct Heading {
    /// ATX level, 1 through 6.
    pub level: u8,
    /// One-based line number of the heading in the document.
    pub line: u32,
    /// Heading text with the `#` markers and surrounding whitespace removed.
    pub text: String,
}

/// Trailing extraction directive attached to a link from trivia on its line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractDirective {
    /// Always extract this link, regardless of other eligibility rules.
    Force,
    /// Never extract this link.
    Stop,
}

/// The source syntax a link was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    /// A caret block reference in prose, e.g. `^FR1`.
    BlockRef,
    /// The `[Source: path#fragment]` citation shorthand.
    Citation,
    /// A standard `[text](target#fragment)` link.
    Inline,
    /// A `[[target#fragment|display]]` wiki link.
    Wiki,
}

/// Whether a link stays inside its own document or crosses to another file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkScope {
    /// Another file in the corpus.
    CrossDocument,
    /// The same document (fragment-only target).
    Internal,
}

/// A citation parsed from a source document. Validation enriches the link
/// in place; there is never a second, positionally-correlated result list.
#[derive(Debug, Clone, Serialize)]
pub struct Link {
    /// Fragment id, without the leading `#`. Block fragments are stored
    /// without the caret.
    pub anchor: Option<String>,
    /// Whether the fragment addresses a heading or a block marker.
    pub anchor_kind: Option<AnchorKind>,
    /// One-based column of the link's first character.
    pub column: u32,
    /// Trailing force/stop directive found after the link on its line.
    pub directive: Option<ExtractDirective>,
    /// The syntax the link was written in.
    pub kind: LinkKind,
    /// One-based line number of the link in the source document.
    pub line: u32,
    /// Internal or cross-document.
    pub scope: LinkScope,
    /// Absolute target path, resolved against the source document's
    /// directory and lexically normalized. `None` for internal links.
    pub target_abs: Option<PathBuf>,
    /// The target path exactly as written. `None` for internal links.
    pub target_raw: Option<String>,
    /// Display-relative target path (normalized form of the raw path).
    pub target_rel: Option<PathBuf>,
    /// Display text of the link.
    pub text: String,
    /// Validation outcome, filled in by the validator.
    pub validation: Option<Validation>,
}

impl Link {
    /// Short `target#fragment` description for reports and diagnostics.
    pub fn describe_target(&self) -> String {
        let target = match &self.target_rel {
            Some(rel) => rel.display().to_string(),
            None => String::new(),
        };
        return match &self.anchor {
            Some(anchor) => format!("{target}#{anchor}"),
            None => target,
        };
    }
}

/// Recommended rewrite for a link that resolved only through the filename
/// fallback: the relative path from the source document to the file that
/// was actually found, fragment preserved.
#[derive(Debug, Clone, Serialize)]
pub struct PathConversion {
    /// The replacement `path#fragment` string.
    pub recommended: String,
}

/// Validation outcome for a single link. A sum type so a valid link cannot
/// carry error fields and a broken link cannot lack a message.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Validation {
    /// Target file missing or anchor not found.
    Error {
        /// What failed, in human-readable form.
        message: String,
        /// Best-guess correction: a close anchor id or a corrected path.
        suggestion: Option<String>,
    },
    /// Target file found and anchor (if any) present.
    Valid,
    /// Target found only through the filename fallback, in a different
    /// directory than the literal path implies.
    Warning {
        /// The rewrite that would make this link stable.
        path_conversion: PathConversion,
    },
}

/// Counts folded from an enriched link list. Always derived, never
/// tracked independently, so it cannot drift from the links themselves.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ValidationSummary {
    /// Links with `Error` status.
    pub error: usize,
    /// Total number of links validated.
    pub total: usize,
    /// Links with `Valid` status.
    pub valid: usize,
    /// Links with `Warning` status.
    pub warning: usize,
}

impl ValidationSummary {
    /// Fold a summary from enriched links.
    pub fn from_links(links: &[Link]) -> Self {
        let mut summary = Self {
            error: 0,
            total: links.len(),
            valid: 0,
            warning: 0,
        };
        for link in links {
            match link.validation {
                Some(Validation::Valid) => summary.valid = summary.valid.saturating_add(1),
                Some(Validation::Warning { .. }) => {
                    summary.warning = summary.warning.saturating_add(1);
                },
                Some(Validation::Error { .. }) => {
                    summary.error = summary.error.saturating_add(1);
                },
                None => {},
            }
        }
        return summary;
    }
}
