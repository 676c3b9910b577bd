//! Parsed-document facade. The underlying heading/anchor/link arrays are
//! private; the validator and extractor only ever see the query surface.

use std::path::{Path, PathBuf};

use crate::types::{Anchor, AnchorKind, Heading, Link};

/// How many similar-anchor candidates a lookup returns.
const MAX_SUGGESTIONS: usize = 3;

/// A document parsed once per run. Immutable after construction and owned
/// exclusively by the cache, which hands out shared references.
#[derive(Debug)]
pub struct Document {
    anchors: Vec<Anchor>,
    headings: Vec<Heading>,
    links: Vec<Link>,
    path: PathBuf,
    text: String,
}

impl Document {
    /// Assemble a document from scanner output.
    pub(crate) fn new(
        path: PathBuf,
        text: String,
        headings: Vec<Heading>,
        anchors: Vec<Anchor>,
        links: Vec<Link>,
    ) -> Self {
        Self { anchors, headings, links, path, text }
    }

    /// Every anchor the document exposes, headers first.
    pub fn anchors(&self) -> &[Anchor] {
        &self.anchors
    }

    /// The whole document body.
    pub fn extract_full_content(&self) -> &str {
        &self.text
    }

    /// Extract the paragraph carrying a `^id` block definition, with the
    /// marker itself stripped. Accepts the id with or without the caret.
    pub fn extract_block(&self, block_id: &str) -> Option<String> {
        let wanted = block_id.trim().trim_start_matches('^');
        let lines: Vec<&str> = self.text.lines().collect();
        let marker = lines.iter().position(|l| line_defines_block(l, wanted))?;

        let mut start = marker;
        while start > 0 {
            let Some(previous) = lines.get(start.wrapping_sub(1)) else {
                break;
            };
            if previous.trim().is_empty() {
                break;
            }
            start = start.wrapping_sub(1);
        }

        let mut end = marker;
        loop {
            let Some(next) = lines.get(end.saturating_add(1)) else {
                break;
            };
            if next.trim().is_empty() {
                break;
            }
            end = end.saturating_add(1);
        }

        let mut paragraph = Vec::new();
        for (idx, line) in lines.iter().enumerate().take(end.saturating_add(1)).skip(start) {
            if idx == marker {
                paragraph.push(strip_block_marker(line, wanted));
            } else {
                paragraph.push((*line).to_string());
            }
        }
        Some(paragraph.join("\n").trim().to_string())
    }

    /// Extract the text bounded by a heading: everything below it up to the
    /// next heading of equal or higher level. The heading line itself is not
    /// part of the section.
    pub fn extract_section(&self, heading_id: &str) -> Option<String> {
        let heading = self
            .headings
            .iter()
            .find(|h| header_id_matches(&h.text, heading_id))?;

        let skip = usize::try_from(heading.line).unwrap_or(usize::MAX);
        let mut section = Vec::new();
        let mut in_fence = false;

        for line in self.text.lines().skip(skip) {
            let trimmed = line.trim_start();
            if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
                in_fence = !in_fence;
                section.push(line);
                continue;
            }
            if !in_fence {
                if let Some(next) = crate::scanner::parse_heading_line(line, 0) {
                    if next.level <= heading.level {
                        break;
                    }
                }
            }
            section.push(line);
        }

        Some(section.join("\n").trim().to_string())
    }

    /// Rank every known anchor id against the requested one and return the
    /// closest few above the similarity threshold, most similar first.
    pub fn find_similar_anchors(&self, id: &str, threshold: f64) -> Vec<String> {
        let wanted = id.trim().trim_start_matches('^');
        let mut scored: Vec<(f64, &str)> = self
            .anchors
            .iter()
            .map(|a| {
                (
                    strsim::normalized_damerau_levenshtein(wanted, &a.id),
                    a.id.as_str(),
                )
            })
            .filter(|(score, _)| *score >= threshold)
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored
            .into_iter()
            .take(MAX_SUGGESTIONS)
            .map(|(_, candidate)| candidate.to_string())
            .collect()
    }

    /// Check whether an anchor id addresses this document. Header anchors
    /// match their raw id, their encoded id, or a URL-decoded form of the
    /// caller's input against the decoded encoded id; block anchors match
    /// the literal id with or without the leading caret.
    pub fn has_anchor(&self, id: &str) -> bool {
        let id = id.trim();
        if let Some(block_id) = id.strip_prefix('^') {
            return self
                .anchors
                .iter()
                .any(|a| a.kind == AnchorKind::Block && a.id == block_id);
        }

        self.anchors.iter().any(|a| match a.kind {
            AnchorKind::Block => a.id == id,
            AnchorKind::Header => header_anchor_matches(a, id),
        })
    }

    /// The citations this document makes.
    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Absolute path the document was parsed from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Compare a header anchor against a requested id across both id variants
/// and their decoded forms.
fn header_anchor_matches(anchor: &Anchor, requested: &str) -> bool {
    if anchor.id == requested {
        return true;
    }
    let Some(encoded) = &anchor.encoded else {
        return false;
    };
    if encoded == requested {
        return true;
    }
    percent_decode(requested) == percent_decode(encoded)
}

/// Same equivalence, applied to a heading's text when locating a section.
fn header_id_matches(heading_text: &str, requested: &str) -> bool {
    if heading_text == requested {
        return true;
    }
    let encoded = encode_header_anchor(heading_text);
    encoded == requested || percent_decode(requested) == percent_decode(&encoded)
}

/// Does this line end with a `^id` definition for the given id?
fn line_defines_block(line: &str, id: &str) -> bool {
    let trimmed = line.trim_end();
    let Some(stripped) = trimmed.strip_suffix(id) else {
        return false;
    };
    let Some(before_marker) = stripped.strip_suffix('^') else {
        return false;
    };
    before_marker.is_empty() || before_marker.ends_with(char::is_whitespace)
}

/// Remove the trailing `^id` marker from a definition line.
fn strip_block_marker(line: &str, id: &str) -> String {
    let trimmed = line.trim_end();
    let without_id = trimmed.strip_suffix(id).unwrap_or(trimmed);
    let without_caret = without_id.strip_suffix('^').unwrap_or(without_id);
    without_caret.trim_end().to_string()
}

/// Encoding-normalized header anchor id: colons stripped, spaces
/// percent-encoded. `"Story 1.5: Cache"` becomes `"Story%201.5%20Cache"`.
pub(crate) fn encode_header_anchor(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            ':' => {},
            ' ' => out.push_str("%20"),
            other => out.push(other),
        }
    }
    out
}

/// Decode `%XX` escapes. Malformed escapes pass through untouched.
pub(crate) fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0usize;

    while let Some(&b) = bytes.get(i) {
        if b == b'%' {
            let high = bytes.get(i.saturating_add(1)).and_then(|&h| hex_value(h));
            let low = bytes.get(i.saturating_add(2)).and_then(|&l| hex_value(l));
            if let (Some(high), Some(low)) = (high, low) {
                out.push(high.saturating_mul(16).saturating_add(low));
                i = i.saturating_add(3);
                continue;
            }
        }
        out.push(b);
        i = i.saturating_add(1);
    }

    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b.wrapping_sub(b'0')),
        b'a'..=b'f' => Some(b.wrapping_sub(b'a').wrapping_add(10)),
        b'A'..=b'F' => Some(b.wrapping_sub(b'A').wrapping_add(10)),
        _ => None,
    }
}
