use std::ops::Range;
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::document::{self, Document};
use crate::error::Error;
use crate::types::{Anchor, AnchorKind, ExtractDirective, Heading, Link, LinkKind, LinkScope};

/// Maximum source file size (16 MiB).
const MAX_FILE_SIZE: u64 = 16 * 1024 * 1024;

/// Read and parse a document. Pure function of the file contents plus the
/// path (used to resolve relative targets).
///
/// # Errors
///
/// Returns `Error::FileNotFound` if the file does not exist,
/// `Error::FileTooLarge` if it exceeds the size limit,
/// or `Error::Io` for other read failures.
pub async fn parse(path: &Path) -> Result<Document, Error> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::FileNotFound { path: path.to_path_buf() });
        },
        Err(e) => return Err(Error::Io(e)),
    };

    let size: u64 = content.len().try_into().unwrap_or(u64::MAX);
    if size > MAX_FILE_SIZE {
        return Err(Error::FileTooLarge {
            file: path.to_path_buf(),
            max_bytes: MAX_FILE_SIZE,
            size_bytes: size,
        });
    }

    Ok(parse_content(path, &content))
}

/// Parse document content into headings, anchors, and links.
///
/// # Panics
///
/// Panics if a hardcoded pattern is invalid (compile-time invariant).
pub(crate) fn parse_content(path: &Path, content: &str) -> Document {
    let patterns = Patterns::new();
    let headings = collect_headings(content);
    let mut anchors = derive_header_anchors(&headings);
    anchors.extend(collect_block_anchors(content, &patterns));
    let links = collect_links(path, content, &patterns);
    Document::new(path.to_path_buf(), content.to_string(), headings, anchors, links)
}

/// Compiled patterns for one parse pass.
struct Patterns {
    block_def: Regex,
    caret: Regex,
    citation: Regex,
    inline_open: Regex,
    marker_comment: Regex,
    marker_percent: Regex,
    wiki: Regex,
}

impl Patterns {
    fn new() -> Self {
        Self {
            block_def: Regex::new(r"(?:^|\s)\^([A-Za-z0-9][A-Za-z0-9_-]*)\s*$")
                .expect("valid regex"),
            caret: Regex::new(r"\^([A-Za-z0-9][A-Za-z0-9._-]*)").expect("valid regex"),
            citation: Regex::new(r"\[Source:\s*([^\]]+)\]").expect("valid regex"),
            inline_open: Regex::new(r"\[([^\]]*)\]\(").expect("valid regex"),
            marker_comment: Regex::new(r"<!--\s*(.*?)\s*-->").expect("valid regex"),
            marker_percent: Regex::new(r"%%\s*([^%]*?)\s*%%").expect("valid regex"),
            wiki: Regex::new(r"\[\[([^\[\]]+)\]\]").expect("valid regex"),
        }
    }
}

/// Collect all ATX headings outside fenced code blocks.
fn collect_headings(content: &str) -> Vec<Heading> {
    let mut headings = Vec::new();
    let mut in_fence = false;

    for (idx, line) in content.lines().enumerate() {
        if is_fence_delimiter(line) {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        let Some(heading) = parse_heading_line(line, line_number(idx)) else {
            continue;
        };
        headings.push(heading);
    }

    headings
}

/// Parse a single `# Heading` line.
pub(crate) fn parse_heading_line(line: &str, line_no: u32) -> Option<Heading> {
    let hashes = line.len() - line.trim_start_matches('#').len();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = line.get(hashes..)?;
    if !rest.starts_with(' ') && !rest.starts_with('\t') {
        return None;
    }
    let text = rest.trim();
    if text.is_empty() {
        return None;
    }
    Some(Heading {
        level: u8::try_from(hashes).unwrap_or(6),
        line: line_no,
        text: text.to_string(),
    })
}

/// Derive header anchors from the heading list. One heading yields exactly
/// one anchor entry carrying both id variants; headings are never re-scanned
/// by a second pattern pass.
fn derive_header_anchors(headings: &[Heading]) -> Vec<Anchor> {
    headings
        .iter()
        .map(|h| Anchor {
            encoded: Some(document::encode_header_anchor(&h.text)),
            id: h.text.clone(),
            kind: AnchorKind::Header,
        })
        .collect()
}

/// Collect block anchors from trailing `^id` definitions.
fn collect_block_anchors(content: &str, patterns: &Patterns) -> Vec<Anchor> {
    let mut anchors = Vec::new();
    let mut in_fence = false;

    for line in content.lines() {
        if is_fence_delimiter(line) {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        let Some(cap) = patterns.block_def.captures(line) else {
            continue;
        };
        let Some(id) = cap.get(1) else { continue };
        anchors.push(Anchor {
            encoded: None,
            id: id.as_str().to_string(),
            kind: AnchorKind::Block,
        });
    }

    anchors
}

/// Extract every citation link from the document, line by line.
fn collect_links(source: &Path, content: &str, patterns: &Patterns) -> Vec<Link> {
    let source_dir = source.parent().unwrap_or(Path::new("")).to_path_buf();
    let mut links = Vec::new();
    let mut in_fence = false;

    for (idx, line) in content.lines().enumerate() {
        if is_fence_delimiter(line) {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        scan_line(line, line_number(idx), &source_dir, patterns, &mut links);
    }

    links
}

/// Scan one line for all link syntaxes. Later passes skip spans already
/// consumed by an earlier syntax, so a caret inside a wiki fragment is not
/// re-captured as a prose block reference.
fn scan_line(
    line: &str,
    line_no: u32,
    source_dir: &Path,
    patterns: &Patterns,
    links: &mut Vec<Link>,
) {
    let mut consumed: Vec<Range<usize>> = Vec::new();
    collect_wiki_links(line, line_no, source_dir, patterns, links, &mut consumed);
    collect_inline_links(line, line_no, source_dir, patterns, links, &mut consumed);
    collect_citation_links(line, line_no, source_dir, patterns, links, &mut consumed);
    collect_block_refs(line, line_no, patterns, links, &consumed);
}

/// Extract `[[target#fragment|display]]` wiki links.
fn collect_wiki_links(
    line: &str,
    line_no: u32,
    source_dir: &Path,
    patterns: &Patterns,
    links: &mut Vec<Link>,
    consumed: &mut Vec<Range<usize>>,
) {
    for cap in patterns.wiki.captures_iter(line) {
        let Some(whole) = cap.get(0) else { continue };
        if is_embed(line, whole.start()) {
            continue;
        }
        consumed.push(whole.range());

        let Some(inner) = cap.get(1) else { continue };
        let (address, display) = match inner.as_str().split_once('|') {
            Some((a, d)) => (a.trim(), d.trim()),
            None => (inner.as_str().trim(), inner.as_str().trim()),
        };
        let (target, fragment) = split_fragment(address);

        let raw = RawLink {
            end: whole.end(),
            fragment: fragment.map(str::to_string),
            kind: LinkKind::Wiki,
            raw_written: target.map(str::to_string),
            start: whole.start(),
            target: target.map(with_markdown_extension),
            text: display.to_string(),
        };
        links.push(finish_link(raw, source_dir, line, line_no, patterns));
    }
}

/// Extract standard `[text](target#fragment)` links. The destination is
/// consumed with a balanced-parenthesis scan, so a fragment containing
/// parenthesized text is captured in full.
fn collect_inline_links(
    line: &str,
    line_no: u32,
    source_dir: &Path,
    patterns: &Patterns,
    links: &mut Vec<Link>,
    consumed: &mut Vec<Range<usize>>,
) {
    for cap in patterns.inline_open.captures_iter(line) {
        let Some(whole) = cap.get(0) else { continue };
        if overlaps(consumed, whole.start()) || is_embed(line, whole.start()) {
            continue;
        }

        let open = whole.end().saturating_sub(1);
        let Some((destination, close)) = balanced_destination(line, open) else {
            continue;
        };
        consumed.push(whole.start()..close.saturating_add(1));

        let destination = destination.trim();
        if destination.is_empty()
            || destination.starts_with("http://")
            || destination.starts_with("https://")
        {
            continue;
        }

        let (target, fragment) = split_fragment(destination);
        let text = cap.get(1).map(|m| m.as_str()).unwrap_or("").to_string();
        let raw = RawLink {
            end: close.saturating_add(1),
            fragment: fragment.map(str::to_string),
            kind: LinkKind::Inline,
            raw_written: target.map(str::to_string),
            start: whole.start(),
            target: target.map(str::to_string),
            text,
        };
        links.push(finish_link(raw, source_dir, line, line_no, patterns));
    }
}

/// Extract `[Source: target#fragment]` citation shorthand.
fn collect_citation_links(
    line: &str,
    line_no: u32,
    source_dir: &Path,
    patterns: &Patterns,
    links: &mut Vec<Link>,
    consumed: &mut Vec<Range<usize>>,
) {
    for cap in patterns.citation.captures_iter(line) {
        let Some(whole) = cap.get(0) else { continue };
        if overlaps(consumed, whole.start()) {
            continue;
        }
        consumed.push(whole.range());

        let Some(inner) = cap.get(1) else { continue };
        let address = inner.as_str().trim();
        let (target, fragment) = split_fragment(address);

        let raw = RawLink {
            end: whole.end(),
            fragment: fragment.map(str::to_string),
            kind: LinkKind::Citation,
            raw_written: target.map(str::to_string),
            start: whole.start(),
            target: target.map(str::to_string),
            text: address.to_string(),
        };
        links.push(finish_link(raw, source_dir, line, line_no, patterns));
    }
}

/// Extract caret block references from prose. A trailing `^id` is a block
/// anchor definition, not a citation; version-shaped and purely numeric
/// remainders are false positives.
fn collect_block_refs(
    line: &str,
    line_no: u32,
    patterns: &Patterns,
    links: &mut Vec<Link>,
    consumed: &[Range<usize>],
) {
    for cap in patterns.caret.captures_iter(line) {
        let Some(whole) = cap.get(0) else { continue };
        let Some(raw_id) = cap.get(1) else { continue };
        if overlaps(consumed, whole.start()) || !starts_token(line, whole.start()) {
            continue;
        }

        let id = raw_id.as_str().trim_end_matches(['.', ',', ';', ':', '!', '?']);
        if id.is_empty() || caret_false_positive(id) {
            continue;
        }

        // Untrimmed token at end of line: a block anchor definition.
        let tail = line.get(whole.end()..).unwrap_or("");
        if tail.trim().is_empty() && id.len() == raw_id.as_str().len() {
            continue;
        }

        let end = whole.start().saturating_add(1).saturating_add(id.len());
        links.push(Link {
            anchor: Some(id.to_string()),
            anchor_kind: Some(AnchorKind::Block),
            column: column_number(whole.start()),
            directive: detect_directive(line, end, patterns),
            kind: LinkKind::BlockRef,
            line: line_no,
            scope: LinkScope::Internal,
            target_abs: None,
            target_raw: None,
            target_rel: None,
            text: format!("^{id}"),
            validation: None,
        });
    }
}

/// A link located on a line, before path resolution.
struct RawLink {
    end: usize,
    fragment: Option<String>,
    kind: LinkKind,
    raw_written: Option<String>,
    start: usize,
    target: Option<String>,
    text: String,
}

/// Resolve paths, classify the fragment, and attach any trailing directive.
fn finish_link(
    raw: RawLink,
    source_dir: &Path,
    line: &str,
    line_no: u32,
    patterns: &Patterns,
) -> Link {
    let (anchor, anchor_kind) = classify_fragment(raw.fragment.as_deref());

    let (scope, target_abs, target_rel) = match &raw.target {
        Some(target) => {
            let abs = normalize_path(&source_dir.join(target));
            let rel = normalize_path(Path::new(target));
            (LinkScope::CrossDocument, Some(abs), Some(rel))
        },
        None => (LinkScope::Internal, None, None),
    };

    Link {
        anchor,
        anchor_kind,
        column: column_number(raw.start),
        directive: detect_directive(line, raw.end, patterns),
        kind: raw.kind,
        line: line_no,
        scope,
        target_abs,
        target_raw: raw.raw_written,
        target_rel,
        text: raw.text,
        validation: None,
    }
}

/// Split a `target#fragment` address. An empty target means the link is
/// internal; an empty fragment means the link addresses the whole file.
fn split_fragment(address: &str) -> (Option<&str>, Option<&str>) {
    match address.split_once('#') {
        Some((target, fragment)) => {
            let target = target.trim();
            let fragment = fragment.trim();
            (
                if target.is_empty() { None } else { Some(target) },
                if fragment.is_empty() { None } else { Some(fragment) },
            )
        },
        None => {
            let target = address.trim();
            if target.is_empty() { (None, None) } else { (Some(target), None) }
        },
    }
}

/// Classify a fragment into a header or block anchor id.
fn classify_fragment(fragment: Option<&str>) -> (Option<String>, Option<AnchorKind>) {
    let Some(fragment) = fragment else {
        return (None, None);
    };
    let fragment = fragment.trim();
    if fragment.is_empty() {
        return (None, None);
    }
    match fragment.strip_prefix('^') {
        Some(block) => (Some(block.to_string()), Some(AnchorKind::Block)),
        None => (Some(fragment.to_string()), Some(AnchorKind::Header)),
    }
}

/// Scan line trivia after a link for the first extraction marker, either
/// `%% ... %%` or `<!-- ... -->`, and parse its directive.
fn detect_directive(line: &str, from: usize, patterns: &Patterns) -> Option<ExtractDirective> {
    let rest = line.get(from..)?;

    let percent = patterns.marker_percent.captures(rest);
    let comment = patterns.marker_comment.captures(rest);

    let inner = match (percent, comment) {
        (Some(p), Some(c)) => {
            let p_start = p.get(0).map_or(usize::MAX, |m| m.start());
            let c_start = c.get(0).map_or(usize::MAX, |m| m.start());
            if p_start <= c_start { p.get(1) } else { c.get(1) }
        },
        (Some(p), None) => p.get(1),
        (None, Some(c)) => c.get(1),
        (None, None) => None,
    }?;

    parse_directive(inner.as_str())
}

/// Parse marker inner text: an optional `extract:` prefix followed by
/// `force` or `stop`, case-insensitive.
fn parse_directive(inner: &str) -> Option<ExtractDirective> {
    let lowered = inner.trim().to_ascii_lowercase();
    let body = lowered.strip_prefix("extract:").map(str::trim).unwrap_or(&lowered);
    match body {
        "force" => Some(ExtractDirective::Force),
        "stop" => Some(ExtractDirective::Stop),
        _ => None,
    }
}

/// Find the balanced closing parenthesis of an inline link destination.
/// Returns the destination text and the index of the closing parenthesis.
fn balanced_destination(line: &str, open: usize) -> Option<(String, usize)> {
    let rest = line.get(open.saturating_add(1)..)?;
    let mut depth = 0u32;

    for (offset, c) in rest.char_indices() {
        match c {
            '(' => depth = depth.saturating_add(1),
            ')' if depth == 0 => {
                let destination = rest.get(..offset)?.to_string();
                return Some((destination, open.saturating_add(1).saturating_add(offset)));
            },
            ')' => depth = depth.saturating_sub(1),
            _ => {},
        }
    }

    None
}

/// A caret remainder that is purely numeric or digit-dot version-shaped
/// (`^14.0.1`) is not a citation.
fn caret_false_positive(id: &str) -> bool {
    let Some(first) = id.chars().next() else {
        return true;
    };
    first.is_ascii_digit() && id.chars().all(|c| c.is_ascii_digit() || c == '.')
}

/// Wiki targets without an extension address markdown files.
pub(crate) fn with_markdown_extension(target: &str) -> String {
    if Path::new(target).extension().is_some() {
        target.to_string()
    } else {
        format!("{target}.md")
    }
}

/// Check whether a position falls inside any already-consumed span.
fn overlaps(consumed: &[Range<usize>], position: usize) -> bool {
    consumed.iter().any(|r| r.contains(&position))
}

/// A link preceded by `!` is an embed, not a citation.
fn is_embed(line: &str, start: usize) -> bool {
    start
        .checked_sub(1)
        .and_then(|i| line.get(i..start))
        .is_some_and(|prev| prev == "!")
}

/// A caret token must start at a word boundary.
fn starts_token(line: &str, start: usize) -> bool {
    let Some(i) = start.checked_sub(1) else {
        return true;
    };
    line.get(i..start)
        .and_then(|s| s.chars().next())
        .is_none_or(|c| !c.is_alphanumeric())
}

/// Lines opening or closing a fenced code block.
fn is_fence_delimiter(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("```") || trimmed.starts_with("~~~")
}

fn line_number(idx: usize) -> u32 {
    u32::try_from(idx).unwrap_or(u32::MAX).saturating_add(1)
}

fn column_number(start: usize) -> u32 {
    u32::try_from(start).unwrap_or(u32::MAX).saturating_add(1)
}

/// Collapse `.` and `..` components in a path without touching the
/// filesystem. Preserves leading `..` when there is nothing left to pop.
pub(crate) fn normalize_path(path: &Path) -> PathBuf {
    let mut components: Vec<std::path::Component<'_>> = Vec::new();
    for component in path.components() {
        push_normalized_component(&mut components, component);
    }
    components.iter().collect()
}

/// Handle a single path component during normalization.
/// Pops the last component for `..` when possible, preserves it otherwise.
fn push_normalized_component<'a>(
    components: &mut Vec<std::path::Component<'a>>,
    component: std::path::Component<'a>,
) {
    match component {
        std::path::Component::CurDir => {},
        std::path::Component::ParentDir => {
            let can_pop = matches!(
                components.last(),
                Some(c) if !matches!(c, std::path::Component::ParentDir)
            );
            if can_pop {
                components.pop();
            } else {
                components.push(component);
            }
        },
        other => components.push(other),
    }
}


#[cfg(test)]
#[allow(clippy::missing_panics_doc)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Vec<Link> {
        parse_content(Path::new("/vault/docs/source.md"), text)
            .links()
            .to_vec()
    }

    #[test]
    fn inline_link_resolves_relative_to_source() {
        let links = parse("See [intro](../notes/target.md#Intro).\n");
        assert_eq!(links.len(), 1);
        let link = &links[0];
        assert_eq!(link.kind, LinkKind::Inline);
        assert_eq!(link.scope, LinkScope::CrossDocument);
        assert_eq!(link.target_raw.as_deref(), Some("../notes/target.md"));
        assert_eq!(
            link.target_abs.as_deref(),
            Some(Path::new("/vault/notes/target.md"))
        );
        assert_eq!(link.anchor.as_deref(), Some("Intro"));
        assert_eq!(link.anchor_kind, Some(AnchorKind::Header));
        assert_eq!(link.line, 1);
        assert_eq!(link.column, 5);
    }

    #[test]
    fn fragment_with_balanced_parens_is_captured_in_full() {
        let links = parse("[x](doc.md#Heading (with parens))\n");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].anchor.as_deref(), Some("Heading (with parens)"));
    }

    #[test]
    fn external_urls_are_not_citations() {
        let links = parse("[site](https://example.com/page#frag)\n");
        assert!(links.is_empty());
    }

    #[test]
    fn fragment_only_inline_link_is_internal() {
        let links = parse("[up](#Overview)\n");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].scope, LinkScope::Internal);
        assert!(links[0].target_abs.is_none());
        assert_eq!(links[0].anchor.as_deref(), Some("Overview"));
    }

    #[test]
    fn wiki_link_gets_markdown_extension() {
        let links = parse("See [[notes/target#Intro|the intro]].\n");
        assert_eq!(links.len(), 1);
        let link = &links[0];
        assert_eq!(link.kind, LinkKind::Wiki);
        assert_eq!(link.target_raw.as_deref(), Some("notes/target"));
        assert_eq!(
            link.target_abs.as_deref(),
            Some(Path::new("/vault/docs/notes/target.md"))
        );
        assert_eq!(link.text, "the intro");
    }

    #[test]
    fn wiki_block_fragment_is_a_block_anchor() {
        let links = parse("[[notes/target#^blk42]]\n");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].anchor.as_deref(), Some("blk42"));
        assert_eq!(links[0].anchor_kind, Some(AnchorKind::Block));
    }

    #[test]
    fn citation_shorthand_is_recognized() {
        let links = parse("[Source: architecture/data-model.md#Entities]\n");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].kind, LinkKind::Citation);
        assert_eq!(links[0].target_raw.as_deref(), Some("architecture/data-model.md"));
        assert_eq!(links[0].anchor.as_deref(), Some("Entities"));
    }

    #[test]
    fn caret_in_prose_is_a_block_reference() {
        let links = parse("This satisfies ^FR1 and nothing else.\n");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].kind, LinkKind::BlockRef);
        assert_eq!(links[0].scope, LinkScope::Internal);
        assert_eq!(links[0].anchor.as_deref(), Some("FR1"));
    }

    #[test]
    fn caret_version_string_is_rejected() {
        assert!(parse("| dep | ^14.0.1 |\n").is_empty());
    }

    #[test]
    fn caret_pure_number_is_rejected() {
        assert!(parse("see note ^123 maybe\n").is_empty());
    }

    #[test]
    fn trailing_caret_is_a_definition_not_a_citation() {
        let text = "Requirement body text. ^FR1\n";
        let document = parse_content(Path::new("/vault/docs/source.md"), text);
        assert!(document.links().is_empty());
        assert!(document.has_anchor("^FR1"));
    }

    #[test]
    fn caret_inside_wiki_fragment_is_not_recaptured() {
        let links = parse("[[notes/target#^blk42]]\n");
        assert_eq!(links.len(), 1, "only the wiki link, no prose block ref");
    }

    #[test]
    fn percent_marker_attaches_stop_directive() {
        let links = parse("[x](a.md#B) %% extract: stop %%\n");
        assert_eq!(links[0].directive, Some(ExtractDirective::Stop));
    }

    #[test]
    fn comment_marker_attaches_force_directive() {
        let links = parse("[x](a.md) <!-- extract: force -->\n");
        assert_eq!(links[0].directive, Some(ExtractDirective::Force));
    }

    #[test]
    fn bare_directive_without_prefix_is_accepted() {
        let links = parse("[x](a.md#B) %% FORCE %%\n");
        assert_eq!(links[0].directive, Some(ExtractDirective::Force));
    }

    #[test]
    fn unrelated_trivia_is_not_a_directive() {
        let links = parse("[x](a.md#B) %% just a comment %%\n");
        assert_eq!(links[0].directive, None);
    }

    #[test]
    fn marker_before_link_does_not_attach() {
        let links = parse("%% extract: stop %% then [x](a.md#B)\n");
        assert_eq!(links[0].directive, None);
    }

    #[test]
    fn headings_carry_level_and_line() {
        let document = parse_content(
            Path::new("/vault/docs/source.md"),
            "# One\n\n### Three\n\nbody\n",
        );
        assert!(document.has_anchor("One"));
        assert!(document.has_anchor("Three"));
    }

    #[test]
    fn fenced_code_is_ignored() {
        let text = "```\n[x](fake.md#A)\n# Not A Heading\n```\n[y](real.md#B)\n";
        let document = parse_content(Path::new("/vault/docs/source.md"), text);
        assert_eq!(document.links().len(), 1);
        assert_eq!(document.links()[0].target_raw.as_deref(), Some("real.md"));
        assert!(!document.has_anchor("Not A Heading"));
    }

    #[test]
    fn embeds_are_skipped() {
        assert!(parse("![alt](image.png)\n").is_empty());
        assert!(parse("![[embedded-note]]\n").is_empty());
    }

    #[test]
    fn normalize_collapses_dot_segments() {
        assert_eq!(
            normalize_path(Path::new("/a/b/../c/./d.md")),
            PathBuf::from("/a/c/d.md")
        );
        assert_eq!(normalize_path(Path::new("../x.md")), PathBuf::from("../x.md"));
    }
}
