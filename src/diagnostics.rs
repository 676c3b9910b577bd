use std::fmt::Write as _;

use crate::error::Error;
use crate::extractor::{ExtractOutcome, Extraction};
use crate::types::Validation;
use crate::validator::DocumentValidation;

const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Render an error as valid markdown with bold headings and print to stderr.
pub fn print_error(e: &Error) {
    let md = render_error(e);
    for line in md.lines() {
        if line.starts_with('#') {
            eprintln!("{BOLD}{line}{RESET}");
        } else {
            eprintln!("{line}");
        }
    }
}

/// Render an error as a structured markdown diagnostic.
///
/// Each variant produces a block with what happened and, where it helps,
/// how to fix it. Designed to be readable by both humans and LLM agents.
pub fn render_error(e: &Error) -> String {
    match e {
        Error::FileNotFound { path } => format!(
            "\
# Error: File Not Found

`{}` does not exist.
",
            path.display()
        ),

        Error::FileTooLarge { file, size_bytes, max_bytes } => format!(
            "\
# Error: File Too Large

`{}` is {size_bytes} bytes (max {max_bytes}).
",
            file.display()
        ),

        Error::ScopeNotFound { path } => format!(
            "\
# Error: Scope Not Found

Scope directory `{}` does not exist.

## Fix

Pass an existing directory with `--scope`, or fix the `scope` entry in
`.citecheck.toml`.
",
            path.display()
        ),

        Error::Shared(inner) => render_error(inner),

        Error::Io(e) => format!(
            "\
# Error: I/O

{e}
"
        ),

        Error::Json(e) => format!(
            "\
# Error: JSON Serialization

{e}
"
        ),

        Error::TomlDe(e) => format!(
            "\
# Error: Invalid TOML

{e}

## Fix

Check `.citecheck.toml` for syntax errors.
"
        ),
    }
}

/// Render a validation run as an aligned per-link report plus summary.
pub fn render_validation(source: &str, validation: &DocumentValidation) -> String {
    let mut out = String::new();

    for link in &validation.links {
        let location = format!("{source}:{}", link.line);
        match &link.validation {
            Some(Validation::Valid) => {
                let _ = writeln!(out, "OK      {location}  {}", link.describe_target());
            },
            Some(Validation::Warning { path_conversion }) => {
                let _ = writeln!(
                    out,
                    "FRAGILE {location}  {} -> {}",
                    link.describe_target(),
                    path_conversion.recommended
                );
            },
            Some(Validation::Error { message, suggestion }) => {
                let _ = writeln!(out, "BROKEN  {location}  {} ({message})", link.describe_target());
                if let Some(suggestion) = suggestion {
                    let _ = writeln!(out, "        did you mean `{suggestion}`?");
                }
            },
            None => {},
        }
    }

    let summary = validation.summary;
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{} links: {} valid, {} fragile, {} broken",
        summary.total, summary.valid, summary.warning, summary.error
    );
    if summary.warning > 0 || summary.error > 0 {
        let _ = writeln!(out, "hint: run `citecheck fix {source}` to apply suggested rewrites");
    }

    out
}

/// Render an extraction run: per-link outcomes, then the aggregate stats.
pub fn render_extraction(extraction: &Extraction) -> String {
    let mut out = String::new();

    for report in &extraction.link_reports {
        match report.outcome {
            ExtractOutcome::Success => {
                let id = report.block.as_deref().unwrap_or("");
                let short = id.get(..12).unwrap_or(id);
                let _ = writeln!(out, "STORED  :{}  {}  -> {short}", report.source_line, report.target);
            },
            ExtractOutcome::Skipped => {
                let _ = writeln!(
                    out,
                    "SKIP    :{}  {}  ({})",
                    report.source_line, report.target, report.reason
                );
            },
            ExtractOutcome::Error => {
                let _ = writeln!(
                    out,
                    "ERROR   :{}  {}  ({})",
                    report.source_line, report.target, report.reason
                );
            },
        }
    }

    let stats = extraction.stats;
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{} links, {} unique blocks, {} duplicates, {} bytes saved ({:.1}% compression)",
        stats.total_links,
        stats.unique_content,
        stats.duplicate_content_detected,
        stats.tokens_saved,
        stats.compression_ratio * 100.0
    );

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Link, LinkKind, LinkScope, PathConversion, ValidationSummary};

    fn enriched(validation: Validation) -> Link {
        Link {
            anchor: Some("Intro".to_string()),
            anchor_kind: Some(crate::types::AnchorKind::Header),
            column: 1,
            directive: None,
            kind: LinkKind::Inline,
            line: 3,
            scope: LinkScope::CrossDocument,
            target_abs: None,
            target_raw: Some("target.md".to_string()),
            target_rel: Some("target.md".into()),
            text: "t".to_string(),
            validation: Some(validation),
        }
    }

    #[test]
    fn broken_links_render_their_suggestion() {
        let links = vec![enriched(Validation::Error {
            message: "anchor `Intro` not found in target.md".to_string(),
            suggestion: Some("Introduction".to_string()),
        })];
        let summary = ValidationSummary::from_links(&links);
        let rendered = render_validation("source.md", &DocumentValidation { links, summary });
        assert!(rendered.contains("BROKEN  source.md:3"));
        assert!(rendered.contains("did you mean `Introduction`?"));
        assert!(rendered.contains("1 links: 0 valid, 0 fragile, 1 broken"));
    }

    #[test]
    fn fragile_links_render_the_conversion() {
        let links = vec![enriched(Validation::Warning {
            path_conversion: PathConversion {
                recommended: "subdir/target.md#Intro".to_string(),
            },
        })];
        let summary = ValidationSummary::from_links(&links);
        let rendered = render_validation("source.md", &DocumentValidation { links, summary });
        assert!(rendered.contains("-> subdir/target.md#Intro"));
    }
}
