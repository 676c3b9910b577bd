//! Core CLI commands for citecheck: check, extract, fix, anchors.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::cache::DocumentCache;
use crate::config::Config;
use crate::diagnostics;
use crate::error::Error;
use crate::extractor::{self, ExtractOptions};
use crate::resolver::FilenameIndex;
use crate::types::{AnchorKind, Link, LinkScope, Validation, ValidationSummary};
use crate::validator::Validator;

/// A pending rewrite on one line of the source document.
struct FixAction {
    /// The 1-based line number to rewrite.
    line: u32,
    /// Replacement text.
    new_text: String,
    /// The broken text to replace on that line.
    old_text: String,
}

/// Everything a command needs to run the pipeline for one source document.
struct Session {
    cache: DocumentCache,
    config: Config,
    source: PathBuf,
    validator: Validator,
}

/// List the anchors a document exposes, both id variants for headers.
///
/// # Errors
///
/// Returns cache errors if the document cannot be read or parsed.
pub async fn anchors(file: &Path) -> Result<(), Error> {
    let cache = DocumentCache::new();
    let document = cache.resolve(file).await?;

    for anchor in document.anchors() {
        match anchor.kind {
            AnchorKind::Header => match &anchor.encoded {
                Some(encoded) if encoded != &anchor.id => {
                    println!("#{}  (encoded: #{encoded})", anchor.id);
                },
                _ => println!("#{}", anchor.id),
            },
            AnchorKind::Block => println!("#^{}", anchor.id),
        }
    }

    return Ok(());
}

/// Validate every citation in a source document and render the result.
///
/// # Errors
///
/// Returns errors from config loading, scope indexing, or reading the
/// source document itself. Broken links are statuses, not errors.
pub async fn check(source: &Path, scope: Option<&Path>, json: bool) -> Result<ExitCode, Error> {
    let session = open_session(source, scope)?;
    let result = session.validator.validate(&session.source).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        let label = session.source.display().to_string();
        print!("{}", diagnostics::render_validation(&label, &result));
    }

    return Ok(exit_code_for(&result.summary));
}

/// Validate, then extract and deduplicate referenced content.
///
/// # Errors
///
/// Returns errors from config loading, scope indexing, or reading the
/// source document. Per-link extraction failures land in the report.
pub async fn extract(
    source: &Path,
    scope: Option<&Path>,
    full_files: bool,
    json: bool,
) -> Result<ExitCode, Error> {
    let session = open_session(source, scope)?;
    let result = session.validator.validate(&session.source).await?;

    let options = ExtractOptions {
        include_full_files: full_files || session.config.extract_full_files,
    };
    let extraction = extractor::extract(&session.cache, &result.links, options).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&extraction)?);
    } else {
        print!("{}", diagnostics::render_extraction(&extraction));
    }

    return Ok(exit_code_for(&result.summary));
}

/// Rewrite fragile and broken citations that have a confident correction:
/// fallback path conversions and close anchor matches. All corrections are
/// computed first, then the source file is replaced once.
///
/// # Errors
///
/// Returns errors from validation or from rewriting the source file.
pub async fn fix(source: &Path, scope: Option<&Path>) -> Result<(), Error> {
    let session = open_session(source, scope)?;
    let result = session.validator.validate(&session.source).await?;

    let mut fixes: Vec<FixAction> = Vec::new();
    let mut unfixable: Vec<String> = Vec::new();
    for link in &result.links {
        classify_link_for_fix(link, &mut fixes, &mut unfixable);
    }

    if fixes.is_empty() && unfixable.is_empty() {
        eprintln!("All citations valid, nothing to fix.");
        return Ok(());
    }

    if !fixes.is_empty() {
        apply_fixes(&session.source, &fixes)?;
    }

    print_fix_report(&fixes, &unfixable);
    return Ok(());
}

/// Rewrite the source file once, through a temporary file and rename.
///
/// # Errors
///
/// Returns `Error::Io` if the file cannot be read or rewritten.
fn apply_fixes(path: &Path, fixes: &[FixAction]) -> Result<(), Error> {
    let content = std::fs::read_to_string(path)?;
    let mut lines: Vec<String> = content.lines().map(String::from).collect();

    for fix in fixes {
        rewrite_line(&mut lines, fix);
    }

    let mut output = lines.join("\n");
    if content.ends_with('\n') {
        output.push('\n');
    }

    let tmp = path.with_extension("md.citecheck-tmp");
    std::fs::write(&tmp, output)?;
    std::fs::rename(&tmp, path)?;
    return Ok(());
}

/// Whether a suggestion on this link is an anchor correction. Anchor
/// errors are the ones whose target file was actually found.
fn anchor_fix_applies(link: &Link) -> bool {
    if link.anchor_kind != Some(AnchorKind::Header) {
        return false;
    }
    return match link.scope {
        LinkScope::Internal => true,
        LinkScope::CrossDocument => link.target_abs.as_deref().is_some_and(Path::is_file),
    };
}

/// Sort one validated link into fixable (confident rewrite) or unfixable.
fn classify_link_for_fix(link: &Link, fixes: &mut Vec<FixAction>, unfixable: &mut Vec<String>) {
    match &link.validation {
        Some(Validation::Warning { path_conversion }) => {
            let Some(old) = link.target_raw.as_deref() else {
                return;
            };
            let recommended = &path_conversion.recommended;
            let new_path = recommended.split('#').next().unwrap_or(recommended);
            eprintln!("fix: :{}  {old} -> {new_path}", link.line);
            fixes.push(FixAction {
                line: link.line,
                new_text: new_path.to_string(),
                old_text: old.to_string(),
            });
        },
        Some(Validation::Error { suggestion: Some(suggestion), .. }) => {
            if anchor_fix_applies(link) {
                let Some(old_anchor) = link.anchor.as_deref() else {
                    return;
                };
                eprintln!("fix: :{}  #{old_anchor} -> #{suggestion}", link.line);
                fixes.push(FixAction {
                    line: link.line,
                    new_text: format!("#{suggestion}"),
                    old_text: format!("#{old_anchor}"),
                });
            } else {
                // Path suggestions point at a differently-named file;
                // rewriting those needs human judgment.
                unfixable.push(format!(
                    ":{}  {}  (try `{suggestion}`)",
                    link.line,
                    link.describe_target()
                ));
            }
        },
        Some(Validation::Error { message, suggestion: None }) => {
            unfixable.push(format!(
                ":{}  {}  ({message})",
                link.line,
                link.describe_target()
            ));
        },
        _ => {},
    }
    return;
}

/// Exit code priority: broken (2) > fragile (1) > clean (0).
fn exit_code_for(summary: &ValidationSummary) -> ExitCode {
    if summary.error > 0 {
        return ExitCode::from(2);
    } else if summary.warning > 0 {
        return ExitCode::from(1);
    } else {
        return ExitCode::SUCCESS;
    }
}

/// Build the cache, config, scope index, and validator for one source.
///
/// # Errors
///
/// Returns errors from path absolutization, config loading, or scope
/// index construction.
fn open_session(source: &Path, scope_flag: Option<&Path>) -> Result<Session, Error> {
    let source = std::path::absolute(source)?;
    let source_dir = source.parent().unwrap_or(Path::new("/")).to_path_buf();
    let config = Config::load(&source_dir)?;

    let scope = match scope_flag {
        Some(dir) => Some(std::path::absolute(dir)?),
        None => match &config.scope {
            Some(dir) if dir.is_absolute() => Some(dir.clone()),
            Some(dir) => Some(source_dir.join(dir)),
            None => None,
        },
    };

    let fallback = match &scope {
        Some(dir) => Some(FilenameIndex::build(dir, config.similarity_threshold)?),
        None => None,
    };

    let cache = DocumentCache::new();
    let validator = Validator::new(cache.clone(), scope, fallback, config.similarity_threshold);
    return Ok(Session { cache, config, source, validator });
}

/// Print a markdown summary of fix results.
fn print_fix_report(fixes: &[FixAction], unfixable: &[String]) {
    if !fixes.is_empty() {
        eprintln!("## Fixed\n");
        for fix in fixes {
            eprintln!("- :{}  `{}` -> `{}`", fix.line, fix.old_text, fix.new_text);
        }
        eprintln!();
    }

    if !unfixable.is_empty() {
        eprintln!("## Unfixable\n");
        for entry in unfixable {
            eprintln!("- {entry}");
        }
        eprintln!();
    }
    return;
}

/// Replace broken text on a specific line.
fn rewrite_line(lines: &mut [String], fix: &FixAction) {
    let idx = usize::try_from(fix.line).unwrap_or(0).saturating_sub(1);
    let Some(line) = lines.get_mut(idx) else { return };
    *line = line.replace(&fix.old_text, &fix.new_text);
    return;
}
