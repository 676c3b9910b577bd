//! Content extraction: the eligibility strategy chain, content-addressed
//! deduplication, and aggregate statistics derived from the final index.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use sha2::{Digest as _, Sha256};

use crate::cache::DocumentCache;
use crate::types::{AnchorKind, ExtractDirective, Link, LinkScope, Validation};

/// Caller options for an extraction run.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractOptions {
    /// Whether links without a fragment (whole files) are eligible.
    pub include_full_files: bool,
}

/// A distinct piece of referenced content. Created on first sighting of its
/// hash within a run, never mutated, referenced by every later repeat.
#[derive(Debug, Clone, Serialize)]
pub struct ContentBlock {
    /// SHA-256 of the extracted text, lowercase hex.
    pub id: String,
    /// Extracted length in bytes.
    pub length: usize,
    /// The extracted text itself.
    pub text: String,
}

/// Per-link extraction outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractOutcome {
    /// Target or anchor vanished between validation and extraction.
    Error,
    /// Ineligible by the strategy chain.
    Skipped,
    /// Content extracted and indexed.
    Success,
}

/// One report entry per link that entered eligibility analysis.
#[derive(Debug, Clone, Serialize)]
pub struct LinkReport {
    /// Content block id for successful extractions, `None` otherwise.
    pub block: Option<String>,
    /// What happened to this link.
    pub outcome: ExtractOutcome,
    /// Human-readable reason for the outcome.
    pub reason: String,
    /// One-based line of the link in its source document.
    pub source_line: u32,
    /// `target#fragment` description of the link.
    pub target: String,
}

/// Aggregate statistics. Recomputed from the final index and report list,
/// never hand-incremented alongside them.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ExtractionStats {
    /// `tokens_saved / (kept_bytes + tokens_saved)`, 0 when nothing was saved.
    pub compression_ratio: f64,
    /// Number of repeat sightings of already-indexed content.
    pub duplicate_content_detected: usize,
    /// Bytes that were not re-stored thanks to deduplication.
    pub tokens_saved: usize,
    /// Links that entered eligibility analysis.
    pub total_links: usize,
    /// Distinct content blocks in the index.
    pub unique_content: usize,
}

/// The single output shape of an extraction run.
#[derive(Serialize)]
pub struct Extraction {
    /// Deduplicated content blocks, in first-sighting order.
    pub content_index: Vec<ContentBlock>,
    /// Per-link outcomes referencing blocks by id.
    pub link_reports: Vec<LinkReport>,
    /// Derived aggregate statistics.
    pub stats: ExtractionStats,
}

/// Extraction eligibility, decided by the first applicable strategy.
enum Eligibility {
    Extract(&'static str),
    Skip(&'static str),
}

/// Extract content for every eligible validated link. The content index is
/// append-only: a late per-link failure never corrupts earlier entries.
pub async fn extract(
    cache: &DocumentCache,
    links: &[Link],
    options: ExtractOptions,
) -> Extraction {
    let mut index: Vec<ContentBlock> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut reports: Vec<LinkReport> = Vec::new();

    for link in links {
        if prefiltered(link) {
            continue;
        }
        match eligibility(link, options) {
            Eligibility::Skip(reason) => {
                reports.push(report(link, ExtractOutcome::Skipped, None, reason.to_string()));
            },
            Eligibility::Extract(reason) => match extract_one(cache, link).await {
                Err(failure) => {
                    reports.push(report(link, ExtractOutcome::Error, None, failure));
                },
                Ok(text) => {
                    let id = content_id(&text);
                    if seen.insert(id.clone()) {
                        index.push(ContentBlock {
                            id: id.clone(),
                            length: text.len(),
                            text,
                        });
                    }
                    reports.push(report(
                        link,
                        ExtractOutcome::Success,
                        Some(id),
                        reason.to_string(),
                    ));
                },
            },
        }
    }

    let stats = ExtractionStats::derive(&index, &reports);
    return Extraction {
        content_index: index,
        link_reports: reports,
        stats,
    };
}

impl ExtractionStats {
    /// Recompute every aggregate from the final index and reports.
    fn derive(index: &[ContentBlock], reports: &[LinkReport]) -> Self {
        let mut references: HashMap<&str, usize> = HashMap::new();
        for entry in reports {
            let Some(id) = entry.block.as_deref() else {
                continue;
            };
            let count = references.entry(id).or_insert(0);
            *count = count.saturating_add(1);
        }

        let mut duplicate_content_detected = 0usize;
        let mut tokens_saved = 0usize;
        let mut kept_bytes = 0usize;
        for block in index {
            kept_bytes = kept_bytes.saturating_add(block.length);
            let sightings = references.get(block.id.as_str()).copied().unwrap_or(0);
            let repeats = sightings.saturating_sub(1);
            duplicate_content_detected = duplicate_content_detected.saturating_add(repeats);
            tokens_saved = tokens_saved.saturating_add(repeats.saturating_mul(block.length));
        }

        let compression_ratio = if tokens_saved == 0 {
            0.0
        } else {
            let saved = u32::try_from(tokens_saved).unwrap_or(u32::MAX);
            let kept = u32::try_from(kept_bytes).unwrap_or(u32::MAX);
            f64::from(saved) / (f64::from(kept) + f64::from(saved))
        };

        return Self {
            compression_ratio,
            duplicate_content_detected,
            tokens_saved,
            total_links: reports.len(),
            unique_content: index.len(),
        };
    }
}

/// Links that never reach eligibility analysis: validation errors and
/// internal references.
fn prefiltered(link: &Link) -> bool {
    if matches!(link.scope, LinkScope::Internal) {
        return true;
    }
    return matches!(link.validation, Some(Validation::Error { .. }));
}

/// The eligibility strategy chain. Precedence is a contract: stop
/// directive, force directive, anchored reference, whole-file opt-in.
fn eligibility(link: &Link, options: ExtractOptions) -> Eligibility {
    return match link.directive {
        Some(ExtractDirective::Stop) => Eligibility::Skip("stop directive on link"),
        Some(ExtractDirective::Force) => Eligibility::Extract("forced by directive"),
        None => match link.anchor_kind {
            Some(AnchorKind::Header) => Eligibility::Extract("section reference"),
            Some(AnchorKind::Block) => Eligibility::Extract("block reference"),
            None if options.include_full_files => Eligibility::Extract("whole file"),
            None => Eligibility::Skip("whole-file link and full-file extraction not enabled"),
        },
    };
}

/// Fetch the target through the cache and extract the requested
/// granularity. Failures are per-link report reasons, never panics or
/// batch aborts.
async fn extract_one(cache: &DocumentCache, link: &Link) -> Result<String, String> {
    let Some(target) = link.target_abs.as_deref() else {
        return Err("link carries no resolved target path".to_string());
    };
    let document = cache
        .resolve(target)
        .await
        .map_err(|e| return format!("target unavailable: {e}"))?;

    return match (link.anchor.as_deref(), link.anchor_kind) {
        (Some(anchor), Some(AnchorKind::Block)) => document
            .extract_block(anchor)
            .ok_or_else(|| return format!("block `^{anchor}` no longer present in target")),
        (Some(anchor), _) => document
            .extract_section(anchor)
            .ok_or_else(|| return format!("section `{anchor}` no longer present in target")),
        (None, _) => Ok(document.extract_full_content().to_string()),
    };
}

/// Content identity: hash of the extracted bytes, independent of where the
/// content came from.
fn content_id(text: &str) -> String {
    let hash = Sha256::digest(text.as_bytes());
    return format!("{hash:x}");
}

fn report(link: &Link, outcome: ExtractOutcome, block: Option<String>, reason: String) -> LinkReport {
    return LinkReport {
        block,
        outcome,
        reason,
        source_line: link.line,
        target: link.describe_target(),
    };
}
