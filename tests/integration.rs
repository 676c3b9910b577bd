use std::path::Path;
use std::process::Command;

fn citecheck_cmd(fixture: &str) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_citecheck"));
    cmd.current_dir(Path::new("tests/fixtures").join(fixture));
    cmd
}

#[test]
fn clean_corpus_checks_green() {
    let out = citecheck_cmd("clean")
        .args(["check", "source.md"])
        .output()
        .unwrap();
    assert!(
        out.status.success(),
        "check failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("0 broken"), "got: {stdout}");
}

#[test]
fn broken_citation_exits_two() {
    let out = citecheck_cmd("corpus")
        .args(["check", "source.md"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(2));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("BROKEN"), "got: {stdout}");
}

#[test]
fn fragile_citation_exits_one_with_conversion() {
    let out = citecheck_cmd("scoped")
        .args(["check", "source.md", "--scope", "."])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("subdir/target.md#Anchor"), "got: {stdout}");
}

#[test]
fn check_json_summary_is_consistent_with_links() {
    let out = citecheck_cmd("corpus")
        .args(["check", "source.md", "--json"])
        .output()
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();

    let links = json["links"].as_array().unwrap();
    let summary = &json["summary"];
    assert_eq!(
        summary["total"].as_u64().unwrap(),
        u64::try_from(links.len()).unwrap()
    );
    assert_eq!(
        summary["valid"].as_u64().unwrap()
            + summary["warning"].as_u64().unwrap()
            + summary["error"].as_u64().unwrap(),
        summary["total"].as_u64().unwrap()
    );

    // Enrichment exclusivity: valid links carry no error fields.
    for link in links {
        let validation = &link["validation"];
        if validation["status"] == "valid" {
            assert!(validation.get("message").is_none());
            assert!(validation.get("suggestion").is_none());
        } else {
            assert!(!validation["message"].as_str().unwrap_or("").is_empty());
        }
    }
}

#[test]
fn extract_json_reports_deduplicated_content() {
    let out = citecheck_cmd("corpus")
        .args(["extract", "source.md", "--json"])
        .output()
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();

    let index = json["content_index"].as_array().unwrap();
    assert_eq!(index.len(), 1);
    assert_eq!(index[0]["text"], "Hello world.");
    assert_eq!(index[0]["length"], 12);

    let stats = &json["stats"];
    assert_eq!(stats["total_links"], 3);
    assert_eq!(stats["unique_content"], 1);
    assert_eq!(stats["duplicate_content_detected"], 2);
    assert_eq!(stats["tokens_saved"], 24);

    let reports = json["link_reports"].as_array().unwrap();
    assert_eq!(reports.len(), 3);
    for report in reports {
        assert_eq!(report["outcome"], "success");
        assert_eq!(report["block"], index[0]["id"]);
    }
}

#[test]
fn anchors_lists_both_header_id_variants() {
    let out = citecheck_cmd("anchors")
        .args(["anchors", "doc.md"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("#Story 1.5: Cache"), "got: {stdout}");
    assert!(stdout.contains("#Story%201.5%20Cache"), "got: {stdout}");
    assert!(stdout.contains("#^cache-block"), "got: {stdout}");
}

#[test]
fn fix_rewrites_a_close_anchor_match_then_check_passes() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("target.md"), "## Sample Header\n\nBody.\n").unwrap();
    std::fs::write(
        dir.path().join("source.md"),
        "[s](target.md#Sample-Header)\n",
    )
    .unwrap();

    let fix = Command::new(env!("CARGO_BIN_EXE_citecheck"))
        .current_dir(dir.path())
        .args(["fix", "source.md"])
        .output()
        .unwrap();
    assert!(
        fix.status.success(),
        "fix failed: {}",
        String::from_utf8_lossy(&fix.stderr)
    );

    let rewritten = std::fs::read_to_string(dir.path().join("source.md")).unwrap();
    assert_eq!(rewritten.trim(), "[s](target.md#Sample Header)");

    let check = Command::new(env!("CARGO_BIN_EXE_citecheck"))
        .current_dir(dir.path())
        .args(["check", "source.md"])
        .output()
        .unwrap();
    assert!(
        check.status.success(),
        "check after fix failed: {}",
        String::from_utf8_lossy(&check.stdout)
    );
}
